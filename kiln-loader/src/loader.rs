use crate::manager::{DecodeContext, ManagerInner};
use crate::resource::{Resource, ResourcePtr, ResourceWeakPtr};
use kiln_base::{LoadArgs, LoadingState, ResourceKey};
use std::fmt;
use std::io::Read;
use std::sync::{Arc, Mutex, TryLockError, Weak};

/// Format specific decoding logic, produced by a `ResourceFactory`.
///
/// `decode()` runs on a worker thread (or inline for blocking loads) and may be called several
/// times for progressive formats, each call is one step. `commit()` always runs on the thread that
/// owns the `ResourceManager` and publishes whatever has been decoded into the resource.
pub trait ResourceLoader: Send {
    /// Decodes the next chunk of data. `stream` is `None` if the resource couldn't be opened, the
    /// loader decides whether that is fatal.
    fn decode(
        &mut self,
        ctx: &mut DecodeContext,
        stream: Option<&mut dyn Read>,
        key: &ResourceKey,
        args: &LoadArgs,
    ) -> LoadingState;

    /// Moves decoded data into the resource
    fn commit(
        &mut self,
        resource: &Resource,
    );

    /// Number of decode steps a `BlockingMode::LoaderDefault` load waits for. It is also the
    /// progress at which a load counts as "good enough" for callbacks.
    fn default_blocking_iteration(&self) -> u32 {
        0
    }

    /// Overrides whatever blocking mode the caller asked for
    fn force_blocking_iteration(&self) -> Option<u32> {
        None
    }
}

pub(crate) struct LoaderState {
    pub(crate) loading_state: LoadingState,
    pub(crate) load_count: u32,
    pub(crate) args: LoadArgs,
    pub(crate) priority: i32,
    pub(crate) stream: Option<Box<dyn Read + Send>>,
    pub(crate) stream_opened: bool,
    pub(crate) resource: ResourceWeakPtr,
    pub(crate) parents: Vec<Weak<Loader>>,
    pub(crate) children: Vec<Weak<Loader>>,
    // Cleared while a decode task is queued or running, so a loader is never queued twice
    pub(crate) need_enqueue: bool,
    pub(crate) pending_commit: bool,
    pub(crate) queued_event: bool,
    pub(crate) default_blocking_iteration: u32,
    pub(crate) force_blocking_iteration: Option<u32>,
}

/// Tracks the load of one resource: its decoder, progress and dependency edges.
///
/// The loader only holds a weak reference to its resource, the resource goes away when the last
/// user drops it even if loading hasn't finished.
pub struct Loader {
    key: ResourceKey,
    decoder: Mutex<Box<dyn ResourceLoader>>,
    pub(crate) state: Mutex<LoaderState>,
}

pub type LoaderPtr = Arc<Loader>;

impl Loader {
    pub(crate) fn new(
        key: ResourceKey,
        decoder: Box<dyn ResourceLoader>,
        args: LoadArgs,
        priority: i32,
        resource: &ResourcePtr,
    ) -> LoaderPtr {
        let state = LoaderState {
            loading_state: LoadingState::NotLoaded,
            load_count: 0,
            args,
            priority,
            stream: None,
            stream_opened: false,
            resource: Arc::downgrade(resource),
            parents: Vec::default(),
            children: Vec::default(),
            need_enqueue: true,
            pending_commit: false,
            queued_event: false,
            default_blocking_iteration: decoder.default_blocking_iteration(),
            force_blocking_iteration: decoder.force_blocking_iteration(),
        };

        Arc::new(Loader {
            key,
            decoder: Mutex::new(decoder),
            state: Mutex::new(state),
        })
    }

    // A loader for a resource that was handed to the cache fully formed
    pub(crate) fn new_cached(resource: &ResourcePtr) -> LoaderPtr {
        let loader = Loader::new(
            resource.key().clone(),
            Box::new(CachedResourceLoader),
            LoadArgs::default(),
            0,
            resource,
        );

        {
            let mut state = loader.state.lock().unwrap();
            state.loading_state = LoadingState::Loaded;
            state.load_count = 1;
            state.stream_opened = true;
        }

        loader
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn loading_state(&self) -> LoadingState {
        self.state.lock().unwrap().loading_state
    }

    /// Number of decode steps that have run
    pub fn load_count(&self) -> u32 {
        self.state.lock().unwrap().load_count
    }

    pub fn resource(&self) -> Option<ResourcePtr> {
        self.state.lock().unwrap().resource.upgrade()
    }

    pub fn args(&self) -> LoadArgs {
        self.state.lock().unwrap().args.clone()
    }

    pub fn priority(&self) -> i32 {
        self.state.lock().unwrap().priority
    }

    pub fn default_blocking_iteration(&self) -> u32 {
        self.state.lock().unwrap().default_blocking_iteration
    }

    pub fn force_blocking_iteration(&self) -> Option<u32> {
        self.state.lock().unwrap().force_blocking_iteration
    }

    pub fn dependency_parent_count(&self) -> usize {
        self.state.lock().unwrap().parents.len()
    }

    pub fn get_dependency_parent(
        &self,
        index: usize,
    ) -> Option<LoaderPtr> {
        self.state
            .lock()
            .unwrap()
            .parents
            .get(index)
            .and_then(|parent| parent.upgrade())
    }

    pub fn dependency_child_count(&self) -> usize {
        self.state.lock().unwrap().children.len()
    }

    pub fn get_dependency_child(
        &self,
        index: usize,
    ) -> Option<LoaderPtr> {
        self.state
            .lock()
            .unwrap()
            .children
            .get(index)
            .and_then(|child| child.upgrade())
    }

    /// Parents that are still alive
    pub fn dependency_parents(&self) -> Vec<LoaderPtr> {
        live_loaders(&self.state.lock().unwrap().parents)
    }

    /// Children that are still alive
    pub fn dependency_children(&self) -> Vec<LoaderPtr> {
        live_loaders(&self.state.lock().unwrap().children)
    }

    /// Records that `self` needs `child` to be useful. Self edges and duplicate edges are ignored.
    pub fn depends_on(
        self: &Arc<Self>,
        child: &LoaderPtr,
    ) {
        if Arc::ptr_eq(self, child) {
            log::warn!("{} can't depend on itself", self.key);
            return;
        }

        {
            let mut state = self.state.lock().unwrap();
            if state
                .children
                .iter()
                .any(|existing| existing.as_ptr() == Arc::as_ptr(child))
            {
                return;
            }
            state.children.push(Arc::downgrade(child));
        }

        log::trace!("{} depends on {}", self.key, child.key);
        child
            .state
            .lock()
            .unwrap()
            .parents
            .push(Arc::downgrade(self));
    }

    // Removes all outgoing edges, and the matching back edges in the children
    fn clear_children(self: &Arc<Self>) {
        let children = std::mem::take(&mut self.state.lock().unwrap().children);
        for child in children.iter().filter_map(|child| child.upgrade()) {
            child
                .state
                .lock()
                .unwrap()
                .parents
                .retain(|parent| parent.as_ptr() != Arc::as_ptr(self));
        }
    }

    /// Runs one decode step and returns the resulting state. Steps of the same loader never run
    /// concurrently. A stopped loader is left alone.
    pub(crate) fn decode_step(
        self: &Arc<Self>,
        manager: &Arc<ManagerInner>,
    ) -> LoadingState {
        let mut decoder = self.decoder.lock().unwrap();
        self.decode_locked(&mut **decoder, manager)
    }

    /// Like `decode_step()`, but returns `None` instead of waiting for a step that is in flight
    pub(crate) fn try_decode_step(
        self: &Arc<Self>,
        manager: &Arc<ManagerInner>,
    ) -> Option<LoadingState> {
        let mut decoder = match self.decoder.try_lock() {
            Ok(decoder) => decoder,
            Err(TryLockError::WouldBlock) => return None,
            Err(TryLockError::Poisoned(e)) => panic!("{} decoder poisoned: {}", self.key, e),
        };
        Some(self.decode_locked(&mut **decoder, manager))
    }

    fn decode_locked(
        self: &Arc<Self>,
        decoder: &mut dyn ResourceLoader,
        manager: &Arc<ManagerInner>,
    ) -> LoadingState {
        profiling::scope!("Loader::decode_step");
        let needs_open = {
            let mut state = self.state.lock().unwrap();
            if state.loading_state.is_stopped() {
                return state.loading_state;
            }

            if state.resource.strong_count() == 0 {
                log::debug!("{} was released before it finished loading", self.key);
                state.loading_state = LoadingState::Aborted;
                state.stream = None;
                state.pending_commit = false;
                return state.loading_state;
            }

            if state.loading_state == LoadingState::NotLoaded {
                state.loading_state = LoadingState::Loading;
            }

            !std::mem::replace(&mut state.stream_opened, true)
        };

        if needs_open {
            let stream = match manager.io().open_read(&self.key) {
                Ok(stream) => Some(stream),
                Err(e) => {
                    log::debug!("Could not open {}: {}", self.key, e);
                    None
                }
            };
            self.state.lock().unwrap().stream = stream;
        }

        let (mut stream, args) = {
            let mut state = self.state.lock().unwrap();
            (state.stream.take(), state.args.clone())
        };

        let decoded = {
            profiling::scope!("ResourceLoader::decode");
            let mut ctx = DecodeContext::new(manager, self);
            decoder.decode(
                &mut ctx,
                stream.as_deref_mut().map(|s| s as &mut dyn Read),
                &self.key,
                &args,
            )
        };

        let mut state = self.state.lock().unwrap();
        state.load_count += 1;

        // The state only ever moves forward here, anything else is a misbehaving decoder
        if !state.loading_state.is_stopped() {
            let decoded = if decoded == LoadingState::NotLoaded {
                LoadingState::Loading
            } else {
                decoded
            };

            if LoadingState::is_valid_transition(state.loading_state, decoded) {
                state.loading_state = decoded;
            } else {
                log::warn!(
                    "{} decoder went from {:?} to {:?}, ignoring",
                    self.key,
                    state.loading_state,
                    decoded
                );
            }
        }

        if !state.loading_state.is_stopped() {
            state.stream = stream;
        }

        // An aborted load throws away whatever partial data it decoded
        let loading_state = state.loading_state;
        if loading_state == LoadingState::Aborted {
            state.pending_commit = false;
        } else if loading_state.can_commit() {
            state.pending_commit = true;
        }

        log::trace!(
            "{} decode step {} -> {:?}",
            self.key,
            state.load_count,
            state.loading_state
        );
        state.loading_state
    }

    /// Applies pending decoded data to the resource. Returns false if there was nothing to commit,
    /// if the load was aborted, or if a decode step is in flight. In the last case the commit stays
    /// pending and the step raises another event once it is done.
    pub(crate) fn commit(&self) -> bool {
        let resource = {
            let mut state = self.state.lock().unwrap();
            if state.loading_state == LoadingState::Aborted {
                if std::mem::replace(&mut state.pending_commit, false) {
                    log::warn!("{} was aborted, skipping its commit", self.key);
                }
                return false;
            }

            if !state.pending_commit {
                return false;
            }
            match state.resource.upgrade() {
                Some(resource) => resource,
                None => return false,
            }
        };

        let mut decoder = match self.decoder.try_lock() {
            Ok(decoder) => decoder,
            Err(TryLockError::WouldBlock) => {
                log::trace!("{} is decoding, commit deferred", self.key);
                return false;
            }
            Err(TryLockError::Poisoned(e)) => panic!("{} decoder poisoned: {}", self.key, e),
        };

        // Re-check, a step may have finished or aborted before we got the decoder
        {
            let mut state = self.state.lock().unwrap();
            if !std::mem::replace(&mut state.pending_commit, false)
                || state.loading_state == LoadingState::Aborted
            {
                return false;
            }
        }

        profiling::scope!("ResourceLoader::commit");
        decoder.commit(&resource);
        let commit_count = resource.increment_commit_count();
        log::debug!("{} commit {}", self.key, commit_count);
        true
    }

    /// Puts the loader back to `NotLoaded` with a fresh decoder, keeping the same resource
    pub(crate) fn reset(
        self: &Arc<Self>,
        decoder: Box<dyn ResourceLoader>,
        args: LoadArgs,
        priority: i32,
    ) {
        self.clear_children();

        let default_blocking_iteration = decoder.default_blocking_iteration();
        let force_blocking_iteration = decoder.force_blocking_iteration();
        *self.decoder.lock().unwrap() = decoder;

        let mut state = self.state.lock().unwrap();
        state.loading_state = LoadingState::NotLoaded;
        state.load_count = 0;
        state.args = args;
        state.priority = priority;
        state.stream = None;
        state.stream_opened = false;
        state.need_enqueue = true;
        state.pending_commit = false;
        state.default_blocking_iteration = default_blocking_iteration;
        state.force_blocking_iteration = force_blocking_iteration;
    }
}

fn live_loaders(loaders: &[Weak<Loader>]) -> Vec<LoaderPtr> {
    loaders.iter().filter_map(|loader| loader.upgrade()).collect()
}

impl fmt::Debug for Loader {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("Loader")
            .field("key", &self.key)
            .field("loading_state", &state.loading_state)
            .field("load_count", &state.load_count)
            .field("children", &state.children.len())
            .finish()
    }
}

// Decoder of resources registered with `ResourceManager::cache()`, the data is already in place
struct CachedResourceLoader;

impl ResourceLoader for CachedResourceLoader {
    fn decode(
        &mut self,
        _ctx: &mut DecodeContext,
        _stream: Option<&mut dyn Read>,
        _key: &ResourceKey,
        _args: &LoadArgs,
    ) -> LoadingState {
        LoadingState::Loaded
    }

    fn commit(
        &mut self,
        _resource: &Resource,
    ) {
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct NoopLoader;

    impl ResourceLoader for NoopLoader {
        fn decode(
            &mut self,
            _ctx: &mut DecodeContext,
            _stream: Option<&mut dyn Read>,
            _key: &ResourceKey,
            _args: &LoadArgs,
        ) -> LoadingState {
            LoadingState::Loaded
        }

        fn commit(
            &mut self,
            _resource: &Resource,
        ) {
        }

        fn default_blocking_iteration(&self) -> u32 {
            2
        }
    }

    fn make_loader(
        key: &str,
        resource: &ResourcePtr,
    ) -> LoaderPtr {
        Loader::new(
            ResourceKey::new(key),
            Box::new(NoopLoader),
            LoadArgs::default(),
            0,
            resource,
        )
    }

    #[test]
    fn dependency_edges() {
        let resource = Arc::new(Resource::new("a", ()));
        let a = make_loader("a", &resource);
        let b = make_loader("b", &resource);
        let c = make_loader("c", &resource);

        a.depends_on(&b);
        a.depends_on(&b);
        a.depends_on(&a);
        b.depends_on(&c);

        assert_eq!(a.dependency_child_count(), 1);
        assert_eq!(a.dependency_parent_count(), 0);
        assert_eq!(b.dependency_parent_count(), 1);
        assert!(Arc::ptr_eq(&a.get_dependency_child(0).unwrap(), &b));
        assert!(Arc::ptr_eq(&b.get_dependency_parent(0).unwrap(), &a));
        assert!(Arc::ptr_eq(&c.dependency_parents()[0], &b));
        assert!(a.get_dependency_child(1).is_none());
    }

    #[test]
    fn edges_are_weak() {
        let resource = Arc::new(Resource::new("a", ()));
        let a = make_loader("a", &resource);
        {
            let b = make_loader("b", &resource);
            a.depends_on(&b);
        }
        assert_eq!(a.dependency_child_count(), 1);
        assert!(a.get_dependency_child(0).is_none());
        assert!(a.dependency_children().is_empty());
    }

    #[test]
    fn clear_children_removes_back_edges() {
        let resource = Arc::new(Resource::new("a", ()));
        let a = make_loader("a", &resource);
        let b = make_loader("b", &resource);
        a.depends_on(&b);
        a.clear_children();
        assert_eq!(a.dependency_child_count(), 0);
        assert_eq!(b.dependency_parent_count(), 0);
    }

    #[test]
    fn resource_reference_is_weak() {
        let resource = Arc::new(Resource::new("a", ()));
        let loader = make_loader("a", &resource);
        assert_eq!(loader.default_blocking_iteration(), 2);
        assert!(loader.resource().is_some());
        drop(resource);
        assert!(loader.resource().is_none());
        assert_eq!(loader.loading_state(), LoadingState::NotLoaded);
    }

    #[test]
    fn cached_loader_is_loaded() {
        let resource = Arc::new(Resource::new("a", ()));
        let loader = Loader::new_cached(&resource);
        assert_eq!(loader.loading_state(), LoadingState::Loaded);
        assert_eq!(loader.load_count(), 1);
        assert!(!loader.commit());
    }
}
