use crate::loader::LoaderPtr;
use kiln_base::hashing::HashSet;
use kiln_base::{LoadingState, ResourceKey};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};

/// Something that waits for resources, typically a scene node that stays disabled until its mesh
/// and textures are usable.
pub trait CallbackTarget: Send + Sync {
    fn set_enabled(
        &self,
        enabled: bool,
    );

    /// Called once, right after `set_enabled(true)`, when the requirement is fulfilled
    fn on_resource_ready(
        &self,
        _key: &ResourceKey,
    ) {
    }
}

/// A pending "notify me when `key` is good enough" request
pub struct CallbackEntry {
    pub key: ResourceKey,
    /// Also require every dependency of the resource
    pub recursive: bool,
    /// Decode steps needed, `None` uses the loader's default blocking iteration
    pub min_load_iteration: Option<u32>,
    pub target: Weak<dyn CallbackTarget>,
}

impl CallbackEntry {
    pub fn new<T: CallbackTarget + 'static>(
        key: impl Into<ResourceKey>,
        target: &Arc<T>,
        recursive: bool,
        min_load_iteration: Option<u32>,
    ) -> Self {
        let target: Arc<dyn CallbackTarget> = target.clone();
        CallbackEntry {
            key: key.into(),
            recursive,
            min_load_iteration,
            target: Arc::downgrade(&target),
        }
    }
}

fn loader_is_ready(
    loader: &LoaderPtr,
    min_load_iteration: Option<u32>,
) -> bool {
    let state = loader.state.lock().unwrap();
    let resource = match state.resource.upgrade() {
        Some(resource) => resource,
        None => return false,
    };

    // A failed load won't get any better, don't leave the target waiting forever
    if state.loading_state == LoadingState::Aborted {
        return true;
    }

    let threshold = min_load_iteration.unwrap_or(state.default_blocking_iteration);
    resource.commit_count() > 0
        && (state.loading_state == LoadingState::Loaded || state.load_count >= threshold)
}

/// True if `loader` is the loader of `key` and has progressed enough. With `recursive`, every
/// dependency below it, checked hop by hop, must also be ready.
pub fn fulfill_requirement(
    key: &ResourceKey,
    recursive: bool,
    min_load_iteration: Option<u32>,
    loader: &LoaderPtr,
) -> bool {
    if loader.key() != key {
        return false;
    }

    if recursive && !descendants_ready(loader, min_load_iteration) {
        return false;
    }

    loader_is_ready(loader, min_load_iteration)
}

fn descendants_ready(
    loader: &LoaderPtr,
    min_load_iteration: Option<u32>,
) -> bool {
    let mut visited = HashSet::default();
    visited.insert(Arc::as_ptr(loader) as usize);
    let mut queue: VecDeque<LoaderPtr> = loader.dependency_children().into();

    while let Some(child) = queue.pop_front() {
        if !visited.insert(Arc::as_ptr(&child) as usize) {
            continue;
        }
        if !loader_is_ready(&child, min_load_iteration) {
            return false;
        }
        queue.extend(child.dependency_children());
    }

    true
}

// The loader and every ancestor reachable through parent edges
fn affected_loaders(loader: &LoaderPtr) -> Vec<LoaderPtr> {
    let mut visited = HashSet::default();
    let mut affected = Vec::default();
    let mut queue = VecDeque::default();
    queue.push_back(loader.clone());

    while let Some(loader) = queue.pop_front() {
        if !visited.insert(Arc::as_ptr(&loader) as usize) {
            continue;
        }
        queue.extend(loader.dependency_parents());
        affected.push(loader);
    }

    affected
}

/// Pending callbacks. Entries are evaluated when events for their loader, or for one of its
/// dependencies, are processed.
#[derive(Default)]
pub struct CallbackRegistry {
    entries: Mutex<Vec<CallbackEntry>>,
}

impl CallbackRegistry {
    /// Fires the target right away if the requirement already holds. Otherwise the target is
    /// disabled and the entry is kept. Returns true if the target fired.
    pub fn register(
        &self,
        entry: CallbackEntry,
        loader: Option<&LoaderPtr>,
    ) -> bool {
        let target = match entry.target.upgrade() {
            Some(target) => target,
            None => return false,
        };

        let fulfilled = loader
            .map(|loader| {
                fulfill_requirement(&entry.key, entry.recursive, entry.min_load_iteration, loader)
            })
            .unwrap_or(false);

        if fulfilled {
            log::trace!("callback for {} fired on registration", entry.key);
            target.set_enabled(true);
            target.on_resource_ready(&entry.key);
            return true;
        }

        target.set_enabled(false);
        self.entries.lock().unwrap().push(entry);
        false
    }

    /// Fires and removes the entries satisfied after an event for `loader`
    pub fn process(
        &self,
        loader: &LoaderPtr,
    ) {
        profiling::scope!("CallbackRegistry::process");
        let affected = affected_loaders(loader);
        let mut fired = Vec::default();

        {
            let mut entries = self.entries.lock().unwrap();
            entries.retain(|entry| {
                let target = match entry.target.upgrade() {
                    Some(target) => target,
                    None => return false,
                };

                let fulfilled = affected.iter().any(|loader| {
                    fulfill_requirement(
                        &entry.key,
                        entry.recursive,
                        entry.min_load_iteration,
                        loader,
                    )
                });
                if fulfilled {
                    fired.push((target, entry.key.clone()));
                }
                !fulfilled
            });
        }

        // Outside the lock, targets may register new callbacks
        for (target, key) in fired {
            log::trace!("callback for {} fired", key);
            target.set_enabled(true);
            target.on_resource_ready(&key);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_pending(
        &self,
        key: &ResourceKey,
    ) -> bool {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .any(|entry| &entry.key == key)
    }

    /// Drops entries whose target no longer exists
    pub fn purge(&self) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|entry| entry.target.strong_count() > 0);
        before - entries.len()
    }
}
