use crate::callback::{CallbackEntry, CallbackRegistry, CallbackTarget};
use crate::config::ResourceManagerConfig;
use crate::io::ResourceIO;
use crate::loader::{Loader, LoaderPtr, ResourceLoader};
use crate::resource::{Resource, ResourcePtr};
use crate::worker_pool::{TaskQueue, WorkerPool};
use crossbeam_channel::{Receiver, Sender};
use kiln_base::hashing::HashMap;
use kiln_base::{KilnResult, LoadArgs, LoadingState, ResourceKey};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::ThreadId;
use std::time::{Duration, Instant};

/// Creates resources of the types it recognizes. Factories are tried in reverse registration
/// order, so a later factory can override an earlier one.
pub trait ResourceFactory: Send + Sync {
    /// An empty resource shell for `key`, or `None` if this factory doesn't handle it (usually
    /// decided by extension)
    fn create_resource(
        &self,
        key: &ResourceKey,
        args: &LoadArgs,
    ) -> Option<Resource>;

    fn create_loader(&self) -> Box<dyn ResourceLoader>;
}

/// How long `load()` waits before returning
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BlockingMode {
    /// Return immediately, decoding happens in the background
    NonBlock,
    /// Wait for the loader's `default_blocking_iteration()` decode steps
    LoaderDefault,
    /// Wait until loading has finished or failed
    Block,
    /// Wait for this many decode steps
    Iterations(u32),
}

impl Default for BlockingMode {
    fn default() -> Self {
        BlockingMode::NonBlock
    }
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub blocking: BlockingMode,
    /// Higher values are decoded first
    pub priority: i32,
    /// Limit on how long a blocking load waits, falls back to the configured block timeout
    pub timeout: Option<Duration>,
    pub args: LoadArgs,
}

impl LoadOptions {
    pub fn new(
        blocking: BlockingMode,
        priority: i32,
        args: impl Into<LoadArgs>,
    ) -> Self {
        LoadOptions {
            blocking,
            priority,
            timeout: None,
            args: args.into(),
        }
    }

    pub fn with_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

fn budget_exhausted(
    timer: Option<Instant>,
    timeout: Duration,
) -> bool {
    timer
        .map(|timer| timer.elapsed() >= timeout)
        .unwrap_or(false)
}

pub(crate) struct ManagerInner {
    io: Box<dyn ResourceIO>,
    config: ResourceManagerConfig,
    cache: Mutex<HashMap<ResourceKey, LoaderPtr>>,
    factories: Mutex<Vec<Box<dyn ResourceFactory>>>,
    tasks: TaskQueue,
    events_tx: Sender<LoaderPtr>,
    events_rx: Receiver<LoaderPtr>,
    commit_requests_tx: Sender<LoaderPtr>,
    commit_requests_rx: Receiver<LoaderPtr>,
    callbacks: CallbackRegistry,
    // Bumped after every commit, blocking loads on other threads wait on it
    commit_generation: Mutex<u64>,
    commit_signal: Condvar,
    shutting_down: AtomicBool,
    main_thread: ThreadId,
}

impl ManagerInner {
    pub(crate) fn io(&self) -> &dyn ResourceIO {
        &*self.io
    }

    pub(crate) fn tasks(&self) -> &TaskQueue {
        &self.tasks
    }

    fn is_main_thread(&self) -> bool {
        std::thread::current().id() == self.main_thread
    }

    fn create_from_factories(
        &self,
        key: &ResourceKey,
        args: &LoadArgs,
    ) -> Option<(Resource, Box<dyn ResourceLoader>)> {
        let factories = self.factories.lock().unwrap();
        for factory in factories.iter().rev() {
            if let Some(resource) = factory.create_resource(key, args) {
                return Some((resource, factory.create_loader()));
            }
        }

        log::warn!("No factory can create {}", key);
        None
    }

    // Cache lookup that skips entries whose resource is gone
    fn cached_entry(
        cache: &HashMap<ResourceKey, LoaderPtr>,
        key: &ResourceKey,
    ) -> Option<(LoaderPtr, ResourcePtr)> {
        let loader = cache.get(key)?;
        let resource = loader.resource()?;
        Some((loader.clone(), resource))
    }

    #[profiling::function]
    fn load(
        self: &Arc<Self>,
        key: &ResourceKey,
        options: &LoadOptions,
    ) -> Option<ResourcePtr> {
        let (loader, resource) = {
            let mut cache = self.cache.lock().unwrap();
            if let Some((loader, resource)) = Self::cached_entry(&cache, key) {
                drop(cache);
                log::trace!("{} found in cache", key);
                if options.blocking != BlockingMode::NonBlock {
                    self.start_load(&loader, options);
                }
                return Some(resource);
            }

            let (resource, decoder) = self.create_from_factories(key, &options.args)?;
            let resource = Arc::new(resource);
            let loader = Loader::new(
                key.clone(),
                decoder,
                options.args.clone(),
                options.priority,
                &resource,
            );
            cache.insert(key.clone(), loader.clone());
            (loader, resource)
        };

        log::debug!("load {} {:?}", key, options.blocking);
        self.start_load(&loader, options);
        Some(resource)
    }

    fn reload(
        self: &Arc<Self>,
        key: &ResourceKey,
        options: &LoadOptions,
    ) -> Option<ResourcePtr> {
        let existing = Self::cached_entry(&self.cache.lock().unwrap(), key);
        let (loader, resource) = match existing {
            Some(existing) => existing,
            None => return self.load(key, options),
        };

        if !loader.loading_state().is_stopped() {
            log::debug!("reload of {} ignored, it is still loading", key);
            return Some(resource);
        }

        let (_, decoder) = self.create_from_factories(key, &options.args)?;
        log::debug!("reload {}", key);
        loader.reset(decoder, options.args.clone(), options.priority);
        self.start_load(&loader, options);
        Some(resource)
    }

    fn custom_load(
        &self,
        key: &ResourceKey,
        args: &LoadArgs,
    ) -> Option<(Box<dyn ResourceLoader>, ResourcePtr)> {
        let (resource, decoder) = self.create_from_factories(key, args)?;
        Some((decoder, Arc::new(resource)))
    }

    fn load_with_loader(
        self: &Arc<Self>,
        resource: &ResourcePtr,
        decoder: Box<dyn ResourceLoader>,
        options: &LoadOptions,
    ) -> LoaderPtr {
        let loader = Loader::new(
            resource.key().clone(),
            decoder,
            options.args.clone(),
            options.priority,
            resource,
        );
        self.start_load(&loader, options);
        loader
    }

    fn cache(
        &self,
        resource: ResourcePtr,
    ) -> Option<ResourcePtr> {
        if resource.key().is_empty() {
            log::error!("A resource without a key can't be cached");
            return None;
        }

        if resource.commit_count() == 0 {
            resource.increment_commit_count();
        }

        let loader = Loader::new_cached(&resource);
        let previous = self
            .cache
            .lock()
            .unwrap()
            .insert(resource.key().clone(), loader.clone());
        self.push_event(&loader);

        log::debug!("cached {}", resource.key());
        previous.and_then(|previous| previous.resource())
    }

    fn uncache(
        &self,
        key: &ResourceKey,
    ) -> Option<ResourcePtr> {
        self.cache
            .lock()
            .unwrap()
            .remove(key)
            .and_then(|loader| loader.resource())
    }

    fn get_loader(
        &self,
        key: &ResourceKey,
    ) -> Option<LoaderPtr> {
        self.cache.lock().unwrap().get(key).cloned()
    }

    fn find(
        &self,
        key: &ResourceKey,
    ) -> Option<ResourcePtr> {
        let (loader, resource) = Self::cached_entry(&self.cache.lock().unwrap(), key)?;
        if loader.loading_state() == LoadingState::Aborted && resource.commit_count() == 0 {
            return None;
        }
        Some(resource)
    }

    fn purge_unused(&self) -> usize {
        let mut cache = self.cache.lock().unwrap();
        let before = cache.len();
        cache.retain(|_, loader| loader.resource().is_some());
        before - cache.len()
    }

    fn block_iteration(
        loader: &LoaderPtr,
        blocking: BlockingMode,
    ) -> u32 {
        if let Some(forced) = loader.force_blocking_iteration() {
            return forced;
        }

        match blocking {
            BlockingMode::NonBlock => 0,
            BlockingMode::LoaderDefault => loader.default_blocking_iteration(),
            BlockingMode::Block => u32::MAX,
            BlockingMode::Iterations(iterations) => iterations,
        }
    }

    fn start_load(
        self: &Arc<Self>,
        loader: &LoaderPtr,
        options: &LoadOptions,
    ) {
        let block_iteration = Self::block_iteration(loader, options.blocking);
        if block_iteration > 0 {
            let timeout = options.timeout.or_else(|| self.config.block_timeout());
            self.block(loader, block_iteration, timeout);
        }

        self.continue_load(loader);
    }

    /// Decodes inline until `block_iteration` steps have run or the load stopped, then makes sure
    /// the result is committed before returning.
    #[profiling::function]
    fn block(
        self: &Arc<Self>,
        loader: &LoaderPtr,
        block_iteration: u32,
        timeout: Option<Duration>,
    ) {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let past_deadline = || deadline.map(|d| Instant::now() >= d).unwrap_or(false);
        let is_main_thread = self.is_main_thread();

        let mut decoded = false;
        loop {
            {
                let state = loader.state.lock().unwrap();
                if state.load_count >= block_iteration || state.loading_state.is_stopped() {
                    break;
                }
            }

            if past_deadline() {
                log::warn!("Blocking load of {} timed out", loader.key());
                break;
            }

            if is_main_thread {
                // A worker holding this decoder may itself be waiting for us to commit
                match loader.try_decode_step(self) {
                    Some(_) => decoded = true,
                    None => {
                        self.service_commit_requests();
                        std::thread::yield_now();
                    }
                }
            } else {
                loader.decode_step(self);
                decoded = true;
            }
        }

        // Raise the event so callbacks run through the normal path
        if decoded {
            self.push_event(loader);
        }

        if is_main_thread {
            while loader.state.lock().unwrap().pending_commit {
                if loader.commit() {
                    self.signal_commit();
                    break;
                }

                // The queued event commits it later
                if past_deadline() {
                    log::warn!("Timed out waiting to commit {}", loader.key());
                    break;
                }
                self.service_commit_requests();
                std::thread::yield_now();
            }
            return;
        }

        if !loader.state.lock().unwrap().pending_commit {
            return;
        }

        // Only the main thread commits, ask it to and wait
        let _ = self.commit_requests_tx.send(loader.clone());
        let mut generation = self.commit_generation.lock().unwrap();
        loop {
            {
                let state = loader.state.lock().unwrap();
                if !state.pending_commit || state.loading_state == LoadingState::Aborted {
                    break;
                }
            }

            if self.shutting_down.load(Ordering::Acquire) {
                break;
            }

            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        log::warn!("Timed out waiting for {} to be committed", loader.key());
                        break;
                    }
                    generation = self
                        .commit_signal
                        .wait_timeout(generation, deadline - now)
                        .unwrap()
                        .0;
                }
                None => {
                    generation = self.commit_signal.wait(generation).unwrap();
                }
            }
        }
    }

    // Commits requested by blocking loads on other threads
    fn service_commit_requests(&self) {
        let mut retry = Vec::default();
        while let Ok(loader) = self.commit_requests_rx.try_recv() {
            if loader.commit() {
                self.signal_commit();
            } else if loader.state.lock().unwrap().pending_commit {
                retry.push(loader);
            }
        }

        for loader in retry {
            let _ = self.commit_requests_tx.send(loader);
        }
    }

    fn signal_commit(&self) {
        *self.commit_generation.lock().unwrap() += 1;
        self.commit_signal.notify_all();
    }

    /// Queues the next decode step unless one is already queued or running
    pub(crate) fn continue_load(
        &self,
        loader: &LoaderPtr,
    ) {
        let priority = {
            let mut state = loader.state.lock().unwrap();
            if state.loading_state.is_stopped() || !state.need_enqueue {
                return;
            }
            state.need_enqueue = false;
            state.priority
        };

        self.tasks.push(loader.clone(), priority);
    }

    /// One queued decode step, run by a worker or inline by `pop_event()`
    pub(crate) fn run_decode_task(
        self: &Arc<Self>,
        loader: &LoaderPtr,
    ) {
        let loading_state = loader.decode_step(self);
        loader.state.lock().unwrap().need_enqueue = true;
        self.push_event(loader);

        if !loading_state.is_stopped() {
            self.continue_load(loader);
        }
    }

    // At most one event per loader is queued at a time
    fn push_event(
        &self,
        loader: &LoaderPtr,
    ) {
        {
            let mut state = loader.state.lock().unwrap();
            if state.queued_event {
                return;
            }
            state.queued_event = true;
        }

        let _ = self.events_tx.send(loader.clone());
    }

    fn run_queued_tasks(
        self: &Arc<Self>,
        timer: Option<Instant>,
        timeout: Duration,
    ) {
        // Steps queued by these tasks wait for the next call
        let queued = self.tasks.len();
        for _ in 0..queued {
            if budget_exhausted(timer, timeout) {
                break;
            }

            match self.tasks.try_pop() {
                Some(loader) => self.run_decode_task(&loader),
                None => break,
            }
        }
    }

    #[profiling::function]
    fn pop_event(
        self: &Arc<Self>,
        timer: Option<Instant>,
        timeout: Duration,
        allow_main_thread_decode: bool,
        worker_thread_count: usize,
    ) -> Option<LoaderPtr> {
        debug_assert!(
            self.is_main_thread(),
            "pop_event() must be called from the thread that created the ResourceManager"
        );

        if budget_exhausted(timer, timeout) {
            return None;
        }

        self.service_commit_requests();

        if allow_main_thread_decode || worker_thread_count == 0 {
            self.run_queued_tasks(timer, timeout);
        }

        while let Ok(loader) = self.events_rx.try_recv() {
            loader.state.lock().unwrap().queued_event = false;
            if self.handle_event(&loader) {
                return Some(loader);
            }
        }

        None
    }

    fn handle_event(
        &self,
        loader: &LoaderPtr,
    ) -> bool {
        let resource = match loader.resource() {
            Some(resource) => resource,
            None => {
                log::trace!("{} was released, dropping its event", loader.key());
                return false;
            }
        };

        if loader.commit() {
            self.signal_commit();
        }

        if loader.loading_state() == LoadingState::Aborted {
            if resource.commit_count() == 0 {
                log::warn!("Failed to load {}", loader.key());
                let mut cache = self.cache.lock().unwrap();
                if cache
                    .get(loader.key())
                    .map(|cached| Arc::ptr_eq(cached, loader))
                    .unwrap_or(false)
                {
                    cache.remove(loader.key());
                }
            } else {
                log::warn!("Loading {} was aborted after it was committed", loader.key());
            }

            // Wake blocked loads waiting on a commit that will never come
            self.signal_commit();
        }

        self.callbacks.process(loader);
        true
    }
}

/// What a decoder can do while it runs: load other resources and record dependencies. Passed to
/// `ResourceLoader::decode()`.
pub struct DecodeContext<'a> {
    manager: &'a Arc<ManagerInner>,
    loader: &'a LoaderPtr,
}

impl<'a> DecodeContext<'a> {
    pub(crate) fn new(
        manager: &'a Arc<ManagerInner>,
        loader: &'a LoaderPtr,
    ) -> Self {
        DecodeContext { manager, loader }
    }

    pub fn key(&self) -> &ResourceKey {
        self.loader.key()
    }

    /// The loader being decoded
    pub fn loader(&self) -> &LoaderPtr {
        self.loader
    }

    pub fn load(
        &self,
        key: impl Into<ResourceKey>,
        blocking: BlockingMode,
        priority: i32,
        args: impl Into<LoadArgs>,
    ) -> Option<ResourcePtr> {
        let key = key.into();
        if &key == self.loader.key() {
            log::error!("{} can't load itself while decoding", key);
            return None;
        }

        self.manager
            .load(&key, &LoadOptions::new(blocking, priority, args))
    }

    /// Loads `key` and records it as a dependency of the resource being decoded
    pub fn load_dependency(
        &self,
        key: impl Into<ResourceKey>,
        blocking: BlockingMode,
        priority: i32,
        args: impl Into<LoadArgs>,
    ) -> Option<ResourcePtr> {
        let key = key.into();
        let resource = self.load(key.clone(), blocking, priority, args)?;
        if let Some(child) = self.manager.get_loader(&key) {
            self.loader.depends_on(&child);
        }
        Some(resource)
    }

    /// A fresh decoder and resource for `key` that are not cached, for loaders that wrap another
    /// format's loader
    pub fn custom_load(
        &self,
        key: impl Into<ResourceKey>,
        args: impl Into<LoadArgs>,
    ) -> Option<(Box<dyn ResourceLoader>, ResourcePtr)> {
        self.manager.custom_load(&key.into(), &args.into())
    }

    pub fn cache(
        &self,
        resource: ResourcePtr,
    ) -> Option<ResourcePtr> {
        self.manager.cache(resource)
    }

    pub fn get_loader(
        &self,
        key: impl Into<ResourceKey>,
    ) -> Option<LoaderPtr> {
        self.manager.get_loader(&key.into())
    }

    pub fn depends_on(
        &self,
        child: &LoaderPtr,
    ) {
        self.loader.depends_on(child);
    }
}

/// Caches resources by key and drives their loaders.
///
/// Decoding happens on a pool of worker threads. Commits and callbacks happen on the thread that
/// created the manager, inside `pop_event()`, which the application calls every frame.
pub struct ResourceManager {
    inner: Arc<ManagerInner>,
    worker_pool: Option<WorkerPool>,
}

impl ResourceManager {
    pub fn new(
        io: Box<dyn ResourceIO>,
        config: ResourceManagerConfig,
    ) -> KilnResult<Self> {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let (commit_requests_tx, commit_requests_rx) = crossbeam_channel::unbounded();
        let worker_thread_count = config.worker_thread_count;
        let inner = Arc::new(ManagerInner {
            io,
            config,
            cache: Default::default(),
            factories: Default::default(),
            tasks: TaskQueue::new(),
            events_tx,
            events_rx,
            commit_requests_tx,
            commit_requests_rx,
            callbacks: Default::default(),
            commit_generation: Mutex::new(0),
            commit_signal: Condvar::new(),
            shutting_down: AtomicBool::new(false),
            main_thread: std::thread::current().id(),
        });

        let worker_pool = WorkerPool::new(&inner, worker_thread_count)?;

        Ok(ResourceManager {
            inner,
            worker_pool: Some(worker_pool),
        })
    }

    pub fn config(&self) -> &ResourceManagerConfig {
        &self.inner.config
    }

    pub fn worker_thread_count(&self) -> usize {
        self.worker_pool
            .as_ref()
            .map(|pool| pool.thread_count())
            .unwrap_or(0)
    }

    pub fn add_factory(
        &self,
        factory: Box<dyn ResourceFactory>,
    ) {
        self.inner.factories.lock().unwrap().push(factory);
    }

    pub fn remove_all_factories(&self) {
        self.inner.factories.lock().unwrap().clear();
    }

    /// Returns the cached resource for `key`, or creates it through the factories and starts
    /// loading it. `None` if no factory recognizes the key.
    pub fn load(
        &self,
        key: impl Into<ResourceKey>,
        blocking: BlockingMode,
        priority: i32,
        args: impl Into<LoadArgs>,
    ) -> Option<ResourcePtr> {
        self.load_with_options(key, &LoadOptions::new(blocking, priority, args))
    }

    pub fn load_with_options(
        &self,
        key: impl Into<ResourceKey>,
        options: &LoadOptions,
    ) -> Option<ResourcePtr> {
        self.inner.load(&key.into(), options)
    }

    /// Loads the data for `key` again into the existing resource. Ignored while the current load
    /// is still running.
    pub fn reload(
        &self,
        key: impl Into<ResourceKey>,
        blocking: BlockingMode,
        priority: i32,
        args: impl Into<LoadArgs>,
    ) -> Option<ResourcePtr> {
        self.inner
            .reload(&key.into(), &LoadOptions::new(blocking, priority, args))
    }

    pub fn custom_load(
        &self,
        key: impl Into<ResourceKey>,
        args: impl Into<LoadArgs>,
    ) -> Option<(Box<dyn ResourceLoader>, ResourcePtr)> {
        self.inner.custom_load(&key.into(), &args.into())
    }

    /// Drives `decoder` to fill `resource`, without going through the cache
    pub fn load_with_loader(
        &self,
        resource: &ResourcePtr,
        decoder: Box<dyn ResourceLoader>,
        blocking: BlockingMode,
        priority: i32,
        args: impl Into<LoadArgs>,
    ) -> LoaderPtr {
        self.inner.load_with_loader(
            resource,
            decoder,
            &LoadOptions::new(blocking, priority, args),
        )
    }

    /// Puts a ready made resource in the cache. Returns the resource previously cached under the
    /// same key, if any.
    pub fn cache(
        &self,
        resource: ResourcePtr,
    ) -> Option<ResourcePtr> {
        self.inner.cache(resource)
    }

    pub fn uncache(
        &self,
        key: impl Into<ResourceKey>,
    ) -> Option<ResourcePtr> {
        self.inner.uncache(&key.into())
    }

    pub fn get_loader(
        &self,
        key: impl Into<ResourceKey>,
    ) -> Option<LoaderPtr> {
        self.inner.get_loader(&key.into())
    }

    /// A cached resource that is alive and hasn't failed to load
    pub fn find(
        &self,
        key: impl Into<ResourceKey>,
    ) -> Option<ResourcePtr> {
        self.inner.find(&key.into())
    }

    /// Removes cache entries whose resource was dropped
    pub fn purge_unused(&self) -> usize {
        let removed = self.inner.purge_unused();
        self.inner.callbacks.purge();
        removed
    }

    /// Commits the next loader that made progress and runs the callbacks it satisfies. Returns
    /// `None` once no events are left or when `timeout` has passed since `timer`.
    ///
    /// With `allow_main_thread_decode`, or when there are no worker threads, queued decode steps
    /// run on this thread first.
    pub fn pop_event(
        &self,
        timer: Option<Instant>,
        timeout: Duration,
        allow_main_thread_decode: bool,
    ) -> Option<LoaderPtr> {
        self.inner.pop_event(
            timer,
            timeout,
            allow_main_thread_decode,
            self.worker_thread_count(),
        )
    }

    /// Waits up to `timeout` for an event, for loading screens that have nothing else to do
    pub fn wait_event(
        &self,
        timeout: Duration,
    ) -> Option<LoaderPtr> {
        let start = Instant::now();
        loop {
            if let Some(loader) = self.pop_event(None, Duration::ZERO, false) {
                return Some(loader);
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout || (self.worker_thread_count() == 0 && self.inner.tasks.is_empty())
            {
                return None;
            }

            std::thread::sleep((timeout - elapsed).min(Duration::from_millis(1)));
        }
    }

    /// Pops events until there are none left or the time budget is spent. Returns how many were
    /// processed.
    pub fn process_loading_events(
        &self,
        timer: Option<Instant>,
        timeout: Duration,
    ) -> usize {
        let mut processed = 0;
        while self.pop_event(timer, timeout, false).is_some() {
            processed += 1;
        }
        processed
    }

    /// Enables `target` once `key` is good enough, see `fulfill_requirement()`. Returns true if
    /// it was already good enough and the target fired right away.
    pub fn register_callback<T: CallbackTarget + 'static>(
        &self,
        key: impl Into<ResourceKey>,
        target: &Arc<T>,
        recursive: bool,
        min_load_iteration: Option<u32>,
    ) -> bool {
        let key = key.into();
        let loader = self.inner.get_loader(&key);
        self.inner.callbacks.register(
            CallbackEntry::new(key, target, recursive, min_load_iteration),
            loader.as_ref(),
        )
    }

    pub fn pending_callback_count(&self) -> usize {
        self.inner.callbacks.pending_count()
    }

    pub fn is_callback_pending(
        &self,
        key: impl Into<ResourceKey>,
    ) -> bool {
        self.inner.callbacks.is_pending(&key.into())
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        self.inner.shutting_down.store(true, Ordering::Release);
        self.inner.signal_commit();
        if let Some(worker_pool) = self.worker_pool.take() {
            worker_pool.finish();
        }
    }
}
