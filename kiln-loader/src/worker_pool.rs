use crate::loader::LoaderPtr;
use crate::manager::ManagerInner;
use crossbeam_channel::{Receiver, Sender};
use kiln_base::KilnResult;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

struct DecodeTask {
    loader: LoaderPtr,
    priority: i32,
    sequence: u64,
}

// Higher priority first, then first come first served
impl Ord for DecodeTask {
    fn cmp(
        &self,
        other: &Self,
    ) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for DecodeTask {
    fn partial_cmp(
        &self,
        other: &Self,
    ) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for DecodeTask {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DecodeTask {}

/// Queue of pending decode steps shared by the worker threads. Every queued task sends one wake
/// token, a thread that receives a token is guaranteed to find a task in the heap.
pub(crate) struct TaskQueue {
    heap: Mutex<BinaryHeap<DecodeTask>>,
    next_sequence: AtomicU64,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        let (wake_tx, wake_rx) = crossbeam_channel::unbounded();
        TaskQueue {
            heap: Mutex::new(BinaryHeap::default()),
            next_sequence: AtomicU64::new(0),
            wake_tx,
            wake_rx,
        }
    }

    pub(crate) fn push(
        &self,
        loader: LoaderPtr,
        priority: i32,
    ) {
        let sequence = self.next_sequence.fetch_add(1, AtomicOrdering::Relaxed);
        self.heap.lock().unwrap().push(DecodeTask {
            loader,
            priority,
            sequence,
        });
        // Can't fail, the receiver lives as long as self
        let _ = self.wake_tx.send(());
    }

    /// Takes the most urgent task without waiting
    pub(crate) fn try_pop(&self) -> Option<LoaderPtr> {
        self.wake_rx.try_recv().ok()?;
        self.pop_woken()
    }

    // Only valid after a wake token was received
    fn pop_woken(&self) -> Option<LoaderPtr> {
        self.heap.lock().unwrap().pop().map(|task| task.loader)
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.lock().unwrap().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Thread that takes tasks out of the queue and ends when the finish channel is signalled
struct DecodeWorkerThread {
    finish_tx: Sender<()>,
    join_handle: JoinHandle<()>,
}

impl DecodeWorkerThread {
    fn new(
        manager: Arc<ManagerInner>,
        thread_index: usize,
    ) -> KilnResult<Self> {
        let (finish_tx, finish_rx) = crossbeam_channel::bounded(1);
        let wake_rx = manager.tasks().wake_rx.clone();
        let join_handle = std::thread::Builder::new()
            .name(format!("kiln loader {}", thread_index))
            .spawn(move || {
                profiling::register_thread!(&format!("DecodeWorkerThread {}", thread_index));
                loop {
                    crossbeam_channel::select! {
                        recv(wake_rx) -> msg => {
                            if msg.is_err() {
                                return;
                            }

                            if let Some(loader) = manager.tasks().pop_woken() {
                                profiling::scope!("DecodeTask");
                                manager.run_decode_task(&loader);
                            }
                        },
                        recv(finish_rx) -> _msg => {
                            return;
                        }
                    }
                }
            })?;

        Ok(DecodeWorkerThread {
            finish_tx,
            join_handle,
        })
    }
}

/// Spawns N decode threads and stops them on `finish()`
pub(crate) struct WorkerPool {
    worker_threads: Vec<DecodeWorkerThread>,
}

impl WorkerPool {
    pub(crate) fn new(
        manager: &Arc<ManagerInner>,
        thread_count: usize,
    ) -> KilnResult<Self> {
        let mut worker_threads = Vec::with_capacity(thread_count);
        for thread_index in 0..thread_count {
            worker_threads.push(DecodeWorkerThread::new(manager.clone(), thread_index)?);
        }

        log::debug!("Started {} decode threads", thread_count);
        Ok(WorkerPool { worker_threads })
    }

    pub(crate) fn thread_count(&self) -> usize {
        self.worker_threads.len()
    }

    /// Stops the threads after their current task and waits for them. Queued tasks are not run.
    pub(crate) fn finish(self) {
        for worker_thread in &self.worker_threads {
            let _ = worker_thread.finish_tx.send(());
        }

        for worker_thread in self.worker_threads {
            if worker_thread.join_handle.join().is_err() {
                log::error!("A decode thread panicked");
            }
        }
    }
}
