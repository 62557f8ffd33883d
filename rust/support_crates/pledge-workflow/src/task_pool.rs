//! Background task pool with spill-over to dedicated threads.
//!
//! [`TaskPool`] keeps a fixed set of worker threads and dispatches each task to
//! a worker that is currently idle. When every worker is busy, the task is not
//! queued and not run on the caller's thread: it gets a freshly spawned thread
//! of its own. Promise executors routinely block waiting on other promises, so
//! queuing them behind busy workers (or running them inline) could deadlock or
//! serialize work that must run concurrently.
//!
//! # Execution Strategy
//!
//! 1. **Reserve**: pop an idle worker index
//! 2. **Dispatch**: send the task to that worker's private channel
//! 3. **Spill**: if no worker is idle, spawn a dedicated thread for the task
//!
//! A task that panics is caught at the worker boundary and logged. The worker
//! returns to the idle set and the task's [`JoinHandle`] reports an error.

use std::{
    panic::AssertUnwindSafe,
    sync::{
        Arc, Mutex, OnceLock,
        atomic::{AtomicUsize, Ordering},
        mpsc::{Receiver, SyncSender},
    },
    thread,
};

use crate::{completion, join_handle::JoinHandle};

/// A pool of worker threads for running blocking background tasks.
///
/// ## Global Pool
///
/// [`global()`](Self::global) returns a lazily created pool shared by the
/// whole process. Its size can be set once, before first use, with
/// [`configure_global_pool_size()`](Self::configure_global_pool_size).
///
/// ## Drop Behavior
///
/// Dropping a `TaskPool` asks the workers to exit once their current task is
/// done. Spill threads are never tracked and simply run to completion.
pub struct TaskPool(Arc<Workers>);

type WorkItem = Box<dyn FnOnce() + Send + 'static>;

impl TaskPool {
    /// Creates a pool with `num_threads` workers.
    ///
    /// # Panics
    ///
    /// Panics if `num_threads` is 0.
    pub fn new(num_threads: usize) -> TaskPool {
        Self::with_thread_name(num_threads, |i| format!("pledge-worker-{i}"))
    }

    /// Creates a pool with `num_threads` workers, named by `thread_name`.
    ///
    /// An empty name leaves the worker unnamed.
    ///
    /// # Panics
    ///
    /// Panics if `num_threads` is 0 or a worker thread cannot be spawned.
    pub fn with_thread_name(num_threads: usize, thread_name: impl Fn(usize) -> String) -> TaskPool {
        assert_ne!(num_threads, 0);
        TaskPool(Workers::new(num_threads, thread_name))
    }

    /// Configures the size of the global pool.
    ///
    /// Only effective when called before the first [`global()`](Self::global).
    /// Values less than 1 are clamped to 1.
    pub fn configure_global_pool_size(pool_size: usize) {
        let pool_size = pool_size.max(1);
        GLOBAL_POOL_SIZE.store(pool_size, Ordering::SeqCst);
    }

    /// Returns the process-wide pool, creating it on first use.
    ///
    /// The pool size is, in order of preference:
    /// 1. the value set by [`configure_global_pool_size()`](Self::configure_global_pool_size)
    /// 2. `ceil(available_parallelism * 1.5)`
    /// 3. 8, if the parallelism cannot be determined
    pub fn global() -> &'static TaskPool {
        static POOL: OnceLock<TaskPool> = OnceLock::new();
        POOL.get_or_init(|| TaskPool::new(Self::get_global_pool_size()))
    }

    /// Runs `f` in the background and returns a handle to its result.
    pub fn spawn<F, R>(&self, f: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (completer, completion) = completion::channel::<R>();
        self.spawn_detached(move || {
            let _ = completer.complete(f());
        });
        JoinHandle::new(completion)
    }

    /// Runs `f` in the background without a way to observe its completion.
    pub fn spawn_detached<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let work: WorkItem = Box::new(f);
        match self.0.try_reserve() {
            Some(index) => self.0.dispatch(index, work),
            None => self.0.spill(work),
        }
    }

    /// Number of worker threads owned by the pool.
    pub fn num_threads(&self) -> usize {
        self.0.threads.len()
    }

    fn get_global_pool_size() -> usize {
        let size = GLOBAL_POOL_SIZE.load(Ordering::SeqCst);
        if size == 0 {
            std::thread::available_parallelism()
                .map(|n| (n.get() * 3).div_ceil(2))
                .unwrap_or(8)
        } else {
            size
        }
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.0.stop();
    }
}

impl std::fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPool")
            .field("num_threads", &self.num_threads())
            .field("spawned", &self.0.spawn_counter.load(Ordering::Relaxed))
            .field("spilled", &self.0.spill_counter.load(Ordering::Relaxed))
            .finish()
    }
}

static GLOBAL_POOL_SIZE: AtomicUsize = AtomicUsize::new(0);

struct Workers {
    threads: Vec<Worker>,
    idle: Mutex<Vec<usize>>,
    spawn_counter: AtomicUsize,
    spill_counter: AtomicUsize,
}

impl Workers {
    fn new(num_threads: usize, thread_name: impl Fn(usize) -> String) -> Arc<Workers> {
        let (threads, channels) = (0..num_threads)
            .map(|_| Worker::new())
            .unzip::<_, _, Vec<_>, Vec<_>>();
        let this = Arc::new(Workers {
            threads,
            idle: Mutex::new((0..num_threads).rev().collect()),
            spawn_counter: AtomicUsize::new(0),
            spill_counter: AtomicUsize::new(0),
        });
        channels.into_iter().enumerate().for_each(|(i, rx)| {
            let this = this.clone();
            let mut builder = thread::Builder::new();
            let name = thread_name(i);
            if !name.is_empty() {
                builder = builder.name(name);
            }
            builder
                .spawn(move || Self::thread_fn(this, i, rx))
                .expect("spawn worker thread");
        });
        this
    }

    fn try_reserve(&self) -> Option<usize> {
        self.idle.lock().unwrap().pop()
    }

    fn release(&self, index: usize) {
        self.idle.lock().unwrap().push(index);
    }

    fn dispatch(&self, reserved_index: usize, work: WorkItem) {
        self.spawn_counter.fetch_add(1, Ordering::Relaxed);
        if let Err(err) = self.threads[reserved_index].tx.send(Message::Work(work)) {
            // The worker is gone (pool stopped); run the task elsewhere.
            let Message::Work(work) = err.0 else {
                return;
            };
            self.spill(work);
        }
    }

    fn spill(&self, work: WorkItem) {
        let spilled = self.spill_counter.fetch_add(1, Ordering::Relaxed) + 1;
        log::debug!("all pool workers busy, spilling task #{spilled} to a dedicated thread");
        let spawned = thread::Builder::new()
            .name("pledge-spill".to_string())
            .spawn(move || run_guarded(work));
        if let Err(e) = spawned {
            log::error!("failed to spawn spill thread: {e}");
        }
    }

    fn stop(&self) {
        self.threads.iter().for_each(|t| {
            let _ = t.tx.send(Message::Stop);
        });
    }

    fn thread_fn(workers: Arc<Workers>, index: usize, rx: Receiver<Message>) {
        while let Ok(msg) = rx.recv() {
            match msg {
                Message::Work(f) => {
                    run_guarded(f);
                    workers.release(index);
                }
                Message::Stop => return,
            }
        }
    }
}

fn run_guarded(work: WorkItem) {
    if std::panic::catch_unwind(AssertUnwindSafe(work)).is_err() {
        log::error!(
            "background task panicked on thread {:?}",
            thread::current().name().unwrap_or("<unnamed>")
        );
    }
}

struct Worker {
    tx: SyncSender<Message>,
}

impl Worker {
    fn new() -> (Worker, Receiver<Message>) {
        let (tx, rx) = std::sync::mpsc::sync_channel::<Message>(4);
        (Worker { tx }, rx)
    }
}

enum Message {
    Work(WorkItem),
    Stop,
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::{Duration, Instant},
    };

    use super::TaskPool;

    #[test]
    #[should_panic]
    fn test_new_task_pool_zero_threads() {
        TaskPool::new(0);
    }

    #[test]
    fn test_spawn_runs_off_caller_thread() {
        let pool = TaskPool::new(2);
        let current_id = std::thread::current().id();
        let worker_id = pool.spawn(|| std::thread::current().id()).join().unwrap();
        assert_ne!(current_id, worker_id);
        assert_eq!(pool.0.spawn_counter.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_saturated_pool_spills_instead_of_inlining() {
        let pool = TaskPool::new(2);
        let start = Instant::now();
        let sleep = Duration::from_millis(60);
        let handles = (0..6)
            .map(|_| pool.spawn(move || std::thread::sleep(sleep)))
            .collect::<Vec<_>>();
        // Spawning must not have blocked on any of the sleeping tasks.
        assert!(start.elapsed() < sleep);

        let current_id = std::thread::current().id();
        let extra_id = pool.spawn(|| std::thread::current().id()).join().unwrap();
        assert_ne!(extra_id, current_id);

        assert!(handles.into_iter().all(|h| h.join().is_ok()));
        assert!(start.elapsed() < sleep * 4);
        assert!(pool.0.spill_counter.load(Ordering::Relaxed) >= 4);
        assert!(format!("{pool:?}").contains("spilled"));
    }

    #[test]
    fn test_blocking_tasks_can_wait_on_each_other() {
        let pool = Arc::new(TaskPool::new(1));
        let inner_pool = pool.clone();
        let handle = pool.spawn(move || {
            let inner = inner_pool.spawn(|| 100);
            inner.join().unwrap() + 50
        });
        assert_eq!(handle.join(), Ok(150));
    }

    #[test]
    fn test_panicking_task_keeps_worker_alive() {
        let pool = TaskPool::new(1);
        let handle = pool.spawn(|| -> u32 { panic!("task failure") });
        assert!(handle.join().is_err());

        let counter = Arc::new(AtomicUsize::new(0));
        let handles = (0..10)
            .map(|_| {
                let counter = counter.clone();
                pool.spawn(move || counter.fetch_add(1, Ordering::SeqCst))
            })
            .collect::<Vec<_>>();
        handles.into_iter().for_each(|h| {
            let _ = h.join();
        });
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_spawn_detached() {
        let pool = TaskPool::new(2);
        let (tx, rx) = std::sync::mpsc::channel();
        for i in 0..8 {
            let tx = tx.clone();
            pool.spawn_detached(move || {
                let _ = tx.send(i);
            });
        }
        drop(tx);
        let mut received = rx.iter().collect::<Vec<_>>();
        received.sort();
        assert_eq!(received, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_global_task_pool() {
        let global1 = TaskPool::global();
        let global2 = TaskPool::global();
        assert!(std::ptr::eq(global1, global2));
        assert!(global1.num_threads() >= 1);
        assert_eq!(global1.spawn(|| "global task").join(), Ok("global task"));
    }
}
