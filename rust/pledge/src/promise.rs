//! The deferred value at the heart of the crate.
//!
//! A [`Promise<V>`] pairs an executor with a settlement cache. The executor is
//! a reusable function that receives a [`Settler<V>`] and must complete it
//! exactly once, either by resolving with a value or rejecting with an error.
//!
//! ## Execution and memoization
//!
//! Nothing runs until the first [`wait`](Promise::wait). That call takes the
//! promise's guard, finds the cache empty, launches the executor on a
//! background task and blocks until the settler is completed. The outcome is
//! stored before the guard is released, so callers arriving concurrently block
//! on the guard and then read the cached outcome. The executor therefore runs
//! at most once between creation and the next [`reset`](Promise::reset).
//!
//! ## Sharing
//!
//! `Promise` is a handle: clones share the executor and the cache. Derived
//! promises (chaining, resilience wrappers, combinators) keep a clone of their
//! upstream and wait on it inside their own executor.

use std::{
    cell::RefCell,
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, TryLockError,
        atomic::{AtomicBool, Ordering},
    },
};

use pledge_workflow::{
    completion::{self, Completer},
    task_pool::TaskPool,
};

use crate::error::{Error, Result};

type Executor<V> = Arc<dyn Fn(Settler<V>) + Send + Sync + 'static>;

thread_local! {
    /// Promises whose executor is running on this thread, innermost last.
    static EXECUTING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Marks a promise as executing on the current thread for its lifetime.
struct ExecutingGuard;

impl ExecutingGuard {
    fn enter(key: usize) -> ExecutingGuard {
        EXECUTING.with(|keys| keys.borrow_mut().push(key));
        ExecutingGuard
    }

    fn contains(key: usize) -> bool {
        EXECUTING.with(|keys| keys.borrow().contains(&key))
    }
}

impl Drop for ExecutingGuard {
    fn drop(&mut self) {
        EXECUTING.with(|keys| keys.borrow_mut().pop());
    }
}

/// Completion handle passed to a promise executor.
///
/// Only the first completion counts. Clones can be handed to callbacks or
/// other threads; once any of them has settled, the rest report `false` and
/// their outcome is discarded. If every clone is dropped without settling, the
/// promise rejects with [`ErrorKind::Abandoned`](crate::ErrorKind::Abandoned).
pub struct Settler<V>(Completer<Result<V>>);

impl<V> Settler<V> {
    /// Resolves the promise with `value`. Returns `false` if it was already settled.
    pub fn resolve(&self, value: V) -> bool {
        self.settle(Ok(value))
    }

    /// Rejects the promise with `error`. Returns `false` if it was already settled.
    pub fn reject(&self, error: impl Into<Error>) -> bool {
        self.settle(Err(error.into()))
    }

    /// Settles the promise with `outcome`. Returns `false` if it was already settled.
    pub fn settle(&self, outcome: Result<V>) -> bool {
        match self.0.complete(outcome) {
            Ok(()) => true,
            Err(_) => {
                log::trace!("ignoring repeated settlement");
                false
            }
        }
    }

    /// Returns `true` until the promise has been settled.
    pub fn is_pending(&self) -> bool {
        self.0.is_open()
    }
}

impl<V> Clone for Settler<V> {
    fn clone(&self) -> Self {
        Settler(self.0.clone())
    }
}

/// A handle to a computation that yields a `V` (or an [`Error`]).
pub struct Promise<V>(Arc<Inner<V>>);

struct Inner<V> {
    executor: Executor<V>,
    state: Mutex<Option<Result<V>>>,
    /// Mirrors `state.is_some()`; only written while `state` is locked.
    settled: AtomicBool,
}

impl<V> Clone for Promise<V> {
    fn clone(&self) -> Self {
        Promise(self.0.clone())
    }
}

impl<V: Clone + Send + 'static> Promise<V> {
    /// Creates a pending promise around `executor`.
    ///
    /// The executor is not invoked until the promise is first waited on. It may
    /// be invoked again after [`reset`](Self::reset), so it must be `Fn`.
    ///
    /// The first `wait` holds the promise's guard until the executor settles,
    /// so the executor must not `wait` on or `reset` the promise it is
    /// settling. Called directly from the executor's own thread, `wait` rejects
    /// with [`ErrorKind::InvalidArgument`](crate::ErrorKind::InvalidArgument)
    /// and `reset` is ignored; from any other thread the executor hands work
    /// to, either call blocks forever.
    pub fn new<F>(executor: F) -> Promise<V>
    where
        F: Fn(Settler<V>) + Send + Sync + 'static,
    {
        Promise(Arc::new(Inner {
            executor: Arc::new(executor),
            state: Mutex::new(None),
            settled: AtomicBool::new(false),
        }))
    }

    /// Creates a promise that is already settled with `outcome`.
    ///
    /// After a reset, `executor` runs as usual.
    pub(crate) fn settled<F>(outcome: Result<V>, executor: F) -> Promise<V>
    where
        F: Fn(Settler<V>) + Send + Sync + 'static,
    {
        Promise(Arc::new(Inner {
            executor: Arc::new(executor),
            state: Mutex::new(Some(outcome)),
            settled: AtomicBool::new(true),
        }))
    }

    /// Blocks until the promise is settled and returns the outcome.
    ///
    /// Safe to call from any number of threads. Only the first caller after
    /// creation (or after a reset) runs the executor; everyone else gets a
    /// clone of the cached outcome. If the executor keeps its settler alive
    /// without ever settling, this blocks forever; use
    /// [`with_timeout`](Self::with_timeout) to bound the wait.
    pub fn wait(&self) -> Result<V> {
        if ExecutingGuard::contains(self.key()) {
            log::error!("promise waited on from its own executor");
            return Err(Error::invalid_arg("promise", "waited on from its own executor"));
        }
        let mut state = self.lock_state();
        if let Some(outcome) = state.as_ref() {
            log::trace!("promise already settled, returning cached outcome");
            return outcome.clone();
        }
        let outcome = self.execute();
        *state = Some(outcome.clone());
        self.0.settled.store(true, Ordering::Release);
        outcome
    }

    /// Clears the cached outcome so the next `wait` runs the executor again.
    ///
    /// Blocks while another thread is in the middle of executing this promise.
    pub fn reset(&self) {
        if ExecutingGuard::contains(self.key()) {
            log::error!("promise reset from its own executor, ignoring");
            return;
        }
        let mut state = self.lock_state();
        if state.take().is_some() {
            self.0.settled.store(false, Ordering::Release);
            log::debug!("promise reset to pending");
        }
    }

    /// Returns `true` if an outcome is cached.
    ///
    /// Does not block, and is not affected by other threads reading the cache.
    /// A promise whose executor is currently running reports `false`.
    pub fn is_settled(&self) -> bool {
        self.0.settled.load(Ordering::Acquire)
    }

    /// Applies a pipeline stage to this promise.
    ///
    /// A stage is anything that turns a promise into another promise, which
    /// makes stages compose: `p.with(f1).with(f2)` is `f2(f1(p))`. See
    /// [`crate::stage`] for ready-made stages and [`chain!`](crate::chain) for
    /// the multi-stage form.
    pub fn with<W, S>(&self, stage: S) -> Promise<W>
    where
        S: FnOnce(Promise<V>) -> Promise<W>,
    {
        stage(self.clone())
    }

    fn execute(&self) -> Result<V> {
        let (completer, completion) = completion::channel();
        let settler = Settler(completer);
        let executor = self.0.executor.clone();
        let key = self.key();
        log::trace!("launching promise executor");
        TaskPool::global().spawn_detached(move || {
            let _executing = ExecutingGuard::enter(key);
            executor(settler)
        });
        completion.wait().completed().unwrap_or_else(|| {
            log::debug!("promise executor finished without settling");
            Err(Error::abandoned())
        })
    }

    fn key(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    fn lock_state(&self) -> MutexGuard<'_, Option<Result<V>>> {
        self.0.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V> fmt::Debug for Promise<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.0.settled.load(Ordering::Acquire) {
            "settled"
        } else {
            match self.0.state.try_lock() {
                Ok(_) => "pending",
                Err(TryLockError::WouldBlock) => "running",
                Err(TryLockError::Poisoned(_)) => "poisoned",
            }
        };
        f.debug_struct("Promise").field("state", &state).finish()
    }
}
