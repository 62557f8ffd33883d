//! Timeout, retry and eager-start wrappers.
//!
//! None of these can stop an executor that is already running. A timed-out
//! promise only stops *waiting*: the upstream computation keeps going on its
//! background task and its eventual outcome is dropped (or cached in the
//! upstream promise, if anyone still holds it).

use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use pledge_workflow::task_pool::TaskPool;

use crate::{
    error::{Error, Result},
    promise::Promise,
};

impl<V: Clone + Send + 'static> Promise<V> {
    /// Rejects with [`ErrorKind::Timeout`](crate::ErrorKind::Timeout) if the
    /// upstream promise has not settled within `timeout`.
    ///
    /// When the upstream settles first, its outcome is passed through
    /// verbatim. An upstream that is already settled when the wrapper runs
    /// always passes through, even with a zero `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Promise<V> {
        let upstream = self.clone();
        Promise::new(move |settler| {
            if upstream.is_settled() {
                settler.settle(upstream.wait());
                return;
            }
            let waiter = upstream.clone();
            let handle = TaskPool::global().spawn(move || waiter.wait());
            let joined = match handle.join_timeout(timeout) {
                Ok(joined) => joined,
                // Settlement may have landed just as the deadline passed.
                Err(handle) => match handle.try_join() {
                    Ok(joined) => joined,
                    Err(_) => {
                        log::debug!("promise timed out after {timeout:?}, abandoning the wait");
                        settler.reject(Error::timeout(timeout));
                        return;
                    }
                },
            };
            settler.settle(joined.unwrap_or_else(|_| Err(Error::abandoned())));
        })
    }

    /// Retries the upstream promise in place until it resolves.
    ///
    /// Each failed attempt resets the upstream promise, so the same executor
    /// runs again; it runs at most `max_retries + 1` times. A negative budget
    /// rejects right away without touching the upstream. When every attempt
    /// fails the promise rejects with
    /// [`ErrorKind::RetryExhausted`](crate::ErrorKind::RetryExhausted), whose
    /// source is the last upstream error.
    pub fn with_retry(&self, max_retries: i32) -> Promise<V> {
        self.with_retry_policy(RetryPolicy::new(max_retries))
    }

    /// Like [`with_retry`](Self::with_retry), pausing between attempts as
    /// configured by `policy`.
    pub fn with_retry_policy(&self, policy: RetryPolicy) -> Promise<V> {
        let upstream = self.clone();
        Promise::new(move |settler| {
            settler.settle(policy.run(&upstream));
        })
    }

    /// Starts the upstream computation now instead of on first `wait`.
    ///
    /// The upstream is waited on by a background task right away; the returned
    /// promise picks up that delivery the first time it is waited on. After a
    /// reset the delivery is gone, and the executor waits on the upstream
    /// directly (which returns its cached outcome unless it was reset too).
    pub fn eager(&self) -> Promise<V> {
        let waiter = self.clone();
        let delivery = Mutex::new(Some(TaskPool::global().spawn(move || waiter.wait())));
        let upstream = self.clone();
        Promise::new(move |settler| {
            let handle = delivery
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            let outcome = match handle {
                Some(handle) => handle.join().unwrap_or_else(|_| Err(Error::abandoned())),
                None => upstream.wait(),
            };
            settler.settle(outcome);
        })
    }
}

/// How a retrying promise paces its attempts.
///
/// ```
/// use std::time::Duration;
/// use pledge::RetryPolicy;
///
/// let policy = RetryPolicy::new(3)
///     .with_delay(Duration::from_millis(10))
///     .with_jitter(Duration::from_millis(5));
/// assert_eq!(policy.max_attempts(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: i32,
    delay: Duration,
    jitter: Duration,
}

impl RetryPolicy {
    /// Up to `max_retries` retries after the first attempt, with no pause.
    pub fn new(max_retries: i32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// Fixed pause before every retry.
    pub fn with_delay(mut self, delay: Duration) -> RetryPolicy {
        self.delay = delay;
        self
    }

    /// Extra random pause, uniform in `0..=jitter`, added to the delay.
    pub fn with_jitter(mut self, jitter: Duration) -> RetryPolicy {
        self.jitter = jitter;
        self
    }

    pub fn max_retries(&self) -> i32 {
        self.max_retries
    }

    /// Total number of attempts allowed, counting the first one.
    pub fn max_attempts(&self) -> u32 {
        u32::try_from(self.max_retries).map_or(0, |retries| retries + 1)
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn jitter(&self) -> Duration {
        self.jitter
    }

    fn run<V: Clone + Send + 'static>(&self, upstream: &Promise<V>) -> Result<V> {
        let max_attempts = self.max_attempts();
        if max_attempts == 0 {
            return Err(Error::retry_exhausted(0, None));
        }

        let mut attempt = 1;
        loop {
            match upstream.wait() {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= max_attempts => {
                    log::warn!("giving up after {attempt} attempt(s): {e}");
                    return Err(Error::retry_exhausted(attempt, Some(e)));
                }
                Err(e) => {
                    log::debug!("attempt {attempt}/{max_attempts} failed, retrying: {e}");
                    upstream.reset();
                    self.pause();
                    attempt += 1;
                }
            }
        }
    }

    fn pause(&self) {
        let jitter = if self.jitter.is_zero() {
            Duration::ZERO
        } else {
            let max_nanos = u64::try_from(self.jitter.as_nanos()).unwrap_or(u64::MAX);
            Duration::from_nanos(fastrand::u64(0..=max_nanos))
        };
        let pause = self.delay + jitter;
        if !pause.is_zero() {
            std::thread::sleep(pause);
        }
    }
}
