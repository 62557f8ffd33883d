//! Pipeline stages.
//!
//! A stage is a function from one promise to another. The functions in this
//! module build stages out of the promise combinators so a pipeline can be
//! written as a list of steps:
//!
//! ```
//! use std::time::Duration;
//! use pledge::{chain, from_fn, stage};
//!
//! let promise = chain!(
//!     from_fn(|| Ok(20)),
//!     stage::then(|v: i32| Ok(v + 1)),
//!     stage::timeout(Duration::from_secs(5)),
//!     stage::then(|v: i32| Ok(v * 2)),
//! );
//! assert_eq!(promise.wait().unwrap(), 42);
//! ```

use std::time::Duration;

use crate::{
    error::{Error, Result},
    promise::Promise,
    resilience::RetryPolicy,
};

/// Stage form of [`Promise::then`].
pub fn then<V, W, F>(transform: F) -> impl FnOnce(Promise<V>) -> Promise<W>
where
    V: Clone + Send + 'static,
    W: Clone + Send + 'static,
    F: Fn(V) -> Result<W> + Send + Sync + 'static,
{
    move |promise| promise.then(transform)
}

/// Stage form of [`Promise::catch`].
pub fn catch<V, F>(recover: F) -> impl FnOnce(Promise<V>) -> Promise<V>
where
    V: Clone + Send + 'static,
    F: Fn(Error) -> V + Send + Sync + 'static,
{
    move |promise| promise.catch(recover)
}

/// Stage form of [`Promise::finally`].
pub fn finally<V, W, F>(f: F) -> impl FnOnce(Promise<V>) -> Promise<W>
where
    V: Clone + Send + 'static,
    W: Clone + Send + 'static,
    F: Fn(Result<V>) -> W + Send + Sync + 'static,
{
    move |promise| promise.finally(f)
}

/// Stage form of [`Promise::with_timeout`].
pub fn timeout<V>(duration: Duration) -> impl FnOnce(Promise<V>) -> Promise<V>
where
    V: Clone + Send + 'static,
{
    move |promise| promise.with_timeout(duration)
}

/// Stage form of [`Promise::with_retry`].
pub fn retry<V>(max_retries: i32) -> impl FnOnce(Promise<V>) -> Promise<V>
where
    V: Clone + Send + 'static,
{
    move |promise| promise.with_retry(max_retries)
}

/// Stage form of [`Promise::with_retry_policy`].
pub fn retry_policy<V>(policy: RetryPolicy) -> impl FnOnce(Promise<V>) -> Promise<V>
where
    V: Clone + Send + 'static,
{
    move |promise| promise.with_retry_policy(policy)
}

/// Stage form of [`Promise::eager`].
pub fn eager<V>() -> impl FnOnce(Promise<V>) -> Promise<V>
where
    V: Clone + Send + 'static,
{
    |promise| promise.eager()
}

/// Threads a promise through a list of stages, left to right.
///
/// `chain!(p, f1, f2, f3)` is `f3(f2(f1(p)))`.
#[macro_export]
macro_rules! chain {
    ($promise:expr $(, $stage:expr)* $(,)?) => {{
        let promise = $promise;
        $(
            let promise = $crate::Promise::with(&promise, $stage);
        )*
        promise
    }};
}
