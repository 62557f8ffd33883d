//! Ways to build a promise without writing an executor by hand.

use crate::{
    error::{Error, Result},
    promise::Promise,
};

/// A promise that is already resolved with `value`.
pub fn resolve<V>(value: V) -> Promise<V>
where
    V: Clone + Send + Sync + 'static,
{
    Promise::settled(Ok(value.clone()), move |settler| {
        settler.resolve(value.clone());
    })
}

/// A promise that is already rejected with `error`.
pub fn reject<V>(error: impl Into<Error>) -> Promise<V>
where
    V: Clone + Send + 'static,
{
    let error = error.into();
    Promise::settled(Err(error.clone()), move |settler| {
        settler.reject(error.clone());
    })
}

/// A lazy promise settled by calling `f`.
///
/// `f` runs on a background task on the first `wait` (and again after each
/// reset); its `Ok` value resolves the promise, its `Err` rejects it.
pub fn from_fn<V, F>(f: F) -> Promise<V>
where
    V: Clone + Send + 'static,
    F: Fn() -> Result<V> + Send + Sync + 'static,
{
    Promise::new(move |settler| {
        settler.settle(f());
    })
}

/// Starts `promise` in the background right away; see [`Promise::eager`].
pub fn eager<V>(promise: &Promise<V>) -> Promise<V>
where
    V: Clone + Send + 'static,
{
    promise.eager()
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::{eager, from_fn, reject, resolve};
    use crate::error::Error;

    #[test]
    fn test_resolve_is_pre_settled() {
        let promise = resolve(10);
        assert!(promise.is_settled());
        assert_eq!(promise.wait().unwrap(), 10);

        promise.reset();
        assert!(!promise.is_settled());
        assert_eq!(promise.wait().unwrap(), 10);
    }

    #[test]
    fn test_reject_is_pre_settled() {
        let failure = Error::msg("error");
        let promise = reject::<u8>(failure.clone());
        assert!(promise.is_settled());
        assert!(promise.wait().unwrap_err().ptr_eq(&failure));

        promise.reset();
        assert!(promise.wait().unwrap_err().ptr_eq(&failure));
    }

    #[test]
    fn test_from_fn_value_and_error() {
        assert_eq!(from_fn(|| Ok(10)).wait().unwrap(), 10);

        let err = from_fn::<i32, _>(|| Err(Error::msg("error"))).wait().unwrap_err();
        assert_eq!(err.to_string(), "error");
    }

    #[test]
    fn test_eager_starts_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let promise = {
            let calls = calls.clone();
            eager(&from_fn(move || Ok(calls.fetch_add(1, Ordering::SeqCst))))
        };
        let start = std::time::Instant::now();
        while calls.load(Ordering::SeqCst) == 0 {
            assert!(start.elapsed() < std::time::Duration::from_secs(5));
            std::thread::yield_now();
        }
        assert_eq!(promise.wait().unwrap(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_from_fn_is_lazy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let promise = {
            let calls = calls.clone();
            from_fn(move || Ok(calls.fetch_add(1, Ordering::SeqCst)))
        };
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        promise.wait().unwrap();
        promise.wait().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
