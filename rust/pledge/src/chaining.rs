//! `then`, `catch` and `finally`.
//!
//! Each combinator returns a new promise whose executor waits on the upstream
//! promise and decides what to do with its outcome. Nothing runs until the
//! derived promise is waited on.

use crate::{
    error::{Error, Result},
    promise::Promise,
};

impl<V: Clone + Send + 'static> Promise<V> {
    /// Transforms the resolved value.
    ///
    /// An upstream rejection is propagated untouched and `transform` is never
    /// called. Otherwise the promise settles with whatever `transform` returns.
    pub fn then<W, F>(&self, transform: F) -> Promise<W>
    where
        W: Clone + Send + 'static,
        F: Fn(V) -> Result<W> + Send + Sync + 'static,
    {
        let upstream = self.clone();
        Promise::new(move |settler| {
            match upstream.wait() {
                Ok(value) => settler.settle(transform(value)),
                Err(e) => settler.reject(e),
            };
        })
    }

    /// Recovers from a rejection.
    ///
    /// A rejection is turned into a value by `recover`; a resolved value passes
    /// through unchanged.
    pub fn catch<F>(&self, recover: F) -> Promise<V>
    where
        F: Fn(Error) -> V + Send + Sync + 'static,
    {
        let upstream = self.clone();
        Promise::new(move |settler| {
            let value = upstream.wait().unwrap_or_else(&recover);
            settler.resolve(value);
        })
    }

    /// Runs `f` on the upstream outcome, whatever it is.
    ///
    /// The derived promise always resolves with `f`'s return value, even when
    /// the upstream rejected.
    pub fn finally<W, F>(&self, f: F) -> Promise<W>
    where
        W: Clone + Send + 'static,
        F: Fn(Result<V>) -> W + Send + Sync + 'static,
    {
        let upstream = self.clone();
        Promise::new(move |settler| {
            settler.resolve(f(upstream.wait()));
        })
    }
}
