//! Lazy, memoized, thread-safe promises.
//!
//! A [`Promise<V>`] is a handle to a computation that eventually settles with
//! either a value of type `V` or an [`Error`]. The computation (the
//! *executor*) starts on the first [`Promise::wait`], runs on a background
//! task, and its outcome is cached so later waits return immediately.
//! [`Promise::reset`] clears the cache and makes the next wait run the executor
//! again.
//!
//! # Building blocks
//!
//! - Constructors: [`Promise::new`], [`resolve`], [`reject`], [`from_fn`],
//!   [`eager`]
//! - Chaining: [`Promise::then`], [`Promise::catch`], [`Promise::finally`],
//!   [`Promise::with`] and the [`chain!`] macro over [`stage`] functions
//! - Resilience: [`Promise::with_timeout`], [`Promise::with_retry`],
//!   [`Promise::with_retry_policy`], [`Promise::eager`]
//! - Combinators: [`all`], [`all_ordered`], [`all_settled`], [`any`], [`race`]
//!   and their [`Promises`] method forms
//! - Type erasure: [`AnyValue`], [`Promise::erase`], [`Promise::downcast`],
//!   [`await_as`]
//!
//! ```
//! use pledge::{Error, all, from_fn, reject};
//!
//! let parsed = from_fn(|| "42".parse::<i32>().map_err(Error::from_source));
//! let doubled = parsed.then(|v| Ok(v * 2));
//! assert_eq!(doubled.wait().unwrap(), 84);
//!
//! let batch = all(vec![doubled, reject("no luck")]);
//! assert_eq!(batch.wait().unwrap_err().to_string(), "no luck");
//! ```
//!
//! # Execution model
//!
//! Executors and combinator fan-out tasks run on the process-wide
//! [`TaskPool`]. The pool never queues work behind a busy worker, so an
//! executor may freely block on other promises. The pool size can be set once,
//! before first use, with [`TaskPool::configure_global_pool_size`].

pub mod chaining;
pub mod combinators;
pub mod constructors;
pub mod erased;
pub mod error;
pub mod promise;
pub mod resilience;
pub mod settlement;
pub mod stage;

pub use combinators::{Promises, all, all_ordered, all_settled, any, race};
pub use constructors::{eager, from_fn, reject, resolve};
pub use erased::{AnyValue, await_as};
pub use error::{AggregateError, Error, ErrorKind, Result, StdErrorShared};
pub use pledge_workflow::task_pool::TaskPool;
pub use promise::{Promise, Settler};
pub use resilience::RetryPolicy;
pub use settlement::{Settlement, SettlementBatch};
