//! Threading primitives the `pledge` promise library is built on.
//!
//! # Key Components
//!
//! ## Background Execution
//!
//! - [`task_pool::TaskPool`] - A pool of worker threads that never queues work
//!   behind a busy worker: when every worker is occupied the task gets a
//!   dedicated spill thread, so tasks that block on one another cannot starve
//!
//! ## Communication Channels
//!
//! - [`completion`] - Settle-once slot; the first completer wins, and dropping
//!   every completer seals it as abandoned
//! - [`fan_in`] - Many-producer, one-consumer channel whose producer count is
//!   its completion counter
//!
//! ## Task Management
//!
//! - [`join_handle`] - Handle for waiting on a spawned task, with timeout and
//!   non-blocking variants

pub mod completion;
pub mod fan_in;
pub mod join_handle;
pub mod task_pool;
