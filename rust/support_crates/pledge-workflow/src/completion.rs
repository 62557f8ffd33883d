//! Settle-once completion slot shared between one waiter and any number of
//! completers.
//!
//! A [`Completer`] can be cloned and handed to callbacks or other threads.
//! The first [`Completer::complete`] seals the slot and wakes the waiter; every
//! later attempt is refused and gets its value back. If the last completer is
//! dropped before anyone completed, the slot seals as abandoned and the waiter
//! sees [`Outcome::Abandoned`] instead of blocking forever.
//!
//! The waiting half, [`Completion`], is consumed by a successful wait. The
//! bounded and non-blocking waits hand the `Completion` back while the slot is
//! still open, so there is never more than one taker of the value.

use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

/// Creates an open slot with one registered completer.
pub fn channel<T>() -> (Completer<T>, Completion<T>) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(Slot {
            value: None,
            completers: 1,
            sealed: false,
        }),
        sealed: Condvar::new(),
    });
    (Completer(shared.clone()), Completion(shared))
}

/// How a slot was sealed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Completed(T),
    /// Every completer was dropped without completing.
    Abandoned,
}

impl<T> Outcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            Outcome::Completed(value) => Some(value),
            Outcome::Abandoned => None,
        }
    }
}

/// The completing side. Each live clone keeps the slot from being abandoned.
pub struct Completer<T>(Arc<Shared<T>>);

impl<T> Completer<T> {
    /// Seals the slot with `value`.
    ///
    /// Returns `Err(value)` if the slot was already sealed.
    pub fn complete(&self, value: T) -> Result<(), T> {
        let mut slot = self.0.lock();
        if slot.sealed {
            return Err(value);
        }
        slot.value = Some(value);
        slot.sealed = true;
        drop(slot);
        self.0.sealed.notify_all();
        Ok(())
    }

    /// Returns `true` until the slot is sealed.
    pub fn is_open(&self) -> bool {
        !self.0.lock().sealed
    }
}

impl<T> Clone for Completer<T> {
    fn clone(&self) -> Self {
        self.0.lock().completers += 1;
        Completer(self.0.clone())
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        let mut slot = self.0.lock();
        slot.completers -= 1;
        if slot.completers == 0 && !slot.sealed {
            slot.sealed = true;
            drop(slot);
            self.0.sealed.notify_all();
        }
    }
}

/// The waiting side.
pub struct Completion<T>(Arc<Shared<T>>);

impl<T> Completion<T> {
    /// Blocks until the slot is sealed.
    pub fn wait(self) -> Outcome<T> {
        let slot = self.0.lock();
        let mut slot = self
            .0
            .sealed
            .wait_while(slot, |slot| !slot.sealed)
            .unwrap_or_else(PoisonError::into_inner);
        slot.take()
    }

    /// Waits at most `timeout`; hands `self` back if the slot is still open.
    pub fn wait_timeout(self, timeout: Duration) -> Result<Outcome<T>, Completion<T>> {
        let slot = self.0.lock();
        let (mut slot, _) = self
            .0
            .sealed
            .wait_timeout_while(slot, timeout, |slot| !slot.sealed)
            .unwrap_or_else(PoisonError::into_inner);
        if slot.sealed {
            let outcome = slot.take();
            drop(slot);
            Ok(outcome)
        } else {
            drop(slot);
            Err(self)
        }
    }

    /// Takes the outcome if the slot is already sealed, without blocking.
    pub fn poll(self) -> Result<Outcome<T>, Completion<T>> {
        let mut slot = self.0.lock();
        if slot.sealed {
            let outcome = slot.take();
            drop(slot);
            Ok(outcome)
        } else {
            drop(slot);
            Err(self)
        }
    }

    /// Returns `true` until the slot is sealed.
    pub fn is_open(&self) -> bool {
        !self.0.lock().sealed
    }
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    sealed: Condvar,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// `sealed` flips exactly once. A sealed slot without a value was abandoned,
/// since the only taker is the consumed `Completion`.
struct Slot<T> {
    value: Option<T>,
    completers: usize,
    sealed: bool,
}

impl<T> Slot<T> {
    fn take(&mut self) -> Outcome<T> {
        self.value.take().map_or(Outcome::Abandoned, Outcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{Outcome, channel};

    #[test]
    fn test_completion_is_send_sync() {
        fn is_send_sync<T: Send + Sync>() {}
        is_send_sync::<super::Completer<std::cell::Cell<u8>>>();
        is_send_sync::<super::Completion<std::cell::Cell<u8>>>();
    }

    #[test]
    fn test_first_completion_wins() {
        let (completer, completion) = channel::<&str>();
        let other = completer.clone();
        assert_eq!(completer.complete("first"), Ok(()));
        assert_eq!(other.complete("second"), Err("second"));
        assert!(!other.is_open());
        assert_eq!(completion.wait(), Outcome::Completed("first"));
    }

    #[test]
    fn test_complete_from_other_thread() {
        let (completer, completion) = channel::<usize>();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            let _ = completer.complete(7);
        });
        assert_eq!(completion.wait().completed(), Some(7));
    }

    #[test]
    fn test_abandoned_after_last_completer_drops() {
        let (completer, completion) = channel::<usize>();
        let other = completer.clone();
        drop(completer);
        assert!(completion.is_open());
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            drop(other);
        });
        assert_eq!(completion.wait(), Outcome::Abandoned);
    }

    #[test]
    fn test_dropping_one_clone_keeps_slot_open() {
        let (completer, completion) = channel::<usize>();
        let late = completer.clone();
        drop(completer);
        drop(late.clone());
        assert!(late.is_open());
        assert_eq!(late.complete(1), Ok(()));
        drop(late);
        assert_eq!(completion.wait(), Outcome::Completed(1));
    }

    #[test]
    fn test_wait_timeout_hands_back_open_slot() {
        let (completer, completion) = channel::<usize>();
        let completion = completion
            .wait_timeout(Duration::from_millis(5))
            .expect_err("slot should still be open");
        let completion = completion.poll().expect_err("slot should still be open");
        completer.complete(3).unwrap();
        assert_eq!(completion.poll().ok(), Some(Outcome::Completed(3)));
    }

    #[test]
    fn test_wait_timeout_sees_sealed_slot() {
        let (completer, completion) = channel::<usize>();
        completer.complete(4).unwrap();
        assert_eq!(
            completion.wait_timeout(Duration::ZERO).ok(),
            Some(Outcome::Completed(4))
        );
    }
}
