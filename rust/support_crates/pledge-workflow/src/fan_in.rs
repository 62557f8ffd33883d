//! Counted fan-in channel: many producers, one consumer.
//!
//! Used to gather the results of N concurrently running tasks into one place.
//! The number of live [`Sender`]s is the completion counter: every clone is an
//! outstanding producer, and dropping one marks it as finished. The channel is
//! closed under the same lock as the final decrement, so a consumer can only
//! observe "closed" after every producer has either delivered its item or gone
//! away. Buffered items are always handed out before the close is reported.
//!
//! The buffer is unbounded, so a producer never blocks on a slow or absent
//! consumer. When the consumer stops early it can either drop the [`Receiver`]
//! (later sends fail and return the item) or hand it to
//! [`Receiver::drain_detached`], which discards the stragglers on a background
//! task.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Condvar, Mutex,
        mpsc::{RecvError, SendError},
    },
};

use crate::task_pool::TaskPool;

/// Creates a fan-in channel with one registered producer.
///
/// Clone the [`Sender`] once per producer task and drop the original once all
/// clones are handed out; the channel closes when the last clone is dropped.
pub fn channel<T>() -> (Sender<T>, Receiver<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            queue: VecDeque::new(),
            producers: 1,
            receiver_alive: true,
        }),
        not_empty: Condvar::new(),
    });
    (Sender(shared.clone()), Receiver(shared))
}

/// A producer handle. Each live clone counts as one outstanding producer.
pub struct Sender<T>(Arc<Shared<T>>);

impl<T> Sender<T> {
    /// Delivers `item` to the consumer.
    ///
    /// Fails, returning the item, only when the receiver has been dropped.
    pub fn send(&self, item: T) -> Result<(), SendError<T>> {
        let mut state = self.0.state.lock().unwrap();
        if !state.receiver_alive {
            return Err(SendError(item));
        }
        state.queue.push_back(item);
        drop(state);
        self.0.not_empty.notify_one();
        Ok(())
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        let mut state = self.0.state.lock().unwrap();
        assert_ne!(state.producers, 0, "fan-in channel is already closed");
        state.producers += 1;
        drop(state);
        Sender(self.0.clone())
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        let mut state = self.0.state.lock().unwrap();
        state.producers -= 1;
        if state.producers == 0 {
            drop(state);
            self.0.not_empty.notify_all();
        }
    }
}

/// The consuming half of the channel.
pub struct Receiver<T>(Arc<Shared<T>>);

impl<T> Receiver<T> {
    /// Blocks until an item is available.
    ///
    /// Returns `Err(RecvError)` once the buffer is empty and every producer has
    /// been dropped.
    pub fn recv(&self) -> Result<T, RecvError> {
        let guard = self.0.state.lock().unwrap();
        let mut state = self
            .0
            .not_empty
            .wait_while(guard, |state| state.queue.is_empty() && state.producers != 0)
            .unwrap();
        state.queue.pop_front().ok_or(RecvError)
    }

    /// Returns a blocking iterator that ends when the channel closes.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter { rx: self }
    }

    /// Consumes and discards every remaining item on a background task.
    ///
    /// The drain task keeps the channel open, so producers that are still
    /// running deliver into a live buffer instead of failing.
    pub fn drain_detached(self, pool: &TaskPool)
    where
        T: Send + 'static,
    {
        pool.spawn_detached(move || {
            let discarded = self.iter().count();
            if discarded > 0 {
                log::debug!("fan-in drain discarded {discarded} late result(s)");
            }
        });
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        let mut state = self.0.state.lock().unwrap();
        state.receiver_alive = false;
        state.queue.clear();
    }
}

/// Blocking iterator over a [`Receiver`].
pub struct Iter<'a, T> {
    rx: &'a Receiver<T>,
}

impl<T> Iterator for Iter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.rx.recv().ok()
    }
}

/// Owning blocking iterator over a [`Receiver`].
pub struct IntoIter<T> {
    rx: Receiver<T>,
}

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.rx.recv().ok()
    }
}

impl<T> IntoIterator for Receiver<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> IntoIter<T> {
        IntoIter { rx: self }
    }
}

struct Shared<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
}

struct State<T> {
    queue: VecDeque<T>,
    producers: usize,
    receiver_alive: bool,
}

#[cfg(test)]
mod tests {
    use std::{sync::mpsc::RecvError, time::Duration};

    use super::channel;
    use crate::task_pool::TaskPool;

    #[test]
    fn test_closes_after_last_producer() {
        let (tx, rx) = channel::<usize>();
        let producers = (0..4).map(|_| tx.clone()).collect::<Vec<_>>();
        drop(tx);

        for (i, producer) in producers.into_iter().enumerate() {
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(5 * i as u64));
                producer.send(i).unwrap();
            });
        }

        let mut received = rx.iter().collect::<Vec<_>>();
        received.sort();
        assert_eq!(received, vec![0, 1, 2, 3]);
        assert_eq!(rx.recv(), Err(RecvError));
    }

    #[test]
    fn test_buffered_items_survive_close() {
        let (tx, rx) = channel::<&str>();
        tx.send("a").unwrap();
        tx.send("b").unwrap();
        drop(tx);
        assert_eq!(rx.recv(), Ok("a"));
        assert_eq!(rx.recv(), Ok("b"));
        assert_eq!(rx.recv(), Err(RecvError));
    }

    #[test]
    fn test_empty_fan_out_is_closed_immediately() {
        let (tx, rx) = channel::<u8>();
        drop(tx);
        assert_eq!(rx.into_iter().count(), 0);
    }

    #[test]
    fn test_send_after_receiver_drop_fails() {
        let (tx, rx) = channel::<u8>();
        assert!(tx.send(0).is_ok());
        drop(rx);
        assert_eq!(tx.send(1).map_err(|e| e.0), Err(1));
    }

    #[test]
    fn test_drain_detached_consumes_late_items() {
        let pool = TaskPool::new(2);
        let (tx, rx) = channel::<u32>();
        let late = tx.clone();
        drop(tx);
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            let _ = done_tx.send(late.send(9).is_ok());
        });
        rx.drain_detached(&pool);
        assert_eq!(done_rx.recv(), Ok(true));
    }
}
