//! Combinators over collections of promises.
//!
//! Every combinator fans out one background task per member promise. Each task
//! waits on its member and reports the settlement into a shared fan-in
//! channel. The combinator's executor reads settlements in the order they
//! arrive and stops as soon as its completion policy is met:
//!
//! | combinator      | settles when                   | rejects with                   |
//! |-----------------|--------------------------------|--------------------------------|
//! | [`all_settled`] | every member has settled       | never                          |
//! | [`all`]         | every member resolved          | the first rejection observed   |
//! | [`any`]         | the first member resolves      | an aggregate of every error    |
//! | [`race`]        | the first member settles       | that member's error            |
//!
//! When a combinator stops early, the remaining members keep running; their
//! late settlements are drained and discarded on a background task.

use pledge_workflow::{fan_in, task_pool::TaskPool};

use crate::{
    erased::AnyValue,
    error::{AggregateError, Error},
    promise::Promise,
    settlement::{Settlement, SettlementBatch},
};

type Arrivals<V> = fan_in::Receiver<(usize, Settlement<V>)>;

/// Waits for every member and resolves with all settlements, in completion order.
pub fn all_settled<V>(promises: impl IntoIterator<Item = Promise<V>>) -> Promise<SettlementBatch<V>>
where
    V: Clone + Send + 'static,
{
    let members = promises.into_iter().collect::<Vec<_>>();
    Promise::new(move |settler| {
        let batch = fan_out(&members)
            .into_iter()
            .map(|(_, settlement)| settlement)
            .collect::<SettlementBatch<V>>();
        settler.resolve(batch);
    })
}

/// Resolves with every member's value, in completion order.
///
/// Rejects with the first rejection observed, without waiting for the other
/// members.
pub fn all<V>(promises: impl IntoIterator<Item = Promise<V>>) -> Promise<Vec<V>>
where
    V: Clone + Send + 'static,
{
    let members = promises.into_iter().collect::<Vec<_>>();
    Promise::new(move |settler| {
        let arrivals = fan_out(&members);
        let mut values = Vec::with_capacity(members.len());
        while let Ok((_, settlement)) = arrivals.recv() {
            match settlement.into_result() {
                Ok(value) => values.push(value),
                Err(e) => {
                    settler.reject(e);
                    arrivals.drain_detached(TaskPool::global());
                    return;
                }
            }
        }
        settler.resolve(values);
    })
}

/// Like [`all`], but the values come back in the order the promises were
/// given.
pub fn all_ordered<V>(promises: impl IntoIterator<Item = Promise<V>>) -> Promise<Vec<V>>
where
    V: Clone + Send + 'static,
{
    let members = promises.into_iter().collect::<Vec<_>>();
    Promise::new(move |settler| {
        let arrivals = fan_out(&members);
        let mut slots = vec![None; members.len()];
        while let Ok((index, settlement)) = arrivals.recv() {
            match settlement.into_result() {
                Ok(value) => slots[index] = Some(value),
                Err(e) => {
                    settler.reject(e);
                    arrivals.drain_detached(TaskPool::global());
                    return;
                }
            }
        }
        settler.resolve(slots.into_iter().flatten().collect());
    })
}

/// Resolves with the first member that resolves.
///
/// If every member rejects, rejects with an
/// [`AggregateError`] holding all the errors in completion order. An empty
/// collection rejects with an empty aggregate.
pub fn any<V>(promises: impl IntoIterator<Item = Promise<V>>) -> Promise<V>
where
    V: Clone + Send + 'static,
{
    let members = promises.into_iter().collect::<Vec<_>>();
    Promise::new(move |settler| {
        let arrivals = fan_out(&members);
        let mut errors = AggregateError::default();
        while let Ok((_, settlement)) = arrivals.recv() {
            match settlement.into_result() {
                Ok(value) => {
                    settler.resolve(value);
                    arrivals.drain_detached(TaskPool::global());
                    return;
                }
                Err(e) => errors.push(e),
            }
        }
        settler.reject(errors);
    })
}

/// Settles like the first member to settle, resolved or rejected.
///
/// An empty collection rejects with
/// [`ErrorKind::InvalidArgument`](crate::ErrorKind::InvalidArgument).
pub fn race<V>(promises: impl IntoIterator<Item = Promise<V>>) -> Promise<V>
where
    V: Clone + Send + 'static,
{
    let members = promises.into_iter().collect::<Vec<_>>();
    Promise::new(move |settler| {
        if members.is_empty() {
            settler.reject(Error::invalid_arg("promises", "race over an empty collection"));
            return;
        }
        let arrivals = fan_out(&members);
        match arrivals.recv() {
            Ok((_, settlement)) => settler.settle(settlement.into_result()),
            Err(_) => settler.reject(Error::abandoned()),
        };
        arrivals.drain_detached(TaskPool::global());
    })
}

/// Starts one waiting task per member; the channel closes after the last one
/// has reported.
fn fan_out<V>(members: &[Promise<V>]) -> Arrivals<V>
where
    V: Clone + Send + 'static,
{
    let (tx, rx) = fan_in::channel();
    let pool = TaskPool::global();
    for (index, member) in members.iter().enumerate() {
        let tx = tx.clone();
        let member = member.clone();
        pool.spawn_detached(move || {
            let settlement = Settlement::from(member.wait());
            let _ = tx.send((index, settlement));
        });
    }
    log::trace!("fanned out {} promise(s)", members.len());
    rx
}

/// An ordered collection of promises of the same type.
///
/// Method forms of the free combinators, for when the members are gathered
/// up front:
///
/// ```
/// use pledge::{Promises, resolve};
///
/// let promises = (1..=3).map(resolve).collect::<Promises<_>>();
/// let mut values = promises.all().wait().unwrap();
/// values.sort();
/// assert_eq!(values, vec![1, 2, 3]);
/// ```
#[derive(Debug)]
pub struct Promises<V>(Vec<Promise<V>>);

impl<V: Clone + Send + 'static> Promises<V> {
    pub fn new() -> Promises<V> {
        Promises(Vec::new())
    }

    pub fn push(&mut self, promise: Promise<V>) {
        self.0.push(promise);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Promise<V>> {
        self.0.iter()
    }

    pub fn all_settled(&self) -> Promise<SettlementBatch<V>> {
        all_settled(self.0.iter().cloned())
    }

    pub fn all(&self) -> Promise<Vec<V>> {
        all(self.0.iter().cloned())
    }

    pub fn all_ordered(&self) -> Promise<Vec<V>> {
        all_ordered(self.0.iter().cloned())
    }

    pub fn any(&self) -> Promise<V> {
        any(self.0.iter().cloned())
    }

    pub fn race(&self) -> Promise<V> {
        race(self.0.iter().cloned())
    }
}

impl<V: Clone + Send + Sync + 'static> Promises<V> {
    /// Gathers type-erased promises, expecting each to settle with a `V`.
    ///
    /// The type check happens inside each member's fan-out task, so a member
    /// holding some other type settles as
    /// [`ErrorKind::InvalidType`](crate::ErrorKind::InvalidType).
    pub fn from_erased(promises: impl IntoIterator<Item = Promise<AnyValue>>) -> Promises<V> {
        promises.into_iter().map(|p| p.downcast::<V>()).collect()
    }
}

impl<V> Clone for Promises<V> {
    fn clone(&self) -> Self {
        Promises(self.0.clone())
    }
}

impl<V: Clone + Send + 'static> Default for Promises<V> {
    fn default() -> Self {
        Promises::new()
    }
}

impl<V> From<Vec<Promise<V>>> for Promises<V> {
    fn from(promises: Vec<Promise<V>>) -> Self {
        Promises(promises)
    }
}

impl<V> FromIterator<Promise<V>> for Promises<V> {
    fn from_iter<I: IntoIterator<Item = Promise<V>>>(iter: I) -> Self {
        Promises(iter.into_iter().collect())
    }
}

impl<V> IntoIterator for Promises<V> {
    type Item = Promise<V>;
    type IntoIter = std::vec::IntoIter<Promise<V>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{all, all_ordered, any, race};
    use crate::{
        constructors::{from_fn, reject, resolve},
        error::ErrorKind,
        promise::Promise,
    };

    fn delayed(delay_ms: u64, value: u32) -> Promise<u32> {
        from_fn(move || {
            std::thread::sleep(Duration::from_millis(delay_ms));
            Ok(value)
        })
    }

    #[test]
    fn test_all_ordered_keeps_submission_order() {
        let promises = vec![delayed(60, 1), delayed(30, 2), delayed(0, 3)];
        assert_eq!(all_ordered(promises).wait().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_all_follows_completion_order() {
        let promises = vec![delayed(80, 1), delayed(40, 2), delayed(0, 3)];
        assert_eq!(all(promises).wait().unwrap(), vec![3, 2, 1]);
    }

    #[test]
    fn test_all_of_nothing() {
        assert!(all(Vec::<Promise<u8>>::new()).wait().unwrap().is_empty());
        assert!(all_ordered(Vec::<Promise<u8>>::new()).wait().unwrap().is_empty());
    }

    #[test]
    fn test_any_of_nothing_rejects_with_empty_aggregate() {
        let err = any(Vec::<Promise<u8>>::new()).wait().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Aggregate(errors) if errors.is_empty()));
    }

    #[test]
    fn test_race_of_nothing_rejects() {
        let err = race(Vec::<Promise<u8>>::new()).wait().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidArgument { .. }));
    }

    #[test]
    fn test_race_rejection_wins_when_first() {
        let promises = vec![delayed(100, 1), reject("fast failure")];
        let err = race(promises).wait().unwrap_err();
        assert_eq!(err.to_string(), "fast failure");
    }

    #[test]
    fn test_combinator_reset_fans_out_again() {
        let promise = all(vec![resolve(1), resolve(2)]);
        let mut first = promise.wait().unwrap();
        promise.reset();
        let mut second = promise.wait().unwrap();
        first.sort();
        second.sort();
        assert_eq!(first, second);
    }
}
