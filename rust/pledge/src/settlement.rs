//! Settled outcomes of promises, as seen by the combinators.

use crate::error::{AggregateError, Error, Result};

/// The final outcome of one promise: either a value or an error.
#[derive(Debug, Clone)]
pub struct Settlement<V>(Result<V>);

impl<V> Settlement<V> {
    pub fn resolved(value: V) -> Settlement<V> {
        Settlement(Ok(value))
    }

    pub fn rejected(error: Error) -> Settlement<V> {
        Settlement(Err(error))
    }

    pub fn is_resolved(&self) -> bool {
        self.0.is_ok()
    }

    pub fn is_rejected(&self) -> bool {
        self.0.is_err()
    }

    pub fn value(&self) -> Option<&V> {
        self.0.as_ref().ok()
    }

    pub fn error(&self) -> Option<&Error> {
        self.0.as_ref().err()
    }

    pub fn as_result(&self) -> &Result<V> {
        &self.0
    }

    pub fn into_result(self) -> Result<V> {
        self.0
    }
}

impl<V> From<Result<V>> for Settlement<V> {
    fn from(outcome: Result<V>) -> Self {
        Settlement(outcome)
    }
}

impl<V> From<Settlement<V>> for Result<V> {
    fn from(settlement: Settlement<V>) -> Self {
        settlement.0
    }
}

/// Settlements gathered by `all_settled`, in the order the members completed.
#[derive(Debug, Clone)]
pub struct SettlementBatch<V>(Vec<Settlement<V>>);

impl<V> SettlementBatch<V> {
    pub fn new() -> SettlementBatch<V> {
        SettlementBatch(Vec::new())
    }

    pub fn with_capacity(capacity: usize) -> SettlementBatch<V> {
        SettlementBatch(Vec::with_capacity(capacity))
    }

    pub fn push(&mut self, settlement: Settlement<V>) {
        self.0.push(settlement);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Settlement<V>> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Settlement<V>] {
        &self.0
    }

    /// Values of the resolved members.
    pub fn values(&self) -> Vec<V>
    where
        V: Clone,
    {
        self.0.iter().filter_map(|s| s.value().cloned()).collect()
    }

    /// Errors of the rejected members.
    pub fn errors(&self) -> Vec<Error> {
        self.0.iter().filter_map(|s| s.error().cloned()).collect()
    }

    /// Errors of the rejected members as one [`AggregateError`].
    pub fn aggregate_errors(&self) -> AggregateError {
        self.errors().into_iter().collect()
    }

    pub fn into_settlements(self) -> Vec<Settlement<V>> {
        self.0
    }
}

impl<V> Default for SettlementBatch<V> {
    fn default() -> Self {
        SettlementBatch::new()
    }
}

impl<V> FromIterator<Settlement<V>> for SettlementBatch<V> {
    fn from_iter<I: IntoIterator<Item = Settlement<V>>>(iter: I) -> Self {
        SettlementBatch(iter.into_iter().collect())
    }
}

impl<V> IntoIterator for SettlementBatch<V> {
    type Item = Settlement<V>;
    type IntoIter = std::vec::IntoIter<Settlement<V>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a, V> IntoIterator for &'a SettlementBatch<V> {
    type Item = &'a Settlement<V>;
    type IntoIter = std::slice::Iter<'a, Settlement<V>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::{Settlement, SettlementBatch};
    use crate::error::Error;

    #[test]
    fn test_settlement_flags() {
        let ok = Settlement::resolved(1);
        assert!(ok.is_resolved());
        assert!(!ok.is_rejected());
        assert_eq!(ok.value(), Some(&1));
        assert!(ok.error().is_none());

        let err = Settlement::<i32>::rejected(Error::msg("error"));
        assert!(err.is_rejected());
        assert!(err.value().is_none());
        assert_eq!(err.error().map(|e| e.to_string()), Some("error".to_string()));
    }

    #[test]
    fn test_batch_views() {
        let failure = Error::msg("error");
        let batch = [
            Settlement::resolved(10),
            Settlement::rejected(failure.clone()),
            Settlement::resolved(12),
        ]
        .into_iter()
        .collect::<SettlementBatch<i32>>();

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.values(), vec![10, 12]);
        let errors = batch.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].ptr_eq(&failure));
        assert_eq!(batch.aggregate_errors().to_string(), "error");
    }

    #[test]
    fn test_empty_batch() {
        let batch = SettlementBatch::<u8>::default();
        assert!(batch.is_empty());
        assert!(batch.values().is_empty());
        assert!(batch.errors().is_empty());
        assert!(batch.aggregate_errors().is_empty());
    }
}
