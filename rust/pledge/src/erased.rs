//! Bridging promises across dynamically typed boundaries.
//!
//! Most code should stay with `Promise<V>` end to end. When promises of
//! different types have to travel through one container or interface, they can
//! be erased to `Promise<AnyValue>` and recovered later. Recovery checks the
//! runtime type and turns a mismatch into
//! [`ErrorKind::InvalidType`](crate::ErrorKind::InvalidType).

use std::{any::Any, sync::Arc};

use crate::{
    error::{Error, Result},
    promise::Promise,
};

/// A settled value whose concrete type is known only at runtime.
pub type AnyValue = Arc<dyn Any + Send + Sync>;

impl<V: Clone + Send + Sync + 'static> Promise<V> {
    /// Forgets the value type.
    pub fn erase(&self) -> Promise<AnyValue> {
        self.then(|value| Ok(Arc::new(value) as AnyValue))
    }
}

impl Promise<AnyValue> {
    /// Recovers a typed promise, rejecting if the value is not a `T`.
    ///
    /// Rejections of the erased promise pass through unchanged.
    pub fn downcast<T: Clone + Send + Sync + 'static>(&self) -> Promise<T> {
        self.then(|value| cast::<T>(&value))
    }
}

/// Waits on an erased promise and returns its value as a `T`.
pub fn await_as<T: Clone + Send + Sync + 'static>(promise: &Promise<AnyValue>) -> Result<T> {
    promise.wait().and_then(|value| cast::<T>(&value))
}

fn cast<T: Clone + 'static>(value: &AnyValue) -> Result<T> {
    match (**value).downcast_ref::<T>() {
        Some(value) => Ok(value.clone()),
        None => {
            log::debug!("settled value is not a {}", std::any::type_name::<T>());
            Err(Error::invalid_type::<T>())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::await_as;
    use crate::{
        constructors::{reject, resolve},
        error::{Error, ErrorKind},
    };

    #[test]
    fn test_round_trip_through_erasure() {
        let erased = resolve(10_i32).erase();
        assert_eq!(await_as::<i32>(&erased).unwrap(), 10);
        assert_eq!(erased.downcast::<i32>().wait().unwrap(), 10);
    }

    #[test]
    fn test_type_mismatch_is_reported() {
        let erased = resolve("text".to_string()).erase();
        let err = await_as::<f64>(&erased).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidType { expected } if *expected == "f64"));

        let err = erased.downcast::<u64>().wait().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidType { .. }));
    }

    #[test]
    fn test_rejection_passes_through_erasure() {
        let failure = Error::msg("error");
        let erased = reject::<u8>(failure.clone()).erase();
        assert!(await_as::<u8>(&erased).unwrap_err().ptr_eq(&failure));
        assert!(erased.downcast::<u8>().wait().unwrap_err().ptr_eq(&failure));
    }
}
