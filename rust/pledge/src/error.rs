use std::{fmt, sync::Arc, time::Duration};

use thiserror::Error;

/// Error produced by a rejected promise.
///
/// `Error` is a cheaply cloneable handle: a settled promise hands the same
/// error to every caller of `wait`, and wrappers that pass an error through do
/// so without rebuilding it. [`Error::ptr_eq`] tells whether two handles refer
/// to the very same rejection.
#[derive(Debug, Clone, Error)]
#[error(transparent)]
pub struct Error(Arc<ErrorKind>);

pub type StdErrorShared = Arc<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    /// Returns `true` if both handles point at the same underlying rejection.
    pub fn ptr_eq(&self, other: &Error) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// A rejection carrying only a message.
    pub fn msg(message: impl Into<String>) -> Error {
        ErrorKind::Rejected {
            message: message.into(),
        }
        .into()
    }

    /// Wraps an arbitrary error raised by user code.
    pub fn from_source<E>(source: E) -> Error
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ErrorKind::Source(Arc::new(source)).into()
    }

    pub fn invalid_type<T: ?Sized>() -> Error {
        ErrorKind::InvalidType {
            expected: std::any::type_name::<T>(),
        }
        .into()
    }

    pub fn timeout(after: Duration) -> Error {
        ErrorKind::Timeout { after }.into()
    }

    pub fn retry_exhausted(attempts: u32, last: Option<Error>) -> Error {
        ErrorKind::RetryExhausted { attempts, last }.into()
    }

    pub fn aggregate(errors: AggregateError) -> Error {
        ErrorKind::Aggregate(errors).into()
    }

    pub fn abandoned() -> Error {
        ErrorKind::Abandoned.into()
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        ErrorKind::InvalidArgument {
            name: name.into(),
            message: message.into(),
        }
        .into()
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("{message}")]
    Rejected { message: String },

    #[error(transparent)]
    Source(StdErrorShared),

    #[error("invalid type received, expected {expected}")]
    InvalidType { expected: &'static str },

    #[error("promise timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("retry exhausted after {attempts} attempt(s)")]
    RetryExhausted {
        attempts: u32,
        #[source]
        last: Option<Error>,
    },

    #[error(transparent)]
    Aggregate(AggregateError),

    #[error("promise executor dropped its settler without settling")]
    Abandoned,

    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(Arc::new(kind))
    }
}

impl From<AggregateError> for Error {
    fn from(errors: AggregateError) -> Self {
        Error::aggregate(errors)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::from_source(e)
    }
}

impl From<String> for Error {
    fn from(message: String) -> Self {
        Error::msg(message)
    }
}

impl From<&str> for Error {
    fn from(message: &str) -> Self {
        Error::msg(message)
    }
}

/// Ordered collection of errors, reported as one.
///
/// Produced by `any` when every member fails. The textual form joins the
/// member messages with a blank line.
#[derive(Debug, Clone, Default)]
pub struct AggregateError {
    errors: Vec<Error>,
}

impl AggregateError {
    pub fn new(errors: Vec<Error>) -> AggregateError {
        AggregateError { errors }
    }

    pub fn push(&mut self, error: Error) {
        self.errors.push(error);
    }

    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_errors(self) -> Vec<Error> {
        self.errors
    }

    /// Folds the collection into a single [`Error`].
    pub fn into_error(self) -> Error {
        Error::aggregate(self)
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i != 0 {
                f.write_str("\n\n")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

impl FromIterator<Error> for AggregateError {
    fn from_iter<I: IntoIterator<Item = Error>>(iter: I) -> Self {
        AggregateError::new(iter.into_iter().collect())
    }
}

impl IntoIterator for AggregateError {
    type Item = Error;
    type IntoIter = std::vec::IntoIter<Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}
