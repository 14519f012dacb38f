/// The single error type for all sagaplan assertions.
///
/// Every fallible public API returns `sagaplan::Result<T>` (alias for
/// `Result<T, sagaplan::Error>`). Failed expectations of one run are
/// aggregated into a single [`Error::Expectation`] so a test sees every
/// unmet assertion at once.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Expectation(String),

    #[error("saga error: {0}")]
    Saga(#[from] SagaError),
}

impl Error {
    pub(crate) fn expectation(message: impl Into<String>) -> Self {
        Error::Expectation(message.into())
    }

    /// Returns the failure report if this is an expectation error.
    pub fn message(&self) -> Option<&str> {
        match self {
            Error::Expectation(message) => Some(message),
            Error::Saga(_) => None,
        }
    }
}

/// An error thrown into or out of a saga.
///
/// Returning `Err` from [`Saga::resume`](crate::Saga::resume) means the saga
/// threw; passing `Err` as the resume input throws into the saga at its
/// current yield point.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SagaError {
    #[error("{0}")]
    Thrown(String),

    #[error("task cancelled")]
    Cancelled,

    #[error("expected {expected} as the result of {effect}, got {got}")]
    UnexpectedOutput {
        effect: &'static str,
        expected: &'static str,
        got: String,
    },

    #[error("function '{0}' can only be invoked once")]
    Exhausted(String),
}

impl SagaError {
    pub fn new(message: impl Into<String>) -> Self {
        SagaError::Thrown(message.into())
    }
}

impl From<&str> for SagaError {
    fn from(message: &str) -> Self {
        SagaError::new(message)
    }
}

impl From<String> for SagaError {
    fn from(message: String) -> Self {
        SagaError::Thrown(message)
    }
}
