//! Error types for Tributary core operations.
//!
//! All errors are explicit values; malformed input is rejected here, before
//! any stream state is touched.

use std::fmt;

/// The result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in core operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A label string or label set was malformed.
    InvalidLabels {
        /// The offending input, as received.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An invalid argument was provided.
    InvalidArgument {
        /// The name of the argument.
        name: &'static str,
        /// Why it was invalid.
        reason: &'static str,
    },
}

impl Error {
    pub(crate) fn invalid_labels(input: &str, reason: impl Into<String>) -> Self {
        Self::InvalidLabels {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLabels { input, reason } => {
                write!(f, "invalid labels '{input}': {reason}")
            }
            Self::InvalidArgument { name, reason } => {
                write!(f, "invalid argument '{name}': {reason}")
            }
        }
    }
}

impl std::error::Error for Error {}
