//! Error types for the runtime layer.

use std::path::PathBuf;

use thiserror::Error;

use crate::native::{Code, DataType};

/// Errors raised while loading or calling the TensorFlow runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The shared library could not be opened.
    #[error("failed to load TensorFlow library {library}: {source}")]
    LibraryLoad {
        library: String,
        #[source]
        source: libloading::Error,
    },

    /// The library lacks an entry point this crate binds.
    #[error("TensorFlow library is missing symbol {symbol}: {source}")]
    MissingSymbol {
        symbol: String,
        #[source]
        source: libloading::Error,
    },

    /// A previous load attempt failed; the message is that failure.
    #[error("TensorFlow runtime unavailable: {0}")]
    Unavailable(String),

    /// The runtime returned null where a handle was expected.
    #[error("runtime returned a null {0}")]
    NullHandle(&'static str),

    /// A call reported a non-OK status.
    #[error("{context} failed with {code}: {message}")]
    Status {
        context: &'static str,
        code: Code,
        message: String,
    },

    #[error("operation not found: {0}")]
    OperationNotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("tensor holds {actual}, expected {expected}")]
    TypeMismatch { expected: DataType, actual: DataType },

    #[error("session is closed")]
    SessionClosed,

    #[error("file is empty: {}", .0.display())]
    EmptyFile(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Output tensor extraction failed.
    #[error("failed to extract output: {0}")]
    OutputExtraction(String),
}

impl RuntimeError {
    /// True when the failure is about the library itself rather than a call.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            RuntimeError::LibraryLoad { .. }
                | RuntimeError::MissingSymbol { .. }
                | RuntimeError::Unavailable(_)
        )
    }

    /// Status code carried by the error, if it came from a runtime status.
    pub fn code(&self) -> Option<Code> {
        match self {
            RuntimeError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}
