//! Error types for the tfc-core library.

use thiserror::Error;
use tfc_runtime::{DataType, RuntimeError};

/// Main error type for the tfc-core library.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Error from the runtime layer.
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// Image decoding error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Images that cannot form a batch.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for the tfc-core library.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Exit code when the TensorFlow library cannot be used at all.
pub const EXIT_RUNTIME_UNAVAILABLE: u8 = 100;

/// Exit code for an invalid configuration.
pub const EXIT_CONFIG: u8 = 8;

/// Failure of an example workflow, tagged with the site where it happened.
#[derive(Error, Debug)]
pub enum DemoError {
    #[error("TensorFlow runtime unavailable: {0}")]
    RuntimeUnavailable(#[source] RuntimeError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("can't read buffer from file: {0}")]
    ReadGraph(#[source] RuntimeError),

    #[error("can't import GraphDef: {0}")]
    ImportGraph(#[source] RuntimeError),

    #[error("can't load graph: {0}")]
    LoadGraph(#[source] RuntimeError),

    #[error("can't init input_op '{0}'")]
    InputOp(String),

    #[error("can't init output_op '{0}'")]
    OutputOp(String),

    #[error("can't create input tensor: {0}")]
    InputTensor(#[source] RuntimeError),

    #[error("can't create session: {0}")]
    CreateSession(#[source] RuntimeError),

    #[error("error running session: {0}")]
    RunSession(#[source] RuntimeError),

    #[error("can't close session: {0}")]
    CloseSession(#[source] RuntimeError),

    #[error("can't delete session: {0}")]
    DeleteSession(#[source] RuntimeError),

    #[error("can't prepare input images: {0}")]
    Image(#[source] CoreError),

    #[error(transparent)]
    Tensor(#[from] TensorCheck),
}

impl DemoError {
    /// Process exit code for this failure site.
    pub fn exit_code(&self) -> u8 {
        match self {
            DemoError::RuntimeUnavailable(_) => EXIT_RUNTIME_UNAVAILABLE,
            DemoError::Config(_) => EXIT_CONFIG,
            DemoError::ReadGraph(_) | DemoError::LoadGraph(_) => 1,
            DemoError::ImportGraph(_) | DemoError::InputOp(_) => 2,
            DemoError::OutputOp(_) => 3,
            DemoError::CreateSession(_) => 4,
            DemoError::InputTensor(_) | DemoError::RunSession(_) => 5,
            DemoError::CloseSession(_) => 6,
            DemoError::DeleteSession(_) => 7,
            DemoError::Image(_) => 9,
            DemoError::Tensor(check) => check.exit_code(),
        }
    }

    /// Wrap a runtime error with `site`, unless the runtime itself is unusable.
    pub fn at(site: fn(RuntimeError) -> DemoError) -> impl Fn(RuntimeError) -> DemoError {
        move |err| {
            if err.is_unavailable() {
                DemoError::RuntimeUnavailable(err)
            } else {
                site(err)
            }
        }
    }
}

/// A property of a freshly created tensor that did not hold.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TensorCheck {
    #[error("wrong create tensor")]
    NullTensor,

    #[error("wrong tensor type: expected {expected}, got {actual}")]
    WrongType { expected: DataType, actual: DataType },

    #[error("wrong number of dimensions: expected {expected}, got {actual}")]
    WrongRank { expected: usize, actual: usize },

    #[error("wrong dimension size for dim {index}: expected {expected}, got {actual}")]
    WrongDim {
        index: usize,
        expected: i64,
        actual: i64,
    },

    #[error("wrong tensor byte size: expected {expected}, got {actual}")]
    WrongByteSize { expected: usize, actual: usize },

    #[error("wrong data tensor")]
    NullData,

    #[error("element {index} does not match")]
    ElementMismatch { index: usize },
}

impl TensorCheck {
    pub fn exit_code(&self) -> u8 {
        match self {
            TensorCheck::NullTensor => 1,
            TensorCheck::WrongType { .. } => 2,
            TensorCheck::WrongRank { .. } => 3,
            TensorCheck::WrongDim { .. } => 4,
            TensorCheck::WrongByteSize { .. } => 5,
            TensorCheck::NullData => 6,
            TensorCheck::ElementMismatch { .. } => 7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn io_failure() -> RuntimeError {
        RuntimeError::EmptyFile(PathBuf::from("graph.pb"))
    }

    #[test]
    fn test_exit_codes_per_site() {
        assert_eq!(DemoError::ReadGraph(io_failure()).exit_code(), 1);
        assert_eq!(DemoError::ImportGraph(io_failure()).exit_code(), 2);
        assert_eq!(DemoError::InputOp("input_4".into()).exit_code(), 2);
        assert_eq!(DemoError::OutputOp("output_node0".into()).exit_code(), 3);
        assert_eq!(DemoError::CreateSession(io_failure()).exit_code(), 4);
        assert_eq!(DemoError::RunSession(io_failure()).exit_code(), 5);
        assert_eq!(DemoError::CloseSession(io_failure()).exit_code(), 6);
        assert_eq!(DemoError::DeleteSession(io_failure()).exit_code(), 7);
        assert_eq!(DemoError::Config("bad".into()).exit_code(), 8);
        assert_eq!(
            DemoError::Image(CoreError::InvalidImage("empty".into())).exit_code(),
            9
        );
    }

    #[test]
    fn test_unavailable_runtime_overrides_site() {
        let wrap = DemoError::at(DemoError::ImportGraph);
        let err = wrap(RuntimeError::Unavailable("no library".into()));
        assert!(matches!(err, DemoError::RuntimeUnavailable(_)));
        assert_eq!(err.exit_code(), EXIT_RUNTIME_UNAVAILABLE);

        let err = wrap(io_failure());
        assert!(matches!(err, DemoError::ImportGraph(_)));
    }

    #[test]
    fn test_tensor_check_codes() {
        let checks = [
            TensorCheck::NullTensor,
            TensorCheck::WrongType {
                expected: DataType::Float,
                actual: DataType::Double,
            },
            TensorCheck::WrongRank {
                expected: 3,
                actual: 2,
            },
            TensorCheck::WrongDim {
                index: 1,
                expected: 5,
                actual: 4,
            },
            TensorCheck::WrongByteSize {
                expected: 240,
                actual: 236,
            },
            TensorCheck::NullData,
            TensorCheck::ElementMismatch { index: 0 },
        ];
        let codes: Vec<u8> = checks
            .into_iter()
            .map(|check| DemoError::from(check).exit_code())
            .collect();
        assert_eq!(codes, vec![1, 2, 3, 4, 5, 6, 7]);
    }
}
