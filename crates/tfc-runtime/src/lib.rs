//! Safe access to the TensorFlow C API.
//!
//! The shared library is resolved at run time, so nothing here links
//! against TensorFlow at build time. The crate provides:
//! - owning wrappers for every runtime handle, released exactly once
//! - marshaling helpers for buffers, tensors and session configuration
//! - an [`InferenceBackend`] over ndarray tensors, implemented by [`GraphModel`]

mod backend;
mod error;
pub mod native;
mod tensor;

pub use backend::InferenceBackend;
pub use backend::tensorflow::GraphModel;
pub use error::RuntimeError;
pub use native::{
    Buffer, Code, DataType, Graph, Operation, Output, Runtime, Session, SessionConfig, Status,
    Tensor, TensorElement, capacity, copy_clamped, element_count, read_file,
};
pub use tensor::{InputTensor, OutputTensor};

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
