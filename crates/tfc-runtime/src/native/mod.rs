//! Owning wrappers over the TensorFlow C API handles.
//!
//! Each handle kind has exactly one wrapper whose `Drop` releases it. Raw
//! pointers make every wrapper `!Send` and `!Sync`.

mod buffer;
mod dtype;
pub(crate) mod ffi;
mod graph;
mod session;
mod status;
mod tensor;

pub use buffer::{Buffer, read_file};
pub use dtype::{DataType, TensorElement};
pub use ffi::{DEFAULT_LIBRARIES, LIBRARY_ENV, Runtime};
pub use graph::{Graph, Operation, Operations, Output};
pub use session::{Session, SessionConfig, SessionOptions};
pub use status::{Code, Status};
pub use tensor::{Tensor, capacity, copy_clamped, element_count};
