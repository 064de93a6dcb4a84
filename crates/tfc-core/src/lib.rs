//! Core library for the TensorFlow C API examples.
//!
//! This crate provides:
//! - JSON configuration for the runtime, graph, session and sample input
//! - The example workflows (load, inspect, create tensors, run, predict)
//! - Image to NHWC float batch conversion
//! - Typed failures that map to a process exit code per failure site

pub mod config;
pub mod demos;
pub mod error;
pub mod image;

pub use config::{GraphConfig, InputConfig, RuntimeConfig, SessionSettings, TfcConfig};
pub use error::{CoreError, DemoError, Result, TensorCheck};

/// Re-export runtime types.
pub use tfc_runtime::{
    DataType, GraphModel, InferenceBackend, InputTensor, OutputTensor, Runtime, RuntimeError,
    SessionConfig,
};
