//! Session options and sessions.

use std::ffi::c_int;
use std::fmt;
use std::ptr;

use tracing::{debug, warn};

use super::ffi::{Runtime, TF_Output, TF_Session, TF_SessionOptions, TF_Tensor};
use super::graph::{Graph, Output};
use super::status::Status;
use super::tensor::Tensor;
use crate::Result;
use crate::error::RuntimeError;

/// How a session is configured at creation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SessionConfig {
    /// No configuration bytes are passed to the runtime.
    #[default]
    Default,
    /// Cap per-process GPU memory at this fraction, allow growth and soft placement.
    GpuMemoryFraction(f64),
    /// Intra-op and inter-op CPU thread pool sizes.
    Threads { intra_op: u8, inter_op: u8 },
}

impl SessionConfig {
    /// Serialized `ConfigProto` bytes, or `None` for the default configuration.
    pub fn encode(&self) -> Option<Vec<u8>> {
        match *self {
            SessionConfig::Default => None,
            SessionConfig::GpuMemoryFraction(fraction) => {
                // gpu_options { per_process_gpu_memory_fraction, allow_growth }
                let mut bytes = vec![0x32, 0x0b, 0x09];
                bytes.extend_from_slice(&fraction.to_le_bytes());
                bytes.extend_from_slice(&[0x20, 0x01]);
                // allow_soft_placement
                bytes.extend_from_slice(&[0x38, 0x01]);
                Some(bytes)
            }
            SessionConfig::Threads { intra_op, inter_op } => {
                // intra_op_parallelism_threads, inter_op_parallelism_threads
                let mut bytes = vec![0x10];
                push_varint(&mut bytes, u64::from(intra_op));
                bytes.push(0x28);
                push_varint(&mut bytes, u64::from(inter_op));
                Some(bytes)
            }
        }
    }
}

/// Append `value` as a protobuf base-128 varint.
fn push_varint(bytes: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        bytes.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    bytes.push(value as u8);
}

/// Owning wrapper over `TF_SessionOptions`.
pub struct SessionOptions {
    rt: &'static Runtime,
    ptr: *mut TF_SessionOptions,
}

impl SessionOptions {
    pub fn new(rt: &'static Runtime) -> Result<Self> {
        // SAFETY: No preconditions.
        let ptr = unsafe { (rt.api.new_session_options)() };
        if ptr.is_null() {
            return Err(RuntimeError::NullHandle("session options"));
        }
        Ok(Self { rt, ptr })
    }

    pub fn from_config(rt: &'static Runtime, config: &SessionConfig) -> Result<Self> {
        let mut options = Self::new(rt)?;
        if let Some(bytes) = config.encode() {
            options.set_config_bytes(&bytes)?;
        }
        Ok(options)
    }

    /// Pass a serialized `ConfigProto` to the runtime.
    pub fn set_config_bytes(&mut self, proto: &[u8]) -> Result<()> {
        let status = Status::new(self.rt)?;
        // SAFETY: `proto` is valid for its length; the runtime copies it.
        unsafe {
            (self.rt.api.set_config)(
                self.ptr,
                proto.as_ptr().cast(),
                proto.len(),
                status.as_ptr(),
            )
        };
        status.check("set session config")
    }
}

impl Drop for SessionOptions {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            // SAFETY: Owned by this wrapper and deleted once.
            unsafe { (self.rt.api.delete_session_options)(self.ptr) };
            self.ptr = ptr::null_mut();
        }
    }
}

/// Owning wrapper over `TF_Session`.
///
/// The runtime keeps the graph alive until every session created on it is
/// deleted, so the session does not borrow its [`Graph`].
pub struct Session {
    rt: &'static Runtime,
    ptr: *mut TF_Session,
    closed: bool,
}

impl Session {
    /// Create a session with default options.
    pub fn new(graph: &Graph) -> Result<Self> {
        Self::with_config(graph, &SessionConfig::Default)
    }

    pub fn with_config(graph: &Graph, config: &SessionConfig) -> Result<Self> {
        let rt = graph.runtime();
        let options = SessionOptions::from_config(rt, config)?;
        let status = Status::new(rt)?;
        // SAFETY: Graph, options and status are live.
        let ptr = unsafe { (rt.api.new_session)(graph.as_ptr(), options.ptr, status.as_ptr()) };
        drop(options);

        if let Err(err) = status.check("create session") {
            if !ptr.is_null() {
                // SAFETY: Partially created sessions are still ours to delete.
                unsafe { (rt.api.delete_session)(ptr, status.as_ptr()) };
            }
            return Err(err);
        }
        if ptr.is_null() {
            return Err(RuntimeError::NullHandle("session"));
        }

        debug!("Created session with {:?}", config);
        Ok(Self {
            rt,
            ptr,
            closed: false,
        })
    }

    /// Feed `inputs`, evaluate `outputs` and return one tensor per output.
    pub fn run(&self, inputs: &[(Output, &Tensor)], outputs: &[Output]) -> Result<Vec<Tensor>> {
        if self.closed {
            return Err(RuntimeError::SessionClosed);
        }
        let rt = self.rt;

        let input_ops: Vec<TF_Output> = inputs.iter().map(|(output, _)| output.raw()).collect();
        let input_values: Vec<*mut TF_Tensor> =
            inputs.iter().map(|(_, tensor)| tensor.as_ptr()).collect();
        let output_ops: Vec<TF_Output> = outputs.iter().map(Output::raw).collect();
        let mut output_values: Vec<*mut TF_Tensor> = vec![ptr::null_mut(); outputs.len()];
        let ninputs = count(inputs.len())?;
        let noutputs = count(outputs.len())?;

        let status = Status::new(rt)?;
        // SAFETY: Every array holds exactly the number of entries passed
        // alongside it, and all handles are live for the call.
        unsafe {
            (rt.api.session_run)(
                self.ptr,
                ptr::null(),
                input_ops.as_ptr(),
                input_values.as_ptr(),
                ninputs,
                output_ops.as_ptr(),
                output_values.as_mut_ptr(),
                noutputs,
                ptr::null(),
                0,
                ptr::null_mut(),
                status.as_ptr(),
            )
        };

        // Take ownership before checking the status so nothing leaks on failure.
        let results: Vec<Option<Tensor>> = output_values
            .into_iter()
            // SAFETY: Output tensors are handed to the caller by the runtime.
            .map(|raw| unsafe { Tensor::from_raw(rt, raw) })
            .collect();
        status.check("run session")?;

        results
            .into_iter()
            .enumerate()
            .map(|(i, tensor)| {
                tensor.ok_or_else(|| RuntimeError::OutputExtraction(format!("output {i} is null")))
            })
            .collect()
    }

    /// Close the session. Further runs fail; closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let rt = self.rt;
        let status = Status::new(rt)?;
        // SAFETY: Session is live.
        unsafe { (rt.api.close_session)(self.ptr, status.as_ptr()) };
        self.closed = true;
        status.check("close session")
    }

    /// Close if still open, then delete the session, reporting failures.
    pub fn delete(mut self) -> Result<()> {
        self.close()?;
        let rt = self.rt;
        let status = Status::new(rt)?;
        let ptr = std::mem::replace(&mut self.ptr, ptr::null_mut());
        // SAFETY: Session is live and no longer referenced by self.
        unsafe { (rt.api.delete_session)(ptr, status.as_ptr()) };
        status.check("delete session")
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("ptr", &self.ptr)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.ptr.is_null() {
            return;
        }
        if let Err(err) = self.close() {
            warn!("Failed to close session: {}", err);
        }
        let rt = self.rt;
        match Status::new(rt) {
            Ok(status) => {
                // SAFETY: Session is live and deleted once.
                unsafe { (rt.api.delete_session)(self.ptr, status.as_ptr()) };
                if let Err(err) = status.check("delete session") {
                    warn!("{}", err);
                }
            }
            Err(err) => warn!("Leaking session: {}", err),
        }
        self.ptr = ptr::null_mut();
    }
}

fn count(len: usize) -> Result<c_int> {
    c_int::try_from(len).map_err(|_| RuntimeError::InvalidInput(format!("too many tensors: {len}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config_has_no_bytes() {
        assert_eq!(SessionConfig::default(), SessionConfig::Default);
        assert_eq!(SessionConfig::Default.encode(), None);
    }

    #[test]
    fn test_gpu_fraction_encoding() {
        let bytes = SessionConfig::GpuMemoryFraction(0.5).encode().unwrap();
        assert_eq!(
            bytes,
            vec![
                0x32, 0x0b, 0x09, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xe0, 0x3f, 0x20, 0x01, 0x38,
                0x01
            ]
        );
        assert_eq!(bytes.len(), 15);
    }

    #[test]
    fn test_gpu_fraction_embeds_little_endian_double() {
        let fraction = 0.3;
        let bytes = SessionConfig::GpuMemoryFraction(fraction).encode().unwrap();
        assert_eq!(&bytes[3..11], &fraction.to_le_bytes());
    }

    #[test]
    fn test_thread_encoding() {
        let bytes = SessionConfig::Threads {
            intra_op: 4,
            inter_op: 2,
        }
        .encode()
        .unwrap();
        assert_eq!(bytes, vec![0x10, 4, 0x28, 2]);
    }

    #[test]
    fn test_thread_encoding_single_byte_boundary() {
        let bytes = SessionConfig::Threads {
            intra_op: 127,
            inter_op: 0,
        }
        .encode()
        .unwrap();
        assert_eq!(bytes, vec![0x10, 0x7f, 0x28, 0x00]);
    }

    #[test]
    fn test_thread_encoding_uses_varints_past_127() {
        let bytes = SessionConfig::Threads {
            intra_op: 128,
            inter_op: 200,
        }
        .encode()
        .unwrap();
        assert_eq!(bytes, vec![0x10, 0x80, 0x01, 0x28, 0xc8, 0x01]);

        let bytes = SessionConfig::Threads {
            intra_op: 255,
            inter_op: 1,
        }
        .encode()
        .unwrap();
        assert_eq!(bytes, vec![0x10, 0xff, 0x01, 0x28, 0x01]);
    }

    #[test]
    fn test_push_varint() {
        let mut bytes = Vec::new();
        push_varint(&mut bytes, 300);
        assert_eq!(bytes, vec![0xac, 0x02]);
    }
}
