//! TensorFlow C API surface, resolved from the shared library at run time.
//!
//! Only the entry points used by the wrappers in this crate are bound. The
//! library is opened once per process and never unloaded.

#![allow(non_camel_case_types)]

use std::ffi::{CStr, c_char, c_int, c_void};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use libloading::Library;
use tracing::debug;

use crate::Result;
use crate::error::RuntimeError;

/// Environment variable naming the TensorFlow shared library to load.
pub const LIBRARY_ENV: &str = "TFC_LIBRARY";

/// Library names tried when no explicit path is configured.
pub const DEFAULT_LIBRARIES: &[&str] = &[
    "libtensorflow.so.2",
    "libtensorflow.so",
    "libtensorflow.2.dylib",
    "libtensorflow.dylib",
    "tensorflow.dll",
];

#[repr(C)]
pub struct TF_Status {
    _private: [u8; 0],
}

#[repr(C)]
pub struct TF_Graph {
    _private: [u8; 0],
}

#[repr(C)]
pub struct TF_Operation {
    _private: [u8; 0],
}

#[repr(C)]
pub struct TF_ImportGraphDefOptions {
    _private: [u8; 0],
}

#[repr(C)]
pub struct TF_SessionOptions {
    _private: [u8; 0],
}

#[repr(C)]
pub struct TF_Session {
    _private: [u8; 0],
}

#[repr(C)]
pub struct TF_Tensor {
    _private: [u8; 0],
}

pub type TF_DataType = c_int;
pub type TF_Code = c_int;

pub type BufferDeallocator = unsafe extern "C" fn(data: *mut c_void, length: usize);
pub type TensorDeallocator = unsafe extern "C" fn(data: *mut c_void, length: usize, arg: *mut c_void);

#[repr(C)]
pub struct TF_Buffer {
    pub data: *const c_void,
    pub length: usize,
    pub data_deallocator: Option<BufferDeallocator>,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TF_Output {
    pub oper: *mut TF_Operation,
    pub index: c_int,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TF_Input {
    pub oper: *mut TF_Operation,
    pub index: c_int,
}

type VersionFn = unsafe extern "C" fn() -> *const c_char;
type NewStatusFn = unsafe extern "C" fn() -> *mut TF_Status;
type DeleteStatusFn = unsafe extern "C" fn(status: *mut TF_Status);
type GetCodeFn = unsafe extern "C" fn(status: *const TF_Status) -> TF_Code;
type MessageFn = unsafe extern "C" fn(status: *const TF_Status) -> *const c_char;
type NewBufferFn = unsafe extern "C" fn() -> *mut TF_Buffer;
type DeleteBufferFn = unsafe extern "C" fn(buffer: *mut TF_Buffer);
type NewGraphFn = unsafe extern "C" fn() -> *mut TF_Graph;
type DeleteGraphFn = unsafe extern "C" fn(graph: *mut TF_Graph);
type NewImportOptionsFn = unsafe extern "C" fn() -> *mut TF_ImportGraphDefOptions;
type DeleteImportOptionsFn = unsafe extern "C" fn(options: *mut TF_ImportGraphDefOptions);
type GraphImportGraphDefFn = unsafe extern "C" fn(
    graph: *mut TF_Graph,
    graph_def: *const TF_Buffer,
    options: *const TF_ImportGraphDefOptions,
    status: *mut TF_Status,
);
type GraphOperationByNameFn =
    unsafe extern "C" fn(graph: *mut TF_Graph, name: *const c_char) -> *mut TF_Operation;
type GraphNextOperationFn =
    unsafe extern "C" fn(graph: *mut TF_Graph, pos: *mut usize) -> *mut TF_Operation;
type OperationStrFn = unsafe extern "C" fn(oper: *mut TF_Operation) -> *const c_char;
type OperationCountFn = unsafe extern "C" fn(oper: *mut TF_Operation) -> c_int;
type OperationInputTypeFn = unsafe extern "C" fn(input: TF_Input) -> TF_DataType;
type OperationOutputTypeFn = unsafe extern "C" fn(output: TF_Output) -> TF_DataType;
type GraphGetTensorNumDimsFn =
    unsafe extern "C" fn(graph: *mut TF_Graph, output: TF_Output, status: *mut TF_Status) -> c_int;
type GraphGetTensorShapeFn = unsafe extern "C" fn(
    graph: *mut TF_Graph,
    output: TF_Output,
    dims: *mut i64,
    num_dims: c_int,
    status: *mut TF_Status,
);
type NewSessionOptionsFn = unsafe extern "C" fn() -> *mut TF_SessionOptions;
type DeleteSessionOptionsFn = unsafe extern "C" fn(options: *mut TF_SessionOptions);
type SetConfigFn = unsafe extern "C" fn(
    options: *mut TF_SessionOptions,
    proto: *const c_void,
    proto_len: usize,
    status: *mut TF_Status,
);
type NewSessionFn = unsafe extern "C" fn(
    graph: *mut TF_Graph,
    options: *const TF_SessionOptions,
    status: *mut TF_Status,
) -> *mut TF_Session;
type SessionStatusFn = unsafe extern "C" fn(session: *mut TF_Session, status: *mut TF_Status);
type SessionRunFn = unsafe extern "C" fn(
    session: *mut TF_Session,
    run_options: *const TF_Buffer,
    inputs: *const TF_Output,
    input_values: *const *mut TF_Tensor,
    ninputs: c_int,
    outputs: *const TF_Output,
    output_values: *mut *mut TF_Tensor,
    noutputs: c_int,
    target_opers: *const *const TF_Operation,
    ntargets: c_int,
    run_metadata: *mut TF_Buffer,
    status: *mut TF_Status,
);
type AllocateTensorFn = unsafe extern "C" fn(
    dtype: TF_DataType,
    dims: *const i64,
    num_dims: c_int,
    len: usize,
) -> *mut TF_Tensor;
type NewTensorFn = unsafe extern "C" fn(
    dtype: TF_DataType,
    dims: *const i64,
    num_dims: c_int,
    data: *mut c_void,
    len: usize,
    deallocator: Option<TensorDeallocator>,
    deallocator_arg: *mut c_void,
) -> *mut TF_Tensor;
type DeleteTensorFn = unsafe extern "C" fn(tensor: *mut TF_Tensor);
type TensorTypeFn = unsafe extern "C" fn(tensor: *const TF_Tensor) -> TF_DataType;
type NumDimsFn = unsafe extern "C" fn(tensor: *const TF_Tensor) -> c_int;
type DimFn = unsafe extern "C" fn(tensor: *const TF_Tensor, dim_index: c_int) -> i64;
type TensorByteSizeFn = unsafe extern "C" fn(tensor: *const TF_Tensor) -> usize;
type TensorDataFn = unsafe extern "C" fn(tensor: *const TF_Tensor) -> *mut c_void;

pub(crate) struct Api {
    pub version: VersionFn,
    pub new_status: NewStatusFn,
    pub delete_status: DeleteStatusFn,
    pub get_code: GetCodeFn,
    pub message: MessageFn,
    pub new_buffer: NewBufferFn,
    pub delete_buffer: DeleteBufferFn,
    pub new_graph: NewGraphFn,
    pub delete_graph: DeleteGraphFn,
    pub new_import_options: NewImportOptionsFn,
    pub delete_import_options: DeleteImportOptionsFn,
    pub graph_import_graph_def: GraphImportGraphDefFn,
    pub graph_operation_by_name: GraphOperationByNameFn,
    pub graph_next_operation: GraphNextOperationFn,
    pub operation_name: OperationStrFn,
    pub operation_op_type: OperationStrFn,
    pub operation_device: OperationStrFn,
    pub operation_num_inputs: OperationCountFn,
    pub operation_num_outputs: OperationCountFn,
    pub operation_input_type: OperationInputTypeFn,
    pub operation_output_type: OperationOutputTypeFn,
    pub graph_get_tensor_num_dims: GraphGetTensorNumDimsFn,
    pub graph_get_tensor_shape: GraphGetTensorShapeFn,
    pub new_session_options: NewSessionOptionsFn,
    pub delete_session_options: DeleteSessionOptionsFn,
    pub set_config: SetConfigFn,
    pub new_session: NewSessionFn,
    pub close_session: SessionStatusFn,
    pub delete_session: SessionStatusFn,
    pub session_run: SessionRunFn,
    pub allocate_tensor: AllocateTensorFn,
    pub new_tensor: NewTensorFn,
    pub delete_tensor: DeleteTensorFn,
    pub tensor_type: TensorTypeFn,
    pub num_dims: NumDimsFn,
    pub dim: DimFn,
    pub tensor_byte_size: TensorByteSizeFn,
    pub tensor_data: TensorDataFn,
}

impl Api {
    fn resolve(lib: &Library) -> Result<Self> {
        Ok(Self {
            version: load_symbol(lib, b"TF_Version\0")?,
            new_status: load_symbol(lib, b"TF_NewStatus\0")?,
            delete_status: load_symbol(lib, b"TF_DeleteStatus\0")?,
            get_code: load_symbol(lib, b"TF_GetCode\0")?,
            message: load_symbol(lib, b"TF_Message\0")?,
            new_buffer: load_symbol(lib, b"TF_NewBuffer\0")?,
            delete_buffer: load_symbol(lib, b"TF_DeleteBuffer\0")?,
            new_graph: load_symbol(lib, b"TF_NewGraph\0")?,
            delete_graph: load_symbol(lib, b"TF_DeleteGraph\0")?,
            new_import_options: load_symbol(lib, b"TF_NewImportGraphDefOptions\0")?,
            delete_import_options: load_symbol(lib, b"TF_DeleteImportGraphDefOptions\0")?,
            graph_import_graph_def: load_symbol(lib, b"TF_GraphImportGraphDef\0")?,
            graph_operation_by_name: load_symbol(lib, b"TF_GraphOperationByName\0")?,
            graph_next_operation: load_symbol(lib, b"TF_GraphNextOperation\0")?,
            operation_name: load_symbol(lib, b"TF_OperationName\0")?,
            operation_op_type: load_symbol(lib, b"TF_OperationOpType\0")?,
            operation_device: load_symbol(lib, b"TF_OperationDevice\0")?,
            operation_num_inputs: load_symbol(lib, b"TF_OperationNumInputs\0")?,
            operation_num_outputs: load_symbol(lib, b"TF_OperationNumOutputs\0")?,
            operation_input_type: load_symbol(lib, b"TF_OperationInputType\0")?,
            operation_output_type: load_symbol(lib, b"TF_OperationOutputType\0")?,
            graph_get_tensor_num_dims: load_symbol(lib, b"TF_GraphGetTensorNumDims\0")?,
            graph_get_tensor_shape: load_symbol(lib, b"TF_GraphGetTensorShape\0")?,
            new_session_options: load_symbol(lib, b"TF_NewSessionOptions\0")?,
            delete_session_options: load_symbol(lib, b"TF_DeleteSessionOptions\0")?,
            set_config: load_symbol(lib, b"TF_SetConfig\0")?,
            new_session: load_symbol(lib, b"TF_NewSession\0")?,
            close_session: load_symbol(lib, b"TF_CloseSession\0")?,
            delete_session: load_symbol(lib, b"TF_DeleteSession\0")?,
            session_run: load_symbol(lib, b"TF_SessionRun\0")?,
            allocate_tensor: load_symbol(lib, b"TF_AllocateTensor\0")?,
            new_tensor: load_symbol(lib, b"TF_NewTensor\0")?,
            delete_tensor: load_symbol(lib, b"TF_DeleteTensor\0")?,
            tensor_type: load_symbol(lib, b"TF_TensorType\0")?,
            num_dims: load_symbol(lib, b"TF_NumDims\0")?,
            dim: load_symbol(lib, b"TF_Dim\0")?,
            tensor_byte_size: load_symbol(lib, b"TF_TensorByteSize\0")?,
            tensor_data: load_symbol(lib, b"TF_TensorData\0")?,
        })
    }
}

/// A loaded TensorFlow shared library and its resolved entry points.
pub struct Runtime {
    _lib: Library,
    pub(crate) api: Api,
    library: PathBuf,
}

static RUNTIME: OnceLock<std::result::Result<Runtime, String>> = OnceLock::new();

impl Runtime {
    /// Open the library at `path` and resolve every entry point.
    pub fn load(path: &Path) -> Result<Self> {
        // SAFETY: Opening the library runs its initializers; no symbols are invoked yet.
        let lib = unsafe { Library::new(path) }.map_err(|source| RuntimeError::LibraryLoad {
            library: path.display().to_string(),
            source,
        })?;
        let api = Api::resolve(&lib)?;
        debug!("Loaded TensorFlow runtime from {}", path.display());

        Ok(Self {
            _lib: lib,
            api,
            library: path.to_path_buf(),
        })
    }

    /// Load from `TFC_LIBRARY` if set, otherwise try the platform default names.
    pub fn load_default() -> Result<Self> {
        if let Some(path) = std::env::var_os(LIBRARY_ENV) {
            return Self::load(Path::new(&path));
        }

        let mut last_error = None;
        for candidate in DEFAULT_LIBRARIES {
            match Self::load(Path::new(candidate)) {
                Ok(runtime) => return Ok(runtime),
                Err(err) => {
                    debug!("{candidate}: {err}");
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            RuntimeError::Unavailable("no TensorFlow library candidates".to_string())
        }))
    }

    /// Initialize the process-wide runtime.
    ///
    /// The first call decides which library is used; later calls return the
    /// same runtime (or the same failure) regardless of `path`.
    pub fn init(path: Option<&Path>) -> Result<&'static Runtime> {
        let init = RUNTIME.get_or_init(|| {
            let loaded = match path {
                Some(path) => Self::load(path),
                None => Self::load_default(),
            };
            loaded.map_err(|err| err.to_string())
        });

        match init {
            Ok(runtime) => {
                if let Some(path) = path {
                    if path != runtime.library.as_path() {
                        debug!(
                            "Runtime already loaded from {}, ignoring {}",
                            runtime.library.display(),
                            path.display()
                        );
                    }
                }
                Ok(runtime)
            }
            Err(msg) => Err(RuntimeError::Unavailable(msg.clone())),
        }
    }

    /// The process-wide runtime, loading the default library on first use.
    pub fn global() -> Result<&'static Runtime> {
        Self::init(None)
    }

    /// Path or name the library was loaded from.
    pub fn library(&self) -> &Path {
        &self.library
    }

    /// Version string reported by the library.
    pub fn version(&self) -> String {
        // SAFETY: TF_Version returns a static NUL-terminated string.
        unsafe { c_string((self.api.version)()) }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("library", &self.library)
            .finish()
    }
}

fn load_symbol<T: Copy>(lib: &Library, name: &'static [u8]) -> Result<T> {
    // SAFETY: Caller provides the symbol type declared by the TensorFlow C API.
    let sym = unsafe { lib.get::<T>(name) }.map_err(|source| RuntimeError::MissingSymbol {
        symbol: String::from_utf8_lossy(&name[..name.len().saturating_sub(1)]).into_owned(),
        source,
    })?;
    Ok(*sym)
}

/// Copy a runtime-owned C string; null reads as empty.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that stays valid
/// for the duration of the call.
pub(crate) unsafe fn c_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    // SAFETY: Non-null and NUL-terminated per the caller's contract.
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_library_fails() {
        let err = Runtime::load(Path::new("/nonexistent/libtensorflow.so")).unwrap_err();
        assert!(matches!(err, RuntimeError::LibraryLoad { .. }));
        assert!(err.to_string().contains("/nonexistent/libtensorflow.so"));
    }

    #[test]
    fn test_c_string_null_is_empty() {
        // SAFETY: Null is explicitly allowed.
        assert_eq!(unsafe { c_string(std::ptr::null()) }, "");
        let owned = std::ffi::CString::new("TF_FLOAT").unwrap();
        // SAFETY: Pointer comes from a live CString.
        assert_eq!(unsafe { c_string(owned.as_ptr()) }, "TF_FLOAT");
    }
}
