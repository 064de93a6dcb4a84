//! Graphs and their operations.

use std::ffi::{CString, c_int};
use std::fmt;
use std::ptr;

use tracing::debug;

use super::buffer::Buffer;
use super::dtype::DataType;
use super::ffi::{
    Runtime, TF_Graph, TF_ImportGraphDefOptions, TF_Input, TF_Operation, TF_Output, c_string,
};
use super::status::Status;
use crate::Result;
use crate::error::RuntimeError;

/// Owning wrapper over `TF_Graph`.
pub struct Graph {
    rt: &'static Runtime,
    ptr: *mut TF_Graph,
}

impl Graph {
    /// Create an empty graph.
    pub fn new(rt: &'static Runtime) -> Result<Self> {
        // SAFETY: TF_NewGraph has no preconditions.
        let ptr = unsafe { (rt.api.new_graph)() };
        if ptr.is_null() {
            return Err(RuntimeError::NullHandle("graph"));
        }
        Ok(Self { rt, ptr })
    }

    /// Import the serialized GraphDef in `bytes` into a new graph.
    pub fn from_graph_def(rt: &'static Runtime, bytes: Vec<u8>) -> Result<Self> {
        let buffer = Buffer::from_bytes(rt, bytes)?;
        let mut graph = Self::new(rt)?;
        graph.import(&buffer)?;
        Ok(graph)
    }

    /// Import a serialized GraphDef into this graph.
    pub fn import(&mut self, graph_def: &Buffer) -> Result<()> {
        let options = ImportOptions::new(self.rt)?;
        let status = Status::new(self.rt)?;
        // SAFETY: All handles are live and owned by the wrappers above.
        unsafe {
            (self.rt.api.graph_import_graph_def)(
                self.ptr,
                graph_def.as_ptr(),
                options.ptr,
                status.as_ptr(),
            )
        };
        status.check("import graph")?;
        debug!("Imported GraphDef of {} bytes", graph_def.len());
        Ok(())
    }

    /// Look up an operation by name.
    pub fn operation_by_name(&self, name: &str) -> Result<Option<Operation<'_>>> {
        let c_name = CString::new(name)
            .map_err(|_| RuntimeError::InvalidInput(format!("operation name {name:?} contains NUL")))?;
        // SAFETY: Graph is live and the name is NUL-terminated.
        let op = unsafe { (self.rt.api.graph_operation_by_name)(self.ptr, c_name.as_ptr()) };
        Ok(Operation::from_raw(self, op))
    }

    /// Like [`Graph::operation_by_name`], but a missing operation is an error.
    pub fn require_operation(&self, name: &str) -> Result<Operation<'_>> {
        self.operation_by_name(name)?
            .ok_or_else(|| RuntimeError::OperationNotFound(name.to_string()))
    }

    /// Iterate over every operation in insertion order.
    pub fn operations(&self) -> Operations<'_> {
        Operations {
            graph: self,
            pos: 0,
        }
    }

    pub fn runtime(&self) -> &'static Runtime {
        self.rt
    }

    pub(crate) fn as_ptr(&self) -> *mut TF_Graph {
        self.ptr
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph").field("ptr", &self.ptr).finish()
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            // SAFETY: Graph is owned by this wrapper and deleted once. The runtime
            // defers the actual release while sessions still reference it.
            unsafe { (self.rt.api.delete_graph)(self.ptr) };
            self.ptr = ptr::null_mut();
        }
    }
}

struct ImportOptions {
    rt: &'static Runtime,
    ptr: *mut TF_ImportGraphDefOptions,
}

impl ImportOptions {
    fn new(rt: &'static Runtime) -> Result<Self> {
        // SAFETY: No preconditions.
        let ptr = unsafe { (rt.api.new_import_options)() };
        if ptr.is_null() {
            return Err(RuntimeError::NullHandle("import options"));
        }
        Ok(Self { rt, ptr })
    }
}

impl Drop for ImportOptions {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            // SAFETY: Owned by this wrapper and deleted once.
            unsafe { (self.rt.api.delete_import_options)(self.ptr) };
        }
    }
}

/// An operation borrowed from a [`Graph`].
#[derive(Clone, Copy)]
pub struct Operation<'g> {
    graph: &'g Graph,
    ptr: *mut TF_Operation,
}

impl<'g> Operation<'g> {
    fn from_raw(graph: &'g Graph, ptr: *mut TF_Operation) -> Option<Self> {
        (!ptr.is_null()).then_some(Self { graph, ptr })
    }

    pub fn name(&self) -> String {
        // SAFETY: Operation strings live as long as the graph.
        unsafe { c_string((self.graph.rt.api.operation_name)(self.ptr)) }
    }

    pub fn op_type(&self) -> String {
        // SAFETY: As above.
        unsafe { c_string((self.graph.rt.api.operation_op_type)(self.ptr)) }
    }

    pub fn device(&self) -> String {
        // SAFETY: As above.
        unsafe { c_string((self.graph.rt.api.operation_device)(self.ptr)) }
    }

    pub fn num_inputs(&self) -> usize {
        // SAFETY: Operation is live while the graph is borrowed.
        let count = unsafe { (self.graph.rt.api.operation_num_inputs)(self.ptr) };
        usize::try_from(count).unwrap_or(0)
    }

    pub fn num_outputs(&self) -> usize {
        // SAFETY: Operation is live while the graph is borrowed.
        let count = unsafe { (self.graph.rt.api.operation_num_outputs)(self.ptr) };
        usize::try_from(count).unwrap_or(0)
    }

    pub fn input_type(&self, index: usize) -> DataType {
        let input = TF_Input {
            oper: self.ptr,
            index: index as c_int,
        };
        // SAFETY: Operation is live; the runtime range-checks the index.
        DataType::from_raw(unsafe { (self.graph.rt.api.operation_input_type)(input) })
    }

    pub fn output_type(&self, index: usize) -> DataType {
        let output = self.raw_output(index);
        // SAFETY: Operation is live; the runtime range-checks the index.
        DataType::from_raw(unsafe { (self.graph.rt.api.operation_output_type)(output) })
    }

    /// Endpoint for output `index`, usable as a session feed or fetch.
    pub fn output(&self, index: usize) -> Output {
        Output {
            raw: self.raw_output(index),
        }
    }

    /// Static shape of output `index`, `None` when the rank is unknown.
    /// Unknown dimensions are reported as `-1`.
    pub fn output_shape(&self, index: usize) -> Result<Option<Vec<i64>>> {
        let rt = self.graph.rt;
        let output = self.raw_output(index);
        let status = Status::new(rt)?;

        // SAFETY: Graph, operation and status are live.
        let num_dims = unsafe {
            (rt.api.graph_get_tensor_num_dims)(self.graph.ptr, output, status.as_ptr())
        };
        status.check("get tensor rank")?;
        if num_dims < 0 {
            return Ok(None);
        }

        let mut dims = vec![0i64; num_dims as usize];
        if num_dims > 0 {
            // SAFETY: `dims` holds exactly `num_dims` slots.
            unsafe {
                (rt.api.graph_get_tensor_shape)(
                    self.graph.ptr,
                    output,
                    dims.as_mut_ptr(),
                    num_dims,
                    status.as_ptr(),
                )
            };
            status.check("get tensor shape")?;
        }
        Ok(Some(dims))
    }

    fn raw_output(&self, index: usize) -> TF_Output {
        TF_Output {
            oper: self.ptr,
            index: index as c_int,
        }
    }
}

impl fmt::Debug for Operation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name())
            .field("op_type", &self.op_type())
            .finish()
    }
}

/// Iterator over a graph's operations.
pub struct Operations<'g> {
    graph: &'g Graph,
    pos: usize,
}

impl<'g> Iterator for Operations<'g> {
    type Item = Operation<'g>;

    fn next(&mut self) -> Option<Self::Item> {
        // SAFETY: Graph is live; `pos` is the runtime's own cursor.
        let op = unsafe { (self.graph.rt.api.graph_next_operation)(self.graph.ptr, &mut self.pos) };
        Operation::from_raw(self.graph, op)
    }
}

/// A graph endpoint (operation output) used to feed or fetch tensors.
///
/// Only valid while the graph it came from is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Output {
    raw: TF_Output,
}

impl Output {
    pub fn index(&self) -> usize {
        self.raw.index as usize
    }

    pub(crate) fn raw(&self) -> TF_Output {
        self.raw
    }
}
