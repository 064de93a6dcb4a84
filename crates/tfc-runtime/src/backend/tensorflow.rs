//! TensorFlow graph backend.

use tracing::debug;

use crate::error::RuntimeError;
use crate::native::{Graph, Output, Session, SessionConfig, Tensor};
use crate::tensor::{InputTensor, OutputTensor};
use super::order_inputs;
use crate::{InferenceBackend, Result};

/// A frozen graph with an open session and named input/output endpoints.
pub struct GraphModel {
    // Declared before `graph` so the session is deleted first.
    session: Session,
    graph: Graph,
    input_ops: Vec<Output>,
    output_ops: Vec<Output>,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

impl GraphModel {
    /// Open a session on `graph`.
    ///
    /// With `infer_io`, the first operation in the graph becomes the input
    /// and the last one the output.
    pub fn from_graph(graph: Graph, config: &SessionConfig, infer_io: bool) -> Result<Self> {
        let session = Session::with_config(&graph, config)?;
        let mut model = Self {
            session,
            graph,
            input_ops: Vec::new(),
            output_ops: Vec::new(),
            input_names: Vec::new(),
            output_names: Vec::new(),
        };
        if infer_io {
            model.infer_io()?;
        }
        Ok(model)
    }

    /// Use the first and last operations as input and output.
    pub fn infer_io(&mut self) -> Result<()> {
        let mut ops = self.graph.operations().map(|op| op.name());
        let first = ops
            .next()
            .ok_or_else(|| RuntimeError::InvalidInput("graph has no operations".to_string()))?;
        let last = ops.last().unwrap_or_else(|| first.clone());
        debug!("Inferred input {:?} and output {:?}", first, last);

        self.set_inputs(&[first])?;
        self.set_outputs(&[last])
    }

    /// Resolve input operation names. Nothing changes if any name is unknown.
    pub fn set_inputs<S: AsRef<str>>(&mut self, names: &[S]) -> Result<()> {
        let (ops, names) = self.resolve(names)?;
        self.input_ops = ops;
        self.input_names = names;
        Ok(())
    }

    /// Resolve output operation names. Nothing changes if any name is unknown.
    pub fn set_outputs<S: AsRef<str>>(&mut self, names: &[S]) -> Result<()> {
        let (ops, names) = self.resolve(names)?;
        self.output_ops = ops;
        self.output_names = names;
        Ok(())
    }

    fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Result<(Vec<Output>, Vec<String>)> {
        let mut ops = Vec::with_capacity(names.len());
        let mut resolved = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            ops.push(self.graph.require_operation(name)?.output(0));
            resolved.push(name.to_string());
        }
        Ok((ops, resolved))
    }

    /// Run the session with one tensor per configured input, in order.
    pub fn predict(&self, inputs: &[Tensor]) -> Result<Vec<Tensor>> {
        if inputs.len() != self.input_ops.len() {
            return Err(RuntimeError::InvalidInput(format!(
                "expected {} input tensors, got {}",
                self.input_ops.len(),
                inputs.len()
            )));
        }
        let feeds: Vec<(Output, &Tensor)> = self.input_ops.iter().copied().zip(inputs).collect();
        self.session.run(&feeds, &self.output_ops)
    }
}

impl InferenceBackend for GraphModel {
    fn run(&self, inputs: &[(&str, InputTensor)]) -> Result<Vec<(String, OutputTensor)>> {
        let rt = self.graph.runtime();
        let tensors = order_inputs(&self.input_names, inputs.iter().map(|(name, t)| (*name, t)))?
            .into_iter()
            .map(|tensor| tensor.to_native(rt))
            .collect::<Result<Vec<_>>>()?;

        let outputs = self.predict(&tensors)?;

        let mut results = Vec::with_capacity(outputs.len());
        for (name, tensor) in self.output_names.iter().zip(&outputs) {
            results.push((name.clone(), OutputTensor::from_native(tensor)?));
        }
        Ok(results)
    }

    fn input_names(&self) -> &[String] {
        &self.input_names
    }

    fn output_names(&self) -> &[String] {
        &self.output_names
    }
}
