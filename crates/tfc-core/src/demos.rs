//! The example workflows.
//!
//! Each workflow loads what it needs, does one thing with the runtime and
//! releases every handle before returning. Failures carry the site they
//! happened at so the CLI can report a distinct exit code.

use std::path::Path;

use serde::Serialize;
use tfc_guard::on_success;
use ndarray::Array3;
use tfc_runtime::{
    Buffer, DataType, Graph, GraphModel, InferenceBackend, InputTensor, Operation, OutputTensor,
    Runtime, RuntimeError, Session, SessionConfig, Tensor, read_file,
};
use tracing::{debug, info, warn};

use crate::config::{InputConfig, RuntimeConfig, TfcConfig};
use crate::error::{DemoError, TensorCheck};
use crate::image::{ChannelOrder, load_batch, split_output_images};

/// Load the runtime library configured in `config`.
pub fn runtime(config: &RuntimeConfig) -> Result<&'static Runtime, DemoError> {
    Runtime::init(config.resolve_library().as_deref()).map_err(DemoError::RuntimeUnavailable)
}

/// Version string of the loaded runtime.
pub fn version(config: &TfcConfig) -> Result<String, DemoError> {
    Ok(runtime(&config.runtime)?.version())
}

/// Summary of a successfully imported graph.
#[derive(Debug, Clone, Serialize)]
pub struct GraphSummary {
    pub bytes: usize,
    pub operations: usize,
}

/// Read a GraphDef file and import it.
///
/// The file is read before the runtime is loaded, so unreadable and empty
/// files are reported even when TensorFlow is not installed.
pub fn load_graph(config: &TfcConfig, path: &Path) -> Result<GraphSummary, DemoError> {
    let bytes = read_file(path).map_err(DemoError::ReadGraph)?;
    let size = bytes.len();
    let rt = runtime(&config.runtime)?;

    let buffer = Buffer::from_bytes(rt, bytes).map_err(DemoError::at(DemoError::ReadGraph))?;
    let mut graph = Graph::new(rt).map_err(DemoError::at(DemoError::ImportGraph))?;
    graph
        .import(&buffer)
        .map_err(DemoError::at(DemoError::ImportGraph))?;
    drop(buffer);

    let summary = GraphSummary {
        bytes: size,
        operations: graph.operations().count(),
    };
    info!("Loaded graph {} ({} operations)", path.display(), summary.operations);
    Ok(summary)
}

fn open_graph(config: &TfcConfig, path: &Path) -> Result<Graph, DemoError> {
    let bytes = read_file(path).map_err(DemoError::LoadGraph)?;
    let rt = runtime(&config.runtime)?;
    Graph::from_graph_def(rt, bytes).map_err(DemoError::at(DemoError::LoadGraph))
}

/// One input of an operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputInfo {
    pub index: usize,
    pub dtype: String,
}

/// One output of an operation with its static shape, when the graph knows it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputInfo {
    pub index: usize,
    pub dtype: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shape: Option<Vec<i64>>,
}

/// Description of a graph operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationInfo {
    pub name: String,
    pub op_type: String,
    pub device: String,
    pub inputs: Vec<InputInfo>,
    pub outputs: Vec<OutputInfo>,
}

impl OperationInfo {
    fn describe(op: &Operation<'_>) -> Self {
        let inputs = (0..op.num_inputs())
            .map(|index| InputInfo {
                index,
                dtype: op.input_type(index).name().to_string(),
            })
            .collect();

        let outputs = (0..op.num_outputs())
            .map(|index| {
                let shape = match op.output_shape(index) {
                    Ok(shape) => shape,
                    Err(err) => {
                        warn!("Can't get shape of {}:{}: {}", op.name(), index, err);
                        None
                    }
                };
                OutputInfo {
                    index,
                    dtype: op.output_type(index).name().to_string(),
                    shape,
                }
            })
            .collect();

        Self {
            name: op.name(),
            op_type: op.op_type(),
            device: op.device(),
            inputs,
            outputs,
        }
    }
}

/// Describe every operation in the graph, in graph order.
pub fn graph_info(config: &TfcConfig, path: &Path) -> Result<Vec<OperationInfo>, DemoError> {
    let graph = open_graph(config, path)?;
    let ops: Vec<OperationInfo> = graph.operations().map(|op| OperationInfo::describe(&op)).collect();
    debug!("Described {} operations", ops.len());
    Ok(ops)
}

/// Description of a requested operation; `operation` is `None` when absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TensorInfo {
    pub name: String,
    pub operation: Option<OperationInfo>,
}

/// Describe the named operations. Missing names are reported, not fatal.
pub fn tensor_info<S: AsRef<str>>(
    config: &TfcConfig,
    path: &Path,
    names: &[S],
) -> Result<Vec<TensorInfo>, DemoError> {
    let graph = open_graph(config, path)?;
    let infos = names
        .iter()
        .map(|name| {
            let name = name.as_ref();
            let operation = match graph.operation_by_name(name) {
                Ok(Some(op)) => Some(OperationInfo::describe(&op)),
                Ok(None) => {
                    warn!("Operation {} not found", name);
                    None
                }
                Err(err) => {
                    warn!("{}", err);
                    None
                }
            };
            TensorInfo {
                name: name.to_string(),
                operation,
            }
        })
        .collect();
    Ok(infos)
}

/// Properties read back from a tensor, detached from the runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorSnapshot {
    pub dtype: DataType,
    pub dims: Vec<i64>,
    pub byte_size: usize,
    pub has_data: bool,
    /// Elements as `f32`; empty unless the tensor holds floats.
    pub values: Vec<f32>,
}

impl TensorSnapshot {
    pub fn capture(tensor: &Tensor) -> Self {
        let dtype = tensor.dtype();
        let values = match dtype {
            DataType::Float => tensor.to_vec::<f32>().unwrap_or_default(),
            _ => Vec::new(),
        };
        Self {
            dtype,
            dims: tensor.dims(),
            byte_size: tensor.byte_size(),
            has_data: !tensor.data_ptr().is_null(),
            values,
        }
    }
}

/// Check a float tensor against the shape and values it was built from.
///
/// Checks run in a fixed order and stop at the first failure.
pub fn verify_tensor(
    snapshot: Option<&TensorSnapshot>,
    dims: &[i64],
    values: &[f32],
) -> Result<(), TensorCheck> {
    let snapshot = snapshot.ok_or(TensorCheck::NullTensor)?;

    if snapshot.dtype != DataType::Float {
        return Err(TensorCheck::WrongType {
            expected: DataType::Float,
            actual: snapshot.dtype,
        });
    }
    if snapshot.dims.len() != dims.len() {
        return Err(TensorCheck::WrongRank {
            expected: dims.len(),
            actual: snapshot.dims.len(),
        });
    }
    if let Some(index) = (0..dims.len()).find(|&i| snapshot.dims[i] != dims[i]) {
        return Err(TensorCheck::WrongDim {
            index,
            expected: dims[index],
            actual: snapshot.dims[index],
        });
    }
    let expected_bytes = std::mem::size_of_val(values);
    if snapshot.byte_size != expected_bytes {
        return Err(TensorCheck::WrongByteSize {
            expected: expected_bytes,
            actual: snapshot.byte_size,
        });
    }
    if !snapshot.has_data {
        return Err(TensorCheck::NullData);
    }
    let mismatch = values
        .iter()
        .enumerate()
        .find(|&(i, v)| snapshot.values.get(i).map(|a| a.to_bits()) != Some(v.to_bits()));
    if let Some((index, _)) = mismatch {
        return Err(TensorCheck::ElementMismatch { index });
    }
    Ok(())
}

/// Build the input tensor from an owned buffer and verify every property.
pub fn create_tensor(config: &TfcConfig) -> Result<TensorSnapshot, DemoError> {
    let input = validated_input(&config.input)?;
    let rt = runtime(&config.runtime)?;

    let tensor = match Tensor::from_vec(rt, &input.dims, input.values.clone()) {
        Ok(tensor) => Some(tensor),
        Err(err) => {
            warn!("{}", err);
            None
        }
    };
    let snapshot = tensor.as_ref().map(TensorSnapshot::capture);
    verify_tensor(snapshot.as_ref(), &input.dims, &input.values)?;

    info!("Success create tensor");
    snapshot.ok_or(DemoError::Tensor(TensorCheck::NullTensor))
}

/// Output of a session run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutput {
    pub dims: Vec<i64>,
    pub values: Vec<f32>,
}

/// Feed the configured input into the input operation and fetch the output.
///
/// Close and delete failures are reported with their own sites.
pub fn session_run(config: &TfcConfig, path: &Path) -> Result<RunOutput, DemoError> {
    let input = validated_input(&config.input)?;
    let session_config = session_config(config)?;
    let graph = open_graph(config, path)?;
    let rt = graph.runtime();

    let input_op = graph
        .operation_by_name(&config.graph.input_op)
        .ok()
        .flatten()
        .ok_or_else(|| DemoError::InputOp(config.graph.input_op.clone()))?
        .output(0);
    let output_op = graph
        .operation_by_name(&config.graph.output_op)
        .ok()
        .flatten()
        .ok_or_else(|| DemoError::OutputOp(config.graph.output_op.clone()))?
        .output(0);

    let input_tensor =
        Tensor::from_vec(rt, &input.dims, input.values.clone()).map_err(DemoError::InputTensor)?;

    let mut session =
        Session::with_config(&graph, &session_config).map_err(DemoError::CreateSession)?;
    let outputs = session
        .run(&[(input_op, &input_tensor)], &[output_op])
        .map_err(DemoError::RunSession)?;
    session.close().map_err(DemoError::CloseSession)?;
    session.delete().map_err(DemoError::DeleteSession)?;

    let output = outputs
        .first()
        .ok_or_else(|| DemoError::RunSession(RuntimeError::OutputExtraction("no output".into())))?;
    Ok(RunOutput {
        dims: output.dims(),
        values: output.to_vec::<f32>().map_err(DemoError::RunSession)?,
    })
}

/// How `predict` chooses its endpoints and prepares images.
#[derive(Debug, Clone, Default)]
pub struct PredictOptions {
    /// Input operation; falls back to the graph config.
    pub input_op: Option<String>,
    /// Output operation; falls back to the graph config.
    pub output_op: Option<String>,
    /// Use the first and last operations, ignoring names.
    pub infer_io: bool,
    /// Resize every image to `width x height` before batching.
    pub resize: Option<(u32, u32)>,
    /// Channel order of the batch; falls back to the graph config.
    pub channel_order: Option<ChannelOrder>,
}

/// Run a batch of images through a model and return one vector per output.
pub fn predict<P: AsRef<Path>>(
    config: &TfcConfig,
    path: &Path,
    images: &[P],
    options: &PredictOptions,
) -> Result<Vec<Vec<f32>>, DemoError> {
    let outputs = run_prediction(config, path, images, options)?;
    Ok(outputs.iter().map(|(_, tensor)| tensor.to_f32_vec()).collect())
}

/// One output of an image-to-image model, split per batch item.
#[derive(Debug, Clone)]
pub struct OutputImages {
    pub name: String,
    /// `H x W x C` maps; `C` may exceed the usual image channel counts.
    pub images: Vec<Array3<f32>>,
}

/// Run a batch of images through a model whose outputs are `N x H x W x C` maps.
pub fn predict_images<P: AsRef<Path>>(
    config: &TfcConfig,
    path: &Path,
    images: &[P],
    options: &PredictOptions,
) -> Result<Vec<OutputImages>, DemoError> {
    run_prediction(config, path, images, options)?
        .into_iter()
        .map(|(name, tensor)| {
            let images = split_output_images(&tensor.to_f32_array()).map_err(DemoError::Image)?;
            Ok(OutputImages { name, images })
        })
        .collect()
}

fn run_prediction<P: AsRef<Path>>(
    config: &TfcConfig,
    path: &Path,
    images: &[P],
    options: &PredictOptions,
) -> Result<Vec<(String, OutputTensor)>, DemoError> {
    let session_config = session_config(config)?;
    let graph = open_graph(config, path)?;

    let mut model = GraphModel::from_graph(graph, &session_config, false)
        .map_err(DemoError::CreateSession)?;
    let _done = on_success(|| debug!("Prediction finished, releasing model"));

    if options.infer_io || config.graph.infer_io {
        model
            .infer_io()
            .map_err(|_| DemoError::InputOp("<first operation>".to_string()))?;
    } else {
        let input_op = options.input_op.as_ref().unwrap_or(&config.graph.input_op);
        let output_op = options.output_op.as_ref().unwrap_or(&config.graph.output_op);
        model
            .set_inputs(&[input_op])
            .map_err(|_| DemoError::InputOp(input_op.clone()))?;
        model
            .set_outputs(&[output_op])
            .map_err(|_| DemoError::OutputOp(output_op.clone()))?;
    }

    let order = options.channel_order.unwrap_or(config.graph.channel_order);
    let batch = load_batch(images, options.resize, order).map_err(DemoError::Image)?;
    let input = InputTensor::Float32(batch.into_dyn());
    debug!("Feeding batch of shape {:?}", input.shape());

    let feeds: Vec<(&str, InputTensor)> = model
        .input_names()
        .iter()
        .map(String::as_str)
        .zip(std::iter::once(input))
        .collect();
    let outputs = model.run(&feeds).map_err(DemoError::RunSession)?;
    for (name, tensor) in &outputs {
        debug!("Output {} is {} {:?}", name, tensor.dtype(), tensor.shape());
    }
    Ok(outputs)
}

fn session_config(config: &TfcConfig) -> Result<SessionConfig, DemoError> {
    config
        .session
        .to_session_config()
        .map_err(|e| DemoError::Config(e.to_string()))
}

fn validated_input(input: &InputConfig) -> Result<&InputConfig, DemoError> {
    input
        .validate()
        .map_err(|e| DemoError::Config(e.to_string()))?;
    Ok(input)
}
