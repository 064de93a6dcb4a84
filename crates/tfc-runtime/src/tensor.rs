//! ndarray tensors exchanged with an [`InferenceBackend`](crate::InferenceBackend).

use ndarray::ArrayD;

use crate::error::RuntimeError;
use crate::native::{DataType, Runtime, Tensor, TensorElement};
use crate::Result;

/// Input tensor for inference.
#[derive(Debug, Clone)]
pub enum InputTensor {
    Float32(ArrayD<f32>),
    Float64(ArrayD<f64>),
    Int32(ArrayD<i32>),
    Int64(ArrayD<i64>),
    Uint8(ArrayD<u8>),
}

impl InputTensor {
    /// Get the shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        match self {
            InputTensor::Float32(arr) => arr.shape(),
            InputTensor::Float64(arr) => arr.shape(),
            InputTensor::Int32(arr) => arr.shape(),
            InputTensor::Int64(arr) => arr.shape(),
            InputTensor::Uint8(arr) => arr.shape(),
        }
    }

    /// Copy into a runtime tensor of the same shape and type.
    pub fn to_native(&self, rt: &'static Runtime) -> Result<Tensor> {
        match self {
            InputTensor::Float32(arr) => native_from_array(rt, arr),
            InputTensor::Float64(arr) => native_from_array(rt, arr),
            InputTensor::Int32(arr) => native_from_array(rt, arr),
            InputTensor::Int64(arr) => native_from_array(rt, arr),
            InputTensor::Uint8(arr) => native_from_array(rt, arr),
        }
    }
}

/// Output tensor from inference.
#[derive(Debug, Clone)]
pub enum OutputTensor {
    Float32(ArrayD<f32>),
    Float64(ArrayD<f64>),
    Int32(ArrayD<i32>),
    Int64(ArrayD<i64>),
    Uint8(ArrayD<u8>),
}

impl OutputTensor {
    /// Get the shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        match self {
            OutputTensor::Float32(arr) => arr.shape(),
            OutputTensor::Float64(arr) => arr.shape(),
            OutputTensor::Int32(arr) => arr.shape(),
            OutputTensor::Int64(arr) => arr.shape(),
            OutputTensor::Uint8(arr) => arr.shape(),
        }
    }

    /// Get the data type of the tensor.
    pub fn dtype(&self) -> DataType {
        match self {
            OutputTensor::Float32(_) => DataType::Float,
            OutputTensor::Float64(_) => DataType::Double,
            OutputTensor::Int32(_) => DataType::Int32,
            OutputTensor::Int64(_) => DataType::Int64,
            OutputTensor::Uint8(_) => DataType::UInt8,
        }
    }

    /// Copy a runtime tensor out, keyed on its element type.
    pub fn from_native(tensor: &Tensor) -> Result<Self> {
        let output = match tensor.dtype() {
            DataType::Float => OutputTensor::Float32(tensor.to_array()?),
            DataType::Double => OutputTensor::Float64(tensor.to_array()?),
            DataType::Int32 => OutputTensor::Int32(tensor.to_array()?),
            DataType::Int64 => OutputTensor::Int64(tensor.to_array()?),
            DataType::UInt8 => OutputTensor::Uint8(tensor.to_array()?),
            other => {
                return Err(RuntimeError::OutputExtraction(format!(
                    "unsupported output type {other}"
                )));
            }
        };
        Ok(output)
    }

    /// Flatten to `f32` values, widening or narrowing numeric types.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        match self {
            OutputTensor::Float32(arr) => arr.iter().copied().collect(),
            OutputTensor::Float64(arr) => arr.iter().map(|&v| v as f32).collect(),
            OutputTensor::Int32(arr) => arr.iter().map(|&v| v as f32).collect(),
            OutputTensor::Int64(arr) => arr.iter().map(|&v| v as f32).collect(),
            OutputTensor::Uint8(arr) => arr.iter().map(|&v| f32::from(v)).collect(),
        }
    }

    /// Convert to an `f32` array of the same shape.
    pub fn to_f32_array(&self) -> ArrayD<f32> {
        match self {
            OutputTensor::Float32(arr) => arr.clone(),
            OutputTensor::Float64(arr) => arr.mapv(|v| v as f32),
            OutputTensor::Int32(arr) => arr.mapv(|v| v as f32),
            OutputTensor::Int64(arr) => arr.mapv(|v| v as f32),
            OutputTensor::Uint8(arr) => arr.mapv(f32::from),
        }
    }
}

fn native_from_array<T: TensorElement>(rt: &'static Runtime, arr: &ArrayD<T>) -> Result<Tensor> {
    let dims: Vec<i64> = arr.shape().iter().map(|&s| s as i64).collect();
    let data: Vec<T> = arr.iter().copied().collect();
    Tensor::from_vec(rt, &dims, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_input_shape() {
        let input = InputTensor::Float32(ArrayD::zeros(IxDyn(&[1, 2, 3])));
        assert_eq!(input.shape(), &[1, 2, 3]);
    }

    #[test]
    fn test_output_to_f32_vec() {
        let arr = ArrayD::from_shape_vec(IxDyn(&[3]), vec![1i64, -2, 3]).unwrap();
        let output = OutputTensor::Int64(arr);
        assert_eq!(output.dtype(), DataType::Int64);
        assert_eq!(output.to_f32_vec(), vec![1.0, -2.0, 3.0]);
    }

    #[test]
    fn test_output_to_f32_array_keeps_shape() {
        let arr = ArrayD::from_shape_vec(IxDyn(&[1, 2, 2]), vec![0u8, 64, 128, 255]).unwrap();
        let output = OutputTensor::Uint8(arr);
        let floats = output.to_f32_array();
        assert_eq!(floats.shape(), output.shape());
        assert_eq!(floats[[0, 1, 1]], 255.0);
        assert_eq!(floats[[0, 0, 1]], 64.0);
    }

    #[test]
    fn test_native_round_trip_when_runtime_present() {
        // Needs libtensorflow; without it there is nothing to exercise.
        let Ok(rt) = Runtime::global() else {
            return;
        };
        let arr = ArrayD::from_shape_vec(IxDyn(&[2, 3]), vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0])
            .unwrap();
        let native = InputTensor::Float32(arr.clone()).to_native(rt).unwrap();
        assert_eq!(native.dims(), vec![2, 3]);

        let output = OutputTensor::from_native(&native).unwrap();
        assert_eq!(output.dtype(), DataType::Float);
        assert_eq!(output.to_f32_array(), arr);
    }
}
