//! Tensors and the byte-level helpers used to fill them.

use std::ffi::{c_int, c_void};
use std::fmt;
use std::mem;
use std::ptr;

use ndarray::{ArrayD, IxDyn};
use tracing::trace;

use super::dtype::{DataType, TensorElement};
use super::ffi::{Runtime, TF_Tensor};
use crate::Result;
use crate::error::RuntimeError;

/// Owning wrapper over `TF_Tensor`.
pub struct Tensor {
    rt: &'static Runtime,
    ptr: *mut TF_Tensor,
}

impl Tensor {
    /// Allocate an uninitialized tensor of `len` bytes.
    pub fn allocate(rt: &'static Runtime, dtype: DataType, dims: &[i64], len: usize) -> Result<Self> {
        let num_dims = rank(dims)?;
        // SAFETY: `dims` holds `num_dims` entries for the duration of the call.
        let ptr = unsafe { (rt.api.allocate_tensor)(dtype.to_raw(), dims.as_ptr(), num_dims, len) };
        // SAFETY: Ownership of a non-null tensor passes to the wrapper.
        unsafe { Self::from_raw(rt, ptr) }.ok_or(RuntimeError::NullHandle("tensor"))
    }

    /// Allocate a zero-filled tensor sized for `dims` elements of `dtype`.
    pub fn empty(rt: &'static Runtime, dtype: DataType, dims: &[i64]) -> Result<Self> {
        let size = dtype.size().ok_or_else(|| {
            RuntimeError::InvalidInput(format!("{dtype} has no fixed element size"))
        })?;
        let len = element_count(dims)?
            .checked_mul(size)
            .ok_or_else(|| overflow(dims))?;
        let mut tensor = Self::allocate(rt, dtype, dims, len)?;
        tensor.as_bytes_mut().fill(0);
        Ok(tensor)
    }

    /// Allocate a tensor for `dims` and copy `data` into it.
    ///
    /// The copy is clamped to the allocated capacity, so a longer `data`
    /// is truncated rather than overrunning the tensor.
    pub fn from_bytes(rt: &'static Runtime, dtype: DataType, dims: &[i64], data: &[u8]) -> Result<Self> {
        let capacity = capacity(dtype, dims, data.len())?;
        let mut tensor = Self::allocate(rt, dtype, dims, capacity)?;
        let copied = tensor.set_data(data);
        if copied < data.len() {
            trace!("Clamped tensor data from {} to {} bytes", data.len(), copied);
        }
        Ok(tensor)
    }

    /// Allocate a tensor and copy `values` into it.
    pub fn from_slice<T: TensorElement>(rt: &'static Runtime, dims: &[i64], values: &[T]) -> Result<Self> {
        // SAFETY: `T` is a plain numeric type; viewing it as bytes is sound.
        let bytes = unsafe {
            std::slice::from_raw_parts(values.as_ptr().cast::<u8>(), mem::size_of_val(values))
        };
        Self::from_bytes(rt, T::DATA_TYPE, dims, bytes)
    }

    /// Hand `values` to the runtime without copying.
    ///
    /// The runtime calls back into this crate to free the storage once the
    /// tensor is deleted. Ownership passes even if creation fails.
    pub fn from_vec<T: TensorElement>(rt: &'static Runtime, dims: &[i64], values: Vec<T>) -> Result<Self> {
        let expected = element_count(dims)?;
        if values.len() != expected {
            return Err(RuntimeError::InvalidInput(format!(
                "{} values do not fill shape {dims:?} ({expected} elements)",
                values.len()
            )));
        }
        let num_dims = rank(dims)?;

        let len = mem::size_of_val(values.as_slice());
        let data = Box::into_raw(values.into_boxed_slice()).cast::<T>();

        // SAFETY: `data`/`len` describe the boxed slice leaked above; the
        // deallocator reconstructs it with the same element type.
        let ptr = unsafe {
            (rt.api.new_tensor)(
                T::DATA_TYPE.to_raw(),
                dims.as_ptr(),
                num_dims,
                data.cast::<c_void>(),
                len,
                Some(deallocate_boxed::<T>),
                ptr::null_mut(),
            )
        };
        // SAFETY: Ownership of a non-null tensor passes to the wrapper.
        unsafe { Self::from_raw(rt, ptr) }.ok_or(RuntimeError::NullHandle("tensor"))
    }

    /// Wrap a raw tensor, taking ownership. Returns `None` for null.
    ///
    /// # Safety
    /// `ptr` must be null or a tensor created by `rt` and not owned elsewhere.
    pub(crate) unsafe fn from_raw(rt: &'static Runtime, ptr: *mut TF_Tensor) -> Option<Self> {
        (!ptr.is_null()).then_some(Self { rt, ptr })
    }

    /// Copy `src` into the tensor's memory, clamped to its byte size.
    /// Returns the number of bytes copied.
    pub fn set_data(&mut self, src: &[u8]) -> usize {
        copy_clamped(self.as_bytes_mut(), src)
    }

    pub fn dtype(&self) -> DataType {
        // SAFETY: `ptr` is a live tensor owned by self.
        DataType::from_raw(unsafe { (self.rt.api.tensor_type)(self.ptr) })
    }

    pub fn num_dims(&self) -> usize {
        // SAFETY: As above.
        let n = unsafe { (self.rt.api.num_dims)(self.ptr) };
        usize::try_from(n).unwrap_or(0)
    }

    pub fn dim(&self, index: usize) -> i64 {
        // SAFETY: As above; the runtime range-checks the index.
        unsafe { (self.rt.api.dim)(self.ptr, index as c_int) }
    }

    pub fn dims(&self) -> Vec<i64> {
        (0..self.num_dims()).map(|i| self.dim(i)).collect()
    }

    pub fn byte_size(&self) -> usize {
        // SAFETY: As above.
        unsafe { (self.rt.api.tensor_byte_size)(self.ptr) }
    }

    /// Pointer to the tensor's storage. Null for tensors without storage.
    pub fn data_ptr(&self) -> *const u8 {
        // SAFETY: As above.
        unsafe { (self.rt.api.tensor_data)(self.ptr) }.cast::<u8>().cast_const()
    }

    pub fn as_bytes(&self) -> &[u8] {
        let data = self.data_ptr();
        let len = self.byte_size();
        if data.is_null() || len == 0 {
            return &[];
        }
        // SAFETY: The runtime guarantees `len` readable bytes at `data` while
        // the tensor lives, and `&self` prevents concurrent mutation.
        unsafe { std::slice::from_raw_parts(data, len) }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        let data = self.data_ptr().cast_mut();
        let len = self.byte_size();
        if data.is_null() || len == 0 {
            return &mut [];
        }
        // SAFETY: As in `as_bytes`, with exclusive access through `&mut self`.
        unsafe { std::slice::from_raw_parts_mut(data, len) }
    }

    /// Copy the elements out as `T`. Fails if the element type differs.
    pub fn to_vec<T: TensorElement>(&self) -> Result<Vec<T>> {
        let actual = self.dtype();
        if actual != T::DATA_TYPE {
            return Err(RuntimeError::TypeMismatch {
                expected: T::DATA_TYPE,
                actual,
            });
        }

        let bytes = self.as_bytes();
        let count = bytes.len() / mem::size_of::<T>();
        let base = bytes.as_ptr().cast::<T>();
        // SAFETY: `count` whole elements fit in `bytes`; reads tolerate misalignment.
        let values = (0..count)
            .map(|i| unsafe { ptr::read_unaligned(base.add(i)) })
            .collect();
        Ok(values)
    }

    /// Copy the elements out as an array shaped like the tensor.
    pub fn to_array<T: TensorElement>(&self) -> Result<ArrayD<T>> {
        let shape = self
            .dims()
            .into_iter()
            .map(|d| {
                usize::try_from(d).map_err(|_| {
                    RuntimeError::OutputExtraction(format!("negative dimension {d}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let values = self.to_vec::<T>()?;
        ArrayD::from_shape_vec(IxDyn(&shape), values)
            .map_err(|e| RuntimeError::OutputExtraction(e.to_string()))
    }

    pub(crate) fn as_ptr(&self) -> *mut TF_Tensor {
        self.ptr
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("dtype", &self.dtype())
            .field("dims", &self.dims())
            .field("byte_size", &self.byte_size())
            .finish()
    }
}

impl Drop for Tensor {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            // SAFETY: Tensor is owned by this wrapper and deleted once.
            unsafe { (self.rt.api.delete_tensor)(self.ptr) };
            self.ptr = ptr::null_mut();
        }
    }
}

/// Copy as much of `src` into `dst` as fits. Returns the number of bytes copied.
///
/// Bytes of `dst` past the copied prefix are left untouched.
pub fn copy_clamped(dst: &mut [u8], src: &[u8]) -> usize {
    let n = dst.len().min(src.len());
    dst[..n].copy_from_slice(&src[..n]);
    n
}

/// Number of elements described by `dims`. Negative dimensions count as zero.
///
/// Fails if the product does not fit in `usize`.
pub fn element_count(dims: &[i64]) -> Result<usize> {
    dims.iter()
        .map(|&d| usize::try_from(d).unwrap_or(0))
        .try_fold(1usize, |acc, d| acc.checked_mul(d))
        .ok_or_else(|| overflow(dims))
}

/// Bytes to allocate for a tensor of `dims` filled from `data_len` bytes.
///
/// Fixed-size types get exactly enough room for every element. Types without
/// a fixed size take the data length as is.
pub fn capacity(dtype: DataType, dims: &[i64], data_len: usize) -> Result<usize> {
    match dtype.size() {
        Some(size) => element_count(dims)?
            .checked_mul(size)
            .ok_or_else(|| overflow(dims)),
        None => Ok(data_len),
    }
}

fn overflow(dims: &[i64]) -> RuntimeError {
    RuntimeError::InvalidInput(format!("shape {dims:?} is too large"))
}

fn rank(dims: &[i64]) -> Result<c_int> {
    c_int::try_from(dims.len())
        .map_err(|_| RuntimeError::InvalidInput(format!("rank {} is too large", dims.len())))
}

unsafe extern "C" fn deallocate_boxed<T>(data: *mut c_void, length: usize, _arg: *mut c_void) {
    trace!("Deallocating {length} bytes of tensor data");
    let count = length / mem::size_of::<T>().max(1);
    // SAFETY: Only installed by `Tensor::from_vec`, which leaked a `Box<[T]>`
    // of exactly `count` elements at `data`.
    unsafe { drop(Box::from_raw(ptr::slice_from_raw_parts_mut(data.cast::<T>(), count))) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_copy_clamped_truncates_to_destination() {
        let src: Vec<u8> = (0..64).collect();
        let mut dst = [0xAAu8; 48];
        assert_eq!(copy_clamped(&mut dst, &src), 48);
        assert_eq!(&dst[..], &src[..48]);
    }

    #[test]
    fn test_copy_clamped_leaves_tail_untouched() {
        let src = [1u8; 16];
        let mut dst = [0xAAu8; 48];
        assert_eq!(copy_clamped(&mut dst, &src), 16);
        assert_eq!(&dst[..16], &src[..]);
        assert!(dst[16..].iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn test_copy_clamped_empty() {
        let mut dst = [7u8; 4];
        assert_eq!(copy_clamped(&mut dst, &[]), 0);
        assert_eq!(dst, [7u8; 4]);
        assert_eq!(copy_clamped(&mut [], &[1, 2, 3]), 0);
    }

    #[test]
    fn test_element_count() {
        assert_eq!(element_count(&[1, 5, 12]).unwrap(), 60);
        assert_eq!(element_count(&[]).unwrap(), 1);
        assert_eq!(element_count(&[3, 0]).unwrap(), 0);
        assert_eq!(element_count(&[-1, 4]).unwrap(), 0);
    }

    #[test]
    fn test_element_count_overflow_is_error() {
        let huge = 1i64 << 32;
        assert!(matches!(
            element_count(&[huge, huge, huge]),
            Err(RuntimeError::InvalidInput(_))
        ));
        assert!(element_count(&[i64::MAX, 3]).is_err());
        // A zero dimension still wins over sizes that would overflow alone.
        assert_eq!(element_count(&[0, i64::MAX]).unwrap(), 0);
    }

    #[test]
    fn test_capacity_fixed_size_types() {
        assert_eq!(capacity(DataType::Float, &[1, 5, 12], 0).unwrap(), 240);
        assert_eq!(capacity(DataType::Float, &[4, 3], 64).unwrap(), 48);
        assert_eq!(capacity(DataType::Double, &[2], 1000).unwrap(), 16);
        assert_eq!(capacity(DataType::UInt8, &[], 5).unwrap(), 1);
    }

    #[test]
    fn test_capacity_negative_dims_is_zero() {
        assert_eq!(capacity(DataType::Float, &[-1, 12], 48).unwrap(), 0);
        assert_eq!(capacity(DataType::Int64, &[3, -2], 0).unwrap(), 0);
    }

    #[test]
    fn test_capacity_variable_size_type_uses_data_len() {
        assert_eq!(DataType::String.size(), None);
        assert_eq!(capacity(DataType::String, &[2, 2], 37).unwrap(), 37);
        assert_eq!(capacity(DataType::String, &[i64::MAX, i64::MAX], 3).unwrap(), 3);
    }

    #[test]
    fn test_capacity_overflow_is_error() {
        let dims = [1i64 << 31, 1 << 31, 4];
        assert!(capacity(DataType::Float, &dims, 0).is_err());
        assert!(capacity(DataType::Double, &[i64::MAX / 2], 0).is_err());
    }

    #[test]
    fn test_deallocate_boxed_frees_vec() {
        let values = vec![1.0f32, 2.0, 3.0].into_boxed_slice();
        let length = mem::size_of_val(&*values);
        let data = Box::into_raw(values).cast::<f32>();
        // SAFETY: Matches the allocation above.
        unsafe { deallocate_boxed::<f32>(data.cast(), length, ptr::null_mut()) };
    }

    proptest! {
        #[test]
        fn copy_clamped_never_exceeds_destination(
            src in proptest::collection::vec(any::<u8>(), 0..256),
            dst_len in 0usize..256,
        ) {
            let mut dst = vec![0x5Au8; dst_len];
            let copied = copy_clamped(&mut dst, &src);
            prop_assert_eq!(copied, dst_len.min(src.len()));
            prop_assert_eq!(&dst[..copied], &src[..copied]);
            prop_assert!(dst[copied..].iter().all(|&b| b == 0x5A));
        }

        #[test]
        fn clamped_copy_into_capacity_never_overruns(
            dims in proptest::collection::vec(-2i64..6, 0..4),
            src in proptest::collection::vec(any::<u8>(), 0..512),
        ) {
            let cap = capacity(DataType::Float, &dims, src.len()).unwrap();
            let mut dst = vec![0u8; cap];
            let copied = copy_clamped(&mut dst, &src);
            prop_assert!(copied <= cap);
            prop_assert_eq!(cap, element_count(&dims).unwrap() * 4);
        }
    }
}
