//! Byte buffers handed to the runtime.

use std::ffi::c_void;
use std::path::Path;
use std::ptr;

use tfc_guard::on_exit;
use tracing::debug;

use super::ffi::{Runtime, TF_Buffer};
use crate::Result;
use crate::error::RuntimeError;

/// Owning wrapper over `TF_Buffer`.
///
/// The bytes are moved into the runtime's buffer together with a deallocator,
/// so deleting the buffer also frees them.
pub struct Buffer {
    rt: &'static Runtime,
    ptr: *mut TF_Buffer,
}

impl Buffer {
    /// Hand `bytes` over to a new runtime buffer.
    pub fn from_bytes(rt: &'static Runtime, bytes: Vec<u8>) -> Result<Self> {
        let length = bytes.len();
        let data = Box::into_raw(bytes.into_boxed_slice()).cast::<u8>();
        // SAFETY: `data`/`length` describe the boxed slice leaked just above.
        let mut release_data = on_exit(move || unsafe { deallocate_bytes(data.cast(), length) });

        // SAFETY: TF_NewBuffer has no preconditions.
        let ptr = unsafe { (rt.api.new_buffer)() };
        if ptr.is_null() {
            return Err(RuntimeError::NullHandle("buffer"));
        }

        // SAFETY: `ptr` is a fresh, empty buffer; from here on it owns `data`.
        unsafe {
            (*ptr).data = data.cast::<c_void>().cast_const();
            (*ptr).length = length;
            (*ptr).data_deallocator = Some(deallocate_bytes);
        }
        release_data.dismiss();

        Ok(Self { rt, ptr })
    }

    pub fn len(&self) -> usize {
        // SAFETY: `ptr` is a live buffer owned by self.
        unsafe { (*self.ptr).length }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: `ptr` is live; data/length were set together in `from_bytes`.
        unsafe {
            let buffer = &*self.ptr;
            if buffer.data.is_null() || buffer.length == 0 {
                return &[];
            }
            std::slice::from_raw_parts(buffer.data.cast::<u8>(), buffer.length)
        }
    }

    pub(crate) fn as_ptr(&self) -> *const TF_Buffer {
        self.ptr
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            // SAFETY: Buffer is owned by this wrapper and deleted once.
            unsafe { (self.rt.api.delete_buffer)(self.ptr) };
            self.ptr = ptr::null_mut();
        }
    }
}

/// Read a whole file. Missing, unreadable and empty files are errors.
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    let bytes = std::fs::read(path).map_err(|source| RuntimeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if bytes.is_empty() {
        return Err(RuntimeError::EmptyFile(path.to_path_buf()));
    }
    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(bytes)
}

unsafe extern "C" fn deallocate_bytes(data: *mut c_void, length: usize) {
    // SAFETY: Only ever installed for memory leaked from a `Box<[u8]>` of `length` bytes.
    unsafe { drop(Box::from_raw(ptr::slice_from_raw_parts_mut(data.cast::<u8>(), length))) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_file_missing() {
        let err = read_file(Path::new("/nonexistent/graph.pb")).unwrap_err();
        assert!(matches!(err, RuntimeError::Io { .. }));
    }

    #[test]
    fn test_read_file_empty() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = read_file(file.path()).unwrap_err();
        assert!(matches!(err, RuntimeError::EmptyFile(_)));
    }

    #[test]
    fn test_read_file_contents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\x0a\x03abc").unwrap();
        assert_eq!(read_file(file.path()).unwrap(), b"\x0a\x03abc");
    }

    #[test]
    fn test_deallocate_bytes_frees_boxed_slice() {
        let bytes = vec![1u8, 2, 3, 4].into_boxed_slice();
        let length = bytes.len();
        let data = Box::into_raw(bytes).cast::<u8>();
        // SAFETY: Matches the allocation above.
        unsafe { deallocate_bytes(data.cast(), length) };
    }
}
