//! Status codes and the owning status handle.

use std::fmt;

use super::ffi::{Runtime, TF_Code, TF_Status, c_string};
use crate::Result;
use crate::error::RuntimeError;

/// Result code carried by a runtime status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
    /// A value this crate does not know about.
    Unrecognized(i32),
}

impl Code {
    pub fn from_raw(raw: TF_Code) -> Self {
        match raw {
            0 => Code::Ok,
            1 => Code::Cancelled,
            2 => Code::Unknown,
            3 => Code::InvalidArgument,
            4 => Code::DeadlineExceeded,
            5 => Code::NotFound,
            6 => Code::AlreadyExists,
            7 => Code::PermissionDenied,
            8 => Code::ResourceExhausted,
            9 => Code::FailedPrecondition,
            10 => Code::Aborted,
            11 => Code::OutOfRange,
            12 => Code::Unimplemented,
            13 => Code::Internal,
            14 => Code::Unavailable,
            15 => Code::DataLoss,
            16 => Code::Unauthenticated,
            other => Code::Unrecognized(other),
        }
    }

    pub fn to_raw(self) -> TF_Code {
        match self {
            Code::Ok => 0,
            Code::Cancelled => 1,
            Code::Unknown => 2,
            Code::InvalidArgument => 3,
            Code::DeadlineExceeded => 4,
            Code::NotFound => 5,
            Code::AlreadyExists => 6,
            Code::PermissionDenied => 7,
            Code::ResourceExhausted => 8,
            Code::FailedPrecondition => 9,
            Code::Aborted => 10,
            Code::OutOfRange => 11,
            Code::Unimplemented => 12,
            Code::Internal => 13,
            Code::Unavailable => 14,
            Code::DataLoss => 15,
            Code::Unauthenticated => 16,
            Code::Unrecognized(raw) => raw,
        }
    }

    /// Name as spelled in the C header, `"Unknown"` for unrecognized values.
    pub fn name(self) -> &'static str {
        match self {
            Code::Ok => "TF_OK",
            Code::Cancelled => "TF_CANCELLED",
            Code::Unknown => "TF_UNKNOWN",
            Code::InvalidArgument => "TF_INVALID_ARGUMENT",
            Code::DeadlineExceeded => "TF_DEADLINE_EXCEEDED",
            Code::NotFound => "TF_NOT_FOUND",
            Code::AlreadyExists => "TF_ALREADY_EXISTS",
            Code::PermissionDenied => "TF_PERMISSION_DENIED",
            Code::ResourceExhausted => "TF_RESOURCE_EXHAUSTED",
            Code::FailedPrecondition => "TF_FAILED_PRECONDITION",
            Code::Aborted => "TF_ABORTED",
            Code::OutOfRange => "TF_OUT_OF_RANGE",
            Code::Unimplemented => "TF_UNIMPLEMENTED",
            Code::Internal => "TF_INTERNAL",
            Code::Unavailable => "TF_UNAVAILABLE",
            Code::DataLoss => "TF_DATA_LOSS",
            Code::Unauthenticated => "TF_UNAUTHENTICATED",
            Code::Unrecognized(_) => "Unknown",
        }
    }

    pub fn is_ok(self) -> bool {
        self == Code::Ok
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Owning wrapper over `TF_Status`.
pub struct Status {
    rt: &'static Runtime,
    ptr: *mut TF_Status,
}

impl Status {
    pub fn new(rt: &'static Runtime) -> Result<Self> {
        // SAFETY: TF_NewStatus has no preconditions.
        let ptr = unsafe { (rt.api.new_status)() };
        if ptr.is_null() {
            return Err(RuntimeError::NullHandle("status"));
        }
        Ok(Self { rt, ptr })
    }

    pub fn code(&self) -> Code {
        // SAFETY: `ptr` is a live status owned by self.
        Code::from_raw(unsafe { (self.rt.api.get_code)(self.ptr) })
    }

    pub fn message(&self) -> String {
        // SAFETY: The message pointer stays valid until the status is modified or deleted.
        unsafe { c_string((self.rt.api.message)(self.ptr)) }
    }

    pub fn is_ok(&self) -> bool {
        self.code().is_ok()
    }

    /// Turn a non-OK status into an error tagged with `context`.
    pub fn check(&self, context: &'static str) -> Result<()> {
        let code = self.code();
        if code.is_ok() {
            return Ok(());
        }
        Err(RuntimeError::Status {
            context,
            code,
            message: self.message(),
        })
    }

    pub(crate) fn as_ptr(&self) -> *mut TF_Status {
        self.ptr
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Status")
            .field("code", &self.code())
            .field("message", &self.message())
            .finish()
    }
}

impl Drop for Status {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            // SAFETY: Status is owned by this wrapper and deleted once.
            unsafe { (self.rt.api.delete_status)(self.ptr) };
            self.ptr = std::ptr::null_mut();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip() {
        for raw in 0..=16 {
            let code = Code::from_raw(raw);
            assert_ne!(code, Code::Unrecognized(raw));
            assert_eq!(code.to_raw(), raw);
        }
        assert_eq!(Code::from_raw(42), Code::Unrecognized(42));
        assert_eq!(Code::Unrecognized(42).to_raw(), 42);
    }

    #[test]
    fn test_code_names() {
        assert_eq!(Code::Ok.name(), "TF_OK");
        assert_eq!(Code::InvalidArgument.to_string(), "TF_INVALID_ARGUMENT");
        assert_eq!(Code::from_raw(16).name(), "TF_UNAUTHENTICATED");
        assert_eq!(Code::from_raw(-1).name(), "Unknown");
        assert!(Code::Ok.is_ok());
        assert!(!Code::NotFound.is_ok());
    }
}
