//! Element types.

use std::fmt;

use super::ffi::TF_DataType;

/// Tensor element type as enumerated by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Float,
    Double,
    Int32,
    UInt8,
    Int16,
    Int8,
    String,
    Complex64,
    Int64,
    Bool,
    QInt8,
    QUInt8,
    QInt32,
    BFloat16,
    QInt16,
    QUInt16,
    UInt16,
    Complex128,
    Half,
    Resource,
    Variant,
    UInt32,
    UInt64,
    Unrecognized(i32),
}

impl DataType {
    pub fn from_raw(raw: TF_DataType) -> Self {
        match raw {
            1 => DataType::Float,
            2 => DataType::Double,
            3 => DataType::Int32,
            4 => DataType::UInt8,
            5 => DataType::Int16,
            6 => DataType::Int8,
            7 => DataType::String,
            8 => DataType::Complex64,
            9 => DataType::Int64,
            10 => DataType::Bool,
            11 => DataType::QInt8,
            12 => DataType::QUInt8,
            13 => DataType::QInt32,
            14 => DataType::BFloat16,
            15 => DataType::QInt16,
            16 => DataType::QUInt16,
            17 => DataType::UInt16,
            18 => DataType::Complex128,
            19 => DataType::Half,
            20 => DataType::Resource,
            21 => DataType::Variant,
            22 => DataType::UInt32,
            23 => DataType::UInt64,
            other => DataType::Unrecognized(other),
        }
    }

    pub fn to_raw(self) -> TF_DataType {
        match self {
            DataType::Float => 1,
            DataType::Double => 2,
            DataType::Int32 => 3,
            DataType::UInt8 => 4,
            DataType::Int16 => 5,
            DataType::Int8 => 6,
            DataType::String => 7,
            DataType::Complex64 => 8,
            DataType::Int64 => 9,
            DataType::Bool => 10,
            DataType::QInt8 => 11,
            DataType::QUInt8 => 12,
            DataType::QInt32 => 13,
            DataType::BFloat16 => 14,
            DataType::QInt16 => 15,
            DataType::QUInt16 => 16,
            DataType::UInt16 => 17,
            DataType::Complex128 => 18,
            DataType::Half => 19,
            DataType::Resource => 20,
            DataType::Variant => 21,
            DataType::UInt32 => 22,
            DataType::UInt64 => 23,
            DataType::Unrecognized(raw) => raw,
        }
    }

    /// Name as spelled in the C header, `"Unknown"` for unrecognized values.
    pub fn name(self) -> &'static str {
        match self {
            DataType::Float => "TF_FLOAT",
            DataType::Double => "TF_DOUBLE",
            DataType::Int32 => "TF_INT32",
            DataType::UInt8 => "TF_UINT8",
            DataType::Int16 => "TF_INT16",
            DataType::Int8 => "TF_INT8",
            DataType::String => "TF_STRING",
            DataType::Complex64 => "TF_COMPLEX64",
            DataType::Int64 => "TF_INT64",
            DataType::Bool => "TF_BOOL",
            DataType::QInt8 => "TF_QINT8",
            DataType::QUInt8 => "TF_QUINT8",
            DataType::QInt32 => "TF_QINT32",
            DataType::BFloat16 => "TF_BFLOAT16",
            DataType::QInt16 => "TF_QINT16",
            DataType::QUInt16 => "TF_QUINT16",
            DataType::UInt16 => "TF_UINT16",
            DataType::Complex128 => "TF_COMPLEX128",
            DataType::Half => "TF_HALF",
            DataType::Resource => "TF_RESOURCE",
            DataType::Variant => "TF_VARIANT",
            DataType::UInt32 => "TF_UINT32",
            DataType::UInt64 => "TF_UINT64",
            DataType::Unrecognized(_) => "Unknown",
        }
    }

    /// Bytes per element, `None` for variable-length and unknown types.
    pub fn size(self) -> Option<usize> {
        let size = match self {
            DataType::UInt8
            | DataType::Int8
            | DataType::Bool
            | DataType::QInt8
            | DataType::QUInt8 => 1,
            DataType::Int16
            | DataType::UInt16
            | DataType::QInt16
            | DataType::QUInt16
            | DataType::BFloat16
            | DataType::Half => 2,
            DataType::Float | DataType::Int32 | DataType::UInt32 | DataType::QInt32 => 4,
            DataType::Double | DataType::Int64 | DataType::UInt64 | DataType::Complex64 => 8,
            DataType::Complex128 => 16,
            DataType::String
            | DataType::Resource
            | DataType::Variant
            | DataType::Unrecognized(_) => return None,
        };
        Some(size)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Plain numeric types that can be copied in and out of tensor memory.
pub trait TensorElement: sealed::Sealed + Copy + 'static {
    const DATA_TYPE: DataType;
}

macro_rules! tensor_element {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}
            impl TensorElement for $ty {
                const DATA_TYPE: DataType = DataType::$dtype;
            }
        )*
    };
}

tensor_element! {
    f32 => Float,
    f64 => Double,
    i32 => Int32,
    u8 => UInt8,
    i16 => Int16,
    i8 => Int8,
    i64 => Int64,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
}
