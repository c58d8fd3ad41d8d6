//! Element types and shape descriptors shared by every fusekit crate.
//!
//! `DType` names the element type of an operand, `ShapeDescriptor` carries its
//! logical extents and per-dimension strides. Both are plain values: the
//! engine only ever reads them to derive output shapes and cache signatures.

pub mod ext;
pub mod shape;


pub use ext::{HasDType, HostScalar};
pub use shape::{Contiguity, ShapeDescriptor, ShapeError};

/// Element data types understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::EnumCount, strum::EnumIter, strum::VariantArray, strum::Display)]
pub enum DType {
    #[strum(serialize = "bool")]
    Bool,
    #[strum(serialize = "i8")]
    Int8,
    #[strum(serialize = "u8")]
    UInt8,
    #[strum(serialize = "i32")]
    Int32,
    #[strum(serialize = "i64")]
    Int64,
    #[strum(serialize = "fp16")]
    Float16,
    #[strum(serialize = "bf16")]
    BFloat16,
    #[strum(serialize = "fp32")]
    Float32,
    #[strum(serialize = "fp64")]
    Float64,
}

impl DType {
    pub const fn bytes(&self) -> usize {
        match self {
            Self::Bool => 1,
            Self::Int8 => 1,
            Self::UInt8 => 1,
            Self::Int32 => 4,
            Self::Int64 => 8,
            Self::Float16 => 2,
            Self::BFloat16 => 2,
            Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }

    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool)
    }

    pub const fn is_signed(&self) -> bool {
        matches!(self, Self::Int8 | Self::Int32 | Self::Int64)
    }

    pub const fn is_int(&self) -> bool {
        self.is_signed() || matches!(self, Self::UInt8)
    }

    /// Floating point types, including the 16-bit storage formats.
    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float16 | Self::BFloat16 | Self::Float32 | Self::Float64)
    }

    pub const fn c_style(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int8 => "signed char",
            Self::UInt8 => "unsigned char",
            Self::Int32 => "int",
            Self::Int64 => "long",
            Self::Float16 => "half",
            Self::BFloat16 => "__bf16",
            Self::Float32 => "float",
            Self::Float64 => "double",
        }
    }
}
