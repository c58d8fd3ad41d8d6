use super::*;

pub trait HasDType {
    const DTYPE: DType;
}

/// Host scalar that can be moved in and out of raw device bytes.
pub trait HostScalar: HasDType + Copy + Default + Send + Sync + 'static {
    fn read_ne(bytes: &[u8]) -> Self;
    fn write_ne(self, bytes: &mut [u8]);
}

macro_rules! impl_dtype_ext {
    ($($ty:ty => $dtype:expr),* $(,)?) => {
        $(
            impl HasDType for $ty { const DTYPE: DType = $dtype; }

            impl HostScalar for $ty {
                fn read_ne(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..std::mem::size_of::<$ty>()]);
                    <$ty>::from_ne_bytes(raw)
                }

                fn write_ne(self, bytes: &mut [u8]) {
                    bytes[..std::mem::size_of::<$ty>()].copy_from_slice(&self.to_ne_bytes());
                }
            }
        )*
    };
}

impl_dtype_ext! {
    i8 => DType::Int8, i32 => DType::Int32, i64 => DType::Int64,
    u8 => DType::UInt8,
    f32 => DType::Float32, f64 => DType::Float64,
}

impl HasDType for bool {
    const DTYPE: DType = DType::Bool;
}
