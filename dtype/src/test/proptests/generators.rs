use crate::*;
use proptest::prelude::*;

pub fn float_dtype() -> impl Strategy<Value = DType> {
    prop_oneof![Just(DType::Float16), Just(DType::BFloat16), Just(DType::Float32), Just(DType::Float64)]
}

pub fn scalar_generator() -> impl Strategy<Value = DType> {
    prop_oneof![
        Just(DType::Bool),
        Just(DType::Int8),
        Just(DType::UInt8),
        Just(DType::Int32),
        Just(DType::Int64),
        float_dtype()
    ]
}

/// Row-major descriptors of rank 1..=4 with small extents.
pub fn packed_shape() -> impl Strategy<Value = ShapeDescriptor> {
    (scalar_generator(), prop::collection::vec(1usize..9, 1..=4))
        .prop_map(|(dtype, lengths)| ShapeDescriptor::packed(dtype, lengths).expect("lengths are non-zero"))
}

/// fp32 NCHW activations small enough to run on the reference device.
pub fn nchw_f32_shape() -> impl Strategy<Value = ShapeDescriptor> {
    (1usize..3, 1usize..4, 3usize..9, 3usize..9)
        .prop_map(|(n, c, h, w)| ShapeDescriptor::packed(DType::Float32, [n, c, h, w]).expect("lengths are non-zero"))
}
