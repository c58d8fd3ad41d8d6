use test_case::test_case;

use crate::{Contiguity, DType, ShapeDescriptor, ShapeError};

#[test]
fn test_packed_strides_nchw() {
    let shape = ShapeDescriptor::packed(DType::Float32, [32, 3, 224, 224]).unwrap();
    assert_eq!(shape.strides(), &[150528, 50176, 224, 1]);
    assert_eq!(shape.element_count(), 32 * 3 * 224 * 224);
    assert_eq!(shape.bytes(), 32 * 3 * 224 * 224 * 4);
    assert_eq!(shape.to_string(), "fp32:32x3x224x224:150528x50176x224x1");
}

#[test_case(&[2, 2, 2], &[4, 2, 1], Contiguity::Packed; "row_major")]
#[test_case(&[2, 2, 2], &[1, 4, 2], Contiguity::Dense; "permuted")]
#[test_case(&[2, 2], &[4, 1], Contiguity::Strided; "row_padding")]
#[test_case(&[3, 4], &[0, 1], Contiguity::Strided; "broadcast")]
#[test_case(&[1, 5], &[7, 1], Contiguity::Dense; "unit_dim_with_odd_stride")]
fn test_contiguity_class(lengths: &[usize], strides: &[usize], expected: Contiguity) {
    let shape = ShapeDescriptor::strided(DType::Float32, lengths.to_vec(), strides.to_vec()).unwrap();
    assert_eq!(shape.contiguity(), expected);
}

#[test]
fn test_rank_mismatch_rejected() {
    let err = ShapeDescriptor::strided(DType::Float32, [2, 2], [1]).unwrap_err();
    assert_eq!(err, ShapeError::RankMismatch { lengths: 2, strides: 1 });
}

#[test]
fn test_zero_length_rejected() {
    let err = ShapeDescriptor::packed(DType::Float16, [4, 0, 2]).unwrap_err();
    assert_eq!(err, ShapeError::ZeroLength { dim: 1 });
}

#[test]
fn test_empty_shape_rejected() {
    let err = ShapeDescriptor::packed(DType::Float32, []).unwrap_err();
    assert_eq!(err, ShapeError::EmptyShape);
}

#[test]
fn test_element_space_with_gaps() {
    let shape = ShapeDescriptor::strided(DType::Float32, [2, 3], [8, 2]).unwrap();
    assert_eq!(shape.element_count(), 6);
    assert_eq!(shape.element_space(), 1 + 8 + 4);
    assert_eq!(shape.offset(&[1, 2]), 12);
}

#[test]
fn test_with_dtype_keeps_layout() {
    let shape = ShapeDescriptor::strided(DType::Float32, [2, 2, 2], [1, 4, 2]).unwrap();
    let mask = shape.with_dtype(DType::Int8);
    assert!(shape.same_layout(&mask));
    assert_ne!(shape, mask);
    assert_eq!(mask.bytes(), 8);
}
