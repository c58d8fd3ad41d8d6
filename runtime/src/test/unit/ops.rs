use std::sync::Arc;

use fusekit_device::DevicePtr;
use fusekit_dtype::{DType, ShapeDescriptor};
use test_case::test_case;

use crate::context::{ExecutionContext, TuningMode};
use crate::devices::ReferenceDevice;
use crate::error::{Error, Result};
use crate::ops::{
    CartesianProdInvokeParams, CartesianProdProblem, MaskedFillDirection, MaskedFillProblem, TensorRef, cartesian_prod,
    cartesian_prod_workspace_bytes, masked_fill_backward, masked_fill_forward,
};
use crate::problem::Problem;
use crate::solver::{MaskedFill, masked_fill};
use crate::test::{dispatcher, ramp};

fn f32_shape(lengths: &[usize]) -> ShapeDescriptor {
    ShapeDescriptor::packed(DType::Float32, lengths.iter().copied()).unwrap()
}

fn mask_for(shape: &ShapeDescriptor) -> (ShapeDescriptor, Vec<i8>) {
    let flags = (0..shape.element_count()).map(|i| i8::from(i % 3 == 0)).collect();
    (shape.with_dtype(DType::Int8), flags)
}

fn forward(input: ShapeDescriptor, output: ShapeDescriptor, mask: ShapeDescriptor) -> Result<MaskedFillProblem> {
    MaskedFillProblem::new(MaskedFillDirection::Forward, input, output, mask)
}

#[test]
fn test_masked_fill_forward_values() {
    let device = Arc::new(ReferenceDevice::new());
    let dispatcher = dispatcher(&device);
    let shape = f32_shape(&[4, 5]);
    let (mask_shape, flags) = mask_for(&shape);
    let memory = device.memory();
    let input = memory.alloc_from(&ramp(20, 0));
    let output = memory.alloc(shape.bytes());
    let mask = memory.alloc_from(&flags);

    let token = masked_fill_forward(
        &dispatcher,
        TensorRef::new(&shape, input),
        TensorRef::new(&shape, output),
        TensorRef::new(&mask_shape, mask),
        7.5,
    )
    .unwrap();
    token.wait(1000).unwrap();

    let expected: Vec<f32> = ramp(20, 0).into_iter().zip(&flags).map(|(x, &m)| if m != 0 { 7.5 } else { x }).collect();
    assert_eq!(memory.read::<f32>(output).unwrap(), expected);
}

#[test]
fn test_masked_fill_backward_zeroes_masked_gradients() {
    let device = Arc::new(ReferenceDevice::new());
    let dispatcher = dispatcher(&device);
    let shape = f32_shape(&[3, 4]);
    let (mask_shape, flags) = mask_for(&shape);
    let memory = device.memory();
    let output_grad = memory.alloc_from(&ramp(12, 5));
    let input_grad = memory.alloc(shape.bytes());
    let mask = memory.alloc_from(&flags);

    masked_fill_backward(
        &dispatcher,
        TensorRef::new(&shape, output_grad),
        TensorRef::new(&shape, input_grad),
        TensorRef::new(&mask_shape, mask),
    )
    .unwrap();

    let expected: Vec<f32> = ramp(12, 5).into_iter().zip(&flags).map(|(g, &m)| if m != 0 { 0.0 } else { g }).collect();
    assert_eq!(memory.read::<f32>(input_grad).unwrap(), expected);
}

#[test]
fn test_masked_fill_threshold() {
    let device = Arc::new(ReferenceDevice::new());
    let large = f32_shape(&[512, 1024]);
    let mask = large.with_dtype(DType::Int8);
    let forward =
        MaskedFillProblem::new(MaskedFillDirection::Forward, large.clone(), large.clone(), mask.clone()).unwrap();
    assert_eq!(forward.element_count(), MaskedFill::FLOAT32_CONTIGUOUS_FWD_INFIMUM);

    let heuristic = dispatcher(&device);
    let err = heuristic.prepare(&masked_fill::strategies(), &forward).unwrap_err();
    assert!(matches!(err, Error::NoApplicableStrategy { problem: "masked_fill", .. }));

    let backward = MaskedFillProblem::new(MaskedFillDirection::Backward, large.clone(), large, mask).unwrap();
    assert!(heuristic.prepare(&masked_fill::strategies(), &backward).is_ok());

    let forced = dispatcher(&device).with_context(ExecutionContext::builder().tuning(TuningMode::Forced).build());
    let entry = forced.prepare(&masked_fill::strategies(), &forward).unwrap();
    assert_eq!(entry.strategy(), MaskedFill::ID);
}

#[test_case(DType::Float16, 4_194_303, true; "fp16_below")]
#[test_case(DType::Float16, 4_194_304, false; "fp16_at")]
#[test_case(DType::Float32, 524_287, true; "fp32_below")]
#[test_case(DType::Int32, 16, false; "int_never")]
fn test_masked_fill_applicability(dtype: DType, numel: usize, applicable: bool) {
    use crate::solver::SolutionStrategy;

    let shape = ShapeDescriptor::packed(dtype, [numel]).unwrap();
    let problem = forward(shape.clone(), shape.clone(), shape.with_dtype(DType::Int8)).unwrap();
    assert_eq!(MaskedFill.is_applicable(&ExecutionContext::default(), &problem), applicable);
}

#[test]
fn test_masked_fill_rejects_mismatched_operands() {
    let shape = f32_shape(&[4, 4]);
    let err = forward(shape.clone(), shape.clone(), shape.clone()).unwrap_err();
    assert!(matches!(err, Error::InvalidProblem { .. }));

    let transposed = ShapeDescriptor::strided(DType::Float32, [4, 4], [1, 4]).unwrap();
    let err = forward(shape.clone(), transposed, shape.with_dtype(DType::Int8)).unwrap_err();
    assert!(matches!(err, Error::InvalidProblem { .. }));

    let gappy = ShapeDescriptor::strided(DType::Float32, [4, 4], [8, 1]).unwrap();
    let err = forward(gappy.clone(), gappy.clone(), gappy.with_dtype(DType::Int8)).unwrap_err();
    assert!(matches!(err, Error::InvalidProblem { .. }));
}

#[test]
fn test_masked_fill_signature_separates_directions() {
    let shape = f32_shape(&[8]);
    let mask = shape.with_dtype(DType::Int8);
    let forwards = forward(shape.clone(), shape.clone(), mask.clone()).unwrap();
    let backwards = MaskedFillProblem::new(MaskedFillDirection::Backward, shape.clone(), shape, mask).unwrap();
    assert_ne!(forwards.signature(), backwards.signature());
}

#[test]
fn test_masked_fill_fp16_does_not_compile() {
    let device = Arc::new(ReferenceDevice::new());
    let dispatcher = dispatcher(&device);
    let shape = ShapeDescriptor::packed(DType::Float16, [16]).unwrap();
    let mask = shape.with_dtype(DType::Int8);

    let err = masked_fill_forward(
        &dispatcher,
        TensorRef::new(&shape, DevicePtr::NULL),
        TensorRef::new(&shape, DevicePtr::NULL),
        TensorRef::new(&mask, DevicePtr::NULL),
        1.0,
    )
    .unwrap_err();
    assert!(matches!(err, Error::CompilationFailure { .. }));
}

/// Operands on the device, with their descriptors.
struct Operands {
    shapes: Vec<ShapeDescriptor>,
    ptrs: Vec<DevicePtr>,
}

impl Operands {
    fn new(device: &ReferenceDevice, values: &[&[f32]]) -> Self {
        Self {
            shapes: values.iter().map(|v| f32_shape(&[v.len()])).collect(),
            ptrs: values.iter().map(|v| device.memory().alloc_from(v)).collect(),
        }
    }

    fn refs(&self) -> Vec<TensorRef<'_>> {
        self.shapes.iter().zip(&self.ptrs).map(|(shape, &ptr)| TensorRef::new(shape, ptr)).collect()
    }
}

#[test]
fn test_cartesian_prod_two_operands() {
    let device = Arc::new(ReferenceDevice::new());
    let dispatcher = dispatcher(&device);
    let operands = Operands::new(&device, &[&[1.0, 2.0], &[10.0, 20.0, 30.0]]);
    let output_shape = f32_shape(&[6, 2]);
    let workspace_bytes = cartesian_prod_workspace_bytes(&operands.shapes);
    assert_eq!(workspace_bytes, 6 * 2 * 4);

    let memory = device.memory();
    let output = memory.alloc(output_shape.bytes());
    let workspace = memory.alloc(workspace_bytes);
    cartesian_prod(&dispatcher, &operands.refs(), TensorRef::new(&output_shape, output), workspace, workspace_bytes)
        .unwrap();

    assert_eq!(
        memory.read::<f32>(output).unwrap(),
        vec![1.0, 10.0, 1.0, 20.0, 1.0, 30.0, 2.0, 10.0, 2.0, 20.0, 2.0, 30.0]
    );
}

#[test]
fn test_cartesian_prod_last_operand_fastest() {
    let device = Arc::new(ReferenceDevice::new());
    let dispatcher = dispatcher(&device);
    let operands = Operands::new(&device, &[&[1.0, 2.0], &[3.0, 4.0], &[5.0, 6.0]]);
    let output_shape = f32_shape(&[8, 3]);
    let workspace_bytes = cartesian_prod_workspace_bytes(&operands.shapes);
    let memory = device.memory();
    let output = memory.alloc(output_shape.bytes());
    let workspace = memory.alloc(workspace_bytes);

    cartesian_prod(&dispatcher, &operands.refs(), TensorRef::new(&output_shape, output), workspace, workspace_bytes)
        .unwrap();

    let rows: Vec<Vec<f32>> = memory.read::<f32>(output).unwrap().chunks(3).map(<[f32]>::to_vec).collect();
    let mut expected = Vec::new();
    for a in [1.0, 2.0] {
        for b in [3.0, 4.0] {
            for c in [5.0, 6.0] {
                expected.push(vec![a, b, c]);
            }
        }
    }
    assert_eq!(rows, expected);
}

#[test]
fn test_cartesian_prod_strided_operand_and_output() {
    let device = Arc::new(ReferenceDevice::new());
    let dispatcher = dispatcher(&device);
    let memory = device.memory();

    // Every other element of the first buffer is padding.
    let a_shape = ShapeDescriptor::strided(DType::Float32, [2], [2]).unwrap();
    let b_shape = f32_shape(&[2]);
    let a = memory.alloc_from(&[1.0f32, -1.0, 2.0, -1.0]);
    let b = memory.alloc_from(&[3.0f32, 4.0]);

    // Column-major 4x2 output.
    let output_shape = ShapeDescriptor::strided(DType::Float32, [4, 2], [1, 4]).unwrap();
    let output = memory.alloc(output_shape.bytes());
    let workspace_bytes = cartesian_prod_workspace_bytes(&[a_shape.clone(), b_shape.clone()]);
    let workspace = memory.alloc(workspace_bytes);

    cartesian_prod(
        &dispatcher,
        &[TensorRef::new(&a_shape, a), TensorRef::new(&b_shape, b)],
        TensorRef::new(&output_shape, output),
        workspace,
        workspace_bytes,
    )
    .unwrap();

    assert_eq!(memory.read::<f32>(output).unwrap(), vec![1.0, 1.0, 2.0, 2.0, 3.0, 4.0, 3.0, 4.0]);
}

#[test]
fn test_cartesian_prod_workspace_too_small() {
    let device = Arc::new(ReferenceDevice::new());
    let dispatcher = dispatcher(&device);
    let operands = Operands::new(&device, &[&[1.0, 2.0], &[3.0]]);
    let output_shape = f32_shape(&[2, 2]);
    let output = device.memory().alloc(output_shape.bytes());
    let workspace = device.memory().alloc(4);

    let err =
        cartesian_prod(&dispatcher, &operands.refs(), TensorRef::new(&output_shape, output), workspace, 4).unwrap_err();
    assert!(matches!(err, Error::WorkspaceTooSmall { required: 16, actual: 4 }));
    assert_eq!(device.launch_count(), 0);
}

#[test]
fn test_cartesian_prod_operand_pointer_count() {
    let device = Arc::new(ReferenceDevice::new());
    let dispatcher = dispatcher(&device);
    let operands = Operands::new(&device, &[&[1.0, 2.0], &[3.0]]);
    let problem = CartesianProdProblem::new(operands.shapes.clone(), f32_shape(&[2, 2])).unwrap();
    let params = CartesianProdInvokeParams {
        operands: operands.ptrs[..1].to_vec(),
        output: device.memory().alloc(16),
        workspace: device.memory().alloc(16),
        workspace_bytes: 16,
    };

    let err = dispatcher.execute_problem(&crate::solver::cartesian_prod::strategies(), &problem, &params).unwrap_err();
    assert!(matches!(err, Error::ArgumentCountMismatch { expected: 2, actual: 1 }));
    assert_eq!(device.launch_count(), 0);
}

#[test]
fn test_cartesian_prod_problem_validation() {
    let one = f32_shape(&[3]);
    let err = CartesianProdProblem::new(Vec::new(), f32_shape(&[1, 1])).unwrap_err();
    assert!(matches!(err, Error::InvalidProblem { .. }));

    let err = CartesianProdProblem::new(vec![one.clone(), one.clone()], f32_shape(&[6, 2])).unwrap_err();
    assert!(matches!(err, Error::InvalidProblem { .. }));

    let err = CartesianProdProblem::new(vec![f32_shape(&[3, 1])], f32_shape(&[3, 1])).unwrap_err();
    assert!(matches!(err, Error::InvalidProblem { .. }));

    let err = CartesianProdProblem::new(vec![one.with_dtype(DType::Float64)], f32_shape(&[3, 1])).unwrap_err();
    assert!(matches!(err, Error::InvalidProblem { .. }));

    let problem = CartesianProdProblem::new(vec![one.clone(), one], f32_shape(&[9, 2])).unwrap();
    assert_eq!(problem.rows(), 9);
    assert_eq!(problem.workspace_bytes(), 9 * 2 * 4);
}
