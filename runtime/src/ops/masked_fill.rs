//! Masked fill: `out = mask ? value : in` forward, `in_grad = mask ? 0 : out_grad`
//! backward.

use fusekit_device::{CompletionToken, DevicePtr};
use fusekit_dtype::{DType, ShapeDescriptor};
use snafu::ensure;

use crate::dispatcher::Dispatcher;
use crate::error::{InvalidProblemSnafu, Result};
use crate::ops::TensorRef;
use crate::problem::{Problem, ProblemSignature};
use crate::solver::masked_fill;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum MaskedFillDirection {
    Forward,
    Backward,
}

/// Shapes of one masked fill.
///
/// `input` is the tensor read (the output gradient when going backward) and
/// `output` the tensor written. All three operands share one dense layout; the
/// mask holds `i8` flags.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedFillProblem {
    direction: MaskedFillDirection,
    input: ShapeDescriptor,
    output: ShapeDescriptor,
    mask: ShapeDescriptor,
}

impl MaskedFillProblem {
    pub fn new(
        direction: MaskedFillDirection,
        input: ShapeDescriptor,
        output: ShapeDescriptor,
        mask: ShapeDescriptor,
    ) -> Result<Self> {
        ensure!(
            mask.dtype() == DType::Int8,
            InvalidProblemSnafu { reason: format!("mask must be i8, got {}", mask.dtype()) }
        );
        ensure!(
            input.dtype() == output.dtype(),
            InvalidProblemSnafu { reason: format!("input is {} but output is {}", input.dtype(), output.dtype()) }
        );
        ensure!(
            input.same_layout(&output) && input.same_layout(&mask),
            InvalidProblemSnafu { reason: "input, output and mask must share one layout" }
        );
        ensure!(input.is_dense(), InvalidProblemSnafu { reason: format!("{input} is not dense") });
        Ok(Self { direction, input, output, mask })
    }

    pub fn direction(&self) -> MaskedFillDirection {
        self.direction
    }

    pub fn input(&self) -> &ShapeDescriptor {
        &self.input
    }

    pub fn output(&self) -> &ShapeDescriptor {
        &self.output
    }

    pub fn mask(&self) -> &ShapeDescriptor {
        &self.mask
    }

    pub fn dtype(&self) -> DType {
        self.input.dtype()
    }

    pub fn element_count(&self) -> usize {
        self.input.element_count()
    }

    pub fn is_contiguous(&self) -> bool {
        self.input.is_packed()
    }
}

impl Problem for MaskedFillProblem {
    fn name(&self) -> &'static str {
        "masked_fill"
    }

    fn signature(&self) -> ProblemSignature {
        ProblemSignature::new(format!("masked_fill|{}|{}|{}", self.direction, self.input, self.input.contiguity()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskedFillInvokeParams {
    pub input: DevicePtr,
    pub output: DevicePtr,
    pub mask: DevicePtr,
    /// Fill value; ignored going backward, where masked gradients are zero.
    pub value: f32,
}

pub fn masked_fill_forward(
    dispatcher: &Dispatcher,
    input: TensorRef<'_>,
    output: TensorRef<'_>,
    mask: TensorRef<'_>,
    value: f32,
) -> Result<CompletionToken> {
    let problem = MaskedFillProblem::new(
        MaskedFillDirection::Forward,
        input.desc.clone(),
        output.desc.clone(),
        mask.desc.clone(),
    )?;
    let params = MaskedFillInvokeParams { input: input.ptr, output: output.ptr, mask: mask.ptr, value };
    dispatcher.execute_problem(&masked_fill::strategies(), &problem, &params)
}

pub fn masked_fill_backward(
    dispatcher: &Dispatcher,
    output_grad: TensorRef<'_>,
    input_grad: TensorRef<'_>,
    mask: TensorRef<'_>,
) -> Result<CompletionToken> {
    let problem = MaskedFillProblem::new(
        MaskedFillDirection::Backward,
        output_grad.desc.clone(),
        input_grad.desc.clone(),
        mask.desc.clone(),
    )?;
    let params = MaskedFillInvokeParams { input: output_grad.ptr, output: input_grad.ptr, mask: mask.ptr, value: 0.0 };
    dispatcher.execute_problem(&masked_fill::strategies(), &problem, &params)
}
