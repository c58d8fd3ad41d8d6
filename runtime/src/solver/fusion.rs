//! Strategies for fused operator pipelines.
//!
//! [`FusedConvolution`] compiles the whole chain into one kernel whose entry
//! point is picked by the matched prefix. [`UnfusedChain`] is the fallback: one
//! kernel per operator, launched in order, with bias and activation updating
//! the output buffer in place.

use std::sync::Arc;

use fusekit_device::{CompletionToken, DeviceFeature, DeviceHandle, KernelBuildParams, KernelRecipe, LaunchGeometry};
use fusekit_dtype::ShapeDescriptor;
use itertools::Itertools;
use smallvec::SmallVec;
use snafu::{OptionExt, ensure};

use crate::args::ArgumentList;
use crate::composer::{OperatorDescriptor, PipelineComposer};
use crate::context::ExecutionContext;
use crate::error::{EmptyPipelineSnafu, InvalidProblemSnafu, Result, UnsupportedStartingOperatorSnafu};
use crate::operator::{ActivationMode, ConvolutionParams, OperatorKind, OperatorParams};
use crate::problem::{Problem, ProblemSignature};
use crate::solver::{BuildPlan, InvokeParams, Invoker, SolutionStrategy, StrategySet, expect_kernels};

pub const CONV_PROGRAM: &str = "conv_fusion.cpp";
pub const ELEMENTWISE_PROGRAM: &str = "elementwise.cpp";

const LOCAL_SIZE: usize = 256;

/// Operator kinds a fused pipeline may start with.
pub const ENTRY_OPERATORS: &[OperatorKind] = &[OperatorKind::Convolution];

/// A validated vertical pipeline, ready for strategy selection.
#[derive(Debug, Clone)]
pub struct FusionProblem {
    operators: Vec<OperatorDescriptor>,
    input: ShapeDescriptor,
    output: ShapeDescriptor,
}

impl FusionProblem {
    pub fn from_composer(composer: &PipelineComposer) -> Result<Self> {
        let output = composer.derive_output_shape()?;
        let first = composer.operators().first().context(EmptyPipelineSnafu)?;
        ensure!(ENTRY_OPERATORS.contains(&first.kind()), UnsupportedStartingOperatorSnafu { kind: first.kind() });
        Ok(Self { operators: composer.operators().to_vec(), input: composer.input().clone(), output })
    }

    pub fn operators(&self) -> &[OperatorDescriptor] {
        &self.operators
    }

    pub fn kinds(&self) -> SmallVec<[OperatorKind; 4]> {
        self.operators.iter().map(OperatorDescriptor::kind).collect()
    }

    pub fn input(&self) -> &ShapeDescriptor {
        &self.input
    }

    pub fn output(&self) -> &ShapeDescriptor {
        &self.output
    }

    /// Parameters of the leading convolution.
    pub fn convolution(&self) -> Option<&ConvolutionParams> {
        match self.operators.first()?.params() {
            OperatorParams::Convolution(conv) => Some(conv),
            _ => None,
        }
    }

    pub fn activation_mode(&self) -> Option<ActivationMode> {
        self.operators.iter().find_map(|op| match op.params() {
            OperatorParams::Activation { mode } => Some(*mode),
            _ => None,
        })
    }
}

impl Problem for FusionProblem {
    fn name(&self) -> &'static str {
        "fusion"
    }

    fn signature(&self) -> ProblemSignature {
        let operators = self.operators.iter().map(|op| describe(op.params())).join("+");
        ProblemSignature::new(format!(
            "fusion|{operators}|{}/{}|{}/{}",
            self.input,
            self.input.contiguity(),
            self.output,
            self.output.contiguity()
        ))
    }
}

fn describe(params: &OperatorParams) -> String {
    match params {
        OperatorParams::Convolution(conv) => format!(
            "conv(k{},f{}x{},p{}x{},s{}x{},d{}x{})",
            conv.out_channels,
            conv.filter[0],
            conv.filter[1],
            conv.pads[0],
            conv.pads[1],
            conv.strides[0],
            conv.strides[1],
            conv.dilations[0],
            conv.dilations[1]
        ),
        OperatorParams::Bias => "bias".into(),
        OperatorParams::Activation { mode } => format!("activ({mode})"),
    }
}

/// Defines describing the convolution's extents, layout and geometry.
fn conv_build_params(
    problem: &FusionProblem,
    conv: &ConvolutionParams,
    conv_output: &ShapeDescriptor,
) -> Result<KernelBuildParams> {
    let input = problem.input();
    let (&[n, c, h, w], &[sn, sc, sh, sw], &[_, k, ho, wo]) = (input.lengths(), input.strides(), conv_output.lengths())
    else {
        return InvalidProblemSnafu { reason: "convolution needs NCHW operands" }.fail();
    };
    Ok(KernelBuildParams::for_dtype(input.dtype())
        .with("LOCAL_SIZE", LOCAL_SIZE)
        .with("IN_N", n)
        .with("IN_C", c)
        .with("IN_H", h)
        .with("IN_W", w)
        .with("IN_STRIDE_N", sn)
        .with("IN_STRIDE_C", sc)
        .with("IN_STRIDE_H", sh)
        .with("IN_STRIDE_W", sw)
        .with("OUT_K", k)
        .with("OUT_H", ho)
        .with("OUT_W", wo)
        .with("FIL_H", conv.filter[0])
        .with("FIL_W", conv.filter[1])
        .with("PAD_H", conv.pads[0])
        .with("PAD_W", conv.pads[1])
        .with("STRIDE_H", conv.strides[0])
        .with("STRIDE_W", conv.strides[1])
        .with("DIL_H", conv.dilations[0])
        .with("DIL_W", conv.dilations[1]))
}

fn leading_convolution(problem: &FusionProblem) -> Result<(&ConvolutionParams, &ShapeDescriptor)> {
    if let Some(first) = problem.operators().first()
        && let OperatorParams::Convolution(conv) = first.params()
    {
        return Ok((conv, first.output()));
    }
    InvalidProblemSnafu { reason: "pipeline does not start with a convolution" }.fail()
}

/// Single-kernel convolution with optional bias and activation epilogues.
#[derive(Debug, Clone, Copy, Default)]
pub struct FusedConvolution;

impl FusedConvolution {
    pub const ID: &'static str = "fused-convolution";

    /// Widest filter the fused kernel unrolls.
    pub const MAX_FILTER_EXTENT: usize = 7;

    /// Entry point for a matched prefix, if the fused kernel implements it.
    pub fn entry_point(kinds: &[OperatorKind]) -> Option<&'static str> {
        use OperatorKind::{Activation, Bias, Convolution};
        match kinds {
            [Convolution] => Some("ConvFwd"),
            [Convolution, Bias] => Some("ConvBiasFwd"),
            [Convolution, Activation] => Some("ConvActivFwd"),
            [Convolution, Bias, Activation] => Some("ConvBiasActivFwd"),
            _ => None,
        }
    }
}

impl SolutionStrategy<FusionProblem> for FusedConvolution {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn is_applicable(&self, context: &ExecutionContext, problem: &FusionProblem) -> bool {
        context.supports(DeviceFeature::FusedConvolution)
            && Self::entry_point(&problem.kinds()).is_some()
            && problem.convolution().is_some_and(|conv| conv.filter.iter().all(|&f| f <= Self::MAX_FILTER_EXTENT))
    }

    fn build_plan(&self, _context: &ExecutionContext, problem: &FusionProblem) -> Result<BuildPlan> {
        let entry_point = Self::entry_point(&problem.kinds())
            .context(InvalidProblemSnafu { reason: "no fused kernel for this operator sequence" })?;
        let (conv, conv_output) = leading_convolution(problem)?;
        let mode = problem.activation_mode().unwrap_or_default();
        let build_params = conv_build_params(problem, conv, conv_output)?.with("ACTIV_MODE", mode as u8);
        let geometry = LaunchGeometry::aligned_1d(problem.output().element_count(), LOCAL_SIZE);
        let recipe = KernelRecipe::new(CONV_PROGRAM, entry_point, build_params, geometry);

        Ok(BuildPlan::new(vec![recipe], |kernels| {
            let kernels = expect_kernels(kernels, 1)?;
            let kernel = Arc::clone(&kernels[0]);
            let invoker: Invoker = Arc::new(move |device: &dyn DeviceHandle, params: InvokeParams<'_>| {
                let args = params.cast_to::<ArgumentList>()?;
                Ok(device.launch(kernel.as_ref(), &args.values())?)
            });
            Ok(invoker)
        }))
    }
}

/// One kernel per operator, launched in pipeline order.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnfusedChain;

impl UnfusedChain {
    pub const ID: &'static str = "unfused-chain";

    /// Arguments each stage takes from the caller's list, by name.
    fn stage_arguments(kind: OperatorKind) -> &'static [&'static str] {
        match kind {
            OperatorKind::Convolution => &["input", "output", "weights"],
            OperatorKind::Bias => &["output", "bias"],
            OperatorKind::Activation => &["output", "activ_alpha", "activ_beta", "activ_gamma"],
        }
    }

    fn stage_recipe(problem: &FusionProblem, op: &OperatorDescriptor) -> Result<KernelRecipe> {
        let output = op.output();
        let numel = output.element_count();
        let geometry = LaunchGeometry::aligned_1d(numel, LOCAL_SIZE);
        let elementwise =
            || KernelBuildParams::for_dtype(output.dtype()).with("LOCAL_SIZE", LOCAL_SIZE).with("NUMEL", numel);

        Ok(match op.params() {
            OperatorParams::Convolution(conv) => {
                KernelRecipe::new(CONV_PROGRAM, "ConvFwd", conv_build_params(problem, conv, output)?, geometry)
            }
            OperatorParams::Bias => {
                let lengths = output.lengths();
                let channels = lengths.get(1).copied().unwrap_or(1);
                let spatial: usize = lengths.iter().skip(2).product();
                let params = elementwise().with("CHANNELS", channels).with("SPATIAL", spatial);
                KernelRecipe::new(ELEMENTWISE_PROGRAM, "BiasFwd", params, geometry)
            }
            OperatorParams::Activation { mode } => {
                let params = elementwise().with("ACTIV_MODE", *mode as u8);
                KernelRecipe::new(ELEMENTWISE_PROGRAM, "ActivFwd", params, geometry)
            }
        })
    }
}

impl SolutionStrategy<FusionProblem> for UnfusedChain {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn is_applicable(&self, _context: &ExecutionContext, _problem: &FusionProblem) -> bool {
        true
    }

    fn build_plan(&self, _context: &ExecutionContext, problem: &FusionProblem) -> Result<BuildPlan> {
        let recipes = problem.operators().iter().map(|op| Self::stage_recipe(problem, op)).collect::<Result<Vec<_>>>()?;
        let stages: Vec<_> = problem.operators().iter().map(|op| Self::stage_arguments(op.kind())).collect();

        Ok(BuildPlan::new(recipes, move |kernels| {
            let kernels = expect_kernels(kernels, stages.len())?;
            let invoker: Invoker = Arc::new(move |device: &dyn DeviceHandle, params: InvokeParams<'_>| {
                let args = params.cast_to::<ArgumentList>()?;
                let mut last = CompletionToken::completed();
                for (kernel, names) in kernels.iter().zip(&stages) {
                    last = device.launch(kernel.as_ref(), &args.select(names)?)?;
                }
                Ok(last)
            });
            Ok(invoker)
        }))
    }
}

/// Fusion strategies in priority order.
pub fn strategies() -> StrategySet<FusionProblem> {
    StrategySet::new().with(FusedConvolution).with(UnfusedChain)
}
