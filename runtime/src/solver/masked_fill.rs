use std::sync::Arc;

use fusekit_device::{DeviceHandle, KernelArg, KernelBuildParams, KernelRecipe, LaunchGeometry};
use fusekit_dtype::DType;

use crate::context::{ExecutionContext, TuningMode};
use crate::error::Result;
use crate::ops::masked_fill::{MaskedFillDirection, MaskedFillInvokeParams, MaskedFillProblem};
use crate::solver::{BuildPlan, InvokeParams, Invoker, SolutionStrategy, StrategySet, expect_kernels};

pub const PROGRAM: &str = "masked_fill.cpp";

const LOCAL_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, Default)]
pub struct MaskedFill;

impl MaskedFill {
    pub const ID: &'static str = "masked-fill";

    // Smallest forward element counts at which the generic path was measured
    // to be at least as fast, by dtype and contiguity.
    pub const FLOAT32_CONTIGUOUS_FWD_INFIMUM: usize = 524_288;
    pub const FLOAT16_CONTIGUOUS_FWD_INFIMUM: usize = 4_194_304;
    pub const BFLOAT16_CONTIGUOUS_FWD_INFIMUM: usize = 4_194_304;
    pub const NONCONTIGUOUS_FWD_INFIMUM: usize = 1_089_000;

    fn improves_on_generic(problem: &MaskedFillProblem) -> bool {
        let numel = problem.element_count();
        if !problem.is_contiguous() {
            return numel < Self::NONCONTIGUOUS_FWD_INFIMUM;
        }
        match problem.dtype() {
            DType::Float32 => numel < Self::FLOAT32_CONTIGUOUS_FWD_INFIMUM,
            DType::Float16 => numel < Self::FLOAT16_CONTIGUOUS_FWD_INFIMUM,
            DType::BFloat16 => numel < Self::BFLOAT16_CONTIGUOUS_FWD_INFIMUM,
            _ => false,
        }
    }
}

impl SolutionStrategy<MaskedFillProblem> for MaskedFill {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn is_applicable(&self, context: &ExecutionContext, problem: &MaskedFillProblem) -> bool {
        problem.direction() == MaskedFillDirection::Backward
            || context.tuning() == TuningMode::Forced
            || Self::improves_on_generic(problem)
    }

    fn build_plan(&self, _context: &ExecutionContext, problem: &MaskedFillProblem) -> Result<BuildPlan> {
        let numel = problem.element_count();
        let entry_point = match problem.direction() {
            MaskedFillDirection::Forward => "MaskedFillForward",
            MaskedFillDirection::Backward => "MaskedFillBackward",
        };
        let build_params = KernelBuildParams::for_dtype(problem.dtype()).with("LOCAL_SIZE", LOCAL_SIZE);
        let geometry = LaunchGeometry::aligned_1d(numel, LOCAL_SIZE);
        let recipe = KernelRecipe::new(PROGRAM, entry_point, build_params, geometry);

        Ok(BuildPlan::new(vec![recipe], move |kernels| {
            let kernels = expect_kernels(kernels, 1)?;
            let kernel = Arc::clone(&kernels[0]);
            let invoker: Invoker = Arc::new(move |device: &dyn DeviceHandle, params: InvokeParams<'_>| {
                let params = params.cast_to::<MaskedFillInvokeParams>()?;
                let args = [
                    KernelArg::Ptr(params.input),
                    KernelArg::Ptr(params.output),
                    KernelArg::Ptr(params.mask),
                    KernelArg::F32(params.value),
                    KernelArg::USize(numel),
                ];
                Ok(device.launch(kernel.as_ref(), &args)?)
            });
            Ok(invoker)
        }))
    }
}

pub fn strategies() -> StrategySet<MaskedFillProblem> {
    StrategySet::new().with(MaskedFill)
}
