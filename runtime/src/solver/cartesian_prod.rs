use std::sync::Arc;

use fusekit_device::{DeviceHandle, KernelArg, KernelBuildParams, KernelRecipe, LaunchGeometry};
use snafu::{OptionExt, ensure};

use crate::context::ExecutionContext;
use crate::error::{ArgumentCountMismatchSnafu, KernelCountMismatchSnafu, Result, WorkspaceTooSmallSnafu};
use crate::ops::cartesian_prod::{CartesianProdInvokeParams, CartesianProdProblem};
use crate::solver::{BuildPlan, InvokeParams, Invoker, SolutionStrategy, StrategySet, expect_kernels};

pub const PROGRAM: &str = "cartesian_prod.cpp";

const LOCAL_SIZE: usize = 256;
const TILE_SIZE: usize = 16;

/// Row population followed by a tiled transpose.
#[derive(Debug, Clone, Copy, Default)]
pub struct CartesianProd;

impl CartesianProd {
    pub const ID: &'static str = "cartesian-prod";
}

/// Per-operand values a `PopulateRow` launch needs.
#[derive(Debug, Clone, Copy)]
struct Row {
    operand: usize,
    length: usize,
    stride: usize,
}

impl SolutionStrategy<CartesianProdProblem> for CartesianProd {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn is_applicable(&self, _context: &ExecutionContext, problem: &CartesianProdProblem) -> bool {
        problem.output().dtype().is_float()
    }

    fn build_plan(&self, _context: &ExecutionContext, problem: &CartesianProdProblem) -> Result<BuildPlan> {
        let width = problem.rows();
        let operand_count = problem.operands().len();
        let build_params = KernelBuildParams::for_dtype(problem.output().dtype());

        // Rows are populated last operand first so the smear length can be
        // accumulated as the launches go.
        let rows: Vec<Row> = problem
            .operands()
            .iter()
            .enumerate()
            .rev()
            .map(|(operand, desc)| Row { operand, length: desc.element_count(), stride: desc.strides()[0] })
            .collect();

        let populate = KernelRecipe::new(
            PROGRAM,
            "PopulateRow",
            build_params.clone().with("LOCAL_SIZE", LOCAL_SIZE),
            LaunchGeometry::aligned_1d(width, LOCAL_SIZE),
        );
        let transpose = KernelRecipe::new(
            PROGRAM,
            "Transpose",
            build_params.with("TILE_SIZE", TILE_SIZE),
            LaunchGeometry::aligned_2d([width, operand_count], [TILE_SIZE, TILE_SIZE]),
        );
        let mut recipes = vec![populate; operand_count];
        recipes.push(transpose);

        let required = problem.workspace_bytes();
        let [out_row_stride, out_col_stride] = [problem.output().strides()[0], problem.output().strides()[1]];

        let plan = BuildPlan::new(recipes, move |kernels| {
            let mut kernels = expect_kernels(kernels, operand_count + 1)?;
            let expected = operand_count + 1;
            let transpose = kernels.pop().context(KernelCountMismatchSnafu { expected, actual: 0usize })?;
            let invoker: Invoker = Arc::new(move |device: &dyn DeviceHandle, params: InvokeParams<'_>| {
                let params = params.cast_to::<CartesianProdInvokeParams>()?;
                let operands = params.operands.len();
                ensure!(
                    operands == operand_count,
                    ArgumentCountMismatchSnafu { expected: operand_count, actual: operands }
                );
                let actual = params.workspace_bytes;
                ensure!(actual >= required, WorkspaceTooSmallSnafu { required, actual });

                let mut smear = 1;
                for (kernel, row) in kernels.iter().zip(&rows) {
                    let args = [
                        KernelArg::USize(row.operand),
                        KernelArg::Ptr(params.operands[row.operand]),
                        KernelArg::USize(row.length),
                        KernelArg::USize(row.stride),
                        KernelArg::Ptr(params.workspace),
                        KernelArg::USize(width),
                        KernelArg::USize(smear),
                    ];
                    device.launch(kernel.as_ref(), &args)?;
                    smear *= row.length;
                }

                let args = [
                    KernelArg::Ptr(params.workspace),
                    KernelArg::Ptr(params.output),
                    KernelArg::USize(width),
                    KernelArg::USize(operand_count),
                    KernelArg::USize(out_row_stride),
                    KernelArg::USize(out_col_stride),
                ];
                Ok(device.launch(transpose.as_ref(), &args)?)
            });
            Ok(invoker)
        });
        Ok(plan.with_workspace(required))
    }
}

pub fn strategies() -> StrategySet<CartesianProdProblem> {
    StrategySet::new().with(CartesianProd)
}
