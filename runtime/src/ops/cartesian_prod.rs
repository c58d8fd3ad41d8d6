//! Cartesian product of 1-D operands into a `rows x operands` matrix.
//!
//! Row `r` holds one combination, last operand varying fastest. The product
//! is assembled in a caller-owned workspace (one row per operand, transposed)
//! and then transposed into the possibly strided output.

use fusekit_device::{CompletionToken, DevicePtr};
use fusekit_dtype::ShapeDescriptor;
use snafu::ensure;

use crate::dispatcher::Dispatcher;
use crate::error::{InvalidProblemSnafu, Result};
use crate::ops::TensorRef;
use crate::problem::{Problem, ProblemSignature};
use crate::solver::cartesian_prod;

#[derive(Debug, Clone, PartialEq)]
pub struct CartesianProdProblem {
    operands: Vec<ShapeDescriptor>,
    output: ShapeDescriptor,
}

impl CartesianProdProblem {
    pub fn new(operands: Vec<ShapeDescriptor>, output: ShapeDescriptor) -> Result<Self> {
        ensure!(!operands.is_empty(), InvalidProblemSnafu { reason: "cartesian product of no operands" });
        for (index, operand) in operands.iter().enumerate() {
            ensure!(
                operand.rank() == 1,
                InvalidProblemSnafu { reason: format!("operand {index} is not 1-D: {operand}") }
            );
            let (operand_dtype, output_dtype) = (operand.dtype(), output.dtype());
            ensure!(
                operand_dtype == output_dtype,
                InvalidProblemSnafu {
                    reason: format!("operand {index} is {operand_dtype} but output is {output_dtype}"),
                }
            );
        }
        let expected = [operands.iter().map(|operand| operand.element_count()).product(), operands.len()];
        ensure!(
            output.lengths() == expected,
            InvalidProblemSnafu { reason: format!("output must be {}x{}, got {output}", expected[0], expected[1]) }
        );
        Ok(Self { operands, output })
    }

    pub fn operands(&self) -> &[ShapeDescriptor] {
        &self.operands
    }

    pub fn output(&self) -> &ShapeDescriptor {
        &self.output
    }

    /// Number of combinations.
    pub fn rows(&self) -> usize {
        self.output.lengths()[0]
    }

    pub fn workspace_bytes(&self) -> usize {
        self.output.element_count() * self.output.dtype().bytes()
    }
}

impl Problem for CartesianProdProblem {
    fn name(&self) -> &'static str {
        "cartesian_prod"
    }

    fn signature(&self) -> ProblemSignature {
        let operands: Vec<String> = self.operands.iter().map(ToString::to_string).collect();
        ProblemSignature::new(format!("cartesian_prod|{}|{}", operands.join(";"), self.output))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CartesianProdInvokeParams {
    pub operands: Vec<DevicePtr>,
    pub output: DevicePtr,
    pub workspace: DevicePtr,
    pub workspace_bytes: usize,
}

/// Scratch bytes [`cartesian_prod`] needs for `operands`.
pub fn cartesian_prod_workspace_bytes(operands: &[ShapeDescriptor]) -> usize {
    let Some(first) = operands.first() else {
        return 0;
    };
    let rows: usize = operands.iter().map(ShapeDescriptor::element_count).product();
    rows * operands.len() * first.dtype().bytes()
}

pub fn cartesian_prod(
    dispatcher: &Dispatcher,
    operands: &[TensorRef<'_>],
    output: TensorRef<'_>,
    workspace: DevicePtr,
    workspace_bytes: usize,
) -> Result<CompletionToken> {
    let descs = operands.iter().map(|operand| operand.desc.clone()).collect();
    let problem = CartesianProdProblem::new(descs, output.desc.clone())?;
    let params = CartesianProdInvokeParams {
        operands: operands.iter().map(|operand| operand.ptr).collect(),
        output: output.ptr,
        workspace,
        workspace_bytes,
    };
    dispatcher.execute_problem(&cartesian_prod::strategies(), &problem, &params)
}
