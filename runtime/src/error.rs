//! Error types for composition and dispatch.

use fusekit_device::ArgKind;
use fusekit_dtype::ShapeError;
use snafu::Snafu;

use crate::composer::FusionDirection;
use crate::operator::{ConvAlgorithm, OperatorKind};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// The operator sequence is not a prefix of any supported chain.
    #[snafu(display("{kind} at index {index} does not extend any supported chain (matched {matched:?})"))]
    UnsupportedChain { kind: OperatorKind, index: usize, matched: Vec<OperatorKind> },

    #[snafu(display("fusion direction {direction} is not supported"))]
    UnsupportedFusionDirection { direction: FusionDirection },

    #[snafu(display("no applicable strategy for {problem} problem {signature}"))]
    NoApplicableStrategy { problem: &'static str, signature: String },

    #[snafu(display("{kind} cannot start a fused pipeline"))]
    UnsupportedStartingOperator { kind: OperatorKind },

    #[snafu(display("pipeline has no operators"))]
    EmptyPipeline,

    #[snafu(display("argument count mismatch: expected {expected}, got {actual}"))]
    ArgumentCountMismatch { expected: usize, actual: usize },

    #[snafu(display("argument {index} type mismatch: expected {expected}, got {actual}"))]
    ArgumentTypeMismatch { index: usize, expected: ArgKind, actual: ArgKind },

    #[snafu(display("missing argument '{name}'"))]
    MissingArgument { name: String },

    /// The device compiler rejected one of the strategy's recipes.
    #[snafu(display("strategy {strategy} failed to compile: {source}"))]
    CompilationFailure { strategy: String, source: fusekit_device::Error },

    #[snafu(display("operator {index} cannot run the {algorithm} algorithm"))]
    UnsupportedAlgorithmForWorkspace { algorithm: ConvAlgorithm, index: usize },

    #[snafu(display("invalid {kind} operator: {reason}"))]
    InvalidOperator { kind: OperatorKind, reason: String },

    #[snafu(display("invalid problem: {reason}"))]
    InvalidProblem { reason: String },

    #[snafu(display("invoke parameters are not {expected}"))]
    InvokeParamsMismatch { expected: &'static str },

    #[snafu(display("expected {expected} compiled kernels, got {actual}"))]
    KernelCountMismatch { expected: usize, actual: usize },

    #[snafu(display("workspace too small: need {required} bytes, got {actual}"))]
    WorkspaceTooSmall { required: usize, actual: usize },

    #[snafu(context(false), display("shape error: {source}"))]
    Shape { source: ShapeError },

    #[snafu(display("device error: {source}"))]
    Device { source: fusekit_device::Error },
}

/// Binder violations keep their engine meaning; everything else the device
/// reports is passed through as-is.
impl From<fusekit_device::Error> for Error {
    fn from(source: fusekit_device::Error) -> Self {
        match source {
            fusekit_device::Error::ArgumentCountMismatch { expected, actual } => {
                Self::ArgumentCountMismatch { expected, actual }
            }
            fusekit_device::Error::ArgumentTypeMismatch { index, expected, actual } => {
                Self::ArgumentTypeMismatch { index, expected, actual }
            }
            source => Self::Device { source },
        }
    }
}
