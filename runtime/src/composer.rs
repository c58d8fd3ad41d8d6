//! Fusion plans: ordered operator chains with eager shape propagation.

use fusekit_device::ArgKind;
use fusekit_dtype::ShapeDescriptor;
use snafu::{OptionExt, ensure};
use tracing::trace;

use crate::chain::ChainValidator;
use crate::context::ExecutionContext;
use crate::error::{Result, UnsupportedAlgorithmForWorkspaceSnafu, UnsupportedFusionDirectionSnafu};
use crate::operator::{ConvAlgorithm, OperatorKind, OperatorParams, compute_output_shape};

/// How operators of a plan are connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum FusionDirection {
    /// Each operator consumes the previous operator's output.
    #[default]
    Vertical,
    /// Operators share one input. Appending works, but shape derivation,
    /// workspace estimation and dispatch all reject it.
    Horizontal,
}

/// One appended stage with its resolved shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorDescriptor {
    params: OperatorParams,
    index: usize,
    input: ShapeDescriptor,
    output: ShapeDescriptor,
}

impl OperatorDescriptor {
    pub fn params(&self) -> &OperatorParams {
        &self.params
    }

    pub fn kind(&self) -> OperatorKind {
        self.params.kind()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn input(&self) -> &ShapeDescriptor {
        &self.input
    }

    pub fn output(&self) -> &ShapeDescriptor {
        &self.output
    }
}

#[derive(Debug, Clone)]
pub struct PipelineComposer {
    direction: FusionDirection,
    input: ShapeDescriptor,
    output: ShapeDescriptor,
    operators: Vec<OperatorDescriptor>,
    validator: ChainValidator,
}

/// Start a vertical pipeline over `input`, validated against the fusion table.
pub fn compose_pipeline(input: ShapeDescriptor) -> PipelineComposer {
    PipelineComposer::new(FusionDirection::Vertical, input)
}

impl PipelineComposer {
    pub fn new(direction: FusionDirection, input: ShapeDescriptor) -> Self {
        Self::with_validator(direction, input, ChainValidator::fusion())
    }

    pub fn with_validator(direction: FusionDirection, input: ShapeDescriptor, mut validator: ChainValidator) -> Self {
        validator.reset();
        Self { direction, output: input.clone(), input, operators: Vec::new(), validator }
    }

    /// Append an operator.
    ///
    /// The chain is validated before anything else; a failed append leaves the
    /// composer untouched.
    pub fn append(&mut self, params: impl Into<OperatorParams>) -> Result<&OperatorDescriptor> {
        let params = params.into();
        let mut validator = self.validator.clone();
        validator.advance(params.kind())?;

        let input = self.output.clone();
        let output = compute_output_shape(&params, &input)?;
        let index = self.operators.len();
        trace!(index, kind = %params.kind(), %input, %output, "append operator");

        self.validator = validator;
        self.output = output.clone();
        self.operators.push(OperatorDescriptor { params, index, input, output });
        Ok(&self.operators[index])
    }

    /// Replay shape propagation from the pipeline input.
    pub fn derive_output_shape(&self) -> Result<ShapeDescriptor> {
        self.ensure_vertical()?;
        self.operators.iter().try_fold(self.input.clone(), |shape, op| compute_output_shape(op.params(), &shape))
    }

    /// Largest scratch size any `kind` operator needs under `algorithm`.
    ///
    /// Only one operator's scratch is live at a time in a vertical pipeline,
    /// so the estimate is a maximum, not a sum.
    pub fn estimate_workspace_bytes(
        &self,
        context: &ExecutionContext,
        kind: OperatorKind,
        algorithm: ConvAlgorithm,
    ) -> Result<usize> {
        self.ensure_vertical()?;
        self.operators.iter().filter(|op| op.kind() == kind).try_fold(0, |max, op| {
            let bytes = op
                .params
                .workspace_bytes(&op.input, &op.output, algorithm, context.features())
                .context(UnsupportedAlgorithmForWorkspaceSnafu { algorithm, index: op.index })?;
            Ok(max.max(bytes))
        })
    }

    fn ensure_vertical(&self) -> Result<()> {
        ensure!(
            self.direction == FusionDirection::Vertical,
            UnsupportedFusionDirectionSnafu { direction: self.direction }
        );
        Ok(())
    }

    /// Names and kinds of the arguments an execution expects, in order.
    pub fn parameter_layout(&self) -> Vec<(&'static str, ArgKind)> {
        [("input", ArgKind::Ptr), ("output", ArgKind::Ptr)]
            .into_iter()
            .chain(self.operators.iter().flat_map(|op| op.params.runtime_arguments().iter().copied()))
            .collect()
    }

    pub fn direction(&self) -> FusionDirection {
        self.direction
    }

    pub fn input(&self) -> &ShapeDescriptor {
        &self.input
    }

    /// Output of the last appended operator (the input while empty).
    pub fn output(&self) -> &ShapeDescriptor {
        &self.output
    }

    pub fn operators(&self) -> &[OperatorDescriptor] {
        &self.operators
    }

    pub fn kinds(&self) -> impl Iterator<Item = OperatorKind> + '_ {
        self.operators.iter().map(OperatorDescriptor::kind)
    }

    pub fn matched_prefix(&self) -> &[OperatorKind] {
        self.validator.matched_prefix()
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}
