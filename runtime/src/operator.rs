//! Pipeline operators.
//!
//! Operators are a closed set: every kind carries exactly the parameters its
//! kernels need, and [`compute_output_shape`] is the single place that knows
//! how each kind transforms its input shape.

use enumset::EnumSet;
use fusekit_device::{ArgKind, DeviceFeature};
use fusekit_dtype::ShapeDescriptor;
use snafu::ensure;

use crate::error::{InvalidOperatorSnafu, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::Display, strum::EnumIter, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum OperatorKind {
    Convolution,
    Bias,
    Activation,
}

/// Activation functions, numbered as the kernels' `ACTIV_MODE` define.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[derive(strum::Display, strum::EnumIter, strum::FromRepr)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum ActivationMode {
    #[default]
    PassThrough = 0,
    Logistic = 1,
    /// `beta * tanh(alpha * x)`
    Tanh = 2,
    Relu = 3,
    SoftRelu = 4,
    Abs = 5,
    /// `(alpha + beta * x) ^ gamma`
    Power = 6,
    /// `min(alpha, max(0, x))`
    ClippedRelu = 7,
    /// `x` when positive, `alpha * x` otherwise.
    LeakyRelu = 8,
    /// `x` when positive, `alpha * (e^x - 1)` otherwise.
    Elu = 9,
}

impl ActivationMode {
    pub fn apply(self, x: f32, alpha: f32, beta: f32, gamma: f32) -> f32 {
        match self {
            Self::PassThrough => x,
            Self::Logistic => 1.0 / (1.0 + (-x).exp()),
            Self::Tanh => beta * (alpha * x).tanh(),
            Self::Relu => x.max(0.0),
            Self::SoftRelu => x.exp().ln_1p(),
            Self::Abs => x.abs(),
            Self::Power => (alpha + beta * x).powf(gamma),
            Self::ClippedRelu => alpha.min(x.max(0.0)),
            Self::LeakyRelu if x > 0.0 => x,
            Self::LeakyRelu => alpha * x,
            Self::Elu if x > 0.0 => x,
            Self::Elu => alpha * x.exp_m1(),
        }
    }
}

/// 2D convolution over NCHW activations with KCYX weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, bon::Builder)]
pub struct ConvolutionParams {
    /// Output channels (`K`).
    pub out_channels: usize,
    /// Filter extent `[y, x]`.
    pub filter: [usize; 2],
    #[builder(default = [0, 0])]
    pub pads: [usize; 2],
    #[builder(default = [1, 1])]
    pub strides: [usize; 2],
    #[builder(default = [1, 1])]
    pub dilations: [usize; 2],
}

/// Convolution algorithm variants a workspace estimate can be requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum ConvAlgorithm {
    /// No scratch.
    Direct,
    /// Im2col into a `C*Y*X x Ho*Wo` column matrix.
    Gemm,
    /// F(2x2, 3x3) transforms; 3x3 filters at unit stride and dilation only.
    Winograd,
}

impl ConvolutionParams {
    fn output_extent(&self, dim: usize, input: usize) -> Option<usize> {
        let span = self.dilations[dim] * (self.filter[dim] - 1) + 1;
        let padded = input + 2 * self.pads[dim];
        (padded >= span).then(|| (padded - span) / self.strides[dim] + 1)
    }

    fn is_winograd_compatible(&self) -> bool {
        self.filter == [3, 3] && self.strides == [1, 1] && self.dilations == [1, 1]
    }
}

/// One pipeline stage with its kind-specific parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorParams {
    Convolution(ConvolutionParams),
    Bias,
    Activation { mode: ActivationMode },
}

impl OperatorParams {
    pub fn activation(mode: ActivationMode) -> Self {
        Self::Activation { mode }
    }

    pub fn kind(&self) -> OperatorKind {
        match self {
            Self::Convolution(_) => OperatorKind::Convolution,
            Self::Bias => OperatorKind::Bias,
            Self::Activation { .. } => OperatorKind::Activation,
        }
    }

    /// Named runtime arguments this operator adds to a launch, in order.
    pub fn runtime_arguments(&self) -> &'static [(&'static str, ArgKind)] {
        match self {
            Self::Convolution(_) => &[("weights", ArgKind::Ptr)],
            Self::Bias => &[("bias", ArgKind::Ptr)],
            Self::Activation { .. } => {
                &[("activ_alpha", ArgKind::F32), ("activ_beta", ArgKind::F32), ("activ_gamma", ArgKind::F32)]
            }
        }
    }

    /// Scratch bytes needed to run this operator under `algorithm`, or `None`
    /// if it cannot run that algorithm at all.
    pub fn workspace_bytes(
        &self,
        input: &ShapeDescriptor,
        output: &ShapeDescriptor,
        algorithm: ConvAlgorithm,
        features: EnumSet<DeviceFeature>,
    ) -> Option<usize> {
        let Self::Convolution(conv) = self else {
            return Some(0);
        };
        let elem = input.dtype().bytes();
        let [_, c, _, _] = nchw(input)?;
        let [_, k, ho, wo] = nchw(output)?;
        match algorithm {
            ConvAlgorithm::Direct => Some(0),
            ConvAlgorithm::Gemm => Some(c * conv.filter[0] * conv.filter[1] * ho * wo * elem),
            ConvAlgorithm::Winograd if conv.is_winograd_compatible() && features.contains(DeviceFeature::Winograd) => {
                let tiles = ho.div_ceil(2) * wo.div_ceil(2);
                Some(16 * (c + k) * tiles * elem)
            }
            ConvAlgorithm::Winograd => None,
        }
    }
}

impl From<ConvolutionParams> for OperatorParams {
    fn from(params: ConvolutionParams) -> Self {
        Self::Convolution(params)
    }
}

fn nchw(shape: &ShapeDescriptor) -> Option<[usize; 4]> {
    shape.lengths().try_into().ok()
}

/// Output shape of `params` applied to `input`.
///
/// Bias and activation are shape-preserving; convolution produces a packed
/// `N x K x Ho x Wo` tensor of the input's element type.
pub fn compute_output_shape(params: &OperatorParams, input: &ShapeDescriptor) -> Result<ShapeDescriptor> {
    let OperatorParams::Convolution(conv) = params else {
        return Ok(input.clone());
    };

    let kind = OperatorKind::Convolution;
    let [n, _, h, w] = nchw(input).ok_or_else(|| {
        InvalidOperatorSnafu { kind, reason: format!("expected an NCHW input, got rank {}", input.rank()) }.build()
    })?;
    ensure!(input.dtype().is_float(), InvalidOperatorSnafu { kind, reason: format!("{} input", input.dtype()) });
    ensure!(conv.out_channels > 0, InvalidOperatorSnafu { kind, reason: "zero output channels" });
    ensure!(
        conv.filter.iter().chain(&conv.strides).chain(&conv.dilations).all(|&v| v > 0),
        InvalidOperatorSnafu { kind, reason: "filter, strides and dilations must be positive" }
    );

    let out = conv.output_extent(0, h).zip(conv.output_extent(1, w));
    let (ho, wo) = out.ok_or_else(|| {
        InvalidOperatorSnafu { kind, reason: format!("filter {:?} does not fit a {h}x{w} input", conv.filter) }.build()
    })?;
    Ok(ShapeDescriptor::packed(input.dtype(), [n, conv.out_channels, ho, wo])?)
}
