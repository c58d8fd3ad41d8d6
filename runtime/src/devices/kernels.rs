//! Host implementations of the kernel programs the strategies build.
//!
//! Every kernel walks its launch grid the way a device kernel would: one
//! work item per global id, items past the problem size return early, and
//! every buffer access is bounds-checked against the allocation.

use std::sync::Arc;

use fusekit_device::error::{
    CompilationSnafu, LaunchSnafu, OutOfBoundsSnafu, UnknownEntryPointSnafu, UnknownProgramSnafu,
};
use fusekit_device::{BoundKernel, DevicePtr, HostMemory, KernelRecipe, LaunchGeometry, Result, adapt};
use fusekit_dtype::HostScalar;
use snafu::{OptionExt, ensure};

use crate::operator::ActivationMode;
use crate::solver::fusion::{CONV_PROGRAM, ELEMENTWISE_PROGRAM};
use crate::solver::{cartesian_prod, masked_fill};

pub(crate) type Launcher = BoundKernel<Result<()>>;

type Builder = fn(&KernelRecipe, &Arc<HostMemory>) -> Result<Launcher>;

const KERNELS: &[(&str, &str, Builder)] = &[
    (CONV_PROGRAM, "ConvFwd", conv_fwd),
    (CONV_PROGRAM, "ConvBiasFwd", conv_bias_fwd),
    (CONV_PROGRAM, "ConvActivFwd", conv_activ_fwd),
    (CONV_PROGRAM, "ConvBiasActivFwd", conv_bias_activ_fwd),
    (ELEMENTWISE_PROGRAM, "BiasFwd", bias_fwd),
    (ELEMENTWISE_PROGRAM, "ActivFwd", activ_fwd),
    (masked_fill::PROGRAM, "MaskedFillForward", masked_fill_forward),
    (masked_fill::PROGRAM, "MaskedFillBackward", masked_fill_backward),
    (cartesian_prod::PROGRAM, "PopulateRow", populate_row),
    (cartesian_prod::PROGRAM, "Transpose", transpose),
];

pub(crate) fn find(program: &str, entry_point: &str) -> Result<Builder> {
    let mut in_program = KERNELS.iter().filter(|(name, _, _)| *name == program).peekable();
    ensure!(in_program.peek().is_some(), UnknownProgramSnafu { program });
    in_program
        .find(|(_, entry, _)| *entry == entry_point)
        .map(|(_, _, builder)| *builder)
        .context(UnknownEntryPointSnafu { program, entry_point })
}

fn define(recipe: &KernelRecipe, name: &str) -> Result<usize> {
    recipe.build_params.get_i64(name).and_then(|value| usize::try_from(value).ok()).context(CompilationSnafu {
        program: recipe.program.as_str(),
        entry_point: recipe.entry_point.as_str(),
        reason: format!("missing or invalid define {name}"),
    })
}

fn activation_mode(recipe: &KernelRecipe) -> Result<ActivationMode> {
    let raw = define(recipe, "ACTIV_MODE")?;
    u8::try_from(raw).ok().and_then(ActivationMode::from_repr).context(CompilationSnafu {
        program: recipe.program.as_str(),
        entry_point: recipe.entry_point.as_str(),
        reason: format!("unknown ACTIV_MODE {raw}"),
    })
}

fn load<T: HostScalar>(buffer: &[T], ptr: DevicePtr, index: usize) -> Result<T> {
    let size = std::mem::size_of::<T>();
    let buffer_size = buffer.len() * size;
    buffer.get(index).copied().context(OutOfBoundsSnafu { ptr, offset: index * size, size, buffer_size })
}

fn store<T: HostScalar>(buffer: &mut [T], ptr: DevicePtr, index: usize, value: T) -> Result<()> {
    let size = std::mem::size_of::<T>();
    let buffer_size = buffer.len() * size;
    let slot = buffer.get_mut(index).context(OutOfBoundsSnafu { ptr, offset: index * size, size, buffer_size })?;
    *slot = value;
    Ok(())
}

/// First global id of every work item, skipping the padding past `limit`.
fn work_items(geometry: &LaunchGeometry, limit: usize) -> impl Iterator<Item = usize> + '_ {
    geometry.global_ids().map(|[x, _, _]| x).filter(move |&x| x < limit)
}

#[derive(Debug, Clone, Copy)]
struct Activation {
    mode: ActivationMode,
    alpha: f32,
    beta: f32,
    gamma: f32,
}

impl Activation {
    fn apply(self, x: f32) -> f32 {
        self.mode.apply(x, self.alpha, self.beta, self.gamma)
    }
}

/// Convolution extents baked into a recipe's defines.
#[derive(Debug, Clone, Copy)]
struct ConvDims {
    batch: usize,
    channels: usize,
    in_extent: [usize; 2],
    in_strides: [usize; 4],
    out_channels: usize,
    out_extent: [usize; 2],
    filter: [usize; 2],
    pads: [usize; 2],
    strides: [usize; 2],
    dilations: [usize; 2],
}

impl ConvDims {
    fn from_recipe(recipe: &KernelRecipe) -> Result<Self> {
        let d = |name: &str| define(recipe, name);
        Ok(Self {
            batch: d("IN_N")?,
            channels: d("IN_C")?,
            in_extent: [d("IN_H")?, d("IN_W")?],
            in_strides: [d("IN_STRIDE_N")?, d("IN_STRIDE_C")?, d("IN_STRIDE_H")?, d("IN_STRIDE_W")?],
            out_channels: d("OUT_K")?,
            out_extent: [d("OUT_H")?, d("OUT_W")?],
            filter: [d("FIL_H")?, d("FIL_W")?],
            pads: [d("PAD_H")?, d("PAD_W")?],
            strides: [d("STRIDE_H")?, d("STRIDE_W")?],
            dilations: [d("DIL_H")?, d("DIL_W")?],
        })
    }

    fn output_len(&self) -> usize {
        self.batch * self.out_channels * self.out_extent[0] * self.out_extent[1]
    }

    fn channel_of(&self, index: usize) -> usize {
        (index / (self.out_extent[0] * self.out_extent[1])) % self.out_channels
    }

    /// Input coordinate along `dim` read by output coordinate `out` at filter tap `tap`.
    fn source(&self, dim: usize, out: usize, tap: usize) -> Option<usize> {
        (out * self.strides[dim] + tap * self.dilations[dim])
            .checked_sub(self.pads[dim])
            .filter(|&coord| coord < self.in_extent[dim])
    }

    /// Accumulator of packed output element `index`.
    fn convolve(&self, input: (&[f32], DevicePtr), weights: (&[f32], DevicePtr), index: usize) -> Result<f32> {
        let [oh_len, ow_len] = self.out_extent;
        let ow = index % ow_len;
        let oh = (index / ow_len) % oh_len;
        let k = self.channel_of(index);
        let n = index / (ow_len * oh_len * self.out_channels);
        let [sn, sc, sh, sw] = self.in_strides;
        let [fh, fw] = self.filter;

        let mut acc = 0.0f32;
        for c in 0..self.channels {
            for fy in 0..fh {
                let Some(iy) = self.source(0, oh, fy) else { continue };
                for fx in 0..fw {
                    let Some(ix) = self.source(1, ow, fx) else { continue };
                    let x = load(input.0, input.1, n * sn + c * sc + iy * sh + ix * sw)?;
                    let w = load(weights.0, weights.1, ((k * self.channels + c) * fh + fy) * fw + fx)?;
                    acc += x * w;
                }
            }
        }
        Ok(acc)
    }
}

/// Convolution with optional bias and activation epilogues.
struct ConvKernel {
    memory: Arc<HostMemory>,
    dims: ConvDims,
    geometry: LaunchGeometry,
}

impl ConvKernel {
    fn new(recipe: &KernelRecipe, memory: &Arc<HostMemory>) -> Result<Self> {
        Ok(Self { memory: Arc::clone(memory), dims: ConvDims::from_recipe(recipe)?, geometry: recipe.geometry })
    }

    fn run(
        &self,
        input: DevicePtr,
        output: DevicePtr,
        weights: DevicePtr,
        bias: Option<DevicePtr>,
        activation: Option<Activation>,
    ) -> Result<()> {
        let x = self.memory.read::<f32>(input)?;
        let w = self.memory.read::<f32>(weights)?;
        let b = bias.map(|ptr| self.memory.read::<f32>(ptr).map(|values| (ptr, values))).transpose()?;

        self.memory.update::<f32, _>(output, |out| {
            for index in work_items(&self.geometry, self.dims.output_len()) {
                let mut acc = self.dims.convolve((&x, input), (&w, weights), index)?;
                if let Some((ptr, b)) = &b {
                    acc += load(b, *ptr, self.dims.channel_of(index))?;
                }
                if let Some(activation) = activation {
                    acc = activation.apply(acc);
                }
                store(out, output, index, acc)?;
            }
            Ok(())
        })?
    }
}

fn conv_fwd(recipe: &KernelRecipe, memory: &Arc<HostMemory>) -> Result<Launcher> {
    let kernel = ConvKernel::new(recipe, memory)?;
    Ok(adapt(move |input: DevicePtr, output: DevicePtr, weights: DevicePtr| {
        kernel.run(input, output, weights, None, None)
    }))
}

fn conv_bias_fwd(recipe: &KernelRecipe, memory: &Arc<HostMemory>) -> Result<Launcher> {
    let kernel = ConvKernel::new(recipe, memory)?;
    Ok(adapt(move |input: DevicePtr, output: DevicePtr, weights: DevicePtr, bias: DevicePtr| {
        kernel.run(input, output, weights, Some(bias), None)
    }))
}

fn conv_activ_fwd(recipe: &KernelRecipe, memory: &Arc<HostMemory>) -> Result<Launcher> {
    let kernel = ConvKernel::new(recipe, memory)?;
    let mode = activation_mode(recipe)?;
    Ok(adapt(
        move |input: DevicePtr, output: DevicePtr, weights: DevicePtr, alpha: f32, beta: f32, gamma: f32| {
            kernel.run(input, output, weights, None, Some(Activation { mode, alpha, beta, gamma }))
        },
    ))
}

fn conv_bias_activ_fwd(recipe: &KernelRecipe, memory: &Arc<HostMemory>) -> Result<Launcher> {
    let kernel = ConvKernel::new(recipe, memory)?;
    let mode = activation_mode(recipe)?;
    Ok(adapt(
        move |input: DevicePtr,
              output: DevicePtr,
              weights: DevicePtr,
              bias: DevicePtr,
              alpha: f32,
              beta: f32,
              gamma: f32| {
            kernel.run(input, output, weights, Some(bias), Some(Activation { mode, alpha, beta, gamma }))
        },
    ))
}

fn bias_fwd(recipe: &KernelRecipe, memory: &Arc<HostMemory>) -> Result<Launcher> {
    let memory = Arc::clone(memory);
    let geometry = recipe.geometry;
    let numel = define(recipe, "NUMEL")?;
    let (channels, spatial) = (define(recipe, "CHANNELS")?, define(recipe, "SPATIAL")?);
    ensure!(
        channels > 0 && spatial > 0,
        CompilationSnafu {
            program: recipe.program.as_str(),
            entry_point: recipe.entry_point.as_str(),
            reason: "empty bias extents",
        }
    );

    Ok(adapt(move |data: DevicePtr, bias: DevicePtr| {
        let b = memory.read::<f32>(bias)?;
        memory.update::<f32, _>(data, |out| {
            for index in work_items(&geometry, numel) {
                let value = load(out, data, index)? + load(&b, bias, (index / spatial) % channels)?;
                store(out, data, index, value)?;
            }
            Ok(())
        })?
    }))
}

fn activ_fwd(recipe: &KernelRecipe, memory: &Arc<HostMemory>) -> Result<Launcher> {
    let memory = Arc::clone(memory);
    let geometry = recipe.geometry;
    let numel = define(recipe, "NUMEL")?;
    let mode = activation_mode(recipe)?;

    Ok(adapt(move |data: DevicePtr, alpha: f32, beta: f32, gamma: f32| {
        let activation = Activation { mode, alpha, beta, gamma };
        memory.update::<f32, _>(data, |out| {
            for index in work_items(&geometry, numel) {
                let value = activation.apply(load(out, data, index)?);
                store(out, data, index, value)?;
            }
            Ok(())
        })?
    }))
}

/// `output[i] = mask[i] ? fill(i) : input[i]` over the first `numel` elements.
fn masked_select(
    memory: &HostMemory,
    geometry: &LaunchGeometry,
    (input, output, mask): (DevicePtr, DevicePtr, DevicePtr),
    numel: usize,
    fill: f32,
) -> Result<()> {
    let x = memory.read::<f32>(input)?;
    let m = memory.read::<i8>(mask)?;
    memory.update::<f32, _>(output, |out| {
        for index in work_items(geometry, numel) {
            let value = if load(&m, mask, index)? != 0 { fill } else { load(&x, input, index)? };
            store(out, output, index, value)?;
        }
        Ok(())
    })?
}

fn masked_fill_forward(recipe: &KernelRecipe, memory: &Arc<HostMemory>) -> Result<Launcher> {
    let memory = Arc::clone(memory);
    let geometry = recipe.geometry;
    Ok(adapt(move |input: DevicePtr, output: DevicePtr, mask: DevicePtr, value: f32, numel: usize| {
        masked_select(&memory, &geometry, (input, output, mask), numel, value)
    }))
}

fn masked_fill_backward(recipe: &KernelRecipe, memory: &Arc<HostMemory>) -> Result<Launcher> {
    let memory = Arc::clone(memory);
    let geometry = recipe.geometry;
    Ok(adapt(move |output_grad: DevicePtr, input_grad: DevicePtr, mask: DevicePtr, _value: f32, numel: usize| {
        masked_select(&memory, &geometry, (output_grad, input_grad, mask), numel, 0.0)
    }))
}

fn populate_row(recipe: &KernelRecipe, memory: &Arc<HostMemory>) -> Result<Launcher> {
    let memory = Arc::clone(memory);
    let geometry = recipe.geometry;
    Ok(adapt(
        move |row: usize,
              operand: DevicePtr,
              length: usize,
              stride: usize,
              workspace: DevicePtr,
              width: usize,
              smear: usize| {
            ensure!(
                length > 0 && smear > 0,
                LaunchSnafu {
                    kernel: "PopulateRow",
                    reason: format!("length {length} and smear {smear} must be positive"),
                }
            );
            let values = memory.read::<f32>(operand)?;
            memory.update::<f32, _>(workspace, |ws| {
                for column in work_items(&geometry, width) {
                    let value = load(&values, operand, ((column / smear) % length) * stride)?;
                    store(ws, workspace, row * width + column, value)?;
                }
                Ok(())
            })?
        },
    ))
}

fn transpose(recipe: &KernelRecipe, memory: &Arc<HostMemory>) -> Result<Launcher> {
    let memory = Arc::clone(memory);
    let geometry = recipe.geometry;
    Ok(adapt(
        move |workspace: DevicePtr,
              output: DevicePtr,
              width: usize,
              rows: usize,
              row_stride: usize,
              col_stride: usize| {
            let ws = memory.read::<f32>(workspace)?;
            memory.update::<f32, _>(output, |out| {
                for [x, y, _] in geometry.global_ids() {
                    if x >= width || y >= rows {
                        continue;
                    }
                    let value = load(&ws, workspace, y * width + x)?;
                    store(out, output, x * row_stride + y * col_stride, value)?;
                }
                Ok(())
            })?
        },
    ))
}
