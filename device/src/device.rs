//! The contract between the dispatch engine and a device runtime.
//!
//! A device offers three services:
//! - **Compile**: turn a [`KernelRecipe`] into an executable [`CompiledKernel`]
//! - **Lookup/remember**: its own `(algorithm, config)` store of compiled
//!   kernels, typically backed by an on-disk database the engine never sees
//! - **Launch**: enqueue a compiled kernel with a type-erased argument list
//!   and hand back a [`CompletionToken`]
//!
//! Launches submitted to one device execute in submission order.

use std::fmt;
use std::sync::Arc;

use enumset::{EnumSet, EnumSetType};

use crate::error::Result;
use crate::kernel::{ArgKind, KernelArg, KernelRecipe, LaunchGeometry};
use crate::sync::CompletionToken;

/// Optional device capabilities that strategies may depend on.
#[derive(Debug, Hash, EnumSetType, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum DeviceFeature {
    /// Native half-precision arithmetic.
    Fp16,
    /// Native bfloat16 arithmetic.
    Bf16,
    /// Single-kernel convolution with fused epilogues.
    FusedConvolution,
    /// Winograd convolution transforms.
    Winograd,
}

/// A compiled, executable kernel.
///
/// Immutable once created; shared by reference between every caller that
/// resolves to the same cache entry.
pub trait CompiledKernel: Send + Sync + fmt::Debug {
    /// Source program the kernel was built from.
    fn program(&self) -> &str;

    /// Entry point name.
    fn name(&self) -> &str;

    /// Launch geometry fixed at compile time.
    fn geometry(&self) -> &LaunchGeometry;

    /// Positional parameter kinds of the entry point.
    fn signature(&self) -> &[ArgKind];

    /// Run the kernel body.
    ///
    /// Called by the owning device's queue; callers go through
    /// [`DeviceHandle::launch`].
    fn execute(&self, args: &[KernelArg]) -> Result<()>;
}

/// A device runtime the engine can compile for and launch on.
pub trait DeviceHandle: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Identity of this device instance (e.g. `"reference:0"`, `"gpu:1"`).
    ///
    /// Compiled kernels are only valid on the device that compiled them, so
    /// two live devices must never report the same id.
    fn id(&self) -> &str;

    fn features(&self) -> EnumSet<DeviceFeature>;

    /// Kernels previously remembered under `(algorithm, config)`, in recipe order.
    fn lookup(&self, _algorithm: &str, _config: &str) -> Vec<Arc<dyn CompiledKernel>> {
        Vec::new()
    }

    /// Store compiled kernels under `(algorithm, config)`, replacing older ones.
    fn remember(&self, _algorithm: &str, _config: &str, _kernels: &[Arc<dyn CompiledKernel>]) {}

    fn compile(&self, recipe: &KernelRecipe) -> Result<Arc<dyn CompiledKernel>>;

    /// Enqueue one launch.
    fn launch(&self, kernel: &dyn CompiledKernel, args: &[KernelArg]) -> Result<CompletionToken>;
}
