//! Device contract for the fusekit dispatch engine.
//!
//! Everything the engine needs from a device runtime lives here: the launch
//! ABI (`KernelArg`, `LaunchGeometry`, `KernelRecipe`), the argument binder that
//! calls typed launch functions with type-erased argument lists, timeline
//! synchronization for asynchronous launches, and a host-backed memory arena
//! for devices that execute on the CPU.

pub mod binder;
pub mod device;
pub mod error;
pub mod kernel;
pub mod memory;
pub mod sync;


pub use binder::{BoundKernel, FromKernelArg, KernelFn, adapt, bind};
pub use device::{CompiledKernel, DeviceFeature, DeviceHandle};
pub use error::{Error, Result};
pub use kernel::{ArgKind, DevicePtr, KernelArg, KernelBuildParams, KernelRecipe, LaunchGeometry, align_up};
pub use memory::HostMemory;
pub use sync::{CompletionToken, CpuTimelineSignal, TimelineSignal};
