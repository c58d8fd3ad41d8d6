//! Devices shipped with the runtime.

mod kernels;
pub mod reference;

pub use reference::ReferenceDevice;
