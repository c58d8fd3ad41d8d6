//! Standalone operations dispatched through the same strategy and cache
//! machinery as fused pipelines.

pub mod cartesian_prod;
pub mod masked_fill;

use fusekit_device::DevicePtr;
use fusekit_dtype::ShapeDescriptor;

pub use cartesian_prod::{
    CartesianProdInvokeParams, CartesianProdProblem, cartesian_prod, cartesian_prod_workspace_bytes,
};
pub use masked_fill::{
    MaskedFillDirection, MaskedFillInvokeParams, MaskedFillProblem, masked_fill_backward, masked_fill_forward,
};

/// A device buffer together with the shape it holds.
#[derive(Debug, Clone, Copy)]
pub struct TensorRef<'a> {
    pub desc: &'a ShapeDescriptor,
    pub ptr: DevicePtr,
}

impl<'a> TensorRef<'a> {
    pub fn new(desc: &'a ShapeDescriptor, ptr: DevicePtr) -> Self {
        Self { desc, ptr }
    }
}
