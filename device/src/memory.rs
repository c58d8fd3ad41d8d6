//! Host-backed device memory.
//!
//! Device pointers handed out here are opaque ids, never host addresses, so a
//! kernel can only reach memory through the bounds-checked accessors below.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use fusekit_dtype::HostScalar;
use parking_lot::{Mutex, RwLock};
use snafu::{OptionExt, ensure};
use tracing::trace;

use crate::error::{InvalidPointerSnafu, OutOfBoundsSnafu, Result};
use crate::kernel::DevicePtr;

type Block = Arc<Mutex<Box<[u8]>>>;

#[derive(Debug)]
pub struct HostMemory {
    next: AtomicU64,
    blocks: RwLock<HashMap<DevicePtr, Block>>,
}

impl Default for HostMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl HostMemory {
    pub fn new() -> Self {
        // Id 0 is reserved for `DevicePtr::NULL`.
        Self { next: AtomicU64::new(1), blocks: RwLock::new(HashMap::new()) }
    }

    /// Allocate `bytes` zero-initialized bytes.
    pub fn alloc(&self, bytes: usize) -> DevicePtr {
        let ptr = DevicePtr::from_raw(self.next.fetch_add(1, Ordering::Relaxed));
        self.blocks.write().insert(ptr, Arc::new(Mutex::new(vec![0u8; bytes].into_boxed_slice())));
        trace!(%ptr, bytes, "host alloc");
        ptr
    }

    /// Allocate a block holding a copy of `data`.
    pub fn alloc_from<T: HostScalar>(&self, data: &[T]) -> DevicePtr {
        let ptr = self.alloc(std::mem::size_of_val(data));
        let block = self.blocks.read().get(&ptr).cloned();
        if let Some(block) = block {
            encode(data, &mut block.lock());
        }
        ptr
    }

    pub fn free(&self, ptr: DevicePtr) -> Result<()> {
        self.blocks.write().remove(&ptr).context(InvalidPointerSnafu { ptr })?;
        trace!(%ptr, "host free");
        Ok(())
    }

    pub fn size(&self, ptr: DevicePtr) -> Result<usize> {
        Ok(self.block(ptr)?.lock().len())
    }

    pub fn allocations(&self) -> usize {
        self.blocks.read().len()
    }

    /// Overwrite the start of the block with `data`.
    pub fn write<T: HostScalar>(&self, ptr: DevicePtr, data: &[T]) -> Result<()> {
        let block = self.block(ptr)?;
        let mut bytes = block.lock();
        let size = std::mem::size_of_val(data);
        ensure!(size <= bytes.len(), OutOfBoundsSnafu { ptr, offset: 0usize, size, buffer_size: bytes.len() });
        encode(data, &mut bytes[..size]);
        Ok(())
    }

    /// Read the whole block as elements of `T`.
    pub fn read<T: HostScalar>(&self, ptr: DevicePtr) -> Result<Vec<T>> {
        let block = self.block(ptr)?;
        let bytes = block.lock();
        Ok(decode(&bytes))
    }

    /// Read-modify-write the whole block as elements of `T` while holding its lock.
    pub fn update<T: HostScalar, R>(&self, ptr: DevicePtr, f: impl FnOnce(&mut [T]) -> R) -> Result<R> {
        let block = self.block(ptr)?;
        let mut bytes = block.lock();
        let mut values = decode::<T>(&bytes);
        let result = f(&mut values);
        encode(&values, &mut bytes);
        Ok(result)
    }

    fn block(&self, ptr: DevicePtr) -> Result<Block> {
        self.blocks.read().get(&ptr).cloned().context(InvalidPointerSnafu { ptr })
    }
}

fn decode<T: HostScalar>(bytes: &[u8]) -> Vec<T> {
    bytes.chunks_exact(std::mem::size_of::<T>()).map(T::read_ne).collect()
}

fn encode<T: HostScalar>(values: &[T], bytes: &mut [u8]) {
    for (value, chunk) in values.iter().zip(bytes.chunks_exact_mut(std::mem::size_of::<T>())) {
        value.write_ne(chunk);
    }
}
