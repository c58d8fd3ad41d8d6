//! Host reference device.
//!
//! Compiles recipes against the native kernels in [`super::kernels`] and runs
//! every launch synchronously on the calling thread. Launches are serialized
//! through the queue lock, so the timeline signal advances in submission
//! order and a returned token is already complete.
//!
//! Only fp32 recipes compile; anything else fails the way a device compiler
//! without the needed precision would.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use enumset::EnumSet;
use fusekit_device::error::CompilationSnafu;
use fusekit_device::{
    ArgKind, CompiledKernel, CompletionToken, CpuTimelineSignal, DeviceFeature, DeviceHandle, HostMemory, KernelArg,
    KernelRecipe, LaunchGeometry, Result, TimelineSignal,
};
use fusekit_dtype::DType;
use parking_lot::{Mutex, RwLock};
use snafu::ensure;
use tracing::{debug, trace};

use super::kernels::{self, Launcher};

#[derive(Debug)]
struct ReferenceKernel {
    program: String,
    name: String,
    geometry: LaunchGeometry,
    launch: Launcher,
}

impl CompiledKernel for ReferenceKernel {
    fn program(&self) -> &str {
        &self.program
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn geometry(&self) -> &LaunchGeometry {
        &self.geometry
    }

    fn signature(&self) -> &[ArgKind] {
        self.launch.signature()
    }

    fn execute(&self, args: &[KernelArg]) -> Result<()> {
        self.launch.call(args)?
    }
}

type StoreKey = (String, String);

static NEXT_ORDINAL: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug)]
pub struct ReferenceDevice {
    name: String,
    id: String,
    features: EnumSet<DeviceFeature>,
    memory: Arc<HostMemory>,
    store: RwLock<HashMap<StoreKey, Vec<Arc<dyn CompiledKernel>>>>,
    /// Timeline value of the last finished launch.
    queue: Mutex<u64>,
    signal: Arc<CpuTimelineSignal>,
    compilations: AtomicUsize,
    launches: AtomicUsize,
}

impl Default for ReferenceDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceDevice {
    pub fn new() -> Self {
        Self::with_features(DeviceFeature::FusedConvolution | DeviceFeature::Winograd)
    }

    pub fn with_features(features: EnumSet<DeviceFeature>) -> Self {
        let ordinal = NEXT_ORDINAL.fetch_add(1, Ordering::Relaxed);
        Self {
            name: "reference".into(),
            id: format!("reference:{ordinal}"),
            features,
            memory: Arc::new(HostMemory::new()),
            store: RwLock::new(HashMap::new()),
            queue: Mutex::new(0),
            signal: Arc::new(CpuTimelineSignal::new()),
            compilations: AtomicUsize::new(0),
            launches: AtomicUsize::new(0),
        }
    }

    /// Memory arena every kernel of this device reads and writes.
    pub fn memory(&self) -> &Arc<HostMemory> {
        &self.memory
    }

    /// Number of successful [`DeviceHandle::compile`] calls.
    pub fn compile_count(&self) -> usize {
        self.compilations.load(Ordering::Relaxed)
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::Relaxed)
    }
}

impl DeviceHandle for ReferenceDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn features(&self) -> EnumSet<DeviceFeature> {
        self.features
    }

    fn lookup(&self, algorithm: &str, config: &str) -> Vec<Arc<dyn CompiledKernel>> {
        self.store.read().get(&(algorithm.to_string(), config.to_string())).cloned().unwrap_or_default()
    }

    fn remember(&self, algorithm: &str, config: &str, kernels: &[Arc<dyn CompiledKernel>]) {
        self.store.write().insert((algorithm.to_string(), config.to_string()), kernels.to_vec());
    }

    fn compile(&self, recipe: &KernelRecipe) -> Result<Arc<dyn CompiledKernel>> {
        let dtype = recipe.build_params.selected_dtype();
        ensure!(
            dtype == Some(DType::Float32),
            CompilationSnafu {
                program: recipe.program.as_str(),
                entry_point: recipe.entry_point.as_str(),
                reason: match dtype {
                    Some(dtype) => format!("no {dtype} kernels on the reference device"),
                    None => "no element type selected".to_string(),
                },
            }
        );

        let build = kernels::find(&recipe.program, &recipe.entry_point)?;
        let launch = build(recipe, &self.memory)?;
        self.compilations.fetch_add(1, Ordering::Relaxed);
        debug!(program = %recipe.program, entry_point = %recipe.entry_point, arity = launch.arity(), "compiled kernel");

        Ok(Arc::new(ReferenceKernel {
            program: recipe.program.clone(),
            name: recipe.entry_point.clone(),
            geometry: recipe.geometry,
            launch,
        }))
    }

    fn launch(&self, kernel: &dyn CompiledKernel, args: &[KernelArg]) -> Result<CompletionToken> {
        let mut last = self.queue.lock();
        let value = *last + 1;
        trace!(kernel = kernel.name(), value, "launch");

        kernel.execute(args)?;
        *last = value;
        self.signal.set(value);
        self.launches.fetch_add(1, Ordering::Relaxed);

        let signal: Arc<dyn TimelineSignal> = self.signal.clone();
        Ok(CompletionToken::new(signal, value))
    }
}
