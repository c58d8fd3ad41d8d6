//! Kernel launch ABI: argument values, launch geometry and build recipes.
//!
//! A `KernelRecipe` is everything the device compiler needs to produce one
//! compiled kernel: which program and entry point, the compile-time defines,
//! and the work-group/grid shape the kernel will be launched with.

use std::fmt;

use fusekit_dtype::DType;
use smallvec::SmallVec;

/// Opaque address of a device allocation. Zero is the null pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct DevicePtr(u64);

impl DevicePtr {
    pub const NULL: Self = Self(0);

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for DevicePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Runtime type tag of a [`KernelArg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum ArgKind {
    #[strum(serialize = "ptr")]
    Ptr,
    #[strum(serialize = "f32")]
    F32,
    #[strum(serialize = "f64")]
    F64,
    #[strum(serialize = "i32")]
    I32,
    #[strum(serialize = "i64")]
    I64,
    #[strum(serialize = "usize")]
    USize,
}

/// Type-erased kernel argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelArg {
    Ptr(DevicePtr),
    F32(f32),
    F64(f64),
    I32(i32),
    I64(i64),
    USize(usize),
}

impl KernelArg {
    pub const fn kind(&self) -> ArgKind {
        match self {
            Self::Ptr(_) => ArgKind::Ptr,
            Self::F32(_) => ArgKind::F32,
            Self::F64(_) => ArgKind::F64,
            Self::I32(_) => ArgKind::I32,
            Self::I64(_) => ArgKind::I64,
            Self::USize(_) => ArgKind::USize,
        }
    }
}

macro_rules! impl_kernel_arg_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for KernelArg {
            fn from(value: $ty) -> Self {
                Self::$variant(value)
            }
        })*
    };
}

impl_kernel_arg_from! {
    DevicePtr => Ptr, f32 => F32, f64 => F64, i32 => I32, i64 => I64, usize => USize,
}

/// Round `value` up to the next multiple of `multiple`.
pub const fn align_up(value: usize, multiple: usize) -> usize {
    value.div_ceil(multiple) * multiple
}

/// Work-group and grid shape of a launch, in work items per dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaunchGeometry {
    /// Work-group size per dimension.
    pub local: [usize; 3],
    /// Total work items per dimension (a multiple of `local`).
    pub global: [usize; 3],
}

impl LaunchGeometry {
    /// 1D launch covering `work_items`, rounded up to whole work groups.
    pub fn aligned_1d(work_items: usize, local: usize) -> Self {
        Self { local: [local, 1, 1], global: [align_up(work_items, local), 1, 1] }
    }

    /// 2D launch covering `work_items`, rounded up to whole work groups.
    pub fn aligned_2d(work_items: [usize; 2], local: [usize; 2]) -> Self {
        Self {
            local: [local[0], local[1], 1],
            global: [align_up(work_items[0], local[0]), align_up(work_items[1], local[1]), 1],
        }
    }

    pub fn work_groups(&self) -> [usize; 3] {
        [self.global[0] / self.local[0], self.global[1] / self.local[1], self.global[2] / self.local[2]]
    }

    pub fn total_work_items(&self) -> usize {
        self.global.iter().product()
    }

    /// Every global work-item id, x fastest.
    pub fn global_ids(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        let [gx, gy, gz] = self.global;
        (0..gz).flat_map(move |z| (0..gy).flat_map(move |y| (0..gx).map(move |x| [x, y, z])))
    }
}

impl Default for LaunchGeometry {
    fn default() -> Self {
        Self { local: [1, 1, 1], global: [1, 1, 1] }
    }
}

/// Float-type selector defines, exactly one of which is set for a build.
pub const FLOAT_SELECTORS: [(&str, DType); 4] = [
    ("USE_FP16", DType::Float16),
    ("USE_FP32", DType::Float32),
    ("USE_FP64", DType::Float64),
    ("USE_BFP16", DType::BFloat16),
];

/// Ordered compile-time defines for one kernel build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct KernelBuildParams {
    defines: SmallVec<[(String, String); 8]>,
}

impl KernelBuildParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines selecting `dtype` as the kernel's `FLOAT` type.
    pub fn for_dtype(dtype: DType) -> Self {
        FLOAT_SELECTORS
            .iter()
            .fold(Self::new(), |params, (name, selector)| params.with(name, i32::from(*selector == dtype)))
    }

    /// Add or replace a define, builder style.
    pub fn with(mut self, name: &str, value: impl fmt::Display) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl fmt::Display) {
        let value = value.to_string();
        match self.defines.iter_mut().find(|(existing, _)| existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.defines.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.defines.iter().find(|(existing, _)| existing == name).map(|(_, value)| value.as_str())
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(|value| value.parse().ok())
    }

    /// The dtype chosen by the float selector defines, if exactly one is set.
    pub fn selected_dtype(&self) -> Option<DType> {
        let mut selected = FLOAT_SELECTORS.iter().filter(|(name, _)| self.get_i64(name) == Some(1));
        match (selected.next(), selected.next()) {
            (Some((_, dtype)), None) => Some(*dtype),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.defines.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Compiler command-line form: `-DNAME=value` separated by spaces.
    pub fn to_defines(&self) -> String {
        self.iter().map(|(name, value)| format!("-D{name}={value}")).collect::<Vec<_>>().join(" ")
    }
}

/// Everything needed to compile one kernel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KernelRecipe {
    /// Source program identifier.
    pub program: String,
    pub entry_point: String,
    pub build_params: KernelBuildParams,
    pub geometry: LaunchGeometry,
}

impl KernelRecipe {
    pub fn new(
        program: impl Into<String>,
        entry_point: impl Into<String>,
        build_params: KernelBuildParams,
        geometry: LaunchGeometry,
    ) -> Self {
        Self { program: program.into(), entry_point: entry_point.into(), build_params, geometry }
    }
}
