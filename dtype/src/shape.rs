//! Operand shape descriptors.
//!
//! A `ShapeDescriptor` is immutable once built: lengths and strides are validated
//! together, and every layout property (packed, dense, strided) is derived from
//! them on demand instead of being stored next to them.

use std::fmt;

use smallvec::SmallVec;
use snafu::{Snafu, ensure};

use crate::DType;

/// Inline storage for per-dimension values; four dimensions cover NCHW.
pub type Dims = SmallVec<[usize; 4]>;

pub type Result<T, E = ShapeError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum ShapeError {
    /// Rank-0 descriptors are not representable.
    #[snafu(display("shape must have at least one dimension"))]
    EmptyShape,

    #[snafu(display("rank mismatch: {lengths} lengths but {strides} strides"))]
    RankMismatch { lengths: usize, strides: usize },

    #[snafu(display("dimension {dim} has zero length"))]
    ZeroLength { dim: usize },
}

/// Memory layout class of a descriptor, coarsest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Contiguity {
    /// Row-major with no gaps.
    #[strum(serialize = "packed")]
    Packed,
    /// Gap-free, but the dimensions are permuted in memory.
    #[strum(serialize = "dense")]
    Dense,
    /// Anything else: gaps, broadcasts or overlaps.
    #[strum(serialize = "strided")]
    Strided,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShapeDescriptor {
    dtype: DType,
    lengths: Dims,
    strides: Dims,
}

impl ShapeDescriptor {
    /// Build a row-major descriptor.
    pub fn packed(dtype: DType, lengths: impl IntoIterator<Item = usize>) -> Result<Self> {
        let lengths: Dims = lengths.into_iter().collect();
        let strides = packed_strides(&lengths);
        Self::strided(dtype, lengths, strides)
    }

    /// Build a descriptor with explicit strides (in elements).
    pub fn strided(
        dtype: DType,
        lengths: impl IntoIterator<Item = usize>,
        strides: impl IntoIterator<Item = usize>,
    ) -> Result<Self> {
        let lengths: Dims = lengths.into_iter().collect();
        let strides: Dims = strides.into_iter().collect();

        ensure!(!lengths.is_empty(), EmptyShapeSnafu);
        ensure!(lengths.len() == strides.len(), RankMismatchSnafu { lengths: lengths.len(), strides: strides.len() });
        if let Some(dim) = lengths.iter().position(|&len| len == 0) {
            return ZeroLengthSnafu { dim }.fail();
        }

        Ok(Self { dtype, lengths, strides })
    }

    /// Same layout, different element type.
    pub fn with_dtype(&self, dtype: DType) -> Self {
        Self { dtype, ..self.clone() }
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn rank(&self) -> usize {
        self.lengths.len()
    }

    /// Number of logical elements.
    pub fn element_count(&self) -> usize {
        self.lengths.iter().product()
    }

    /// Number of elements spanned in memory, from the first to the last addressed one.
    pub fn element_space(&self) -> usize {
        1 + self.lengths.iter().zip(&self.strides).map(|(&len, &stride)| (len - 1) * stride).sum::<usize>()
    }

    /// Bytes needed to back the whole element space.
    pub fn bytes(&self) -> usize {
        self.element_space() * self.dtype.bytes()
    }

    /// Memory offset (in elements) of a multi-dimensional index.
    pub fn offset(&self, index: &[usize]) -> usize {
        index.iter().zip(&self.strides).map(|(&i, &stride)| i * stride).sum()
    }

    pub fn is_packed(&self) -> bool {
        self.strides == packed_strides(&self.lengths)
    }

    /// Every element of the element space is addressed exactly once.
    pub fn is_dense(&self) -> bool {
        let mut dims: SmallVec<[(usize, usize); 4]> =
            self.lengths.iter().zip(&self.strides).filter(|(len, _)| **len > 1).map(|(&l, &s)| (l, s)).collect();
        dims.sort_by_key(|&(_, stride)| stride);

        let mut expected = 1;
        for (len, stride) in dims {
            if stride != expected {
                return false;
            }
            expected *= len;
        }
        true
    }

    pub fn contiguity(&self) -> Contiguity {
        if self.is_packed() {
            Contiguity::Packed
        } else if self.is_dense() {
            Contiguity::Dense
        } else {
            Contiguity::Strided
        }
    }

    /// Same lengths and strides, regardless of element type.
    pub fn same_layout(&self, other: &Self) -> bool {
        self.lengths == other.lengths && self.strides == other.strides
    }
}

/// Renders as `dtype:lengths:strides`, e.g. `fp32:2x3:3x1`.
impl fmt::Display for ShapeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.dtype, join(&self.lengths), join(&self.strides))
    }
}

fn join(dims: &[usize]) -> String {
    dims.iter().map(usize::to_string).collect::<Vec<_>>().join("x")
}

/// Row-major strides for the given lengths.
pub fn packed_strides(lengths: &[usize]) -> Dims {
    let mut strides: Dims = SmallVec::from_elem(1, lengths.len());
    for dim in (0..lengths.len().saturating_sub(1)).rev() {
        strides[dim] = strides[dim + 1] * lengths[dim + 1];
    }
    strides
}
