//! Problems: the shape-level description a strategy is selected and compiled for.

use std::fmt;

/// Canonical cache key of a problem.
///
/// Two problems with equal signatures are interchangeable: any kernel compiled
/// for one is valid for the other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProblemSignature(String);

impl ProblemSignature {
    pub fn new(signature: impl Into<String>) -> Self {
        Self(signature.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProblemSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait Problem: Send + Sync + fmt::Debug {
    /// Operation name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Everything that determines which compiled kernels are valid for this
    /// problem: element types, extents, strides, contiguity and every
    /// compile-time parameter.
    fn signature(&self) -> ProblemSignature;
}
