//! Named, ordered, type-erased launch arguments.

use fusekit_device::KernelArg;
use smallvec::SmallVec;
use snafu::OptionExt;

use crate::error::{MissingArgumentSnafu, Result};

/// Positional argument values ready for a launch.
pub type LaunchArgs = SmallVec<[KernelArg; 8]>;

#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentEntry {
    pub name: String,
    pub value: KernelArg,
}

/// Arguments in the positional order of the launch they are destined for.
///
/// ```ignore
/// let args = ArgumentList::new()
///     .with("input", input)
///     .with("output", output)
///     .with("weights", weights);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgumentList {
    entries: Vec<ArgumentEntry>,
}

impl ArgumentList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<KernelArg>) {
        self.entries.push(ArgumentEntry { name: name.into(), value: value.into() });
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<KernelArg>) -> Self {
        self.push(name, value);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArgumentEntry> {
        self.entries.iter()
    }

    pub fn get(&self, name: &str) -> Option<&KernelArg> {
        self.entries.iter().find(|entry| entry.name == name).map(|entry| &entry.value)
    }

    /// Every value in list order.
    pub fn values(&self) -> LaunchArgs {
        self.entries.iter().map(|entry| entry.value).collect()
    }

    /// Values for `names`, in that order, regardless of their list positions.
    pub fn select(&self, names: &[&str]) -> Result<LaunchArgs> {
        names
            .iter()
            .map(|name| self.get(name).copied().context(MissingArgumentSnafu { name: *name }))
            .collect()
    }
}

impl<N: Into<String>, V: Into<KernelArg>> FromIterator<(N, V)> for ArgumentList {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let entries = iter.into_iter().map(|(name, value)| ArgumentEntry { name: name.into(), value: value.into() });
        Self { entries: entries.collect() }
    }
}
