//! Solution strategies.
//!
//! A strategy turns a problem into a [`BuildPlan`]: the kernel recipes to
//! compile, one per stage, and an [`InvokerFactory`] that, once the recipes are
//! compiled, produces the [`Invoker`] performing the launches. Strategies are
//! pure: applicability depends only on the context and the problem, and the
//! plan is fully determined by them, so compiled plans can be cached by
//! problem signature.

pub mod cartesian_prod;
pub mod fusion;
pub mod masked_fill;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use fusekit_device::{CompiledKernel, CompletionToken, DeviceHandle, KernelRecipe};
use snafu::ensure;
use tracing::debug;

use crate::context::ExecutionContext;
use crate::error::{InvokeParamsMismatchSnafu, KernelCountMismatchSnafu, NoApplicableStrategySnafu, Result};
use crate::problem::Problem;

pub use cartesian_prod::CartesianProd;
pub use fusion::{FusedConvolution, FusionProblem, UnfusedChain};
pub use masked_fill::MaskedFill;

/// Performs the launches of one compiled plan.
pub type Invoker = Arc<dyn Fn(&dyn DeviceHandle, InvokeParams<'_>) -> Result<CompletionToken> + Send + Sync>;

/// Builds the invoker from the compiled kernels, given in recipe order.
pub type InvokerFactory = Box<dyn FnOnce(&[Arc<dyn CompiledKernel>]) -> Result<Invoker> + Send>;

/// Opaque runtime parameters handed to an invoker.
///
/// Each invoker knows the concrete type its strategy expects and casts to it.
#[derive(Clone, Copy)]
pub struct InvokeParams<'a> {
    inner: &'a (dyn Any + Send + Sync),
}

impl<'a> InvokeParams<'a> {
    pub fn new<T: Any + Send + Sync>(params: &'a T) -> Self {
        Self { inner: params }
    }

    pub fn cast_to<T: Any>(&self) -> Result<&'a T> {
        let inner: &'a (dyn Any + Send + Sync) = self.inner;
        inner.downcast_ref().ok_or_else(|| InvokeParamsMismatchSnafu { expected: std::any::type_name::<T>() }.build())
    }
}

impl fmt::Debug for InvokeParams<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvokeParams").finish_non_exhaustive()
    }
}

pub struct BuildPlan {
    pub recipes: Vec<KernelRecipe>,
    /// Scratch the caller must provide per invocation.
    pub workspace_bytes: usize,
    pub invoker_factory: InvokerFactory,
}

impl BuildPlan {
    pub fn new(
        recipes: Vec<KernelRecipe>,
        invoker_factory: impl FnOnce(&[Arc<dyn CompiledKernel>]) -> Result<Invoker> + Send + 'static,
    ) -> Self {
        Self { recipes, workspace_bytes: 0, invoker_factory: Box::new(invoker_factory) }
    }

    pub fn with_workspace(mut self, bytes: usize) -> Self {
        self.workspace_bytes = bytes;
        self
    }
}

impl fmt::Debug for BuildPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildPlan")
            .field("recipes", &self.recipes)
            .field("workspace_bytes", &self.workspace_bytes)
            .finish_non_exhaustive()
    }
}

pub trait SolutionStrategy<P: Problem>: Send + Sync + fmt::Debug {
    /// Stable identifier; part of every cache key this strategy produces.
    fn id(&self) -> &'static str;

    fn is_applicable(&self, context: &ExecutionContext, problem: &P) -> bool;

    /// Only called when [`Self::is_applicable`] holds for the same inputs.
    fn build_plan(&self, context: &ExecutionContext, problem: &P) -> Result<BuildPlan>;
}

/// Strategies for one problem type, in priority order.
pub struct StrategySet<P: Problem> {
    strategies: Vec<Arc<dyn SolutionStrategy<P>>>,
}

impl<P: Problem> StrategySet<P> {
    pub fn new() -> Self {
        Self { strategies: Vec::new() }
    }

    pub fn with(mut self, strategy: impl SolutionStrategy<P> + 'static) -> Self {
        self.strategies.push(Arc::new(strategy));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn SolutionStrategy<P>>> {
        self.strategies.iter()
    }

    /// First applicable strategy the context has not disabled.
    pub fn select(&self, context: &ExecutionContext, problem: &P) -> Result<Arc<dyn SolutionStrategy<P>>> {
        for strategy in &self.strategies {
            if context.is_disabled(strategy.id()) {
                debug!(strategy = strategy.id(), "strategy disabled");
                continue;
            }
            if strategy.is_applicable(context, problem) {
                debug!(strategy = strategy.id(), problem = problem.name(), "strategy selected");
                return Ok(Arc::clone(strategy));
            }
            debug!(strategy = strategy.id(), "strategy not applicable");
        }
        NoApplicableStrategySnafu { problem: problem.name(), signature: problem.signature().to_string() }.fail()
    }
}

impl<P: Problem> Default for StrategySet<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Problem> fmt::Debug for StrategySet<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.strategies.iter()).finish()
    }
}

/// Own the compiled kernels after checking there is one per recipe.
pub(crate) fn expect_kernels(
    kernels: &[Arc<dyn CompiledKernel>],
    expected: usize,
) -> Result<Vec<Arc<dyn CompiledKernel>>> {
    ensure!(kernels.len() == expected, KernelCountMismatchSnafu { expected, actual: kernels.len() });
    Ok(kernels.to_vec())
}
