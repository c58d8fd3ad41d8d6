//! Resolve a strategy, make sure its kernels are compiled, and launch.

use std::any::Any;
use std::sync::Arc;

use fusekit_device::{CompiledKernel, CompletionToken, DeviceHandle};
use snafu::ResultExt;
use tracing::debug;

use crate::args::ArgumentList;
use crate::composer::PipelineComposer;
use crate::context::ExecutionContext;
use crate::error::{CompilationFailureSnafu, Result};
use crate::kernel_cache::{CachedKernelEntry, KernelCache};
use crate::problem::{Problem, ProblemSignature};
use crate::solver::fusion::{self, FusionProblem};
use crate::solver::{InvokeParams, SolutionStrategy, StrategySet};

#[derive(Debug)]
pub struct Dispatcher {
    device: Arc<dyn DeviceHandle>,
    cache: Arc<KernelCache>,
    context: ExecutionContext,
    fusion: StrategySet<FusionProblem>,
}

impl Dispatcher {
    /// Dispatcher with a context describing `device`'s features.
    pub fn new(device: Arc<dyn DeviceHandle>, cache: Arc<KernelCache>) -> Self {
        let context = ExecutionContext::for_device(device.as_ref());
        Self { device, cache, context, fusion: fusion::strategies() }
    }

    pub fn with_context(mut self, context: ExecutionContext) -> Self {
        self.context = context;
        self
    }

    /// Replace the fusion strategies, highest priority first.
    pub fn with_fusion_strategies(mut self, strategies: StrategySet<FusionProblem>) -> Self {
        self.fusion = strategies;
        self
    }

    pub fn device(&self) -> &Arc<dyn DeviceHandle> {
        &self.device
    }

    pub fn cache(&self) -> &Arc<KernelCache> {
        &self.cache
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Run a fused pipeline with `args` in [`PipelineComposer::parameter_layout`] order.
    #[tracing::instrument(skip_all, fields(operators = composer.len()))]
    pub fn execute(&self, composer: &PipelineComposer, args: &ArgumentList) -> Result<CompletionToken> {
        let problem = FusionProblem::from_composer(composer)?;
        self.execute_problem(&self.fusion, &problem, args)
    }

    /// Run any problem through `strategies` with strategy-specific `params`.
    #[tracing::instrument(skip_all, fields(problem = problem.name()))]
    pub fn execute_problem<P, A>(&self, strategies: &StrategySet<P>, problem: &P, params: &A) -> Result<CompletionToken>
    where
        P: Problem + 'static,
        A: Any + Send + Sync,
    {
        let entry = self.prepare(strategies, problem)?;
        entry.invoke(self.device.as_ref(), InvokeParams::new(params))
    }

    /// Select a strategy and make sure its kernels are compiled, without launching.
    pub fn prepare<P: Problem + 'static>(
        &self,
        strategies: &StrategySet<P>,
        problem: &P,
    ) -> Result<Arc<CachedKernelEntry>> {
        let signature = problem.signature();
        let strategy = strategies.select(&self.context, problem)?;
        self.cache.get_or_compile(self.device.id(), strategy.id(), &signature, || {
            self.compile(strategy.as_ref(), problem, &signature)
        })
    }

    fn compile<P: Problem>(
        &self,
        strategy: &dyn SolutionStrategy<P>,
        problem: &P,
        signature: &ProblemSignature,
    ) -> Result<CachedKernelEntry> {
        let plan = strategy.build_plan(&self.context, problem)?;
        let (algorithm, config) = (strategy.id(), signature.as_str());

        let mut kernels = self.device.lookup(algorithm, config);
        if kernels.len() == plan.recipes.len() {
            debug!(algorithm, config, "reusing kernels from the device store");
        } else {
            kernels = plan
                .recipes
                .iter()
                .map(|recipe| {
                    debug!(algorithm, program = %recipe.program, entry_point = %recipe.entry_point, "compiling kernel");
                    self.device.compile(recipe).context(CompilationFailureSnafu { strategy: algorithm })
                })
                .collect::<Result<Vec<Arc<dyn CompiledKernel>>>>()?;
            self.device.remember(algorithm, config, &kernels);
        }

        let invoker = (plan.invoker_factory)(&kernels)?;
        let device = self.device.id();
        Ok(CachedKernelEntry::new(device, algorithm, signature.clone(), kernels, invoker, plan.workspace_bytes))
    }
}
