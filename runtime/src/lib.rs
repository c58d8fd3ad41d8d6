//! Operator fusion and kernel dispatch.
//!
//! A caller describes a chain of operators with a [`PipelineComposer`]; the
//! composer validates the chain against the fusion table and derives every
//! intermediate shape. The [`Dispatcher`] turns the chain into a problem,
//! picks the first applicable [`SolutionStrategy`], compiles its kernels once
//! per problem signature (see [`KernelCache`]) and launches them on a
//! [`DeviceHandle`](fusekit_device::DeviceHandle).
//!
//! Standalone operations in [`ops`] go through the same strategy and cache
//! machinery with their own problem types.
//!
//! # Configuration
//!
//! [`ExecutionContext::from_env`] reads `FUSEKIT_TUNING` (`heuristic` or
//! `forced`) and `FUSEKIT_DISABLE_STRATEGIES` (comma separated strategy ids).

pub mod args;
pub mod chain;
pub mod composer;
pub mod context;
pub mod devices;
pub mod dispatcher;
pub mod error;
pub mod kernel_cache;
pub mod operator;
pub mod ops;
pub mod problem;
pub mod solver;


pub use args::{ArgumentEntry, ArgumentList, LaunchArgs};
pub use chain::ChainValidator;
pub use composer::{FusionDirection, OperatorDescriptor, PipelineComposer, compose_pipeline};
pub use context::{ExecutionContext, TuningMode};
pub use devices::ReferenceDevice;
pub use dispatcher::Dispatcher;
pub use error::{Error, Result};
pub use kernel_cache::{CacheStats, CachedKernelEntry, KernelCache};
pub use operator::{
    ActivationMode, ConvAlgorithm, ConvolutionParams, OperatorKind, OperatorParams, compute_output_shape,
};
pub use problem::{Problem, ProblemSignature};
pub use solver::{BuildPlan, InvokeParams, Invoker, InvokerFactory, SolutionStrategy, StrategySet};
