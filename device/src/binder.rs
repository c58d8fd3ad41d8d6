//! Binding type-erased argument lists to typed kernel-launch functions.
//!
//! Callers that assemble arguments generically (one operator at a time) end up
//! with a `&[KernelArg]` whose shape is only known at runtime, while every
//! kernel entry point is a native function with a fixed signature. `KernelFn`
//! bridges the two: it is implemented for every `Fn(P0, ..., Pn) -> R` whose
//! parameters are [`FromKernelArg`] types, and its `call_with` peels one
//! parameter at a time off the signature, casting and consuming the matching
//! head argument, until every parameter is bound and the function is invoked.
//!
//! ```ignore
//! let launch = |x: DevicePtr, n: usize, alpha: f32| scale(x, n, alpha);
//! let args = [KernelArg::Ptr(ptr), KernelArg::USize(16), KernelArg::F32(0.5)];
//! bind(&launch, &args)?;
//!
//! // Or erase the signature once and call it many times.
//! let bound = adapt(launch);
//! bound.call(&args)?;
//! ```
//!
//! Arity and type violations are returned as `ArgumentCountMismatch` and
//! `ArgumentTypeMismatch` values, never panics.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;
use snafu::{OptionExt, ensure};

use crate::error::{ArgumentCountMismatchSnafu, ArgumentTypeMismatchSnafu, Result};
use crate::kernel::{ArgKind, DevicePtr, KernelArg};

/// Inline storage for a launch signature.
pub type Signature = SmallVec<[ArgKind; 8]>;

/// A native parameter type that can be extracted from a [`KernelArg`].
pub trait FromKernelArg: Sized {
    const KIND: ArgKind;

    /// Extract the value if the stored type matches exactly.
    fn from_arg(arg: &KernelArg) -> Option<Self>;
}

macro_rules! impl_from_kernel_arg {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl FromKernelArg for $ty {
            const KIND: ArgKind = ArgKind::$variant;

            fn from_arg(arg: &KernelArg) -> Option<Self> {
                match arg {
                    KernelArg::$variant(value) => Some(*value),
                    _ => None,
                }
            }
        })*
    };
}

impl_from_kernel_arg! {
    DevicePtr => Ptr, f32 => F32, f64 => F64, i32 => I32, i64 => I64, usize => USize,
}

/// A function callable with a runtime argument list.
///
/// `Args` is the tuple of parameter types; it only exists to keep the
/// per-arity implementations apart.
pub trait KernelFn<Args>: Send + Sync {
    type Output;

    const ARITY: usize;

    /// Parameter kinds in positional order.
    fn signature() -> Signature;

    fn call_with(&self, args: &[KernelArg]) -> Result<Self::Output>;
}

/// Cast and consume the head of `args` as parameter `*index`.
fn take<P: FromKernelArg>(args: &mut std::slice::Iter<'_, KernelArg>, index: &mut usize) -> Result<P> {
    let position = *index;
    *index += 1;
    // Length was checked against the arity before peeling started.
    let arg = args.next().context(ArgumentCountMismatchSnafu { expected: position + 1, actual: position })?;
    P::from_arg(arg).context(ArgumentTypeMismatchSnafu { index: position, expected: P::KIND, actual: arg.kind() })
}

macro_rules! count {
    () => { 0usize };
    ($head:tt $($tail:tt)*) => { 1usize + count!($($tail)*) };
}

macro_rules! impl_kernel_fn {
    () => {
        impl<F, R> KernelFn<()> for F
        where
            F: Fn() -> R + Send + Sync,
        {
            type Output = R;

            const ARITY: usize = 0;

            fn signature() -> Signature {
                Signature::new()
            }

            fn call_with(&self, args: &[KernelArg]) -> Result<R> {
                ensure!(args.is_empty(), ArgumentCountMismatchSnafu { expected: 0usize, actual: args.len() });
                Ok(self())
            }
        }
    };
    ($head:ident $(, $tail:ident)*) => {
        impl_kernel_fn!(@impl $head $(, $tail)*);
        impl_kernel_fn!($($tail),*);
    };
    (@impl $($param:ident),+) => {
        #[allow(non_snake_case)]
        impl<F, R, $($param),+> KernelFn<($($param,)+)> for F
        where
            F: Fn($($param),+) -> R + Send + Sync,
            $($param: FromKernelArg,)+
        {
            type Output = R;

            const ARITY: usize = count!($($param)+);

            fn signature() -> Signature {
                let mut signature = Signature::new();
                $(signature.push($param::KIND);)+
                signature
            }

            fn call_with(&self, args: &[KernelArg]) -> Result<R> {
                ensure!(
                    args.len() == Self::ARITY,
                    ArgumentCountMismatchSnafu { expected: Self::ARITY, actual: args.len() }
                );

                let mut iter = args.iter();
                let mut index = 0usize;
                $(let $param = take::<$param>(&mut iter, &mut index)?;)+
                Ok(self($($param),+))
            }
        }
    };
}

impl_kernel_fn!(P0, P1, P2, P3, P4, P5, P6, P7, P8, P9, P10, P11);

/// Call `f` with `args`, checking arity and every argument type first.
pub fn bind<Args, F: KernelFn<Args>>(f: &F, args: &[KernelArg]) -> Result<F::Output> {
    f.call_with(args)
}

/// A launch function with its signature erased.
pub struct BoundKernel<R = ()> {
    signature: Signature,
    call: Arc<dyn Fn(&[KernelArg]) -> Result<R> + Send + Sync>,
}

impl<R> BoundKernel<R> {
    pub fn signature(&self) -> &[ArgKind] {
        &self.signature
    }

    pub fn arity(&self) -> usize {
        self.signature.len()
    }

    pub fn call(&self, args: &[KernelArg]) -> Result<R> {
        (self.call)(args)
    }
}

impl<R> Clone for BoundKernel<R> {
    fn clone(&self) -> Self {
        Self { signature: self.signature.clone(), call: Arc::clone(&self.call) }
    }
}

impl<R> fmt::Debug for BoundKernel<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundKernel").field("signature", &self.signature).finish_non_exhaustive()
    }
}

/// Erase the signature of a typed launch function.
pub fn adapt<Args, F>(f: F) -> BoundKernel<F::Output>
where
    F: KernelFn<Args> + 'static,
    F::Output: 'static,
    Args: 'static,
{
    BoundKernel { signature: F::signature(), call: Arc::new(move |args: &[KernelArg]| f.call_with(args)) }
}
