use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use test_case::test_case;

use crate::{ArgKind, DevicePtr, Error, KernelArg, adapt, bind};

fn scale(x: DevicePtr, n: usize, alpha: f32) -> (u64, usize, f32) {
    (x.raw(), n, alpha)
}

#[test]
fn test_bind_casts_every_argument() {
    let args = [KernelArg::Ptr(DevicePtr::from_raw(7)), KernelArg::USize(16), KernelArg::F32(0.5)];
    assert_eq!(bind(&scale, &args).unwrap(), (7, 16, 0.5));
}

#[test]
fn test_zero_arity() {
    let calls = AtomicUsize::new(0);
    let noop = || calls.fetch_add(1, Ordering::Relaxed);
    bind(&noop, &[]).unwrap();
    assert_eq!(calls.load(Ordering::Relaxed), 1);

    let err = bind(&noop, &[KernelArg::I32(1)]).unwrap_err();
    assert!(matches!(err, Error::ArgumentCountMismatch { expected: 0, actual: 1 }));
}

#[test_case(&[KernelArg::Ptr(DevicePtr::NULL), KernelArg::USize(1)], 2; "too_few")]
#[test_case(
    &[KernelArg::Ptr(DevicePtr::NULL), KernelArg::USize(1), KernelArg::F32(1.0), KernelArg::F32(2.0)], 4;
    "too_many"
)]
fn test_arity_mismatch(args: &[KernelArg], actual: usize) {
    let err = bind(&scale, args).unwrap_err();
    assert!(matches!(err, Error::ArgumentCountMismatch { expected: 3, actual: a } if a == actual));
}

#[test_case(0, KernelArg::F32(1.0), ArgKind::Ptr, ArgKind::F32; "pointer_slot")]
#[test_case(1, KernelArg::I64(1), ArgKind::USize, ArgKind::I64; "size_slot")]
#[test_case(2, KernelArg::F64(1.0), ArgKind::F32, ArgKind::F64; "no_implicit_float_widening")]
fn test_type_mismatch_reports_index(index: usize, bad: KernelArg, expected_kind: ArgKind, actual_kind: ArgKind) {
    let mut args = [KernelArg::Ptr(DevicePtr::from_raw(1)), KernelArg::USize(4), KernelArg::F32(2.0)];
    args[index] = bad;

    let err = bind(&scale, &args).unwrap_err();
    match err {
        Error::ArgumentTypeMismatch { index: i, expected, actual } => {
            assert_eq!(i, index);
            assert_eq!(expected, expected_kind);
            assert_eq!(actual, actual_kind);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_first_mismatch_wins() {
    let args = [KernelArg::I32(0), KernelArg::I32(0), KernelArg::I32(0)];
    let err = bind(&scale, &args).unwrap_err();
    assert!(matches!(err, Error::ArgumentTypeMismatch { index: 0, .. }));
}

#[test]
fn test_signature_follows_parameter_order() {
    let bound = adapt(scale);
    assert_eq!(bound.signature(), &[ArgKind::Ptr, ArgKind::USize, ArgKind::F32]);
    assert_eq!(bound.arity(), 3);
}

#[test]
fn test_twelve_parameters() {
    let sum = |a: i32, b: i32, c: i32, d: i32, e: i32, f: i32, g: i32, h: i32, i: i32, j: i32, k: i32, l: i32| {
        a + b + c + d + e + f + g + h + i + j + k + l
    };
    let args: Vec<KernelArg> = (1..=12).map(KernelArg::I32).collect();
    assert_eq!(bind(&sum, &args).unwrap(), 78);
}

#[test]
fn test_adapted_kernel_is_shareable() {
    let hits = Arc::new(AtomicUsize::new(0));
    let bound = {
        let hits = Arc::clone(&hits);
        adapt(move |n: usize| {
            hits.fetch_add(n, Ordering::Relaxed);
        })
    };

    let clone = bound.clone();
    bound.call(&[KernelArg::USize(2)]).unwrap();
    clone.call(&[KernelArg::USize(3)]).unwrap();
    assert!(clone.call(&[KernelArg::F32(3.0)]).is_err());
    assert_eq!(hits.load(Ordering::Relaxed), 5);
}
