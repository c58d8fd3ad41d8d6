use std::collections::HashMap;

use enumset::EnumSet;
use fusekit_device::DeviceFeature;
use test_case::test_case;

use crate::context::{ExecutionContext, TuningMode};

fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |name| map.get(name).cloned()
}

#[test]
fn test_defaults_without_variables() {
    let context = ExecutionContext::from_vars(EnumSet::only(DeviceFeature::Fp16), vars(&[]));
    assert_eq!(context.tuning(), TuningMode::Heuristic);
    assert!(context.supports(DeviceFeature::Fp16));
    assert!(!context.supports(DeviceFeature::Winograd));
    assert!(!context.is_disabled("unfused-chain"));
}

#[test_case("forced", TuningMode::Forced; "lower")]
#[test_case("FORCED", TuningMode::Forced; "upper")]
#[test_case(" heuristic ", TuningMode::Heuristic; "padded")]
fn test_tuning_mode_parsing(value: &str, expected: TuningMode) {
    let context = ExecutionContext::from_vars(EnumSet::empty(), vars(&[(ExecutionContext::TUNING_VAR, value)]));
    assert_eq!(context.tuning(), expected);
}

#[test]
#[tracing_test::traced_test]
fn test_unknown_tuning_mode_falls_back() {
    let context = ExecutionContext::from_vars(EnumSet::empty(), vars(&[(ExecutionContext::TUNING_VAR, "exhaustive")]));
    assert_eq!(context.tuning(), TuningMode::Heuristic);
    assert!(logs_contain("unrecognized FUSEKIT_TUNING"));
}

#[test]
fn test_disabled_strategy_list() {
    let context = ExecutionContext::from_vars(
        EnumSet::empty(),
        vars(&[(ExecutionContext::DISABLE_VAR, "fused-convolution, masked-fill,,")]),
    );
    assert!(context.is_disabled("fused-convolution"));
    assert!(context.is_disabled("masked-fill"));
    assert!(!context.is_disabled(""));
    assert!(!context.is_disabled("unfused-chain"));
}

#[test]
fn test_builder() {
    let context = ExecutionContext::builder()
        .tuning(TuningMode::Forced)
        .disabled_strategies(vec!["cartesian-prod".to_string()])
        .build();
    assert_eq!(context.tuning(), TuningMode::Forced);
    assert!(context.features().is_empty());
    assert!(context.is_disabled("cartesian-prod"));
}
