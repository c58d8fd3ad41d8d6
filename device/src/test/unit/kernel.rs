use fusekit_dtype::DType;
use test_case::test_case;

use crate::{KernelBuildParams, LaunchGeometry, align_up};

#[test_case(0, 64 => 0)]
#[test_case(1, 64 => 64)]
#[test_case(64, 64 => 64)]
#[test_case(65, 64 => 128)]
fn test_align_up(value: usize, multiple: usize) -> usize {
    align_up(value, multiple)
}

#[test]
fn test_geometry_rounds_up_to_work_groups() {
    let geometry = LaunchGeometry::aligned_1d(100, 64);
    assert_eq!(geometry.global, [128, 1, 1]);
    assert_eq!(geometry.work_groups(), [2, 1, 1]);

    let geometry = LaunchGeometry::aligned_2d([17, 33], [16, 16]);
    assert_eq!(geometry.global, [32, 48, 1]);
    assert_eq!(geometry.total_work_items(), 32 * 48);
}

#[test]
fn test_global_ids_x_fastest() {
    let geometry = LaunchGeometry { local: [1, 1, 1], global: [2, 2, 1] };
    let ids: Vec<_> = geometry.global_ids().collect();
    assert_eq!(ids, vec![[0, 0, 0], [1, 0, 0], [0, 1, 0], [1, 1, 0]]);
}

#[test_case(DType::Float32, "USE_FP32")]
#[test_case(DType::Float16, "USE_FP16")]
#[test_case(DType::BFloat16, "USE_BFP16")]
fn test_float_selector(dtype: DType, selector: &str) {
    let params = KernelBuildParams::for_dtype(dtype);
    assert_eq!(params.get_i64(selector), Some(1));
    assert_eq!(params.iter().filter(|(_, value)| *value == "1").count(), 1);
    assert_eq!(params.selected_dtype(), Some(dtype));
}

#[test]
fn test_build_params_replace_in_place() {
    let params = KernelBuildParams::new().with("LOCAL_SIZE", 256).with("ACTIV_MODE", 3).with("LOCAL_SIZE", 64);
    assert_eq!(params.to_defines(), "-DLOCAL_SIZE=64 -DACTIV_MODE=3");
    assert_eq!(params.get("missing"), None);
}

#[test]
fn test_selected_dtype_requires_single_selector() {
    let params = KernelBuildParams::for_dtype(DType::Float32).with("USE_FP16", 1);
    assert_eq!(params.selected_dtype(), None);
    assert_eq!(KernelBuildParams::new().selected_dtype(), None);
}
