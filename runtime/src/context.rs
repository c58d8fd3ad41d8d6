//! Execution context: the device capabilities and tuning knobs strategies
//! consult when deciding applicability.

use std::str::FromStr;

use enumset::EnumSet;
use fusekit_device::{DeviceFeature, DeviceHandle};
use tracing::warn;

/// How strictly strategies apply their empirical thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[derive(strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum TuningMode {
    /// Only pick a strategy where it is known to beat the generic path.
    #[default]
    Heuristic,
    /// Skip the thresholds; use any strategy that can run the problem.
    Forced,
}

#[derive(Debug, Clone, Default, bon::Builder)]
pub struct ExecutionContext {
    #[builder(default)]
    features: EnumSet<DeviceFeature>,
    #[builder(default)]
    tuning: TuningMode,
    /// Strategy ids excluded from selection.
    #[builder(default)]
    disabled_strategies: Vec<String>,
}

impl ExecutionContext {
    pub const TUNING_VAR: &'static str = "FUSEKIT_TUNING";
    pub const DISABLE_VAR: &'static str = "FUSEKIT_DISABLE_STRATEGIES";

    pub fn for_device(device: &dyn DeviceHandle) -> Self {
        Self { features: device.features(), ..Self::default() }
    }

    /// Context for `features`, tuned by `FUSEKIT_TUNING` (`heuristic` or
    /// `forced`) and `FUSEKIT_DISABLE_STRATEGIES` (comma-separated ids).
    pub fn from_env(features: EnumSet<DeviceFeature>) -> Self {
        Self::from_vars(features, |name| std::env::var(name).ok())
    }

    /// Like [`Self::from_env`] with an explicit variable source.
    pub fn from_vars(features: EnumSet<DeviceFeature>, var: impl Fn(&str) -> Option<String>) -> Self {
        let tuning = match var(Self::TUNING_VAR) {
            None => TuningMode::default(),
            Some(value) => TuningMode::from_str(value.trim()).unwrap_or_else(|_| {
                warn!(%value, "unrecognized {}, using heuristic tuning", Self::TUNING_VAR);
                TuningMode::default()
            }),
        };
        let disabled_strategies = var(Self::DISABLE_VAR)
            .map(|value| value.split(',').map(str::trim).filter(|id| !id.is_empty()).map(String::from).collect())
            .unwrap_or_default();
        Self { features, tuning, disabled_strategies }
    }

    pub fn features(&self) -> EnumSet<DeviceFeature> {
        self.features
    }

    pub fn supports(&self, feature: DeviceFeature) -> bool {
        self.features.contains(feature)
    }

    pub fn tuning(&self) -> TuningMode {
        self.tuning
    }

    pub fn is_disabled(&self, strategy: &str) -> bool {
        self.disabled_strategies.iter().any(|id| id == strategy)
    }
}
