use serde::{Deserialize, Serialize};

use crate::AdvisorError;

/// Tunable parameters for the recommendation engine and learning loop.
/// Every constant here is a calibration default, not required behavior;
/// callers override per call or per process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Composite score at or above which the action is BUY
    pub buy_threshold: f64,
    /// Composite score at or below which the action is SELL
    pub sell_threshold: f64,
    /// Maximum expected move, scales the target price
    pub k_target: f64,
    /// Risk tolerance, scales the stop-loss distance
    pub k_stop: f64,
    pub learning_rate: f64,
    pub weight_floor: f64,
    pub weight_ceiling: f64,
    /// Days after which an unlabeled entry can expire
    pub evaluation_horizon_days: i64,
    /// Relative drift a HOLD may show and still count as correct
    pub hold_drift_tolerance: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buy_threshold: 0.3,
            sell_threshold: -0.3,
            k_target: 0.1,
            k_stop: 0.05,
            learning_rate: 0.1,
            weight_floor: 0.05,
            weight_ceiling: 5.0,
            evaluation_horizon_days: 7,
            hold_drift_tolerance: 0.02,
        }
    }
}

impl EngineConfig {
    /// Reject configurations that would corrupt scoring or the weight
    /// vector. Called at every entry point before any state is touched.
    pub fn validate(&self) -> Result<(), AdvisorError> {
        if self.k_target <= 0.0 || !self.k_target.is_finite() {
            return Err(AdvisorError::InvalidConfiguration(format!(
                "k_target must be positive, got {}",
                self.k_target
            )));
        }
        if self.k_stop <= 0.0 || !self.k_stop.is_finite() {
            return Err(AdvisorError::InvalidConfiguration(format!(
                "k_stop must be positive, got {}",
                self.k_stop
            )));
        }
        if self.learning_rate < 0.0 || !self.learning_rate.is_finite() {
            return Err(AdvisorError::InvalidConfiguration(format!(
                "learning_rate must be non-negative, got {}",
                self.learning_rate
            )));
        }
        if self.weight_floor < 0.0 || self.weight_floor > self.weight_ceiling {
            return Err(AdvisorError::InvalidConfiguration(format!(
                "weight floor/ceiling [{}, {}] is not a valid range",
                self.weight_floor, self.weight_ceiling
            )));
        }
        if self.buy_threshold <= self.sell_threshold {
            return Err(AdvisorError::InvalidConfiguration(format!(
                "buy_threshold {} must exceed sell_threshold {}",
                self.buy_threshold, self.sell_threshold
            )));
        }
        if self.hold_drift_tolerance < 0.0 {
            return Err(AdvisorError::InvalidConfiguration(format!(
                "hold_drift_tolerance must be non-negative, got {}",
                self.hold_drift_tolerance
            )));
        }
        if self.evaluation_horizon_days < 0 {
            return Err(AdvisorError::InvalidConfiguration(format!(
                "evaluation_horizon_days must be non-negative, got {}",
                self.evaluation_horizon_days
            )));
        }
        Ok(())
    }
}
