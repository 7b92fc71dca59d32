//! Detection thresholds
//!
//! Every constant the engine compares against lives here. The defaults are the
//! documented contract: changing one changes observable behavior.

use serde::{Deserialize, Serialize};

use crate::error::StressError;

/// Acceleration magnitude (m/s², gravity included) above which a reading is a spike
pub const DEFAULT_SPIKE_MAGNITUDE: f64 = 15.0;

/// Motion samples kept in the rolling buffer (~2 s at 60 Hz)
pub const DEFAULT_MOTION_CAPACITY: usize = 120;

/// Touch samples kept in the rolling buffer
pub const DEFAULT_TOUCH_CAPACITY: usize = 20;

/// Scoring tick interval
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 500;

/// Transfer amount at or above which the host should start monitoring
pub const DEFAULT_ACTIVATION_AMOUNT: u64 = 500_000;

/// Engine thresholds, loadable from JSON with per-field fallback to defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    // Buffers
    pub motion_capacity: usize,
    pub touch_capacity: usize,

    // Tremor
    /// Below this many motion samples tremor intensity is reported as 0
    pub tremor_min_samples: usize,
    pub tremor_multiplier: f64,
    pub tremor_cap: f64,

    // Spikes
    pub spike_magnitude: f64,
    /// Spike timestamps older than this are pruned on every new spike
    pub spike_horizon_ms: u64,
    pub spike_burst_count: usize,
    pub spike_burst_window_ms: u64,

    // Tremor rule
    pub tremor_rule_threshold: f64,
    pub tremor_rule_min_spikes: u32,

    // Taps
    pub tap_burst_count: usize,
    pub tap_burst_window_ms: u64,
    pub tap_repeat_distance_px: f64,
    pub tap_repeat_interval_ms: u64,

    // PIN anomaly
    pub pin_event_window_ms: u64,
    pub pin_abort_lookback_ms: u64,
    pub pin_abort_debounce_ms: u64,
    pub pin_abort_threshold: usize,
    pub pin_abort_window_ms: u64,

    // Scoring
    pub tick_interval_ms: u64,
    /// Motion samples that earn the full motion half of the confidence score
    pub confidence_motion_samples: usize,
    /// Touch samples that earn the full touch half of the confidence score
    pub confidence_touch_samples: usize,

    // Host side
    pub activation_amount: u64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            motion_capacity: DEFAULT_MOTION_CAPACITY,
            touch_capacity: DEFAULT_TOUCH_CAPACITY,
            tremor_min_samples: 30,
            tremor_multiplier: 10.0,
            tremor_cap: 100.0,
            spike_magnitude: DEFAULT_SPIKE_MAGNITUDE,
            spike_horizon_ms: 2_000,
            spike_burst_count: 3,
            spike_burst_window_ms: 1_000,
            tremor_rule_threshold: 30.0,
            tremor_rule_min_spikes: 2,
            tap_burst_count: 4,
            tap_burst_window_ms: 1_000,
            tap_repeat_distance_px: 50.0,
            tap_repeat_interval_ms: 2_000,
            pin_event_window_ms: 10_000,
            pin_abort_lookback_ms: 3_000,
            pin_abort_debounce_ms: 800,
            pin_abort_threshold: 3,
            pin_abort_window_ms: 10_000,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            confidence_motion_samples: 60,
            confidence_touch_samples: 10,
            activation_amount: DEFAULT_ACTIVATION_AMOUNT,
        }
    }
}

impl StressConfig {
    /// Load a configuration from JSON and validate it
    pub fn from_json(json: &str) -> Result<Self, StressError> {
        let config: StressConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to pretty JSON
    pub fn to_json(&self) -> Result<String, StressError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values that would make the engine degenerate
    pub fn validate(&self) -> Result<(), StressError> {
        let nonzero = [
            ("motion_capacity", self.motion_capacity),
            ("touch_capacity", self.touch_capacity),
            ("spike_burst_count", self.spike_burst_count),
            ("tap_burst_count", self.tap_burst_count),
            ("pin_abort_threshold", self.pin_abort_threshold),
            ("confidence_motion_samples", self.confidence_motion_samples),
            ("confidence_touch_samples", self.confidence_touch_samples),
        ];
        for (name, value) in nonzero {
            if value == 0 {
                return Err(StressError::InvalidConfig(format!("{} must be > 0", name)));
            }
        }

        if self.tick_interval_ms == 0 {
            return Err(StressError::InvalidConfig(
                "tick_interval_ms must be > 0".to_string(),
            ));
        }

        let positive = [
            ("tremor_multiplier", self.tremor_multiplier),
            ("tremor_cap", self.tremor_cap),
            ("spike_magnitude", self.spike_magnitude),
            ("tap_repeat_distance_px", self.tap_repeat_distance_px),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(StressError::InvalidConfig(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )));
            }
        }

        if self.spike_horizon_ms < self.spike_burst_window_ms {
            return Err(StressError::InvalidConfig(
                "spike_horizon_ms must cover spike_burst_window_ms".to_string(),
            ));
        }

        Ok(())
    }
}
