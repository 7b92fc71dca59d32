//! Feature extraction
//!
//! Pure functions over buffer snapshots. No state lives here; the session
//! owns the counters and feeds snapshots in on every tick.

use crate::config::StressConfig;
use crate::types::{TapPatterns, TouchSample};

/// Weight of tremor intensity in the overall score
pub const TREMOR_WEIGHT: f64 = 0.4;
/// Weight of the capped spike count in the overall score
pub const MOVEMENT_WEIGHT: f64 = 0.3;
/// Weight of the capped repeated-tap count in the overall score
pub const TAP_WEIGHT: f64 = 0.2;
/// Weight of the capped session duration in the overall score
pub const TIME_WEIGHT: f64 = 0.1;

const SCORE_CAP: f64 = 100.0;

/// Computes features from buffered samples using the configured thresholds
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    tremor_min_samples: usize,
    tremor_multiplier: f64,
    tremor_cap: f64,
    spike_magnitude: f64,
    tap_repeat_distance_px: f64,
    tap_repeat_interval_ms: f64,
    confidence_motion_samples: f64,
    confidence_touch_samples: f64,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::from_config(&StressConfig::default())
    }
}

impl FeatureExtractor {
    pub fn from_config(config: &StressConfig) -> Self {
        Self {
            tremor_min_samples: config.tremor_min_samples,
            tremor_multiplier: config.tremor_multiplier,
            tremor_cap: config.tremor_cap,
            spike_magnitude: config.spike_magnitude,
            tap_repeat_distance_px: config.tap_repeat_distance_px,
            tap_repeat_interval_ms: config.tap_repeat_interval_ms as f64,
            confidence_motion_samples: config.confidence_motion_samples as f64,
            confidence_touch_samples: config.confidence_touch_samples as f64,
        }
    }

    /// Tremor intensity from the spread of recent magnitudes
    ///
    /// Formula: `min(cap, population_std_dev * multiplier)`, or 0 below the
    /// minimum sample count.
    pub fn tremor_intensity(&self, samples: &[f64]) -> f64 {
        if samples.len() < self.tremor_min_samples || samples.is_empty() {
            return 0.0;
        }

        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;

        (variance.sqrt() * self.tremor_multiplier).min(self.tremor_cap)
    }

    /// Repeated taps and mean inter-tap interval over consecutive pairs
    ///
    /// A pair is a repeat when it is closer than the repeat distance AND
    /// faster than the repeat interval. The average covers every pair.
    pub fn tap_pattern_stats(&self, touches: &[TouchSample]) -> TapPatterns {
        if touches.len() < 2 {
            return TapPatterns::default();
        }

        let mut repeated_taps = 0;
        let mut interval_sum = 0.0;

        for pair in touches.windows(2) {
            let (prev, curr) = (&pair[0], &pair[1]);
            let distance = ((curr.x - prev.x).powi(2) + (curr.y - prev.y).powi(2)).sqrt();
            let interval = curr.timestamp_ms as f64 - prev.timestamp_ms as f64;

            if distance < self.tap_repeat_distance_px && interval < self.tap_repeat_interval_ms {
                repeated_taps += 1;
            }
            interval_sum += interval;
        }

        TapPatterns {
            repeated_taps,
            average_interval_ms: interval_sum / (touches.len() - 1) as f64,
        }
    }

    /// Whether a single magnitude counts as a rapid movement spike
    pub fn is_rapid_movement_spike(&self, magnitude: f64) -> bool {
        magnitude > self.spike_magnitude
    }

    /// Data sufficiency, each channel contributing up to half
    ///
    /// Formula: `min(100, motion/ref_motion * 50 + touch/ref_touch * 50)`
    pub fn confidence(&self, motion_samples: usize, touch_samples: usize) -> f64 {
        let motion = motion_samples as f64 / self.confidence_motion_samples * 50.0;
        let touch = touch_samples as f64 / self.confidence_touch_samples * 50.0;
        (motion + touch).min(SCORE_CAP)
    }
}

/// Composite stress score
///
/// Formula:
/// ```text
/// overall = min(100, round(0.4 * tremor
///                        + 0.3 * min(100, rapid_movements * 10)
///                        + 0.2 * min(100, repeated_taps * 20)
///                        + 0.1 * min(100, duration_seconds * 5)))
/// ```
pub fn overall_score(
    tremor_intensity: f64,
    rapid_movements: u32,
    repeated_taps: u32,
    session_duration_seconds: f64,
) -> f64 {
    let tremor_score = tremor_intensity * TREMOR_WEIGHT;
    let movement_score = (rapid_movements as f64 * 10.0).min(SCORE_CAP) * MOVEMENT_WEIGHT;
    let tap_score = (repeated_taps as f64 * 20.0).min(SCORE_CAP) * TAP_WEIGHT;
    let time_score = (session_duration_seconds * 5.0).min(SCORE_CAP) * TIME_WEIGHT;

    (tremor_score + movement_score + tap_score + time_score)
        .round()
        .min(SCORE_CAP)
}
