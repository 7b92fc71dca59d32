//! Shake classification
//!
//! Three independent rules are checked on every scoring tick; any one firing
//! declares a shake. A firing rule consumes the evidence it saw (spike
//! timestamps and the touch buffer) so the next tick starts clean. The
//! session's shake flag is left set until the host acknowledges it.

use std::collections::VecDeque;

use crate::buffer::SignalBuffer;
use crate::config::StressConfig;
use crate::types::ShakeTrigger;

#[derive(Debug, Clone)]
pub struct ShakeClassifier {
    /// Times of recent spikes, pruned to the horizon on every spike
    spike_timestamps: VecDeque<u64>,
    spike_horizon_ms: u64,
    spike_burst_count: usize,
    spike_burst_window_ms: u64,
    tremor_rule_threshold: f64,
    tremor_rule_min_spikes: u32,
    tap_burst_count: usize,
    tap_burst_window_ms: u64,
}

impl Default for ShakeClassifier {
    fn default() -> Self {
        Self::from_config(&StressConfig::default())
    }
}

impl ShakeClassifier {
    pub fn from_config(config: &StressConfig) -> Self {
        Self {
            spike_timestamps: VecDeque::new(),
            spike_horizon_ms: config.spike_horizon_ms,
            spike_burst_count: config.spike_burst_count,
            spike_burst_window_ms: config.spike_burst_window_ms,
            tremor_rule_threshold: config.tremor_rule_threshold,
            tremor_rule_min_spikes: config.tremor_rule_min_spikes,
            tap_burst_count: config.tap_burst_count,
            tap_burst_window_ms: config.tap_burst_window_ms,
        }
    }

    /// Remember a spike at `now_ms` and drop spikes older than the horizon
    pub fn record_spike(&mut self, now_ms: u64) {
        self.spike_timestamps.push_back(now_ms);
        while let Some(&oldest) = self.spike_timestamps.front() {
            if now_ms.saturating_sub(oldest) > self.spike_horizon_ms {
                self.spike_timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Spikes inside the trailing burst window
    pub fn recent_spikes(&self, now_ms: u64) -> usize {
        self.spike_timestamps
            .iter()
            .filter(|&&t| now_ms.saturating_sub(t) < self.spike_burst_window_ms)
            .count()
    }

    /// Check the rules in order: spike burst, tremor with movement, tap burst.
    ///
    /// On a trigger the spike timestamps and touch buffer are cleared before
    /// returning.
    pub fn evaluate(
        &mut self,
        now_ms: u64,
        tremor_intensity: f64,
        rapid_movements: u32,
        buffers: &mut SignalBuffer,
    ) -> Option<ShakeTrigger> {
        let trigger = self.check_rules(now_ms, tremor_intensity, rapid_movements, buffers)?;
        self.consume(buffers);
        Some(trigger)
    }

    fn check_rules(
        &self,
        now_ms: u64,
        tremor_intensity: f64,
        rapid_movements: u32,
        buffers: &SignalBuffer,
    ) -> Option<ShakeTrigger> {
        let spikes = self.recent_spikes(now_ms);
        if spikes >= self.spike_burst_count {
            return Some(ShakeTrigger::SpikeBurst { spikes });
        }

        // Uses the cumulative session counter, not the windowed spikes
        if tremor_intensity > self.tremor_rule_threshold
            && rapid_movements >= self.tremor_rule_min_spikes
        {
            return Some(ShakeTrigger::TremorWithMovement {
                tremor_intensity,
                rapid_movements,
            });
        }

        let taps = buffers.touches_within(now_ms, self.tap_burst_window_ms);
        if taps >= self.tap_burst_count {
            return Some(ShakeTrigger::TapBurst { taps });
        }

        None
    }

    /// Anti-flood reset after a trigger
    fn consume(&mut self, buffers: &mut SignalBuffer) {
        self.spike_timestamps.clear();
        buffers.clear_touch();
    }

    pub fn reset(&mut self) {
        self.spike_timestamps.clear();
    }

    pub fn tracked_spikes(&self) -> usize {
        self.spike_timestamps.len()
    }
}
