//! PIN entry anomaly tracking
//!
//! A sensor-free stress signal: typing at least one digit and then deleting it
//! shortly after counts as an aborted entry. Enough aborted entries within the
//! window declare an anomaly.

use std::collections::VecDeque;

use crate::config::StressConfig;
use crate::types::{PinEditEvent, PinEventType};

/// What a reported PIN event did to the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinOutcome {
    /// Event stored, nothing else changed
    Recorded,
    /// A delete completed an aborted entry
    AbortRecorded { aborted_attempts: usize },
    /// A delete matched but fell inside the debounce of the previous abort
    AbortDebounced,
    /// Abort threshold reached; the tracker has been cleared
    Anomaly { aborted_attempts: usize },
    /// Submit cleared all tracking
    Reset,
}

#[derive(Debug, Clone)]
pub struct PinAnomalyTracker {
    events: VecDeque<PinEditEvent>,
    aborted_attempts: VecDeque<u64>,
    event_window_ms: u64,
    abort_lookback_ms: u64,
    abort_debounce_ms: u64,
    abort_threshold: usize,
    abort_window_ms: u64,
}

impl Default for PinAnomalyTracker {
    fn default() -> Self {
        Self::from_config(&StressConfig::default())
    }
}

impl PinAnomalyTracker {
    pub fn from_config(config: &StressConfig) -> Self {
        Self {
            events: VecDeque::new(),
            aborted_attempts: VecDeque::new(),
            event_window_ms: config.pin_event_window_ms,
            abort_lookback_ms: config.pin_abort_lookback_ms,
            abort_debounce_ms: config.pin_abort_debounce_ms,
            abort_threshold: config.pin_abort_threshold,
            abort_window_ms: config.pin_abort_window_ms,
        }
    }

    pub fn report_event(
        &mut self,
        event_type: PinEventType,
        current_length: u32,
        now_ms: u64,
    ) -> PinOutcome {
        self.events.push_back(PinEditEvent {
            event_type,
            current_length,
            timestamp_ms: now_ms,
        });
        self.prune_events(now_ms);

        match event_type {
            PinEventType::Change => PinOutcome::Recorded,
            PinEventType::Delete => self.on_delete(now_ms),
            PinEventType::Submit => {
                self.clear();
                PinOutcome::Reset
            }
        }
    }

    fn on_delete(&mut self, now_ms: u64) -> PinOutcome {
        let typed_recently = self.events.iter().any(|e| {
            e.event_type == PinEventType::Change
                && e.current_length >= 1
                && now_ms.saturating_sub(e.timestamp_ms) <= self.abort_lookback_ms
        });
        if !typed_recently {
            return PinOutcome::Recorded;
        }

        let debounced = self
            .aborted_attempts
            .back()
            .is_some_and(|&last| now_ms.saturating_sub(last) < self.abort_debounce_ms);

        if !debounced {
            self.aborted_attempts.push_back(now_ms);
        }

        while let Some(&oldest) = self.aborted_attempts.front() {
            if now_ms.saturating_sub(oldest) > self.abort_window_ms {
                self.aborted_attempts.pop_front();
            } else {
                break;
            }
        }

        let aborted_attempts = self.aborted_attempts.len();
        if aborted_attempts >= self.abort_threshold {
            self.clear();
            return PinOutcome::Anomaly { aborted_attempts };
        }

        if debounced {
            PinOutcome::AbortDebounced
        } else {
            PinOutcome::AbortRecorded { aborted_attempts }
        }
    }

    fn prune_events(&mut self, now_ms: u64) {
        while let Some(oldest) = self.events.front() {
            if now_ms.saturating_sub(oldest.timestamp_ms) > self.event_window_ms {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.aborted_attempts.clear();
    }

    pub fn aborted_attempts(&self) -> usize {
        self.aborted_attempts.len()
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Type one digit then delete it, 100 ms apart
    fn abort_cycle(tracker: &mut PinAnomalyTracker, at_ms: u64) -> PinOutcome {
        tracker.report_event(PinEventType::Change, 1, at_ms);
        tracker.report_event(PinEventType::Delete, 0, at_ms + 100)
    }

    #[test]
    fn test_three_aborts_declare_anomaly() {
        let mut tracker = PinAnomalyTracker::default();

        assert_eq!(
            abort_cycle(&mut tracker, 0),
            PinOutcome::AbortRecorded { aborted_attempts: 1 }
        );
        assert_eq!(
            abort_cycle(&mut tracker, 1_000),
            PinOutcome::AbortRecorded { aborted_attempts: 2 }
        );
        assert_eq!(
            abort_cycle(&mut tracker, 2_000),
            PinOutcome::Anomaly { aborted_attempts: 3 }
        );

        assert_eq!(tracker.aborted_attempts(), 0);
        assert_eq!(tracker.pending_events(), 0);
    }

    #[test]
    fn test_two_aborts_are_not_an_anomaly() {
        let mut tracker = PinAnomalyTracker::default();
        abort_cycle(&mut tracker, 0);
        let outcome = abort_cycle(&mut tracker, 1_000);

        assert!(!matches!(outcome, PinOutcome::Anomaly { .. }));
        assert_eq!(tracker.aborted_attempts(), 2);
    }

    #[test]
    fn test_backspace_run_is_debounced() {
        let mut tracker = PinAnomalyTracker::default();
        tracker.report_event(PinEventType::Change, 1, 0);
        tracker.report_event(PinEventType::Change, 2, 100);
        tracker.report_event(PinEventType::Change, 3, 200);

        assert_eq!(
            tracker.report_event(PinEventType::Delete, 2, 300),
            PinOutcome::AbortRecorded { aborted_attempts: 1 }
        );
        assert_eq!(
            tracker.report_event(PinEventType::Delete, 1, 450),
            PinOutcome::AbortDebounced
        );
        assert_eq!(
            tracker.report_event(PinEventType::Delete, 0, 600),
            PinOutcome::AbortDebounced
        );
        assert_eq!(tracker.aborted_attempts(), 1);
    }

    #[test]
    fn test_delete_without_recent_typing_is_not_an_abort() {
        let mut tracker = PinAnomalyTracker::default();
        tracker.report_event(PinEventType::Change, 1, 0);

        // Outside the 3 s lookback
        assert_eq!(
            tracker.report_event(PinEventType::Delete, 0, 3_500),
            PinOutcome::Recorded
        );

        // Change with an empty field does not count as typing
        tracker.report_event(PinEventType::Change, 0, 4_000);
        assert_eq!(
            tracker.report_event(PinEventType::Delete, 0, 4_100),
            PinOutcome::Recorded
        );
        assert_eq!(tracker.aborted_attempts(), 0);
    }

    #[test]
    fn test_old_aborts_expire() {
        let mut tracker = PinAnomalyTracker::default();
        abort_cycle(&mut tracker, 0);
        abort_cycle(&mut tracker, 1_000);

        // First abort (at 100) is more than 10 s before 10_200
        let outcome = abort_cycle(&mut tracker, 10_100);
        assert_eq!(outcome, PinOutcome::AbortRecorded { aborted_attempts: 2 });
    }

    #[test]
    fn test_submit_resets_tracking() {
        let mut tracker = PinAnomalyTracker::default();
        abort_cycle(&mut tracker, 0);
        abort_cycle(&mut tracker, 1_000);

        assert_eq!(
            tracker.report_event(PinEventType::Submit, 4, 1_500),
            PinOutcome::Reset
        );
        assert_eq!(tracker.aborted_attempts(), 0);
        assert_eq!(tracker.pending_events(), 0);

        let outcome = abort_cycle(&mut tracker, 2_000);
        assert_eq!(outcome, PinOutcome::AbortRecorded { aborted_attempts: 1 });
    }

    #[test]
    fn test_event_window_pruned() {
        let mut tracker = PinAnomalyTracker::default();
        for t in (0..20_000).step_by(1_000) {
            tracker.report_event(PinEventType::Change, 1, t);
        }
        // Events within 10 s of 19_000: 9_000..=19_000
        assert_eq!(tracker.pending_events(), 11);
    }
}
