//! Offline replay of recorded sensor traces
//!
//! A trace is a list of timestamped motion, touch and PIN events, usually
//! stored as NDJSON:
//!
//! ```text
//! {"kind":"motion","t_ms":0,"x":0.1,"y":9.7,"z":0.3}
//! {"kind":"touch","t_ms":120,"x":210.0,"y":480.0}
//! {"kind":"pin","t_ms":400,"pin_type":"change","length":1}
//! ```
//!
//! Replay drives a real session with a manual clock, so the output matches
//! what a live session would have produced for the same timing.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::{Clock, ManualClock};
use crate::config::StressConfig;
use crate::error::StressError;
use crate::pin::PinOutcome;
use crate::session::{PollOutcome, StressSession};
use crate::source::QueueSource;
use crate::types::{AccelerationReading, PinEventType, ShakeTrigger, StressMetrics, TouchEvent};

/// One recorded input event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEvent {
    Motion {
        t_ms: u64,
        #[serde(default)]
        x: Option<f64>,
        #[serde(default)]
        y: Option<f64>,
        #[serde(default)]
        z: Option<f64>,
    },
    Touch {
        t_ms: u64,
        #[serde(default)]
        x: Option<f64>,
        #[serde(default)]
        y: Option<f64>,
    },
    Pin {
        t_ms: u64,
        pin_type: PinEventType,
        length: u32,
    },
}

impl TraceEvent {
    pub fn timestamp_ms(&self) -> u64 {
        match self {
            TraceEvent::Motion { t_ms, .. }
            | TraceEvent::Touch { t_ms, .. }
            | TraceEvent::Pin { t_ms, .. } => *t_ms,
        }
    }

    /// Payload problems that would make a live session drop this event
    pub fn payload_issue(&self) -> Option<String> {
        match self {
            TraceEvent::Motion { t_ms, x, y, z } => AccelerationReading {
                x: *x,
                y: *y,
                z: *z,
                timestamp_ms: Some(*t_ms),
            }
            .magnitude()
            .err()
            .map(|e| e.to_string()),
            TraceEvent::Touch { t_ms, x, y } => TouchEvent {
                x: *x,
                y: *y,
                timestamp_ms: Some(*t_ms),
            }
            .to_sample(*t_ms)
            .err()
            .map(|e| e.to_string()),
            TraceEvent::Pin { .. } => None,
        }
    }
}

/// A shake declared during replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub t_ms: u64,
    pub trigger: ShakeTrigger,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayReport {
    pub events_processed: usize,
    pub dropped_samples: u64,
    /// One snapshot per scoring tick
    pub ticks: Vec<StressMetrics>,
    pub detections: Vec<Detection>,
}

impl ReplayReport {
    pub fn final_metrics(&self) -> Option<&StressMetrics> {
        self.ticks.last()
    }
}

struct Replayer {
    clock: ManualClock,
    motion: QueueSource<AccelerationReading>,
    touch: QueueSource<TouchEvent>,
    session: StressSession,
    report: ReplayReport,
}

impl Replayer {
    fn new(config: StressConfig, start_ms: u64) -> Self {
        let clock = ManualClock::new(start_ms);
        let motion = QueueSource::new();
        let touch = QueueSource::new();
        let session = StressSession::new(config, Arc::new(clock.clone()))
            .with_motion_source(Box::new(motion.clone()))
            .with_touch_source(Box::new(touch.clone()));
        Self {
            clock,
            motion,
            touch,
            session,
            report: ReplayReport {
                events_processed: 0,
                dropped_samples: 0,
                ticks: Vec::new(),
                detections: Vec::new(),
            },
        }
    }

    /// Run every tick scheduled at or before `t_ms`
    fn run_ticks_until(&mut self, t_ms: u64) {
        while let Some(due) = self.session.next_tick_at() {
            if due > t_ms {
                break;
            }
            self.clock.set(due);
            let outcome = self.session.poll();
            self.record(outcome);
        }
    }

    fn apply(&mut self, event: &TraceEvent) {
        let t_ms = event.timestamp_ms();
        self.run_ticks_until(t_ms);
        self.clock.set(t_ms);

        match *event {
            TraceEvent::Motion { x, y, z, .. } => {
                self.motion.push(AccelerationReading {
                    x,
                    y,
                    z,
                    timestamp_ms: Some(t_ms),
                });
            }
            TraceEvent::Touch { x, y, .. } => {
                self.touch.push(TouchEvent {
                    x,
                    y,
                    timestamp_ms: Some(t_ms),
                });
            }
            TraceEvent::Pin {
                pin_type, length, ..
            } => {
                if let PinOutcome::Anomaly { .. } = self.session.report_pin_event(pin_type, length) {
                    self.record_detection();
                }
            }
        }

        let outcome = self.session.poll();
        self.record(outcome);
        self.report.events_processed += 1;
    }

    fn record(&mut self, outcome: PollOutcome) {
        if outcome.ticked {
            self.report.ticks.push(self.session.metrics().clone());
        }
        if outcome.trigger.is_some() {
            self.record_detection();
        }
    }

    fn record_detection(&mut self) {
        if let Some(trigger) = self.session.last_trigger() {
            self.report.detections.push(Detection {
                t_ms: self.clock.now_ms(),
                trigger,
            });
        }
        self.session.consume_shake();
    }

    fn finish(mut self) -> ReplayReport {
        // One more tick so samples after the last scheduled tick are scored
        if let Some(due) = self.session.next_tick_at() {
            self.clock.set(due);
            let outcome = self.session.poll();
            self.record(outcome);
        }
        self.report.dropped_samples = self.session.dropped_samples();
        self.session.stop();
        self.report
    }
}

/// Replay `events` (in timestamp order, ties keep input order) through a fresh session
pub fn replay_trace(events: &[TraceEvent], config: &StressConfig) -> Result<ReplayReport, StressError> {
    config.validate()?;

    let mut ordered = events.to_vec();
    ordered.sort_by_key(TraceEvent::timestamp_ms);

    let start_ms = ordered.first().map(TraceEvent::timestamp_ms).unwrap_or(0);
    let mut replayer = Replayer::new(config.clone(), start_ms);
    replayer.session.start();

    for event in &ordered {
        replayer.apply(event);
    }
    Ok(replayer.finish())
}

/// Parse newline-delimited trace events, skipping blank lines
pub fn parse_ndjson(input: &str) -> Result<Vec<TraceEvent>, StressError> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line.trim())
                .map_err(|e| StressError::ParseError(format!("line {}: {}", idx + 1, e)))
        })
        .collect()
}

/// Parse a JSON array of trace events
pub fn parse_array(input: &str) -> Result<Vec<TraceEvent>, StressError> {
    Ok(serde_json::from_str(input)?)
}

/// A trace line that failed to parse or would be dropped by a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceIssue {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceValidation {
    pub total: usize,
    pub valid: usize,
    pub issues: Vec<TraceIssue>,
}

impl TraceValidation {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Check every NDJSON line without stopping at the first failure
pub fn validate_ndjson(input: &str) -> TraceValidation {
    let mut validation = TraceValidation::default();

    for (idx, line) in input.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        validation.total += 1;

        let issue = match serde_json::from_str::<TraceEvent>(trimmed) {
            Ok(event) => event.payload_issue(),
            Err(e) => Some(e.to_string()),
        };
        match issue {
            Some(message) => validation.issues.push(TraceIssue {
                line: idx + 1,
                message,
            }),
            None => validation.valid += 1,
        }
    }

    validation
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn motion(t_ms: u64, z: f64) -> TraceEvent {
        TraceEvent::Motion {
            t_ms,
            x: Some(0.0),
            y: Some(0.0),
            z: Some(z),
        }
    }

    fn pin(t_ms: u64, pin_type: PinEventType, length: u32) -> TraceEvent {
        TraceEvent::Pin {
            t_ms,
            pin_type,
            length,
        }
    }

    #[test]
    fn test_parse_ndjson() {
        let input = r#"
{"kind":"motion","t_ms":0,"x":0.1,"y":9.7,"z":0.3}

{"kind":"touch","t_ms":120,"x":210.0,"y":480.0}
{"kind":"pin","t_ms":400,"pin_type":"change","length":1}
"#;
        let events = parse_ndjson(input).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2], pin(400, PinEventType::Change, 1));
    }

    #[test]
    fn test_parse_ndjson_reports_line() {
        let input = "{\"kind\":\"motion\",\"t_ms\":0}\n{\"kind\":\"unknown\",\"t_ms\":1}\n";
        let err = parse_ndjson(input).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_parse_array() {
        let events = parse_array(r#"[{"kind":"touch","t_ms":5,"x":1.0,"y":2.0}]"#).unwrap();
        assert_eq!(events[0].timestamp_ms(), 5);
    }

    #[test]
    fn test_validate_flags_dropped_payloads() {
        let input = concat!(
            "{\"kind\":\"motion\",\"t_ms\":0,\"x\":1.0,\"y\":2.0,\"z\":3.0}\n",
            "{\"kind\":\"motion\",\"t_ms\":16,\"x\":1.0}\n",
            "not json\n",
        );
        let validation = validate_ndjson(input);

        assert_eq!(validation.total, 3);
        assert_eq!(validation.valid, 1);
        assert_eq!(
            validation.issues.iter().map(|i| i.line).collect::<Vec<_>>(),
            vec![2, 3]
        );
    }

    #[test]
    fn test_replay_spike_burst() {
        let events = vec![
            motion(0, 9.8),
            motion(100, 18.0),
            motion(200, 19.0),
            motion(300, 17.5),
            motion(400, 9.8),
        ];
        let report = replay_trace(&events, &StressConfig::default()).unwrap();

        assert_eq!(report.events_processed, 5);
        assert_eq!(report.detections.len(), 1);
        assert_eq!(report.detections[0].t_ms, 500);
        assert_eq!(
            report.detections[0].trigger,
            ShakeTrigger::SpikeBurst { spikes: 3 }
        );
        assert_eq!(report.final_metrics().unwrap().rapid_movements, 3);
    }

    #[test]
    fn test_replay_quiet_trace() {
        let events: Vec<TraceEvent> = (0..120).map(|i| motion(i * 16, 9.81)).collect();
        let report = replay_trace(&events, &StressConfig::default()).unwrap();

        assert!(report.detections.is_empty());
        // Ticks at 500, 1000, 1500 during the trace plus the closing tick at 2000
        assert_eq!(report.ticks.len(), 4);
        let last = report.final_metrics().unwrap();
        assert!(last.tremor_intensity < 1e-9);
        assert_eq!(last.confidence, 100.0);
    }

    #[test]
    fn test_replay_pin_anomaly() {
        let mut events = Vec::new();
        for cycle in 0..3u64 {
            events.push(pin(cycle * 1_000, PinEventType::Change, 1));
            events.push(pin(cycle * 1_000 + 100, PinEventType::Delete, 0));
        }
        let report = replay_trace(&events, &StressConfig::default()).unwrap();

        assert_eq!(report.detections.len(), 1);
        assert_eq!(report.detections[0].t_ms, 2_100);
        assert_eq!(
            report.detections[0].trigger,
            ShakeTrigger::PinAnomaly { aborted_attempts: 3 }
        );
    }

    #[test]
    fn test_replay_orders_events() {
        let events = vec![motion(300, 18.0), motion(100, 18.0), motion(200, 18.0)];
        let report = replay_trace(&events, &StressConfig::default()).unwrap();
        assert_eq!(report.detections.len(), 1);
        assert_eq!(report.detections[0].t_ms, 600);
    }

    #[test]
    fn test_replay_counts_dropped_samples() {
        let events = vec![
            TraceEvent::Touch {
                t_ms: 0,
                x: None,
                y: Some(1.0),
            },
            motion(10, 9.8),
        ];
        let report = replay_trace(&events, &StressConfig::default()).unwrap();
        assert_eq!(report.dropped_samples, 1);
    }

    #[test]
    fn test_replay_rejects_invalid_config() {
        let config = StressConfig {
            motion_capacity: 0,
            ..StressConfig::default()
        };
        assert!(replay_trace(&[], &config).is_err());
    }
}
