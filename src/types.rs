//! Core data types for the stress detection engine
//!
//! Raw payloads arrive from the host with optional fields; the session turns
//! them into samples, drops the malformed ones, and publishes [`StressMetrics`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StressError;

/// A raw acceleration-including-gravity reading from the motion source
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccelerationReading {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    /// Sensor time; the session clock is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
}

impl AccelerationReading {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            z: Some(z),
            timestamp_ms: None,
        }
    }

    pub fn at(x: f64, y: f64, z: f64, timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms: Some(timestamp_ms),
            ..Self::new(x, y, z)
        }
    }

    /// Euclidean magnitude of the three axes.
    ///
    /// Fails when any axis is missing or non-finite; callers drop the sample.
    pub fn magnitude(&self) -> Result<f64, StressError> {
        match (self.x, self.y, self.z) {
            (Some(x), Some(y), Some(z)) if x.is_finite() && y.is_finite() && z.is_finite() => {
                Ok((x * x + y * y + z * z).sqrt())
            }
            _ => Err(StressError::InvalidEventPayload(format!(
                "acceleration reading has missing or non-finite axes: {:?}",
                self
            ))),
        }
    }
}

/// A raw touch event from the touch source
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TouchEvent {
    pub x: Option<f64>,
    pub y: Option<f64>,
    /// Event time; the session clock is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
}

impl TouchEvent {
    pub fn at(x: f64, y: f64, timestamp_ms: u64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            timestamp_ms: Some(timestamp_ms),
        }
    }

    /// Convert to a buffered sample, stamping it with `now_ms` if the event carries no time
    pub fn to_sample(&self, now_ms: u64) -> Result<TouchSample, StressError> {
        match (self.x, self.y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Ok(TouchSample {
                x,
                y,
                timestamp_ms: self.timestamp_ms.unwrap_or(now_ms),
            }),
            _ => Err(StressError::InvalidEventPayload(format!(
                "touch event has missing or non-finite coordinates: {:?}",
                self
            ))),
        }
    }
}

/// A validated touch point held in the touch buffer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TouchSample {
    pub x: f64,
    pub y: f64,
    pub timestamp_ms: u64,
}

/// Consecutive-tap statistics over the touch buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TapPatterns {
    /// Consecutive pairs closer than the repeat distance and interval
    pub repeated_taps: u32,
    /// Mean interval over all consecutive pairs
    pub average_interval_ms: f64,
}

/// Externally visible snapshot, refreshed on every scoring tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressMetrics {
    /// 0-100
    pub tremor_intensity: f64,
    /// Cumulative spikes since monitoring began
    pub rapid_movements: u32,
    pub tap_patterns: TapPatterns,
    pub session_duration_seconds: f64,
    /// 0-100 weighted composite
    pub overall_score: f64,
    /// ISO-8601 UTC
    pub timestamp: String,
    /// 0-100, grows with collected samples
    pub confidence: f64,
}

impl StressMetrics {
    /// All-zero snapshot stamped with `timestamp`
    pub fn empty(timestamp: String) -> Self {
        Self {
            tremor_intensity: 0.0,
            rapid_movements: 0,
            tap_patterns: TapPatterns::default(),
            session_duration_seconds: 0.0,
            overall_score: 0.0,
            timestamp,
            confidence: 0.0,
        }
    }
}

/// PIN field edit kinds reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinEventType {
    Change,
    Delete,
    Submit,
}

impl PinEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PinEventType::Change => "change",
            PinEventType::Delete => "delete",
            PinEventType::Submit => "submit",
        }
    }
}

impl fmt::Display for PinEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PinEventType {
    type Err = StressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "change" => Ok(PinEventType::Change),
            "delete" => Ok(PinEventType::Delete),
            "submit" => Ok(PinEventType::Submit),
            other => Err(StressError::UnknownPinEventType(other.to_string())),
        }
    }
}

/// A PIN edit retained in the tracker's rolling window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinEditEvent {
    pub event_type: PinEventType,
    pub current_length: u32,
    pub timestamp_ms: u64,
}

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Monitoring,
}

/// Whether an input channel is feeding the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    /// Subscribed and accepting events
    Active,
    /// A source was supplied but refused the subscription
    Unavailable,
    /// No source supplied or the session is idle
    Detached,
}

/// Per-channel availability, surfaced to the host instead of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorStatus {
    pub motion: ChannelStatus,
    pub touch: ChannelStatus,
}

impl SensorStatus {
    pub fn detached() -> Self {
        Self {
            motion: ChannelStatus::Detached,
            touch: ChannelStatus::Detached,
        }
    }

    /// True when motion-derived features cannot be computed
    pub fn motion_degraded(&self) -> bool {
        self.motion != ChannelStatus::Active
    }
}

/// Capability probe results supplied by the host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorCapabilities {
    pub sensor_api_available: bool,
    pub permission_required: bool,
    pub secure_context: bool,
}

/// Which rule declared a shake
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ShakeTrigger {
    /// Enough spikes inside the trailing burst window
    SpikeBurst { spikes: usize },
    /// Sustained tremor combined with cumulative spikes
    TremorWithMovement { tremor_intensity: f64, rapid_movements: u32 },
    /// Enough touches inside the trailing burst window
    TapBurst { taps: usize },
    /// Repeated aborted PIN entries
    PinAnomaly { aborted_attempts: usize },
}

impl ShakeTrigger {
    pub fn rule_name(&self) -> &'static str {
        match self {
            ShakeTrigger::SpikeBurst { .. } => "spike_burst",
            ShakeTrigger::TremorWithMovement { .. } => "tremor_with_movement",
            ShakeTrigger::TapBurst { .. } => "tap_burst",
            ShakeTrigger::PinAnomaly { .. } => "pin_anomaly",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_magnitude() {
        let reading = AccelerationReading::new(3.0, 4.0, 12.0);
        assert!((reading.magnitude().unwrap() - 13.0).abs() < 1e-9);
    }

    #[test]
    fn test_magnitude_missing_axis() {
        let reading = AccelerationReading {
            x: Some(1.0),
            y: None,
            z: Some(9.8),
            timestamp_ms: None,
        };
        assert!(matches!(
            reading.magnitude(),
            Err(StressError::InvalidEventPayload(_))
        ));
    }

    #[test]
    fn test_reading_timestamp_optional_in_json() {
        let untimed: AccelerationReading =
            serde_json::from_str(r#"{"x":0.0,"y":0.0,"z":9.8}"#).unwrap();
        assert_eq!(untimed.timestamp_ms, None);

        let timed: AccelerationReading =
            serde_json::from_str(r#"{"x":0.0,"y":0.0,"z":9.8,"timestamp_ms":42}"#).unwrap();
        assert_eq!(timed, AccelerationReading::at(0.0, 0.0, 9.8, 42));
    }

    #[test]
    fn test_magnitude_nan_axis() {
        let reading = AccelerationReading::new(f64::NAN, 0.0, 9.8);
        assert!(reading.magnitude().is_err());
    }

    #[test]
    fn test_touch_uses_clock_when_untimed() {
        let event = TouchEvent {
            x: Some(10.0),
            y: Some(20.0),
            timestamp_ms: None,
        };
        let sample = event.to_sample(1234).unwrap();
        assert_eq!(sample.timestamp_ms, 1234);
    }

    #[test]
    fn test_touch_missing_coordinate() {
        let event = TouchEvent {
            x: None,
            y: Some(20.0),
            timestamp_ms: Some(5),
        };
        assert!(event.to_sample(0).is_err());
    }

    #[test]
    fn test_pin_event_type_parse() {
        assert_eq!("change".parse::<PinEventType>().unwrap(), PinEventType::Change);
        assert_eq!(" DELETE ".parse::<PinEventType>().unwrap(), PinEventType::Delete);
        assert_eq!("submit".parse::<PinEventType>().unwrap(), PinEventType::Submit);
        assert!(matches!(
            "paste".parse::<PinEventType>(),
            Err(StressError::UnknownPinEventType(_))
        ));
    }

    #[test]
    fn test_trigger_serializes_with_rule_tag() {
        let json = serde_json::to_value(ShakeTrigger::TapBurst { taps: 4 }).unwrap();
        assert_eq!(json["rule"], "tap_burst");
        assert_eq!(json["taps"], 4);
    }

    #[test]
    fn test_metrics_json_shape() {
        let metrics = StressMetrics::empty("2024-01-15T14:00:00.000Z".to_string());
        let json = serde_json::to_value(&metrics).unwrap();

        assert_eq!(json["tap_patterns"]["repeated_taps"], 0);
        assert_eq!(json["timestamp"], "2024-01-15T14:00:00.000Z");
        assert!(json["overall_score"].is_number());
    }
}
