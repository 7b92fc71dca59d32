//! Stress monitoring session
//!
//! Owns the buffers, counters, classifier and PIN tracker for one monitoring
//! period. The host drives it from its event loop:
//!
//! ```ignore
//! let mut session = StressSession::new(StressConfig::default(), Arc::new(SystemClock))
//!     .with_motion_source(Box::new(motion))
//!     .with_touch_source(Box::new(touch));
//! session.start();
//! loop {
//!     session.poll();
//!     if session.consume_shake() {
//!         // open the security check
//!     }
//! }
//! ```
//!
//! Nothing here returns an error: malformed samples are dropped, a refused
//! subscription degrades the channel, and double start/stop are no-ops.
//!
//! A session lives on the thread that polls it and is not `Send`. Only the
//! [`Clock`] is shared across threads, which is why it requires `Send + Sync`.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::buffer::SignalBuffer;
use crate::classifier::ShakeClassifier;
use crate::clock::{iso_timestamp, Clock, Ticker};
use crate::config::StressConfig;
use crate::features::{overall_score, FeatureExtractor};
use crate::pin::{PinAnomalyTracker, PinOutcome};
use crate::source::EventSource;
use crate::types::{
    AccelerationReading, ChannelStatus, PinEventType, SensorStatus, SessionState, ShakeTrigger,
    StressMetrics, TouchEvent,
};

pub type MotionSource = Box<dyn EventSource<AccelerationReading>>;
pub type TouchSource = Box<dyn EventSource<TouchEvent>>;

/// Result of one [`StressSession::poll`]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PollOutcome {
    pub motion_events: usize,
    pub touch_events: usize,
    /// A scoring tick ran during this poll
    pub ticked: bool,
    /// The tick declared a shake
    pub trigger: Option<ShakeTrigger>,
}

pub struct StressSession {
    config: StressConfig,
    clock: Arc<dyn Clock>,
    state: SessionState,
    motion_source: Option<MotionSource>,
    touch_source: Option<TouchSource>,
    sensors: SensorStatus,
    buffers: SignalBuffer,
    extractor: FeatureExtractor,
    classifier: ShakeClassifier,
    pin_tracker: PinAnomalyTracker,
    ticker: Ticker,
    /// Cumulative spikes since start; never decremented
    rapid_movements: u32,
    started_at_ms: u64,
    metrics: StressMetrics,
    shake_detected: bool,
    last_trigger: Option<ShakeTrigger>,
    dropped_samples: u64,
}

impl StressSession {
    pub fn new(config: StressConfig, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_ms();
        Self {
            buffers: SignalBuffer::from_config(&config),
            extractor: FeatureExtractor::from_config(&config),
            classifier: ShakeClassifier::from_config(&config),
            pin_tracker: PinAnomalyTracker::from_config(&config),
            ticker: Ticker::new(config.tick_interval_ms),
            config,
            clock,
            state: SessionState::Idle,
            motion_source: None,
            touch_source: None,
            sensors: SensorStatus::detached(),
            rapid_movements: 0,
            started_at_ms: now,
            metrics: StressMetrics::empty(iso_timestamp(now)),
            shake_detected: false,
            last_trigger: None,
            dropped_samples: 0,
        }
    }

    pub fn with_motion_source(mut self, source: MotionSource) -> Self {
        self.motion_source = Some(source);
        self
    }

    pub fn with_touch_source(mut self, source: TouchSource) -> Self {
        self.touch_source = Some(source);
        self
    }

    /// Begin monitoring. No-op while already monitoring.
    pub fn start(&mut self) {
        if self.state == SessionState::Monitoring {
            debug!("start ignored: session already monitoring");
            return;
        }

        let now = self.clock.now_ms();
        self.reset(now);

        self.sensors.motion = match self.motion_source.as_mut() {
            Some(source) => match source.subscribe() {
                Ok(()) => ChannelStatus::Active,
                Err(e) => {
                    warn!("motion channel degraded, continuing with touch and PIN only: {}", e);
                    ChannelStatus::Unavailable
                }
            },
            None => ChannelStatus::Detached,
        };
        self.sensors.touch = match self.touch_source.as_mut() {
            Some(source) => match source.subscribe() {
                Ok(()) => ChannelStatus::Active,
                Err(e) => {
                    warn!("touch channel unavailable: {}", e);
                    ChannelStatus::Unavailable
                }
            },
            None => ChannelStatus::Detached,
        };

        self.ticker.arm(now);
        self.state = SessionState::Monitoring;
        info!(
            "stress monitoring started (motion: {:?}, touch: {:?})",
            self.sensors.motion, self.sensors.touch
        );
    }

    /// Stop monitoring and release sources. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(source) = self.motion_source.as_mut() {
            source.unsubscribe();
        }
        if let Some(source) = self.touch_source.as_mut() {
            source.unsubscribe();
        }
        self.ticker.disarm();
        self.shake_detected = false;
        self.buffers.clear();
        self.classifier.reset();
        self.sensors = SensorStatus::detached();

        if self.state == SessionState::Monitoring {
            self.state = SessionState::Idle;
            info!(
                "stress monitoring stopped after {:.1}s",
                self.metrics.session_duration_seconds
            );
        }
    }

    fn reset(&mut self, now: u64) {
        self.buffers.clear();
        self.classifier.reset();
        self.pin_tracker.clear();
        self.rapid_movements = 0;
        self.started_at_ms = now;
        self.metrics = StressMetrics::empty(iso_timestamp(now));
        self.shake_detected = false;
        self.last_trigger = None;
        self.dropped_samples = 0;
    }

    /// Drain subscribed sources, then run the scoring tick if it is due
    pub fn poll(&mut self) -> PollOutcome {
        let mut outcome = PollOutcome::default();
        if self.state != SessionState::Monitoring {
            return outcome;
        }

        let motion = self
            .motion_source
            .as_mut()
            .map(|s| s.drain())
            .unwrap_or_default();
        outcome.motion_events = motion.len();
        for reading in &motion {
            self.ingest_motion(reading);
        }

        let touches = self
            .touch_source
            .as_mut()
            .map(|s| s.drain())
            .unwrap_or_default();
        outcome.touch_events = touches.len();
        for event in &touches {
            self.ingest_touch(event);
        }

        let now = self.clock.now_ms();
        if self.ticker.fire_if_due(now) {
            outcome.ticked = true;
            outcome.trigger = self.tick(now);
        }
        outcome
    }

    /// Feed one motion reading. Ignored while idle; malformed readings are dropped.
    pub fn ingest_motion(&mut self, reading: &AccelerationReading) {
        if self.state != SessionState::Monitoring {
            return;
        }
        let magnitude = match reading.magnitude() {
            Ok(m) => m,
            Err(e) => {
                self.dropped_samples += 1;
                debug!("dropping motion sample: {}", e);
                return;
            }
        };

        self.buffers.push_motion(magnitude);
        if self.extractor.is_rapid_movement_spike(magnitude) {
            self.rapid_movements = self.rapid_movements.saturating_add(1);
            let at = reading.timestamp_ms.unwrap_or_else(|| self.clock.now_ms());
            self.classifier.record_spike(at);
        }
    }

    /// Feed one touch event. Ignored while idle; malformed events are dropped.
    pub fn ingest_touch(&mut self, event: &TouchEvent) {
        if self.state != SessionState::Monitoring {
            return;
        }
        match event.to_sample(self.clock.now_ms()) {
            Ok(sample) => self.buffers.push_touch(sample),
            Err(e) => {
                self.dropped_samples += 1;
                debug!("dropping touch sample: {}", e);
            }
        }
    }

    fn tick(&mut self, now: u64) -> Option<ShakeTrigger> {
        let motion = self.buffers.motion_snapshot();
        let touches = self.buffers.touch_snapshot();

        let tremor_intensity = self.extractor.tremor_intensity(&motion);
        let tap_patterns = self.extractor.tap_pattern_stats(&touches);
        let session_duration_seconds = now.saturating_sub(self.started_at_ms) as f64 / 1000.0;
        let confidence = self.extractor.confidence(motion.len(), touches.len());

        self.metrics = StressMetrics {
            tremor_intensity,
            rapid_movements: self.rapid_movements,
            tap_patterns,
            session_duration_seconds,
            overall_score: overall_score(
                tremor_intensity,
                self.rapid_movements,
                tap_patterns.repeated_taps,
                session_duration_seconds,
            ),
            timestamp: iso_timestamp(now),
            confidence,
        };

        let trigger = self.classifier.evaluate(
            now,
            tremor_intensity,
            self.rapid_movements,
            &mut self.buffers,
        )?;
        info!("shake detected by {} rule", trigger.rule_name());
        self.declare(trigger);
        Some(trigger)
    }

    fn declare(&mut self, trigger: ShakeTrigger) {
        self.shake_detected = true;
        self.last_trigger = Some(trigger);
    }

    /// Forward a PIN edit. Works whether or not motion monitoring is active.
    pub fn report_pin_event(&mut self, event_type: PinEventType, current_length: u32) -> PinOutcome {
        let now = self.clock.now_ms();
        let outcome = self.pin_tracker.report_event(event_type, current_length, now);
        if let PinOutcome::Anomaly { aborted_attempts } = outcome {
            info!("PIN anomaly: {} aborted entries", aborted_attempts);
            self.declare(ShakeTrigger::PinAnomaly { aborted_attempts });
        }
        outcome
    }

    /// Latest snapshot (refreshed on each tick)
    pub fn metrics(&self) -> &StressMetrics {
        &self.metrics
    }

    pub fn is_shake_detected(&self) -> bool {
        self.shake_detected
    }

    /// Acknowledge a detected shake, returning whether one was pending
    pub fn consume_shake(&mut self) -> bool {
        std::mem::take(&mut self.shake_detected)
    }

    pub fn last_trigger(&self) -> Option<ShakeTrigger> {
        self.last_trigger
    }

    pub fn is_monitoring(&self) -> bool {
        self.state == SessionState::Monitoring
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn sensor_status(&self) -> SensorStatus {
        self.sensors
    }

    /// True while a scoring tick is scheduled
    pub fn has_pending_tick(&self) -> bool {
        self.ticker.is_armed()
    }

    pub fn next_tick_at(&self) -> Option<u64> {
        self.ticker.next_due_ms()
    }

    pub fn motion_sample_count(&self) -> usize {
        self.buffers.motion_len()
    }

    pub fn touch_sample_count(&self) -> usize {
        self.buffers.touch_len()
    }

    pub fn dropped_samples(&self) -> u64 {
        self.dropped_samples
    }

    pub fn config(&self) -> &StressConfig {
        &self.config
    }
}

impl Drop for StressSession {
    fn drop(&mut self) {
        self.stop();
    }
}
