//! Handle-based host API
//!
//! A host asks the engine for a session when a sensitive flow begins and
//! addresses it by [`SessionHandle`] afterwards. Each session owns its own
//! flag and counters; nothing is shared between handles.
//!
//! The engine is single-threaded: sessions may hold `QueueSource`s, which are
//! `Rc`-backed, so `StressEngine` is not `Send`. Keep it on the host's event
//! loop thread and feed it from other threads through `ChannelSource`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::StressConfig;
use crate::error::StressError;
use crate::pin::PinOutcome;
use crate::session::{MotionSource, PollOutcome, StressSession, TouchSource};
use crate::types::{
    AccelerationReading, PinEventType, SensorCapabilities, SensorStatus, StressMetrics, TouchEvent,
};

/// Opaque session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionHandle(Uuid);

impl SessionHandle {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionHandle {
    type Err = StressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(SessionHandle)
            .map_err(|_| StressError::UnknownSession(s.to_string()))
    }
}

/// Event sources to attach to a new session; either may be absent
#[derive(Default)]
pub struct SessionSources {
    pub motion: Option<MotionSource>,
    pub touch: Option<TouchSource>,
}

impl SessionSources {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_motion(mut self, source: MotionSource) -> Self {
        self.motion = Some(source);
        self
    }

    pub fn with_touch(mut self, source: TouchSource) -> Self {
        self.touch = Some(source);
        self
    }
}

pub struct StressEngine {
    config: StressConfig,
    clock: Arc<dyn Clock>,
    sessions: HashMap<SessionHandle, StressSession>,
}

impl Default for StressEngine {
    fn default() -> Self {
        Self::new(StressConfig::default(), Arc::new(SystemClock))
    }
}

impl StressEngine {
    pub fn new(config: StressConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            sessions: HashMap::new(),
        }
    }

    /// Create a session, attach `sources` and start monitoring
    pub fn start_session(&mut self, sources: SessionSources) -> SessionHandle {
        let mut session = StressSession::new(self.config.clone(), Arc::clone(&self.clock));
        if let Some(motion) = sources.motion {
            session = session.with_motion_source(motion);
        }
        if let Some(touch) = sources.touch {
            session = session.with_touch_source(touch);
        }
        session.start();

        let handle = SessionHandle::generate();
        debug!("session {} started", handle);
        self.sessions.insert(handle, session);
        handle
    }

    /// Stop monitoring. The session stays queryable until [`release`](Self::release).
    pub fn stop_session(&mut self, handle: SessionHandle) -> Result<(), StressError> {
        self.session_mut(handle)?.stop();
        Ok(())
    }

    /// Stop and forget a session
    pub fn release(&mut self, handle: SessionHandle) -> Result<(), StressError> {
        let mut session = self
            .sessions
            .remove(&handle)
            .ok_or_else(|| StressError::UnknownSession(handle.to_string()))?;
        session.stop();
        debug!("session {} released", handle);
        Ok(())
    }

    pub fn get_metrics(&self, handle: SessionHandle) -> Result<StressMetrics, StressError> {
        Ok(self.session(handle)?.metrics().clone())
    }

    pub fn is_shake_detected(&self, handle: SessionHandle) -> Result<bool, StressError> {
        Ok(self.session(handle)?.is_shake_detected())
    }

    /// Read and clear the shake flag
    pub fn consume_shake(&mut self, handle: SessionHandle) -> Result<bool, StressError> {
        Ok(self.session_mut(handle)?.consume_shake())
    }

    pub fn report_pin_event(
        &mut self,
        handle: SessionHandle,
        event_type: PinEventType,
        current_length: u32,
    ) -> Result<PinOutcome, StressError> {
        Ok(self
            .session_mut(handle)?
            .report_pin_event(event_type, current_length))
    }

    pub fn is_monitoring(&self, handle: SessionHandle) -> Result<bool, StressError> {
        Ok(self.session(handle)?.is_monitoring())
    }

    pub fn sensor_status(&self, handle: SessionHandle) -> Result<SensorStatus, StressError> {
        Ok(self.session(handle)?.sensor_status())
    }

    /// Push a motion reading straight into a session
    pub fn push_motion(
        &mut self,
        handle: SessionHandle,
        reading: &AccelerationReading,
    ) -> Result<(), StressError> {
        self.session_mut(handle)?.ingest_motion(reading);
        Ok(())
    }

    /// Push a touch event straight into a session
    pub fn push_touch(&mut self, handle: SessionHandle, event: &TouchEvent) -> Result<(), StressError> {
        self.session_mut(handle)?.ingest_touch(event);
        Ok(())
    }

    pub fn poll(&mut self, handle: SessionHandle) -> Result<PollOutcome, StressError> {
        Ok(self.session_mut(handle)?.poll())
    }

    /// Poll every session; returns how many ticked
    pub fn poll_all(&mut self) -> usize {
        self.sessions
            .values_mut()
            .map(|s| s.poll())
            .filter(|o| o.ticked)
            .count()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn config(&self) -> &StressConfig {
        &self.config
    }

    fn session(&self, handle: SessionHandle) -> Result<&StressSession, StressError> {
        self.sessions
            .get(&handle)
            .ok_or_else(|| StressError::UnknownSession(handle.to_string()))
    }

    fn session_mut(&mut self, handle: SessionHandle) -> Result<&mut StressSession, StressError> {
        self.sessions
            .get_mut(&handle)
            .ok_or_else(|| StressError::UnknownSession(handle.to_string()))
    }
}

/// Host-side decision on whether to monitor a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationDecision {
    /// Start a session for this flow
    pub monitor: bool,
    /// Attach the motion source
    pub motion_enabled: bool,
    /// The host must obtain sensor permission before attaching motion
    pub needs_permission: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationPolicy {
    pub min_transfer_amount: u64,
}

impl Default for ActivationPolicy {
    fn default() -> Self {
        Self::from_config(&StressConfig::default())
    }
}

impl ActivationPolicy {
    pub fn from_config(config: &StressConfig) -> Self {
        Self {
            min_transfer_amount: config.activation_amount,
        }
    }

    pub fn evaluate(&self, amount: u64, capabilities: &SensorCapabilities) -> ActivationDecision {
        let monitor = amount >= self.min_transfer_amount;
        let motion_enabled =
            monitor && capabilities.sensor_api_available && capabilities.secure_context;
        ActivationDecision {
            monitor,
            motion_enabled,
            needs_permission: motion_enabled && capabilities.permission_required,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::source::QueueSource;
    use crate::types::ChannelStatus;
    use pretty_assertions::assert_eq;

    fn engine() -> (ManualClock, StressEngine) {
        let clock = ManualClock::new(0);
        let engine = StressEngine::new(StressConfig::default(), Arc::new(clock.clone()));
        (clock, engine)
    }

    #[test]
    fn test_session_lifecycle() {
        let (_clock, mut engine) = engine();
        let handle = engine.start_session(SessionSources::none());

        assert!(engine.is_monitoring(handle).unwrap());
        assert!(!engine.is_shake_detected(handle).unwrap());

        engine.stop_session(handle).unwrap();
        engine.stop_session(handle).unwrap();
        assert!(!engine.is_monitoring(handle).unwrap());
        assert_eq!(engine.session_count(), 1);

        engine.release(handle).unwrap();
        assert_eq!(engine.session_count(), 0);
        assert!(matches!(
            engine.is_monitoring(handle),
            Err(StressError::UnknownSession(_))
        ));
    }

    #[test]
    fn test_sessions_are_isolated() {
        let (clock, mut engine) = engine();
        let first = engine.start_session(SessionSources::none());
        let second = engine.start_session(SessionSources::none());
        assert_ne!(first, second);

        for offset in [0, 50, 100, 150] {
            engine
                .push_touch(first, &TouchEvent::at(5.0, 5.0, offset))
                .unwrap();
        }
        engine
            .push_motion(second, &AccelerationReading::new(0.0, 0.0, 30.0))
            .unwrap();
        clock.advance(500);
        assert_eq!(engine.poll_all(), 2);

        assert!(engine.is_shake_detected(first).unwrap());
        assert!(!engine.is_shake_detected(second).unwrap());
        assert_eq!(engine.get_metrics(first).unwrap().rapid_movements, 0);
        assert_eq!(engine.get_metrics(second).unwrap().rapid_movements, 1);
    }

    #[test]
    fn test_consume_shake() {
        let (clock, mut engine) = engine();
        let handle = engine.start_session(SessionSources::none());
        for _ in 0..3 {
            engine.report_pin_event(handle, PinEventType::Change, 1).unwrap();
            clock.advance(100);
            engine.report_pin_event(handle, PinEventType::Delete, 0).unwrap();
            clock.advance(1_000);
        }

        assert!(engine.consume_shake(handle).unwrap());
        assert!(!engine.is_shake_detected(handle).unwrap());
    }

    #[test]
    fn test_pin_reporting_after_stop() {
        let (_clock, mut engine) = engine();
        let handle = engine.start_session(SessionSources::none());
        engine.stop_session(handle).unwrap();

        let outcome = engine
            .report_pin_event(handle, PinEventType::Submit, 4)
            .unwrap();
        assert_eq!(outcome, PinOutcome::Reset);
    }

    #[test]
    fn test_sources_attached() {
        let (_clock, mut engine) = engine();
        let motion: QueueSource<AccelerationReading> = QueueSource::new();
        let handle = engine.start_session(
            SessionSources::none().with_motion(Box::new(motion.clone())),
        );

        let status = engine.sensor_status(handle).unwrap();
        assert_eq!(status.motion, ChannelStatus::Active);
        assert_eq!(status.touch, ChannelStatus::Detached);

        engine.stop_session(handle).unwrap();
        assert!(!motion.push(AccelerationReading::new(0.0, 0.0, 9.8)));
    }

    #[test]
    fn test_handle_parse() {
        let (_clock, mut engine) = engine();
        let handle = engine.start_session(SessionSources::none());
        let parsed: SessionHandle = handle.to_string().parse().unwrap();
        assert_eq!(parsed, handle);
        assert!("not-a-uuid".parse::<SessionHandle>().is_err());
    }

    #[test]
    fn test_activation_threshold() {
        let policy = ActivationPolicy::default();
        let caps = SensorCapabilities {
            sensor_api_available: true,
            permission_required: false,
            secure_context: true,
        };

        assert!(!policy.evaluate(499_999, &caps).monitor);
        assert_eq!(
            policy.evaluate(500_000, &caps),
            ActivationDecision {
                monitor: true,
                motion_enabled: true,
                needs_permission: false,
            }
        );
    }

    #[test]
    fn test_activation_without_sensors() {
        let policy = ActivationPolicy::default();

        let insecure = SensorCapabilities {
            sensor_api_available: true,
            permission_required: true,
            secure_context: false,
        };
        let decision = policy.evaluate(750_000, &insecure);
        assert!(decision.monitor);
        assert!(!decision.motion_enabled);
        assert!(!decision.needs_permission);

        let ios = SensorCapabilities {
            sensor_api_available: true,
            permission_required: true,
            secure_context: true,
        };
        assert!(policy.evaluate(750_000, &ios).needs_permission);
    }
}
