//! Quanto Stress - real-time shake and stress detection for sensitive banking flows
//!
//! A host UI starts a session while the user confirms a large transfer. The
//! session samples device motion and touches, scores them on a fixed tick and
//! raises a sticky shake flag when any trigger rule fires:
//! motion/touch sources → rolling buffers → feature extraction → scoring →
//! shake classification.
//!
//! A PIN-edit channel runs alongside and can raise the same flag on its own,
//! which covers devices without motion sensors.
//!
//! ## Modules
//!
//! - **Session**: one monitoring period ([`StressSession`])
//! - **Engine**: handle-based host API ([`StressEngine`])
//! - **Replay**: offline scoring of recorded traces

pub mod buffer;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod features;
pub mod pin;
pub mod replay;
pub mod session;
pub mod source;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StressConfig;
pub use engine::{ActivationDecision, ActivationPolicy, SessionHandle, SessionSources, StressEngine};
pub use error::StressError;
pub use pin::PinOutcome;
pub use replay::{replay_trace, ReplayReport, TraceEvent};
pub use session::{PollOutcome, StressSession};
pub use source::{ChannelSource, EventSource, QueueSource, SourceUnavailable, UnavailableSource};
pub use types::{
    AccelerationReading, PinEventType, SensorCapabilities, SensorStatus, ShakeTrigger,
    StressMetrics, TapPatterns, TouchEvent, TouchSample,
};

/// Engine version embedded in CLI reports
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for CLI reports
pub const PRODUCER_NAME: &str = "quanto-stress";
