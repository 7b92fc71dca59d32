//! Time sources and the scoring ticker
//!
//! Everything in the engine measures time in integer milliseconds taken from
//! a [`Clock`]. Tests and trace replay drive a [`ManualClock`]; hosts use
//! [`SystemClock`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{SecondsFormat, TimeZone, Utc};

/// Millisecond time source, shareable with producer threads
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall-clock time since the Unix epoch
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Explicitly advanced clock; clones share the same time
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: u64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Format a millisecond timestamp as ISO-8601 UTC (`2024-01-15T14:00:00.000Z`)
pub fn iso_timestamp(ms: u64) -> String {
    match Utc.timestamp_millis_opt(ms as i64).single() {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}

/// Repeating deadline bound to a session's monitoring period.
///
/// Disarmed tickers never fire. Missed periods are skipped, not replayed.
#[derive(Debug, Clone)]
pub struct Ticker {
    interval_ms: u64,
    next_due_ms: Option<u64>,
}

impl Ticker {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms: interval_ms.max(1),
            next_due_ms: None,
        }
    }

    /// Schedule the first tick one interval after `now_ms`
    pub fn arm(&mut self, now_ms: u64) {
        self.next_due_ms = Some(now_ms + self.interval_ms);
    }

    pub fn disarm(&mut self) {
        self.next_due_ms = None;
    }

    pub fn is_armed(&self) -> bool {
        self.next_due_ms.is_some()
    }

    pub fn next_due_ms(&self) -> Option<u64> {
        self.next_due_ms
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Returns true at most once per call when a tick is due, and
    /// reschedules to the first period boundary after `now_ms`.
    pub fn fire_if_due(&mut self, now_ms: u64) -> bool {
        let Some(due) = self.next_due_ms else {
            return false;
        };
        if now_ms < due {
            return false;
        }

        let missed = (now_ms - due) / self.interval_ms;
        self.next_due_ms = Some(due + (missed + 1) * self.interval_ms);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new(100);
        let other = clock.clone();
        clock.advance(50);
        assert_eq!(other.now_ms(), 150);
        other.set(10);
        assert_eq!(clock.now_ms(), 10);
    }

    #[test]
    fn test_iso_timestamp() {
        assert_eq!(iso_timestamp(0), "1970-01-01T00:00:00.000Z");
        assert_eq!(iso_timestamp(1_705_327_200_500), "2024-01-15T14:00:00.500Z");
    }

    #[test]
    fn test_ticker_fires_on_interval() {
        let mut ticker = Ticker::new(500);
        ticker.arm(1_000);

        assert!(!ticker.fire_if_due(1_499));
        assert!(ticker.fire_if_due(1_500));
        assert!(!ticker.fire_if_due(1_500));
        assert_eq!(ticker.next_due_ms(), Some(2_000));
    }

    #[test]
    fn test_ticker_skips_missed_periods() {
        let mut ticker = Ticker::new(500);
        ticker.arm(0);

        assert!(ticker.fire_if_due(2_250));
        assert_eq!(ticker.next_due_ms(), Some(2_500));
        assert!(!ticker.fire_if_due(2_400));
    }

    #[test]
    fn test_disarmed_ticker_never_fires() {
        let mut ticker = Ticker::new(500);
        assert!(!ticker.fire_if_due(u64::MAX / 2));

        ticker.arm(0);
        ticker.disarm();
        assert!(!ticker.is_armed());
        assert!(!ticker.fire_if_due(10_000));
    }
}
