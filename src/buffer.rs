//! Rolling sample buffers
//!
//! Pushing never fails: once full, the oldest entry is evicted. Memory stays
//! bounded and recent data wins.

use std::collections::VecDeque;

use crate::config::StressConfig;
use crate::types::TouchSample;

/// Fixed-capacity FIFO that evicts its oldest entry on overflow
#[derive(Debug, Clone)]
pub struct RollingBuffer<T> {
    values: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> RollingBuffer<T> {
    /// Create a buffer holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a value, evicting the oldest one when full
    pub fn push(&mut self, value: T) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    /// Copy of the current contents, oldest first
    pub fn snapshot(&self) -> Vec<T> {
        self.values.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Motion magnitudes and touch samples collected by one session
#[derive(Debug, Clone)]
pub struct SignalBuffer {
    motion: RollingBuffer<f64>,
    touch: RollingBuffer<TouchSample>,
}

impl Default for SignalBuffer {
    fn default() -> Self {
        Self::from_config(&StressConfig::default())
    }
}

impl SignalBuffer {
    pub fn new(motion_capacity: usize, touch_capacity: usize) -> Self {
        Self {
            motion: RollingBuffer::new(motion_capacity),
            touch: RollingBuffer::new(touch_capacity),
        }
    }

    pub fn from_config(config: &StressConfig) -> Self {
        Self::new(config.motion_capacity, config.touch_capacity)
    }

    pub fn push_motion(&mut self, magnitude: f64) {
        self.motion.push(magnitude);
    }

    pub fn push_touch(&mut self, sample: TouchSample) {
        self.touch.push(sample);
    }

    pub fn motion_snapshot(&self) -> Vec<f64> {
        self.motion.snapshot()
    }

    pub fn touch_snapshot(&self) -> Vec<TouchSample> {
        self.touch.snapshot()
    }

    /// Touches stamped within `window_ms` before `now_ms`
    pub fn touches_within(&self, now_ms: u64, window_ms: u64) -> usize {
        self.touch
            .iter()
            .filter(|t| now_ms.saturating_sub(t.timestamp_ms) < window_ms)
            .count()
    }

    pub fn motion_len(&self) -> usize {
        self.motion.len()
    }

    pub fn touch_len(&self) -> usize {
        self.touch.len()
    }

    pub fn clear_touch(&mut self) {
        self.touch.clear();
    }

    pub fn clear(&mut self) {
        self.motion.clear();
        self.touch.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rolling_buffer_evicts_oldest() {
        let mut buffer = RollingBuffer::new(3);
        for v in 1..=5 {
            buffer.push(v);
        }
        assert_eq!(buffer.snapshot(), vec![3, 4, 5]);
    }

    #[test]
    fn test_rolling_buffer_zero_capacity_clamped() {
        let mut buffer = RollingBuffer::new(0);
        buffer.push(1);
        buffer.push(2);
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.snapshot(), vec![2]);
    }

    #[test]
    fn test_signal_buffer_never_exceeds_capacity() {
        let mut buffer = SignalBuffer::default();

        for i in 0..500 {
            buffer.push_motion(i as f64);
            buffer.push_touch(TouchSample {
                x: i as f64,
                y: 0.0,
                timestamp_ms: i,
            });
            assert!(buffer.motion_len() <= 120);
            assert!(buffer.touch_len() <= 20);
        }

        let motion = buffer.motion_snapshot();
        assert_eq!(motion.len(), 120);
        assert_eq!(motion[0], 380.0);
        assert_eq!(motion[119], 499.0);

        let touch = buffer.touch_snapshot();
        assert_eq!(touch.len(), 20);
        assert_eq!(touch[0].timestamp_ms, 480);
    }

    #[test]
    fn test_touches_within_window() {
        let mut buffer = SignalBuffer::default();
        for t in [0, 400, 900, 1200, 1500] {
            buffer.push_touch(TouchSample {
                x: 0.0,
                y: 0.0,
                timestamp_ms: t,
            });
        }
        // 900, 1200, 1500 are inside (1500 - 1000, 1500]
        assert_eq!(buffer.touches_within(1500, 1000), 3);
    }

    #[test]
    fn test_clear() {
        let mut buffer = SignalBuffer::default();
        buffer.push_motion(9.8);
        buffer.push_touch(TouchSample {
            x: 1.0,
            y: 1.0,
            timestamp_ms: 1,
        });
        buffer.clear();
        assert_eq!(buffer.motion_len(), 0);
        assert_eq!(buffer.touch_len(), 0);
    }
}
