//! High-resolution timing for the frame loop.

use std::time::{Duration, Instant};

/// High-resolution timer for measuring elapsed time.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
}

impl Timer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
        }
    }

    /// Get the total elapsed time since the timer was created or reset.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get the elapsed time in milliseconds since the timer was created or reset.
    pub fn elapsed_millis(&self) -> f32 {
        self.elapsed().as_secs_f32() * 1000.0
    }

    /// Get the time elapsed since the last call to `tick()`.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        delta
    }

    /// Get the delta time in seconds since the last tick.
    pub fn delta_secs(&mut self) -> f32 {
        self.tick().as_secs_f32()
    }

    /// Reset the timer to the current time.
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.start = now;
        self.last_tick = now;
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// Rolling frame-time statistics.
///
/// Accumulates frame durations and reports an average once `window` frames
/// have been recorded.
#[derive(Debug, Clone)]
pub struct FrameStats {
    window: u32,
    frames: u32,
    accumulated_ms: f32,
    last_frame_ms: f32,
}

impl FrameStats {
    /// Creates statistics that report every `window` frames.
    pub fn new(window: u32) -> Self {
        Self {
            window: window.max(1),
            frames: 0,
            accumulated_ms: 0.0,
            last_frame_ms: 0.0,
        }
    }

    /// Records one frame. Returns the average frame time in milliseconds
    /// when a full window has been collected.
    pub fn record(&mut self, frame_ms: f32) -> Option<f32> {
        self.last_frame_ms = frame_ms;
        self.accumulated_ms += frame_ms;
        self.frames += 1;

        if self.frames < self.window {
            return None;
        }

        let average = self.accumulated_ms / self.frames as f32;
        self.frames = 0;
        self.accumulated_ms = 0.0;
        Some(average)
    }

    /// Frame time of the most recently recorded frame in milliseconds.
    pub fn last_frame_ms(&self) -> f32 {
        self.last_frame_ms
    }

    /// Frames per second derived from a frame time in milliseconds.
    pub fn fps(frame_ms: f32) -> f32 {
        if frame_ms <= 0.0 {
            0.0
        } else {
            1000.0 / frame_ms
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_tick_is_monotonic() {
        let mut timer = Timer::new();
        std::thread::sleep(Duration::from_millis(2));
        let delta = timer.tick();
        assert!(delta >= Duration::from_millis(2));
        assert!(timer.elapsed() >= delta);
    }

    #[test]
    fn test_frame_stats_reports_average() {
        let mut stats = FrameStats::new(4);
        assert_eq!(stats.record(10.0), None);
        assert_eq!(stats.record(20.0), None);
        assert_eq!(stats.record(10.0), None);
        assert_eq!(stats.record(20.0), Some(15.0));
        assert_eq!(stats.last_frame_ms(), 20.0);
        // Window restarts after reporting
        assert_eq!(stats.record(5.0), None);
    }

    #[test]
    fn test_frame_stats_fps() {
        assert_eq!(FrameStats::fps(10.0), 100.0);
        assert_eq!(FrameStats::fps(0.0), 0.0);
    }
}
