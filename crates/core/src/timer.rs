//! Frame clock feeding elapsed and delta time into frame packets.

use std::time::{Duration, Instant};

/// Time sample taken once per produced frame, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameTime {
    /// Seconds since the clock started.
    pub t: f32,
    /// Seconds since the previous sample.
    pub dt: f32,
}

/// Monotonic clock for the producer side of the frame loop.
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

    /// Total elapsed time since the timer was created or last reset.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Advance the clock and return both elapsed and delta time.
    ///
    /// The first sample after creation or [`Timer::reset`] measures from that point.
    pub fn tick(&mut self) -> FrameTime {
        let now = Instant::now();
        let dt = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        FrameTime {
            t: now.saturating_duration_since(self.start).as_secs_f32(),
            dt: dt.as_secs_f32(),
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_tick_is_monotonic() {
        let mut timer = Timer::new();
        let first = timer.tick();
        thread::sleep(Duration::from_millis(2));
        let second = timer.tick();

        assert!(second.t >= first.t);
        assert!(second.dt > 0.0);
        assert!(second.t >= second.dt);
    }

    #[test]
    fn test_reset_restarts_elapsed() {
        let mut timer = Timer::new();
        thread::sleep(Duration::from_millis(5));
        timer.reset();
        let sample = timer.tick();
        assert!(sample.t < 0.005);
    }
}
