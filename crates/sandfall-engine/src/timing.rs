//! Frame timing and performance tracking.
//!
//! Measures clamped frame deltas for the step scheduler and keeps the
//! averages shown in the window title.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Longest frame delta handed to the scheduler.
pub const MAX_FRAME_DELTA: Duration = Duration::from_millis(250);

/// Frame timing manager.
#[derive(Debug)]
pub struct FrameTiming {
    /// Time of last frame start
    last_frame: Instant,
    /// Maximum delta time, so a stall does not flood the scheduler
    max_dt: Duration,
    /// Recent frame times for averaging
    frame_times: VecDeque<Duration>,
    /// Maximum samples for averaging
    max_samples: usize,
}

impl Default for FrameTiming {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameTiming {
    /// Create a new frame timing manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_frame: Instant::now(),
            max_dt: MAX_FRAME_DELTA,
            frame_times: VecDeque::with_capacity(120),
            max_samples: 120,
        }
    }

    /// Calculate delta time since last frame.
    /// Also stores the frame time for averaging.
    pub fn delta_time(&mut self) -> Duration {
        let now = Instant::now();
        let dt = now - self.last_frame;
        self.last_frame = now;
        self.record(dt)
    }

    fn record(&mut self, dt: Duration) -> Duration {
        let clamped = dt.min(self.max_dt);
        self.frame_times.push_back(clamped);
        if self.frame_times.len() > self.max_samples {
            self.frame_times.pop_front();
        }
        clamped
    }

    /// Get the average frame time in milliseconds.
    #[must_use]
    pub fn average_frame_time_ms(&self) -> f32 {
        if self.frame_times.is_empty() {
            return 0.0;
        }
        let total: Duration = self.frame_times.iter().sum();
        total.as_secs_f32() * 1000.0 / self.frame_times.len() as f32
    }

    /// Reset timing (call after a pause or reset).
    pub fn reset(&mut self) {
        self.last_frame = Instant::now();
        self.frame_times.clear();
    }
}

/// FPS counter for the window title.
#[derive(Debug)]
pub struct FpsCounter {
    /// Frame count since last update
    frame_count: u32,
    /// Time of last FPS calculation
    last_update: Instant,
    /// Update interval
    update_interval: Duration,
    /// Current FPS value
    current_fps: f32,
    /// Current frame time in ms
    current_frame_time: f32,
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl FpsCounter {
    /// Create a new FPS counter, refreshed twice a second.
    #[must_use]
    pub fn new() -> Self {
        Self {
            frame_count: 0,
            last_update: Instant::now(),
            update_interval: Duration::from_millis(500),
            current_fps: 0.0,
            current_frame_time: 0.0,
        }
    }

    /// Tick the counter. Returns true when the averages were refreshed.
    pub fn tick(&mut self) -> bool {
        let elapsed = self.last_update.elapsed();
        let refreshed = self.count_frame(elapsed);
        if refreshed {
            self.last_update = Instant::now();
        }
        refreshed
    }

    fn count_frame(&mut self, elapsed: Duration) -> bool {
        self.frame_count += 1;
        if elapsed < self.update_interval {
            return false;
        }
        let secs = elapsed.as_secs_f32();
        self.current_fps = self.frame_count as f32 / secs;
        self.current_frame_time = (secs / self.frame_count as f32) * 1000.0;
        self.frame_count = 0;
        true
    }

    /// Get current FPS.
    #[must_use]
    pub fn fps(&self) -> f32 {
        self.current_fps
    }

    /// Get current frame time in milliseconds.
    #[must_use]
    pub fn frame_time_ms(&self) -> f32 {
        self.current_frame_time
    }

    /// Window title text for the current averages.
    #[must_use]
    pub fn title(&self) -> String {
        format!(
            "Frame Time: {:.2} ms, FPS: {:.0}",
            self.frame_time_ms(),
            self.fps()
        )
    }
}
