//! Fixed-rate step scheduling, decoupled from the render frame rate.

use std::time::Duration;

use tracing::trace;

/// Default simulation rate in steps per second.
pub const DEFAULT_STEP_RATE: f64 = 120.0;

/// Default cap on carried-forward residual, in whole intervals.
pub const DEFAULT_MAX_BACKLOG: u32 = 4;

/// Longest step interval a scheduler will use.
pub const MAX_INTERVAL: Duration = Duration::from_secs(3600);

/// Accumulates frame time and decides when a simulation step is due.
///
/// [`advance`](Self::advance) fires at most one step per call and carries any
/// excess forward; [`accumulate`](Self::accumulate) drains every whole
/// interval up to a limit for strict real-time catch-up. Either way the
/// carried residual is capped at `max_backlog` intervals so a render loop
/// slower than the step rate cannot build unbounded debt.
#[derive(Debug, Clone)]
pub struct SimulationScheduler {
    /// Fixed step interval
    interval: Duration,
    /// Elapsed wall time not yet consumed by a step
    residual: Duration,
    /// Maximum carried residual, in intervals
    max_backlog: u32,
}

impl SimulationScheduler {
    /// Creates a scheduler with a fixed step interval.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.clamp(Duration::from_micros(1), MAX_INTERVAL),
            residual: Duration::ZERO,
            max_backlog: DEFAULT_MAX_BACKLOG,
        }
    }

    /// Creates a scheduler firing `steps_per_second` times per second.
    ///
    /// Rates slower than one step per [`MAX_INTERVAL`] use that interval.
    #[must_use]
    pub fn from_rate(steps_per_second: f64) -> Self {
        let rate = if steps_per_second.is_finite() && steps_per_second > 0.0 {
            steps_per_second
        } else {
            DEFAULT_STEP_RATE
        };
        Self::new(Duration::try_from_secs_f64(1.0 / rate).unwrap_or(MAX_INTERVAL))
    }

    /// Sets the residual cap in intervals (minimum 1).
    #[must_use]
    pub fn with_max_backlog(mut self, intervals: u32) -> Self {
        self.max_backlog = intervals.max(1);
        self
    }

    /// Adds `delta` and reports whether one step is due.
    pub fn advance(&mut self, delta: Duration) -> bool {
        self.residual = self.residual.saturating_add(delta);
        let due = self.residual >= self.interval;
        if due {
            self.residual -= self.interval;
        }
        self.cap_backlog();
        trace!(due, residual = ?self.residual, "scheduler advance");
        due
    }

    /// Adds `delta` and returns how many steps are due, at most `max_steps`.
    pub fn accumulate(&mut self, delta: Duration, max_steps: u32) -> u32 {
        self.residual = self.residual.saturating_add(delta);
        let mut count = 0;
        while self.residual >= self.interval && count < max_steps {
            self.residual -= self.interval;
            count += 1;
        }
        self.cap_backlog();
        count
    }

    /// Fixed step interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Steps per second.
    #[must_use]
    pub fn rate(&self) -> f64 {
        1.0 / self.interval.as_secs_f64()
    }

    /// Time carried forward to the next call.
    #[must_use]
    pub const fn residual(&self) -> Duration {
        self.residual
    }

    /// Drops any carried residual (after a pause or reset).
    pub fn reset(&mut self) {
        self.residual = Duration::ZERO;
    }

    fn cap_backlog(&mut self) {
        let cap = self
            .interval
            .checked_mul(self.max_backlog)
            .unwrap_or(Duration::MAX);
        if self.residual > cap {
            self.residual = cap;
        }
    }
}

impl Default for SimulationScheduler {
    fn default() -> Self {
        Self::from_rate(DEFAULT_STEP_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const I: Duration = Duration::from_millis(10);

    #[test]
    fn test_below_interval_never_due() {
        let mut scheduler = SimulationScheduler::new(I);
        for _ in 0..9 {
            assert!(!scheduler.advance(Duration::from_millis(1)));
        }
        assert_eq!(scheduler.residual(), Duration::from_millis(9));
    }

    #[test]
    fn test_exact_interval_due_once() {
        let mut scheduler = SimulationScheduler::new(I);
        assert!(!scheduler.advance(I / 2));
        assert!(scheduler.advance(I / 2));
        assert_eq!(scheduler.residual(), Duration::ZERO);
        assert!(!scheduler.advance(Duration::ZERO));
    }

    #[test]
    fn test_residual_carries_forward() {
        let mut scheduler = SimulationScheduler::new(I);
        assert!(scheduler.advance(I + I / 2));
        assert_eq!(scheduler.residual(), I / 2);
    }

    #[test]
    fn test_one_step_per_advance() {
        let mut scheduler = SimulationScheduler::new(I);
        assert!(scheduler.advance(I * 3));
        assert_eq!(scheduler.residual(), I * 2);
        assert!(scheduler.advance(Duration::ZERO));
        assert!(scheduler.advance(Duration::ZERO));
        assert!(!scheduler.advance(Duration::ZERO));
    }

    #[test]
    fn test_backlog_is_capped() {
        let mut scheduler = SimulationScheduler::new(I).with_max_backlog(2);
        assert!(scheduler.advance(I * 100));
        assert_eq!(scheduler.residual(), I * 2);
    }

    #[test]
    fn test_accumulate_catch_up() {
        let mut scheduler = SimulationScheduler::new(I);
        assert_eq!(scheduler.accumulate(I * 3 + I / 2, 10), 3);
        assert_eq!(scheduler.residual(), I / 2);

        assert_eq!(scheduler.accumulate(I * 20, 5), 5);
        assert_eq!(scheduler.residual(), I * DEFAULT_MAX_BACKLOG);
    }

    #[test]
    fn test_from_rate() {
        let scheduler = SimulationScheduler::from_rate(120.0);
        assert!((scheduler.rate() - 120.0).abs() < 0.01);

        let fallback = SimulationScheduler::from_rate(0.0);
        assert!((fallback.rate() - DEFAULT_STEP_RATE).abs() < 0.01);
    }

    #[test]
    fn test_tiny_rate_uses_longest_interval() {
        let scheduler = SimulationScheduler::from_rate(1e-20);
        assert_eq!(scheduler.interval(), MAX_INTERVAL);
        assert_eq!(SimulationScheduler::from_rate(1e-4).interval(), MAX_INTERVAL);
        assert_eq!(SimulationScheduler::new(Duration::MAX).interval(), MAX_INTERVAL);
    }

    #[test]
    fn test_huge_deltas_saturate() {
        let mut scheduler = SimulationScheduler::new(Duration::MAX).with_max_backlog(u32::MAX);
        assert!(scheduler.advance(Duration::MAX));
        assert!(scheduler.advance(Duration::MAX));
        assert_eq!(scheduler.accumulate(Duration::MAX, 3), 3);
        assert!(scheduler.residual() <= MAX_INTERVAL * u32::MAX);

        let mut capped = SimulationScheduler::new(I);
        assert_eq!(capped.accumulate(Duration::MAX, 2), 2);
        assert_eq!(capped.residual(), I * DEFAULT_MAX_BACKLOG);
    }

    #[test]
    fn test_reset() {
        let mut scheduler = SimulationScheduler::new(I);
        scheduler.advance(I / 2);
        scheduler.reset();
        assert_eq!(scheduler.residual(), Duration::ZERO);
    }
}
