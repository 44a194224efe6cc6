//! Fixed-step driver with an accumulator.
//!
//! Wall-clock frames of any length are converted into whole simulation
//! steps. Leftover time is reported as an interpolation alpha so
//! presentation can blend between the last two committed states.

use std::time::Instant;
use tracing::warn;

/// Converts variable frame times into fixed simulation steps.
///
/// Call [`tick`](Self::tick) once per wall-clock frame, or
/// [`advance`](Self::advance) with an explicit frame time.
#[derive(Debug)]
pub struct FixedStepDriver {
    step_ms: f64,
    max_frame_time_ms: f64,
    previous_time: Instant,
    accumulator_ms: f64,
    total_sim_time_ms: f64,
    frame_count: u64,
    update_count: u64,
}

impl FixedStepDriver {
    /// Creates a driver stepping every `step_ms`, catching up on at most
    /// `max_frame_time_ms` of wall-clock time per frame.
    pub fn new(step_ms: f32, max_frame_time_ms: f32) -> Self {
        let step_ms = f64::from(step_ms);
        Self {
            step_ms,
            max_frame_time_ms: f64::from(max_frame_time_ms).max(step_ms),
            previous_time: Instant::now(),
            accumulator_ms: 0.0,
            total_sim_time_ms: 0.0,
            frame_count: 0,
            update_count: 0,
        }
    }

    /// Measures the time since the previous call and advances by it.
    pub fn tick(&mut self, update_fn: impl FnMut(f32, f64), render_fn: impl FnMut(f32)) {
        let now = Instant::now();
        let frame_time_ms = now.duration_since(self.previous_time).as_secs_f64() * 1000.0;
        self.previous_time = now;
        self.advance(frame_time_ms, update_fn, render_fn);
    }

    /// Runs one frame of `frame_time_ms`.
    ///
    /// - `update_fn(step_ms, sim_time_ms)` is called zero or more times, once
    ///   per whole step.
    /// - `render_fn(alpha)` is called exactly once with the fraction of a step
    ///   left in the accumulator, in `[0.0, 1.0)`.
    pub fn advance(
        &mut self,
        frame_time_ms: f64,
        mut update_fn: impl FnMut(f32, f64),
        mut render_fn: impl FnMut(f32),
    ) {
        let mut frame_time_ms = frame_time_ms.max(0.0);
        // Clamp to avoid a spiral of ever-longer catch-up frames.
        if frame_time_ms > self.max_frame_time_ms {
            warn!(
                frame_time_ms,
                max_frame_time_ms = self.max_frame_time_ms,
                "frame time exceeds maximum, clamping"
            );
            frame_time_ms = self.max_frame_time_ms;
        }

        self.accumulator_ms += frame_time_ms;

        while self.accumulator_ms >= self.step_ms {
            update_fn(self.step_ms as f32, self.total_sim_time_ms);
            self.total_sim_time_ms += self.step_ms;
            self.accumulator_ms -= self.step_ms;
            self.update_count += 1;
        }

        render_fn(self.alpha());
        self.frame_count += 1;
    }

    /// Returns the current interpolation alpha without running a frame.
    pub fn alpha(&self) -> f32 {
        if self.accumulator_ms > 0.0 {
            (self.accumulator_ms / self.step_ms) as f32
        } else {
            0.0
        }
    }

    pub fn step_ms(&self) -> f32 {
        self.step_ms as f32
    }

    /// Returns the total number of frames run.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Returns the total number of simulation steps executed.
    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Returns the total simulated time in milliseconds.
    pub fn total_sim_time_ms(&self) -> f64 {
        self.total_sim_time_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP_MS: f32 = 10.0;
    const STEP: f64 = STEP_MS as f64;

    fn driver() -> FixedStepDriver {
        FixedStepDriver::new(STEP_MS, 250.0)
    }

    #[test]
    fn test_single_step() {
        let mut driver = driver();
        let mut updates = 0u32;
        driver.advance(STEP, |_, _| updates += 1, |_| {});
        assert_eq!(updates, 1);
        assert!(driver.alpha().abs() < 1e-6);
    }

    #[test]
    fn test_multiple_steps_report_sim_time() {
        let mut driver = driver();
        let mut times = Vec::new();
        driver.advance(3.0 * STEP, |step, t| times.push((step, t)), |_| {});
        assert_eq!(times, vec![(10.0, 0.0), (10.0, 10.0), (10.0, 20.0)]);
        assert!((driver.total_sim_time_ms() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_step_only_renders() {
        let mut driver = driver();
        let mut updates = 0u32;
        let mut alpha = -1.0;
        driver.advance(0.25 * STEP, |_, _| updates += 1, |a| alpha = a);
        assert_eq!(updates, 0);
        assert!((alpha - 0.25).abs() < 1e-6, "alpha should be ~0.25, got {alpha}");
    }

    #[test]
    fn test_max_frame_time_clamp() {
        let mut driver = driver();
        let mut updates = 0u32;
        driver.advance(10_000.0, |_, _| updates += 1, |_| {});
        assert_eq!(updates, 25);
    }

    #[test]
    fn test_max_frame_time_is_at_least_one_step() {
        let mut driver = FixedStepDriver::new(STEP_MS, 1.0);
        let mut updates = 0u32;
        driver.advance(STEP, |_, _| updates += 1, |_| {});
        assert_eq!(updates, 1);
    }

    #[test]
    fn test_negative_frame_time_is_ignored() {
        let mut driver = driver();
        let mut updates = 0u32;
        driver.advance(-5.0, |_, _| updates += 1, |_| {});
        assert_eq!(updates, 0);
        assert_eq!(driver.frame_count(), 1);
        assert_eq!(driver.alpha(), 0.0);
    }

    #[test]
    fn test_deterministic_sequence() {
        let frame_times = [17.0, 15.0, 20.0, 16.0, 33.0, 8.0, 18.0];

        let mut a = driver();
        let mut b = driver();
        for &ft in &frame_times {
            let mut alpha_a = 0.0;
            let mut alpha_b = 0.0;
            a.advance(ft, |_, _| {}, |x| alpha_a = x);
            b.advance(ft, |_, _| {}, |x| alpha_b = x);
            assert_eq!(alpha_a, alpha_b);
        }

        assert_eq!(a.update_count(), b.update_count());
        assert_eq!(a.frame_count(), frame_times.len() as u64);
        let expected = a.update_count() as f64 * STEP;
        assert!((a.total_sim_time_ms() - expected).abs() < 1e-9);
    }
}
