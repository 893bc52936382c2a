use std::f32::consts::PI;

use super::FilterState;

/// Integration substeps per update.
const SUBSTEPS: u32 = 3;

/// Largest frame step fed to the integrator (seconds). Longer frames, e.g.
/// after the window was hidden, are clamped so the spring cannot diverge.
pub const DEFAULT_MAX_DT: f32 = 0.034;

pub const DEFAULT_FREQUENCY: f32 = 3.0;
pub const DEFAULT_DAMPING: f32 = 1.0;
pub const DEFAULT_RESPONSE: f32 = 0.0;

/// Second-order (spring-damper) dynamics parameterized by natural frequency
/// `f` (Hz), damping ratio `z` and initial response `r`.
///
/// `z = 1` is critically damped, `z < 1` rings, `r > 0` anticipates the
/// target and `r < 0` lags behind it before following.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SecondOrderDynamics {
    pub frequency: f32,
    pub damping: f32,
    pub response: f32,
    pub max_dt: f32,
    k1: f32,
    k2: f32,
    k3: f32,
}

impl SecondOrderDynamics {
    pub fn new(frequency: f32, damping: f32, response: f32) -> Self {
        let frequency = frequency.max(0.01);
        let damping = damping.max(0.0);
        let omega = 2.0 * PI * frequency;

        Self {
            frequency,
            damping,
            response,
            max_dt: DEFAULT_MAX_DT,
            k1: damping / (PI * frequency),
            k2: 1.0 / (omega * omega),
            k3: response * damping / omega,
        }
    }

    pub fn with_max_dt(mut self, max_dt: f32) -> Self {
        self.max_dt = max_dt.max(0.001);
        self
    }

    pub fn coefficients(&self) -> (f32, f32, f32) {
        (self.k1, self.k2, self.k3)
    }

    pub fn step(&self, state: &mut FilterState, target: f32, dt: f32) {
        if !(dt > 0.0) || !dt.is_finite() || !target.is_finite() {
            return;
        }
        let dt = dt.min(self.max_dt);

        let target_velocity = (target - state.last_target) / dt;
        state.last_target = target;

        let h = dt / SUBSTEPS as f32;
        // Keeps the explicit integration stable when h is large relative to k1/k2
        let k2 = self.k2.max(h * h / 2.0 + h * self.k1 / 2.0).max(h * self.k1);

        for _ in 0..SUBSTEPS {
            let accel = (target + self.k3 * target_velocity - state.value - self.k1 * state.velocity) / k2;
            state.velocity += accel * h;
            state.value += state.velocity * h;
        }
    }
}

impl Default for SecondOrderDynamics {
    fn default() -> Self {
        Self::new(DEFAULT_FREQUENCY, DEFAULT_DAMPING, DEFAULT_RESPONSE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: f32 = 1.0 / 60.0;

    fn run_step_input(filter: &SecondOrderDynamics, ticks: usize) -> (f32, f32) {
        let mut state = FilterState::at(0.0);
        let mut peak = f32::MIN;
        for _ in 0..ticks {
            filter.step(&mut state, 100.0, FRAME);
            peak = peak.max(state.value);
        }
        (state.value, peak)
    }

    #[test]
    fn test_critically_damped_converges_without_overshoot() {
        let filter = SecondOrderDynamics::new(3.0, 1.0, 0.0);
        let (value, peak) = run_step_input(&filter, 120);
        assert!((value - 100.0).abs() < 0.5, "value {value} did not converge");
        assert!(peak < 101.0, "overshoot too large: {peak}");
    }

    #[test]
    fn test_underdamped_settles_with_bounded_overshoot() {
        let filter = SecondOrderDynamics::new(2.0, 0.5, 0.0);
        let (value, peak) = run_step_input(&filter, 400);
        assert!((value - 100.0).abs() < 1.0, "value {value} did not settle");
        assert!(peak < 125.0, "overshoot too large: {peak}");
    }

    #[test]
    fn test_stalled_frame_is_clamped() {
        let filter = SecondOrderDynamics::default();
        let mut state = FilterState::at(0.0);
        filter.step(&mut state, 100.0, 2.5);
        assert!(state.value.is_finite());
        assert!(state.value > 0.0 && state.value <= 100.0, "value {}", state.value);
    }

    #[test]
    fn test_zero_dt_is_ignored() {
        let filter = SecondOrderDynamics::default();
        let mut state = FilterState::at(10.0);
        filter.step(&mut state, 50.0, 0.0);
        assert_eq!(state, FilterState::at(10.0));
    }

    #[test]
    fn test_variable_dt_still_converges() {
        let filter = SecondOrderDynamics::default();
        let mut state = FilterState::at(0.0);
        let steps = [0.008, 0.016, 0.033, 0.012, 0.020];
        for i in 0..300 {
            filter.step(&mut state, -40.0, steps[i % steps.len()]);
        }
        assert!((state.value + 40.0).abs() < 0.5);
    }
}
