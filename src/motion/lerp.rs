use super::FilterState;

pub const DEFAULT_BASE_RATE: f32 = 0.12;
pub const DEFAULT_BOOST_PER_PX: f32 = 0.004;
pub const DEFAULT_MIN_FACTOR: f32 = 0.08;
pub const DEFAULT_MAX_FACTOR: f32 = 0.65;
pub const DEFAULT_DEADZONE_PX: f32 = 2.0;

/// Reference frame duration the per-frame factor is tuned for.
const REFERENCE_FRAME: f32 = 1.0 / 60.0;

/// Adaptive linear interpolation.
///
/// The blend factor grows with the on-screen distance to the target, so fast
/// moves catch up quickly while slow drift stays smooth. Deltas inside the
/// deadzone leave the value untouched, which absorbs camera shake.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveLerp {
    pub base_rate: f32,
    pub boost_per_px: f32,
    pub min_factor: f32,
    pub max_factor: f32,
    pub deadzone_px: f32,
}

impl AdaptiveLerp {
    pub fn new(base_rate: f32, boost_per_px: f32, min_factor: f32, max_factor: f32, deadzone_px: f32) -> Self {
        let min_factor = min_factor.clamp(0.0, 1.0);
        Self {
            base_rate,
            boost_per_px: boost_per_px.max(0.0),
            min_factor,
            max_factor: max_factor.clamp(min_factor, 1.0),
            deadzone_px: deadzone_px.max(0.0),
        }
    }

    /// Blend factor for one reference frame at the given pixel distance.
    pub fn factor(&self, delta_px: f32) -> f32 {
        (self.base_rate + delta_px * self.boost_per_px).clamp(self.min_factor, self.max_factor)
    }

    pub fn step(&self, state: &mut FilterState, target: f32, dt: f32, px_per_unit: f32) {
        if !(dt > 0.0) || !dt.is_finite() || !target.is_finite() {
            return;
        }

        let delta = target - state.value;
        let delta_px = delta.abs() * px_per_unit.abs();
        state.last_target = target;

        if delta_px < self.deadzone_px {
            state.velocity = 0.0;
            return;
        }

        // Rescale the per-frame factor to the actual frame length
        let frames = (dt / REFERENCE_FRAME).min(10.0);
        let t = 1.0 - (1.0 - self.factor(delta_px)).powf(frames);

        let moved = delta * t;
        state.value += moved;
        state.velocity = moved / dt;
    }
}

impl Default for AdaptiveLerp {
    fn default() -> Self {
        Self::new(
            DEFAULT_BASE_RATE,
            DEFAULT_BOOST_PER_PX,
            DEFAULT_MIN_FACTOR,
            DEFAULT_MAX_FACTOR,
            DEFAULT_DEADZONE_PX,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: f32 = 1.0 / 60.0;

    #[test]
    fn test_deadzone_produces_no_change() {
        let lerp = AdaptiveLerp::default();
        let mut state = FilterState::at(0.5);
        // 1px on a 1000px wide viewport
        lerp.step(&mut state, 0.501, FRAME, 1000.0);
        assert_eq!(state.value, 0.5);
        assert_eq!(state.velocity, 0.0);
    }

    #[test]
    fn test_large_delta_moves_faster() {
        let lerp = AdaptiveLerp::default();
        assert!(lerp.factor(300.0) > lerp.factor(10.0));
        assert_eq!(lerp.factor(10_000.0), lerp.max_factor);
        assert_eq!(lerp.factor(0.0), lerp.base_rate.max(lerp.min_factor));
    }

    #[test]
    fn test_converges_to_deadzone() {
        let lerp = AdaptiveLerp::default();
        let mut state = FilterState::at(0.0);
        for _ in 0..200 {
            lerp.step(&mut state, 400.0, FRAME, 1.0);
        }
        assert!((state.value - 400.0).abs() < lerp.deadzone_px);
    }

    #[test]
    fn test_never_overshoots() {
        let lerp = AdaptiveLerp::default();
        let mut state = FilterState::at(0.0);
        for _ in 0..100 {
            lerp.step(&mut state, 250.0, 0.2, 1.0);
            assert!(state.value <= 250.0);
        }
    }

    #[test]
    fn test_longer_frame_moves_further() {
        let lerp = AdaptiveLerp::default();
        let mut short = FilterState::at(0.0);
        let mut long = FilterState::at(0.0);
        lerp.step(&mut short, 100.0, FRAME, 1.0);
        lerp.step(&mut long, 100.0, FRAME * 2.0, 1.0);
        assert!(long.value > short.value);
    }
}
