//! Per-scalar motion smoothing.
//!
//! Every smoothed channel of a tracked marker (centre, size, keypoints) is a
//! [`FilterState`] advanced once per rendered frame by a [`MotionFilter`].
//! The filters are driven from the frame clock, never from detection arrival,
//! so the on-screen motion is independent of detector latency and jitter.

pub mod lerp;
pub mod second_order;

use serde::{Deserialize, Serialize};

pub use lerp::AdaptiveLerp;
pub use second_order::SecondOrderDynamics;

/// Current value, velocity and last seen target of one smoothed scalar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterState {
    pub value: f32,
    pub velocity: f32,
    pub last_target: f32,
}

impl FilterState {
    /// A state already at rest on `value`.
    pub fn at(value: f32) -> Self {
        Self {
            value,
            velocity: 0.0,
            last_target: value,
        }
    }

    /// Jump straight to `value`, dropping any motion.
    pub fn snap(&mut self, value: f32) {
        *self = Self::at(value);
    }
}

/// Which algorithm smooths a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    SecondOrder,
    Lerp,
}

impl FilterKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "second_order" | "second-order" | "spring" => Some(FilterKind::SecondOrder),
            "lerp" | "adaptive_lerp" => Some(FilterKind::Lerp),
            _ => None,
        }
    }
}

/// The two interchangeable smoothing algorithms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionFilter {
    SecondOrder(SecondOrderDynamics),
    Lerp(AdaptiveLerp),
}

impl MotionFilter {
    /// Advance `state` toward `target` by `dt` seconds.
    ///
    /// `px_per_unit` converts the channel's units into screen pixels; only the
    /// adaptive LERP uses it (deadzone and speed boost are pixel based).
    pub fn step(&self, state: &mut FilterState, target: f32, dt: f32, px_per_unit: f32) {
        match self {
            MotionFilter::SecondOrder(f) => f.step(state, target, dt),
            MotionFilter::Lerp(f) => f.step(state, target, dt, px_per_unit),
        }
    }

    pub fn kind(&self) -> FilterKind {
        match self {
            MotionFilter::SecondOrder(_) => FilterKind::SecondOrder,
            MotionFilter::Lerp(_) => FilterKind::Lerp,
        }
    }
}

impl Default for MotionFilter {
    fn default() -> Self {
        MotionFilter::Lerp(AdaptiveLerp::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_kind_names() {
        assert_eq!(FilterKind::from_name("lerp"), Some(FilterKind::Lerp));
        assert_eq!(FilterKind::from_name(" Second_Order "), Some(FilterKind::SecondOrder));
        assert_eq!(FilterKind::from_name("kalman"), None);
    }

    #[test]
    fn test_dispatch_reaches_both_algorithms() {
        let spring = MotionFilter::SecondOrder(SecondOrderDynamics::default());
        let lerp = MotionFilter::Lerp(AdaptiveLerp::default());

        let mut a = FilterState::at(0.0);
        let mut b = FilterState::at(0.0);
        spring.step(&mut a, 100.0, 0.016, 1.0);
        lerp.step(&mut b, 100.0, 0.016, 1.0);

        assert!(a.value > 0.0 && a.value < 100.0);
        assert!(b.value > 0.0 && b.value < 100.0);
    }
}
