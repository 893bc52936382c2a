//! Device-orientation stabilization.
//!
//! Angles are in degrees and grow in the same direction as the screen axes:
//! yaw (compass heading) to the right, pitch downward, roll clockwise. The
//! stabilizer keeps an anchor orientation and turns the drift since the anchor
//! into a pixel shift that moves overlays opposite to the device rotation, so
//! markers stay locked to the world while the camera pans.

use std::time::Duration;

use log::{debug, trace};
use serde::{Deserialize, Serialize};

pub const DEFAULT_FOV_DEG: f32 = 60.0;
pub const DEFAULT_ORIENTATION_SMOOTHING: f32 = 0.25;

/// Wrap an angle into `[-180, 180)`.
pub fn normalize_angle(deg: f32) -> f32 {
    (deg + 180.0).rem_euclid(360.0) - 180.0
}

/// Shortest signed rotation from `b` to `a`, in `[-180, 180)`.
pub fn angle_diff(a: f32, b: f32) -> f32 {
    normalize_angle(a - b)
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Orientation {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

impl Orientation {
    /// Rotation from `anchor` to `self` along the shortest path.
    pub fn delta_from(&self, anchor: &Orientation) -> Orientation {
        Orientation {
            yaw: angle_diff(self.yaw, anchor.yaw),
            pitch: self.pitch - anchor.pitch,
            roll: angle_diff(self.roll, anchor.roll),
        }
    }
}

/// One reading from the orientation sensor. Any axis may be unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OrientationSample {
    pub yaw: Option<f32>,
    pub pitch: Option<f32>,
    pub roll: Option<f32>,
}

impl OrientationSample {
    pub fn new(yaw: f32, pitch: f32, roll: f32) -> Self {
        Self {
            yaw: Some(yaw),
            pitch: Some(pitch),
            roll: Some(roll),
        }
    }

    /// Yaw and pitch are required; a missing roll reads as level.
    fn valid(&self) -> Option<Orientation> {
        let yaw = self.yaw.filter(|v| v.is_finite())?;
        let pitch = self.pitch.filter(|v| v.is_finite())?;
        let roll = self.roll.filter(|v| v.is_finite()).unwrap_or(0.0);
        Some(Orientation { yaw, pitch, roll })
    }
}

/// When the anchor orientation is (re)captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorPolicy {
    /// First valid reading anchors; only an explicit resync moves it.
    Once,
    /// Every non-empty detection batch is ground truth and re-anchors.
    ResyncOnDetections,
}

impl AnchorPolicy {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "once" => Some(AnchorPolicy::Once),
            "resync_on_detections" | "resync" => Some(AnchorPolicy::ResyncOnDetections),
            _ => None,
        }
    }
}

/// Screen-space compensation for the current frame. Markers and reference
/// overlays must all be drawn with the same value.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CameraShift {
    pub dx: f32,
    pub dy: f32,
    /// Counter-rotation in radians.
    pub roll: f32,
    /// Pixels per degree used to build the shift (pitch ladder spacing).
    pub px_per_degree: f32,
    pub world_locked: bool,
}

impl CameraShift {
    pub const NONE: CameraShift = CameraShift {
        dx: 0.0,
        dy: 0.0,
        roll: 0.0,
        px_per_degree: 0.0,
        world_locked: false,
    };
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilizerConfig {
    /// Horizontal field of view of the camera feed, degrees.
    pub fov_deg: f32,
    /// Blend factor applied to each incoming sample.
    pub smoothing: f32,
    pub policy: AnchorPolicy,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            fov_deg: DEFAULT_FOV_DEG,
            smoothing: DEFAULT_ORIENTATION_SMOOTHING,
            policy: AnchorPolicy::Once,
        }
    }
}

pub struct OrientationStabilizer {
    config: StabilizerConfig,
    current: Option<Orientation>,
    anchor: Option<Orientation>,
}

impl OrientationStabilizer {
    pub fn new(config: StabilizerConfig) -> Self {
        Self {
            config,
            current: None,
            anchor: None,
        }
    }

    pub fn policy(&self) -> AnchorPolicy {
        self.config.policy
    }

    pub fn current(&self) -> Option<Orientation> {
        self.current
    }

    pub fn anchor(&self) -> Option<Orientation> {
        self.anchor
    }

    pub fn is_available(&self) -> bool {
        self.current.is_some() && self.anchor.is_some()
    }

    /// Feed one sensor reading. Readings without yaw or pitch are ignored.
    pub fn push_sample(&mut self, sample: OrientationSample) {
        let Some(reading) = sample.valid() else {
            trace!("Ignoring orientation sample without yaw/pitch");
            return;
        };

        let next = match self.current {
            None => reading,
            Some(prev) => {
                let s = self.config.smoothing.clamp(0.0, 1.0);
                Orientation {
                    yaw: normalize_angle(prev.yaw + angle_diff(reading.yaw, prev.yaw) * s),
                    pitch: prev.pitch + (reading.pitch - prev.pitch) * s,
                    roll: normalize_angle(prev.roll + angle_diff(reading.roll, prev.roll) * s),
                }
            }
        };
        self.current = Some(next);

        if self.anchor.is_none() {
            debug!("Orientation anchored at yaw={:.1} pitch={:.1} roll={:.1}", next.yaw, next.pitch, next.roll);
            self.anchor = Some(next);
        }
    }

    /// Called when a detector batch lands; re-anchors under `ResyncOnDetections`.
    pub fn on_detection_batch(&mut self, detection_count: usize) {
        if self.config.policy == AnchorPolicy::ResyncOnDetections && detection_count > 0 {
            self.resync();
        }
    }

    /// Treat the current orientation as ground truth, removing drift.
    pub fn resync(&mut self) {
        if let Some(current) = self.current {
            trace!("Orientation re-anchored");
            self.anchor = Some(current);
        }
    }

    /// Forget all readings, e.g. when the sensor permission is revoked.
    pub fn reset(&mut self) {
        self.current = None;
        self.anchor = None;
    }

    pub fn delta(&self) -> Option<Orientation> {
        Some(self.current?.delta_from(&self.anchor?))
    }

    /// Pixel shift for a viewport of `width` x `height` at `zoom`.
    ///
    /// Without orientation data the shift is zero and overlays stay screen-locked.
    pub fn shift(&self, width: f32, height: f32, zoom: f32) -> CameraShift {
        let Some(delta) = self.delta() else {
            return CameraShift::NONE;
        };
        if width <= 0.0 || height <= 0.0 || self.config.fov_deg <= 0.0 {
            return CameraShift::NONE;
        }

        let zoom = zoom.max(1.0);
        let px_per_degree_x = width / self.config.fov_deg * zoom;
        let aspect = width / height;
        let vertical_fov = self.config.fov_deg / aspect;
        let px_per_degree_y = height / vertical_fov * zoom;

        CameraShift {
            dx: -(delta.yaw * px_per_degree_x),
            dy: -(delta.pitch * px_per_degree_y),
            roll: -delta.roll.to_radians(),
            px_per_degree: px_per_degree_x,
            world_locked: true,
        }
    }
}

/// Slow synthetic head sweep for desktops without an orientation sensor.
#[derive(Debug, Clone, Copy)]
pub struct SweepOrientation {
    pub period: Duration,
    pub yaw_amplitude: f32,
    pub pitch_amplitude: f32,
    pub roll_amplitude: f32,
}

impl SweepOrientation {
    pub fn sample_at(&self, elapsed: Duration) -> OrientationSample {
        let period = self.period.as_secs_f32().max(0.1);
        let phase = elapsed.as_secs_f32() / period * std::f32::consts::TAU;
        OrientationSample::new(
            normalize_angle(350.0 + self.yaw_amplitude * phase.sin()),
            self.pitch_amplitude * (phase * 0.5).sin(),
            self.roll_amplitude * (phase * 0.7).cos(),
        )
    }
}

impl Default for SweepOrientation {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(12),
            yaw_amplitude: 12.0,
            pitch_amplitude: 4.0,
            roll_amplitude: 3.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaw_wraparound_takes_shortest_path() {
        assert_eq!(angle_diff(359.0, 1.0), -2.0);
        assert_eq!(angle_diff(1.0, 359.0), 2.0);
        assert_eq!(angle_diff(90.0, 45.0), 45.0);
        assert_eq!(normalize_angle(540.0), -180.0);
    }

    #[test]
    fn test_no_orientation_means_zero_shift() {
        let mut stabilizer = OrientationStabilizer::new(StabilizerConfig::default());
        assert_eq!(stabilizer.shift(1280.0, 720.0, 1.0), CameraShift::NONE);

        stabilizer.push_sample(OrientationSample { yaw: None, pitch: Some(3.0), roll: None });
        assert!(!stabilizer.is_available());
        assert_eq!(stabilizer.shift(1280.0, 720.0, 1.0), CameraShift::NONE);
    }

    #[test]
    fn test_first_sample_anchors_and_gives_zero_shift() {
        let mut stabilizer = OrientationStabilizer::new(StabilizerConfig::default());
        stabilizer.push_sample(OrientationSample::new(120.0, 5.0, 0.0));
        let shift = stabilizer.shift(1200.0, 600.0, 1.0);
        assert!(shift.world_locked);
        assert_eq!(shift.dx, 0.0);
        assert_eq!(shift.dy, 0.0);
    }

    #[test]
    fn test_turning_right_moves_markers_left() {
        let config = StabilizerConfig { smoothing: 1.0, ..StabilizerConfig::default() };
        let mut stabilizer = OrientationStabilizer::new(config);
        stabilizer.push_sample(OrientationSample::new(359.0, 0.0, 0.0));
        stabilizer.push_sample(OrientationSample::new(1.0, 0.0, 0.0));

        // 1200px over 60 degrees = 20 px/deg, rotated 2 degrees right across north
        let shift = stabilizer.shift(1200.0, 600.0, 1.0);
        assert!((shift.dx + 40.0).abs() < 1e-3, "dx = {}", shift.dx);

        let zoomed = stabilizer.shift(1200.0, 600.0, 2.0);
        assert!((zoomed.dx + 80.0).abs() < 1e-3);
    }

    #[test]
    fn test_vertical_shift_uses_aspect() {
        let config = StabilizerConfig { smoothing: 1.0, ..StabilizerConfig::default() };
        let mut stabilizer = OrientationStabilizer::new(config);
        stabilizer.push_sample(OrientationSample::new(0.0, 0.0, 0.0));
        stabilizer.push_sample(OrientationSample::new(0.0, 3.0, 0.0));

        // vertical fov = 60 / 2 = 30 degrees over 600px = 20 px/deg
        let shift = stabilizer.shift(1200.0, 600.0, 1.0);
        assert!((shift.dy + 60.0).abs() < 1e-3, "dy = {}", shift.dy);
    }

    #[test]
    fn test_resync_policy() {
        let config = StabilizerConfig {
            smoothing: 1.0,
            policy: AnchorPolicy::ResyncOnDetections,
            ..StabilizerConfig::default()
        };
        let mut stabilizer = OrientationStabilizer::new(config);
        stabilizer.push_sample(OrientationSample::new(10.0, 0.0, 0.0));
        stabilizer.push_sample(OrientationSample::new(20.0, 0.0, 0.0));
        assert!(stabilizer.shift(600.0, 600.0, 1.0).dx < 0.0);

        stabilizer.on_detection_batch(0);
        assert!(stabilizer.shift(600.0, 600.0, 1.0).dx < 0.0);

        stabilizer.on_detection_batch(2);
        assert_eq!(stabilizer.shift(600.0, 600.0, 1.0).dx, 0.0);
    }

    #[test]
    fn test_once_policy_ignores_batches() {
        let config = StabilizerConfig { smoothing: 1.0, ..StabilizerConfig::default() };
        let mut stabilizer = OrientationStabilizer::new(config);
        stabilizer.push_sample(OrientationSample::new(10.0, 0.0, 0.0));
        stabilizer.push_sample(OrientationSample::new(20.0, 0.0, 0.0));
        stabilizer.on_detection_batch(5);
        assert!(stabilizer.shift(600.0, 600.0, 1.0).dx < 0.0);

        stabilizer.resync();
        assert_eq!(stabilizer.shift(600.0, 600.0, 1.0).dx, 0.0);
    }

    #[test]
    fn test_smoothing_wraps_through_north() {
        let config = StabilizerConfig { smoothing: 0.5, ..StabilizerConfig::default() };
        let mut stabilizer = OrientationStabilizer::new(config);
        stabilizer.push_sample(OrientationSample::new(350.0, 0.0, 0.0));
        stabilizer.push_sample(OrientationSample::new(10.0, 0.0, 0.0));
        let yaw = stabilizer.current().map(|o| o.yaw).unwrap_or(f32::NAN);
        assert!(yaw.abs() < 1e-3, "yaw {yaw}");
    }
}
