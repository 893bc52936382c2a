//! A deterministic stand-in detector.
//!
//! Produces a walking person with a COCO-17 skeleton, a car box carrying a
//! stable id and a face mesh, with jitter and periodic dropouts so the
//! tracking and fade paths get exercised without a real model.

use std::f32::consts::TAU;

use log::debug;

use crate::geometry::Point2;

use super::detector::{Detector, DetectorContext, Frame};
use super::types::{Contours, Keypoint, RawDetection, Shape};
use super::DetectorError;

/// Seconds of scene time per detector call.
const CYCLE_SECONDS: f32 = 0.066;

/// Resting joint positions as fractions of the person box, COCO-17 order.
const POSE: [(f32, f32); 17] = [
    (0.0, -0.42),   // nose
    (0.03, -0.44),  // left eye
    (-0.03, -0.44), // right eye
    (0.07, -0.43),  // left ear
    (-0.07, -0.43), // right ear
    (0.22, -0.30),  // left shoulder
    (-0.22, -0.30), // right shoulder
    (0.28, -0.10),  // left elbow
    (-0.28, -0.10), // right elbow
    (0.30, 0.08),   // left wrist
    (-0.30, 0.08),  // right wrist
    (0.12, 0.05),   // left hip
    (-0.12, 0.05),  // right hip
    (0.13, 0.27),   // left knee
    (-0.13, 0.27),  // right knee
    (0.14, 0.48),   // left ankle
    (-0.14, 0.48),  // right ankle
];

#[derive(Debug, Clone)]
pub struct SyntheticDetector {
    /// Amplitude of per-cycle position noise, normalized units.
    pub jitter: f32,
    /// The person is skipped on every n-th cycle (0 disables).
    pub person_dropout_every: u64,
    /// The car is skipped for a few cycles out of every n (0 disables).
    pub car_dropout_every: u64,
}

impl Default for SyntheticDetector {
    fn default() -> Self {
        Self {
            jitter: 0.004,
            person_dropout_every: 9,
            car_dropout_every: 60,
        }
    }
}

/// Repeatable noise in `[-1, 1]`.
fn noise(cycle: u64, salt: f32) -> f32 {
    let v = ((cycle as f32 * 12.9898 + salt * 78.233).sin() * 43_758.547).fract();
    v * 2.0 - 1.0
}

fn ellipse(center: Point2, rx: f32, ry: f32, count: usize) -> Vec<Point2> {
    (0..=count)
        .map(|i| {
            let a = i as f32 / count as f32 * TAU;
            Point2::new(center.x + rx * a.cos(), center.y + ry * a.sin())
        })
        .collect()
}

impl SyntheticDetector {
    fn person(&self, cycle: u64, t: f32) -> RawDetection {
        let (w, h) = (0.16, 0.5);
        let cx = 0.35 + 0.18 * (t * 0.35).sin() + self.jitter * noise(cycle, 1.0);
        let cy = 0.55 + self.jitter * noise(cycle, 2.0);
        let swing = (t * 4.0).sin() * 0.12;

        let keypoints = POSE
            .iter()
            .enumerate()
            .map(|(i, (ox, oy))| {
                let stride = match i {
                    9 | 16 => swing,
                    10 | 15 => -swing,
                    7 | 14 => swing * 0.5,
                    8 | 13 => -swing * 0.5,
                    _ => 0.0,
                };
                let confidence = match i {
                    3 | 4 => 0.45,
                    // Right wrist drops out now and then
                    10 if noise(cycle, 3.0) > 0.6 => 0.15,
                    _ => 0.9,
                };
                Keypoint::new(
                    cx + (ox + stride) * w + self.jitter * noise(cycle, 10.0 + i as f32),
                    cy + oy * h,
                    confidence,
                )
            })
            .collect();

        RawDetection::boxed("person", cx, cy, w, h, 0.82 + 0.1 * noise(cycle, 4.0))
            .with_shape(Shape::Skeleton { keypoints })
    }

    fn car(&self, cycle: u64, t: f32) -> RawDetection {
        let cx = 0.72 - 0.1 * (t * 0.2).sin() + self.jitter * noise(cycle, 5.0);
        let cy = 0.74 + self.jitter * noise(cycle, 6.0);
        RawDetection::boxed("car", cx, cy, 0.22, 0.14, 0.9).with_id("car-1")
    }

    fn face(&self, cycle: u64, t: f32) -> RawDetection {
        let center = Point2::new(
            0.7 + 0.02 * (t * 0.5).cos() + self.jitter * noise(cycle, 7.0),
            0.3 + self.jitter * noise(cycle, 8.0),
        );
        let (w, h) = (0.1, 0.15);
        let at = |fx: f32, fy: f32| Point2::new(center.x + fx * w, center.y + fy * h);

        let mut contours = Contours::new();
        contours.insert("silhouette".into(), ellipse(center, w * 0.5, h * 0.5, 24));
        contours.insert("left_eye".into(), ellipse(at(0.2, -0.1), w * 0.09, h * 0.03, 8));
        contours.insert("right_eye".into(), ellipse(at(-0.2, -0.1), w * 0.09, h * 0.03, 8));
        contours.insert("left_eyebrow".into(), vec![at(0.08, -0.2), at(0.2, -0.24), at(0.32, -0.2)]);
        contours.insert("right_eyebrow".into(), vec![at(-0.08, -0.2), at(-0.2, -0.24), at(-0.32, -0.2)]);
        contours.insert("nose".into(), vec![at(0.0, -0.08), at(0.0, 0.08), at(0.06, 0.1), at(-0.06, 0.1)]);
        let open = 0.02 + 0.02 * (t * 3.0).sin().abs();
        contours.insert("lips".into(), ellipse(at(0.0, 0.26), w * 0.16, h * open, 10));

        RawDetection::boxed("face", center.x, center.y, w, h, 0.88).with_shape(Shape::FaceMesh { contours })
    }
}

impl Detector for SyntheticDetector {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn init(&mut self, ctx: &mut DetectorContext) -> Result<(), DetectorError> {
        ctx.model = "synthetic-scene".to_string();
        debug!("Synthetic detector ready");
        Ok(())
    }

    fn detect(&mut self, ctx: &mut DetectorContext, _frame: &Frame) -> Result<Vec<RawDetection>, DetectorError> {
        let cycle = ctx.cycles;
        let t = cycle as f32 * CYCLE_SECONDS;
        let mut detections = Vec::with_capacity(3);

        if self.person_dropout_every == 0 || (cycle + 1) % self.person_dropout_every != 0 {
            detections.push(self.person(cycle, t));
        }
        if self.car_dropout_every == 0 || cycle % self.car_dropout_every >= 4 {
            detections.push(self.car(cycle, t));
        }
        detections.push(self.face(cycle, t));
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(detector: &mut SyntheticDetector, ctx: &mut DetectorContext) -> Vec<RawDetection> {
        let frame = Frame::new(8, 8);
        let out = detector.detect(ctx, &frame).unwrap();
        ctx.cycles += 1;
        out
    }

    #[test]
    fn test_output_is_valid_and_deterministic() {
        let mut a = SyntheticDetector::default();
        let mut b = SyntheticDetector::default();
        let mut ctx_a = DetectorContext::default();
        let mut ctx_b = DetectorContext::default();

        for _ in 0..20 {
            let da = run(&mut a, &mut ctx_a);
            let db = run(&mut b, &mut ctx_b);
            assert_eq!(da, db);
            for det in da {
                assert!(det.clone().validate().is_ok(), "invalid synthetic detection {:?}", det.label);
            }
        }
    }

    #[test]
    fn test_person_has_full_skeleton_and_drops_out() {
        let mut detector = SyntheticDetector::default();
        let mut ctx = DetectorContext::default();
        let mut missing = 0;
        for _ in 0..18 {
            let out = run(&mut detector, &mut ctx);
            match out.iter().find(|d| d.label == "person") {
                Some(person) => match &person.shape {
                    Shape::Skeleton { keypoints } => assert_eq!(keypoints.len(), 17),
                    other => panic!("unexpected shape {:?}", other),
                },
                None => missing += 1,
            }
        }
        assert_eq!(missing, 2);
    }

    #[test]
    fn test_car_carries_stable_id() {
        let mut detector = SyntheticDetector::default();
        let mut ctx = DetectorContext::default();
        ctx.cycles = 10;
        let out = run(&mut detector, &mut ctx);
        let car = out.iter().find(|d| d.label == "car").unwrap();
        assert_eq!(car.id.as_deref(), Some("car-1"));
    }
}
