use std::time::Instant;

use log::debug;

use crate::detection::{Contours, Keypoint, RawDetection, Shape, ShapeKind};
use crate::distance::{estimate_distance, ground_speed};
use crate::geometry::{BBox, Point2};
use crate::motion::{FilterState, MotionFilter};

/// Weight of the previous distance in the running average.
const DISTANCE_KEEP: f32 = 0.8;

/// Where a marker comes from. External markers are never timed out by the
/// detector cadence; they live until the external list drops them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerSource {
    Detector,
    External,
}

/// Frame the observation was made in, pixels. Zero when unknown.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameSize {
    pub width: f32,
    pub height: f32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width as f32,
            height: height as f32,
        }
    }

    pub fn is_known(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// Filters for each channel family of a marker.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MarkerFilters {
    pub position: MotionFilter,
    pub size: MotionFilter,
    pub keypoints: MotionFilter,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothedKeypoint {
    pub x: FilterState,
    pub y: FilterState,
    pub target: Keypoint,
}

impl SmoothedKeypoint {
    fn at(kp: Keypoint) -> Self {
        Self {
            x: FilterState::at(kp.x),
            y: FilterState::at(kp.y),
            target: kp,
        }
    }

    pub fn position(&self) -> Point2 {
        Point2::new(self.x.value, self.y.value)
    }

    pub fn confidence(&self) -> f32 {
        self.target.confidence
    }
}

/// Render-side shape payload.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerShape {
    Box,
    Point,
    Skeleton { keypoints: Vec<SmoothedKeypoint> },
    /// Curves stored relative to the box centre so they follow the smoothed box.
    FaceMesh { offsets: Contours },
}

impl MarkerShape {
    fn from_detection(det: &RawDetection) -> Self {
        match &det.shape {
            Shape::Box => MarkerShape::Box,
            Shape::Point => MarkerShape::Point,
            Shape::Skeleton { keypoints } => MarkerShape::Skeleton {
                keypoints: keypoints.iter().copied().map(SmoothedKeypoint::at).collect(),
            },
            Shape::FaceMesh { contours } => MarkerShape::FaceMesh {
                offsets: relative_contours(contours, det.center),
            },
        }
    }

    pub fn kind(&self) -> ShapeKind {
        match self {
            MarkerShape::Box => ShapeKind::Box,
            MarkerShape::Point => ShapeKind::Point,
            MarkerShape::Skeleton { .. } => ShapeKind::Skeleton,
            MarkerShape::FaceMesh { .. } => ShapeKind::FaceMesh,
        }
    }
}

fn relative_contours(contours: &Contours, center: Point2) -> Contours {
    contours
        .iter()
        .map(|(name, points)| (name.clone(), points.iter().map(|p| *p - center).collect()))
        .collect()
}

/// Smoothed, render-ready state of one marker.
#[derive(Debug, Clone)]
pub struct TrackedMarker {
    pub id: String,
    pub source: MarkerSource,
    pub label: String,
    pub confidence: f32,
    pub x: FilterState,
    pub y: FilterState,
    pub w: FilterState,
    pub h: FilterState,
    /// Where the filters are heading: the latest observation, or a
    /// dead-reckoned position while the detector misses the marker.
    pub target: BBox,
    /// Latest box actually reported by a producer.
    pub observed: BBox,
    pub shape: MarkerShape,
    /// Running average, meters.
    pub distance: Option<f32>,
    pub speed_mps: Option<f32>,
    pub opacity: f32,
    pub target_opacity: f32,
    /// Matched in the most recent cycle.
    pub active: bool,
    pub last_seen: Instant,
    pub hits: u32,
    pub misses: u32,
    /// Normalized frame units per second.
    pub velocity: Point2,
}

impl TrackedMarker {
    pub fn spawn(id: String, source: MarkerSource, det: &RawDetection, frame: FrameSize, now: Instant) -> Self {
        let bbox = det.bbox();
        let mut marker = Self {
            id,
            source,
            label: det.label.clone(),
            confidence: det.confidence,
            x: FilterState::at(bbox.cx),
            y: FilterState::at(bbox.cy),
            w: FilterState::at(bbox.w),
            h: FilterState::at(bbox.h),
            target: bbox,
            observed: bbox,
            shape: MarkerShape::from_detection(det),
            distance: None,
            speed_mps: None,
            opacity: 0.0,
            target_opacity: 1.0,
            active: true,
            last_seen: now,
            hits: 1,
            misses: 0,
            velocity: Point2::default(),
        };
        marker.update_distance(det, frame);
        marker
    }

    /// Current smoothed box.
    pub fn bbox(&self) -> BBox {
        BBox::new(self.x.value, self.y.value, self.w.value, self.h.value)
    }

    /// Where the marker should be at `now` given its last observation and velocity.
    pub fn predicted(&self, now: Instant) -> BBox {
        let elapsed = now.saturating_duration_since(self.last_seen).as_secs_f32();
        self.observed.with_center(self.observed.center() + self.velocity * elapsed)
    }

    pub fn is_fading(&self) -> bool {
        self.target_opacity == 0.0
    }

    /// Apply a matched detection.
    pub fn observe(&mut self, det: &RawDetection, frame: FrameSize, velocity_blend: f32, now: Instant) {
        let bbox = det.bbox();
        let dt = now.saturating_duration_since(self.last_seen).as_secs_f32();
        if dt > 0.0 {
            let instant = (bbox.center() - self.observed.center()) * (1.0 / dt);
            if instant.is_finite() {
                self.velocity = self.velocity * (1.0 - velocity_blend) + instant * velocity_blend;
            }
        }

        if !det.label.is_empty() {
            self.label = det.label.clone();
        }
        self.confidence = det.confidence;
        self.target = bbox;
        self.observed = bbox;
        self.update_shape(det);
        self.update_distance(det, frame);
        self.update_speed(frame);

        if self.is_fading() {
            debug!("Marker {} reacquired", self.id);
        }
        self.target_opacity = 1.0;
        self.active = true;
        self.last_seen = now;
        self.hits = self.hits.saturating_add(1);
        self.misses = 0;
    }

    /// Dead-reckon the target from the last observation.
    pub fn extrapolate(&mut self, now: Instant) {
        let predicted = self.predicted(now);
        let delta = predicted.center() - self.target.center();
        self.target = predicted;
        if let MarkerShape::Skeleton { keypoints } = &mut self.shape {
            for kp in keypoints.iter_mut() {
                kp.target.x += delta.x;
                kp.target.y += delta.y;
            }
        }
        self.active = false;
    }

    pub fn begin_fade(&mut self) {
        if !self.is_fading() {
            debug!("Marker {} fading out after {} misses", self.id, self.misses);
        }
        self.target_opacity = 0.0;
        self.active = false;
    }

    /// Step every smoothed channel by `dt` seconds. `scale` is screen pixels
    /// per normalized unit on each axis.
    pub fn advance(&mut self, filters: &MarkerFilters, dt: f32, scale: Point2) {
        filters.position.step(&mut self.x, self.target.cx, dt, scale.x);
        filters.position.step(&mut self.y, self.target.cy, dt, scale.y);
        filters.size.step(&mut self.w, self.target.w, dt, scale.x);
        filters.size.step(&mut self.h, self.target.h, dt, scale.y);

        if let MarkerShape::Skeleton { keypoints } = &mut self.shape {
            for kp in keypoints.iter_mut() {
                filters.keypoints.step(&mut kp.x, kp.target.x, dt, scale.x);
                filters.keypoints.step(&mut kp.y, kp.target.y, dt, scale.y);
            }
        }
    }

    fn update_shape(&mut self, det: &RawDetection) {
        match (&mut self.shape, &det.shape) {
            (MarkerShape::Skeleton { keypoints }, Shape::Skeleton { keypoints: incoming })
                if keypoints.len() == incoming.len() =>
            {
                for (kp, target) in keypoints.iter_mut().zip(incoming) {
                    kp.target = *target;
                }
            }
            (MarkerShape::FaceMesh { offsets }, Shape::FaceMesh { contours }) => {
                *offsets = relative_contours(contours, det.center);
            }
            (MarkerShape::Box, Shape::Box) | (MarkerShape::Point, Shape::Point) => {}
            _ => self.shape = MarkerShape::from_detection(det),
        }
    }

    fn update_distance(&mut self, det: &RawDetection, frame: FrameSize) {
        let sample = match det.distance_hint {
            Some(hint) => hint,
            None if frame.height > 0.0 && det.bbox().h > 0.0 => {
                estimate_distance(det.bbox().h * frame.height, &det.label, frame.height)
            }
            None => return,
        };
        self.distance = Some(match self.distance {
            Some(previous) => previous * DISTANCE_KEEP + sample * (1.0 - DISTANCE_KEEP),
            None => sample,
        });
    }

    fn update_speed(&mut self, frame: FrameSize) {
        if !frame.is_known() {
            return;
        }
        if let Some(distance) = self.distance {
            let px_per_sec = Point2::new(self.velocity.x * frame.width, self.velocity.y * frame.height).length();
            self.speed_mps = Some(ground_speed(px_per_sec, distance, frame.height));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn person(x: f32) -> RawDetection {
        RawDetection::boxed("person", x, 0.5, 0.1, 0.2, 0.9)
    }

    #[test]
    fn test_spawn_starts_invisible_at_detection() {
        let now = Instant::now();
        let m = TrackedMarker::spawn("a".into(), MarkerSource::Detector, &person(0.5), FrameSize::new(1280, 720), now);
        assert_eq!(m.opacity, 0.0);
        assert_eq!(m.target_opacity, 1.0);
        assert_eq!(m.bbox(), BBox::new(0.5, 0.5, 0.1, 0.2));
        // 0.2 * 720 = 144px tall person
        assert!((m.distance.unwrap() - 10.2).abs() < 0.01);
    }

    #[test]
    fn test_observe_blends_velocity() {
        let t0 = Instant::now();
        let frame = FrameSize::new(1280, 720);
        let mut m = TrackedMarker::spawn("a".into(), MarkerSource::Detector, &person(0.5), frame, t0);
        m.observe(&person(0.6), frame, 0.3, t0 + Duration::from_millis(500));

        // 0.1 over 0.5s = 0.2/s, blended at 0.3
        assert!((m.velocity.x - 0.06).abs() < 1e-4);
        assert_eq!(m.velocity.y, 0.0);
        assert_eq!(m.hits, 2);
        assert!(m.speed_mps.unwrap() > 0.0);
    }

    #[test]
    fn test_extrapolate_follows_velocity() {
        let t0 = Instant::now();
        let mut m = TrackedMarker::spawn("a".into(), MarkerSource::Detector, &person(0.5), FrameSize::default(), t0);
        m.velocity = Point2::new(0.2, 0.0);
        m.extrapolate(t0 + Duration::from_millis(250));
        assert!((m.target.cx - 0.55).abs() < 1e-4);
        assert!(!m.active);
        assert!(m.distance.is_none());
    }

    #[test]
    fn test_keypoint_count_change_replaces_skeleton() {
        let t0 = Instant::now();
        let skeleton = |n: usize| {
            person(0.5).with_shape(Shape::Skeleton {
                keypoints: (0..n).map(|i| Keypoint::new(0.5, 0.4 + i as f32 * 0.01, 0.9)).collect(),
            })
        };
        let mut m = TrackedMarker::spawn("a".into(), MarkerSource::Detector, &skeleton(3), FrameSize::default(), t0);
        m.observe(&skeleton(5), FrameSize::default(), 0.3, t0);
        match &m.shape {
            MarkerShape::Skeleton { keypoints } => assert_eq!(keypoints.len(), 5),
            other => panic!("unexpected shape {:?}", other),
        }
    }
}
