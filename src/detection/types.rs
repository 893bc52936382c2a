use std::collections::BTreeMap;
use std::time::Instant;

use crate::geometry::{BBox, Point2};

use super::DetectionError;

/// Named facial curves (silhouette, eyes, brows, lips, nose) in normalized
/// frame coordinates.
pub type Contours = BTreeMap<String, Vec<Point2>>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }

    pub fn position(&self) -> Point2 {
        Point2::new(self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    Box,
    Skeleton,
    FaceMesh,
    Point,
}

impl ShapeKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "box" | "bbox" | "rect" => Some(ShapeKind::Box),
            "skeleton" | "pose" => Some(ShapeKind::Skeleton),
            "face_mesh" | "facemesh" | "face" => Some(ShapeKind::FaceMesh),
            "point" | "dot" => Some(ShapeKind::Point),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ShapeKind::Box => "box",
            ShapeKind::Skeleton => "skeleton",
            ShapeKind::FaceMesh => "face_mesh",
            ShapeKind::Point => "point",
        }
    }
}

/// What a detection draws as. Each variant carries only its own payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Box,
    Point,
    Skeleton { keypoints: Vec<Keypoint> },
    FaceMesh { contours: Contours },
}

impl Shape {
    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::Box => ShapeKind::Box,
            Shape::Point => ShapeKind::Point,
            Shape::Skeleton { .. } => ShapeKind::Skeleton,
            Shape::FaceMesh { .. } => ShapeKind::FaceMesh,
        }
    }
}

/// One detector output for one cycle, in normalized frame coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    /// Stable identity carried by the detector, if it has one.
    pub id: Option<String>,
    pub label: String,
    pub center: Point2,
    /// Width and height; absent for bare points.
    pub size: Option<(f32, f32)>,
    pub shape: Shape,
    pub confidence: f32,
    /// Real-world distance supplied by the detector, meters.
    pub distance_hint: Option<f32>,
}

impl RawDetection {
    /// A box detection centred on `(x, y)`.
    pub fn boxed(label: &str, x: f32, y: f32, w: f32, h: f32, confidence: f32) -> Self {
        Self {
            id: None,
            label: label.to_string(),
            center: Point2::new(x, y),
            size: Some((w, h)),
            shape: Shape::Box,
            confidence,
            distance_hint: None,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_distance(mut self, meters: f32) -> Self {
        self.distance_hint = Some(meters);
        self
    }

    /// Bounding box, falling back to the extent of the shape payload.
    pub fn bbox(&self) -> BBox {
        if let Some((w, h)) = self.size {
            return BBox::new(self.center.x, self.center.y, w, h);
        }
        let extent = match &self.shape {
            Shape::Skeleton { keypoints } => BBox::enclosing(keypoints.iter().map(Keypoint::position)),
            Shape::FaceMesh { contours } => BBox::enclosing(contours.values().flatten().copied()),
            Shape::Box | Shape::Point => None,
        };
        match extent {
            Some(extent) => extent.with_center(self.center),
            None => BBox::new(self.center.x, self.center.y, 0.0, 0.0),
        }
    }

    /// Checks that every number is usable. Confidence outside `[0, 1]` is
    /// clamped rather than rejected.
    pub fn validate(mut self) -> Result<Self, DetectionError> {
        if !self.center.x.is_finite() {
            return Err(DetectionError::NotFinite("x"));
        }
        if !self.center.y.is_finite() {
            return Err(DetectionError::NotFinite("y"));
        }
        if let Some((w, h)) = self.size {
            if !w.is_finite() {
                return Err(DetectionError::NotFinite("width"));
            }
            if !h.is_finite() {
                return Err(DetectionError::NotFinite("height"));
            }
            if w < 0.0 {
                return Err(DetectionError::Negative { field: "width", value: w });
            }
            if h < 0.0 {
                return Err(DetectionError::Negative { field: "height", value: h });
            }
        }
        if !self.confidence.is_finite() {
            return Err(DetectionError::NotFinite("confidence"));
        }
        self.confidence = self.confidence.clamp(0.0, 1.0);
        if let Some(distance) = self.distance_hint {
            if !distance.is_finite() || distance <= 0.0 {
                self.distance_hint = None;
            }
        }

        match &mut self.shape {
            Shape::Skeleton { keypoints } => {
                if keypoints.is_empty() {
                    return Err(DetectionError::EmptyShape("skeleton"));
                }
                for kp in keypoints.iter_mut() {
                    if !kp.x.is_finite() || !kp.y.is_finite() {
                        // Keep indices stable for the joint topology
                        kp.confidence = 0.0;
                        kp.x = self.center.x;
                        kp.y = self.center.y;
                    }
                    kp.confidence = if kp.confidence.is_finite() { kp.confidence.clamp(0.0, 1.0) } else { 0.0 };
                }
            }
            Shape::FaceMesh { contours } => {
                contours.retain(|_, points| {
                    points.retain(Point2::is_finite);
                    points.len() >= 2
                });
                if contours.is_empty() {
                    return Err(DetectionError::EmptyShape("face_mesh"));
                }
            }
            Shape::Box | Shape::Point => {}
        }

        Ok(self)
    }
}

/// All detections from one detector cycle.
#[derive(Debug, Clone)]
pub struct DetectionBatch {
    pub frame_width: u32,
    pub frame_height: u32,
    pub detections: Vec<RawDetection>,
    pub captured_at: Instant,
}

impl DetectionBatch {
    pub fn new(frame_width: u32, frame_height: u32, detections: Vec<RawDetection>, captured_at: Instant) -> Self {
        Self {
            frame_width,
            frame_height,
            detections,
            captured_at,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}
