//! JSON payloads from the detector or a remote assistant.
//!
//! Field names vary between producers (`w`/`width`, `score`/`confidence`,
//! keypoints as objects, contour points as objects or pairs), so each entry is
//! decoded on its own and converted into a typed [`RawDetection`]. A malformed
//! entry is dropped with a warning; the rest of the batch survives.

use std::collections::BTreeMap;
use std::time::Instant;

use log::{trace, warn};
use serde::Deserialize;

use crate::geometry::Point2;

use super::types::{Contours, DetectionBatch, Keypoint, RawDetection, Shape, ShapeKind};
use super::DetectionError;

/// Confidence assumed when a producer omits it.
const DEFAULT_CONFIDENCE: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateSpace {
    Normalized,
    Pixels,
}

impl CoordinateSpace {
    fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "normalized" | "relative" | "" => Some(CoordinateSpace::Normalized),
            "pixels" | "px" | "pixel" => Some(CoordinateSpace::Pixels),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireBatch {
    #[serde(default)]
    frame_width: Option<u32>,
    #[serde(default)]
    frame_height: Option<u32>,
    #[serde(default)]
    units: Option<String>,
    #[serde(default)]
    detections: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct WireDetection {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default, alias = "class", alias = "name")]
    label: Option<String>,
    #[serde(default)]
    x: Option<f32>,
    #[serde(default)]
    y: Option<f32>,
    #[serde(default, alias = "w")]
    width: Option<f32>,
    #[serde(default, alias = "h")]
    height: Option<f32>,
    #[serde(default, alias = "type")]
    shape: Option<String>,
    #[serde(default)]
    keypoints: Option<Vec<WireKeypoint>>,
    #[serde(default)]
    contours: Option<BTreeMap<String, Vec<WirePoint>>>,
    #[serde(default, alias = "score")]
    confidence: Option<f32>,
    #[serde(default)]
    distance: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct WireKeypoint {
    x: f32,
    y: f32,
    #[serde(default, alias = "score")]
    confidence: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WirePoint {
    Object { x: f32, y: f32 },
    Pair([f32; 2]),
}

impl WirePoint {
    fn point(&self) -> Point2 {
        match self {
            WirePoint::Object { x, y } => Point2::new(*x, *y),
            WirePoint::Pair([x, y]) => Point2::new(*x, *y),
        }
    }
}

/// Maps producer coordinates into normalized frame space.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    space: CoordinateSpace,
    frame_width: f32,
    frame_height: f32,
}

impl Normalizer {
    pub fn new(space: CoordinateSpace, frame_width: u32, frame_height: u32) -> Result<Self, DetectionError> {
        if space == CoordinateSpace::Pixels && (frame_width == 0 || frame_height == 0) {
            return Err(DetectionError::MissingFrameSize);
        }
        Ok(Self {
            space,
            frame_width: frame_width as f32,
            frame_height: frame_height as f32,
        })
    }

    fn x(&self, v: f32) -> f32 {
        match self.space {
            CoordinateSpace::Normalized => v,
            CoordinateSpace::Pixels => v / self.frame_width,
        }
    }

    fn y(&self, v: f32) -> f32 {
        match self.space {
            CoordinateSpace::Normalized => v,
            CoordinateSpace::Pixels => v / self.frame_height,
        }
    }

    fn point(&self, p: Point2) -> Point2 {
        Point2::new(self.x(p.x), self.y(p.y))
    }
}

fn id_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl WireDetection {
    fn into_detection(self, norm: &Normalizer) -> Result<RawDetection, DetectionError> {
        let x = self.x.ok_or(DetectionError::MissingField("x"))?;
        let y = self.y.ok_or(DetectionError::MissingField("y"))?;

        let declared = match self.shape.as_deref() {
            Some(name) => Some(ShapeKind::from_name(name).ok_or_else(|| DetectionError::UnknownShape(name.to_string()))?),
            None => None,
        };

        let keypoints: Option<Vec<Keypoint>> = self.keypoints.map(|kps| {
            kps.into_iter()
                .map(|kp| Keypoint::new(norm.x(kp.x), norm.y(kp.y), kp.confidence.unwrap_or(DEFAULT_CONFIDENCE)))
                .collect()
        });
        let contours: Option<Contours> = self.contours.map(|curves| {
            curves
                .into_iter()
                .map(|(name, points)| (name, points.iter().map(|p| norm.point(p.point())).collect()))
                .collect()
        });

        let size = match (self.width, self.height) {
            (Some(w), Some(h)) => Some((norm.x(w), norm.y(h))),
            (None, None) => None,
            (Some(_), None) => return Err(DetectionError::MissingField("height")),
            (None, Some(_)) => return Err(DetectionError::MissingField("width")),
        };

        // Untagged payloads are classified by what they carry
        let kind = declared.unwrap_or(if keypoints.is_some() {
            ShapeKind::Skeleton
        } else if contours.is_some() {
            ShapeKind::FaceMesh
        } else if size.is_some() {
            ShapeKind::Box
        } else {
            ShapeKind::Point
        });

        let shape = match kind {
            ShapeKind::Box => {
                if size.is_none() {
                    return Err(DetectionError::MissingField("width"));
                }
                Shape::Box
            }
            ShapeKind::Point => Shape::Point,
            ShapeKind::Skeleton => Shape::Skeleton {
                keypoints: keypoints.ok_or(DetectionError::EmptyShape("skeleton"))?,
            },
            ShapeKind::FaceMesh => Shape::FaceMesh {
                contours: contours.ok_or(DetectionError::EmptyShape("face_mesh"))?,
            },
        };

        RawDetection {
            id: self.id.as_ref().and_then(id_string),
            label: self.label.unwrap_or_default().trim().to_string(),
            center: Point2::new(norm.x(x), norm.y(y)),
            size,
            shape,
            confidence: self.confidence.unwrap_or(DEFAULT_CONFIDENCE),
            distance_hint: self.distance,
        }
        .validate()
    }
}

/// Decode one detection object.
pub fn parse_detection(value: serde_json::Value, norm: &Normalizer) -> Result<RawDetection, DetectionError> {
    let wire: WireDetection = serde_json::from_value(value).map_err(|e| DetectionError::Json(e.to_string()))?;
    wire.into_detection(norm)
}

/// Result of decoding a batch: the usable detections and how many were dropped.
#[derive(Debug)]
pub struct ParsedBatch {
    pub batch: DetectionBatch,
    pub dropped: usize,
}

/// Decode a whole batch. Only an unreadable envelope fails; individual bad
/// entries are dropped.
pub fn parse_batch(json: &str, captured_at: Instant) -> Result<ParsedBatch, DetectionError> {
    let wire: WireBatch = serde_json::from_str(json).map_err(|e| DetectionError::Json(e.to_string()))?;
    decode_batch(wire, captured_at)
}

/// Same as [`parse_batch`] for a batch that is already a JSON value.
pub fn parse_batch_value(value: serde_json::Value, captured_at: Instant) -> Result<ParsedBatch, DetectionError> {
    let wire: WireBatch = serde_json::from_value(value).map_err(|e| DetectionError::Json(e.to_string()))?;
    decode_batch(wire, captured_at)
}

fn decode_batch(wire: WireBatch, captured_at: Instant) -> Result<ParsedBatch, DetectionError> {
    let space = match wire.units.as_deref() {
        Some(units) => CoordinateSpace::from_name(units).unwrap_or_else(|| {
            warn!("Unknown coordinate units '{}', assuming normalized", units);
            CoordinateSpace::Normalized
        }),
        None => CoordinateSpace::Normalized,
    };
    let frame_width = wire.frame_width.unwrap_or(0);
    let frame_height = wire.frame_height.unwrap_or(0);
    let norm = Normalizer::new(space, frame_width, frame_height)?;

    let total = wire.detections.len();
    let mut detections = Vec::with_capacity(total);
    for (index, value) in wire.detections.into_iter().enumerate() {
        match parse_detection(value, &norm) {
            Ok(det) => detections.push(det),
            Err(e) => warn!("Dropping malformed detection #{}: {}", index, e),
        }
    }
    let dropped = total - detections.len();
    trace!("Parsed detection batch: {} kept, {} dropped", detections.len(), dropped);

    Ok(ParsedBatch {
        batch: DetectionBatch::new(frame_width, frame_height, detections, captured_at),
        dropped,
    })
}

/// Decode a bare list of detections (the external marker feed).
pub fn parse_marker_list(json: &str) -> Result<Vec<RawDetection>, DetectionError> {
    let values: Vec<serde_json::Value> = serde_json::from_str(json).map_err(|e| DetectionError::Json(e.to_string()))?;
    let norm = Normalizer::new(CoordinateSpace::Normalized, 0, 0)?;
    Ok(values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match parse_detection(value, &norm) {
            Ok(det) => Some(det),
            Err(e) => {
                warn!("Dropping malformed external marker #{}: {}", index, e);
                None
            }
        })
        .collect())
}
