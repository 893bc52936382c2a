//! Detection input: the data produced by the external detector, the JSON
//! boundary where loosely-typed payloads are validated, and the background
//! worker that runs a detector off the render thread.

pub mod detector;
pub mod scheduler;
pub mod script;
pub mod synthetic;
pub mod types;
pub mod wire;
pub mod worker;

use thiserror::Error;

pub use detector::{Detector, DetectorContext, Frame};
pub use scheduler::{DetectionScheduler, SchedulerConfig};
pub use types::{Contours, DetectionBatch, Keypoint, RawDetection, Shape, ShapeKind};
pub use worker::{DetectionOutcome, DetectionReply, DetectionTicket, DetectionWorker};

/// A single detection (or a whole payload) that failed validation.
#[derive(Debug, Error, PartialEq)]
pub enum DetectionError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("field `{0}` is not a finite number")]
    NotFinite(&'static str),
    #[error("field `{field}` is negative ({value})")]
    Negative { field: &'static str, value: f32 },
    #[error("unknown shape `{0}`")]
    UnknownShape(String),
    #[error("shape `{0}` is missing its payload")]
    EmptyShape(&'static str),
    #[error("pixel coordinates need a frame size")]
    MissingFrameSize,
    #[error("invalid JSON: {0}")]
    Json(String),
}

/// Failures inside the detector collaborator. Never fatal to the HUD: a
/// failed cycle is treated as a cycle without detections.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DetectorError {
    #[error("detector failed to initialize: {0}")]
    Init(String),
    #[error("detection failed: {0}")]
    Failed(String),
    #[error("detection worker is not running")]
    WorkerGone,
}
