use std::collections::HashMap;

use super::types::RawDetection;
use super::DetectorError;

/// A captured video frame handed to the detector by value.
pub type Frame = image::RgbaImage;

/// Per-worker state owned by the detection thread and passed into every
/// detector call. Replaces free-floating module state: models, caches and
/// counters live here and are released by `Detector::dispose`.
#[derive(Debug, Default)]
pub struct DetectorContext {
    pub frame_width: u32,
    pub frame_height: u32,
    /// Completed detection calls.
    pub cycles: u64,
    /// Name of the loaded model, for telemetry.
    pub model: String,
    /// Scratch values a detector keeps between calls.
    pub cache: HashMap<String, f32>,
    initialized: bool,
}

impl DetectorContext {
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub(crate) fn mark_initialized(&mut self) {
        self.initialized = true;
    }

    pub(crate) fn release(&mut self) {
        self.cache.clear();
        self.initialized = false;
    }
}

/// The external detection capability: given an image, produce raw detections.
///
/// Implementations must not keep references to the frame beyond the call.
pub trait Detector: Send {
    fn name(&self) -> &str;

    fn init(&mut self, _ctx: &mut DetectorContext) -> Result<(), DetectorError> {
        Ok(())
    }

    fn detect(&mut self, ctx: &mut DetectorContext, frame: &Frame) -> Result<Vec<RawDetection>, DetectorError>;

    fn dispose(&mut self, _ctx: &mut DetectorContext) {}
}
