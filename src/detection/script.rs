//! Replays detections recorded in a JSON file.
//!
//! The file is an array of batches in the wire format accepted by
//! [`super::wire::parse_batch_value`]. Each detector call returns the next batch and
//! the script loops at the end.

use std::fs;
use std::path::Path;
use std::time::Instant;

use log::{info, warn};

use super::detector::{Detector, DetectorContext, Frame};
use super::types::RawDetection;
use super::wire;
use super::DetectorError;

#[derive(Debug, Clone)]
pub struct ScriptedDetector {
    name: String,
    frames: Vec<Vec<RawDetection>>,
    cursor: usize,
}

impl ScriptedDetector {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read detection script {}: {}", path.display(), e))?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "script".to_string());
        let detector = Self::from_json(&name, &content)?;
        info!("Loaded detection script {} ({} frames)", path.display(), detector.len());
        Ok(detector)
    }

    pub fn from_json(name: &str, json: &str) -> Result<Self, String> {
        let batches: Vec<serde_json::Value> =
            serde_json::from_str(json).map_err(|e| format!("Detection script is not a JSON array: {}", e))?;

        let mut frames = Vec::with_capacity(batches.len());
        for (index, batch) in batches.into_iter().enumerate() {
            match wire::parse_batch_value(batch, Instant::now()) {
                Ok(parsed) => frames.push(parsed.batch.detections),
                Err(e) => {
                    warn!("Skipping script frame #{}: {}", index, e);
                }
            }
        }
        if frames.is_empty() {
            return Err("Detection script has no usable frames".to_string());
        }

        Ok(Self {
            name: name.to_string(),
            frames,
            cursor: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Detector for ScriptedDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, ctx: &mut DetectorContext) -> Result<(), DetectorError> {
        ctx.model = format!("script:{}", self.name);
        self.cursor = 0;
        Ok(())
    }

    fn detect(&mut self, _ctx: &mut DetectorContext, _frame: &Frame) -> Result<Vec<RawDetection>, DetectorError> {
        let frame = self
            .frames
            .get(self.cursor)
            .cloned()
            .ok_or_else(|| DetectorError::Failed("script is empty".to_string()))?;
        self.cursor = (self.cursor + 1) % self.frames.len();
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"[
        {"detections": [{"id": "a", "label": "person", "x": 0.5, "y": 0.5, "w": 0.1, "h": 0.3}]},
        "not a batch",
        {"frame_width": 100, "frame_height": 100, "units": "pixels",
         "detections": [{"label": "car", "x": 50, "y": 20, "w": 10, "h": 10}, {"label": "bad"}]}
    ]"#;

    #[test]
    fn test_script_cycles_through_frames() {
        let mut detector = ScriptedDetector::from_json("test", SCRIPT).unwrap();
        assert_eq!(detector.len(), 2);

        let mut ctx = DetectorContext::default();
        detector.init(&mut ctx).unwrap();
        assert_eq!(ctx.model, "script:test");

        let frame = Frame::new(4, 4);
        let first = detector.detect(&mut ctx, &frame).unwrap();
        assert_eq!(first[0].id.as_deref(), Some("a"));

        let second = detector.detect(&mut ctx, &frame).unwrap();
        assert_eq!(second.len(), 1);
        assert!((second[0].center.x - 0.5).abs() < 1e-6);
        assert!((second[0].center.y - 0.2).abs() < 1e-6);

        let third = detector.detect(&mut ctx, &frame).unwrap();
        assert_eq!(third, first);
    }

    #[test]
    fn test_empty_script_is_rejected() {
        assert!(ScriptedDetector::from_json("empty", "[]").is_err());
        assert!(ScriptedDetector::from_json("broken", "{").is_err());
    }
}
