//! Monocular distance heuristic.
//!
//! Estimates range from how tall a detection appears, assuming a typical
//! real-world height per label and a fixed ~45 degree vertical field of view.
//! This is a visual cue for the HUD, not a calibrated measurement: it is off
//! whenever the object is unusually sized, partially visible or the camera
//! optics differ from the assumption. It never fails, it only approximates.

/// focal length in pixels = frame height x this factor (about 45 degrees vertical FOV)
pub const FOCAL_FACTOR: f32 = 1.2;

pub const DEFAULT_OBJECT_HEIGHT_M: f32 = 1.0;

/// Smallest pixel height used in the division; keeps tiny boxes finite.
const MIN_PIXEL_HEIGHT: f32 = 1.0;

/// Upper bound on reported distance, meters.
pub const MAX_DISTANCE_M: f32 = 500.0;

const KNOWN_HEIGHTS: &[(&str, f32)] = &[
    ("person", 1.7),
    ("face", 0.24),
    ("car", 1.5),
    ("truck", 3.0),
    ("bus", 3.2),
    ("bicycle", 1.1),
    ("motorcycle", 1.2),
    ("dog", 0.6),
    ("cat", 0.3),
    ("chair", 0.9),
    ("bottle", 0.25),
    ("cup", 0.12),
    ("laptop", 0.25),
    ("tv", 0.6),
    ("traffic light", 0.9),
    ("stop sign", 0.75),
];

/// Assumed real-world height for `label`, meters.
pub fn assumed_height(label: &str) -> f32 {
    let label = label.trim();
    KNOWN_HEIGHTS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(label))
        .map(|(_, height)| *height)
        .unwrap_or(DEFAULT_OBJECT_HEIGHT_M)
}

pub fn focal_length_px(frame_height_px: f32) -> f32 {
    frame_height_px * FOCAL_FACTOR
}

/// Estimated distance in meters for a box `pixel_height` tall in a frame
/// `frame_height_px` tall.
pub fn estimate_distance(pixel_height: f32, label: &str, frame_height_px: f32) -> f32 {
    let pixel_height = if pixel_height.is_finite() {
        pixel_height.max(MIN_PIXEL_HEIGHT)
    } else {
        MIN_PIXEL_HEIGHT
    };
    let distance = assumed_height(label) * focal_length_px(frame_height_px.max(0.0)) / pixel_height;
    distance.min(MAX_DISTANCE_M)
}

/// Real-world speed (m/s) of something moving `px_per_sec` on screen at `distance_m`.
pub fn ground_speed(px_per_sec: f32, distance_m: f32, frame_height_px: f32) -> f32 {
    let focal = focal_length_px(frame_height_px);
    if focal <= 0.0 {
        return 0.0;
    }
    px_per_sec.abs() * distance_m / focal
}
