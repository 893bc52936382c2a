use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use log::{debug, info, warn, error};

use crate::config;
use crate::detection::scheduler::{DEFAULT_DETECTION_INTERVAL_MS, DEFAULT_WATCHDOG_MS};
use crate::motion::lerp;
use crate::motion::second_order;
use crate::motion::FilterKind;
use crate::orientation::{AnchorPolicy, DEFAULT_FOV_DEG, DEFAULT_ORIENTATION_SMOOTHING};
use crate::render::hud::{DEFAULT_CULL_MARGIN_PX, DEFAULT_IPD_PX, DEFAULT_KEYPOINT_CONFIDENCE, DEFAULT_VISIBILITY_THRESHOLD};
use crate::render::ThemeMode;
use crate::tracking::reconciler::{
    DEFAULT_EXTRAPOLATION_WINDOW_MS, DEFAULT_MAX_MISSES, DEFAULT_MAX_POINT_DISTANCE, DEFAULT_MIN_HITS, DEFAULT_MIN_IOU,
    DEFAULT_MIN_SPAWN_CONFIDENCE, DEFAULT_VELOCITY_BLEND,
};
use crate::tracking::store::{DEFAULT_FADE_EPSILON, DEFAULT_MAX_MISSING_MS, DEFAULT_OPACITY_RATE, DEFAULT_STALE_AFTER_MS};

/// User-specific settings that persist across sessions. Every field falls
/// back to its default when missing from the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    /// Horizontal field of view of the camera feed, degrees
    pub fov_deg: f32,
    /// Blend factor for incoming orientation samples
    pub orientation_smoothing: f32,
    /// "once" or "resync_on_detections"
    pub anchor_policy: String,

    /// "lerp" or "second_order"
    pub position_filter: String,
    pub spring_frequency: f32,
    pub spring_damping: f32,
    pub spring_response: f32,
    pub lerp_base_rate: f32,
    pub lerp_boost_per_px: f32,
    pub lerp_min_factor: f32,
    pub lerp_max_factor: f32,
    pub lerp_deadzone_px: f32,

    pub opacity_rate: f32,
    pub fade_epsilon: f32,
    pub visibility_threshold: f32,
    pub cull_margin_px: f32,
    pub stale_after_ms: u64,
    pub max_missing_ms: u64,
    pub extrapolation_window_ms: u64,
    pub min_hits: u32,
    pub max_misses: u32,
    pub min_iou: f32,
    pub max_point_distance: f32,
    pub min_spawn_confidence: f32,
    pub keypoint_confidence: f32,
    pub velocity_blend: f32,

    pub stereo: bool,
    pub ipd_px: f32,
    /// normal, night, thermal, machine or wireframe
    pub theme: String,
    pub reference_overlays: bool,
    pub tunnel: bool,
    pub show_telemetry: bool,

    pub detection_interval_ms: u64,
    pub watchdog_ms: u64,
    pub capture_width: u32,
    pub capture_height: u32,
    pub window_width: u32,
    pub window_height: u32,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            fov_deg: DEFAULT_FOV_DEG,
            orientation_smoothing: DEFAULT_ORIENTATION_SMOOTHING,
            anchor_policy: "once".to_string(),
            position_filter: "lerp".to_string(),
            spring_frequency: second_order::DEFAULT_FREQUENCY,
            spring_damping: second_order::DEFAULT_DAMPING,
            spring_response: second_order::DEFAULT_RESPONSE,
            lerp_base_rate: lerp::DEFAULT_BASE_RATE,
            lerp_boost_per_px: lerp::DEFAULT_BOOST_PER_PX,
            lerp_min_factor: lerp::DEFAULT_MIN_FACTOR,
            lerp_max_factor: lerp::DEFAULT_MAX_FACTOR,
            lerp_deadzone_px: lerp::DEFAULT_DEADZONE_PX,
            opacity_rate: DEFAULT_OPACITY_RATE,
            fade_epsilon: DEFAULT_FADE_EPSILON,
            visibility_threshold: DEFAULT_VISIBILITY_THRESHOLD,
            cull_margin_px: DEFAULT_CULL_MARGIN_PX,
            stale_after_ms: DEFAULT_STALE_AFTER_MS,
            max_missing_ms: DEFAULT_MAX_MISSING_MS,
            extrapolation_window_ms: DEFAULT_EXTRAPOLATION_WINDOW_MS,
            min_hits: DEFAULT_MIN_HITS,
            max_misses: DEFAULT_MAX_MISSES,
            min_iou: DEFAULT_MIN_IOU,
            max_point_distance: DEFAULT_MAX_POINT_DISTANCE,
            min_spawn_confidence: DEFAULT_MIN_SPAWN_CONFIDENCE,
            keypoint_confidence: DEFAULT_KEYPOINT_CONFIDENCE,
            velocity_blend: DEFAULT_VELOCITY_BLEND,
            stereo: false,
            ipd_px: DEFAULT_IPD_PX,
            theme: "normal".to_string(),
            reference_overlays: true,
            tunnel: true,
            show_telemetry: true,
            detection_interval_ms: DEFAULT_DETECTION_INTERVAL_MS,
            watchdog_ms: DEFAULT_WATCHDOG_MS,
            capture_width: config::DEFAULT_CAPTURE_WIDTH,
            capture_height: config::DEFAULT_CAPTURE_HEIGHT,
            window_width: config::DEFAULT_WINDOW_WIDTH,
            window_height: config::DEFAULT_WINDOW_HEIGHT,
        }
    }
}

/// Comment written above each key in a fresh settings file.
const FIELD_COMMENTS: &[(&str, &str)] = &[
    ("fov_deg", "Horizontal field of view of the camera feed, degrees"),
    ("orientation_smoothing", "Blend factor for orientation samples (0..1, higher follows faster)"),
    ("anchor_policy", "Orientation anchor: \"once\" (first reading, manual resync) or \"resync_on_detections\""),
    ("position_filter", "Marker smoothing: \"lerp\" (adaptive, with deadzone) or \"second_order\" (spring)"),
    ("spring_frequency", "Second-order filter natural frequency, Hz"),
    ("spring_damping", "Second-order filter damping ratio (1.0 = critically damped)"),
    ("spring_response", "Second-order filter initial response (0 = gentle start, >1 = overshoot)"),
    ("lerp_base_rate", "Adaptive LERP base factor per 60Hz frame"),
    ("lerp_boost_per_px", "Extra LERP factor per pixel of distance to the target"),
    ("lerp_min_factor", "Lower LERP factor bound"),
    ("lerp_max_factor", "Upper LERP factor bound"),
    ("lerp_deadzone_px", "Movements smaller than this many pixels are ignored"),
    ("opacity_rate", "Fraction of the opacity gap closed per frame"),
    ("fade_epsilon", "Fading markers below this opacity are deleted"),
    ("visibility_threshold", "Markers below this opacity are not drawn"),
    ("cull_margin_px", "Markers further than this outside the screen are not drawn"),
    ("stale_after_ms", "Markers unseen this long start fading even without new detections"),
    ("max_missing_ms", "Markers unseen this long are deleted"),
    ("extrapolation_window_ms", "How long an established marker is dead-reckoned after a miss"),
    ("min_hits", "Detections before a marker counts as established"),
    ("max_misses", "Consecutive misses tolerated before fading"),
    ("min_iou", "Minimum box overlap to re-identify a detection without an id"),
    ("max_point_distance", "Maximum centre distance (fraction of the frame) to re-identify a sizeless point"),
    ("min_spawn_confidence", "Detections below this confidence do not create markers"),
    ("keypoint_confidence", "Skeleton joints below this confidence are not drawn"),
    ("velocity_blend", "Weight of the newest velocity sample"),
    ("stereo", "Render two side-by-side viewports"),
    ("ipd_px", "Horizontal offset between the stereo viewports, pixels"),
    ("theme", "Colour mode: normal, night, thermal, machine or wireframe"),
    ("reference_overlays", "Draw horizon, pitch ladder and ground grid"),
    ("tunnel", "Draw the perspective tunnel behind box markers"),
    ("show_telemetry", "Show the FPS/latency block"),
    ("detection_interval_ms", "Minimum time between detector submissions"),
    ("watchdog_ms", "Clear a detector request that has not answered after this long"),
    ("capture_width", "Width of frames handed to the detector"),
    ("capture_height", "Height of frames handed to the detector"),
    ("window_width", "Initial window width"),
    ("window_height", "Initial window height"),
];

impl UserSettings {
    /// Get the path to the settings file
    /// On macOS: ~/Library/Application Support/ARHud/settings.yaml
    /// On Linux: ~/.config/ARHud/settings.yaml
    /// On Windows: C:\Users\<user>\AppData\Roaming\ARHud\settings.yaml
    pub fn settings_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."));

        config_dir.join("ARHud").join("settings.yaml")
    }

    /// Load settings from the YAML file
    /// If custom_path is provided, uses that path; otherwise uses the default settings path
    pub fn load(custom_path: Option<&str>) -> Self {
        let path = match custom_path {
            Some(p) => {
                info!("Using custom settings path: {}", p);
                PathBuf::from(p)
            }
            None => Self::settings_path(),
        };

        if !path.exists() {
            info!("Settings file not found at {:?}, using defaults", path);
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_yaml(&contents) {
                Ok(settings) => {
                    info!("Loaded settings from {:?}", path);
                    debug!("Settings: filter={}, anchor={}, theme={}, stereo={}",
                        settings.position_filter, settings.anchor_policy, settings.theme, settings.stereo);
                    settings
                }
                Err(e) => {
                    error!("Failed to parse settings file at {:?}: {}", path, e);
                    warn!("Using default settings");
                    Self::default()
                }
            },
            Err(e) => {
                error!("Failed to read settings file at {:?}: {}", path, e);
                warn!("Using default settings");
                Self::default()
            }
        }
    }

    pub fn from_yaml(contents: &str) -> Result<Self, String> {
        serde_yaml::from_str::<UserSettings>(contents).map_err(|e| e.to_string())
    }

    /// Save settings to the default path while preserving comments
    pub fn save(&self) -> Result<(), String> {
        self.save_to(&Self::settings_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .map_err(|e| format!("Failed to create settings directory: {}", e))?;
            }
        }

        // If file exists, try to preserve comments by doing in-place value updates
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(contents) => {
                    let updated = self.update_yaml_values(&contents);
                    fs::write(path, updated)
                        .map_err(|e| format!("Failed to write settings file: {}", e))?;
                    info!("Saved settings to {:?} (comments preserved)", path);
                    return Ok(());
                }
                Err(e) => {
                    warn!("Failed to read existing settings file for comment preservation: {}", e);
                }
            }
        }

        fs::write(path, self.to_yaml_with_comments())
            .map_err(|e| format!("Failed to write settings file: {}", e))?;

        info!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Every key with its YAML-formatted value, in file order.
    fn yaml_values(&self) -> Vec<(&'static str, String)> {
        let quoted = |s: &str| format!("\"{}\"", s);
        vec![
            ("fov_deg", self.fov_deg.to_string()),
            ("orientation_smoothing", self.orientation_smoothing.to_string()),
            ("anchor_policy", quoted(&self.anchor_policy)),
            ("position_filter", quoted(&self.position_filter)),
            ("spring_frequency", self.spring_frequency.to_string()),
            ("spring_damping", self.spring_damping.to_string()),
            ("spring_response", self.spring_response.to_string()),
            ("lerp_base_rate", self.lerp_base_rate.to_string()),
            ("lerp_boost_per_px", self.lerp_boost_per_px.to_string()),
            ("lerp_min_factor", self.lerp_min_factor.to_string()),
            ("lerp_max_factor", self.lerp_max_factor.to_string()),
            ("lerp_deadzone_px", self.lerp_deadzone_px.to_string()),
            ("opacity_rate", self.opacity_rate.to_string()),
            ("fade_epsilon", self.fade_epsilon.to_string()),
            ("visibility_threshold", self.visibility_threshold.to_string()),
            ("cull_margin_px", self.cull_margin_px.to_string()),
            ("stale_after_ms", self.stale_after_ms.to_string()),
            ("max_missing_ms", self.max_missing_ms.to_string()),
            ("extrapolation_window_ms", self.extrapolation_window_ms.to_string()),
            ("min_hits", self.min_hits.to_string()),
            ("max_misses", self.max_misses.to_string()),
            ("min_iou", self.min_iou.to_string()),
            ("max_point_distance", self.max_point_distance.to_string()),
            ("min_spawn_confidence", self.min_spawn_confidence.to_string()),
            ("keypoint_confidence", self.keypoint_confidence.to_string()),
            ("velocity_blend", self.velocity_blend.to_string()),
            ("stereo", self.stereo.to_string()),
            ("ipd_px", self.ipd_px.to_string()),
            ("theme", quoted(&self.theme)),
            ("reference_overlays", self.reference_overlays.to_string()),
            ("tunnel", self.tunnel.to_string()),
            ("show_telemetry", self.show_telemetry.to_string()),
            ("detection_interval_ms", self.detection_interval_ms.to_string()),
            ("watchdog_ms", self.watchdog_ms.to_string()),
            ("capture_width", self.capture_width.to_string()),
            ("capture_height", self.capture_height.to_string()),
            ("window_width", self.window_width.to_string()),
            ("window_height", self.window_height.to_string()),
        ]
    }

    /// Update YAML values while preserving existing comments and structure.
    /// Keys the file does not mention yet are appended with their comment.
    fn update_yaml_values(&self, yaml_content: &str) -> String {
        let mut yaml = yaml_content.to_string();
        let mut missing = Vec::new();
        for (key, value) in self.yaml_values() {
            if Self::has_yaml_key(&yaml, key) {
                yaml = Self::replace_yaml_value(&yaml, key, &value);
            } else {
                missing.push((key, value));
            }
        }

        if !missing.is_empty() {
            debug!("Appending {} settings missing from the file", missing.len());
            if !yaml.is_empty() && !yaml.ends_with('\n') {
                yaml.push('\n');
            }
            for (key, value) in missing {
                yaml.push('\n');
                if let Some((_, comment)) = FIELD_COMMENTS.iter().find(|(k, _)| *k == key) {
                    yaml.push_str(&format!("# {}\n", comment));
                }
                yaml.push_str(&format!("{}: {}\n", key, value));
            }
        }
        yaml
    }

    fn has_yaml_key(yaml: &str, key: &str) -> bool {
        let pattern = format!(r"(?m)^\s*{}\s*:", regex::escape(key));
        regex::Regex::new(&pattern).map(|re| re.is_match(yaml)).unwrap_or(false)
    }

    /// Replace a YAML key's value while preserving the rest of the line
    fn replace_yaml_value(yaml: &str, key: &str, new_value: &str) -> String {
        let pattern = format!(r"(?m)^(\s*{}\s*:\s*).*$", regex::escape(key));
        let replacement = format!("${{1}}{}", new_value);

        match regex::Regex::new(&pattern) {
            Ok(re) => re.replace_all(yaml, replacement.as_str()).to_string(),
            Err(e) => {
                warn!("Failed to create regex for key '{}': {}", key, e);
                yaml.to_string()
            }
        }
    }

    /// Generate YAML content with comments for new files
    fn to_yaml_with_comments(&self) -> String {
        let mut yaml = String::from(
            "# ARHud User Settings\n\
             # This file is loaded automatically when the application starts.\n\
             # Settings specified here override the default values.\n",
        );
        for (key, value) in self.yaml_values() {
            yaml.push('\n');
            if let Some((_, comment)) = FIELD_COMMENTS.iter().find(|(k, _)| *k == key) {
                yaml.push_str(&format!("# {}\n", comment));
            }
            yaml.push_str(&format!("{}: {}\n", key, value));
        }
        yaml
    }

    pub fn get_anchor_policy(&self) -> AnchorPolicy {
        AnchorPolicy::from_name(&self.anchor_policy).unwrap_or_else(|| {
            warn!("Unknown anchor policy '{}', defaulting to once", self.anchor_policy);
            AnchorPolicy::Once
        })
    }

    pub fn get_position_filter(&self) -> FilterKind {
        FilterKind::from_name(&self.position_filter).unwrap_or_else(|| {
            warn!("Unknown position filter '{}', defaulting to lerp", self.position_filter);
            FilterKind::Lerp
        })
    }

    pub fn get_theme(&self) -> ThemeMode {
        ThemeMode::from_name(&self.theme).unwrap_or_else(|| {
            warn!("Unknown theme '{}', defaulting to normal", self.theme);
            ThemeMode::Normal
        })
    }
}
