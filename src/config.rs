use once_cell::sync::{Lazy, OnceCell};
use crate::settings::UserSettings;

// Default values for configuration
// These serve as fallback values and can be used for "reset to defaults" functionality
pub const DEFAULT_WINDOW_WIDTH: u32 = 1280;
pub const DEFAULT_WINDOW_HEIGHT: u32 = 720;
pub const DEFAULT_CAPTURE_WIDTH: u32 = 640;
pub const DEFAULT_CAPTURE_HEIGHT: u32 = 360;
pub const DEFAULT_MAX_FRAME_DT_MS: u64 = 34;             // Frames longer than this are integrated as 34ms
pub const DEFAULT_ORIENTATION_INTERVAL_MS: u64 = 16;     // Simulated sensor rate (~60Hz)

/// Settings file passed on the command line. Must be set before `CONFIG` is
/// first read.
pub static SETTINGS_PATH: OnceCell<String> = OnceCell::new();

pub struct Config {
    pub window_width: u32,                  // Initial window width
    pub window_height: u32,                 // Initial window height
    pub capture_width: u32,                 // Size of frames handed to the detector
    pub capture_height: u32,
    pub max_frame_dt_ms: u64,               // Clamp on the per-frame integration step
    pub orientation_interval_ms: u64,       // Poll rate of the simulated orientation sensor
}

/// The settings file as read at startup, loaded once and shared by `CONFIG`
/// and the launch code.
pub static USER_SETTINGS: Lazy<UserSettings> =
    Lazy::new(|| UserSettings::load(SETTINGS_PATH.get().map(String::as_str)));

impl Config {
    pub fn from_settings(settings: &UserSettings) -> Self {
        Config {
            window_width: settings.window_width.max(1),
            window_height: settings.window_height.max(1),
            capture_width: settings.capture_width.max(1),
            capture_height: settings.capture_height.max(1),
            max_frame_dt_ms: DEFAULT_MAX_FRAME_DT_MS,
            orientation_interval_ms: DEFAULT_ORIENTATION_INTERVAL_MS,
        }
    }
}

pub static CONFIG: Lazy<Config> = Lazy::new(|| Config::from_settings(&USER_SETTINGS));
