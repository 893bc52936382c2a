use serde::{Deserialize, Serialize};

use super::surface::Rgba;

/// Visual filter mode. Only colours change between modes, never geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeMode {
    #[default]
    Normal,
    Night,
    Thermal,
    Machine,
    Wireframe,
}

impl ThemeMode {
    pub const ALL: [ThemeMode; 5] = [
        ThemeMode::Normal,
        ThemeMode::Night,
        ThemeMode::Thermal,
        ThemeMode::Machine,
        ThemeMode::Wireframe,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "normal" | "default" => Some(ThemeMode::Normal),
            "night" | "night_vision" => Some(ThemeMode::Night),
            "thermal" => Some(ThemeMode::Thermal),
            "machine" => Some(ThemeMode::Machine),
            "wireframe" => Some(ThemeMode::Wireframe),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ThemeMode::Normal => "normal",
            ThemeMode::Night => "night",
            ThemeMode::Thermal => "thermal",
            ThemeMode::Machine => "machine",
            ThemeMode::Wireframe => "wireframe",
        }
    }

    /// The following mode, wrapping around.
    pub fn next(&self) -> Self {
        let index = Self::ALL.iter().position(|m| m == self).unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }
}

// Same ordering as the YOLO category colours
const CATEGORY_COLORS: [[f32; 3]; 12] = [
    [0.000, 0.447, 0.741], [0.850, 0.325, 0.098], [0.929, 0.694, 0.125],
    [0.494, 0.184, 0.556], [0.466, 0.674, 0.188], [0.301, 0.745, 0.933],
    [0.635, 0.078, 0.184], [1.000, 0.500, 0.000], [0.000, 1.000, 0.000],
    [0.667, 0.000, 1.000], [1.000, 1.000, 0.000], [0.000, 0.667, 1.000],
];

/// Stable per-label bucket (FNV-1a over the lowercase label).
fn label_bucket(label: &str) -> u64 {
    label
        .trim()
        .bytes()
        .map(|b| b.to_ascii_lowercase())
        .fold(0xcbf2_9ce4_8422_2325u64, |hash, b| (hash ^ b as u64).wrapping_mul(0x0100_0000_01b3))
}

fn category_color(label: &str) -> Rgba {
    let rgb = CATEGORY_COLORS[(label_bucket(label) % CATEGORY_COLORS.len() as u64) as usize];
    Rgba::rgb(rgb[0], rgb[1], rgb[2])
}

/// Black, red, orange, yellow, white.
fn heat(t: f32) -> Rgba {
    let t = t.clamp(0.0, 1.0);
    if t < 0.33 {
        Rgba::rgb(0.4 + t * 1.8, 0.0, 0.2 * (1.0 - t))
    } else if t < 0.66 {
        Rgba::rgb(1.0, (t - 0.33) * 2.4, 0.0)
    } else {
        Rgba::rgb(1.0, 0.8 + (t - 0.66) * 0.6, (t - 0.66) * 2.9)
    }
}

/// Colours for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Palette {
    pub mode: ThemeMode,
    pub text: Rgba,
    pub plate: Rgba,
    pub joint: Rgba,
    pub horizon: Rgba,
    pub grid: Rgba,
    pub telemetry: Rgba,
}

impl Palette {
    pub fn for_mode(mode: ThemeMode) -> Self {
        match mode {
            ThemeMode::Normal => Self {
                mode,
                text: Rgba::WHITE,
                plate: Rgba::rgba(0.0, 0.0, 0.0, 0.7),
                joint: Rgba::rgb(1.0, 1.0, 0.0),
                horizon: Rgba::rgba(0.3, 1.0, 0.5, 0.8),
                grid: Rgba::rgba(1.0, 1.0, 1.0, 0.25),
                telemetry: Rgba::rgba(1.0, 1.0, 0.0, 0.8),
            },
            ThemeMode::Night => Self {
                mode,
                text: Rgba::rgb(0.7, 1.0, 0.7),
                plate: Rgba::rgba(0.0, 0.12, 0.0, 0.7),
                joint: Rgba::rgb(0.8, 1.0, 0.8),
                horizon: Rgba::rgba(0.2, 0.9, 0.3, 0.8),
                grid: Rgba::rgba(0.2, 0.8, 0.3, 0.25),
                telemetry: Rgba::rgba(0.5, 1.0, 0.5, 0.9),
            },
            ThemeMode::Thermal => Self {
                mode,
                text: Rgba::WHITE,
                plate: Rgba::rgba(0.15, 0.0, 0.2, 0.7),
                joint: Rgba::rgb(1.0, 1.0, 0.8),
                horizon: Rgba::rgba(1.0, 0.6, 0.0, 0.8),
                grid: Rgba::rgba(0.6, 0.1, 0.6, 0.3),
                telemetry: Rgba::rgba(1.0, 0.8, 0.3, 0.9),
            },
            ThemeMode::Machine => Self {
                mode,
                text: Rgba::rgb(1.0, 0.75, 0.0),
                plate: Rgba::rgba(0.0, 0.05, 0.1, 0.75),
                joint: Rgba::rgb(1.0, 0.2, 0.2),
                horizon: Rgba::rgba(0.0, 0.9, 1.0, 0.8),
                grid: Rgba::rgba(0.0, 0.9, 1.0, 0.25),
                telemetry: Rgba::rgba(0.0, 0.9, 1.0, 0.9),
            },
            ThemeMode::Wireframe => Self {
                mode,
                text: Rgba::WHITE,
                plate: Rgba::rgba(0.0, 0.0, 0.0, 0.4),
                joint: Rgba::WHITE,
                horizon: Rgba::rgba(1.0, 1.0, 1.0, 0.6),
                grid: Rgba::rgba(1.0, 1.0, 1.0, 0.2),
                telemetry: Rgba::rgba(1.0, 1.0, 1.0, 0.8),
            },
        }
    }

    /// Stroke colour for a marker with this label.
    pub fn marker_color(&self, label: &str) -> Rgba {
        match self.mode {
            ThemeMode::Normal => category_color(label),
            ThemeMode::Night => Rgba::rgb(0.25, 1.0, 0.35),
            ThemeMode::Thermal => heat(0.45 + (label_bucket(label) % 50) as f32 / 100.0),
            ThemeMode::Machine => Rgba::rgb(0.0, 0.9, 1.0),
            ThemeMode::Wireframe => Rgba::WHITE,
        }
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::for_mode(ThemeMode::Normal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_theme_cycle_wraps() {
        let mut mode = ThemeMode::Normal;
        for _ in 0..ThemeMode::ALL.len() {
            mode = mode.next();
        }
        assert_eq!(mode, ThemeMode::Normal);
        assert_eq!(ThemeMode::from_name("Thermal"), Some(ThemeMode::Thermal));
        assert_eq!(ThemeMode::from_name("sepia"), None);
    }

    #[test]
    fn test_label_colors_are_stable() {
        let palette = Palette::for_mode(ThemeMode::Normal);
        assert_eq!(palette.marker_color("person"), palette.marker_color("Person"));
        assert_eq!(Palette::for_mode(ThemeMode::Wireframe).marker_color("car"), Rgba::WHITE);
    }
}
