//! HUD drawing: markers, reference overlays and telemetry emitted as
//! backend-neutral commands.

pub mod hud;
pub mod overlays;
pub mod palette;
pub mod shapes;
pub mod skeleton;
pub mod surface;

pub use hud::{FrameStats, HudRenderer, HudView, RenderConfig, RenderOutcome, ScreenMapper};
pub use palette::{Palette, ThemeMode};
pub use surface::{DrawCommand, DrawList, Rect, Rgba, Surface, TextAnchor, Viewport};
