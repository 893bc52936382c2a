use std::time::Instant;

use iced_custom as iced;
use iced::keyboard;
use iced::Size;

use crate::detection::DetectionReply;

#[derive(Debug, Clone)]
pub enum Message {
    /// One display frame (vsync paced).
    Tick(Instant),
    DetectionFinished(DetectionReply),
    Resized(Size),
    KeyPressed(keyboard::Key, keyboard::Modifiers),
    /// Simulated orientation sensor reading is due.
    OrientationTick(Instant),
    ExternalMarkersLoaded(Result<String, String>),
    ExportDebugLogs,
    SaveSettings,
    Quit,
}
