use log::debug;

use iced_custom as iced;
use iced::keyboard::{self, key::Named, Key};

use crate::pipeline::HudCommand;

/// What a key press asks the app to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum KeyAction {
    Command(HudCommand),
    ExportDebugLogs,
    SaveSettings,
    Quit,
}

// Helper function to check for the platform-appropriate modifier key
fn is_platform_modifier(modifiers: &keyboard::Modifiers) -> bool {
    #[cfg(target_os = "macos")]
    return modifiers.logo(); // Use Command key on macOS

    #[cfg(not(target_os = "macos"))]
    return modifiers.control(); // Use Control key on other platforms
}

pub(crate) fn action_for_key(key: &keyboard::Key, modifiers: keyboard::Modifiers) -> Option<KeyAction> {
    if is_platform_modifier(&modifiers) {
        return match key.as_ref() {
            Key::Character("s") => {
                debug!("Save settings shortcut pressed");
                Some(KeyAction::SaveSettings)
            }
            Key::Character("l") => {
                debug!("Export logs shortcut pressed");
                Some(KeyAction::ExportDebugLogs)
            }
            Key::Character("q") => Some(KeyAction::Quit),
            _ => None,
        };
    }

    let command = match key.as_ref() {
        Key::Named(Named::Escape) => return Some(KeyAction::Quit),
        Key::Character("+") | Key::Character("=") => HudCommand::ZoomIn,
        Key::Character("-") => HudCommand::ZoomOut,
        Key::Character("0") => HudCommand::Zoom(1.0),
        Key::Character("f") | Key::Character("F") => HudCommand::NextFilter,
        Key::Character("s") | Key::Character("S") => HudCommand::Stereo(None),
        Key::Character("g") | Key::Character("G") => HudCommand::Grid(None),
        Key::Character("r") | Key::Character("R") => HudCommand::Resync,
        _ => return None,
    };
    debug!("Key {:?} -> {:?}", key, command);
    Some(KeyAction::Command(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(c: &str) -> Option<KeyAction> {
        action_for_key(&Key::Character(c.into()), keyboard::Modifiers::empty())
    }

    #[test]
    fn test_plain_keys_map_to_hud_commands() {
        assert_eq!(press("f"), Some(KeyAction::Command(HudCommand::NextFilter)));
        assert_eq!(press("="), Some(KeyAction::Command(HudCommand::ZoomIn)));
        assert_eq!(press("s"), Some(KeyAction::Command(HudCommand::Stereo(None))));
        assert_eq!(press("x"), None);
        assert_eq!(
            action_for_key(&Key::Named(Named::Escape), keyboard::Modifiers::empty()),
            Some(KeyAction::Quit)
        );
    }

    #[test]
    fn test_modifier_shortcuts() {
        #[cfg(target_os = "macos")]
        let modifier = keyboard::Modifiers::LOGO;
        #[cfg(not(target_os = "macos"))]
        let modifier = keyboard::Modifiers::CTRL;

        assert_eq!(action_for_key(&Key::Character("s".into()), modifier), Some(KeyAction::SaveSettings));
        assert_eq!(action_for_key(&Key::Character("l".into()), modifier), Some(KeyAction::ExportDebugLogs));
        assert_eq!(action_for_key(&Key::Character("f".into()), modifier), None);
    }
}
