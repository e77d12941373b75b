//! Top-level screen state.
//!
//! ```text
//! home -> (welcome -> device_mode)? -> loading -> home (with player)
//!                                         \-> error --retry--> loading
//! ```
//!
//! Rendering is up to the host; this is only the tagged state it renders.

use serde::{Deserialize, Serialize};

/// How this device treats persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceMode {
    /// The listener's own device; decrypted audio is cached.
    Personal,
    /// A borrowed or public device; nothing is persisted.
    Shared,
}

impl DeviceMode {
    pub fn allows_persistence(&self) -> bool {
        matches!(self, DeviceMode::Personal)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "screen", rename_all = "snake_case")]
pub enum Screen {
    /// Idle, or showing the player for `playlist_id`.
    Home { playlist_id: Option<String> },
    /// First scan on a device with no mode chosen yet.
    Welcome,
    DeviceMode,
    Loading { playlist_id: Option<String> },
    /// A load failed. `message` is generic.
    Error { message: String },
}

impl Screen {
    pub fn home() -> Self {
        Screen::Home { playlist_id: None }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Screen::Home { .. } => "home",
            Screen::Welcome => "welcome",
            Screen::DeviceMode => "device_mode",
            Screen::Loading { .. } => "loading",
            Screen::Error { .. } => "error",
        }
    }

    pub fn has_player(&self) -> bool {
        matches!(
            self,
            Screen::Home {
                playlist_id: Some(_)
            }
        )
    }
}

impl Default for Screen {
    fn default() -> Self {
        Screen::home()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screen_names() {
        assert_eq!(Screen::default().as_str(), "home");
        assert_eq!(Screen::DeviceMode.as_str(), "device_mode");
        assert!(!Screen::home().has_player());
        assert!(Screen::Home {
            playlist_id: Some("Qm1".into())
        }
        .has_player());
    }

    #[test]
    fn test_device_mode_persistence() {
        assert!(DeviceMode::Personal.allows_persistence());
        assert!(!DeviceMode::Shared.allows_persistence());
    }
}
