//! Application settings management
//!
//! Handles user preferences and the remembered host address.

use crate::storage::BlobStore;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

/// Blob holding the preferences
pub const SETTINGS_FILE: &str = "settings.toml";

/// Blob holding the last host the user connected to
pub const ENDPOINT_FILE: &str = "endpoint.toml";

/// Allowed range for the scroll sensitivity unit
pub const SENSITIVITY_RANGE: std::ops::RangeInclusive<u8> = 1..=20;

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    /// Two-finger scroll multiplier, applied as `unit * 0.1`
    #[serde(default = "default_scroll_sensitivity")]
    pub scroll_sensitivity: u8,

    /// Pulse the host shell's haptic feedback on every send
    #[serde(default = "default_haptics")]
    pub haptics: bool,

    /// Pointer motion flush interval (one display frame)
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
}

fn default_scroll_sensitivity() -> u8 {
    5
}

fn default_haptics() -> bool {
    true
}

fn default_frame_interval_ms() -> u64 {
    16
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            scroll_sensitivity: default_scroll_sensitivity(),
            haptics: default_haptics(),
            frame_interval_ms: default_frame_interval_ms(),
        }
    }
}

impl AppSettings {
    /// Load settings (or defaults if none were saved yet)
    pub fn load(store: &dyn BlobStore) -> Result<Self> {
        match store.read(SETTINGS_FILE)? {
            Some(content) => {
                let mut settings: AppSettings =
                    toml::from_str(&content).context("Failed to parse settings")?;
                settings.scroll_sensitivity = clamp_sensitivity(settings.scroll_sensitivity);
                info!("Loaded settings");
                Ok(settings)
            }
            None => {
                info!("No settings file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Save settings
    pub fn save(&self, store: &dyn BlobStore) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize settings")?;
        store.write(SETTINGS_FILE, &content)?;
        info!("Saved settings");
        Ok(())
    }

    /// Change the scroll sensitivity unit (clamped to 1..=20)
    pub fn set_scroll_sensitivity(&mut self, unit: u8, store: &dyn BlobStore) -> Result<()> {
        self.scroll_sensitivity = clamp_sensitivity(unit);
        info!("Scroll sensitivity set to {}", self.scroll_sensitivity);
        self.save(store)
    }

    /// Enable or disable haptic pulses
    pub fn set_haptics(&mut self, enabled: bool, store: &dyn BlobStore) -> Result<()> {
        self.haptics = enabled;
        info!("Haptic feedback: {}", enabled);
        self.save(store)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}

fn clamp_sensitivity(unit: u8) -> u8 {
    unit.clamp(*SENSITIVITY_RANGE.start(), *SENSITIVITY_RANGE.end())
}

/// Last host address, persisted apart from the tiles
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RememberedEndpoint {
    host: String,
}

/// Host the user last connected to, used to prefill the connection prompt
pub fn remembered_host(store: &dyn BlobStore) -> Result<Option<String>> {
    let Some(content) = store.read(ENDPOINT_FILE)? else {
        return Ok(None);
    };
    let endpoint: RememberedEndpoint =
        toml::from_str(&content).context("Failed to parse remembered endpoint")?;
    Ok(Some(endpoint.host))
}

/// Remember `host` for the next start
pub fn remember_host(store: &dyn BlobStore, host: &str) -> Result<()> {
    let content = toml::to_string(&RememberedEndpoint { host: host.to_string() })
        .context("Failed to serialize endpoint")?;
    store.write(ENDPOINT_FILE, &content)?;
    info!("Remembered host {}", host);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_settings_default() {
        let settings = AppSettings::default();
        assert_eq!(settings.scroll_sensitivity, 5);
        assert!(settings.haptics);
        assert_eq!(settings.frame_interval(), Duration::from_millis(16));
    }

    #[test]
    fn test_settings_serialization() {
        let mut settings = AppSettings::default();
        settings.scroll_sensitivity = 12;
        settings.haptics = false;

        let toml = toml::to_string(&settings).unwrap();
        assert!(toml.contains("scroll_sensitivity = 12"));
        assert!(toml.contains("haptics = false"));
    }

    #[test]
    fn test_settings_deserialization() {
        let toml = r#"
scroll_sensitivity = 8
"#;
        let settings: AppSettings = toml::from_str(toml).unwrap();
        assert_eq!(settings.scroll_sensitivity, 8);
        assert!(settings.haptics);
        assert_eq!(settings.frame_interval_ms, 16);
    }

    #[test]
    fn test_sensitivity_is_clamped() {
        let store = MemoryStore::new();
        let mut settings = AppSettings::default();

        settings.set_scroll_sensitivity(0, &store).unwrap();
        assert_eq!(settings.scroll_sensitivity, 1);
        settings.set_scroll_sensitivity(99, &store).unwrap();
        assert_eq!(settings.scroll_sensitivity, 20);

        assert_eq!(AppSettings::load(&store).unwrap().scroll_sensitivity, 20);
    }

    #[test]
    fn test_remembered_host() {
        let store = MemoryStore::new();
        assert_eq!(remembered_host(&store).unwrap(), None);

        remember_host(&store, "192.168.1.20").unwrap();
        assert_eq!(remembered_host(&store).unwrap().as_deref(), Some("192.168.1.20"));
    }
}
