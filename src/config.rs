use std::path::Path;

use bglab_core::WireFormat;
use serde::{Deserialize, Serialize};

pub const POINTER_INTERVAL_MS_DEFAULT: u64 = 100;
pub const DRAG_INTERVAL_MS_DEFAULT: u64 = 50;
pub const CURSOR_TTL_MS_DEFAULT: u64 = 10_000;

/// Whether quarter-turn rotations stay on this client or go to the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationSync {
    #[default]
    Local,
    Shared,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub pointer_interval_ms: u64,
    pub drag_interval_ms: u64,
    pub cursor_ttl_ms: u64,
    pub rotation_sync: RotationSync,
    pub snap_to_grid: bool,
    pub wire_format: WireFormat,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            pointer_interval_ms: POINTER_INTERVAL_MS_DEFAULT,
            drag_interval_ms: DRAG_INTERVAL_MS_DEFAULT,
            cursor_ttl_ms: CURSOR_TTL_MS_DEFAULT,
            rotation_sync: RotationSync::Local,
            snap_to_grid: true,
            wire_format: WireFormat::Binary,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cursor ttl must be positive")]
    ZeroTtl,
}

impl SyncConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cursor_ttl_ms == 0 {
            return Err(ConfigError::ZeroTtl);
        }
        Ok(())
    }
}
