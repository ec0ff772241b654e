use std::path::Path;

use bglab_core::{normalize_path_prefix, ConflictPolicy, DEFAULT_ROOM_PATH_PREFIX};
use serde::{Deserialize, Serialize};

use crate::room::{RoomSettings, LEASE_TIMEOUT_MS_DEFAULT};
use crate::RelayError;

pub const BIND_DEFAULT: &str = "127.0.0.1:8787";
pub const SWEEP_INTERVAL_MS_DEFAULT: u64 = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub bind: String,
    pub path_prefix: String,
    pub policy: ConflictPolicy,
    pub lease_timeout_ms: u64,
    pub sweep_interval_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: BIND_DEFAULT.to_string(),
            path_prefix: DEFAULT_ROOM_PATH_PREFIX.to_string(),
            policy: ConflictPolicy::LastWriterWins,
            lease_timeout_ms: LEASE_TIMEOUT_MS_DEFAULT,
            sweep_interval_ms: SWEEP_INTERVAL_MS_DEFAULT,
        }
    }
}

impl RelayConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, RelayError> {
        let mut config: Self = serde_json::from_str(raw)?;
        config.normalize()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn normalize(&mut self) -> Result<(), RelayError> {
        self.path_prefix = normalize_path_prefix(&self.path_prefix);
        if self.lease_timeout_ms == 0 {
            return Err(RelayError::Config("lease_timeout_ms must be positive".to_string()));
        }
        if self.sweep_interval_ms == 0 {
            return Err(RelayError::Config("sweep_interval_ms must be positive".to_string()));
        }
        Ok(())
    }

    pub fn room_settings(&self) -> RoomSettings {
        RoomSettings {
            policy: self.policy,
            lease_timeout_ms: self.lease_timeout_ms,
        }
    }
}
