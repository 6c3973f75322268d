//! Backup files: pretty-printed JSON snapshots of what was read from a medium

use log::info;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::types::{DeviceError, Result, Status, TagInfo};

/// A saved read, replayable by a restore.
///
/// `units` are tracks for a card and blocks for a tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupFile<U> {
    pub protocol: String,
    pub command: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<TagInfo>,
    pub units: Vec<U>,
}

impl<U: Serialize + DeserializeOwned> BackupFile<U> {
    pub fn new(protocol: &str, command: &str, status: Status, units: Vec<U>) -> Self {
        Self {
            protocol: protocol.to_string(),
            command: command.to_string(),
            status,
            tag: None,
            units,
        }
    }

    pub fn with_tag(mut self, tag: TagInfo) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!(
            "Saved {} {} units to {}",
            self.units.len(),
            self.protocol,
            path.display()
        );
        Ok(())
    }

    /// Load a backup, refusing one taken from a different protocol
    pub fn load(path: &Path, protocol: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let backup: Self = serde_json::from_str(&content)?;
        if backup.protocol != protocol {
            return Err(DeviceError::invalid(format!(
                "{} holds a {} backup, expected {}",
                path.display(),
                backup.protocol,
                protocol
            )));
        }
        Ok(backup)
    }
}
