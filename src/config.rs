//! Session and serial line configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::types::DeviceError;

/// Poll loop pacing.
///
/// The framer sleeps `interval_ms` between polls, multiplying the delay by
/// `backoff` after every poll that brings no new bytes, up to
/// `max_interval_ms`. Growth resets the delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    pub interval_ms: u64,
    pub max_interval_ms: u64,
    pub backoff: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval_ms: 20,
            max_interval_ms: 160,
            backoff: 2,
        }
    }
}

impl PollPolicy {
    /// Fixed interval, no backoff
    pub fn fixed(interval: Duration) -> Self {
        let ms = interval.as_millis() as u64;
        Self {
            interval_ms: ms,
            max_interval_ms: ms,
            backoff: 1,
        }
    }

    pub fn initial(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Delay to use after an idle poll that followed `current`
    pub fn next(&self, current: Duration) -> Duration {
        let grown = current.saturating_mul(self.backoff.max(1));
        grown.min(Duration::from_millis(self.max_interval_ms.max(self.interval_ms)))
    }
}

/// Per-session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Prefix for every log line this session emits
    pub label: String,
    /// Hard bound on one command's read + parse cycle
    pub command_timeout_ms: u64,
    /// Bound on each frame read while waiting for a swipe or tag
    pub medium_timeout_ms: u64,
    pub poll: PollPolicy,
    /// Consecutive idle polls that end an unframed response
    pub quiescent_polls: u32,
    /// Read back and compare after every write
    pub verify_writes: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            label: "device".to_string(),
            command_timeout_ms: 5000,
            medium_timeout_ms: 5000,
            poll: PollPolicy::default(),
            quiescent_polls: 2,
            verify_writes: true,
        }
    }
}

impl SessionConfig {
    pub fn with_label(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn medium_timeout(&self) -> Duration {
        Duration::from_millis(self.medium_timeout_ms)
    }

    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, DeviceError> {
        let config: SessionConfig =
            toml::from_str(content).map_err(|e| DeviceError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self, DeviceError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), DeviceError> {
        if self.command_timeout_ms == 0 {
            return Err(DeviceError::config("command_timeout_ms must be positive"));
        }
        if self.medium_timeout_ms == 0 {
            return Err(DeviceError::config("medium_timeout_ms must be positive"));
        }
        if self.poll.interval_ms == 0 {
            return Err(DeviceError::config("poll.interval_ms must be positive"));
        }
        if self.quiescent_polls == 0 {
            return Err(DeviceError::config("quiescent_polls must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    None,
    Odd,
    Even,
}

/// Serial line settings handed to the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 9600,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
        }
    }
}

impl SerialSettings {
    /// MSR206 factory line settings (9600 8N1)
    pub fn msr206(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    /// SM130 factory line settings (19200 8N1)
    pub fn sm130(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: 19200,
            ..Self::default()
        }
    }
}
