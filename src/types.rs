//! Types for reader/writer operations

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Meaning of a response status byte.
///
/// Shared by both protocols. Every status falls into exactly one class:
/// success, in progress, terminal failure, or unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    AckCommandCompleted,
    LoginSucceeded,

    Seeking,
    CardSpeedMeasurementStart,
    CardSpeedMeasurementEnd,
    PowerOnReport,

    InvalidCommand,
    Error,
    NoDataFound,
    InsufficientLeadingZeros,
    FirstLsbCharNotOne,
    UnsuccessfulReadAfterWriteTrack1,
    UnsuccessfulReadAfterWriteTrack2,
    UnsuccessfulReadAfterWriteTrack3,
    NoTagPresent,
    RfFieldOff,
    LoginFailed,
    InvalidKeyFormat,
    ReadFailed,
    WriteFailed,
    ReadAfterWriteFailed,
    InvalidValueBlock,
    ChecksumMismatch,

    UnknownResponse,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::AckCommandCompleted => "ack_command_completed",
            Status::LoginSucceeded => "login_succeeded",
            Status::Seeking => "seeking",
            Status::CardSpeedMeasurementStart => "card_speed_measurement_start",
            Status::CardSpeedMeasurementEnd => "card_speed_measurement_end",
            Status::PowerOnReport => "power_on_report",
            Status::InvalidCommand => "invalid_command",
            Status::Error => "error",
            Status::NoDataFound => "no_data_found",
            Status::InsufficientLeadingZeros => "insufficient_leading_zeros",
            Status::FirstLsbCharNotOne => "first_lsb_char_not_one",
            Status::UnsuccessfulReadAfterWriteTrack1 => "unsuccessful_read_after_write_track1",
            Status::UnsuccessfulReadAfterWriteTrack2 => "unsuccessful_read_after_write_track2",
            Status::UnsuccessfulReadAfterWriteTrack3 => "unsuccessful_read_after_write_track3",
            Status::NoTagPresent => "no_tag_present",
            Status::RfFieldOff => "rf_field_off",
            Status::LoginFailed => "login_failed",
            Status::InvalidKeyFormat => "invalid_key_format",
            Status::ReadFailed => "read_failed",
            Status::WriteFailed => "write_failed",
            Status::ReadAfterWriteFailed => "read_after_write_failed",
            Status::InvalidValueBlock => "invalid_value_block",
            Status::ChecksumMismatch => "checksum_mismatch",
            Status::UnknownResponse => "unknown_response",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Status::AckCommandCompleted | Status::LoginSucceeded)
    }

    /// Device is still working; more frames will follow
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            Status::Seeking
                | Status::CardSpeedMeasurementStart
                | Status::CardSpeedMeasurementEnd
                | Status::PowerOnReport
        )
    }

    pub fn is_terminal_failure(&self) -> bool {
        !self.is_success() && !self.is_in_progress() && *self != Status::UnknownResponse
    }

    /// Ends a wait-for-medium loop
    pub fn is_terminal(&self) -> bool {
        self.is_success() || self.is_terminal_failure()
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One command's response, decoded. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedResponse {
    command: String,
    raw_bytes: Vec<u8>,
    status_code: Option<u8>,
    status: Status,
    decoded_text: String,
    binary_view: Vec<String>,
    #[serde(skip)]
    payload: Vec<u8>,
}

impl ParsedResponse {
    pub(crate) fn new(
        command: &str,
        raw_bytes: &[u8],
        status_code: Option<u8>,
        status: Status,
        payload: &[u8],
        decoded_text: String,
    ) -> Self {
        Self {
            command: command.to_string(),
            raw_bytes: raw_bytes.to_vec(),
            status_code,
            status,
            decoded_text,
            binary_view: binary_view(raw_bytes),
            payload: payload.to_vec(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw_bytes
    }

    pub fn status_code(&self) -> Option<u8> {
        self.status_code
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn decoded_text(&self) -> &str {
        &self.decoded_text
    }

    /// Each raw byte rendered as eight binary digits
    pub fn binary_view(&self) -> &[String] {
        &self.binary_view
    }

    /// Data bytes with framing and status stripped
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// Character encoding used on a magnetic track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackFormat {
    Iso,
    IsoAlt,
    Raw,
}

impl TrackFormat {
    pub const ALL: [TrackFormat; 3] = [TrackFormat::Iso, TrackFormat::IsoAlt, TrackFormat::Raw];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackFormat::Iso => "iso",
            TrackFormat::IsoAlt => "iso_alt",
            TrackFormat::Raw => "raw",
        }
    }
}

/// Maximum characters a track holds (ISO 7811)
pub fn track_capacity(track: u8) -> Option<usize> {
    match track {
        1 => Some(79),
        2 => Some(40),
        3 => Some(107),
        _ => None,
    }
}

/// One physical magnetic track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackData {
    pub track: u8,
    pub format: TrackFormat,
    pub text: String,
    #[serde(default)]
    pub raw: Vec<u8>,
    pub status: Status,
}

impl TrackData {
    /// A track to be written
    pub fn new(track: u8, format: TrackFormat, text: impl Into<String>) -> Self {
        Self {
            track,
            format,
            text: text.into(),
            raw: Vec::new(),
            status: Status::AckCommandCompleted,
        }
    }

    pub fn label(&self) -> String {
        format!("track{}:{}", self.track, self.format.as_str())
    }

    /// Nothing to load: no text, and for raw tracks no raw bytes either
    pub fn is_blank(&self) -> bool {
        self.text.is_empty() && (self.format != TrackFormat::Raw || self.raw.is_empty())
    }
}

/// RFID tag family reported by seek/select
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagType {
    MifareUltralight,
    MifareClassic1k,
    MifareClassic4k,
    Unknown,
}

impl TagType {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0x01 => TagType::MifareUltralight,
            0x02 => TagType::MifareClassic1k,
            0x03 => TagType::MifareClassic4k,
            _ => TagType::Unknown,
        }
    }

    /// Bytes per block (page, for Ultralight)
    pub fn block_size(&self) -> usize {
        match self {
            TagType::MifareUltralight => 4,
            _ => 16,
        }
    }

    /// Blocks (pages) on the tag
    pub fn block_count(&self) -> usize {
        match self {
            TagType::MifareUltralight => 16,
            TagType::MifareClassic4k => 256,
            TagType::MifareClassic1k | TagType::Unknown => 64,
        }
    }

    /// Blocks that must never be written: the manufacturer block and sector
    /// trailers on Classic tags, the serial/lock/OTP pages on Ultralight
    pub fn is_protected(&self, block: u8) -> bool {
        match self {
            TagType::MifareUltralight => block < 4,
            _ if block < 128 => block == 0 || block % 4 == 3,
            _ => block % 16 == 15,
        }
    }
}

/// Tag identity from a seek or select
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagInfo {
    pub tag_type: TagType,
    pub uid: String,
}

/// One RFID block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockData {
    pub block: u8,
    pub data: Vec<u8>,
    pub text: String,
    pub status: Status,
}

impl BlockData {
    /// A block to be written
    pub fn new(block: u8, data: &[u8]) -> Self {
        Self {
            block,
            data: data.to_vec(),
            text: bytes_to_hex(data),
            status: Status::AckCommandCompleted,
        }
    }

    pub fn label(&self) -> String {
        format!("block{}", self.block)
    }
}

/// Everything read from one tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagData {
    pub tag: TagInfo,
    pub blocks: Vec<BlockData>,
}

/// Errors that can occur during reader/writer operations
#[derive(Error, Debug)]
pub enum DeviceError {
    /// Command name not in the protocol's vocabulary
    #[error("unsupported command `{command}`; valid commands: {}", .valid.join(", "))]
    UnsupportedCommand {
        command: String,
        valid: Vec<&'static str>,
    },

    /// Parameters do not have the shape the command takes
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// No complete response within the command timeout
    #[error("device timeout after {timeout:?} waiting for `{command}`")]
    DeviceTimeout { command: String, timeout: Duration },

    #[error("authentication failed for block {block}: {status}")]
    AuthenticationFailed { block: u8, status: Status },

    /// Read-back after a write differs from what was written
    #[error("write verification mismatch on {unit}: expected `{expected}`, read `{actual}`")]
    WriteVerificationMismatch {
        unit: String,
        expected: String,
        actual: String,
    },

    #[error("payload for {unit} is {len} characters, maximum is {max}")]
    PayloadTooLong { unit: String, len: usize, max: usize },

    #[error("payload for {unit} contains unsupported character {ch:?}")]
    InvalidCharacter { unit: String, ch: char },

    /// Wait-for-medium ended in a terminal failure status
    #[error("`{command}` failed: {status}")]
    MediumFailure { command: String, status: Status },

    /// Transport layer error (serial, etc.)
    #[error("transport error: {0}")]
    Transport(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("backup file error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),
}

impl DeviceError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameters(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub(crate) fn transport(err: impl std::fmt::Debug) -> Self {
        Self::Transport(format!("{:?}", err))
    }
}

/// Result type for reader/writer operations
pub type Result<T> = std::result::Result<T, DeviceError>;

/// Convert bytes to uppercase hex string
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

/// Parse an even-length hex string
pub fn hex_to_bytes(hex: &str) -> Result<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return Err(DeviceError::invalid(format!("odd-length hex string: {}", hex)));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            hex.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| DeviceError::invalid(format!("invalid hex string: {}", hex)))
        })
        .collect()
}

pub(crate) fn binary_view(bytes: &[u8]) -> Vec<String> {
    bytes.iter().map(|b| format!("{:08b}", b)).collect()
}
