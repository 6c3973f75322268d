//! Command/response engine for serial card and tag reader/writers.
//!
//! Supports the MSR206 magnetic stripe reader/writer and the SonMicro SM130
//! Mifare reader/writer over any byte transport.
//!
//! # Features
//!
//! - `serial` - Serial port transport for desktop using serialport crate
//!
//! # Example
//!
//! ```ignore
//! use cardwire::{DeviceSession, Msr206, SerialSettings, SerialTransport, SessionConfig, TrackFormat};
//!
//! let transport = SerialTransport::open(&SerialSettings::msr206("/dev/ttyUSB0"))?;
//! let mut msr = DeviceSession::<Msr206, _>::new(transport, SessionConfig::with_label("msr206"))?;
//!
//! for track in msr.read_card(&[TrackFormat::Iso])? {
//!     println!("{}: {}", track.label(), track.text);
//! }
//! ```

mod card;
mod clock;
mod config;
mod framer;
mod msr206;
mod persist;
mod protocol;
mod session;
mod sm130;
mod tag;
mod transport;
mod types;
mod workflow;

#[cfg(feature = "serial")]
mod serial;

#[cfg(test)]
mod mock;

// Re-exports
pub use card::{validate_tracks, Indicator, IndicatorMode};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Parity, PollPolicy, SerialSettings, SessionConfig};
pub use framer::{read_frame, FramingOptions};
pub use msr206::{decode_payload, encode_payload, Msr206, MsrCommand, WriteDensity};
pub use persist::BackupFile;
pub use protocol::{CommandSpec, Frame, FrameDiscipline, ParamShape, Params, PayloadView, Protocol};
pub use session::DeviceSession;
pub use sm130::{KeyRef, RfidCommand, Sm130};
pub use tag::{check_block_write, dump};
pub use transport::DeviceTransport;
pub use types::{
    bytes_to_hex, hex_to_bytes, track_capacity, BlockData, DeviceError, ParsedResponse, Result,
    Status, TagData, TagInfo, TagType, TrackData, TrackFormat,
};
pub use workflow::{Confirm, Mismatch, Mode, StdinConfirm, WorkflowState, WriteOutcome};

#[cfg(feature = "serial")]
pub use serial::SerialTransport;
