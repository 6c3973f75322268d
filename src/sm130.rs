//! SonMicro SM130 Mifare reader/writer protocol.
//!
//! Frames are `FF 00 LEN CMD DATA.. CSUM` in both directions, where `LEN`
//! counts the command byte plus data and `CSUM` is the 8-bit sum of
//! `LEN`, `CMD` and `DATA`. Failures come back as a single status letter
//! whose meaning depends on the command that was sent.

use log::warn;

use crate::msr206::UNKNOWN_GLYPH;
use crate::protocol::{
    CommandSpec, Frame, FrameDiscipline, ParamShape, Params, PayloadView, Protocol,
};
use crate::types::{
    bytes_to_hex, DeviceError, ParsedResponse, Result, Status, TagInfo, TagType,
};

pub const HEADER: u8 = 0xFF;
pub const RESERVED: u8 = 0x00;

/// Header, reserved, length and checksum bytes around the body
pub const FRAME_OVERHEAD: usize = 4;

/// SM130 command vocabulary
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RfidCommand {
    Reset,
    Firmware,
    SeekForTag,
    SelectTag,
    Authenticate,
    ReadBlock,
    ReadValue,
    WriteBlock,
    WriteValue,
    Write4ByteBlock,
    WriteKey,
    Increment,
    Decrement,
    AntennaPower,
    ReadPort,
    WritePort,
    Halt,
    SetBaudRate,
    Sleep,
}

const fn row(
    command: RfidCommand,
    name: &'static str,
    opcode: &'static [u8],
    params: ParamShape,
    destructive: bool,
    view: PayloadView,
) -> CommandSpec<RfidCommand> {
    CommandSpec {
        command,
        name,
        opcode,
        params,
        reply: true,
        destructive,
        view,
    }
}

use ParamShape::{Byte, Bytes, None as NoParams, Switch};
use PayloadView::{Hex, Text};
use RfidCommand as R;

static COMMANDS: [CommandSpec<RfidCommand>; 19] = [
    row(R::Reset, "reset", &[0x80], NoParams, false, Text),
    row(R::Firmware, "firmware", &[0x81], NoParams, false, Text),
    row(R::SeekForTag, "seek_for_tag", &[0x82], NoParams, false, Hex),
    row(R::SelectTag, "select_tag", &[0x83], NoParams, false, Hex),
    row(R::Authenticate, "authenticate", &[0x85], Bytes, false, Hex),
    row(R::ReadBlock, "read_block", &[0x86], Byte, false, Hex),
    row(R::ReadValue, "read_value", &[0x87], Byte, false, Hex),
    row(R::WriteBlock, "write_block", &[0x89], Bytes, true, Hex),
    row(R::WriteValue, "write_value", &[0x8A], Bytes, true, Hex),
    row(R::Write4ByteBlock, "write_4_byte_block", &[0x8B], Bytes, true, Hex),
    row(R::WriteKey, "write_key", &[0x8C], Bytes, true, Hex),
    row(R::Increment, "increment", &[0x8D], Bytes, true, Hex),
    row(R::Decrement, "decrement", &[0x8E], Bytes, true, Hex),
    row(R::AntennaPower, "antenna_power", &[0x90], Switch, false, Hex),
    row(R::ReadPort, "read_port", &[0x91], NoParams, false, Hex),
    row(R::WritePort, "write_port", &[0x92], Byte, false, Hex),
    row(R::Halt, "halt", &[0x93], NoParams, false, Hex),
    row(R::SetBaudRate, "set_baud_rate", &[0x94], Byte, false, Hex),
    row(R::Sleep, "sleep", &[0x96], NoParams, false, Hex),
];

const NO_TAG: (u8, Status) = (b'N', Status::NoTagPresent);
const RF_OFF: (u8, Status) = (b'U', Status::RfFieldOff);

/// Single-byte replies per command
fn status_table(command: RfidCommand) -> &'static [(u8, Status)] {
    use RfidCommand::*;
    match command {
        SeekForTag => &[(b'L', Status::Seeking), RF_OFF],
        SelectTag => &[NO_TAG, RF_OFF],
        Authenticate => &[
            (b'L', Status::LoginSucceeded),
            NO_TAG,
            (b'U', Status::LoginFailed),
            (b'E', Status::InvalidKeyFormat),
        ],
        ReadBlock => &[NO_TAG, (b'F', Status::ReadFailed)],
        ReadValue | Increment | Decrement => &[
            NO_TAG,
            (b'F', Status::ReadFailed),
            (b'I', Status::InvalidValueBlock),
        ],
        WriteBlock | WriteValue | Write4ByteBlock => &[
            NO_TAG,
            (b'F', Status::WriteFailed),
            (b'U', Status::ReadAfterWriteFailed),
            (b'X', Status::ReadAfterWriteFailed),
        ],
        WriteKey => &[(b'N', Status::WriteFailed), (b'F', Status::WriteFailed)],
        Halt => &[(b'L', Status::AckCommandCompleted), RF_OFF],
        SetBaudRate => &[(b'N', Status::Error)],
        Reset | Firmware | AntennaPower | ReadPort | WritePort | Sleep => &[],
    }
}

/// Commands whose one-byte reply is a value rather than a status letter
fn replies_with_value(command: RfidCommand) -> bool {
    matches!(
        command,
        RfidCommand::AntennaPower
            | RfidCommand::ReadPort
            | RfidCommand::WritePort
            | RfidCommand::SetBaudRate
            | RfidCommand::Sleep
    )
}

/// Classify a one-byte reply to `command`. Total over all byte values.
pub fn classify_status(command: RfidCommand, byte: u8) -> Status {
    status_table(command)
        .iter()
        .find(|(code, _)| *code == byte)
        .map(|(_, status)| *status)
        .unwrap_or(if replies_with_value(command) {
            Status::AckCommandCompleted
        } else {
            Status::UnknownResponse
        })
}

/// 8-bit sum of length, command and data bytes
pub fn checksum(body: &[u8]) -> u8 {
    body.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

fn ascii_text(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if (0x20..=0x7E).contains(&b) {
                b as char
            } else {
                UNKNOWN_GLYPH
            }
        })
        .collect()
}

fn render(view: PayloadView, payload: &[u8]) -> String {
    match view {
        PayloadView::Text => ascii_text(payload),
        PayloadView::Hex => bytes_to_hex(payload),
    }
}

/// Tag identity from a successful seek/select reply
pub fn parse_tag(response: &ParsedResponse) -> Option<TagInfo> {
    if !response.status().is_success() {
        return None;
    }
    let (&tag_type, uid) = response.payload().split_first()?;
    if uid.is_empty() {
        return None;
    }
    Some(TagInfo {
        tag_type: TagType::from_byte(tag_type),
        uid: bytes_to_hex(uid),
    })
}

/// Key used to log in to a Mifare Classic sector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRef {
    A([u8; 6]),
    B([u8; 6]),
    /// Factory default FFFFFFFFFFFF
    Transport,
    /// Key A stored in reader EEPROM slot 0-15
    StoredA(u8),
    /// Key B stored in reader EEPROM slot 0-15
    StoredB(u8),
}

impl KeyRef {
    /// Parameters for the authenticate command
    pub fn auth_params(&self, block: u8) -> Result<Vec<u8>> {
        let mut params = vec![block];
        match self {
            KeyRef::A(key) => {
                params.push(0xAA);
                params.extend_from_slice(key);
            }
            KeyRef::B(key) => {
                params.push(0xBB);
                params.extend_from_slice(key);
            }
            KeyRef::Transport => params.push(0xFF),
            KeyRef::StoredA(slot) | KeyRef::StoredB(slot) if *slot > 0x0F => {
                return Err(DeviceError::invalid(format!("no key slot {}", slot)));
            }
            KeyRef::StoredA(slot) => params.push(0x10 + slot),
            KeyRef::StoredB(slot) => params.push(0x20 + slot),
        }
        Ok(params)
    }
}

/// Marker type for the SM130 protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sm130;

impl Protocol for Sm130 {
    type Command = RfidCommand;

    const NAME: &'static str = "sm130";

    fn commands() -> &'static [CommandSpec<RfidCommand>] {
        &COMMANDS
    }

    fn spec(command: RfidCommand) -> &'static CommandSpec<RfidCommand> {
        &COMMANDS[command as usize]
    }

    fn framing() -> FrameDiscipline {
        FrameDiscipline::LengthPrefixed {
            length_offset: 2,
            overhead: FRAME_OVERHEAD,
        }
    }

    fn encode(command: RfidCommand, params: &Params) -> Result<Vec<u8>> {
        let spec = Self::spec(command);
        let data = spec.param_bytes(params)?;
        if data.len() + spec.opcode.len() > u8::MAX as usize {
            return Err(DeviceError::invalid(format!(
                "`{}` data too long: {} bytes",
                spec.name,
                data.len()
            )));
        }

        let mut body = vec![(spec.opcode.len() + data.len()) as u8];
        body.extend_from_slice(spec.opcode);
        body.extend_from_slice(&data);

        let mut cmd = vec![HEADER, RESERVED];
        cmd.extend_from_slice(&body);
        cmd.push(checksum(&body));
        Ok(cmd)
    }

    fn parse(frame: &Frame, command: RfidCommand) -> ParsedResponse {
        let spec = Self::spec(command);
        let bytes = frame.as_bytes();
        let unknown = || {
            ParsedResponse::new(
                spec.name,
                bytes,
                None,
                Status::UnknownResponse,
                bytes,
                bytes_to_hex(bytes),
            )
        };

        if bytes.len() < FRAME_OVERHEAD + 1 || bytes[0] != HEADER || bytes[1] != RESERVED {
            return unknown();
        }
        let len = bytes[2] as usize;
        if len == 0 || bytes.len() < len + FRAME_OVERHEAD {
            return unknown();
        }

        let body = &bytes[2..3 + len];
        let data = &bytes[4..3 + len];
        let sum = bytes[3 + len];
        if checksum(body) != sum {
            warn!(
                "{} reply checksum {:02X}, computed {:02X}",
                spec.name,
                sum,
                checksum(body)
            );
            return ParsedResponse::new(
                spec.name,
                bytes,
                Some(sum),
                Status::ChecksumMismatch,
                data,
                render(spec.view, data),
            );
        }
        if bytes[3] != spec.opcode[0] {
            warn!(
                "{} reply echoes command {:02X}, expected {:02X}",
                spec.name, bytes[3], spec.opcode[0]
            );
            return unknown();
        }

        let (status_code, status) = match data {
            [byte] => (Some(*byte), classify_status(command, *byte)),
            _ => (None, Status::AckCommandCompleted),
        };
        let payload = if status.is_success() || status == Status::UnknownResponse {
            data
        } else {
            &data[..0]
        };

        ParsedResponse::new(
            spec.name,
            bytes,
            status_code,
            status,
            payload,
            render(spec.view, payload),
        )
    }
}
