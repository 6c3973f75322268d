//! MSR206 magnetic stripe reader/writer protocol.
//!
//! Commands are bare opcodes; write-type commands carrying data end with an
//! EOT byte. Replies have no length field, so they are framed by quiescence
//! and end in a single status byte. Status and data bytes may arrive with the
//! parity bit set, so every lookup masks bit 7.

use crate::protocol::{
    CommandSpec, Frame, FrameDiscipline, ParamShape, Params, PayloadView, Protocol,
};
use crate::types::{DeviceError, ParsedResponse, Result, Status, TrackFormat};

/// End-of-transmission marker after write data
pub const EOT: u8 = 0x04;

/// Glyph for bytes that have no character
pub const UNKNOWN_GLYPH: char = '\u{FFFD}';

/// MSR206 command vocabulary
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsrCommand {
    ProtoUsi0,
    ProtoUsi1,
    VersionReport,
    SimulatePowerCycle,
    ConfigurationRequest,
    ReproduceLastCommand,
    ResumeTransmission,
    PauseTransmission,
    AbortCommand,
    RedOn,
    RedOff,
    RedFlash,
    GreenOn,
    GreenOff,
    GreenFlash,
    YellowOn,
    YellowOff,
    YellowFlash,
    ArmToRead,
    ArmToReadWithSpeedPrompts,
    TxIsoTrack1,
    TxIsoTrack2,
    TxIsoTrack3,
    TxAltIsoTrack1,
    TxAltIsoTrack2,
    TxAltIsoTrack3,
    TxRawTrack1,
    TxRawTrack2,
    TxRawTrack3,
    TxErrorData,
    ArmToWriteNoRaw,
    ArmToWriteWithRaw,
    ArmToWriteWithRawSpeedPrompts,
    LoadIsoTrack1,
    LoadIsoTrack2,
    LoadIsoTrack3,
    LoadAltIsoTrack1,
    LoadAltIsoTrack2,
    LoadAltIsoTrack3,
    LoadRawTrack1,
    LoadRawTrack2,
    LoadRawTrack3,
    SetWriteDensity210Tracks13,
    SetWriteDensity75Tracks13,
    SetWriteDensity210Track2,
    SetWriteDensity75Track2,
    SetDefaultWriteCurrent,
    ViewDefaultWriteCurrent,
    SetTempWriteCurrent,
    ViewTempWriteCurrent,
}

/// Recording density for a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDensity {
    Bpi210,
    Bpi75,
}

impl MsrCommand {
    /// Command that transmits `track` in `format` after a swipe
    pub fn read_track(track: u8, format: TrackFormat) -> Result<MsrCommand> {
        use MsrCommand::*;
        let table = match format {
            TrackFormat::Iso => [TxIsoTrack1, TxIsoTrack2, TxIsoTrack3],
            TrackFormat::IsoAlt => [TxAltIsoTrack1, TxAltIsoTrack2, TxAltIsoTrack3],
            TrackFormat::Raw => [TxRawTrack1, TxRawTrack2, TxRawTrack3],
        };
        pick_track(table, track)
    }

    /// Command that loads data for `track` in `format` ahead of a write
    pub fn load_track(track: u8, format: TrackFormat) -> Result<MsrCommand> {
        use MsrCommand::*;
        let table = match format {
            TrackFormat::Iso => [LoadIsoTrack1, LoadIsoTrack2, LoadIsoTrack3],
            TrackFormat::IsoAlt => [LoadAltIsoTrack1, LoadAltIsoTrack2, LoadAltIsoTrack3],
            TrackFormat::Raw => [LoadRawTrack1, LoadRawTrack2, LoadRawTrack3],
        };
        pick_track(table, track)
    }

    pub fn arm_to_write(with_raw: bool) -> MsrCommand {
        if with_raw {
            MsrCommand::ArmToWriteWithRaw
        } else {
            MsrCommand::ArmToWriteNoRaw
        }
    }

    pub fn write_density(track: u8, density: WriteDensity) -> Result<MsrCommand> {
        use MsrCommand::*;
        match (track, density) {
            (1 | 3, WriteDensity::Bpi210) => Ok(SetWriteDensity210Tracks13),
            (1 | 3, WriteDensity::Bpi75) => Ok(SetWriteDensity75Tracks13),
            (2, WriteDensity::Bpi210) => Ok(SetWriteDensity210Track2),
            (2, WriteDensity::Bpi75) => Ok(SetWriteDensity75Track2),
            _ => Err(DeviceError::invalid(format!("no track {}", track))),
        }
    }
}

fn pick_track(table: [MsrCommand; 3], track: u8) -> Result<MsrCommand> {
    match track {
        1..=3 => Ok(table[track as usize - 1]),
        _ => Err(DeviceError::invalid(format!("no track {}", track))),
    }
}

const fn row(
    command: MsrCommand,
    name: &'static str,
    opcode: &'static [u8],
    params: ParamShape,
    reply: bool,
    destructive: bool,
) -> CommandSpec<MsrCommand> {
    CommandSpec {
        command,
        name,
        opcode,
        params,
        reply,
        destructive,
        view: PayloadView::Text,
    }
}

use MsrCommand as M;
use ParamShape::{Byte, Bytes, None as NoParams};

static COMMANDS: [CommandSpec<MsrCommand>; 50] = [
    row(M::ProtoUsi0, "proto_usi0", b"USI0", NoParams, true, false),
    row(M::ProtoUsi1, "proto_usi1", b"USI1", NoParams, true, false),
    row(M::VersionReport, "version_report", &[0x39], NoParams, true, false),
    row(M::SimulatePowerCycle, "simulate_power_cycle_warm_reset", &[0x7F], NoParams, true, false),
    row(M::ConfigurationRequest, "configuration_request", &[0x23], NoParams, true, false),
    row(M::ReproduceLastCommand, "reproduce_last_command", &[0x25], NoParams, true, false),
    row(M::ResumeTransmission, "resume_transmission_to_host", &[0x11], NoParams, false, false),
    row(M::PauseTransmission, "pause_transmission_to_host", &[0x13], NoParams, false, false),
    row(M::AbortCommand, "abort_command", &[0x1B], NoParams, true, false),
    row(M::RedOn, "red_on", &[0x4D], NoParams, false, false),
    row(M::RedOff, "red_off", &[0x6D], NoParams, false, false),
    row(M::RedFlash, "red_flash", &[0x29], NoParams, false, false),
    row(M::GreenOn, "green_on", &[0x4C], NoParams, false, false),
    row(M::GreenOff, "green_off", &[0x6C], NoParams, false, false),
    row(M::GreenFlash, "green_flash", &[0x28], NoParams, false, false),
    row(M::YellowOn, "yellow_on", &[0x4B], NoParams, false, false),
    row(M::YellowOff, "yellow_off", &[0x6B], NoParams, false, false),
    row(M::YellowFlash, "yellow_flash", &[0x7C], NoParams, false, false),
    row(M::ArmToRead, "arm_to_read", &[0x50], NoParams, false, false),
    row(M::ArmToReadWithSpeedPrompts, "arm_to_read_w_speed_prompts", &[0x70], NoParams, false, false),
    row(M::TxIsoTrack1, "tx_iso_std_data_track1", &[0x51], NoParams, true, false),
    row(M::TxIsoTrack2, "tx_iso_std_data_track2", &[0x52], NoParams, true, false),
    row(M::TxIsoTrack3, "tx_iso_std_data_track3", &[0x53], NoParams, true, false),
    row(M::TxAltIsoTrack1, "alt_tx_iso_std_data_track1", &[0x71], NoParams, true, false),
    row(M::TxAltIsoTrack2, "alt_tx_iso_std_data_track2", &[0x72], NoParams, true, false),
    row(M::TxAltIsoTrack3, "alt_tx_iso_std_data_track3", &[0x73], NoParams, true, false),
    row(M::TxRawTrack1, "tx_custom_data_forward_track1", &[0x45, 0x31], NoParams, true, false),
    row(M::TxRawTrack2, "tx_custom_data_forward_track2", &[0x45, 0x32], NoParams, true, false),
    row(M::TxRawTrack3, "tx_custom_data_forward_track3", &[0x45, 0x33], NoParams, true, false),
    row(M::TxErrorData, "tx_error_data", &[0x49], NoParams, true, false),
    row(M::ArmToWriteNoRaw, "arm_to_write_no_raw", &[0x5A], NoParams, false, true),
    row(M::ArmToWriteWithRaw, "arm_to_write_with_raw", &[0x7A], NoParams, false, true),
    row(M::ArmToWriteWithRawSpeedPrompts, "arm_to_write_with_raw_speed_prompts", &[0x7B], NoParams, false, true),
    row(M::LoadIsoTrack1, "load_iso_std_data_for_writing_track1", &[0x56], Bytes, false, true),
    row(M::LoadIsoTrack2, "load_iso_std_data_for_writing_track2", &[0x57], Bytes, false, true),
    row(M::LoadIsoTrack3, "load_iso_std_data_for_writing_track3", &[0x58], Bytes, false, true),
    row(M::LoadAltIsoTrack1, "alt_load_iso_std_data_for_writing_track1", &[0x76], Bytes, false, true),
    row(M::LoadAltIsoTrack2, "alt_load_iso_std_data_for_writing_track2", &[0x77], Bytes, false, true),
    row(M::LoadAltIsoTrack3, "alt_load_iso_std_data_for_writing_track3", &[0x78], Bytes, false, true),
    row(M::LoadRawTrack1, "load_custom_data_for_writing_track1", &[0x45, 0x35], Bytes, false, true),
    row(M::LoadRawTrack2, "load_custom_data_for_writing_track2", &[0x45, 0x36], Bytes, false, true),
    row(M::LoadRawTrack3, "load_custom_data_for_writing_track3", &[0x45, 0x37], Bytes, false, true),
    row(M::SetWriteDensity210Tracks13, "set_write_density_210_bpi_tracks13", &[0x3B], NoParams, true, false),
    row(M::SetWriteDensity75Tracks13, "set_write_density_75_bpi_tracks13", &[0x4F], NoParams, true, false),
    row(M::SetWriteDensity210Track2, "set_write_density_210_bpi_tracks2", &[0x3D], NoParams, true, false),
    row(M::SetWriteDensity75Track2, "set_write_density_75_bpi_tracks2", &[0x3E], NoParams, true, false),
    row(M::SetDefaultWriteCurrent, "set_default_write_current", &[0x5B], Byte, true, false),
    row(M::ViewDefaultWriteCurrent, "view_default_write_current", &[0x5D], NoParams, true, false),
    row(M::SetTempWriteCurrent, "set_temp_write_current", &[0x3C], Byte, true, false),
    row(M::ViewTempWriteCurrent, "view_temp_write_current", &[0x3F], NoParams, true, false),
];

const fn odd_parity(b: u8) -> u8 {
    if b.count_ones() % 2 == 0 { b | 0x80 } else { b }
}

const fn is_printable(b: u8) -> bool {
    b >= 0x20 && b <= 0x7E
}

const fn build_decode_table() -> [char; 256] {
    let mut table = [UNKNOWN_GLYPH; 256];
    let mut i = 0;
    while i < 256 {
        let c = (i as u8) & 0x7F;
        if is_printable(c) {
            table[i] = c as char;
        }
        i += 1;
    }
    table
}

const fn build_encode_table() -> [u8; 128] {
    let mut table = [0u8; 128];
    let mut i = 0;
    while i < 128 {
        if is_printable(i as u8) {
            table[i] = odd_parity(i as u8);
        }
        i += 1;
    }
    table
}

static DECODE: [char; 256] = build_decode_table();
static ENCODE: [u8; 128] = build_encode_table();

/// Decode one byte, ignoring its parity bit
pub fn decode_byte(b: u8) -> char {
    DECODE[b as usize]
}

pub fn decode_payload(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| decode_byte(b)).collect()
}

/// Encode printable ASCII with an odd-parity bit
pub fn encode_payload(text: &str) -> Result<Vec<u8>> {
    text.chars()
        .map(|ch| {
            let code = ch as u32;
            if code < 128 && is_printable(code as u8) {
                Ok(ENCODE[code as usize])
            } else {
                Err(DeviceError::InvalidCharacter {
                    unit: "payload".into(),
                    ch,
                })
            }
        })
        .collect()
}

/// Commands answered with bare text and no trailing status byte
fn replies_with_text(command: MsrCommand) -> bool {
    matches!(command, MsrCommand::VersionReport)
}

/// Classify a status byte. Total over all byte values.
pub fn classify_status(byte: u8) -> Status {
    match byte & 0x7F {
        0x21 => Status::InvalidCommand,
        0x28 => Status::CardSpeedMeasurementStart,
        0x29 => Status::CardSpeedMeasurementEnd,
        0x2A => Status::Error,
        0x2B => Status::NoDataFound,
        0x2D => Status::InsufficientLeadingZeros,
        0x2F => Status::FirstLsbCharNotOne,
        0x31 => Status::UnsuccessfulReadAfterWriteTrack1,
        0x32 => Status::UnsuccessfulReadAfterWriteTrack2,
        0x33 => Status::UnsuccessfulReadAfterWriteTrack3,
        0x3A => Status::PowerOnReport,
        0x5E => Status::AckCommandCompleted,
        _ => Status::UnknownResponse,
    }
}

/// Marker type for the MSR206 protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Msr206;

impl Protocol for Msr206 {
    type Command = MsrCommand;

    const NAME: &'static str = "msr206";

    fn commands() -> &'static [CommandSpec<MsrCommand>] {
        &COMMANDS
    }

    fn spec(command: MsrCommand) -> &'static CommandSpec<MsrCommand> {
        &COMMANDS[command as usize]
    }

    fn framing() -> FrameDiscipline {
        FrameDiscipline::Quiescence
    }

    fn encode(command: MsrCommand, params: &Params) -> Result<Vec<u8>> {
        let spec = Self::spec(command);
        let data = spec.param_bytes(params)?;

        let mut cmd = spec.opcode.to_vec();
        if !data.is_empty() {
            cmd.extend_from_slice(&data);
            if spec.destructive {
                cmd.push(EOT);
            }
        }
        Ok(cmd)
    }

    fn parse(frame: &Frame, command: MsrCommand) -> ParsedResponse {
        let name = Self::name_of(command);
        let bytes = frame.as_bytes();

        let Some((&last, rest)) = bytes.split_last() else {
            return ParsedResponse::new(name, bytes, None, Status::UnknownResponse, &[], String::new());
        };

        if replies_with_text(command) {
            return ParsedResponse::new(
                name,
                bytes,
                None,
                Status::AckCommandCompleted,
                bytes,
                decode_payload(bytes),
            );
        }

        let status = classify_status(last);
        let payload = if status == Status::UnknownResponse {
            bytes
        } else {
            rest
        };

        ParsedResponse::new(name, bytes, Some(last), status, payload, decode_payload(payload))
    }

    fn arm_sequence() -> &'static [MsrCommand] {
        &[MsrCommand::RedOff, MsrCommand::GreenOff, MsrCommand::YellowOn]
    }

    fn idle_sequence() -> &'static [MsrCommand] {
        &[MsrCommand::YellowOff, MsrCommand::GreenOff, MsrCommand::RedOff]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params_for(spec: &CommandSpec<MsrCommand>) -> Params {
        match spec.params {
            ParamShape::None => Params::None,
            ParamShape::Switch => Params::Switch(true),
            ParamShape::Byte => Params::Byte(0x10),
            ParamShape::Bytes => Params::Bytes(b"%B123?".to_vec()),
        }
    }

    #[test]
    fn test_table_is_in_discriminant_order() {
        for (i, spec) in COMMANDS.iter().enumerate() {
            assert_eq!(spec.command as usize, i, "{}", spec.name);
        }
    }

    #[test]
    fn test_table_names_are_unique() {
        for spec in COMMANDS.iter() {
            assert_eq!(Msr206::lookup(spec.name).unwrap(), spec.command);
        }
    }

    #[test]
    fn test_encode_arm_to_read() {
        assert_eq!(Msr206::encode(MsrCommand::ArmToRead, &Params::None).unwrap(), [0x50]);
    }

    #[test]
    fn test_encode_proto_usi0() {
        let cmd = Msr206::encode(MsrCommand::ProtoUsi0, &Params::None).unwrap();
        assert_eq!(cmd, [0x55, 0x53, 0x49, 0x30]);
    }

    #[test]
    fn test_encode_is_deterministic() {
        for spec in COMMANDS.iter() {
            let params = params_for(spec);
            let a = Msr206::encode(spec.command, &params).unwrap();
            let b = Msr206::encode(spec.command, &params).unwrap();
            assert_eq!(a, b, "{}", spec.name);
            assert!(a.starts_with(spec.opcode));
        }
    }

    #[test]
    fn test_encode_load_appends_eot() {
        let data = encode_payload("12").unwrap();
        let cmd = Msr206::encode(MsrCommand::LoadIsoTrack2, &Params::Bytes(data.clone())).unwrap();
        assert_eq!(cmd[0], 0x57);
        assert_eq!(&cmd[1..3], data.as_slice());
        assert_eq!(*cmd.last().unwrap(), EOT);
    }

    #[test]
    fn test_encode_write_current_has_no_eot() {
        let cmd = Msr206::encode(MsrCommand::SetDefaultWriteCurrent, &Params::Byte(0x20)).unwrap();
        assert_eq!(cmd, [0x5B, 0x20]);
    }

    #[test]
    fn test_encode_rejects_wrong_shape() {
        let result = Msr206::encode(MsrCommand::ArmToRead, &Params::Byte(1));
        assert!(matches!(result, Err(DeviceError::InvalidParameters(_))));

        let result = Msr206::encode(MsrCommand::LoadIsoTrack1, &Params::Byte(1));
        assert!(matches!(result, Err(DeviceError::InvalidParameters(_))));
    }

    #[test]
    fn test_lookup_unknown_command() {
        match Msr206::lookup("seek_for_tag") {
            Err(DeviceError::UnsupportedCommand { command, valid }) => {
                assert_eq!(command, "seek_for_tag");
                assert_eq!(valid.len(), COMMANDS.len());
                assert!(valid.contains(&"arm_to_read"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_classify_ack() {
        assert_eq!(classify_status(0x5E), Status::AckCommandCompleted);
        assert_eq!(classify_status(0xDE), Status::AckCommandCompleted);
    }

    #[test]
    fn test_classify_no_data_both_parities() {
        assert_eq!(classify_status(0x2B), Status::NoDataFound);
        assert_eq!(classify_status(0xAB), Status::NoDataFound);
    }

    #[test]
    fn test_classify_is_total() {
        let mut named = 0;
        for b in 0..=255u8 {
            if classify_status(b) != Status::UnknownResponse {
                named += 1;
            }
        }
        // 12 status codes, each with and without parity
        assert_eq!(named, 24);
    }

    #[test]
    fn test_payload_round_trip() {
        let printable: String = (0x20u8..=0x7E).map(|b| b as char).collect();
        for chunk in printable.as_bytes().chunks(79) {
            let text = std::str::from_utf8(chunk).unwrap();
            assert_eq!(decode_payload(&encode_payload(text).unwrap()), text);
        }
    }

    #[test]
    fn test_encoding_is_injective() {
        let mut seen = std::collections::HashSet::new();
        for b in 0x20u8..=0x7E {
            assert!(seen.insert(ENCODE[b as usize]));
        }
    }

    #[test]
    fn test_encode_payload_sets_odd_parity() {
        // '0' = 0x30 has two set bits, so the parity bit is added
        assert_eq!(encode_payload("0").unwrap(), [0xB0]);
        // '1' = 0x31 has three set bits
        assert_eq!(encode_payload("1").unwrap(), [0x31]);
    }

    #[test]
    fn test_encode_payload_rejects_non_printable() {
        assert!(matches!(
            encode_payload("AB\n"),
            Err(DeviceError::InvalidCharacter { ch: '\n', .. })
        ));
        assert!(matches!(
            encode_payload("é"),
            Err(DeviceError::InvalidCharacter { ch: 'é', .. })
        ));
    }

    #[test]
    fn test_decode_unknown_bytes_keep_going() {
        assert_eq!(decode_payload(&[0x41, 0x00, 0x42]), format!("A{}B", UNKNOWN_GLYPH));
    }

    #[test]
    fn test_parse_track_reply() {
        let mut bytes = encode_payload(";1234?").unwrap();
        bytes.push(0x5E);
        let response = Msr206::parse(&Frame::new(bytes.clone()), MsrCommand::TxIsoTrack2);

        assert_eq!(response.command(), "tx_iso_std_data_track2");
        assert_eq!(response.status(), Status::AckCommandCompleted);
        assert_eq!(response.status_code(), Some(0x5E));
        assert_eq!(response.decoded_text(), ";1234?");
        assert_eq!(response.raw_bytes(), bytes.as_slice());
        assert_eq!(response.binary_view().len(), bytes.len());
    }

    #[test]
    fn test_parse_no_data() {
        let response = Msr206::parse(&Frame::new(vec![0xAB]), MsrCommand::TxIsoTrack1);
        assert_eq!(response.status(), Status::NoDataFound);
        assert_eq!(response.decoded_text(), "");
    }

    #[test]
    fn test_parse_version_keeps_trailing_digit() {
        // '1' doubles as a status code; the version reply has no status byte
        let response = Msr206::parse(&Frame::new(b"REV2.1".to_vec()), MsrCommand::VersionReport);
        assert_eq!(response.status(), Status::AckCommandCompleted);
        assert_eq!(response.status_code(), None);
        assert_eq!(response.decoded_text(), "REV2.1");
    }

    #[test]
    fn test_parse_unknown_status_keeps_whole_frame() {
        let response = Msr206::parse(&Frame::new(b"ABC1.0X".to_vec()), MsrCommand::TxErrorData);
        assert_eq!(response.status(), Status::UnknownResponse);
        assert_eq!(response.decoded_text(), "ABC1.0X");
    }

    #[test]
    fn test_parse_empty_frame() {
        let response = Msr206::parse(&Frame::default(), MsrCommand::ArmToRead);
        assert_eq!(response.status(), Status::UnknownResponse);
        assert_eq!(response.status_code(), None);
        assert!(response.raw_bytes().is_empty());
    }

    #[test]
    fn test_track_command_helpers() {
        assert_eq!(
            MsrCommand::read_track(3, TrackFormat::IsoAlt).unwrap(),
            MsrCommand::TxAltIsoTrack3
        );
        assert_eq!(
            MsrCommand::load_track(1, TrackFormat::Raw).unwrap(),
            MsrCommand::LoadRawTrack1
        );
        assert!(MsrCommand::read_track(0, TrackFormat::Iso).is_err());
        assert!(MsrCommand::load_track(4, TrackFormat::Iso).is_err());
        assert_eq!(
            MsrCommand::write_density(2, WriteDensity::Bpi75).unwrap(),
            MsrCommand::SetWriteDensity75Track2
        );
    }
}
