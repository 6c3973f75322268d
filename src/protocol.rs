//! Command tables and the per-device protocol seam

use crate::types::{DeviceError, ParsedResponse, Result};

/// Parameters attached to a command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Params {
    #[default]
    None,
    /// On/off switch, sent as 0x01/0x00
    Switch(bool),
    Byte(u8),
    Bytes(Vec<u8>),
}

impl Params {
    fn shape_name(&self) -> &'static str {
        match self {
            Params::None => "none",
            Params::Switch(_) => "switch",
            Params::Byte(_) => "byte",
            Params::Bytes(_) => "byte list",
        }
    }
}

/// What a command accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamShape {
    None,
    Switch,
    Byte,
    Bytes,
}

/// How a reply's payload is rendered as text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadView {
    Text,
    Hex,
}

/// One row of a protocol's static command table
#[derive(Debug)]
pub struct CommandSpec<C: 'static> {
    pub command: C,
    pub name: &'static str,
    pub opcode: &'static [u8],
    pub params: ParamShape,
    /// Device answers with a frame
    pub reply: bool,
    /// Changes what is stored on the medium
    pub destructive: bool,
    pub view: PayloadView,
}

impl<C> CommandSpec<C> {
    /// Check `params` against the table row and return the bytes they contribute
    pub fn param_bytes(&self, params: &Params) -> Result<Vec<u8>> {
        match (self.params, params) {
            (ParamShape::None, Params::None) => Ok(Vec::new()),
            (ParamShape::Switch, Params::Switch(on)) => Ok(vec![u8::from(*on)]),
            (ParamShape::Byte, Params::Byte(b)) => Ok(vec![*b]),
            (ParamShape::Bytes, Params::Bytes(bytes)) if !bytes.is_empty() => Ok(bytes.clone()),
            (ParamShape::Bytes, Params::Bytes(_)) => Err(DeviceError::invalid(format!(
                "`{}` requires a non-empty byte list",
                self.name
            ))),
            (expected, got) => Err(DeviceError::invalid(format!(
                "`{}` takes {:?} parameters, got {}",
                self.name,
                expected,
                got.shape_name()
            ))),
        }
    }
}

/// How the end of a response is detected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDiscipline {
    /// Byte at `length_offset` plus `overhead` gives the frame size
    LengthPrefixed { length_offset: usize, overhead: usize },
    /// Frame ends when the buffer stops growing. Best effort: a pause
    /// mid-transmission looks the same as the end of the reply.
    Quiescence,
}

/// One complete response, as accumulated from the transport
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A device protocol: command table, wire encoding, framing and reply parsing.
///
/// Implemented by zero-sized marker types so a session can be typed by the
/// device it talks to.
pub trait Protocol {
    type Command: Copy + Eq + std::fmt::Debug + 'static;

    const NAME: &'static str;

    /// The full command table, in discriminant order
    fn commands() -> &'static [CommandSpec<Self::Command>];

    fn spec(command: Self::Command) -> &'static CommandSpec<Self::Command>;

    fn framing() -> FrameDiscipline;

    /// Byte sequence to transmit for `command`
    fn encode(command: Self::Command, params: &Params) -> Result<Vec<u8>>;

    /// Turn one complete frame into a response. Never fails.
    fn parse(frame: &Frame, command: Self::Command) -> ParsedResponse;

    /// Commands that light the ready/armed indicators
    fn arm_sequence() -> &'static [Self::Command] {
        &[]
    }

    /// Commands that turn every indicator off
    fn idle_sequence() -> &'static [Self::Command] {
        &[]
    }

    /// Resolve a command by name
    fn lookup(name: &str) -> Result<Self::Command> {
        Self::commands()
            .iter()
            .find(|spec| spec.name == name)
            .map(|spec| spec.command)
            .ok_or_else(|| DeviceError::UnsupportedCommand {
                command: name.to_string(),
                valid: Self::commands().iter().map(|spec| spec.name).collect(),
            })
    }

    fn name_of(command: Self::Command) -> &'static str {
        Self::spec(command).name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: CommandSpec<u8> = CommandSpec {
        command: 0,
        name: "load",
        opcode: &[0x56],
        params: ParamShape::Bytes,
        reply: false,
        destructive: true,
        view: PayloadView::Text,
    };

    #[test]
    fn test_param_bytes_accepts_matching_shape() {
        assert_eq!(SPEC.param_bytes(&Params::Bytes(vec![1, 2])).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_param_bytes_rejects_scalar_for_list() {
        assert!(matches!(
            SPEC.param_bytes(&Params::Byte(1)),
            Err(DeviceError::InvalidParameters(_))
        ));
        assert!(matches!(
            SPEC.param_bytes(&Params::None),
            Err(DeviceError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_param_bytes_rejects_empty_list() {
        assert!(matches!(
            SPEC.param_bytes(&Params::Bytes(vec![])),
            Err(DeviceError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_switch_encoding() {
        let spec = CommandSpec {
            params: ParamShape::Switch,
            ..SPEC
        };
        assert_eq!(spec.param_bytes(&Params::Switch(true)).unwrap(), vec![0x01]);
        assert_eq!(spec.param_bytes(&Params::Switch(false)).unwrap(), vec![0x00]);
    }
}
