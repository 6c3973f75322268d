//! Workflow states, confirmation gate and write outcomes

use serde::Serialize;

use crate::msr206::encode_payload;
use crate::types::{
    bytes_to_hex, BlockData, DeviceError, ParsedResponse, Result, TagData, TrackData, TrackFormat,
};

/// Direction a reader/writer is armed for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    Write,
}

/// Where a session is in a read/write workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    Armed(Mode),
    AwaitingMedium,
    Transferring,
    Verifying,
    Error,
}

/// Asks a human before anything is written to a medium.
///
/// Closures taking the prompt implement this, so tests and UIs can inject
/// their own answer.
pub trait Confirm {
    fn confirm(&mut self, prompt: &str) -> bool;
}

impl<F: FnMut(&str) -> bool> Confirm for F {
    fn confirm(&mut self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Terminal prompt reading `y`/`yes` from stdin
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&mut self, prompt: &str) -> bool {
        use std::io::Write;

        print!("{} [y/N] ", prompt);
        let _ = std::io::stdout().flush();
        let mut answer = String::new();
        if std::io::stdin().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

/// A unit whose read-back differed from what was written
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub unit: String,
    pub expected: String,
    pub actual: String,
}

impl From<Mismatch> for DeviceError {
    fn from(m: Mismatch) -> Self {
        DeviceError::WriteVerificationMismatch {
            unit: m.unit,
            expected: m.expected,
            actual: m.actual,
        }
    }
}

/// Result of a destructive operation
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome<D> {
    /// Confirmation refused; nothing was written
    Declined { before: D },
    /// `written` is what the medium holds afterwards (read back when
    /// verification is on)
    Written {
        before: D,
        written: D,
        mismatches: Vec<Mismatch>,
    },
}

impl<D> WriteOutcome<D> {
    pub fn is_declined(&self) -> bool {
        matches!(self, WriteOutcome::Declined { .. })
    }

    pub fn before(&self) -> &D {
        match self {
            WriteOutcome::Declined { before } | WriteOutcome::Written { before, .. } => before,
        }
    }

    pub fn mismatches(&self) -> &[Mismatch] {
        match self {
            WriteOutcome::Declined { .. } => &[],
            WriteOutcome::Written { mismatches, .. } => mismatches,
        }
    }

    /// What the medium holds now: the before-state if declined
    pub fn into_current(self) -> D {
        match self {
            WriteOutcome::Declined { before } => before,
            WriteOutcome::Written { written, .. } => written,
        }
    }

    /// Like [`into_current`](Self::into_current), but the first mismatch is an error
    pub fn verified(self) -> Result<D> {
        match self {
            WriteOutcome::Written { mut mismatches, .. } if !mismatches.is_empty() => {
                Err(mismatches.swap_remove(0).into())
            }
            other => Ok(other.into_current()),
        }
    }
}

/// Anything other than a success status fails the command
pub(crate) fn require_success(response: ParsedResponse) -> Result<ParsedResponse> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(DeviceError::MediumFailure {
            command: response.command().to_string(),
            status: response.status(),
        })
    }
}

/// Something that can be written and read back unit by unit
pub(crate) trait Unit {
    fn key(&self) -> String;
    fn content(&self) -> String;
}

impl Unit for TrackData {
    fn key(&self) -> String {
        self.label()
    }

    /// Raw tracks compare by their bytes
    fn content(&self) -> String {
        match self.format {
            TrackFormat::Raw if !self.raw.is_empty() => bytes_to_hex(&self.raw),
            TrackFormat::Raw => encode_payload(&self.text)
                .map(|bytes| bytes_to_hex(&bytes))
                .unwrap_or_else(|_| self.text.clone()),
            _ => self.text.clone(),
        }
    }
}

impl Unit for BlockData {
    fn key(&self) -> String {
        self.label()
    }

    fn content(&self) -> String {
        self.text.clone()
    }
}

/// Compare every expected unit against the read-back with the same key
pub(crate) fn compare_units<U: Unit>(expected: &[U], actual: &[U]) -> Vec<Mismatch> {
    expected
        .iter()
        .filter_map(|want| {
            let key = want.key();
            let got = actual
                .iter()
                .find(|u| u.key() == key)
                .map(Unit::content)
                .unwrap_or_default();
            (got != want.content()).then(|| Mismatch {
                unit: key,
                expected: want.content(),
                actual: got,
            })
        })
        .collect()
}

/// One line per unit, for before-state reports and prompts
pub(crate) fn summarize<U: Unit>(units: &[U]) -> String {
    units
        .iter()
        .map(|u| format!("{} = {:?}", u.key(), u.content()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn summarize_tag(tag: &TagData) -> String {
    format!(
        "{:?} {}\n{}",
        tag.tag.tag_type,
        tag.tag.uid,
        summarize(&tag.blocks)
    )
}
