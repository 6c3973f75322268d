//! Magnetic stripe workflows on an MSR206 session

use log::{info, warn};
use std::path::Path;

use crate::clock::Clock;
use crate::msr206::{encode_payload, Msr206, MsrCommand, WriteDensity};
use crate::persist::BackupFile;
use crate::protocol::{Params, Protocol};
use crate::session::DeviceSession;
use crate::transport::DeviceTransport;
use crate::types::{
    track_capacity, DeviceError, ParsedResponse, Result, Status, TrackData, TrackFormat,
};
use crate::workflow::{compare_units, summarize, Confirm, Mode, WorkflowState, WriteOutcome};

/// Front panel LEDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Red,
    Green,
    Yellow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorMode {
    On,
    Off,
    Flash,
}

impl Indicator {
    fn command(self, mode: IndicatorMode) -> MsrCommand {
        use IndicatorMode::*;
        use MsrCommand::*;
        match (self, mode) {
            (Indicator::Red, On) => RedOn,
            (Indicator::Red, Off) => RedOff,
            (Indicator::Red, Flash) => RedFlash,
            (Indicator::Green, On) => GreenOn,
            (Indicator::Green, Off) => GreenOff,
            (Indicator::Green, Flash) => GreenFlash,
            (Indicator::Yellow, On) => YellowOn,
            (Indicator::Yellow, Off) => YellowOff,
            (Indicator::Yellow, Flash) => YellowFlash,
        }
    }
}

/// Check every track fits its capacity and holds only encodable characters.
///
/// Runs before anything is sent, so a bad payload never reaches the device.
pub fn validate_tracks(tracks: &[TrackData]) -> Result<()> {
    for track in tracks {
        let max = track_capacity(track.track)
            .ok_or_else(|| DeviceError::invalid(format!("no track {}", track.track)))?;
        let len = match track.format {
            TrackFormat::Raw if !track.raw.is_empty() => track.raw.len(),
            _ => track.text.chars().count(),
        };
        if len > max {
            return Err(DeviceError::PayloadTooLong {
                unit: track.label(),
                len,
                max,
            });
        }
        track_bytes(track)?;
    }
    Ok(())
}

/// Bytes loaded into the writer for one track
fn track_bytes(track: &TrackData) -> Result<Vec<u8>> {
    if track.format == TrackFormat::Raw && !track.raw.is_empty() {
        return Ok(track.raw.clone());
    }
    encode_payload(&track.text).map_err(|e| match e {
        DeviceError::InvalidCharacter { ch, .. } => DeviceError::InvalidCharacter {
            unit: track.label(),
            ch,
        },
        other => other,
    })
}

fn track_from_response(track: u8, format: TrackFormat, response: &ParsedResponse) -> TrackData {
    TrackData {
        track,
        format,
        text: response.decoded_text().to_string(),
        raw: response.payload().to_vec(),
        status: response.status(),
    }
}

/// Formats in first-seen order
fn formats_of(tracks: &[TrackData]) -> Vec<TrackFormat> {
    let mut formats = Vec::new();
    for track in tracks {
        if !formats.contains(&track.format) {
            formats.push(track.format);
        }
    }
    formats
}

impl<T: DeviceTransport, C: Clock> DeviceSession<Msr206, T, C> {
    pub fn indicator(&mut self, led: Indicator, mode: IndicatorMode) -> Result<()> {
        self.send(led.command(mode), &Params::None)
    }

    pub fn indicators_off(&mut self) -> Result<()> {
        self.run_sequence(Msr206::idle_sequence())
    }

    /// Firmware revision string
    pub fn version_report(&mut self) -> Result<String> {
        let response = self.exec(MsrCommand::VersionReport, &Params::None)?;
        Ok(response.decoded_text().to_string())
    }

    pub fn set_write_density(&mut self, track: u8, density: WriteDensity) -> Result<()> {
        let command = MsrCommand::write_density(track, density)?;
        let response = self.exec(command, &Params::None)?;
        if response.status().is_terminal_failure() {
            return Err(DeviceError::MediumFailure {
                command: response.command().to_string(),
                status: response.status(),
            });
        }
        Ok(())
    }

    /// Wait for a swipe, then fetch all three tracks in each of `formats`.
    ///
    /// Blank tracks come back as empty units with status `no_data_found`.
    pub fn read_card(&mut self, formats: &[TrackFormat]) -> Result<Vec<TrackData>> {
        self.guarded(|s| s.swipe_and_read(formats))
    }

    fn swipe_and_read(&mut self, formats: &[TrackFormat]) -> Result<Vec<TrackData>> {
        self.run_sequence(Msr206::arm_sequence())?;
        self.send(MsrCommand::ArmToRead, &Params::None)?;
        self.transition(WorkflowState::Armed(Mode::Read));

        info!("[{}] Swipe card", self.label());
        self.transition(WorkflowState::AwaitingMedium);
        self.await_terminal(MsrCommand::ArmToRead)?;

        self.transition(WorkflowState::Transferring);
        let mut tracks = Vec::new();
        for &format in formats {
            for track in 1..=3 {
                let command = MsrCommand::read_track(track, format)?;
                let response = self.exec(command, &Params::None)?;
                if response.status().is_terminal_failure() && response.status() != Status::NoDataFound {
                    warn!(
                        "[{}] track{}:{} read failed: {}",
                        self.label(),
                        track,
                        format.as_str(),
                        response.status()
                    );
                }
                tracks.push(track_from_response(track, format, &response));
            }
        }
        Ok(tracks)
    }

    /// Write `tracks` to the next card swiped.
    ///
    /// The card is read first and its contents reported; nothing is written
    /// unless `confirm` agrees. Blank tracks are left untouched.
    pub fn write_card(
        &mut self,
        tracks: &[TrackData],
        confirm: &mut impl Confirm,
    ) -> Result<WriteOutcome<Vec<TrackData>>> {
        validate_tracks(tracks)?;
        self.guarded(|s| {
            let before = s.swipe_and_read(&formats_of(tracks))?;
            s.confirm_and_write(before, tracks, confirm)
        })
    }

    /// Read a card, let `edit` change the tracks, then write them back
    pub fn update_card(
        &mut self,
        formats: &[TrackFormat],
        edit: impl FnOnce(&mut Vec<TrackData>),
        confirm: &mut impl Confirm,
    ) -> Result<WriteOutcome<Vec<TrackData>>> {
        self.guarded(|s| {
            let before = s.swipe_and_read(formats)?;
            let mut tracks = before.clone();
            edit(&mut tracks);
            validate_tracks(&tracks)?;
            s.confirm_and_write(before, &tracks, confirm)
        })
    }

    /// Read a source card, then write its tracks to a second card
    pub fn clone_card(
        &mut self,
        format: TrackFormat,
        confirm: &mut impl Confirm,
    ) -> Result<WriteOutcome<Vec<TrackData>>> {
        let source: Vec<TrackData> = self
            .read_card(&[format])?
            .into_iter()
            .filter(|t| t.status.is_success() && !t.is_blank())
            .collect();
        info!("[{}] Source card:\n{}", self.label(), summarize(&source));
        self.write_card(&source, confirm)
    }

    /// Read a card and save it to `path`
    pub fn backup_card(&mut self, formats: &[TrackFormat], path: &Path) -> Result<Vec<TrackData>> {
        let tracks = self.read_card(formats)?;
        BackupFile::new(Msr206::NAME, "read_card", Status::AckCommandCompleted, tracks.clone())
            .save(path)?;
        Ok(tracks)
    }

    /// Write the tracks saved in `path` to a card
    pub fn restore_card(
        &mut self,
        path: &Path,
        confirm: &mut impl Confirm,
    ) -> Result<WriteOutcome<Vec<TrackData>>> {
        let backup: BackupFile<TrackData> = BackupFile::load(path, Msr206::NAME)?;
        let tracks: Vec<TrackData> = backup
            .units
            .into_iter()
            .filter(|t| !t.is_blank())
            .collect();
        self.write_card(&tracks, confirm)
    }

    fn confirm_and_write(
        &mut self,
        before: Vec<TrackData>,
        tracks: &[TrackData],
        confirm: &mut impl Confirm,
    ) -> Result<WriteOutcome<Vec<TrackData>>> {
        info!("[{}] Card before write:\n{}", self.label(), summarize(&before));

        let prompt = format!("Write to card?\n{}", summarize(tracks));
        if !confirm.confirm(&prompt) {
            info!("[{}] Write declined, card untouched", self.label());
            return Ok(WriteOutcome::Declined { before });
        }

        let to_write: Vec<&TrackData> = tracks.iter().filter(|t| !t.is_blank()).collect();
        let with_raw = to_write.iter().any(|t| t.format == TrackFormat::Raw);
        let arm = MsrCommand::arm_to_write(with_raw);

        self.run_sequence(Msr206::arm_sequence())?;
        self.send(arm, &Params::None)?;
        self.transition(WorkflowState::Armed(Mode::Write));

        self.transition(WorkflowState::Transferring);
        for track in &to_write {
            let command = MsrCommand::load_track(track.track, track.format)?;
            self.send(command, &Params::Bytes(track_bytes(track)?))?;
        }

        info!("[{}] Swipe card to write", self.label());
        self.transition(WorkflowState::AwaitingMedium);
        self.await_terminal(arm)?;

        let expected: Vec<TrackData> = to_write.into_iter().cloned().collect();
        if !self.config().verify_writes {
            return Ok(WriteOutcome::Written {
                before,
                written: expected,
                mismatches: Vec::new(),
            });
        }

        self.transition(WorkflowState::Verifying);
        info!("[{}] Swipe card again to verify", self.label());
        let written = self.swipe_and_read(&formats_of(&expected))?;
        let mismatches = compare_units(&expected, &written);
        for m in &mismatches {
            warn!(
                "[{}] {} verify mismatch: wrote {:?}, read {:?}",
                self.label(),
                m.unit,
                m.expected,
                m.actual
            );
        }
        Ok(WriteOutcome::Written {
            before,
            written,
            mismatches,
        })
    }
}
