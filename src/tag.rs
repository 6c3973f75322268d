//! Mifare tag workflows on an SM130 session

use log::{info, warn};
use std::path::Path;

use crate::clock::Clock;
use crate::persist::BackupFile;
use crate::protocol::{Params, Protocol};
use crate::session::DeviceSession;
use crate::sm130::{parse_tag, KeyRef, RfidCommand, Sm130};
use crate::transport::DeviceTransport;
use crate::types::{
    bytes_to_hex, BlockData, DeviceError, Result, Status, TagData, TagInfo, TagType,
};
use crate::workflow::{
    compare_units, require_success, summarize_tag, Confirm, Mode, WorkflowState, WriteOutcome,
};

/// Largest block any supported tag has
const MAX_BLOCK_SIZE: usize = 16;

/// Checks that need no tag in the field
fn precheck_blocks(blocks: &[BlockData]) -> Result<()> {
    for block in blocks {
        if block.block == 0 {
            return Err(DeviceError::invalid("block 0 holds the manufacturer data"));
        }
        if block.data.len() > MAX_BLOCK_SIZE {
            return Err(DeviceError::PayloadTooLong {
                unit: block.label(),
                len: block.data.len(),
                max: MAX_BLOCK_SIZE,
            });
        }
    }
    Ok(())
}

/// Refuse protected or out of range blocks and oversized data for `tag_type`
pub fn check_block_write(tag_type: TagType, block: u8, data: &[u8]) -> Result<()> {
    if block as usize >= tag_type.block_count() {
        return Err(DeviceError::invalid(format!(
            "{:?} has no block {}",
            tag_type, block
        )));
    }
    if tag_type.is_protected(block) {
        return Err(DeviceError::invalid(format!(
            "block {} of a {:?} tag is protected",
            block, tag_type
        )));
    }
    if data.len() > tag_type.block_size() {
        return Err(DeviceError::PayloadTooLong {
            unit: format!("block{}", block),
            len: data.len(),
            max: tag_type.block_size(),
        });
    }
    Ok(())
}

fn needs_login(tag_type: TagType) -> bool {
    tag_type != TagType::MifareUltralight
}

/// `data` zero-padded to a full block
fn padded(tag_type: TagType, block: &BlockData) -> BlockData {
    let mut data = block.data.clone();
    data.resize(tag_type.block_size(), 0);
    BlockData::new(block.block, &data)
}

fn all_blocks(tag_type: TagType) -> Vec<u8> {
    (0..tag_type.block_count()).map(|b| b as u8).collect()
}

impl<T: DeviceTransport, C: Clock> DeviceSession<Sm130, T, C> {
    pub fn antenna(&mut self, on: bool) -> Result<()> {
        let response = self.exec(RfidCommand::AntennaPower, &Params::Switch(on))?;
        require_success(response).map(|_| ())
    }

    pub fn firmware(&mut self) -> Result<String> {
        let response = require_success(self.exec(RfidCommand::Firmware, &Params::None)?)?;
        Ok(response.decoded_text().to_string())
    }

    /// Wait for a tag to enter the field
    pub fn seek_tag(&mut self) -> Result<TagInfo> {
        let mut response = self.exec(RfidCommand::SeekForTag, &Params::None)?;
        if !response.status().is_terminal() {
            response = self.await_terminal(RfidCommand::SeekForTag)?;
        }
        let response = require_success(response)?;
        parse_tag(&response).ok_or_else(|| DeviceError::MediumFailure {
            command: response.command().to_string(),
            status: Status::UnknownResponse,
        })
    }

    /// Tag currently in the field, if any
    pub fn select_tag(&mut self) -> Result<Option<TagInfo>> {
        let response = self.exec(RfidCommand::SelectTag, &Params::None)?;
        if response.status() == Status::NoTagPresent {
            return Ok(None);
        }
        Ok(parse_tag(&require_success(response)?))
    }

    /// Log in to the sector holding `block`
    pub fn authenticate(&mut self, block: u8, key: KeyRef) -> Result<()> {
        let params = Params::Bytes(key.auth_params(block)?);
        let response = self.exec(RfidCommand::Authenticate, &params)?;
        match response.status() {
            Status::LoginSucceeded => Ok(()),
            status => {
                warn!("[{}] Login to block {} failed: {}", self.label(), block, status);
                Err(DeviceError::AuthenticationFailed { block, status })
            }
        }
    }

    /// Read one 16-byte block (four pages on Ultralight)
    pub fn read_block(&mut self, block: u8) -> Result<BlockData> {
        let response = require_success(self.exec(RfidCommand::ReadBlock, &Params::Byte(block))?)?;
        let data = match response.payload().split_first() {
            Some((&echo, data)) if echo == block => data,
            _ => {
                warn!(
                    "[{}] read_block {} reply does not echo the block: {}",
                    self.label(),
                    block,
                    response.decoded_text()
                );
                response.payload()
            }
        };
        Ok(BlockData::new(block, data))
    }

    /// Write one block, zero-padding `data` to the block size
    pub fn write_block(&mut self, tag_type: TagType, block: u8, data: &[u8]) -> Result<BlockData> {
        check_block_write(tag_type, block, data)?;
        let command = match tag_type {
            TagType::MifareUltralight => RfidCommand::Write4ByteBlock,
            _ => RfidCommand::WriteBlock,
        };

        let mut params = vec![block];
        params.extend_from_slice(data);
        params.resize(1 + tag_type.block_size(), 0);
        let response = require_success(self.exec(command, &Params::Bytes(params))?)?;

        let written = response.payload().get(1..).unwrap_or_default();
        Ok(BlockData::new(block, written))
    }

    pub fn halt(&mut self) -> Result<()> {
        require_success(self.exec(RfidCommand::Halt, &Params::None)?).map(|_| ())
    }

    /// Power the field and wait for a tag
    fn present_tag(&mut self, mode: Mode) -> Result<TagInfo> {
        self.antenna(true)?;
        self.transition(WorkflowState::Armed(mode));

        info!("[{}] Present tag", self.label());
        self.transition(WorkflowState::AwaitingMedium);
        let tag = self.seek_tag()?;
        info!("[{}] Found {:?} {}", self.label(), tag.tag_type, tag.uid);
        Ok(tag)
    }

    fn read_blocks(&mut self, tag: &TagInfo, key: KeyRef, blocks: &[u8]) -> Result<Vec<BlockData>> {
        self.transition(WorkflowState::Transferring);
        let size = tag.tag_type.block_size();
        let mut read = Vec::with_capacity(blocks.len());
        for &block in blocks {
            if needs_login(tag.tag_type) {
                self.authenticate(block, key)?;
            }
            let mut data = self.read_block(block)?.data;
            data.truncate(size);
            read.push(BlockData::new(block, &data));
        }
        Ok(read)
    }

    /// Read `blocks` (every block when `None`) from the next tag presented
    pub fn read_tag(&mut self, key: KeyRef, blocks: Option<&[u8]>) -> Result<TagData> {
        self.guarded(|s| {
            let tag = s.present_tag(Mode::Read)?;
            let numbers = blocks.map(<[u8]>::to_vec).unwrap_or_else(|| all_blocks(tag.tag_type));
            let blocks = s.read_blocks(&tag, key, &numbers)?;
            Ok(TagData { tag, blocks })
        })
    }

    /// Write `blocks` to the next tag presented.
    ///
    /// The blocks are read first and reported; nothing is written unless
    /// `confirm` agrees. Manufacturer and sector trailer blocks are refused.
    pub fn write_tag(
        &mut self,
        key: KeyRef,
        blocks: &[BlockData],
        confirm: &mut impl Confirm,
    ) -> Result<WriteOutcome<TagData>> {
        precheck_blocks(blocks)?;
        self.guarded(|s| {
            let tag = s.present_tag(Mode::Write)?;
            for block in blocks {
                check_block_write(tag.tag_type, block.block, &block.data)?;
            }
            let numbers: Vec<u8> = blocks.iter().map(|b| b.block).collect();
            let before = s.read_blocks(&tag, key, &numbers)?;
            s.confirm_and_write(TagData { tag, blocks: before }, blocks, key, confirm)
        })
    }

    /// Read a tag, let `edit` change its blocks, then write back the ones
    /// that changed
    pub fn update_tag(
        &mut self,
        key: KeyRef,
        blocks: &[u8],
        edit: impl FnOnce(&mut TagData),
        confirm: &mut impl Confirm,
    ) -> Result<WriteOutcome<TagData>> {
        self.guarded(|s| {
            let tag = s.present_tag(Mode::Write)?;
            let before = TagData {
                blocks: s.read_blocks(&tag, key, blocks)?,
                tag,
            };

            let mut edited = before.clone();
            edit(&mut edited);
            let changed: Vec<BlockData> = edited
                .blocks
                .into_iter()
                .filter(|b| !before.blocks.iter().any(|old| old.block == b.block && old.data == b.data))
                .collect();
            for block in &changed {
                check_block_write(before.tag.tag_type, block.block, &block.data)?;
            }
            s.confirm_and_write(before, &changed, key, confirm)
        })
    }

    /// Read every block of a source tag, then write the writable ones to a
    /// second tag
    pub fn clone_tag(&mut self, key: KeyRef, confirm: &mut impl Confirm) -> Result<WriteOutcome<TagData>> {
        let source = self.read_tag(key, None)?;
        let blocks: Vec<BlockData> = source
            .blocks
            .into_iter()
            .filter(|b| !source.tag.tag_type.is_protected(b.block))
            .collect();
        info!("[{}] Remove {} and present the target tag", self.label(), source.tag.uid);
        self.write_tag(key, &blocks, confirm)
    }

    /// Read every block and save the tag to `path`
    pub fn backup_tag(&mut self, key: KeyRef, path: &Path) -> Result<TagData> {
        let tag = self.read_tag(key, None)?;
        BackupFile::new(Sm130::NAME, "read_tag", Status::AckCommandCompleted, tag.blocks.clone())
            .with_tag(tag.tag.clone())
            .save(path)?;
        Ok(tag)
    }

    /// Write the writable blocks saved in `path` to a tag
    pub fn restore_tag(
        &mut self,
        path: &Path,
        key: KeyRef,
        confirm: &mut impl Confirm,
    ) -> Result<WriteOutcome<TagData>> {
        let backup: BackupFile<BlockData> = BackupFile::load(path, Sm130::NAME)?;
        let tag_type = backup
            .tag
            .map(|t| t.tag_type)
            .unwrap_or(TagType::MifareClassic1k);
        let blocks: Vec<BlockData> = backup
            .units
            .into_iter()
            .filter(|b| !tag_type.is_protected(b.block))
            .collect();
        self.write_tag(key, &blocks, confirm)
    }

    fn confirm_and_write(
        &mut self,
        before: TagData,
        blocks: &[BlockData],
        key: KeyRef,
        confirm: &mut impl Confirm,
    ) -> Result<WriteOutcome<TagData>> {
        info!("[{}] Tag before write:\n{}", self.label(), summarize_tag(&before));

        let tag = before.tag.clone();
        let expected: Vec<BlockData> = blocks.iter().map(|b| padded(tag.tag_type, b)).collect();
        let prompt = format!(
            "Write to tag {}?\n{}",
            tag.uid,
            summarize_tag(&TagData {
                tag: tag.clone(),
                blocks: expected.clone(),
            })
        );
        if !confirm.confirm(&prompt) {
            info!("[{}] Write declined, tag untouched", self.label());
            return Ok(WriteOutcome::Declined { before });
        }

        self.transition(WorkflowState::Transferring);
        for block in &expected {
            if needs_login(tag.tag_type) {
                self.authenticate(block.block, key)?;
            }
            self.write_block(tag.tag_type, block.block, &block.data)?;
        }

        if !self.config().verify_writes {
            return Ok(WriteOutcome::Written {
                before,
                written: TagData {
                    tag,
                    blocks: expected,
                },
                mismatches: Vec::new(),
            });
        }

        self.transition(WorkflowState::Verifying);
        let numbers: Vec<u8> = expected.iter().map(|b| b.block).collect();
        let read_back = self.read_blocks(&tag, key, &numbers)?;
        let mismatches = compare_units(&expected, &read_back);
        for m in &mismatches {
            warn!(
                "[{}] {} verify mismatch: wrote {}, read {}",
                self.label(),
                m.unit,
                m.expected,
                m.actual
            );
        }
        Ok(WriteOutcome::Written {
            before,
            written: TagData {
                tag,
                blocks: read_back,
            },
            mismatches,
        })
    }
}

/// Hex dump of a tag, one block per line
pub fn dump(tag: &TagData) -> String {
    tag.blocks
        .iter()
        .map(|b| format!("{:>3}: {}", b.block, bytes_to_hex(&b.data)))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::SessionConfig;
    use crate::mock::MockTransport;
    use crate::sm130::checksum;

    const UID: [u8; 4] = [0xDE, 0xAD, 0xBE, 0xEF];

    fn reply(cmd: u8, data: &[u8]) -> Vec<u8> {
        let mut body = vec![(data.len() + 1) as u8, cmd];
        body.extend_from_slice(data);
        let mut bytes = vec![0xFF, 0x00];
        bytes.extend_from_slice(&body);
        bytes.push(checksum(&body));
        bytes
    }

    fn block_reply(cmd: u8, block: u8, data: &[u8]) -> Vec<u8> {
        let mut payload = vec![block];
        payload.extend_from_slice(data);
        reply(cmd, &payload)
    }

    fn session(transport: MockTransport) -> DeviceSession<Sm130, MockTransport, ManualClock> {
        DeviceSession::with_clock(transport, ManualClock::new(), SessionConfig::with_label("rfid")).unwrap()
    }

    /// Antenna on, then a Classic 1K found after one seeking reply
    fn classic_in_field() -> MockTransport {
        let mut found = vec![0x02];
        found.extend_from_slice(&UID);
        MockTransport::new()
            .chunk(&reply(0x90, &[0x01]))
            .chunk(&reply(0x82, b"L"))
            .chunk(&reply(0x82, &found))
    }

    fn ultralight_in_field() -> MockTransport {
        MockTransport::new()
            .chunk(&reply(0x90, &[0x01]))
            .chunk(&reply(0x82, &[0x01, 0x04, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66]))
    }

    fn login_ok(transport: MockTransport) -> MockTransport {
        transport.chunk(&reply(0x85, b"L"))
    }

    fn writes_with_command(transport: &MockTransport, cmds: &[u8]) -> usize {
        transport
            .written
            .iter()
            .filter(|w| w.get(3).is_some_and(|c| cmds.contains(c)))
            .count()
    }

    #[test]
    fn test_seek_tag_waits_through_seeking() {
        let mut rfid = session(classic_in_field());
        rfid.antenna(true).unwrap();

        let tag = rfid.seek_tag().unwrap();
        assert_eq!(tag.tag_type, TagType::MifareClassic1k);
        assert_eq!(tag.uid, "DEADBEEF");
        assert!(rfid.transport().is_drained());
    }

    #[test]
    fn test_seek_tag_rf_off() {
        let mut rfid = session(MockTransport::new().chunk(&reply(0x82, b"U")));
        assert!(matches!(
            rfid.seek_tag(),
            Err(DeviceError::MediumFailure {
                status: Status::RfFieldOff,
                ..
            })
        ));
    }

    #[test]
    fn test_select_no_tag() {
        let mut rfid = session(MockTransport::new().chunk(&reply(0x83, b"N")));
        assert_eq!(rfid.select_tag().unwrap(), None);
    }

    #[test]
    fn test_firmware() {
        let mut rfid = session(MockTransport::new().chunk(&reply(0x81, b"UM1.3")));
        assert_eq!(rfid.firmware().unwrap(), "UM1.3");
    }

    #[test]
    fn test_authenticate_failure() {
        let mut rfid = session(MockTransport::new().chunk(&reply(0x85, b"U")));

        match rfid.authenticate(4, KeyRef::Transport) {
            Err(DeviceError::AuthenticationFailed { block, status }) => {
                assert_eq!(block, 4);
                assert_eq!(status, Status::LoginFailed);
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(
            rfid.transport().written,
            vec![vec![0xFF, 0x00, 0x03, 0x85, 0x04, 0xFF, 0x8B]]
        );
    }

    #[test]
    fn test_read_tag_classic() {
        let data = [0x42; 16];
        let transport = login_ok(classic_in_field()).chunk(&block_reply(0x86, 4, &data));
        let mut rfid = session(transport);

        let tag = rfid.read_tag(KeyRef::Transport, Some(&[4])).unwrap();
        assert_eq!(tag.tag.uid, "DEADBEEF");
        assert_eq!(tag.blocks.len(), 1);
        assert_eq!(tag.blocks[0].data, data);
        assert_eq!(tag.blocks[0].text, "42".repeat(16));
        assert_eq!(rfid.state(), WorkflowState::Idle);
    }

    #[test]
    fn test_read_tag_login_failure_cleans_up() {
        let transport = classic_in_field().chunk(&reply(0x85, b"E"));
        let mut rfid = session(transport);

        let result = rfid.read_tag(KeyRef::A([0; 6]), Some(&[8]));
        assert!(matches!(
            result,
            Err(DeviceError::AuthenticationFailed {
                block: 8,
                status: Status::InvalidKeyFormat
            })
        ));
        assert_eq!(rfid.state(), WorkflowState::Idle);
    }

    #[test]
    fn test_read_tag_ultralight_truncates_pages() {
        let transport = ultralight_in_field().chunk(&block_reply(0x86, 4, &[0x07; 16]));
        let mut rfid = session(transport);

        let tag = rfid.read_tag(KeyRef::Transport, Some(&[4])).unwrap();
        assert_eq!(tag.tag.tag_type, TagType::MifareUltralight);
        assert_eq!(tag.blocks[0].data, [0x07; 4]);
        // no login for Ultralight
        assert_eq!(writes_with_command(rfid.transport(), &[0x85]), 0);
    }

    #[test]
    fn test_declined_tag_write_sends_no_write_commands() {
        let transport = ultralight_in_field().chunk(&block_reply(0x86, 4, &[0x01, 0x02, 0x03, 0x04]));
        let mut rfid = session(transport);

        let outcome = rfid
            .write_tag(
                KeyRef::Transport,
                &[BlockData::new(4, &[0xAA, 0xBB])],
                &mut |_: &str| false,
            )
            .unwrap();

        assert!(outcome.is_declined());
        assert_eq!(outcome.before().blocks[0].data, [0x01, 0x02, 0x03, 0x04]);
        assert_eq!(writes_with_command(rfid.transport(), &[0x89, 0x8B]), 0);
    }

    #[test]
    fn test_write_tag_classic_and_verify() {
        let old = [0x00; 16];
        let mut new = [0x00; 16];
        new[..3].copy_from_slice(b"abc");

        let transport = login_ok(classic_in_field()).chunk(&block_reply(0x86, 5, &old));
        let transport = login_ok(transport).chunk(&block_reply(0x89, 5, &new));
        let transport = login_ok(transport).chunk(&block_reply(0x86, 5, &new));
        let mut rfid = session(transport);

        let outcome = rfid
            .write_tag(KeyRef::Transport, &[BlockData::new(5, b"abc")], &mut |_: &str| true)
            .unwrap();

        assert!(outcome.mismatches().is_empty());
        let written = outcome.verified().unwrap();
        assert_eq!(written.blocks[0].data, new);

        let write = rfid
            .transport()
            .written
            .iter()
            .find(|w| w[3] == 0x89)
            .unwrap();
        assert_eq!(write[2], 0x12);
        assert_eq!(write[4], 5);
        assert_eq!(&write[5..21], &new);
        assert!(rfid.transport().is_drained());
    }

    #[test]
    fn test_write_tag_verify_mismatch() {
        let transport = login_ok(classic_in_field()).chunk(&block_reply(0x86, 5, &[0; 16]));
        let transport = login_ok(transport).chunk(&block_reply(0x89, 5, &[0x11; 16]));
        let transport = login_ok(transport).chunk(&block_reply(0x86, 5, &[0x10; 16]));
        let mut rfid = session(transport);

        let outcome = rfid
            .write_tag(KeyRef::Transport, &[BlockData::new(5, &[0x11; 16])], &mut |_: &str| true)
            .unwrap();

        assert_eq!(outcome.mismatches().len(), 1);
        assert_eq!(outcome.mismatches()[0].unit, "block5");
        assert_eq!(outcome.into_current().blocks[0].data, [0x10; 16]);
    }

    #[test]
    fn test_manufacturer_block_rejected_before_io() {
        let mut rfid = session(MockTransport::new());
        let result = rfid.write_tag(KeyRef::Transport, &[BlockData::new(0, &[1])], &mut |_: &str| true);
        assert!(matches!(result, Err(DeviceError::InvalidParameters(_))));
        assert!(rfid.transport().written.is_empty());
    }

    #[test]
    fn test_oversized_block_rejected_before_io() {
        let mut rfid = session(MockTransport::new());
        let result = rfid.write_tag(KeyRef::Transport, &[BlockData::new(4, &[1; 17])], &mut |_: &str| true);
        assert!(matches!(
            result,
            Err(DeviceError::PayloadTooLong { len: 17, max: 16, .. })
        ));
        assert!(rfid.transport().written.is_empty());
    }

    #[test]
    fn test_sector_trailer_never_written() {
        let mut rfid = session(classic_in_field());
        let result = rfid.write_tag(KeyRef::Transport, &[BlockData::new(7, &[1])], &mut |_: &str| true);
        assert!(matches!(result, Err(DeviceError::InvalidParameters(_))));
        assert_eq!(writes_with_command(rfid.transport(), &[0x89, 0x8B]), 0);
        assert_eq!(rfid.state(), WorkflowState::Idle);
    }

    #[test]
    fn test_ultralight_page_limit() {
        assert!(check_block_write(TagType::MifareUltralight, 4, &[1; 4]).is_ok());
        assert!(matches!(
            check_block_write(TagType::MifareUltralight, 4, &[1; 5]),
            Err(DeviceError::PayloadTooLong { max: 4, .. })
        ));
        assert!(check_block_write(TagType::MifareUltralight, 16, &[1]).is_err());
    }

    #[test]
    fn test_update_tag_writes_changed_blocks_only() {
        let transport = login_ok(classic_in_field()).chunk(&block_reply(0x86, 4, &[0x01; 16]));
        let transport = login_ok(transport).chunk(&block_reply(0x86, 5, &[0x02; 16]));
        let transport = login_ok(transport).chunk(&block_reply(0x89, 5, &[0x09; 16]));
        let mut config = SessionConfig::with_label("rfid");
        config.verify_writes = false;
        let mut rfid = DeviceSession::<Sm130, _, _>::with_clock(transport, ManualClock::new(), config).unwrap();

        let outcome = rfid
            .update_tag(
                KeyRef::Transport,
                &[4, 5],
                |tag| tag.blocks[1] = BlockData::new(5, &[0x09; 16]),
                &mut |_: &str| true,
            )
            .unwrap();

        assert_eq!(outcome.before().blocks.len(), 2);
        let written = outcome.into_current();
        assert_eq!(written.blocks.len(), 1);
        assert_eq!(written.blocks[0].block, 5);
        assert_eq!(writes_with_command(rfid.transport(), &[0x89]), 1);
    }

    #[test]
    fn test_backup_and_restore_tag() {
        let path = std::env::temp_dir().join(format!("cardwire-tag-{}.json", std::process::id()));

        let mut transport = ultralight_in_field();
        for page in 0..16u8 {
            transport = transport.chunk(&block_reply(0x86, page, &[page; 16]));
        }
        let mut rfid = session(transport);
        let tag = rfid.backup_tag(KeyRef::Transport, &path).unwrap();
        assert_eq!(tag.blocks.len(), 16);
        assert_eq!(tag.blocks[15].data, [15; 4]);

        // restore skips pages 0-3
        let mut transport = ultralight_in_field();
        for page in 4..16u8 {
            transport = transport.chunk(&block_reply(0x86, page, &[0; 16]));
        }
        let mut rfid = session(transport);
        let mut prompt = String::new();
        let outcome = rfid
            .restore_tag(&path, KeyRef::Transport, &mut |p: &str| {
                prompt = p.to_string();
                false
            })
            .unwrap();

        assert!(outcome.is_declined());
        assert_eq!(outcome.before().blocks.len(), 12);
        assert_eq!(outcome.before().blocks[0].block, 4);
        assert!(prompt.contains("0F0F0F0F"));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_clone_tag_skips_protected_pages() {
        let mut transport = ultralight_in_field();
        for page in 0..16u8 {
            transport = transport.chunk(&block_reply(0x86, page, &[0xA0 + page; 16]));
        }
        // target tag
        transport = transport
            .chunk(&reply(0x90, &[0x01]))
            .chunk(&reply(0x82, &[0x01, 0x04, 0x77, 0x77, 0x77, 0x77, 0x77, 0x77]));
        for page in 4..16u8 {
            transport = transport.chunk(&block_reply(0x86, page, &[0; 16]));
        }
        for page in 4..16u8 {
            transport = transport.chunk(&block_reply(0x8B, page, &[0xA0 + page; 4]));
        }
        let mut config = SessionConfig::with_label("rfid");
        config.verify_writes = false;
        let mut rfid = DeviceSession::<Sm130, _, _>::with_clock(transport, ManualClock::new(), config).unwrap();

        let outcome = rfid.clone_tag(KeyRef::Transport, &mut |_: &str| true).unwrap();
        let written = outcome.into_current();
        assert_eq!(written.blocks.len(), 12);
        assert_eq!(written.blocks[0].data, [0xA4; 4]);
        assert_eq!(writes_with_command(rfid.transport(), &[0x8B]), 12);
        assert!(rfid.transport().is_drained());
    }

    #[test]
    fn test_dump() {
        let tag = TagData {
            tag: TagInfo {
                tag_type: TagType::MifareUltralight,
                uid: "04112233445566".into(),
            },
            blocks: vec![BlockData::new(4, &[0xCA, 0xFE, 0x00, 0x01])],
        };
        assert_eq!(dump(&tag), "  4: CAFE0001");
    }
}
