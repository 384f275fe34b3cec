use std::io::{BufWriter, Write};

use reft_odb::{NonTagPeeler, Peeler};
use reft_refs::{check_sorted, RefError, ReferenceUpdate};
use reft_types::HashAlgorithm;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::block::write_ref_block;
use crate::config::{WriterConfig, WRITE_BUFFER_SIZE};
use crate::error::{ReftableError, ReftableResult};
use crate::header::Header;
use crate::index::write_index_blocks;
use crate::record::IndexRecord;

/// Buffered sink for finished blocks that tracks the file position.
#[derive(Debug)]
pub struct BlockWriter<W: Write> {
    inner: BufWriter<W>,
    position: u64,
}

impl<W: Write> BlockWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            inner: BufWriter::with_capacity(WRITE_BUFFER_SIZE, out),
            position: 0,
        }
    }

    /// Append one block. Returns the block's offset in the file.
    pub fn write_block(&mut self, block: &[u8]) -> ReftableResult<u64> {
        let at = self.position;
        self.inner.write_all(block)?;
        self.position += block.len() as u64;
        Ok(at)
    }

    /// Bytes written so far, buffered or not.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn flush(&mut self) -> ReftableResult<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> ReftableResult<W> {
        self.inner.into_inner().map_err(|e| e.into_error().into())
    }
}

/// Lifecycle of a [`ReftableWriter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriterState {
    /// Nothing written yet.
    Empty,
    /// Ref blocks written; the index and final flush are pending.
    Writing,
    Finalized,
    /// An earlier call failed; the output is incomplete.
    Failed,
}

impl WriterState {
    fn describe(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Writing => "already holding refs",
            Self::Finalized => "already finalized",
            Self::Failed => "unusable after an earlier error",
        }
    }
}

/// What a finished write produced.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteSummary {
    pub ref_count: usize,
    pub ref_blocks: usize,
    pub index_blocks: usize,
    pub bytes_written: u64,
    pub min_update_index: u64,
    pub max_update_index: u64,
}

/// Writes one reftable to `W`.
///
/// All refs go in through a single [`write_refs`](Self::write_refs) call
/// because the header in block 0 carries the update index range of the
/// whole table. [`finish`](Self::finish) appends the index and flushes.
#[derive(Debug)]
pub struct ReftableWriter<W: Write> {
    out: BlockWriter<W>,
    config: WriterConfig,
    state: WriterState,
    index: Vec<IndexRecord>,
    summary: WriteSummary,
}

impl<W: Write> ReftableWriter<W> {
    pub fn new(out: W, config: WriterConfig) -> ReftableResult<Self> {
        config.validate()?;
        Ok(Self {
            out: BlockWriter::new(out),
            config,
            state: WriterState::Empty,
            index: Vec::new(),
            summary: WriteSummary::default(),
        })
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Write the ref blocks for `updates`, which must be sorted by name
    /// with no duplicates.
    pub fn write_refs<P: Peeler + ?Sized>(
        &mut self,
        updates: &[ReferenceUpdate],
        peeler: &P,
    ) -> ReftableResult<()> {
        if self.state != WriterState::Empty {
            return Err(ReftableError::InvalidState(self.state.describe()));
        }
        let result = self.write_ref_blocks(updates, peeler);
        self.state = match result {
            Ok(()) => WriterState::Writing,
            Err(_) => WriterState::Failed,
        };
        result
    }

    fn write_ref_blocks<P: Peeler + ?Sized>(
        &mut self,
        updates: &[ReferenceUpdate],
        peeler: &P,
    ) -> ReftableResult<()> {
        check_updates(updates)?;

        let min = updates.iter().map(|u| u.update_index).min().unwrap_or(0);
        let max = updates.iter().map(|u| u.update_index).max().unwrap_or(0);
        let header = Header::new(self.config.block_size, min, max)?;

        let mut start = 0;
        loop {
            let first = start == 0;
            let (block, next) = write_ref_block(
                updates,
                start,
                first.then_some(&header),
                &self.config,
                min,
                peeler,
            )?;
            let position = self.out.write_block(&block)?;
            debug!(position, records = next - start, "wrote ref block");

            if next > start {
                self.index.push(IndexRecord {
                    last_name: updates[next - 1].name.clone(),
                    block_position: position,
                });
            }
            self.summary.ref_blocks += 1;
            start = next;
            if start >= updates.len() {
                break;
            }
        }

        self.summary.ref_count = updates.len();
        self.summary.min_update_index = min;
        self.summary.max_update_index = max;
        Ok(())
    }

    /// Write the index, if one is wanted, and flush.
    ///
    /// A writer that never saw [`write_refs`](Self::write_refs) produces an
    /// empty table.
    pub fn finish(&mut self) -> ReftableResult<WriteSummary> {
        if self.state == WriterState::Empty {
            self.write_refs(&[], &NonTagPeeler)?;
        }
        if self.state != WriterState::Writing {
            return Err(ReftableError::InvalidState(self.state.describe()));
        }

        let result = self.write_index_and_flush();
        self.state = match result {
            Ok(()) => WriterState::Finalized,
            Err(_) => WriterState::Failed,
        };
        result?;

        self.summary.bytes_written = self.out.position();
        info!(
            refs = self.summary.ref_count,
            ref_blocks = self.summary.ref_blocks,
            index_blocks = self.summary.index_blocks,
            bytes = self.summary.bytes_written,
            "reftable written"
        );
        Ok(self.summary.clone())
    }

    fn write_index_and_flush(&mut self) -> ReftableResult<()> {
        if self.config.write_index && self.summary.ref_blocks > 1 {
            let blocks =
                write_index_blocks(&self.index, self.config.block_size, self.config.restart_gap)?;
            for block in &blocks {
                let position = self.out.write_block(block)?;
                debug!(position, "wrote index block");
            }
            self.summary.index_blocks = blocks.len();
        }
        self.out.flush()
    }

    /// Flush and return the output.
    pub fn into_inner(self) -> ReftableResult<W> {
        self.out.into_inner()
    }
}

fn check_updates(updates: &[ReferenceUpdate]) -> ReftableResult<()> {
    if let Some(update) = updates.iter().find(|u| u.name.is_empty()) {
        return Err(ReftableError::InvalidUpdate {
            name: update.name_lossy().into_owned(),
            reason: "ref name must not be empty".into(),
        });
    }
    check_sorted(updates).map_err(|e| match e {
        RefError::Unsorted { previous, name } => ReftableError::UnsortedUpdates { previous, name },
        RefError::InvalidName { name, reason } => ReftableError::InvalidUpdate { name, reason },
    })
}

/// Write `updates` as a complete reftable to `output`.
///
/// The hash algorithm is taken from the first update that carries an
/// object id, defaulting to SHA-1.
pub fn write_reftable<W: Write, P: Peeler + ?Sized>(
    output: W,
    block_size: u32,
    updates: &[ReferenceUpdate],
    peeler: &P,
) -> ReftableResult<WriteSummary> {
    let hash = updates
        .iter()
        .find_map(|u| u.new_oid)
        .map(|id| id.algorithm())
        .unwrap_or(HashAlgorithm::Sha1);
    let config = WriterConfig {
        block_size,
        hash,
        ..Default::default()
    };

    let mut writer = ReftableWriter::new(output, config)?;
    writer.write_refs(updates, peeler)?;
    let summary = writer.finish()?;
    writer.into_inner()?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;
    use reft_types::ObjectId;

    fn update(name: &str, index: u64) -> ReferenceUpdate {
        ReferenceUpdate::new(name, ObjectId::hash(HashAlgorithm::Sha1, name.as_bytes()))
            .with_update_index(index)
    }

    fn write(updates: &[ReferenceUpdate], config: WriterConfig) -> (Vec<u8>, WriteSummary) {
        let mut writer = ReftableWriter::new(Vec::new(), config).unwrap();
        writer.write_refs(updates, &NonTagPeeler).unwrap();
        let summary = writer.finish().unwrap();
        (writer.into_inner().unwrap(), summary)
    }

    #[test]
    fn empty_table_is_one_block() {
        let config = WriterConfig::with_block_size(256);
        let mut writer = ReftableWriter::new(Vec::new(), config).unwrap();
        let summary = writer.finish().unwrap();
        let bytes = writer.into_inner().unwrap();
        assert_eq!(bytes.len(), 256);
        assert_eq!(summary.ref_blocks, 1);
        assert_eq!(summary.ref_count, 0);
        assert_eq!(summary.index_blocks, 0);
        assert_eq!(summary.bytes_written, 256);
    }

    #[test]
    fn header_carries_update_range() {
        let updates = [update("refs/heads/a", 4), update("refs/heads/b", 9)];
        let (bytes, summary) = write(&updates, WriterConfig::with_block_size(1024));
        let header = Header::decode(&bytes).unwrap();
        assert_eq!(header.min_update_index, 4);
        assert_eq!(header.max_update_index, 9);
        assert_eq!(summary.min_update_index, 4);
        assert_eq!(summary.max_update_index, 9);
    }

    #[test]
    fn multi_block_table_gets_index() {
        let updates: Vec<_> = (0..100)
            .map(|i| update(&format!("refs/heads/topic-{i:03}"), 1))
            .collect();
        let (bytes, summary) = write(&updates, WriterConfig::with_block_size(512));
        assert!(summary.ref_blocks > 1);
        assert_eq!(summary.index_blocks, 1);
        assert_eq!(bytes.len() % 512, 0);
        assert_eq!(bytes.len() / 512, summary.ref_blocks + summary.index_blocks);

        let last = &bytes[bytes.len() - 512..];
        assert_eq!(Block::parse(last, 0, false).unwrap().block_type(), crate::BlockType::Index);
    }

    #[test]
    fn index_can_be_disabled() {
        let updates: Vec<_> = (0..100)
            .map(|i| update(&format!("refs/heads/topic-{i:03}"), 1))
            .collect();
        let config = WriterConfig {
            block_size: 512,
            write_index: false,
            ..Default::default()
        };
        let (_, summary) = write(&updates, config);
        assert_eq!(summary.index_blocks, 0);
    }

    #[test]
    fn unsorted_updates_are_rejected() {
        let updates = [update("refs/heads/b", 1), update("refs/heads/a", 1)];
        let mut writer = ReftableWriter::new(Vec::new(), WriterConfig::default()).unwrap();
        let err = writer.write_refs(&updates, &NonTagPeeler).unwrap_err();
        assert!(matches!(err, ReftableError::UnsortedUpdates { .. }));
        assert_eq!(writer.state(), WriterState::Failed);
        assert!(matches!(writer.finish(), Err(ReftableError::InvalidState(_))));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let updates = [update("refs/heads/a", 1), update("refs/heads/a", 2)];
        let mut writer = ReftableWriter::new(Vec::new(), WriterConfig::default()).unwrap();
        assert!(matches!(
            writer.write_refs(&updates, &NonTagPeeler),
            Err(ReftableError::UnsortedUpdates { .. })
        ));
    }

    #[test]
    fn empty_name_is_rejected() {
        let updates = [ReferenceUpdate::deletion("")];
        let mut writer = ReftableWriter::new(Vec::new(), WriterConfig::default()).unwrap();
        assert!(matches!(
            writer.write_refs(&updates, &NonTagPeeler),
            Err(ReftableError::InvalidUpdate { .. })
        ));
    }

    #[test]
    fn second_write_is_invalid_state() {
        let mut writer = ReftableWriter::new(Vec::new(), WriterConfig::default()).unwrap();
        writer.write_refs(&[update("refs/heads/a", 1)], &NonTagPeeler).unwrap();
        assert_eq!(writer.state(), WriterState::Writing);
        assert!(matches!(
            writer.write_refs(&[update("refs/heads/b", 1)], &NonTagPeeler),
            Err(ReftableError::InvalidState(_))
        ));
        writer.finish().unwrap();
        assert_eq!(writer.state(), WriterState::Finalized);
        assert!(writer.finish().is_err());
    }

    #[test]
    fn invalid_config_is_rejected() {
        assert!(matches!(
            ReftableWriter::new(Vec::new(), WriterConfig::with_block_size(8)),
            Err(ReftableError::InvalidConfig(_))
        ));
    }

    #[test]
    fn write_reftable_infers_hash() {
        let id = ObjectId::hash(HashAlgorithm::Sha256, b"c");
        let updates = [
            ReferenceUpdate::deletion("refs/heads/a"),
            ReferenceUpdate::new("refs/heads/b", id),
        ];
        let mut out = Vec::new();
        let summary = write_reftable(&mut out, 4096, &updates, &NonTagPeeler).unwrap();
        assert_eq!(summary.ref_count, 2);
        assert_eq!(out.len(), 4096);
    }

    #[test]
    fn mixed_hashes_are_rejected() {
        let updates = [
            update("refs/heads/a", 1),
            ReferenceUpdate::new("refs/heads/b", ObjectId::hash(HashAlgorithm::Sha256, b"c")),
        ];
        let err = write_reftable(Vec::new(), 4096, &updates, &NonTagPeeler).unwrap_err();
        assert!(matches!(err, ReftableError::HashMismatch { .. }));
    }
}
