use std::fs::File;
use std::io::{Cursor, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use memmap2::Mmap;
use reft_refs::ReferenceUpdate;
use reft_types::HashAlgorithm;
use serde::Serialize;
use tracing::{debug, warn};

use crate::block::{read_ref_block, Block, BlockType};
use crate::config::ReaderConfig;
use crate::error::{ReftableError, ReftableResult};
use crate::header::{Header, HEADER_SIZE};
use crate::index::{find_block, read_index_block};
use crate::record::{IndexRecord, RefRecord};

/// Records decoded before a read failed, together with the failure.
#[derive(Debug)]
pub struct PartialRead {
    pub records: Vec<(u64, ReferenceUpdate)>,
    pub error: Option<ReftableError>,
}

impl PartialRead {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// The records, or the error if the read stopped early.
    pub fn into_result(self) -> ReftableResult<Vec<(u64, ReferenceUpdate)>> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.records),
        }
    }
}

/// Layout of one block, for inspection tools.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BlockInfo {
    pub index: usize,
    pub position: u64,
    pub block_type: BlockType,
    pub block_len: usize,
    pub restart_count: usize,
    pub record_count: usize,
}

/// Reads a reftable from any seekable source.
///
/// Ref blocks are read one at a time; only the index, once loaded, is kept.
#[derive(Debug)]
pub struct ReftableReader<R: Read + Seek> {
    input: R,
    header: Header,
    hash: HashAlgorithm,
    file_len: u64,
    /// Number of leading blocks holding refs.
    ref_blocks: usize,
    /// Number of trailing index blocks.
    index_blocks: usize,
    index: Option<Vec<IndexRecord>>,
}

impl<R: Read + Seek> ReftableReader<R> {
    /// Read the header and locate the index blocks.
    pub fn new(mut input: R, config: ReaderConfig) -> ReftableResult<Self> {
        config.validate()?;

        input.seek(SeekFrom::Start(0))?;
        let mut raw = [0u8; HEADER_SIZE];
        input.read_exact(&mut raw).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => ReftableError::CorruptHeader {
                reason: "file is shorter than the header".into(),
            },
            _ => e.into(),
        })?;
        let header = Header::decode(&raw)?;
        if let Some(expected) = config.block_size {
            if expected != header.block_size {
                return Err(ReftableError::CorruptHeader {
                    reason: format!(
                        "block size {} does not match expected {expected}",
                        header.block_size
                    ),
                });
            }
        }

        let file_len = input.seek(SeekFrom::End(0))?;
        let block_size = u64::from(header.block_size);
        let full_blocks = (file_len / block_size) as usize;
        let all_blocks = file_len.div_ceil(block_size) as usize;

        let mut reader = Self {
            input,
            header,
            hash: config.hash,
            file_len,
            ref_blocks: all_blocks,
            index_blocks: 0,
            index: None,
        };

        // Index blocks trail the ref blocks. Block 0 always holds refs.
        let mut first_index = full_blocks;
        while first_index > 1 && reader.block_tag(first_index - 1)? == BlockType::Index.tag() {
            first_index -= 1;
        }
        if first_index < full_blocks {
            if all_blocks > full_blocks {
                return Err(ReftableError::corrupt_block(
                    reader.block_position(full_blocks),
                    format!("{} trailing bytes after the index", file_len % block_size),
                ));
            }
            reader.ref_blocks = first_index;
            reader.index_blocks = full_blocks - first_index;
        }

        debug!(
            block_size = header.block_size,
            ref_blocks = reader.ref_blocks,
            index_blocks = reader.index_blocks,
            "opened reftable"
        );
        Ok(reader)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn block_size(&self) -> u32 {
        self.header.block_size
    }

    pub fn hash(&self) -> HashAlgorithm {
        self.hash
    }

    /// Ref and index blocks in the file.
    pub fn block_count(&self) -> usize {
        self.ref_blocks + self.index_blocks
    }

    pub fn ref_block_count(&self) -> usize {
        self.ref_blocks
    }

    pub fn index_block_count(&self) -> usize {
        self.index_blocks
    }

    fn block_position(&self, block: usize) -> u64 {
        block as u64 * u64::from(self.header.block_size)
    }

    fn block_tag(&mut self, block: usize) -> ReftableResult<u8> {
        let at = self.block_position(block) + if block == 0 { HEADER_SIZE as u64 } else { 0 };
        self.input.seek(SeekFrom::Start(at))?;
        let mut tag = [0u8; 1];
        self.input.read_exact(&mut tag)?;
        Ok(tag[0])
    }

    /// Raw bytes of one block. A block cut short by the end of the file is
    /// corrupt.
    fn block_bytes(&mut self, block: usize) -> ReftableResult<Vec<u8>> {
        let position = self.block_position(block);
        let block_size = u64::from(self.header.block_size);
        self.input.seek(SeekFrom::Start(position))?;
        let mut buf = Vec::with_capacity(block_size as usize);
        (&mut self.input).take(block_size).read_to_end(&mut buf)?;
        if (buf.len() as u64) < block_size {
            return Err(ReftableError::corrupt_block(
                position,
                format!(
                    "truncated block: need {block_size} bytes, file has {}",
                    self.file_len.saturating_sub(position)
                ),
            ));
        }
        Ok(buf)
    }

    /// Decode the `block`-th ref block.
    pub fn ref_block(&mut self, block: usize) -> ReftableResult<Vec<(u64, ReferenceUpdate)>> {
        let buf = self.block_bytes(block)?;
        read_ref_block(
            &buf,
            self.block_position(block),
            self.header.block_size,
            block == 0,
            self.header.min_update_index,
            self.hash,
        )
    }

    /// Decode every ref in file order.
    pub fn read_all(&mut self) -> ReftableResult<Vec<(u64, ReferenceUpdate)>> {
        self.read_all_partial().into_result()
    }

    /// Decode refs block by block, stopping at the first bad block.
    ///
    /// Records from the blocks before the failure are kept.
    pub fn read_all_partial(&mut self) -> PartialRead {
        let mut records: Vec<(u64, ReferenceUpdate)> = Vec::new();
        for block in 0..self.ref_blocks {
            let result = self.ref_block(block).and_then(|decoded| {
                check_block_order(&records, &decoded, self.block_position(block))?;
                Ok(decoded)
            });
            match result {
                Ok(decoded) => records.extend(decoded),
                Err(error) => {
                    warn!(
                        block,
                        decoded = records.len(),
                        error = %error,
                        "stopping reftable read at bad block"
                    );
                    return PartialRead {
                        records,
                        error: Some(error),
                    };
                }
            }
        }
        PartialRead {
            records,
            error: None,
        }
    }

    /// Load and cache the index records.
    pub fn index(&mut self) -> ReftableResult<&[IndexRecord]> {
        if self.index.is_none() {
            let mut records = Vec::new();
            for block in self.ref_blocks..self.ref_blocks + self.index_blocks {
                let buf = self.block_bytes(block)?;
                records.extend(read_index_block(
                    &buf,
                    self.block_position(block),
                    self.header.block_size,
                )?);
            }
            debug!(entries = records.len(), "loaded reftable index");
            self.index = Some(records);
        }
        Ok(self.index.as_deref().unwrap_or_default())
    }

    /// Find the ref named `name`.
    ///
    /// Uses the index when the table has one, otherwise searches the ref
    /// blocks in order.
    pub fn lookup(&mut self, name: &[u8]) -> ReftableResult<Option<ReferenceUpdate>> {
        if self.index_blocks > 0 {
            let block_size = u64::from(self.header.block_size);
            let Some(entry) = find_block(self.index()?, name) else {
                return Ok(None);
            };
            let position = entry.block_position;
            let block = (position / block_size) as usize;
            if position % block_size != 0 || block >= self.ref_blocks {
                return Err(ReftableError::corrupt_block(
                    position,
                    "index points outside the ref blocks",
                ));
            }
            debug!(position, "index selected ref block");
            return Ok(self.seek_in_block(block, name)?.and_then(|r| self.exact(r, name)));
        }

        for block in 0..self.ref_blocks {
            if let Some(record) = self.seek_in_block(block, name)? {
                return Ok(self.exact(record, name));
            }
        }
        Ok(None)
    }

    fn seek_in_block(&mut self, block: usize, name: &[u8]) -> ReftableResult<Option<RefRecord>> {
        let buf = self.block_bytes(block)?;
        let parsed = Block::parse(&buf, self.block_position(block), block == 0)?;
        parsed.seek::<RefRecord>(name, self.hash)
    }

    fn exact(&self, record: RefRecord, name: &[u8]) -> Option<ReferenceUpdate> {
        (record.name == name).then(|| record.into_update(self.header.min_update_index).1)
    }

    /// Describe every block in the file.
    pub fn blocks(&mut self) -> ReftableResult<Vec<BlockInfo>> {
        let mut infos = Vec::with_capacity(self.block_count());
        for index in 0..self.block_count() {
            let buf = self.block_bytes(index)?;
            let position = self.block_position(index);
            let block = Block::parse(&buf, position, index == 0)?;
            let record_count = match block.block_type() {
                BlockType::Ref => block.decode_records::<RefRecord>(self.hash)?.len(),
                BlockType::Index => block.decode_records::<IndexRecord>(self.hash)?.len(),
            };
            infos.push(BlockInfo {
                index,
                position,
                block_type: block.block_type(),
                block_len: block.block_len(),
                restart_count: block.restart_offsets().len(),
                record_count,
            });
        }
        Ok(infos)
    }

    pub fn into_inner(self) -> R {
        self.input
    }
}

/// Names must keep ascending across block boundaries.
fn check_block_order(
    previous: &[(u64, ReferenceUpdate)],
    decoded: &[(u64, ReferenceUpdate)],
    position: u64,
) -> ReftableResult<()> {
    if let (Some((_, last)), Some((_, first))) = (previous.last(), decoded.first()) {
        if first.name <= last.name {
            return Err(ReftableError::corrupt_block(
                position,
                format!(
                    "first ref {:?} does not sort after {:?}",
                    first.name_lossy(),
                    last.name_lossy()
                ),
            ));
        }
    }
    Ok(())
}

/// A reader over a memory-mapped file.
pub type MappedReader = ReftableReader<Cursor<Mmap>>;

/// Open a reftable file through a read-only memory map.
pub fn open_mmap(path: impl AsRef<Path>, config: ReaderConfig) -> ReftableResult<MappedReader> {
    let file = File::open(path.as_ref())?;
    // SAFETY: the map is read-only and reftables are immutable once written;
    // a file truncated underneath us is the caller's problem, as with any
    // mapped file.
    let mmap = unsafe { Mmap::map(&file)? };
    ReftableReader::new(Cursor::new(mmap), config)
}

/// Read every ref of the table in `input`.
pub fn read_reftable<R: Read + Seek>(
    input: R,
    block_size: u32,
    hash: HashAlgorithm,
) -> ReftableResult<Vec<(u64, ReferenceUpdate)>> {
    ReftableReader::new(input, ReaderConfig::new(block_size, hash))?.read_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WriterConfig;
    use crate::writer::ReftableWriter;
    use reft_odb::NonTagPeeler;
    use reft_types::ObjectId;

    const SHA1: HashAlgorithm = HashAlgorithm::Sha1;

    fn updates(n: usize) -> Vec<ReferenceUpdate> {
        (0..n)
            .map(|i| {
                let name = format!("refs/heads/feature-{i:04}");
                ReferenceUpdate::new(name.clone(), ObjectId::hash(SHA1, name.as_bytes()))
                    .with_update_index(10 + (i % 3) as u64)
            })
            .collect()
    }

    fn table(updates: &[ReferenceUpdate], block_size: u32, write_index: bool) -> Vec<u8> {
        let config = WriterConfig {
            block_size,
            write_index,
            ..Default::default()
        };
        let mut writer = ReftableWriter::new(Vec::new(), config).unwrap();
        writer.write_refs(updates, &NonTagPeeler).unwrap();
        writer.finish().unwrap();
        writer.into_inner().unwrap()
    }

    fn reader(bytes: Vec<u8>) -> ReftableReader<Cursor<Vec<u8>>> {
        ReftableReader::new(Cursor::new(bytes), ReaderConfig::default()).unwrap()
    }

    #[test]
    fn reads_back_updates_with_absolute_indexes() {
        let input = updates(30);
        let records = reader(table(&input, 512, true)).read_all().unwrap();
        let decoded: Vec<_> = records.into_iter().map(|(_, u)| u).collect();
        assert_eq!(decoded, input);
    }

    #[test]
    fn counts_ref_and_index_blocks() {
        let r = reader(table(&updates(100), 512, true));
        assert!(r.ref_block_count() > 1);
        assert_eq!(r.index_block_count(), 1);
        assert_eq!(r.block_count(), r.ref_block_count() + 1);

        let r = reader(table(&updates(100), 512, false));
        assert_eq!(r.index_block_count(), 0);
    }

    #[test]
    fn lookup_with_and_without_index() {
        let input = updates(100);
        for write_index in [true, false] {
            let mut r = reader(table(&input, 512, write_index));
            for update in &input {
                assert_eq!(r.lookup(&update.name).unwrap().as_ref(), Some(update));
            }
            assert_eq!(r.lookup(b"refs/heads/feature-0050x").unwrap(), None);
            assert_eq!(r.lookup(b"refs/heads/zzz").unwrap(), None);
            assert_eq!(r.lookup(b"refs/a").unwrap(), None);
        }
    }

    #[test]
    fn block_size_mismatch_is_corrupt_header() {
        let bytes = table(&updates(3), 512, true);
        let err =
            ReftableReader::new(Cursor::new(bytes), ReaderConfig::new(1024, SHA1)).unwrap_err();
        assert!(matches!(err, ReftableError::CorruptHeader { .. }));
    }

    #[test]
    fn short_file_is_corrupt_header() {
        let err = ReftableReader::new(Cursor::new(b"REFT".to_vec()), ReaderConfig::default())
            .unwrap_err();
        assert!(matches!(err, ReftableError::CorruptHeader { .. }));
    }

    #[test]
    fn truncated_file_keeps_earlier_blocks() {
        let input = updates(100);
        let mut bytes = table(&input, 512, false);
        bytes.truncate(512 * 2 + 100);

        let mut r = reader(bytes);
        assert_eq!(r.ref_block_count(), 3);
        let partial = r.read_all_partial();
        assert!(!partial.is_complete());
        assert!(!partial.records.is_empty());
        assert_eq!(partial.records[0].1, input[0]);
        assert!(matches!(
            partial.error,
            Some(ReftableError::CorruptBlock { offset: 1024, .. })
        ));
        assert!(r.read_all().is_err());
    }

    #[test]
    fn junk_after_index_is_corrupt_block() {
        let mut bytes = table(&updates(100), 512, true);
        let end = bytes.len() as u64;
        bytes.extend_from_slice(b"junk");
        let err = ReftableReader::new(Cursor::new(bytes), ReaderConfig::default()).unwrap_err();
        assert!(matches!(err, ReftableError::CorruptBlock { offset, .. } if offset == end));
    }

    #[test]
    fn corrupt_second_block_keeps_first() {
        let mut bytes = table(&updates(100), 512, false);
        bytes[512] = b'x';
        let partial = reader(bytes).read_all_partial();
        let first_block = read_ref_block(&table(&updates(100), 512, false), 0, 512, true, 10, SHA1)
            .unwrap()
            .len();
        assert_eq!(partial.records.len(), first_block);
        assert!(partial.error.unwrap().is_corruption());
    }

    #[test]
    fn blocks_describe_layout() {
        let mut r = reader(table(&updates(100), 512, true));
        let infos = r.blocks().unwrap();
        assert_eq!(infos.len(), r.block_count());
        assert_eq!(infos[0].position, 0);
        assert_eq!(infos.last().unwrap().block_type, BlockType::Index);
        let refs: usize = infos
            .iter()
            .filter(|b| b.block_type == BlockType::Ref)
            .map(|b| b.record_count)
            .sum();
        assert_eq!(refs, 100);
        assert_eq!(infos.last().unwrap().record_count, r.ref_block_count());
    }

    #[test]
    fn read_reftable_checks_block_size() {
        let bytes = table(&updates(5), 1024, true);
        assert_eq!(read_reftable(Cursor::new(&bytes), 1024, SHA1).unwrap().len(), 5);
        assert!(read_reftable(Cursor::new(&bytes), 2048, SHA1).is_err());
    }
}
