//! Reftable: block-oriented storage for reference name to object id maps.
//!
//! A reftable is a sorted sequence of fixed-size blocks. Each block holds
//! prefix-compressed records and a trailing table of restart points where
//! names are stored in full, so a block can be binary-searched without
//! decoding it from the start. Large tables end with index blocks mapping
//! the last name of each ref block to that block's position.
//!
//! # Architecture
//!
//! - **Header** (24 bytes, inside block 0): signature, version, block size
//!   and the update index range of the table
//! - **Ref blocks** (`'r'`): ref records, restart table, zero padding
//! - **Index blocks** (`'i'`): one record per ref block
//! - **ReftableWriter**: packs sorted updates into blocks
//! - **ReftableReader**: enumerates refs or looks one up via the index

pub mod block;
pub mod config;
pub mod error;
pub mod fixed;
pub mod header;
pub mod index;
pub mod reader;
pub mod record;
pub mod varint;
pub mod writer;

pub use block::{read_ref_block, write_ref_block, Block, BlockBuilder, BlockRecords, BlockType};
pub use config::{ReaderConfig, WriterConfig, DEFAULT_BLOCK_SIZE, DEFAULT_RESTART_GAP};
pub use error::{EncodingError, ReftableError, ReftableResult};
pub use header::{Header, HEADER_SIZE, REFTABLE_SIGNATURE, REFTABLE_VERSION};
pub use index::{find_block, read_index_block, write_index_blocks};
pub use reader::{
    open_mmap, read_reftable, BlockInfo, MappedReader, PartialRead, ReftableReader,
};
pub use record::{
    decode_index_record, decode_ref_record, encode_index_record, encode_ref_record, IndexRecord,
    RefRecord, RefValue, ValueType,
};
pub use writer::{write_reftable, BlockWriter, ReftableWriter, WriteSummary, WriterState};
