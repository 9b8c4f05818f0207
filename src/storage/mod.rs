//! # Storage Layer
//!
//! Block-aligned durable storage with an optional compression stage:
//!
//! - [`FileStore`]: the storage medium — seek/read/write over a named
//!   file, every physical write a whole number of blocks, with a typed
//!   file header (magic, version, block size, compression kind, CRC32).
//! - [`Data`]: the reusable page buffer codec — big-endian primitives,
//!   capacity pre-checks that grow rather than truncate, and alignment
//!   padding.
//! - [`PageWriter`] / [`PageReader`]: a stream of framed chunks on top of
//!   a `FileStore`. With compression off, each chunk is
//!   `[len:i32][raw bytes]`; with compression on,
//!   `[compressed_len:i32][uncompressed_len:i32][compressed bytes]`. The
//!   mode is fixed per stream and recorded in the file header — the reader
//!   has no other way to know which framing was used.
//!
//! ## Block Alignment
//!
//! `BLOCK_SIZE` is the unit of physical I/O. Every flush pads the buffer
//! to a block boundary before the write call, so a torn write can only
//! ever damage whole blocks — the property crash recovery relies on.

mod compress;
mod data;
mod file_store;
mod stream;

pub use compress::{CompressionKind, Compressor, Lz4Compressor};
pub use data::Data;
pub use file_store::{FileHeader, FileStore};
pub use stream::{PageReader, PageWriter};

/// Unit of physical I/O alignment.
pub const BLOCK_SIZE: usize = 16;

/// Size of the typed header at the start of every store file.
pub const FILE_HEADER_SIZE: usize = 32;

/// Rounds `len` up to the next block boundary.
pub fn aligned_len(len: usize) -> usize {
    len.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}
