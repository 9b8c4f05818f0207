//! # File Store
//!
//! The storage medium: a named file accessed in whole blocks. The first
//! `FILE_HEADER_SIZE` bytes are a typed header; all payload I/O happens
//! after it. Writes must arrive block-aligned — the alignment is the
//! caller's job (`Data::fill_aligned`) and is asserted here so a stray
//! partial write is caught at the boundary it would damage.
//!
//! ## File Header Layout (32 bytes)
//!
//! ```text
//! Offset  Size  Field        Description
//! ------  ----  -----------  -----------------------------------
//! 0       8     magic        "OPALSTOR"
//! 8       2     version      Format version (currently 1)
//! 10      2     block_size   Alignment unit the file was written with
//! 12      1     compression  CompressionKind byte code
//! 13      15    reserved     Zero
//! 28      4     checksum     CRC32 over bytes 0..28
//! ```
//!
//! `close` is idempotent: the first call syncs and releases the handle,
//! later calls do nothing.

use super::{CompressionKind, BLOCK_SIZE, FILE_HEADER_SIZE};
use crate::error::DbError;
use eyre::{ensure, Result, WrapErr};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use zerocopy::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

const MAGIC: [u8; 8] = *b"OPALSTOR";
const FORMAT_VERSION: u16 = 1;

const CRC: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct FileHeader {
    magic: [u8; 8],
    version: U16,
    block_size: U16,
    compression: u8,
    reserved: [u8; 15],
    checksum: U32,
}

impl FileHeader {
    fn new(compression: CompressionKind) -> Self {
        let mut header = Self {
            magic: MAGIC,
            version: U16::new(FORMAT_VERSION),
            block_size: U16::new(BLOCK_SIZE as u16),
            compression: compression.as_byte(),
            reserved: [0; 15],
            checksum: U32::new(0),
        };
        let bytes = header.as_bytes();
        let crc = CRC.checksum(&bytes[..FILE_HEADER_SIZE - 4]);
        header.checksum = U32::new(crc);
        header
    }

    fn validate(&self) -> Result<CompressionKind> {
        if self.magic != MAGIC {
            return Err(DbError::CorruptedBuffer("bad store file magic".into()).into());
        }
        let expected = CRC.checksum(&self.as_bytes()[..FILE_HEADER_SIZE - 4]);
        if self.checksum.get() != expected {
            return Err(DbError::CorruptedBuffer(format!(
                "store header checksum mismatch: {:08x} != {:08x}",
                self.checksum.get(),
                expected
            ))
            .into());
        }
        ensure!(
            self.version.get() == FORMAT_VERSION,
            "unsupported store format version {}",
            self.version.get()
        );
        ensure!(
            self.block_size.get() as usize == BLOCK_SIZE,
            "store block size {} does not match engine block size {}",
            self.block_size.get(),
            BLOCK_SIZE
        );
        CompressionKind::from_byte(self.compression)
    }

    pub fn compression(&self) -> Result<CompressionKind> {
        CompressionKind::from_byte(self.compression)
    }
}

#[derive(Debug)]
pub struct FileStore {
    name: String,
    file: Option<File>,
}

impl FileStore {
    /// Creates (truncating) a store file and writes its header.
    pub fn create(path: impl AsRef<Path>, compression: CompressionKind) -> Result<Self> {
        let name = path.as_ref().display().to_string();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())
            .wrap_err_with(|| format!("creating store file '{}'", name))?;
        let header = FileHeader::new(compression);
        file.write_all(header.as_bytes())
            .wrap_err_with(|| format!("writing header of '{}'", name))?;
        log::debug!("created store '{}' (compression {:?})", name, compression);
        Ok(Self {
            name,
            file: Some(file),
        })
    }

    /// Opens an existing store file, validates the header, and returns the
    /// store positioned after it plus the compression kind it was written
    /// with.
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, CompressionKind)> {
        let name = path.as_ref().display().to_string();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())
            .wrap_err_with(|| format!("opening store file '{}'", name))?;
        let mut header_bytes = [0u8; FILE_HEADER_SIZE];
        file.read_exact(&mut header_bytes)
            .wrap_err_with(|| format!("reading header of '{}'", name))?;
        let header = FileHeader::read_from_bytes(&header_bytes)
            .map_err(|e| eyre::eyre!("failed to read FileHeader: {:?}", e))?;
        let compression = header.validate()?;
        Ok((
            Self {
                name,
                file: Some(file),
            },
            compression,
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn file_mut(&mut self) -> Result<&mut File> {
        let name = self.name.clone();
        self.file
            .as_mut()
            .ok_or_else(|| eyre::eyre!("store '{}' is closed", name))
    }

    /// Writes one block-aligned buffer at the current position.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        ensure!(
            data.len() % BLOCK_SIZE == 0,
            "unaligned write of {} bytes to store '{}'",
            data.len(),
            self.name
        );
        let name = self.name.clone();
        self.file_mut()?
            .write_all(data)
            .wrap_err_with(|| format!("writing {} bytes to '{}'", data.len(), name))
    }

    /// Reads up to `buf.len()` bytes; returns how many were available.
    /// Short counts only occur at end of file.
    pub fn read_fully(&mut self, buf: &mut [u8]) -> Result<usize> {
        let name = self.name.clone();
        let file = self.file_mut()?;
        let mut total = 0;
        while total < buf.len() {
            let n = file
                .read(&mut buf[total..])
                .wrap_err_with(|| format!("reading from '{}'", name))?;
            if n == 0 {
                break;
            }
            total += n;
        }
        Ok(total)
    }

    /// Repositions to `pos` bytes past the file header.
    pub fn seek(&mut self, pos: u64) -> Result<()> {
        let name = self.name.clone();
        self.file_mut()?
            .seek(SeekFrom::Start(FILE_HEADER_SIZE as u64 + pos))
            .map(|_| ())
            .wrap_err_with(|| format!("seeking in '{}'", name))
    }

    /// Payload length (excluding the header).
    pub fn len(&mut self) -> Result<u64> {
        let name = self.name.clone();
        let len = self
            .file_mut()?
            .metadata()
            .wrap_err_with(|| format!("reading length of '{}'", name))?
            .len();
        Ok(len.saturating_sub(FILE_HEADER_SIZE as u64))
    }

    pub fn sync(&mut self) -> Result<()> {
        let name = self.name.clone();
        self.file_mut()?
            .sync_all()
            .wrap_err_with(|| format!("syncing '{}'", name))
    }

    /// Releases the file handle exactly once; later calls are no-ops.
    pub fn close(&mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            log::debug!("closing store '{}'", self.name);
            file.sync_all()
                .wrap_err_with(|| format!("syncing '{}' on close", self.name))?;
        }
        Ok(())
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
