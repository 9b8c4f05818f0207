//! Framed chunk stream over a `FileStore`. The writer batches each chunk
//! into a reusable page buffer, frames it, pads to block alignment and
//! hands the store one aligned write; the reader mirrors the framing. The
//! compression mode is fixed for the lifetime of the stream — it comes
//! from the store's file header, never from the frames themselves.

use super::data::LENGTH_INT;
use super::{aligned_len, CompressionKind, Compressor, Data, FileStore};
use crate::error::DbError;
use eyre::Result;

/// Upper bound on a single frame's payload; a declared length beyond this
/// is treated as corruption rather than honored with a huge allocation.
const MAX_CHUNK: usize = 1 << 30;

pub struct PageWriter {
    store: Option<FileStore>,
    compressor: Option<Box<dyn Compressor>>,
    page: Data,
}

impl PageWriter {
    pub fn new(store: FileStore, compression: CompressionKind) -> Self {
        Self {
            store: Some(store),
            compressor: compression.compressor(),
            page: Data::create(4 * super::BLOCK_SIZE),
        }
    }

    /// Frames and writes one chunk. Zero-length chunks are legal and
    /// produce a frame of their own.
    pub fn write(&mut self, chunk: &[u8]) -> Result<()> {
        let store = self
            .store
            .as_mut()
            .ok_or_else(|| eyre::eyre!("page writer is closed"))?;
        self.page.reset();
        match &self.compressor {
            Some(compressor) => {
                let compressed = compressor.compress(chunk);
                self.page
                    .check_capacity(2 * LENGTH_INT + compressed.len());
                self.page.write_i32(compressed.len() as i32);
                self.page.write_i32(chunk.len() as i32);
                self.page.write_bytes(&compressed);
            }
            None => {
                self.page.check_capacity(LENGTH_INT + chunk.len());
                self.page.write_i32(chunk.len() as i32);
                self.page.write_bytes(chunk);
            }
        }
        self.page.fill_aligned();
        store.write(self.page.bytes())
    }

    pub fn sync(&mut self) -> Result<()> {
        match self.store.as_mut() {
            Some(store) => store.sync(),
            None => Ok(()),
        }
    }

    /// Releases the underlying store exactly once; closing twice is fine.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut store) = self.store.take() {
            store.close()?;
        }
        Ok(())
    }
}

impl Drop for PageWriter {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

pub struct PageReader {
    store: Option<FileStore>,
    compressor: Option<Box<dyn Compressor>>,
}

impl PageReader {
    pub fn new(store: FileStore, compression: CompressionKind) -> Self {
        Self {
            store: Some(store),
            compressor: compression.compressor(),
        }
    }

    fn read_exact(store: &mut FileStore, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let got = store.read_fully(&mut buf)?;
        if got != len {
            return Err(DbError::CorruptedBuffer(format!(
                "frame truncated: wanted {} bytes, got {}",
                len, got
            ))
            .into());
        }
        Ok(buf)
    }

    fn read_len(bytes: &[u8]) -> Result<usize> {
        let raw = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if raw < 0 || raw as usize > MAX_CHUNK {
            return Err(
                DbError::CorruptedBuffer(format!("implausible frame length {}", raw)).into(),
            );
        }
        Ok(raw as usize)
    }

    /// Reads the next chunk, or `None` at end of stream.
    pub fn read_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let store = self
            .store
            .as_mut()
            .ok_or_else(|| eyre::eyre!("page reader is closed"))?;
        let mut len_buf = [0u8; LENGTH_INT];
        let got = store.read_fully(&mut len_buf)?;
        if got == 0 {
            return Ok(None);
        }
        if got != LENGTH_INT {
            return Err(DbError::CorruptedBuffer(format!(
                "frame header truncated: {} of {} bytes",
                got, LENGTH_INT
            ))
            .into());
        }
        let first_len = Self::read_len(&len_buf)?;
        let (chunk, frame_len) = match &self.compressor {
            Some(compressor) => {
                let ulen_bytes = Self::read_exact(store, LENGTH_INT)?;
                let uncompressed_len = Self::read_len(&ulen_bytes)?;
                let compressed = Self::read_exact(store, first_len)?;
                let chunk = compressor.expand(&compressed, uncompressed_len)?;
                (chunk, 2 * LENGTH_INT + first_len)
            }
            None => {
                let chunk = Self::read_exact(store, first_len)?;
                (chunk, LENGTH_INT + first_len)
            }
        };
        // Skip the alignment padding the writer appended.
        let padding = aligned_len(frame_len) - frame_len;
        if padding > 0 {
            Self::read_exact(store, padding)?;
        }
        Ok(Some(chunk))
    }

    pub fn close(&mut self) -> Result<()> {
        if let Some(mut store) = self.store.take() {
            store.close()?;
        }
        Ok(())
    }
}

impl Drop for PageReader {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
