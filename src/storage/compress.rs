//! Pluggable compression for the page stream. The kind is chosen when a
//! store file is created and recorded in its header; readers pick the
//! matching expander from the same byte code.

use crate::error::DbError;
use eyre::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionKind {
    None,
    Lz4,
}

impl CompressionKind {
    pub fn as_byte(self) -> u8 {
        match self {
            CompressionKind::None => 0,
            CompressionKind::Lz4 => 1,
        }
    }

    pub fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(CompressionKind::None),
            1 => Ok(CompressionKind::Lz4),
            other => {
                Err(DbError::CorruptedBuffer(format!("unknown compression kind {}", other)).into())
            }
        }
    }

    pub fn compressor(self) -> Option<Box<dyn Compressor>> {
        match self {
            CompressionKind::None => None,
            CompressionKind::Lz4 => Some(Box::new(Lz4Compressor)),
        }
    }
}

pub trait Compressor: Send + Sync {
    fn compress(&self, data: &[u8]) -> Vec<u8>;

    /// Decompresses `data` into exactly `uncompressed_len` bytes; any
    /// mismatch means the frame is damaged.
    fn expand(&self, data: &[u8], uncompressed_len: usize) -> Result<Vec<u8>>;
}

pub struct Lz4Compressor;

impl Compressor for Lz4Compressor {
    fn compress(&self, data: &[u8]) -> Vec<u8> {
        lz4_flex::block::compress(data)
    }

    fn expand(&self, data: &[u8], uncompressed_len: usize) -> Result<Vec<u8>> {
        let out = lz4_flex::block::decompress(data, uncompressed_len)
            .map_err(|e| DbError::CorruptedBuffer(format!("lz4 decompress failed: {}", e)))?;
        if out.len() != uncompressed_len {
            return Err(DbError::CorruptedBuffer(format!(
                "decompressed {} bytes, frame declared {}",
                out.len(),
                uncompressed_len
            ))
            .into());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lz4_round_trip() {
        let data = b"the quick brown fox jumps over the lazy dog, repeatedly, repeatedly";
        let c = Lz4Compressor;
        let packed = c.compress(data);
        let unpacked = c.expand(&packed, data.len()).unwrap();
        assert_eq!(unpacked, data);
    }

    #[test]
    fn lz4_round_trip_empty() {
        let c = Lz4Compressor;
        let packed = c.compress(b"");
        assert_eq!(c.expand(&packed, 0).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn kind_byte_round_trip() {
        for kind in [CompressionKind::None, CompressionKind::Lz4] {
            assert_eq!(CompressionKind::from_byte(kind.as_byte()).unwrap(), kind);
        }
        assert!(CompressionKind::from_byte(9).is_err());
    }
}
