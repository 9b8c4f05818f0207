//! Reusable page buffer codec. A `Data` buffer is written once per flush
//! and reset in between; `check_capacity` grows the backing storage before
//! a write would overrun it — the codec never truncates silently.
//!
//! Integers are big-endian on the wire.

use super::{aligned_len, BLOCK_SIZE};
use crate::error::DbError;
use eyre::Result;

/// Encoded size of an i32.
pub const LENGTH_INT: usize = 4;

pub struct Data {
    buf: Vec<u8>,
    pos: usize,
}

impl Data {
    pub fn create(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity.max(BLOCK_SIZE)),
            pos: 0,
        }
    }

    /// Clears content for reuse; the allocation is kept.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.pos = 0;
    }

    /// Ensures `additional` more bytes fit. Growing is the only legal
    /// outcome — a buffer that cannot grow fails the allocation, it never
    /// drops bytes.
    pub fn check_capacity(&mut self, additional: usize) {
        self.buf.reserve(additional);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let bytes = self.read_bytes(LENGTH_INT)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.read_bytes(8)?;
        let mut out = [0u8; 8];
        out.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(out))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&[u8]> {
        if self.pos + len > self.buf.len() {
            return Err(DbError::CorruptedBuffer(format!(
                "read of {} bytes at {} overruns buffer of {}",
                len,
                self.pos,
                self.buf.len()
            ))
            .into());
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Pads with zeros up to the next block boundary. Runs before every
    /// physical write so the store only ever sees whole blocks.
    pub fn fill_aligned(&mut self) {
        let target = aligned_len(self.buf.len());
        self.buf.resize(target, 0);
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn set_bytes(&mut self, data: &[u8]) {
        self.buf.clear();
        self.buf.extend_from_slice(data);
        self.pos = 0;
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_round_trip() {
        let mut data = Data::create(64);
        data.write_i32(-7);
        data.write_i32(i32::MAX);
        data.pos = 0;
        assert_eq!(data.read_i32().unwrap(), -7);
        assert_eq!(data.read_i32().unwrap(), i32::MAX);
    }

    #[test]
    fn fill_aligned_pads_to_block_size() {
        let mut data = Data::create(8);
        data.write_bytes(b"abc");
        data.fill_aligned();
        assert_eq!(data.len() % BLOCK_SIZE, 0);
        assert_eq!(&data.bytes()[..3], b"abc");
        assert!(data.bytes()[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn fill_aligned_on_boundary_is_a_no_op() {
        let mut data = Data::create(BLOCK_SIZE);
        data.write_bytes(&[1u8; BLOCK_SIZE]);
        data.fill_aligned();
        assert_eq!(data.len(), BLOCK_SIZE);
    }

    #[test]
    fn overrunning_read_is_corruption() {
        let mut data = Data::create(8);
        data.write_i32(1);
        data.pos = 0;
        data.read_i32().unwrap();
        let err = data.read_i32().unwrap_err();
        assert!(matches!(
            crate::error::db_error(&err),
            Some(DbError::CorruptedBuffer(_))
        ));
    }

    #[test]
    fn reset_keeps_the_allocation() {
        let mut data = Data::create(8);
        data.write_bytes(&[0u8; 1024]);
        let cap = data.buf.capacity();
        data.reset();
        assert_eq!(data.len(), 0);
        assert_eq!(data.buf.capacity(), cap);
    }
}
