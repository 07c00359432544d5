//! Fixed-size redo block framing and small bounds-checked byte readers.
//!
//! Blocks are numbered starting at 2; blocks 0-1 hold the redo file header
//! and are never handed to the assembler.

use crate::error::{RedoError, Result};

/// Bytes at the start of every block that are not part of the record stream.
pub const BLOCK_HEADER_LEN: usize = 16;

/// First block number carrying record payload.
pub const FIRST_DATA_BLOCK: u64 = 2;

/// A single fixed-size redo block as delivered by the reader.
#[derive(Debug, Clone)]
pub struct RedoBlock {
    pub number: u64,
    pub data: Vec<u8>,
}

impl RedoBlock {
    pub fn new(number: u64, data: Vec<u8>) -> Self {
        RedoBlock { number, data }
    }

    /// The record-bearing portion of the block, after the block header.
    pub fn body(&self) -> &[u8] {
        &self.data[BLOCK_HEADER_LEN..]
    }
}

/// Bounds-checked little-endian reads used by both the LWN header and the
/// vector decoder. Each returns a `RedoError::Parse` naming the offending
/// block/offset rather than panicking on short input.
pub fn read_u8(data: &[u8], block: u64, offset: usize) -> Result<u8> {
    data.get(offset)
        .copied()
        .ok_or_else(|| RedoError::parse(block, offset as u32, "truncated reading u8"))
}

pub fn read_u16(data: &[u8], block: u64, offset: usize) -> Result<u16> {
    let bytes = data
        .get(offset..offset + 2)
        .ok_or_else(|| RedoError::parse(block, offset as u32, "truncated reading u16"))?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

pub fn read_u16_be(data: &[u8], block: u64, offset: usize) -> Result<u16> {
    let bytes = data
        .get(offset..offset + 2)
        .ok_or_else(|| RedoError::parse(block, offset as u32, "truncated reading u16 (be)"))?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

pub fn read_u32(data: &[u8], block: u64, offset: usize) -> Result<u32> {
    let bytes = data
        .get(offset..offset + 4)
        .ok_or_else(|| RedoError::parse(block, offset as u32, "truncated reading u32"))?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub fn read_u64(data: &[u8], block: u64, offset: usize) -> Result<u64> {
    let bytes = data
        .get(offset..offset + 8)
        .ok_or_else(|| RedoError::parse(block, offset as u32, "truncated reading u64"))?;
    Ok(u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ]))
}

/// Read a 48-bit value (6 bytes, little-endian) such as `scn_record`.
pub fn read_u48(data: &[u8], block: u64, offset: usize) -> Result<u64> {
    let bytes = data
        .get(offset..offset + 6)
        .ok_or_else(|| RedoError::parse(block, offset as u32, "truncated reading u48"))?;
    let mut buf = [0u8; 8];
    buf[..6].copy_from_slice(bytes);
    Ok(u64::from_le_bytes(buf))
}

/// Round a length up to the next multiple of 4.
pub fn pad4(len: u32) -> u32 {
    (len + 3) & !3
}
