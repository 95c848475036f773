//! Sequences are cut into blocks of [`BLOCK_SIZE`] rows. A table of raw
//! little-endian sync entries, one per block, locates each block's payload so
//! a reader can jump straight to the block holding a row and decode at most
//! one block worth of varints.

use byteorder::{ByteOrder, LittleEndian};
use bytes::BufMut;

use crate::codec::varint::{self, VarInt};
use crate::error::{Error, Result};

/// BLOCK_SIZE is the number of rows in a block.
pub const BLOCK_SIZE: usize = 16;

/// SYNC_ENTRY_SIZE is the size of a raw integer, and so of a sync entry.
pub const SYNC_ENTRY_SIZE: usize = 8;

/// PADDING is the value used to fill up a short last block.
pub const PADDING: i64 = -1;

/// block_count returns the number of blocks needed for n rows.
pub fn block_count(n: usize) -> usize {
    n.div_ceil(BLOCK_SIZE)
}

/// pad_block copies up to BLOCK_SIZE rows into a full block, filling the rest with pad.
pub fn pad_block(rows: &[i64], pad: i64) -> [i64; BLOCK_SIZE] {
    let mut block = [pad; BLOCK_SIZE];
    block[..rows.len()].copy_from_slice(rows);
    block
}

/// RawInts is a borrowed array of raw little-endian 64-bit integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawInts<'a> {
    data: &'a [u8],
}

impl<'a> RawInts<'a> {
    /// new wraps data, which must hold exactly n integers.
    pub fn new(data: &'a [u8], n: usize) -> Result<Self> {
        let expected = n
            .checked_mul(SYNC_ENTRY_SIZE)
            .ok_or_else(|| Error::InvalidParameter(format!("{} raw integers", n)))?;
        if data.len() != expected {
            return Err(Error::size_mismatch("raw integer array", expected, data.len()));
        }
        Ok(Self { data })
    }

    /// prefix takes the first n integers of data and returns them with the remaining bytes.
    pub fn prefix(data: &'a [u8], n: usize) -> Result<(Self, &'a [u8])> {
        let need = n
            .checked_mul(SYNC_ENTRY_SIZE)
            .ok_or_else(|| Error::InvalidParameter(format!("{} raw integers", n)))?;
        if data.len() < need {
            return Err(Error::size_mismatch("raw integer array", need, data.len()));
        }
        let (head, tail) = data.split_at(need);
        Ok((Self { data: head }, tail))
    }

    pub fn len(&self) -> usize {
        self.data.len() / SYNC_ENTRY_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<i64> {
        let start = i.checked_mul(SYNC_ENTRY_SIZE)?;
        self.data
            .get(start..start.checked_add(SYNC_ENTRY_SIZE)?)
            .map(LittleEndian::read_i64)
    }

    /// slice returns the integers start..end, or None if the range is out of bounds.
    pub fn slice(&self, start: usize, end: usize) -> Option<RawInts<'a>> {
        let data = self
            .data
            .get(start.checked_mul(SYNC_ENTRY_SIZE)?..end.checked_mul(SYNC_ENTRY_SIZE)?)?;
        Some(Self { data })
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = i64> + 'a {
        self.data
            .chunks_exact(SYNC_ENTRY_SIZE)
            .map(LittleEndian::read_i64)
    }
}

/// SyncBlocks pairs a sync table with the region its entries point into.
#[derive(Debug, Clone, Copy)]
pub struct SyncBlocks<'a> {
    sync: RawInts<'a>,
    region: &'a [u8],
}

impl<'a> SyncBlocks<'a> {
    pub fn new(sync: RawInts<'a>, region: &'a [u8]) -> Self {
        Self { sync, region }
    }

    /// block_count returns the number of sync entries.
    pub fn block_count(&self) -> usize {
        self.sync.len()
    }

    pub fn sync(&self) -> RawInts<'a> {
        self.sync
    }

    pub fn region(&self) -> &'a [u8] {
        self.region
    }

    /// offset returns the validated position of block b within the region.
    pub fn offset(&self, b: usize) -> Result<usize> {
        let offset = self.sync.get(b).ok_or(Error::OutOfBounds {
            index: b,
            len: self.sync.len(),
        })?;
        if offset < 0 || offset as u64 > self.region.len() as u64 {
            return Err(Error::size_mismatch(
                "sync entry",
                self.region.len(),
                offset.max(0) as usize,
            ));
        }
        Ok(offset as usize)
    }

    /// block returns the bytes from block b to the end of the region.
    pub fn block(&self, b: usize) -> Result<&'a [u8]> {
        let offset = self.offset(b)?;
        Ok(&self.region[offset..])
    }
}

/// decode_delta_at returns row k of a delta coded run starting at src.
pub fn decode_delta_at(src: &[u8], k: usize) -> Result<i64> {
    let mut offset = 0;
    let mut value = 0_i64;
    for i in 0..=k {
        let (delta, n) = i64::decode_var(&src[offset..])?;
        value = if i == 0 { delta } else { value.wrapping_add(delta) };
        offset += n;
    }
    Ok(value)
}

/// decode_raw_at returns row k of a run of plain varints starting at src.
pub fn decode_raw_at(src: &[u8], k: usize) -> Result<i64> {
    let offset = varint::skip(src, k)?;
    let (value, _) = i64::decode_var(&src[offset..])?;
    Ok(value)
}

/// BlockWriter accumulates block payloads and records a sync entry for each block.
#[derive(Debug, Default)]
pub struct BlockWriter {
    base: usize,
    sync: Vec<i64>,
    payload: Vec<u8>,
}

impl BlockWriter {
    /// new creates a writer whose sync entries are relative to the start of the payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// with_base creates a writer whose sync entries are shifted by base bytes,
    /// for layouts where they are relative to an earlier position.
    pub fn with_base(base: usize) -> Self {
        Self {
            base,
            ..Self::default()
        }
    }

    /// start_block records the sync entry of a new block at the current position.
    pub fn start_block(&mut self) {
        self.sync.push((self.base + self.payload.len()) as i64);
    }

    pub fn payload_mut(&mut self) -> &mut Vec<u8> {
        &mut self.payload
    }

    pub fn sync_entries(&self) -> &[i64] {
        &self.sync
    }

    /// into_parts returns the sync entries and the payload, for layouts that
    /// interleave other fields with the sync table.
    pub fn into_parts(self) -> (Vec<i64>, Vec<u8>) {
        (self.sync, self.payload)
    }

    /// finish writes the sync table followed by the payload.
    pub fn finish<B: BufMut>(self, buf: &mut B) {
        for s in &self.sync {
            buf.put_i64_le(*s);
        }
        buf.put_slice(&self.payload);
    }
}
