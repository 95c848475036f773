//! Sorted (key, value) pair indices.
//!
//! The plain layout is an array of raw pairs. The compressed layout starts
//! with the raw number of regular rows r and a sync table, followed by packed
//! blocks:
//!
//! ```text
//! ┌──────────┬──────────────────┬──────────────────────┐
//! │ overflow │  16 delta keys   │ 16+overflow d-values │
//! │  varint  │     varints      │       varints        │
//! └──────────┴──────────────────┴──────────────────────┘
//! ```
//!
//! A block takes 16 pairs and then every following pair sharing the last key,
//! so each key lives in exactly one block.

use bytes::BufMut;
use serde::{Deserialize, Serialize};

use crate::codec::block::{block_count, pad_block, BlockWriter, RawInts, BLOCK_SIZE, PADDING};
use crate::codec::varint::{decode_delta_block, encode_delta_block, put_varint, VarInt};
use crate::error::{Error, Result};
use crate::format::HeaderRevision;

/// IndexLayout is the sync table layout of a compressed index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexLayout {
    /// (first key, offset) per block.
    Keyed,
    /// offset per block, first keys are read from the blocks.
    OffsetOnly,
}

impl IndexLayout {
    pub fn for_revision(revision: HeaderRevision) -> Self {
        match revision {
            HeaderRevision::Extended => IndexLayout::Keyed,
            HeaderRevision::Compact => IndexLayout::OffsetOnly,
        }
    }

    fn ints_per_block(&self) -> usize {
        match self {
            IndexLayout::Keyed => 2,
            IndexLayout::OffsetOnly => 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Compressed<'a> {
    r: usize,
    layout: IndexLayout,
    sync: RawInts<'a>,
    payload: &'a [u8],
}

impl<'a> Compressed<'a> {
    fn block_count(&self) -> usize {
        block_count(self.r)
    }

    fn block(&self, b: usize) -> Result<&'a [u8]> {
        let per = self.layout.ints_per_block();
        let offset = self.sync.get(b * per + per - 1).ok_or(Error::OutOfBounds {
            index: b,
            len: self.block_count(),
        })?;
        if offset < 0 || offset as u64 > self.payload.len() as u64 {
            return Err(Error::size_mismatch(
                "index sync entry",
                self.payload.len(),
                offset.max(0) as usize,
            ));
        }
        Ok(&self.payload[offset as usize..])
    }

    fn first_key(&self, b: usize) -> Result<i64> {
        match self.layout {
            IndexLayout::Keyed => self.sync.get(2 * b).ok_or(Error::OutOfBounds {
                index: b,
                len: self.block_count(),
            }),
            IndexLayout::OffsetOnly => {
                let src = self.block(b)?;
                let (_, n) = i64::decode_var(src)?;
                Ok(i64::decode_var(&src[n..])?.0)
            }
        }
    }

    /// find_block returns the only block that can hold key.
    fn find_block(&self, key: i64) -> Result<Option<usize>> {
        let (mut lo, mut hi) = (0, self.block_count());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.first_key(mid)? <= key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo.checked_sub(1))
    }

    /// decode_block returns the pairs of block b without padding.
    fn decode_block(&self, b: usize) -> Result<Vec<(i64, i64)>> {
        let src = self.block(b)?;
        let (overflow, mut pos) = i64::decode_var(src)?;
        if overflow < 0 || overflow as u64 > src.len() as u64 {
            return Err(Error::size_mismatch(
                "index block overflow",
                src.len(),
                overflow.max(0) as usize,
            ));
        }
        let overflow = overflow as usize;

        let mut keys = [0; BLOCK_SIZE];
        pos += decode_delta_block(&src[pos..], &mut keys)?;
        let mut values = vec![0; BLOCK_SIZE + overflow];
        decode_delta_block(&src[pos..], &mut values)?;

        let regular = if b + 1 == self.block_count() {
            self.r - b * BLOCK_SIZE
        } else {
            BLOCK_SIZE
        };

        let mut pairs = Vec::with_capacity(regular + overflow);
        pairs.extend(keys.iter().copied().zip(values.iter().copied()).take(regular));
        let last = keys[BLOCK_SIZE - 1];
        pairs.extend(values[BLOCK_SIZE..].iter().map(|v| (last, *v)));
        Ok(pairs)
    }
}

#[derive(Debug, Clone, Copy)]
enum Repr<'a> {
    Plain(RawInts<'a>),
    Compressed(Compressed<'a>),
}

#[derive(Debug, Clone, Copy)]
pub struct Index<'a> {
    n: usize,
    repr: Repr<'a>,
}

impl<'a> Index<'a> {
    pub fn decode_plain(data: &'a [u8], n: usize) -> Result<Self> {
        let count = n
            .checked_mul(2)
            .ok_or_else(|| Error::InvalidParameter(format!("index of {} pairs", n)))?;
        Ok(Self {
            n,
            repr: Repr::Plain(RawInts::new(data, count)?),
        })
    }

    pub fn decode_compressed(data: &'a [u8], n: usize, layout: IndexLayout) -> Result<Self> {
        let (head, rest) = RawInts::prefix(data, 1)?;
        let r = head.get(0).unwrap_or_default();
        if r < 0 || r as u64 > n as u64 {
            return Err(Error::InvalidParameter(format!(
                "{} regular rows in an index of {} pairs",
                r, n
            )));
        }
        let r = r as usize;
        let (sync, payload) = RawInts::prefix(rest, block_count(r) * layout.ints_per_block())?;

        Ok(Self {
            n,
            repr: Repr::Compressed(Compressed {
                r,
                layout,
                sync,
                payload,
            }),
        })
    }

    /// len returns the number of pairs including overflow rows.
    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self.repr, Repr::Compressed(_))
    }

    /// get_all returns every value stored under key, in ascending order.
    pub fn get_all(&self, key: i64) -> Result<Vec<i64>> {
        match self.repr {
            Repr::Plain(ints) => {
                let key_at = |i: usize| ints.get(2 * i).unwrap_or_default();
                let (mut lo, mut hi) = (0, self.n);
                while lo < hi {
                    let mid = lo + (hi - lo) / 2;
                    if key_at(mid) < key {
                        lo = mid + 1;
                    } else {
                        hi = mid;
                    }
                }
                let mut values = vec![];
                let mut i = lo;
                while i < self.n && key_at(i) == key {
                    values.push(ints.get(2 * i + 1).unwrap_or_default());
                    i += 1;
                }
                Ok(values)
            }
            Repr::Compressed(c) => match c.find_block(key)? {
                Some(b) => Ok(c
                    .decode_block(b)?
                    .into_iter()
                    .filter(|(k, _)| *k == key)
                    .map(|(_, v)| v)
                    .collect()),
                None => Ok(vec![]),
            },
        }
    }

    /// get_first returns the smallest value stored under key.
    pub fn get_first(&self, key: i64) -> Result<Option<i64>> {
        Ok(self.get_all(key)?.first().copied())
    }

    pub fn contains_key(&self, key: i64) -> Result<bool> {
        Ok(self.get_first(key)?.is_some())
    }

    /// iter returns all pairs in key order.
    pub fn iter(&self) -> IndexIter<'a> {
        IndexIter {
            index: *self,
            block: 0,
            pos: 0,
            pending: Vec::new().into_iter(),
            failed: false,
        }
    }
}

pub struct IndexIter<'a> {
    index: Index<'a>,
    block: usize,
    pos: usize,
    pending: std::vec::IntoIter<(i64, i64)>,
    failed: bool,
}

impl<'a> Iterator for IndexIter<'a> {
    type Item = Result<(i64, i64)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.index.repr {
            Repr::Plain(ints) => {
                if self.pos >= self.index.n {
                    return None;
                }
                let i = self.pos;
                self.pos += 1;
                Some(Ok((
                    ints.get(2 * i).unwrap_or_default(),
                    ints.get(2 * i + 1).unwrap_or_default(),
                )))
            }
            Repr::Compressed(c) => loop {
                if let Some(pair) = self.pending.next() {
                    return Some(Ok(pair));
                }
                if self.block >= c.block_count() {
                    return None;
                }
                match c.decode_block(self.block) {
                    Ok(pairs) => self.pending = pairs.into_iter(),
                    Err(e) => {
                        self.failed = true;
                        return Some(Err(e));
                    }
                }
                self.block += 1;
            },
        }
    }
}

/// encode_index sorts pairs by key, then value, and appends them as raw integers.
pub fn encode_index<B: BufMut>(buf: &mut B, pairs: &mut [(i64, i64)]) {
    pairs.sort_unstable();
    for (k, v) in pairs.iter() {
        buf.put_i64_le(*k);
        buf.put_i64_le(*v);
    }
}

/// group_blocks cuts sorted pairs into blocks of 16 pairs plus overflow rows.
fn group_blocks(pairs: &[(i64, i64)]) -> Vec<&[(i64, i64)]> {
    let mut blocks = vec![];
    let mut start = 0;
    while start < pairs.len() {
        let mut end = (start + BLOCK_SIZE).min(pairs.len());
        if end - start == BLOCK_SIZE {
            while end < pairs.len() && pairs[end].0 == pairs[end - 1].0 {
                end += 1;
            }
        }
        blocks.push(&pairs[start..end]);
        start = end;
    }
    blocks
}

/// encode_index_compressed sorts pairs by key, then value, and appends them
/// as a compressed index with the given sync table layout.
pub fn encode_index_compressed<B: BufMut>(
    buf: &mut B,
    pairs: &mut [(i64, i64)],
    layout: IndexLayout,
) {
    pairs.sort_unstable();
    let blocks = group_blocks(pairs);

    let r: usize = blocks.iter().map(|b| b.len().min(BLOCK_SIZE)).sum();
    let mut w = BlockWriter::new();
    let mut first_keys = Vec::with_capacity(blocks.len());
    let mut values = Vec::with_capacity(BLOCK_SIZE);

    for block in &blocks {
        w.start_block();
        first_keys.push(block[0].0);

        let regular = block.len().min(BLOCK_SIZE);
        let keys: Vec<i64> = block[..regular].iter().map(|(k, _)| *k).collect();
        values.clear();
        values.extend(block.iter().map(|(_, v)| *v));
        values.resize(values.len().max(BLOCK_SIZE), PADDING);

        let payload = w.payload_mut();
        put_varint(payload, (block.len() - regular) as i64);
        encode_delta_block(payload, &pad_block(&keys, PADDING));
        encode_delta_block(payload, &values);
    }

    buf.put_i64_le(r as i64);
    let (offsets, payload) = w.into_parts();
    for (key, offset) in first_keys.iter().zip(offsets.iter()) {
        if layout == IndexLayout::Keyed {
            buf.put_i64_le(*key);
        }
        buf.put_i64_le(*offset);
    }
    buf.put_slice(&payload);
}
