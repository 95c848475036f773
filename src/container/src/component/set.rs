//! Sets of integer tuples, one set per row.
//!
//! Each block of 16 sets starts with 16 delta coded item offsets and 16 item
//! lengths, followed by the items themselves. An item of length l holds l
//! tuples of p integers as l·p plain varints. Sync entries are relative to
//! the start of the component.

use bytes::BufMut;

use crate::codec::block::{
    block_count, pad_block, BlockWriter, RawInts, SyncBlocks, BLOCK_SIZE, PADDING,
    SYNC_ENTRY_SIZE,
};
use crate::codec::varint::{decode_block, decode_delta_block, encode_block, encode_delta_block};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
pub struct Set<'a> {
    n: usize,
    p: usize,
    blocks: SyncBlocks<'a>,
}

#[derive(Debug, Clone, Copy)]
struct SetBlock<'a> {
    offsets: [i64; BLOCK_SIZE],
    lengths: [i64; BLOCK_SIZE],
    items: &'a [u8],
}

impl<'a> SetBlock<'a> {
    fn item(&self, k: usize, p: usize) -> Result<Vec<i64>> {
        let (offset, len) = (self.offsets[k], self.lengths[k]);
        if offset < 0 || offset as u64 > self.items.len() as u64 || len < 0 {
            return Err(Error::size_mismatch(
                "set item",
                self.items.len(),
                offset.max(0) as usize,
            ));
        }

        let count = (len as usize)
            .checked_mul(p)
            .ok_or_else(|| Error::InvalidParameter(format!("set item of {} tuples", len)))?;
        let src = &self.items[offset as usize..];
        let mut values = vec![0; count.min(src.len())];
        if values.len() < count {
            return Err(Error::TruncatedVarInt(src.len()));
        }
        decode_block(src, &mut values)?;
        Ok(values)
    }
}

impl<'a> Set<'a> {
    pub fn decode(data: &'a [u8], n: usize, p: usize) -> Result<Self> {
        if p == 0 {
            return Err(Error::InvalidParameter(
                "set tuple width must be positive".to_string(),
            ));
        }
        let (sync, _) = RawInts::prefix(data, block_count(n))?;
        Ok(Self {
            n,
            p,
            blocks: SyncBlocks::new(sync, data),
        })
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// width returns the number of integers in each tuple.
    pub fn width(&self) -> usize {
        self.p
    }

    fn read_block(&self, b: usize) -> Result<SetBlock<'a>> {
        let src = self.blocks.block(b)?;
        let mut offsets = [0; BLOCK_SIZE];
        let mut lengths = [0; BLOCK_SIZE];
        let mut pos = decode_delta_block(src, &mut offsets)?;
        pos += decode_block(&src[pos..], &mut lengths)?;
        Ok(SetBlock {
            offsets,
            lengths,
            items: &src[pos..],
        })
    }

    /// get returns set i with its tuples flattened.
    pub fn get(&self, i: usize) -> Result<Vec<i64>> {
        if i >= self.n {
            return Err(Error::OutOfBounds {
                index: i,
                len: self.n,
            });
        }
        self.read_block(i / BLOCK_SIZE)?
            .item(i % BLOCK_SIZE, self.p)
    }

    pub fn iter(&self) -> SetIter<'a> {
        SetIter {
            set: *self,
            i: 0,
            block: None,
        }
    }
}

/// SetIter walks all sets in order, reading each block header once.
pub struct SetIter<'a> {
    set: Set<'a>,
    i: usize,
    block: Option<SetBlock<'a>>,
}

impl<'a> Iterator for SetIter<'a> {
    type Item = Result<Vec<i64>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.i >= self.set.n {
            return None;
        }

        let k = self.i % BLOCK_SIZE;
        if k == 0 || self.block.is_none() {
            match self.set.read_block(self.i / BLOCK_SIZE) {
                Ok(b) => self.block = Some(b),
                Err(e) => {
                    self.i = self.set.n;
                    return Some(Err(e));
                }
            }
        }
        self.i += 1;
        self.block.as_ref().map(|b| b.item(k, self.set.p))
    }
}

/// normalize sorts the tuples of a flattened item and removes duplicates.
fn normalize(item: &[i64], p: usize) -> Vec<i64> {
    let mut tuples: Vec<&[i64]> = item.chunks_exact(p).collect();
    tuples.sort_unstable();
    tuples.dedup();
    tuples.concat()
}

/// encode_set appends one set per row. Items are flattened tuples of width p,
/// stored sorted and deduplicated.
pub fn encode_set<B, S>(buf: &mut B, items: &[S], p: usize) -> Result<()>
where
    B: BufMut,
    S: AsRef<[i64]>,
{
    if p == 0 {
        return Err(Error::InvalidParameter(
            "set tuple width must be positive".to_string(),
        ));
    }

    let m = block_count(items.len());
    let mut w = BlockWriter::with_base(m * SYNC_ENTRY_SIZE);
    let mut encoded: Vec<u8> = vec![];
    let mut offsets = Vec::with_capacity(BLOCK_SIZE);
    let mut lengths = Vec::with_capacity(BLOCK_SIZE);

    for batch in items.chunks(BLOCK_SIZE) {
        encoded.clear();
        offsets.clear();
        lengths.clear();

        for item in batch {
            let item = item.as_ref();
            if item.len() % p != 0 {
                return Err(Error::InvalidParameter(format!(
                    "set item of {} values is not a multiple of {}",
                    item.len(),
                    p
                )));
            }
            let item = normalize(item, p);
            offsets.push(encoded.len() as i64);
            lengths.push((item.len() / p) as i64);
            encode_block(&mut encoded, &item);
        }

        w.start_block();
        let payload = w.payload_mut();
        encode_delta_block(payload, &pad_block(&offsets, PADDING));
        encode_block(payload, &pad_block(&lengths, 0));
        payload.put_slice(&encoded);
    }

    w.finish(buf);
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::component::set::{encode_set, Set};
    use crate::error::Error;

    #[test]
    fn test_set_round_trip() {
        let items: Vec<Vec<i64>> = (0..40)
            .map(|i| match i % 4 {
                0 => vec![],
                1 => vec![i],
                2 => vec![i * 3, -i, 1_000_000 + i],
                _ => vec![5, 5, 2],
            })
            .collect();

        let mut buf: Vec<u8> = vec![];
        encode_set(&mut buf, &items, 1).unwrap();
        let set = Set::decode(&buf, items.len(), 1).unwrap();
        assert_eq!(set.len(), 40);
        assert_eq!(set.width(), 1);

        let expect = |item: &Vec<i64>| {
            let mut v = item.clone();
            v.sort_unstable();
            v.dedup();
            v
        };

        for (i, item) in items.iter().enumerate() {
            assert_eq!(set.get(i).unwrap(), expect(item), "set {}", i);
        }
        let all: Vec<Vec<i64>> = set.iter().collect::<Result<_, _>>().unwrap();
        assert_eq!(all, items.iter().map(expect).collect::<Vec<_>>());
        assert!(matches!(set.get(40), Err(Error::OutOfBounds { .. })));
    }

    #[test]
    fn test_set_of_pairs() {
        let items = vec![vec![3, 4, 1, 2, 3, 4], vec![], vec![-1, 7]];
        let mut buf: Vec<u8> = vec![];
        encode_set(&mut buf, &items, 2).unwrap();

        let set = Set::decode(&buf, 3, 2).unwrap();
        assert_eq!(set.get(0).unwrap(), vec![1, 2, 3, 4]);
        assert!(set.get(1).unwrap().is_empty());
        assert_eq!(set.get(2).unwrap(), vec![-1, 7]);
    }

    #[test]
    fn test_set_invalid() {
        assert!(matches!(
            encode_set(&mut Vec::<u8>::new(), &[vec![1, 2, 3]], 2),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            Set::decode(&[], 0, 0),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            Set::decode(&[0; 8], 17, 1),
            Err(Error::SizeMismatch { .. })
        ));

        let mut buf: Vec<u8> = vec![];
        encode_set(&mut buf, &[vec![1_i64, 2, 3]], 1).unwrap();
        let set = Set::decode(&buf[..buf.len() - 1], 1, 1).unwrap();
        assert!(set.get(0).is_err());
    }
}
