use bytes::BufMut;

use crate::codec::block::RawInts;
use crate::codec::varint::{encode_delta_block, VarInt};
use crate::error::{Error, Result};

/// InvertedIndex maps each of k types to the ascending list of positions it occurs at.
///
/// A table of k raw (frequency, offset) pairs is followed by the posting
/// lists, each a first position and then the gaps between positions.
#[derive(Debug, Clone, Copy)]
pub struct InvertedIndex<'a> {
    k: usize,
    typeinfo: RawInts<'a>,
    postings: &'a [u8],
}

impl<'a> InvertedIndex<'a> {
    pub fn decode(data: &'a [u8], k: usize) -> Result<Self> {
        let count = k
            .checked_mul(2)
            .ok_or_else(|| Error::InvalidParameter(format!("inverted index of {} types", k)))?;
        let (typeinfo, postings) = RawInts::prefix(data, count)?;
        Ok(Self {
            k,
            typeinfo,
            postings,
        })
    }

    pub fn n_types(&self) -> usize {
        self.k
    }

    fn check(&self, t: usize) -> Result<()> {
        if t >= self.k {
            return Err(Error::OutOfBounds {
                index: t,
                len: self.k,
            });
        }
        Ok(())
    }

    /// frequency returns the number of positions of type t.
    pub fn frequency(&self, t: usize) -> Result<usize> {
        self.check(t)?;
        let f = self.typeinfo.get(2 * t).unwrap_or_default();
        usize::try_from(f).map_err(|_| {
            Error::InvalidParameter(format!("negative frequency {} for type {}", f, t))
        })
    }

    /// postings iterates over the positions of type t.
    pub fn postings(&self, t: usize) -> Result<Postings<'a>> {
        let remaining = self.frequency(t)?;
        let offset = self.typeinfo.get(2 * t + 1).unwrap_or_default();
        if offset < 0 || offset as u64 > self.postings.len() as u64 {
            return Err(Error::size_mismatch(
                "posting list offset",
                self.postings.len(),
                offset.max(0) as usize,
            ));
        }
        Ok(Postings {
            src: &self.postings[offset as usize..],
            remaining,
            first: true,
            value: 0,
        })
    }

    /// positions decodes the whole posting list of type t.
    pub fn positions(&self, t: usize) -> Result<Vec<i64>> {
        self.postings(t)?.collect()
    }
}

pub struct Postings<'a> {
    src: &'a [u8],
    remaining: usize,
    first: bool,
    value: i64,
}

impl<'a> Iterator for Postings<'a> {
    type Item = Result<i64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        match i64::decode_var(self.src) {
            Ok((delta, n)) => {
                self.src = &self.src[n..];
                self.remaining -= 1;
                self.value = if self.first {
                    delta
                } else {
                    self.value.wrapping_add(delta)
                };
                self.first = false;
                Some(Ok(self.value))
            }
            Err(e) => {
                self.remaining = 0;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

/// encode_inverted_index appends the type table and posting lists. Each list must be ascending.
pub fn encode_inverted_index<B, P>(buf: &mut B, postings: &[P]) -> Result<()>
where
    B: BufMut,
    P: AsRef<[i64]>,
{
    let mut encoded: Vec<u8> = vec![];
    let mut typeinfo = Vec::with_capacity(postings.len());
    for (t, list) in postings.iter().enumerate() {
        let list = list.as_ref();
        if list.windows(2).any(|w| w[0] > w[1]) {
            return Err(Error::InvalidParameter(format!(
                "posting list of type {} is not ascending",
                t
            )));
        }
        typeinfo.push((list.len() as i64, encoded.len() as i64));
        encode_delta_block(&mut encoded, list);
    }

    for (frequency, offset) in typeinfo {
        buf.put_i64_le(frequency);
        buf.put_i64_le(offset);
    }
    buf.put_slice(&encoded);
    Ok(())
}

/// postings_from_ids builds the posting lists of k types from a stream of type ids, one per position.
pub fn postings_from_ids(ids: &[i64], k: usize) -> Result<Vec<Vec<i64>>> {
    let mut postings = vec![vec![]; k];
    for (pos, id) in ids.iter().enumerate() {
        let list = usize::try_from(*id)
            .ok()
            .and_then(|t| postings.get_mut(t))
            .ok_or(Error::OutOfBounds {
                index: pos,
                len: k,
            })?;
        list.push(pos as i64);
    }
    Ok(postings)
}

#[cfg(test)]
mod tests {
    use crate::component::inverted_index::{
        encode_inverted_index, postings_from_ids, InvertedIndex,
    };
    use crate::error::Error;

    #[test]
    fn test_inverted_index() {
        let ids = vec![0, 1, 0, 2, 2, 2, 0, 1, 3, 0];
        let postings = postings_from_ids(&ids, 5).unwrap();
        let mut buf: Vec<u8> = vec![];
        encode_inverted_index(&mut buf, &postings).unwrap();

        let inv = InvertedIndex::decode(&buf, 5).unwrap();
        assert_eq!(inv.n_types(), 5);
        assert_eq!(inv.frequency(0).unwrap(), 4);
        assert_eq!(inv.positions(0).unwrap(), vec![0, 2, 6, 9]);
        assert_eq!(inv.positions(2).unwrap(), vec![3, 4, 5]);
        assert_eq!(inv.positions(3).unwrap(), vec![8]);
        assert!(inv.positions(4).unwrap().is_empty());
        assert_eq!(inv.postings(1).unwrap().count(), 2);
        assert!(matches!(inv.frequency(5), Err(Error::OutOfBounds { .. })));

        // every position appears under exactly one type
        let mut total = 0;
        for t in 0..inv.n_types() {
            for p in inv.postings(t).unwrap() {
                assert_eq!(ids[p.unwrap() as usize], t as i64);
                total += 1;
            }
        }
        assert_eq!(total, ids.len());
    }

    #[test]
    fn test_inverted_index_invalid() {
        assert!(encode_inverted_index(&mut Vec::<u8>::new(), &[vec![3, 1]]).is_err());
        assert!(postings_from_ids(&[0, 7], 2).is_err());
        assert!(matches!(
            InvertedIndex::decode(&[0; 8], 1),
            Err(Error::SizeMismatch { .. })
        ));

        let mut buf: Vec<u8> = vec![];
        encode_inverted_index(&mut buf, &[vec![1_i64, 500, 100_000]]).unwrap();
        let inv = InvertedIndex::decode(&buf[..buf.len() - 1], 1).unwrap();
        let got: Vec<_> = inv.postings(0).unwrap().collect();
        assert_eq!(got.len(), 3);
        assert!(got[2].is_err());
    }
}
