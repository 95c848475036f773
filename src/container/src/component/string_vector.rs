use bytes::BufMut;
use ziggurat_utils::hash::FnvHash;

use crate::codec::RawInts;
use crate::component::index::Index;
use crate::error::{Error, Result};

/// StringVector is a string table with n+1 raw start offsets, giving O(1) access to every string.
#[derive(Debug, Clone, Copy)]
pub struct StringVector<'a> {
    offsets: RawInts<'a>,
    strings: &'a [u8],
}

impl<'a> StringVector<'a> {
    pub fn decode(data: &'a [u8], n: usize) -> Result<Self> {
        let count = n
            .checked_add(1)
            .ok_or_else(|| Error::InvalidParameter(format!("string vector of {} strings", n)))?;
        let (offsets, strings) = RawInts::prefix(data, count)?;
        Ok(Self { offsets, strings })
    }

    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize) -> Result<&'a str> {
        if i >= self.len() {
            return Err(Error::OutOfBounds {
                index: i,
                len: self.len(),
            });
        }

        let region = self.strings.len();
        let start = self.offsets.get(i).unwrap_or(-1);
        let mut end = self.offsets.get(i + 1).unwrap_or(-1);
        if i + 1 == self.len() {
            // some writers store one past the region for the final offset
            end = end.min(region as i64);
        }
        if start < 0 || end < start || end as u64 > region as u64 {
            return Err(Error::size_mismatch(
                "string vector offsets",
                region,
                start.max(0) as usize,
            ));
        }

        let mut s = &self.strings[start as usize..end as usize];
        if let [head @ .., 0] = s {
            s = head;
        }
        std::str::from_utf8(s).map_err(|_| Error::InvalidUtf8("string vector"))
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<&'a str>> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }

    /// find_all returns the positions of all strings matching predicate, in order.
    pub fn find_all<F>(&self, mut predicate: F) -> Result<Vec<usize>>
    where
        F: FnMut(&str) -> bool,
    {
        let mut found = vec![];
        for i in 0..self.len() {
            if predicate(self.get(i)?) {
                found.push(i);
            }
        }
        Ok(found)
    }

    /// find_hashed looks up s through an index of (fnv hash, position) pairs
    /// and returns the positions whose string equals s.
    pub fn find_hashed(&self, hashes: &Index<'_>, s: &str) -> Result<Vec<usize>> {
        let mut found = vec![];
        for pos in hashes.get_all(s.fnv_hash())? {
            let i = usize::try_from(pos).map_err(|_| {
                Error::InvalidParameter(format!("negative position {} in hash index", pos))
            })?;
            if self.get(i)? == s {
                found.push(i);
            }
        }
        found.sort_unstable();
        Ok(found)
    }
}

/// encode_string_vector appends the offset table and the strings of a string vector to buf.
pub fn encode_string_vector<B, S>(buf: &mut B, strings: &[S]) -> Result<()>
where
    B: BufMut,
    S: AsRef<str>,
{
    let mut offset = 0_i64;
    for s in strings {
        let s = s.as_ref();
        if s.contains('\0') {
            return Err(Error::InvalidParameter(format!(
                "string {:?} contains NUL",
                s
            )));
        }
        buf.put_i64_le(offset);
        offset += s.len() as i64 + 1;
    }
    buf.put_i64_le(offset);

    for s in strings {
        buf.put_slice(s.as_ref().as_bytes());
        buf.put_u8(0);
    }
    Ok(())
}

/// string_hash_pairs returns the (fnv hash, position) pairs indexing strings.
pub fn string_hash_pairs<S: AsRef<str>>(strings: &[S]) -> Vec<(i64, i64)> {
    strings
        .iter()
        .enumerate()
        .map(|(i, s)| (s.as_ref().fnv_hash(), i as i64))
        .collect()
}

#[cfg(test)]
mod tests {
    use bytes::BufMut;

    use crate::component::index::{encode_index, Index};
    use crate::component::string_vector::{
        encode_string_vector, string_hash_pairs, StringVector,
    };
    use crate::error::Error;

    #[test]
    fn test_string_vector() {
        let strings = vec!["walk", "walked", "", "talking", "walks"];
        let mut buf: Vec<u8> = vec![];
        encode_string_vector(&mut buf, &strings).unwrap();
        assert_eq!(buf.len(), 6 * 8 + 22 + 5);

        let v = StringVector::decode(&buf, strings.len()).unwrap();
        assert_eq!(v.len(), 5);
        assert_eq!(v.get(0).unwrap(), "walk");
        assert_eq!(v.get(2).unwrap(), "");
        assert_eq!(v.get(4).unwrap(), "walks");
        assert!(matches!(v.get(5), Err(Error::OutOfBounds { .. })));

        let all: Vec<&str> = v.iter().collect::<Result<_, _>>().unwrap();
        assert_eq!(all, strings);

        assert_eq!(v.find_all(|s| s.starts_with("walk")).unwrap(), vec![0, 1, 4]);
        assert_eq!(v.find_all(|s| s.ends_with("ed")).unwrap(), vec![1]);
        assert_eq!(v.find_all(|s| s.contains("alk")).unwrap(), vec![0, 1, 3, 4]);
    }

    #[test]
    fn test_string_vector_final_offset_past_region() {
        let mut buf: Vec<u8> = vec![];
        buf.put_i64_le(0);
        buf.put_i64_le(3);
        buf.put_i64_le(7);
        buf.put_slice(b"ab\0cde\0");
        let v = StringVector::decode(&buf, 2).unwrap();
        assert_eq!(v.get(0).unwrap(), "ab");
        assert_eq!(v.get(1).unwrap(), "cde");

        let mut buf: Vec<u8> = vec![];
        buf.put_i64_le(0);
        buf.put_i64_le(3);
        buf.put_i64_le(8);
        buf.put_slice(b"ab\0cde\0");
        let v = StringVector::decode(&buf, 2).unwrap();
        assert_eq!(v.get(1).unwrap(), "cde");
    }

    #[test]
    fn test_string_vector_interior_offset_past_region() {
        let mut buf: Vec<u8> = vec![];
        buf.put_i64_le(0);
        buf.put_i64_le(30);
        buf.put_i64_le(7);
        buf.put_slice(b"ab\0cde\0");
        let v = StringVector::decode(&buf, 2).unwrap();
        assert!(matches!(v.get(0), Err(Error::SizeMismatch { .. })));
        assert!(matches!(v.get(1), Err(Error::SizeMismatch { .. })));
    }

    #[test]
    fn test_string_vector_corrupt() {
        let mut buf: Vec<u8> = vec![];
        buf.put_i64_le(5);
        buf.put_i64_le(2);
        buf.put_slice(b"abcdef\0");
        let v = StringVector::decode(&buf, 1).unwrap();
        assert!(matches!(v.get(0), Err(Error::SizeMismatch { .. })));

        assert!(matches!(
            StringVector::decode(&buf[..12], 1),
            Err(Error::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_find_hashed() {
        let strings = vec!["house", "tree", "house", "garden"];
        let mut buf: Vec<u8> = vec![];
        encode_string_vector(&mut buf, &strings).unwrap();
        let v = StringVector::decode(&buf, strings.len()).unwrap();

        let mut pairs = string_hash_pairs(&strings);
        let mut ibuf: Vec<u8> = vec![];
        encode_index(&mut ibuf, &mut pairs);
        let index = Index::decode_plain(&ibuf, pairs.len()).unwrap();

        assert_eq!(v.find_hashed(&index, "house").unwrap(), vec![0, 2]);
        assert_eq!(v.find_hashed(&index, "garden").unwrap(), vec![3]);
        assert!(v.find_hashed(&index, "roof").unwrap().is_empty());
    }
}
