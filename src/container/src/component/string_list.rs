use bytes::BufMut;

use crate::error::{Error, Result};

/// StringList is a sequence of NUL terminated strings stored back to back.
#[derive(Debug, Clone, Copy)]
pub struct StringList<'a> {
    n: usize,
    data: &'a [u8],
}

impl<'a> StringList<'a> {
    pub fn decode(data: &'a [u8], n: usize) -> Result<Self> {
        let terminators = data.iter().filter(|b| **b == 0).count();
        if terminators != n || data.last().map_or(n > 0, |b| *b != 0) {
            return Err(Error::size_mismatch("string list terminators", n, terminators));
        }
        Ok(Self { n, data })
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// get returns string i, scanning from the start of the list.
    pub fn get(&self, i: usize) -> Result<&'a str> {
        if i >= self.n {
            return Err(Error::OutOfBounds {
                index: i,
                len: self.n,
            });
        }
        self.iter()
            .nth(i)
            .unwrap_or(Err(Error::OutOfBounds { index: i, len: self.n }))
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<&'a str>> + 'a {
        self.data
            .split(|b| *b == 0)
            .take(self.n)
            .map(|s| std::str::from_utf8(s).map_err(|_| Error::InvalidUtf8("string list")))
    }
}

/// encode_string_list appends strings to buf, each terminated by NUL.
pub fn encode_string_list<B, S>(buf: &mut B, strings: &[S]) -> Result<()>
where
    B: BufMut,
    S: AsRef<str>,
{
    for s in strings {
        let s = s.as_ref();
        if s.contains('\0') {
            return Err(Error::InvalidParameter(format!(
                "string {:?} contains NUL",
                s
            )));
        }
        buf.put_slice(s.as_bytes());
        buf.put_u8(0);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::component::string_list::{encode_string_list, StringList};
    use crate::error::Error;

    #[test]
    fn test_string_list() {
        let strings = vec!["the", "", "Ziggurat", "größer"];
        let mut buf: Vec<u8> = vec![];
        encode_string_list(&mut buf, &strings).unwrap();

        let list = StringList::decode(&buf, strings.len()).unwrap();
        assert_eq!(list.len(), 4);
        assert_eq!(list.get(1).unwrap(), "");
        assert_eq!(list.get(3).unwrap(), "größer");
        assert!(matches!(list.get(4), Err(Error::OutOfBounds { index: 4, len: 4 })));

        let got: Vec<&str> = list.iter().collect::<Result<_, _>>().unwrap();
        assert_eq!(got, strings);
    }

    #[test]
    fn test_string_list_corrupt() {
        let mut buf: Vec<u8> = vec![];
        encode_string_list(&mut buf, &["a", "b"]).unwrap();
        assert!(matches!(
            StringList::decode(&buf, 3),
            Err(Error::SizeMismatch { .. })
        ));
        assert!(StringList::decode(&buf[..3], 1).is_err());
        assert!(StringList::decode(&[], 0).unwrap().is_empty());

        assert!(encode_string_list(&mut Vec::<u8>::new(), &["a\0b"]).is_err());

        let list = StringList::decode(&[0xff, 0], 1).unwrap();
        assert_eq!(list.get(0), Err(Error::InvalidUtf8("string list")));
    }
}
