//! Integer vectors of n rows and d columns.
//!
//! The plain encoding stores n·d raw integers row by row. The compressed and
//! delta encodings store a sync table followed by blocks of 16 rows; inside
//! a block each column is 16 varints, coded as is (compressed) or as a first
//! value followed by differences (delta).

use bytes::BufMut;

use crate::codec::block::{
    block_count, decode_delta_at, decode_raw_at, pad_block, BlockWriter, RawInts, SyncBlocks,
    BLOCK_SIZE, PADDING,
};
use crate::codec::varint::{
    self, decode_block as decode_raw_block, decode_delta_block, encode_block, encode_delta_block,
};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VectorEncoding {
    Plain,
    Compressed,
    Delta,
}

#[derive(Debug, Clone, Copy)]
enum Repr<'a> {
    Plain(RawInts<'a>),
    Blocks(SyncBlocks<'a>),
}

#[derive(Debug, Clone, Copy)]
pub struct Vector<'a> {
    n: usize,
    d: usize,
    encoding: VectorEncoding,
    repr: Repr<'a>,
}

impl<'a> Vector<'a> {
    pub fn decode(data: &'a [u8], n: usize, d: usize, encoding: VectorEncoding) -> Result<Self> {
        if d == 0 {
            return Err(Error::InvalidParameter(
                "vector width must be positive".to_string(),
            ));
        }

        let repr = match encoding {
            VectorEncoding::Plain => {
                let count = n.checked_mul(d).ok_or_else(|| {
                    Error::InvalidParameter(format!("vector of {}x{} values", n, d))
                })?;
                Repr::Plain(RawInts::new(data, count)?)
            }
            VectorEncoding::Compressed | VectorEncoding::Delta => {
                let (sync, payload) = RawInts::prefix(data, block_count(n))?;
                Repr::Blocks(SyncBlocks::new(sync, payload))
            }
        };

        Ok(Self {
            n,
            d,
            encoding,
            repr,
        })
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn width(&self) -> usize {
        self.d
    }

    pub fn encoding(&self) -> VectorEncoding {
        self.encoding
    }

    fn check_row(&self, row: usize) -> Result<()> {
        if row >= self.n {
            return Err(Error::OutOfBounds {
                index: row,
                len: self.n,
            });
        }
        Ok(())
    }

    /// get returns the value at (row, col). Block encodings decode at most
    /// one column of one block.
    pub fn get(&self, row: usize, col: usize) -> Result<i64> {
        self.check_row(row)?;
        if col >= self.d {
            return Err(Error::OutOfBounds {
                index: col,
                len: self.d,
            });
        }

        match self.repr {
            Repr::Plain(ints) => ints.get(row * self.d + col).ok_or(Error::OutOfBounds {
                index: row,
                len: self.n,
            }),
            Repr::Blocks(blocks) => {
                let block = blocks.block(row / BLOCK_SIZE)?;
                let k = row % BLOCK_SIZE;
                match self.encoding {
                    VectorEncoding::Delta => {
                        let start = varint::skip(block, col * BLOCK_SIZE)?;
                        decode_delta_at(&block[start..], k)
                    }
                    _ => decode_raw_at(block, col * BLOCK_SIZE + k),
                }
            }
        }
    }

    pub fn get_row(&self, row: usize) -> Result<Vec<i64>> {
        self.check_row(row)?;
        (0..self.d).map(|col| self.get(row, col)).collect()
    }

    /// block_count returns the number of 16 row blocks.
    pub fn block_count(&self) -> usize {
        block_count(self.n)
    }

    /// decode_block returns the rows of block b, row by row, without padding.
    pub fn decode_block(&self, b: usize) -> Result<Vec<i64>> {
        let m = self.block_count();
        if b >= m {
            return Err(Error::OutOfBounds { index: b, len: m });
        }
        let rows = self.rows_in_block(b);

        match self.repr {
            Repr::Plain(ints) => {
                let start = b * BLOCK_SIZE * self.d;
                let ints = ints
                    .slice(start, start + rows * self.d)
                    .ok_or(Error::OutOfBounds { index: b, len: m })?;
                Ok(ints.iter().collect())
            }
            Repr::Blocks(blocks) => {
                let mut out = vec![0; BLOCK_SIZE * self.d];
                self.decode_block_at(blocks.block(b)?, &mut out)?;
                out.truncate(rows * self.d);
                Ok(out)
            }
        }
    }

    fn rows_in_block(&self, b: usize) -> usize {
        (self.n - b * BLOCK_SIZE).min(BLOCK_SIZE)
    }

    /// decode_block_at decodes a full block of every column into out, row by
    /// row, and returns the number of bytes consumed.
    fn decode_block_at(&self, src: &[u8], out: &mut [i64]) -> Result<usize> {
        let mut offset = 0;
        let mut column = [0_i64; BLOCK_SIZE];
        for col in 0..self.d {
            offset += match self.encoding {
                VectorEncoding::Delta => decode_delta_block(&src[offset..], &mut column)?,
                _ => decode_raw_block(&src[offset..], &mut column)?,
            };
            for (r, v) in column.iter().enumerate() {
                out[r * self.d + col] = *v;
            }
        }
        Ok(offset)
    }

    fn check_range(&self, start: usize, end: usize) -> Result<()> {
        if start > end || end > self.n {
            return Err(Error::OutOfBounds {
                index: start.max(end),
                len: self.n,
            });
        }
        Ok(())
    }

    /// iter walks all rows from the start, decoding every block once.
    pub fn iter(&self) -> Rows<'a> {
        Rows {
            cursor: Cursor::new(*self, 0, self.n),
        }
    }

    /// iter_range walks rows start..end. Decoding starts at the block holding start.
    pub fn iter_range(&self, start: usize, end: usize) -> Result<Rows<'a>> {
        self.check_range(start, end)?;
        Ok(Rows {
            cursor: Cursor::new(*self, start, end),
        })
    }

    /// column walks the values of one column from the start.
    pub fn column(&self, col: usize) -> Result<Column<'a>> {
        self.column_range(col, 0, self.n)
    }

    /// column_range walks rows start..end of one column.
    pub fn column_range(&self, col: usize, start: usize, end: usize) -> Result<Column<'a>> {
        if col >= self.d {
            return Err(Error::OutOfBounds {
                index: col,
                len: self.d,
            });
        }
        self.check_range(start, end)?;
        Ok(Column {
            cursor: Cursor::new(*self, start, end),
            col,
        })
    }
}

struct Cursor<'a> {
    vector: Vector<'a>,
    row: usize,
    end: usize,
    /// position of the next block in the region, None until the first block is located
    offset: Option<usize>,
    loaded: bool,
    block: Vec<i64>,
}

impl<'a> Cursor<'a> {
    fn new(vector: Vector<'a>, start: usize, end: usize) -> Self {
        Self {
            vector,
            row: start,
            end,
            offset: None,
            loaded: false,
            block: vec![0; BLOCK_SIZE * vector.d],
        }
    }

    /// advance moves to the next row and returns its position within the decoded block.
    fn advance(&mut self) -> Option<Result<usize>> {
        if self.row >= self.end {
            return None;
        }

        let k = self.row % BLOCK_SIZE;
        if k == 0 || !self.loaded {
            if let Err(e) = self.load_block() {
                self.row = self.end;
                return Some(Err(e));
            }
            self.loaded = true;
        }
        self.row += 1;
        Some(Ok(k))
    }

    fn load_block(&mut self) -> Result<()> {
        let v = self.vector;
        let b = self.row / BLOCK_SIZE;
        match v.repr {
            Repr::Plain(ints) => {
                let start = b * BLOCK_SIZE * v.d;
                let rows = v.rows_in_block(b);
                let ints = ints
                    .slice(start, start + rows * v.d)
                    .ok_or(Error::OutOfBounds {
                        index: self.row,
                        len: v.n,
                    })?;
                for (slot, value) in self.block.iter_mut().zip(ints.iter()) {
                    *slot = value;
                }
            }
            Repr::Blocks(blocks) => {
                let start = match self.offset {
                    Some(offset) => offset,
                    None => blocks.offset(b)?,
                };
                let src = blocks.region().get(start..).unwrap_or_default();
                self.offset = Some(start + v.decode_block_at(src, &mut self.block)?);
            }
        }
        Ok(())
    }
}

/// Rows is the sequential row iterator of a vector.
pub struct Rows<'a> {
    cursor: Cursor<'a>,
}

impl<'a> Iterator for Rows<'a> {
    type Item = Result<Vec<i64>>;

    fn next(&mut self) -> Option<Self::Item> {
        let d = self.cursor.vector.d;
        Some(
            self.cursor
                .advance()?
                .map(|k| self.cursor.block[k * d..(k + 1) * d].to_vec()),
        )
    }
}

/// Column is the sequential iterator over one column of a vector.
pub struct Column<'a> {
    cursor: Cursor<'a>,
    col: usize,
}

impl<'a> Iterator for Column<'a> {
    type Item = Result<i64>;

    fn next(&mut self) -> Option<Self::Item> {
        let d = self.cursor.vector.d;
        Some(
            self.cursor
                .advance()?
                .map(|k| self.cursor.block[k * d + self.col]),
        )
    }
}

/// encode_vector appends values, n rows of d columns stored row by row, in the given encoding.
pub fn encode_vector<B: BufMut>(
    buf: &mut B,
    values: &[i64],
    d: usize,
    encoding: VectorEncoding,
) -> Result<()> {
    if d == 0 || values.len() % d != 0 {
        return Err(Error::InvalidParameter(format!(
            "{} values do not form rows of width {}",
            values.len(),
            d
        )));
    }

    if encoding == VectorEncoding::Plain {
        for v in values {
            buf.put_i64_le(*v);
        }
        return Ok(());
    }

    let mut w = BlockWriter::new();
    let mut column = Vec::with_capacity(BLOCK_SIZE);
    for rows in values.chunks(BLOCK_SIZE * d) {
        w.start_block();
        for col in 0..d {
            column.clear();
            column.extend(rows.iter().skip(col).step_by(d));
            let block = pad_block(&column, PADDING);
            match encoding {
                VectorEncoding::Delta => encode_delta_block(w.payload_mut(), &block),
                _ => encode_block(w.payload_mut(), &block),
            };
        }
    }
    w.finish(buf);
    Ok(())
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use crate::component::vector::{encode_vector, Vector, VectorEncoding};
    use crate::error::Error;

    const ENCODINGS: [VectorEncoding; 3] = [
        VectorEncoding::Plain,
        VectorEncoding::Compressed,
        VectorEncoding::Delta,
    ];

    fn round_trip(values: &[i64], d: usize, encoding: VectorEncoding) -> Vec<u8> {
        let mut buf: Vec<u8> = vec![];
        encode_vector(&mut buf, values, d, encoding).unwrap();
        buf
    }

    #[test]
    fn test_single_column() {
        let mut rng = rand::thread_rng();
        let values: Vec<i64> = (0..250).map(|_| rng.gen_range(-100_000..100_000)).collect();

        for encoding in ENCODINGS {
            let buf = round_trip(&values, 1, encoding);
            let v = Vector::decode(&buf, values.len(), 1, encoding).unwrap();
            assert_eq!(v.len(), 250);
            assert_eq!(v.width(), 1);

            let seq: Vec<i64> = v.column(0).unwrap().collect::<Result<_, _>>().unwrap();
            assert_eq!(seq, values);
            for (i, x) in values.iter().enumerate() {
                assert_eq!(v.get(i, 0).unwrap(), *x, "{:?} row {}", encoding, i);
            }
            assert_eq!(v.decode_block(15).unwrap(), values[240..].to_vec());
            assert!(matches!(
                v.get(250, 0),
                Err(Error::OutOfBounds { index: 250, len: 250 })
            ));
        }
    }

    #[test]
    fn test_multi_column() {
        let n = 37;
        let d = 3;
        let values: Vec<i64> = (0..n * d).map(|i| (i as i64 * 7919) % 1013 - 500).collect();

        for encoding in ENCODINGS {
            let buf = round_trip(&values, d, encoding);
            let v = Vector::decode(&buf, n, d, encoding).unwrap();

            let rows: Vec<Vec<i64>> = v.iter().collect::<Result<_, _>>().unwrap();
            assert_eq!(rows.len(), n);
            for (r, row) in rows.iter().enumerate() {
                assert_eq!(row, &values[r * d..(r + 1) * d]);
                assert_eq!(&v.get_row(r).unwrap(), row);
            }

            let col: Vec<i64> = v.column(2).unwrap().collect::<Result<_, _>>().unwrap();
            let expected: Vec<i64> = values.iter().skip(2).step_by(d).copied().collect();
            assert_eq!(col, expected);

            assert_eq!(v.decode_block(1).unwrap(), values[16 * d..32 * d].to_vec());
            assert_eq!(v.decode_block(2).unwrap(), values[32 * d..].to_vec());
            assert!(v.decode_block(3).is_err());
            assert!(matches!(
                v.get(0, 3),
                Err(Error::OutOfBounds { index: 3, len: 3 })
            ));
        }
    }

    #[test]
    fn test_empty_and_invalid() {
        for encoding in ENCODINGS {
            let buf = round_trip(&[], 1, encoding);
            assert!(buf.is_empty());
            let v = Vector::decode(&buf, 0, 1, encoding).unwrap();
            assert!(v.is_empty());
            assert_eq!(v.iter().count(), 0);

            assert!(matches!(
                Vector::decode(&buf, 0, 0, encoding),
                Err(Error::InvalidParameter(_))
            ));
        }

        assert!(encode_vector(&mut Vec::<u8>::new(), &[1, 2, 3], 2, VectorEncoding::Delta).is_err());
        assert!(matches!(
            Vector::decode(&[0; 24], 4, 1, VectorEncoding::Plain),
            Err(Error::SizeMismatch { .. })
        ));
        assert!(matches!(
            Vector::decode(&[0; 8], 17, 1, VectorEncoding::Delta),
            Err(Error::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_ranges() {
        let n = 70;
        let d = 2;
        let values: Vec<i64> = (0..n * d).map(|i| (i as i64 * 613) % 997 - 400).collect();

        for encoding in ENCODINGS {
            let buf = round_trip(&values, d, encoding);
            let v = Vector::decode(&buf, n, d, encoding).unwrap();

            for start in [0, 15, 16, 17, 40, n - 1] {
                let rows: Vec<Vec<i64>> = v
                    .iter_range(start, n)
                    .unwrap()
                    .collect::<Result<_, _>>()
                    .unwrap();
                assert_eq!(rows.len(), n - start);
                for (i, row) in rows.iter().enumerate() {
                    let r = start + i;
                    assert_eq!(row, &values[r * d..(r + 1) * d], "{:?} row {}", encoding, r);
                }

                let col: Vec<i64> = v
                    .column_range(1, start, n)
                    .unwrap()
                    .collect::<Result<_, _>>()
                    .unwrap();
                let expected: Vec<i64> =
                    values.iter().skip(start * d + 1).step_by(d).copied().collect();
                assert_eq!(col, expected, "{:?} from {}", encoding, start);
            }

            let middle: Vec<i64> = v
                .column_range(0, 17, 33)
                .unwrap()
                .collect::<Result<_, _>>()
                .unwrap();
            let expected: Vec<i64> = (17..33).map(|r| values[r * d]).collect();
            assert_eq!(middle, expected);

            assert_eq!(v.iter_range(5, 5).unwrap().count(), 0);
            assert!(matches!(v.iter_range(0, n + 1), Err(Error::OutOfBounds { .. })));
            assert!(matches!(v.iter_range(9, 3), Err(Error::OutOfBounds { .. })));
            assert!(matches!(
                v.column_range(2, 0, 1),
                Err(Error::OutOfBounds { index: 2, len: 2 })
            ));
        }
    }

    #[test]
    fn test_truncated_block() {
        let values: Vec<i64> = (0..20).map(|i| i * 1_000_000).collect();
        let buf = round_trip(&values, 1, VectorEncoding::Delta);
        let cut = &buf[..buf.len() - 3];
        let v = Vector::decode(cut, 20, 1, VectorEncoding::Delta).unwrap();
        assert_eq!(v.get(3, 0).unwrap(), 3_000_000);
        // the missing bytes are padding, so real rows of the block still decode
        assert_eq!(v.get(19, 0).unwrap(), 19_000_000);
        assert!(matches!(v.decode_block(1), Err(Error::TruncatedVarInt(_))));

        let rows: Vec<_> = v.iter().collect();
        assert_eq!(rows.len(), 17);
        assert!(rows[16].is_err());
    }
}
