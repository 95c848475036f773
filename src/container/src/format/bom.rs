//! The directory (bill of materials) follows the fixed header and holds one
//! 48-byte entry per component:
//!
//! ```text
//! ┌────────┬──────┬──────┬──────────┬─────────┬─────────┬─────────┬─────────┐
//! │ family │ type │ mode │   name   │ offset  │  size   │ param1  │ param2  │
//! │ 1 byte │  1   │  1   │ 13 bytes │ 8 bytes │ 8 bytes │ 8 bytes │ 8 bytes │
//! └────────┴──────┴──────┴──────────┴─────────┴─────────┴─────────┴─────────┘
//! ```

use std::collections::HashMap;
use std::ops::Range;

use byteorder::{ByteOrder, LittleEndian};
use bytes::BufMut;

use crate::error::{Error, Result};
use crate::format::header::ContainerHeader;

pub const BOM_ENTRY_SIZE: usize = 48;

/// NAME_LEN is the maximum length of a component name in bytes.
pub const NAME_LEN: usize = 13;

/// validate_name checks that name fits the directory name field.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > NAME_LEN || name.contains('\0') {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BomEntry {
    pub family: u8,
    pub ctype: u8,
    pub mode: u8,
    pub name: String,
    pub offset: i64,
    pub size: i64,
    pub param1: i64,
    pub param2: i64,
}

impl BomEntry {
    /// parse decodes one entry from the first BOM_ENTRY_SIZE bytes of buf.
    pub fn parse(buf: &[u8]) -> Self {
        let raw_name = &buf[3..3 + NAME_LEN];
        let end = raw_name.iter().position(|b| *b == 0).unwrap_or(NAME_LEN);

        Self {
            family: buf[0],
            ctype: buf[1],
            mode: buf[2],
            name: String::from_utf8_lossy(&raw_name[..end]).into_owned(),
            offset: LittleEndian::read_i64(&buf[16..24]),
            size: LittleEndian::read_i64(&buf[24..32]),
            param1: LittleEndian::read_i64(&buf[32..40]),
            param2: LittleEndian::read_i64(&buf[40..48]),
        }
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        validate_name(&self.name)?;

        buf.put_u8(self.family);
        buf.put_u8(self.ctype);
        buf.put_u8(self.mode);
        buf.put_slice(self.name.as_bytes());
        buf.put_bytes(0, NAME_LEN - self.name.len());
        buf.put_i64_le(self.offset);
        buf.put_i64_le(self.size);
        buf.put_i64_le(self.param1);
        buf.put_i64_le(self.param2);
        Ok(())
    }

    /// extent returns the byte range of the component if offset and size are sane.
    pub fn extent(&self) -> Option<Range<usize>> {
        let start = usize::try_from(self.offset).ok()?;
        let size = usize::try_from(self.size).ok()?;
        Some(start..start.checked_add(size)?)
    }
}

/// Directory is the parsed directory of a container with its validation results.
#[derive(Debug, Clone)]
pub struct Directory {
    entries: Vec<BomEntry>,
    problems: Vec<Option<Error>>,
    by_name: HashMap<String, usize>,
}

impl Directory {
    /// parse reads `used_components` entries following the header and checks
    /// each against the file length, the reserved header region and its siblings.
    pub fn parse(buf: &[u8], header: &ContainerHeader) -> Result<Self> {
        let start = header.revision.bom_offset();
        let used = header.used_components as usize;
        let end = start + used * BOM_ENTRY_SIZE;
        if end > buf.len() {
            return Err(Error::FormatMismatch(format!(
                "directory of {} entries ends at {}, past the end of the file at {}",
                used,
                end,
                buf.len()
            )));
        }

        let entries: Vec<BomEntry> = buf[start..end]
            .chunks_exact(BOM_ENTRY_SIZE)
            .map(BomEntry::parse)
            .collect();

        let reserved = start + header.allocated_components as usize * BOM_ENTRY_SIZE;
        Ok(Self::validate(entries, reserved, buf.len()))
    }

    fn validate(entries: Vec<BomEntry>, reserved: usize, file_len: usize) -> Self {
        let mut problems: Vec<Option<Error>> = vec![None; entries.len()];
        let mut by_name: HashMap<String, usize> = HashMap::with_capacity(entries.len());

        let mut extents = Vec::with_capacity(entries.len());
        for (i, e) in entries.iter().enumerate() {
            if let Some(first) = by_name.get(&e.name) {
                let reason = "duplicate component name";
                problems[*first] = Some(Error::corruption(&e.name, reason));
                problems[i] = Some(Error::corruption(&e.name, reason));
                continue;
            }
            by_name.insert(e.name.clone(), i);

            match e.extent() {
                None => {
                    problems[i] = Some(Error::corruption(
                        &e.name,
                        format!("invalid extent offset={} size={}", e.offset, e.size),
                    ))
                }
                Some(r) if r.end > file_len => {
                    problems[i] = Some(Error::corruption(
                        &e.name,
                        format!("extent {:?} exceeds file length {}", r, file_len),
                    ))
                }
                Some(r) if r.start < reserved && !r.is_empty() => {
                    problems[i] = Some(Error::corruption(
                        &e.name,
                        format!("extent {:?} overlaps the header region ending at {}", r, reserved),
                    ))
                }
                Some(r) if !r.is_empty() => extents.push((r, i)),
                Some(_) => {}
            }
        }

        // sweep by start, comparing each extent with the furthest end seen so far
        extents.sort_by_key(|(r, _)| r.start);
        let mut furthest: Option<(usize, usize)> = None;
        for (cur, c) in &extents {
            if let Some((end, owner)) = furthest {
                if cur.start < end {
                    let reason = format!(
                        "extent {:?} overlaps {:?} ending at {}",
                        cur, entries[owner].name, end
                    );
                    problems[*c] = Some(Error::corruption(&entries[*c].name, reason));
                    if problems[owner].is_none() {
                        problems[owner] = Some(Error::corruption(
                            &entries[owner].name,
                            format!("extent overlaps {:?}", entries[*c].name),
                        ));
                    }
                }
            }
            if furthest.map_or(true, |(end, _)| cur.end > end) {
                furthest = Some((cur.end, *c));
            }
        }

        Self {
            entries,
            problems,
            by_name,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[BomEntry] {
        &self.entries
    }

    /// get returns the entry named name, valid or not.
    pub fn get(&self, name: &str) -> Option<&BomEntry> {
        self.by_name.get(name).map(|i| &self.entries[*i])
    }

    /// lookup returns the entry named name if it passed validation.
    pub fn lookup(&self, name: &str) -> Result<&BomEntry> {
        let i = *self
            .by_name
            .get(name)
            .ok_or_else(|| Error::ComponentNotFound(name.to_string()))?;
        self.check(i)
    }

    /// check returns entry i, or the corruption recorded for it at open.
    pub fn check(&self, i: usize) -> Result<&BomEntry> {
        match &self.problems[i] {
            Some(e) => Err(e.clone()),
            None => Ok(&self.entries[i]),
        }
    }

    /// problems iterates over every entry that failed validation.
    pub fn problems(&self) -> impl Iterator<Item = (&BomEntry, &Error)> {
        self.entries
            .iter()
            .zip(self.problems.iter())
            .filter_map(|(e, p)| p.as_ref().map(|p| (e, p)))
    }
}

#[cfg(test)]
mod tests {
    use bytes::BufMut;
    use uuid::Uuid;

    use crate::error::Error;
    use crate::format::bom::{validate_name, BomEntry, Directory, BOM_ENTRY_SIZE};
    use crate::format::header::{ContainerHeader, ContainerType};
    use crate::format::HEADER_SIZE;

    fn entry(name: &str, offset: i64, size: i64) -> BomEntry {
        BomEntry {
            family: 0x01,
            ctype: 0x04,
            mode: 0x02,
            name: name.to_string(),
            offset,
            size,
            param1: 20,
            param2: 1,
        }
    }

    fn file(entries: &[BomEntry], len: usize) -> (Vec<u8>, ContainerHeader) {
        let mut h = ContainerHeader::new(ContainerType::IntegerVariable, Uuid::new_v4());
        h.allocated_components = entries.len() as u8;
        h.used_components = entries.len() as u8;

        let mut buf: Vec<u8> = vec![];
        h.encode(&mut buf).unwrap();
        for e in entries {
            e.encode(&mut buf).unwrap();
        }
        buf.put_bytes(0, len - buf.len());
        (buf, h)
    }

    #[test]
    fn test_entry_round_trip() {
        let e = entry("IntStream", 256, 123);
        let mut buf: Vec<u8> = vec![];
        e.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), BOM_ENTRY_SIZE);
        assert_eq!(&buf[3..12], b"IntStream");
        assert_eq!(BomEntry::parse(&buf), e);

        let e = entry("thirteen_char", 0, 0);
        let mut buf: Vec<u8> = vec![];
        e.encode(&mut buf).unwrap();
        assert_eq!(BomEntry::parse(&buf), e);
    }

    #[test]
    fn test_invalid_names() {
        assert!(validate_name("Partition").is_ok());
        assert!(matches!(validate_name(""), Err(Error::InvalidName(_))));
        assert!(matches!(
            validate_name("fourteen_chars"),
            Err(Error::InvalidName(_))
        ));
        assert!(entry("a\0b", 0, 0).encode(&mut Vec::<u8>::new()).is_err());
    }

    #[test]
    fn test_directory_round_trip() {
        let base = (HEADER_SIZE + 2 * BOM_ENTRY_SIZE) as i64;
        let entries = vec![entry("A", base, 16), entry("B", base + 16, 40)];
        let (buf, h) = file(&entries, base as usize + 56);

        let dir = Directory::parse(&buf, &h).unwrap();
        assert_eq!(dir.entries(), &entries[..]);
        assert_eq!(dir.problems().count(), 0);
        assert_eq!(dir.lookup("B").unwrap(), &entries[1]);
        assert!(matches!(dir.lookup("C"), Err(Error::ComponentNotFound(_))));
    }

    #[test]
    fn test_directory_bounds() {
        let base = (HEADER_SIZE + 2 * BOM_ENTRY_SIZE) as i64;
        let entries = vec![entry("A", base, 16), entry("B", base + 16, 4096)];
        let (buf, h) = file(&entries, base as usize + 56);

        let dir = Directory::parse(&buf, &h).unwrap();
        assert!(dir.lookup("A").is_ok());
        assert!(matches!(
            dir.lookup("B"),
            Err(Error::DirectoryCorruption { .. })
        ));

        let entries = vec![entry("A", base, -1), entry("B", 16, 8)];
        let (buf, h) = file(&entries, base as usize + 56);
        let dir = Directory::parse(&buf, &h).unwrap();
        assert_eq!(dir.problems().count(), 2);
    }

    #[test]
    fn test_directory_overlap_and_duplicates() {
        let base = (HEADER_SIZE + 3 * BOM_ENTRY_SIZE) as i64;
        let entries = vec![
            entry("A", base, 32),
            entry("B", base + 24, 16),
            entry("C", base + 40, 8),
        ];
        let (buf, h) = file(&entries, base as usize + 64);
        let dir = Directory::parse(&buf, &h).unwrap();
        assert!(dir.lookup("A").is_err());
        assert!(dir.lookup("B").is_err());
        assert!(dir.lookup("C").is_ok());

        let entries = vec![
            entry("A", base, 8),
            entry("B", base + 8, 8),
            entry("A", base + 16, 8),
        ];
        let (buf, h) = file(&entries, base as usize + 64);
        let dir = Directory::parse(&buf, &h).unwrap();
        assert!(matches!(
            dir.lookup("A"),
            Err(Error::DirectoryCorruption { .. })
        ));
        assert!(dir.lookup("B").is_ok());
    }

    #[test]
    fn test_directory_nested_extents() {
        let base = (HEADER_SIZE + 3 * BOM_ENTRY_SIZE) as i64;
        let entries = vec![
            entry("A", base, 100),
            entry("B", base + 10, 10),
            entry("C", base + 40, 10),
        ];
        let (buf, h) = file(&entries, base as usize + 128);
        let dir = Directory::parse(&buf, &h).unwrap();
        for name in ["A", "B", "C"] {
            assert!(
                matches!(dir.lookup(name), Err(Error::DirectoryCorruption { .. })),
                "{} overlaps A",
                name
            );
        }
        assert_eq!(dir.problems().count(), 3);

        // touching extents do not overlap
        let entries = vec![
            entry("A", base, 16),
            entry("B", base + 16, 8),
            entry("C", base + 24, 8),
        ];
        let (buf, h) = file(&entries, base as usize + 32);
        let dir = Directory::parse(&buf, &h).unwrap();
        assert_eq!(dir.problems().count(), 0);
    }

    #[test]
    fn test_directory_past_end_of_file() {
        let mut h = ContainerHeader::new(ContainerType::IntegerVariable, Uuid::new_v4());
        h.allocated_components = 2;
        h.used_components = 2;
        let mut buf: Vec<u8> = vec![];
        h.encode(&mut buf).unwrap();
        buf.put_bytes(0, BOM_ENTRY_SIZE);
        assert!(matches!(
            Directory::parse(&buf, &h),
            Err(Error::FormatMismatch(_))
        ));
    }
}
