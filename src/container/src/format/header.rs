use byteorder::{ByteOrder, LittleEndian};
use bytes::BufMut;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::format::{HEADER_SIZE, MAGIC, VERSION};

const UUID_TEXT_LEN: usize = 36;
const COMMENT_LEN: usize = 72;

const FAMILY_ZIGGURAT: u8 = b'Z';
const FAMILY_APPLICATION: u8 = b'A';

/// HeaderRevision selects the byte layout of the fixed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HeaderRevision {
    /// UUIDs as hyphenated text, version terminated by a line feed.
    #[default]
    Compact,
    /// Raw UUIDs, an extensions word and a free-text comment.
    Extended,
}

impl HeaderRevision {
    /// detect checks magic and version and picks the revision from the byte
    /// following the version text.
    pub fn detect(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::FormatMismatch(format!(
                "file of {} bytes is shorter than the {} byte header",
                buf.len(),
                HEADER_SIZE
            )));
        }
        if &buf[0..8] != MAGIC {
            return Err(Error::FormatMismatch("invalid magic".to_string()));
        }
        if &buf[8..11] != VERSION {
            return Err(Error::FormatMismatch(format!(
                "unsupported version {:?}",
                String::from_utf8_lossy(&buf[8..11])
            )));
        }

        match buf[11] {
            b'\n' | 0 => Ok(HeaderRevision::Compact),
            FAMILY_ZIGGURAT | FAMILY_APPLICATION => Ok(HeaderRevision::Extended),
            b => Err(Error::FormatMismatch(format!(
                "unexpected byte {:#04x} after version",
                b
            ))),
        }
    }

    /// bom_offset returns the file position of the first directory entry.
    pub fn bom_offset(&self) -> usize {
        HEADER_SIZE
    }
}

/// ContainerType is the (family, class, type) classification of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerType {
    GraphLayer,
    PrimaryLayer,
    SegmentationLayer,
    TreeLayer,
    PlainStringVariable,
    HashVariable,
    IntegerVariable,
    PointerVariable,
    ExternalPointerVariable,
    SetVariable,
    IndexedStringVariable,
    /// Application defined container with its raw class and type bytes.
    Application { class: u8, ctype: u8 },
}

impl ContainerType {
    pub fn from_codes(family: u8, class: u8, ctype: u8) -> Result<Self> {
        if family == FAMILY_APPLICATION {
            return Ok(ContainerType::Application { class, ctype });
        }
        if family != FAMILY_ZIGGURAT {
            return Err(Error::FormatMismatch(format!(
                "unknown container family {:#04x}",
                family
            )));
        }

        let t = match (class, ctype) {
            (b'L', b'g') => ContainerType::GraphLayer,
            (b'L', b'p') => ContainerType::PrimaryLayer,
            (b'L', b's') => ContainerType::SegmentationLayer,
            (b'L', b't') => ContainerType::TreeLayer,
            (b'V', b'c') => ContainerType::PlainStringVariable,
            (b'V', b'h') => ContainerType::HashVariable,
            (b'V', b'i') => ContainerType::IntegerVariable,
            (b'V', b'p') => ContainerType::PointerVariable,
            (b'V', b'q') => ContainerType::ExternalPointerVariable,
            (b'V', b's') => ContainerType::SetVariable,
            (b'V', b'x') => ContainerType::IndexedStringVariable,
            _ => {
                return Err(Error::FormatMismatch(format!(
                    "unknown container type Z{}{}",
                    class as char, ctype as char
                )))
            }
        };
        Ok(t)
    }

    /// codes returns the family, class and type bytes.
    pub fn codes(&self) -> [u8; 3] {
        let (class, ctype) = match self {
            ContainerType::GraphLayer => (b'L', b'g'),
            ContainerType::PrimaryLayer => (b'L', b'p'),
            ContainerType::SegmentationLayer => (b'L', b's'),
            ContainerType::TreeLayer => (b'L', b't'),
            ContainerType::PlainStringVariable => (b'V', b'c'),
            ContainerType::HashVariable => (b'V', b'h'),
            ContainerType::IntegerVariable => (b'V', b'i'),
            ContainerType::PointerVariable => (b'V', b'p'),
            ContainerType::ExternalPointerVariable => (b'V', b'q'),
            ContainerType::SetVariable => (b'V', b's'),
            ContainerType::IndexedStringVariable => (b'V', b'x'),
            ContainerType::Application { class, ctype } => {
                return [FAMILY_APPLICATION, *class, *ctype]
            }
        };
        [FAMILY_ZIGGURAT, class, ctype]
    }
}

/// ContainerHeader holds the decoded fixed header of a container file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    pub revision: HeaderRevision,
    pub container_type: ContainerType,
    pub uuid: Uuid,
    pub allocated_components: u8,
    pub used_components: u8,
    pub dim1: i64,
    pub dim2: i64,
    pub base1_uuid: Option<Uuid>,
    pub base2_uuid: Option<Uuid>,
    /// Extended revision only.
    pub extensions: u64,
    /// Extended revision only, at most 72 bytes of UTF-8.
    pub comment: String,
}

impl ContainerHeader {
    pub fn new(container_type: ContainerType, uuid: Uuid) -> Self {
        Self {
            revision: HeaderRevision::default(),
            container_type,
            uuid,
            allocated_components: 0,
            used_components: 0,
            dim1: 0,
            dim2: 0,
            base1_uuid: None,
            base2_uuid: None,
            extensions: 0,
            comment: String::new(),
        }
    }

    /// bases returns the lineage references in slot order.
    pub fn bases(&self) -> [Option<Uuid>; 2] {
        [self.base1_uuid, self.base2_uuid]
    }

    /// parse reads the fixed header at the front of buf.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let revision = HeaderRevision::detect(buf)?;
        let header = match revision {
            HeaderRevision::Compact => Self::parse_compact(buf)?,
            HeaderRevision::Extended => Self::parse_extended(buf)?,
        };

        if header.used_components > header.allocated_components {
            return Err(Error::FormatMismatch(format!(
                "{} used components exceed {} allocated",
                header.used_components, header.allocated_components
            )));
        }
        Ok(header)
    }

    fn parse_compact(buf: &[u8]) -> Result<Self> {
        let container_type = ContainerType::from_codes(buf[12], buf[13], buf[14])?;
        let uuid = parse_uuid_text(&buf[16..16 + UUID_TEXT_LEN])?
            .ok_or_else(|| Error::FormatMismatch("missing container uuid".to_string()))?;

        Ok(Self {
            revision: HeaderRevision::Compact,
            container_type,
            uuid,
            allocated_components: buf[56],
            used_components: buf[57],
            dim1: LittleEndian::read_i64(&buf[64..72]),
            dim2: LittleEndian::read_i64(&buf[72..80]),
            base1_uuid: parse_uuid_text(&buf[80..80 + UUID_TEXT_LEN])?,
            base2_uuid: parse_uuid_text(&buf[120..120 + UUID_TEXT_LEN])?,
            extensions: 0,
            comment: String::new(),
        })
    }

    fn parse_extended(buf: &[u8]) -> Result<Self> {
        let container_type = ContainerType::from_codes(buf[11], buf[12], buf[13])?;

        let comment = &buf[88..88 + COMMENT_LEN];
        let end = comment.iter().position(|b| *b == 0).unwrap_or(COMMENT_LEN);
        let comment = std::str::from_utf8(&comment[..end])
            .map_err(|_| Error::FormatMismatch("comment is not valid utf-8".to_string()))?;

        Ok(Self {
            revision: HeaderRevision::Extended,
            container_type,
            uuid: parse_uuid_raw(&buf[16..32]),
            allocated_components: buf[14],
            used_components: buf[15],
            dim1: LittleEndian::read_i64(&buf[64..72]),
            dim2: LittleEndian::read_i64(&buf[72..80]),
            base1_uuid: Some(parse_uuid_raw(&buf[32..48])).filter(|u| !u.is_nil()),
            base2_uuid: Some(parse_uuid_raw(&buf[48..64])).filter(|u| !u.is_nil()),
            extensions: LittleEndian::read_u64(&buf[80..88]),
            comment: comment.to_string(),
        })
    }

    /// encode writes exactly HEADER_SIZE bytes.
    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        if self.used_components > self.allocated_components {
            return Err(Error::InvalidParameter(format!(
                "{} used components exceed {} allocated",
                self.used_components, self.allocated_components
            )));
        }
        match self.revision {
            HeaderRevision::Compact => self.encode_compact(buf),
            HeaderRevision::Extended => self.encode_extended(buf),
        }
    }

    fn encode_compact<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        if self.extensions != 0 || !self.comment.is_empty() {
            return Err(Error::InvalidParameter(
                "the compact header has no extensions or comment".to_string(),
            ));
        }

        buf.put_slice(MAGIC);
        buf.put_slice(VERSION);
        buf.put_u8(b'\n');
        buf.put_slice(&self.container_type.codes());
        buf.put_u8(b'\n');
        put_uuid_text(buf, Some(self.uuid));
        buf.put_slice(&[0x0a, 0x04, 0, 0]);
        buf.put_u8(self.allocated_components);
        buf.put_u8(self.used_components);
        buf.put_bytes(0, 6);
        buf.put_i64_le(self.dim1);
        buf.put_i64_le(self.dim2);
        put_uuid_text(buf, self.base1_uuid);
        buf.put_bytes(0, 4);
        put_uuid_text(buf, self.base2_uuid);
        buf.put_bytes(0, 4);
        Ok(())
    }

    fn encode_extended<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        if self.comment.len() > COMMENT_LEN || self.comment.contains('\0') {
            return Err(Error::InvalidParameter(format!(
                "comment must be at most {} bytes without NUL",
                COMMENT_LEN
            )));
        }

        buf.put_slice(MAGIC);
        buf.put_slice(VERSION);
        buf.put_slice(&self.container_type.codes());
        buf.put_u8(self.allocated_components);
        buf.put_u8(self.used_components);
        buf.put_slice(self.uuid.as_bytes());
        buf.put_slice(self.base1_uuid.unwrap_or_else(Uuid::nil).as_bytes());
        buf.put_slice(self.base2_uuid.unwrap_or_else(Uuid::nil).as_bytes());
        buf.put_i64_le(self.dim1);
        buf.put_i64_le(self.dim2);
        buf.put_u64_le(self.extensions);
        buf.put_slice(self.comment.as_bytes());
        buf.put_bytes(0, COMMENT_LEN - self.comment.len());
        Ok(())
    }
}

fn parse_uuid_text(b: &[u8]) -> Result<Option<Uuid>> {
    if b.contains(&0) {
        return Ok(None);
    }
    let s = std::str::from_utf8(b)
        .map_err(|_| Error::FormatMismatch("uuid is not valid utf-8".to_string()))?;
    let uuid = Uuid::parse_str(s)
        .map_err(|e| Error::FormatMismatch(format!("invalid uuid {:?}: {}", s, e)))?;
    Ok(Some(uuid))
}

fn parse_uuid_raw(b: &[u8]) -> Uuid {
    let mut raw = [0u8; 16];
    raw.copy_from_slice(b);
    Uuid::from_bytes(raw)
}

fn put_uuid_text<B: BufMut>(buf: &mut B, uuid: Option<Uuid>) {
    match uuid {
        Some(uuid) => {
            let mut text = Uuid::encode_buffer();
            buf.put_slice(uuid.hyphenated().encode_lower(&mut text).as_bytes());
        }
        None => buf.put_bytes(0, UUID_TEXT_LEN),
    }
}
