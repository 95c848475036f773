//! Typed components. A directory entry's (family, type, mode) codes select a
//! [`ComponentKind`], and [`decode`] turns the entry's bytes into a borrowed
//! [`Component`] view. [`ComponentData`] is the owned input of the encoders.

pub mod index;
pub mod inverted_index;
pub mod set;
pub mod string_list;
pub mod string_vector;
pub mod vector;

pub use index::{Index, IndexLayout};
pub use inverted_index::InvertedIndex;
pub use set::Set;
pub use string_list::StringList;
pub use string_vector::StringVector;
pub use vector::{Vector, VectorEncoding};

use crate::error::{Error, Result};
use crate::format::{BomEntry, HeaderRevision};

/// COMPONENT_FAMILY is the only component family defined by the format.
pub const COMPONENT_FAMILY: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Blob,
    StringList,
    StringVector,
    Vector,
    VectorComp,
    VectorDelta,
    Set,
    Index,
    IndexComp,
    InvertedIndex,
}

impl ComponentKind {
    pub fn from_codes(family: u8, ctype: u8, mode: u8) -> Result<Self> {
        let kind = match (family, ctype, mode) {
            (COMPONENT_FAMILY, 0x01, 0x00) => ComponentKind::Blob,
            (COMPONENT_FAMILY, 0x02, 0x00) => ComponentKind::StringList,
            (COMPONENT_FAMILY, 0x03, 0x00) => ComponentKind::StringVector,
            (COMPONENT_FAMILY, 0x04, 0x00) => ComponentKind::Vector,
            (COMPONENT_FAMILY, 0x04, 0x01) => ComponentKind::VectorComp,
            (COMPONENT_FAMILY, 0x04, 0x02) => ComponentKind::VectorDelta,
            (COMPONENT_FAMILY, 0x05, 0x01) => ComponentKind::Set,
            (COMPONENT_FAMILY, 0x06, 0x00) => ComponentKind::Index,
            (COMPONENT_FAMILY, 0x06, 0x01) => ComponentKind::IndexComp,
            (COMPONENT_FAMILY, 0x07, 0x01) => ComponentKind::InvertedIndex,
            _ => {
                return Err(Error::UnsupportedVariant {
                    family,
                    ctype,
                    mode,
                })
            }
        };
        Ok(kind)
    }

    /// codes returns the (type, mode) pair of the kind.
    pub fn codes(&self) -> (u8, u8) {
        match self {
            ComponentKind::Blob => (0x01, 0x00),
            ComponentKind::StringList => (0x02, 0x00),
            ComponentKind::StringVector => (0x03, 0x00),
            ComponentKind::Vector => (0x04, 0x00),
            ComponentKind::VectorComp => (0x04, 0x01),
            ComponentKind::VectorDelta => (0x04, 0x02),
            ComponentKind::Set => (0x05, 0x01),
            ComponentKind::Index => (0x06, 0x00),
            ComponentKind::IndexComp => (0x06, 0x01),
            ComponentKind::InvertedIndex => (0x07, 0x01),
        }
    }
}

/// Component is the decoded view of one directory entry, borrowing the container buffer.
#[derive(Debug, Clone, Copy)]
pub enum Component<'a> {
    Blob(&'a [u8]),
    StringList(StringList<'a>),
    StringVector(StringVector<'a>),
    Vector(Vector<'a>),
    Set(Set<'a>),
    Index(Index<'a>),
    InvertedIndex(InvertedIndex<'a>),
}

macro_rules! component_accessor {
    ($fn_name:ident, $variant:ident, $ty:ty, $expected:literal) => {
        pub fn $fn_name(self) -> Result<$ty> {
            match self {
                Component::$variant(c) => Ok(c),
                other => Err(Error::UnexpectedKind {
                    expected: $expected,
                    found: other.kind(),
                }),
            }
        }
    };
}

impl<'a> Component<'a> {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Component::Blob(_) => ComponentKind::Blob,
            Component::StringList(_) => ComponentKind::StringList,
            Component::StringVector(_) => ComponentKind::StringVector,
            Component::Vector(v) => match v.encoding() {
                VectorEncoding::Plain => ComponentKind::Vector,
                VectorEncoding::Compressed => ComponentKind::VectorComp,
                VectorEncoding::Delta => ComponentKind::VectorDelta,
            },
            Component::Set(_) => ComponentKind::Set,
            Component::Index(i) if i.is_compressed() => ComponentKind::IndexComp,
            Component::Index(_) => ComponentKind::Index,
            Component::InvertedIndex(_) => ComponentKind::InvertedIndex,
        }
    }

    component_accessor!(blob, Blob, &'a [u8], "blob");
    component_accessor!(string_list, StringList, StringList<'a>, "string list");
    component_accessor!(string_vector, StringVector, StringVector<'a>, "string vector");
    component_accessor!(vector, Vector, Vector<'a>, "vector");
    component_accessor!(set, Set, Set<'a>, "set");
    component_accessor!(index, Index, Index<'a>, "index");
    component_accessor!(inverted_index, InvertedIndex, InvertedIndex<'a>, "inverted index");
}

fn param(value: i64, what: &str) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| Error::InvalidParameter(format!("negative {} {}", what, value)))
}

/// decode interprets data, the bytes of entry, as a typed component. The
/// header revision selects the sync table layout of compressed indices.
pub fn decode<'a>(
    entry: &BomEntry,
    data: &'a [u8],
    revision: HeaderRevision,
) -> Result<Component<'a>> {
    let kind = ComponentKind::from_codes(entry.family, entry.ctype, entry.mode)?;
    let n = param(entry.param1, "param1")?;
    let p = param(entry.param2, "param2")?;

    let c = match kind {
        ComponentKind::Blob => Component::Blob(data),
        ComponentKind::StringList => Component::StringList(StringList::decode(data, n)?),
        ComponentKind::StringVector => Component::StringVector(StringVector::decode(data, n)?),
        ComponentKind::Vector => {
            Component::Vector(Vector::decode(data, n, p, VectorEncoding::Plain)?)
        }
        ComponentKind::VectorComp => {
            Component::Vector(Vector::decode(data, n, p, VectorEncoding::Compressed)?)
        }
        ComponentKind::VectorDelta => {
            Component::Vector(Vector::decode(data, n, p, VectorEncoding::Delta)?)
        }
        ComponentKind::Set => Component::Set(Set::decode(data, n, p)?),
        ComponentKind::Index => Component::Index(Index::decode_plain(data, n)?),
        ComponentKind::IndexComp => {
            if p != 2 {
                return Err(Error::InvalidParameter(format!(
                    "compressed index with param2 {}",
                    p
                )));
            }
            Component::Index(Index::decode_compressed(
                data,
                n,
                IndexLayout::for_revision(revision),
            )?)
        }
        ComponentKind::InvertedIndex => Component::InvertedIndex(InvertedIndex::decode(data, n)?),
    };
    Ok(c)
}

/// ComponentData is the owned content of a component to be encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentData {
    Blob(Vec<u8>),
    StringList(Vec<String>),
    StringVector(Vec<String>),
    /// Rows of `width` values stored row by row.
    Vector {
        encoding: VectorEncoding,
        width: usize,
        values: Vec<i64>,
    },
    /// One set per row, each a flattened list of `width` sized tuples.
    Set { width: usize, items: Vec<Vec<i64>> },
    Index {
        compressed: bool,
        pairs: Vec<(i64, i64)>,
    },
    /// One ascending posting list per type.
    InvertedIndex(Vec<Vec<i64>>),
}

/// EncodedComponent is the payload of a component and the parameters of its directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedComponent {
    pub kind: ComponentKind,
    pub param1: i64,
    pub param2: i64,
    pub bytes: Vec<u8>,
}

impl ComponentData {
    /// delta_vector is a single column delta coded vector, the usual layout of position streams.
    pub fn delta_vector(values: Vec<i64>) -> Self {
        ComponentData::Vector {
            encoding: VectorEncoding::Delta,
            width: 1,
            values,
        }
    }

    /// string_hash_index indexes strings by their fnv hash, as used by
    /// [`StringVector::find_hashed`].
    pub fn string_hash_index<S: AsRef<str>>(strings: &[S], compressed: bool) -> Self {
        ComponentData::Index {
            compressed,
            pairs: string_vector::string_hash_pairs(strings),
        }
    }

    pub fn kind(&self) -> ComponentKind {
        match self {
            ComponentData::Blob(_) => ComponentKind::Blob,
            ComponentData::StringList(_) => ComponentKind::StringList,
            ComponentData::StringVector(_) => ComponentKind::StringVector,
            ComponentData::Vector { encoding, .. } => match encoding {
                VectorEncoding::Plain => ComponentKind::Vector,
                VectorEncoding::Compressed => ComponentKind::VectorComp,
                VectorEncoding::Delta => ComponentKind::VectorDelta,
            },
            ComponentData::Set { .. } => ComponentKind::Set,
            ComponentData::Index { compressed: true, .. } => ComponentKind::IndexComp,
            ComponentData::Index { .. } => ComponentKind::Index,
            ComponentData::InvertedIndex(_) => ComponentKind::InvertedIndex,
        }
    }

    /// encode produces the component payload for a container of the given header revision.
    pub fn encode(&self, revision: HeaderRevision) -> Result<EncodedComponent> {
        let mut bytes: Vec<u8> = vec![];
        let (param1, param2) = match self {
            ComponentData::Blob(b) => {
                bytes.extend_from_slice(b);
                (0, 0)
            }
            ComponentData::StringList(strings) => {
                string_list::encode_string_list(&mut bytes, strings)?;
                (strings.len(), 0)
            }
            ComponentData::StringVector(strings) => {
                string_vector::encode_string_vector(&mut bytes, strings)?;
                (strings.len(), 0)
            }
            ComponentData::Vector {
                encoding,
                width,
                values,
            } => {
                vector::encode_vector(&mut bytes, values, *width, *encoding)?;
                (values.len() / width, *width)
            }
            ComponentData::Set { width, items } => {
                set::encode_set(&mut bytes, items, *width)?;
                (items.len(), *width)
            }
            ComponentData::Index { compressed, pairs } => {
                let mut pairs = pairs.clone();
                if *compressed {
                    index::encode_index_compressed(
                        &mut bytes,
                        &mut pairs,
                        IndexLayout::for_revision(revision),
                    );
                    (pairs.len(), 2)
                } else {
                    index::encode_index(&mut bytes, &mut pairs);
                    (pairs.len(), 0)
                }
            }
            ComponentData::InvertedIndex(postings) => {
                inverted_index::encode_inverted_index(&mut bytes, postings)?;
                (postings.len(), 0)
            }
        };

        Ok(EncodedComponent {
            kind: self.kind(),
            param1: param1 as i64,
            param2: param2 as i64,
            bytes,
        })
    }
}
