use thiserror::Error;

use crate::component::ComponentKind;

pub type Result<T> = std::result::Result<T, Error>;

/// Error is returned by every decode and encode operation of the format.
///
/// Header level variants abort opening a container. Component level
/// variants are reported for the affected component only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Bad magic, version or header shape.
    #[error("format mismatch: {0}")]
    FormatMismatch(String),

    /// A directory entry lies outside the file, overlaps another entry or
    /// repeats a name.
    #[error("directory corruption in entry {name:?}: {reason}")]
    DirectoryCorruption { name: String, reason: String },

    #[error("unsupported component variant: family={family:#04x} type={ctype:#04x} mode={mode:#04x}")]
    UnsupportedVariant { family: u8, ctype: u8, mode: u8 },

    #[error("truncated varint: input ended after {0} bytes")]
    TruncatedVarInt(usize),

    #[error("malformed varint: {0} bytes used for a shorter value")]
    MalformedVarInt(usize),

    /// The declared size of a component disagrees with its parameters.
    #[error("size mismatch in {what}: expected {expected} bytes, found {actual}")]
    SizeMismatch {
        what: &'static str,
        expected: u64,
        actual: u64,
    },

    #[error("component not found: {0}")]
    ComponentNotFound(String),

    /// A component was requested as a different kind than it is stored as.
    #[error("expected a {expected} component, found {found:?}")]
    UnexpectedKind {
        expected: &'static str,
        found: ComponentKind,
    },

    #[error("index {index} out of bounds for length {len}")]
    OutOfBounds { index: usize, len: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("invalid component name {0:?}")]
    InvalidName(String),

    #[error("invalid utf-8 in {0}")]
    InvalidUtf8(&'static str),
}

impl Error {
    pub(crate) fn corruption(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::DirectoryCorruption {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn size_mismatch(what: &'static str, expected: usize, actual: usize) -> Self {
        Error::SizeMismatch {
            what,
            expected: expected as u64,
            actual: actual as u64,
        }
    }
}
