pub mod bom;
pub mod header;

pub use bom::{BomEntry, Directory, BOM_ENTRY_SIZE, NAME_LEN};
pub use header::{ContainerHeader, ContainerType, HeaderRevision};

/// MAGIC opens every container file.
pub const MAGIC: &[u8; 8] = b"Ziggurat";

/// VERSION is the only supported format version.
pub const VERSION: &[u8; 3] = b"1.0";

/// HEADER_SIZE is the size of the fixed header for both revisions.
pub const HEADER_SIZE: usize = 160;

/// ALIGNMENT of component payloads within the file.
pub const ALIGNMENT: usize = 8;

pub(crate) fn align(offset: usize) -> usize {
    offset.div_ceil(ALIGNMENT) * ALIGNMENT
}
