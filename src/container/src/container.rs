use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use ziggurat_storage::MmapReadableFile;

use crate::component::{self, Component};
use crate::error::{Error, Result};
use crate::format::{BomEntry, ContainerHeader, Directory};

/// OpenOptions controls how strictly a container is validated when opened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenOptions {
    /// Fail open on any corrupt directory entry instead of reporting it on lookup.
    pub strict: bool,
}

/// Container is an opened container file over any byte buffer.
///
/// Views handed out by the container borrow its buffer, so a container over
/// a memory map keeps the map alive for as long as any view exists.
#[derive(Debug)]
pub struct Container<B: AsRef<[u8]>> {
    buf: B,
    header: ContainerHeader,
    directory: Directory,
}

/// ContainerFile is a container backed by a read-only memory map.
pub type ContainerFile = Container<MmapReadableFile>;

impl<B: AsRef<[u8]>> Container<B> {
    /// open parses the header and directory of buf with default options.
    pub fn open(buf: B) -> Result<Self> {
        Self::open_with(buf, &OpenOptions::default())
    }

    pub fn open_with(buf: B, options: &OpenOptions) -> Result<Self> {
        let bytes = buf.as_ref();
        let header = ContainerHeader::parse(bytes)?;
        let directory = Directory::parse(bytes, &header)?;

        for (entry, err) in directory.problems() {
            if options.strict {
                return Err(err.clone());
            }
            warn!(component = %entry.name, error = %err, "Corrupt directory entry");
        }

        debug!(
            uuid = %header.uuid,
            revision = ?header.revision,
            container_type = ?header.container_type,
            components = directory.len(),
            "Opened container"
        );

        Ok(Self {
            buf,
            header,
            directory,
        })
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_ref()
    }

    pub fn into_inner(self) -> B {
        self.buf
    }

    fn decode_entry(&self, entry: &BomEntry) -> Result<Component<'_>> {
        let bytes = self.as_bytes();
        let data = entry
            .extent()
            .and_then(|r| bytes.get(r))
            .ok_or_else(|| Error::corruption(&entry.name, "extent outside the file"))?;
        component::decode(entry, data, self.header.revision)
    }

    /// get_component returns the typed view of the component called name.
    pub fn get_component(&self, name: &str) -> Result<Component<'_>> {
        let entry = self.directory.lookup(name)?;
        self.decode_entry(entry)
    }

    /// components decodes every directory entry independently, in directory order.
    pub fn components(&self) -> impl Iterator<Item = (&BomEntry, Result<Component<'_>>)> {
        (0..self.directory.len()).map(move |i| {
            let entry = &self.directory.entries()[i];
            let c = self
                .directory
                .check(i)
                .and_then(|entry| self.decode_entry(entry));
            (entry, c)
        })
    }
}

impl ContainerFile {
    /// open_path maps the file at path and opens it with default options.
    pub async fn open_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Self::open_path_with(path, &OpenOptions::default()).await
    }

    pub async fn open_path_with(
        path: impl AsRef<Path>,
        options: &OpenOptions,
    ) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let f = MmapReadableFile::open(path)
            .await
            .with_context(|| format!("failed to map {}", path.display()))?;
        let c = Container::open_with(f, options)
            .with_context(|| format!("failed to open container {}", path.display()))?;
        Ok(c)
    }

    pub fn path(&self) -> &Path {
        self.buf.path()
    }
}
