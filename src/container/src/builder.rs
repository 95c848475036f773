use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use bytes::BufMut;
use tracing::debug;
use ziggurat_storage::{Writable, WritableFile};

use crate::component::{ComponentData, COMPONENT_FAMILY};
use crate::error::{Error, Result};
use crate::format::bom::validate_name;
use crate::format::{align, BomEntry, ContainerHeader, BOM_ENTRY_SIZE};

/// create serializes a complete container: header, directory and component
/// payloads. Counts, offsets, sizes and parameters in the header and
/// directory are computed from the components; the allocated slot count of
/// the header is kept if it is larger than the number of components.
pub fn create(
    mut header: ContainerHeader,
    components: Vec<(String, ComponentData)>,
) -> Result<Vec<u8>> {
    let used = u8::try_from(components.len()).map_err(|_| {
        Error::InvalidParameter(format!("{} components exceed 255", components.len()))
    })?;

    let mut names = HashSet::with_capacity(components.len());
    for (name, _) in &components {
        validate_name(name)?;
        if !names.insert(name.as_str()) {
            return Err(Error::InvalidName(name.clone()));
        }
    }

    header.used_components = used;
    header.allocated_components = header.allocated_components.max(used);

    let bom_offset = header.revision.bom_offset();
    let data_start =
        align(bom_offset + header.allocated_components as usize * BOM_ENTRY_SIZE);

    let mut entries = Vec::with_capacity(components.len());
    let mut payloads = Vec::with_capacity(components.len());
    let mut offset = data_start;
    for (name, data) in &components {
        let enc = data.encode(header.revision)?;
        let (ctype, mode) = enc.kind.codes();
        entries.push(BomEntry {
            family: COMPONENT_FAMILY,
            ctype,
            mode,
            name: name.clone(),
            offset: offset as i64,
            size: enc.bytes.len() as i64,
            param1: enc.param1,
            param2: enc.param2,
        });
        offset = align(offset + enc.bytes.len());
        payloads.push(enc.bytes);
    }

    let mut buf: Vec<u8> = Vec::with_capacity(offset);
    header.encode(&mut buf)?;
    buf.put_bytes(0, bom_offset - buf.len());
    for e in &entries {
        e.encode(&mut buf)?;
    }
    buf.put_bytes(0, data_start - buf.len());

    for (e, bytes) in entries.iter().zip(payloads.iter()) {
        buf.put_bytes(0, e.offset as usize - buf.len());
        buf.put_slice(bytes);
    }

    debug!(
        uuid = %header.uuid,
        components = entries.len(),
        size = buf.len(),
        "Created container"
    );
    Ok(buf)
}

/// ContainerBuilder collects named components for [`create`].
#[derive(Debug, Clone)]
pub struct ContainerBuilder {
    header: ContainerHeader,
    components: Vec<(String, ComponentData)>,
}

impl ContainerBuilder {
    pub fn new(header: ContainerHeader) -> Self {
        Self {
            header,
            components: vec![],
        }
    }

    /// allocate reserves directory slots beyond the components added.
    pub fn allocate(mut self, slots: u8) -> Self {
        self.header.allocated_components = slots;
        self
    }

    /// add appends a component, rejecting invalid or repeated names.
    pub fn add(mut self, name: &str, data: ComponentData) -> Result<Self> {
        validate_name(name)?;
        if self.components.iter().any(|(n, _)| n == name) {
            return Err(Error::InvalidName(name.to_string()));
        }
        self.components.push((name.to_string(), data));
        Ok(self)
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    pub fn build(self) -> Result<Vec<u8>> {
        create(self.header, self.components)
    }

    /// write_to_path builds the container into a new file at path and returns its size.
    pub async fn write_to_path(self, path: impl AsRef<Path>) -> anyhow::Result<u64> {
        let path = path.as_ref();
        let bytes = self.build()?;

        let mut f = WritableFile::create(path)
            .await
            .with_context(|| format!("failed to create {}", path.display()))?;
        f.append(&bytes).await?;
        f.flush().await?;
        f.sync().await?;

        debug!(path = %path.display(), size = f.written(), "Wrote container");
        Ok(f.written())
    }
}
