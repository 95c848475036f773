use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;
use ziggurat_storage::{MmapReadableFile, RandomAccessFile};

use crate::container::{Container, ContainerFile, OpenOptions};
use crate::format::MAGIC;

/// StoreConfig selects which files of a directory form a datastore and how
/// strictly they are checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// File extensions of container files, without the dot.
    pub extensions: Vec<String>,
    /// Fail on foreign files and unresolved lineage instead of logging them.
    pub strict: bool,
    pub open: OpenOptions,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["zigv".to_string(), "zigl".to_string()],
            strict: false,
            open: OpenOptions::default(),
        }
    }
}

/// UnresolvedBase is a lineage reference with no container in the datastore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnresolvedBase {
    pub container: Uuid,
    pub slot: usize,
    pub base: Uuid,
}

/// Datastore is a directory of immutable containers indexed by uuid and file stem.
pub struct Datastore {
    dir: PathBuf,
    containers: Vec<ContainerFile>,
    by_uuid: HashMap<Uuid, usize>,
    by_name: HashMap<String, usize>,
}

impl Datastore {
    /// open loads every container file of dir.
    pub async fn open(dir: impl AsRef<Path>, config: &StoreConfig) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();

        let mut paths = vec![];
        let mut rd = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("failed to read datastore {}", dir.display()))?;
        while let Some(entry) = rd.next_entry().await? {
            let path = entry.path();
            let matches = path
                .extension()
                .and_then(|e| e.to_str())
                .map_or(false, |e| config.extensions.iter().any(|x| x == e));
            if matches && entry.file_type().await?.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let mut store = Self {
            dir,
            containers: Vec::with_capacity(paths.len()),
            by_uuid: HashMap::with_capacity(paths.len()),
            by_name: HashMap::with_capacity(paths.len()),
        };

        for path in paths {
            match Self::load(&path, &config.open).await {
                Ok(c) => store.insert(path, c, config.strict)?,
                Err(e) if config.strict => return Err(e),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping file"),
            }
        }

        let unresolved = store.unresolved_bases();
        if !unresolved.is_empty() {
            if config.strict {
                store.check_lineage()?;
            }
            for u in &unresolved {
                warn!(
                    container = %u.container,
                    slot = u.slot,
                    base = %u.base,
                    "Unresolved base layer"
                );
            }
        }

        debug!(
            dir = %store.dir.display(),
            containers = store.containers.len(),
            "Opened datastore"
        );
        Ok(store)
    }

    async fn load(path: &Path, options: &OpenOptions) -> anyhow::Result<ContainerFile> {
        let f = MmapReadableFile::open(path)
            .await
            .with_context(|| format!("failed to map {}", path.display()))?;

        let mut magic = [0u8; 8];
        if f.len() < magic.len() as u64 || f.read(0, &mut magic).await? != magic.len() {
            bail!("{} is too short for a container", path.display());
        }
        if &magic != MAGIC {
            bail!("{} is not a container file", path.display());
        }

        let c = Container::open_with(f, options)
            .with_context(|| format!("failed to open container {}", path.display()))?;
        Ok(c)
    }

    fn insert(&mut self, path: PathBuf, c: ContainerFile, strict: bool) -> anyhow::Result<()> {
        let uuid = c.header().uuid;
        if let Some(i) = self.by_uuid.get(&uuid) {
            let msg = format!(
                "{} repeats uuid {} of {}",
                path.display(),
                uuid,
                self.containers[*i].path().display()
            );
            if strict {
                return Err(anyhow!(msg));
            }
            warn!("{}", msg);
            return Ok(());
        }

        let i = self.containers.len();
        if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
            self.by_name.insert(name.to_string(), i);
        }
        self.by_uuid.insert(uuid, i);
        self.containers.push(c);
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContainerFile> {
        self.containers.iter()
    }

    pub fn get(&self, uuid: &Uuid) -> Option<&ContainerFile> {
        self.by_uuid.get(uuid).map(|i| &self.containers[*i])
    }

    /// get_by_name returns the container loaded from the file with the given stem.
    pub fn get_by_name(&self, name: &str) -> Option<&ContainerFile> {
        self.by_name.get(name).map(|i| &self.containers[*i])
    }

    /// base resolves lineage slot 0 or 1 of c. A container without a base in
    /// that slot yields None; a base missing from the datastore is an error.
    pub fn base<B: AsRef<[u8]>>(
        &self,
        c: &Container<B>,
        slot: usize,
    ) -> anyhow::Result<Option<&ContainerFile>> {
        let bases = c.header().bases();
        let base = bases
            .get(slot)
            .ok_or_else(|| anyhow!("invalid lineage slot {}", slot))?;
        match base {
            None => Ok(None),
            Some(uuid) => self.get(uuid).map(Some).ok_or_else(|| {
                anyhow!(
                    "base layer {} of container {} is not in the datastore",
                    uuid,
                    c.header().uuid
                )
            }),
        }
    }

    /// unresolved_bases lists every lineage reference that does not resolve.
    pub fn unresolved_bases(&self) -> Vec<UnresolvedBase> {
        let mut unresolved = vec![];
        for c in &self.containers {
            for (slot, base) in c.header().bases().iter().enumerate() {
                if let Some(base) = base {
                    if !self.by_uuid.contains_key(base) {
                        unresolved.push(UnresolvedBase {
                            container: c.header().uuid,
                            slot,
                            base: *base,
                        });
                    }
                }
            }
        }
        unresolved
    }

    /// check_lineage fails if any lineage reference does not resolve.
    pub fn check_lineage(&self) -> anyhow::Result<()> {
        let unresolved = self.unresolved_bases();
        if let Some(u) = unresolved.first() {
            bail!(
                "{} unresolved base layers, first: {} of container {} (slot {})",
                unresolved.len(),
                u.base,
                u.container,
                u.slot
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use uuid::Uuid;

    use crate::builder::ContainerBuilder;
    use crate::component::ComponentData;
    use crate::format::{ContainerHeader, ContainerType, HeaderRevision};
    use crate::store::{Datastore, StoreConfig};

    async fn write(
        dir: &Path,
        file: &str,
        t: ContainerType,
        uuid: Uuid,
        base: Option<Uuid>,
    ) -> anyhow::Result<()> {
        let mut h = ContainerHeader::new(t, uuid);
        h.revision = HeaderRevision::Extended;
        h.base1_uuid = base;
        ContainerBuilder::new(h)
            .add("Partition", ComponentData::delta_vector(vec![0, 5, 9]))?
            .write_to_path(dir.join(file))
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_lineage() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let primary = Uuid::new_v4();
        let word = Uuid::new_v4();
        write(dir.path(), "primary.zigl", ContainerType::PrimaryLayer, primary, None).await?;
        write(
            dir.path(),
            "word.zigv",
            ContainerType::PlainStringVariable,
            word,
            Some(primary),
        )
        .await?;
        tokio::fs::write(dir.path().join("notes.txt"), b"not a container").await?;

        let store = Datastore::open(dir.path(), &StoreConfig::default()).await?;
        assert_eq!(store.len(), 2);
        store.check_lineage()?;

        let w = store.get_by_name("word").unwrap();
        assert_eq!(w.header().uuid, word);
        let base = store.base(w, 0)?.unwrap();
        assert_eq!(base.header().uuid, primary);
        assert!(store.base(w, 1)?.is_none());
        assert!(store.base(w, 2).is_err());
        assert!(store.base(base, 0)?.is_none());
        assert_eq!(store.get(&primary).unwrap().header().uuid, primary);
        Ok(())
    }

    #[tokio::test]
    async fn test_unresolved_lineage() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let missing = Uuid::new_v4();
        let orphan = Uuid::new_v4();
        write(
            dir.path(),
            "orphan.zigv",
            ContainerType::IntegerVariable,
            orphan,
            Some(missing),
        )
        .await?;

        let store = Datastore::open(dir.path(), &StoreConfig::default()).await?;
        let unresolved = store.unresolved_bases();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].base, missing);
        assert_eq!(unresolved[0].container, orphan);
        assert!(store.check_lineage().is_err());
        let c = store.get(&orphan).unwrap();
        assert!(store.base(c, 0).is_err());

        let strict = StoreConfig {
            strict: true,
            ..StoreConfig::default()
        };
        assert!(Datastore::open(dir.path(), &strict).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_foreign_files() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        write(
            dir.path(),
            "ok.zigl",
            ContainerType::PrimaryLayer,
            Uuid::new_v4(),
            None,
        )
        .await?;
        tokio::fs::write(dir.path().join("bad.zigv"), b"Zigguraf and then some").await?;
        tokio::fs::write(dir.path().join("tiny.zigv"), b"Zig").await?;

        let store = Datastore::open(dir.path(), &StoreConfig::default()).await?;
        assert_eq!(store.len(), 1);
        assert!(store.get_by_name("ok").is_some());
        assert!(store.get_by_name("bad").is_none());

        let strict = StoreConfig {
            strict: true,
            ..StoreConfig::default()
        };
        assert!(Datastore::open(dir.path(), &strict).await.is_err());
        Ok(())
    }
}
