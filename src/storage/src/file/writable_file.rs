use std::path::Path;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::Writable;

/// WritableFile is a newly created file that only grows at its end.
/// Creating over an existing path fails.
pub struct WritableFile {
    f: File,
    written: u64,
}

impl WritableFile {
    pub async fn create(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let f = OpenOptions::new()
            .create_new(true)
            .write(true)
            .append(true)
            .open(path)
            .await?;

        Ok(Self { f, written: 0 })
    }

    /// written returns the number of bytes appended so far.
    pub fn written(&self) -> u64 {
        self.written
    }
}

#[async_trait]
impl Writable for WritableFile {
    async fn append(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.f.write_all(data).await?;
        self.written += data.len() as u64;
        Ok(data.len())
    }

    async fn flush(&mut self) -> std::io::Result<()> {
        self.f.flush().await
    }

    async fn sync(&self) -> std::io::Result<()> {
        self.f.sync_all().await
    }
}
