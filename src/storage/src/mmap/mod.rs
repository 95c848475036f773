use std::io::ErrorKind;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::{io, ptr};

use memmap2::{Mmap, MmapOptions};
use tokio::fs::File;

use crate::RandomAccessFile;

/// MmapReadableFile maps a whole file read-only. The mapping lives exactly
/// as long as the value; dropping it unmaps the file.
#[derive(Debug)]
pub struct MmapReadableFile {
    path: PathBuf,
    len: usize,
    mmap: Mmap,
}

impl MmapReadableFile {
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let f = File::open(&path).await?;

        let meta = f.metadata().await?;
        let len = meta.len() as usize;
        if len == 0 {
            return Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                format!("cannot map empty file {}", path.display()),
            ));
        }

        let mmap = unsafe { MmapOptions::new().offset(0).len(len).map(&f)? };

        Ok(Self { path, len, mmap })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap[..]
    }
}

impl Deref for MmapReadableFile {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_bytes()
    }
}

impl AsRef<[u8]> for MmapReadableFile {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

#[async_trait]
impl RandomAccessFile for MmapReadableFile {
    async fn read(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let size = buf.len();
        if size == 0 {
            return Ok(0);
        }

        let offset = offset as usize;
        let upper = offset + size;
        if upper > self.len {
            return Err(io::Error::new(ErrorKind::UnexpectedEof, ""));
        }

        let data = &self.mmap[offset..upper];
        unsafe {
            ptr::copy(data.as_ptr(), buf.as_mut_ptr(), size);
        }

        Ok(size)
    }

    fn len(&self) -> u64 {
        self.len as u64
    }
}

#[cfg(test)]
mod tests {
    use tokio::fs::File;
    use tokio::io;
    use tokio::io::AsyncWriteExt;

    use crate::mmap::MmapReadableFile;
    use crate::RandomAccessFile;

    #[tokio::test]
    async fn test_mmap_readable_file() -> io::Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.as_ref().join("mmap_test");

        let data = "0123456789".as_bytes();
        let len = {
            let mut f = File::create(&path).await?;
            let len = f.write(data).await?;
            f.sync_all().await?;
            drop(f);
            len
        };

        let accessor = MmapReadableFile::open(&path).await?;
        assert_eq!(accessor.len(), len as u64);
        assert_eq!(accessor.as_bytes(), data);

        let mut buf = Vec::with_capacity(4);
        buf.resize(4, 0_u8);

        accessor.read(3, &mut buf[..]).await?;
        assert_eq!(buf.as_slice(), "3456".as_bytes());

        let mut last = [0_u8; 1];
        assert_eq!(accessor.read(9, &mut last).await?, 1);
        assert_eq!(&last, b"9");
        assert!(accessor.read(8, &mut buf[..]).await.is_err());

        Ok(())
    }

    #[tokio::test]
    async fn test_mmap_empty_file() -> io::Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.as_ref().join("empty");
        File::create(&path).await?.sync_all().await?;

        assert!(MmapReadableFile::open(&path).await.is_err());
        Ok(())
    }
}
