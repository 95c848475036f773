#[macro_use]
extern crate async_trait;

use std::io;

pub mod file;
pub mod mmap;

pub use file::writable_file::WritableFile;
pub use mmap::MmapReadableFile;

/// RandomAccessFile reads byte ranges at absolute offsets without a cursor.
#[async_trait]
pub trait RandomAccessFile: Send + Sync {
    async fn read(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// len returns the size of the file in bytes.
    fn len(&self) -> u64;
}

/// Writable is an append-only sink for freshly created files.
#[async_trait]
pub trait Writable: Send {
    async fn append(&mut self, data: &[u8]) -> io::Result<usize>;
    async fn flush(&mut self) -> io::Result<()>;
    async fn sync(&self) -> io::Result<()>;
}
