use embassy_time::{Duration, with_timeout};

use crate::error::{StorageErrorKind, StoreError};

/// An open file on the removable store. Dropping it closes the handle.
#[allow(async_fn_in_trait)]
pub trait ImageFile {
    type Error: StoreError;

    /// Length of the file in bytes.
    fn size(&self) -> u32;

    /// Read into `buf` from the current position. Returns the number of bytes
    /// read, which is zero at end of file and may be less than `buf.len()`.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;
}

/// Byte-oriented named-file store at the root of the removable card.
#[allow(async_fn_in_trait)]
pub trait ImageStore {
    type Error: StoreError;
    type File<'s>: ImageFile<Error = Self::Error>
    where
        Self: 's;

    /// Open an existing file for reading.
    async fn open(&mut self, name: &str) -> Result<Self::File<'_>, Self::Error>;

    /// Create a file for writing, truncating it if it already exists.
    async fn create(&mut self, name: &str) -> Result<Self::File<'_>, Self::Error>;

    async fn remove(&mut self, name: &str) -> Result<(), Self::Error>;

    async fn exists(&mut self, name: &str) -> Result<bool, Self::Error> {
        match self.open(name).await {
            Ok(file) => {
                drop(file);
                Ok(true)
            }
            Err(e) if e.kind() == StorageErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

pub(crate) async fn read_bounded<F: ImageFile>(
    file: &mut F,
    buf: &mut [u8],
    timeout: Duration,
) -> Result<usize, StorageErrorKind> {
    match with_timeout(timeout, file.read(buf)).await {
        Ok(Ok(n)) => Ok(n),
        Ok(Err(e)) => Err(e.kind()),
        Err(_) => Err(StorageErrorKind::Timeout),
    }
}

pub(crate) async fn write_bounded<F: ImageFile>(
    file: &mut F,
    buf: &[u8],
    timeout: Duration,
) -> Result<usize, StorageErrorKind> {
    match with_timeout(timeout, file.write(buf)).await {
        Ok(Ok(n)) => Ok(n),
        Ok(Err(e)) => Err(e.kind()),
        Err(_) => Err(StorageErrorKind::Timeout),
    }
}
