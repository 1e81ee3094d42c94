// embedded-sdmmc backed file store for the card root directory

use core::fmt::Debug;

use boot_core::{ImageFile, ImageStore, StorageErrorKind, StoreError};
use defmt::{Debug2Format, warn};
use embedded_sdmmc::{
    BlockDevice, Mode, RawDirectory, RawFile, RawVolume, TimeSource, Timestamp, VolumeIdx,
    VolumeManager,
};

/// Wraps the embedded-sdmmc error so it can be classified for the update
/// logic.
#[derive(Debug)]
pub struct SdError<E: Debug>(pub embedded_sdmmc::Error<E>);

impl<E: Debug> From<embedded_sdmmc::Error<E>> for SdError<E> {
    fn from(error: embedded_sdmmc::Error<E>) -> Self {
        SdError(error)
    }
}

impl<E: Debug> StoreError for SdError<E> {
    fn kind(&self) -> StorageErrorKind {
        match self.0 {
            embedded_sdmmc::Error::NotFound => StorageErrorKind::NotFound,
            embedded_sdmmc::Error::DeviceError(_) => StorageErrorKind::Device,
            _ => StorageErrorKind::Filesystem,
        }
    }
}

/// The board has no RTC, files written by the bootloader are dated to the
/// FAT epoch.
pub struct FixedTime;

impl TimeSource for FixedTime {
    fn get_timestamp(&self) -> Timestamp {
        Timestamp {
            year_since_1970: 10,
            zero_indexed_month: 0,
            zero_indexed_day: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }
}

/// Root directory of the first volume on the card. The directory and the
/// volume are closed again when the store is dropped.
///
/// The store holds the volume manager exclusively; an open [`SdFile`]
/// reborrows it from the store, so at most one file is open at a time.
pub struct SdStore<'v, D: BlockDevice, T: TimeSource> {
    volume_mgr: &'v mut VolumeManager<D, T>,
    volume: RawVolume,
    root: RawDirectory,
}

impl<'v, D: BlockDevice, T: TimeSource> SdStore<'v, D, T> {
    pub fn mount(volume_mgr: &'v mut VolumeManager<D, T>) -> Result<Self, SdError<D::Error>> {
        let volume = volume_mgr.open_raw_volume(VolumeIdx(0))?;
        let root = match volume_mgr.open_root_dir(volume) {
            Ok(root) => root,
            Err(e) => {
                if let Err(close) = volume_mgr.close_volume(volume) {
                    warn!("Closing volume failed: {:?}", Debug2Format(&close));
                }
                return Err(e.into());
            }
        };
        Ok(Self {
            volume_mgr,
            volume,
            root,
        })
    }

    fn open_file(
        &mut self,
        name: &str,
        mode: Mode,
    ) -> Result<SdFile<'_, D, T>, SdError<D::Error>> {
        let file = self.volume_mgr.open_file_in_dir(self.root, name, mode)?;
        // Wrap first so the handle is closed if the length lookup fails
        let mut handle = SdFile {
            volume_mgr: &mut *self.volume_mgr,
            file,
            len: 0,
        };
        handle.len = handle.volume_mgr.file_length(file)?;
        Ok(handle)
    }
}

impl<D: BlockDevice, T: TimeSource> Drop for SdStore<'_, D, T> {
    fn drop(&mut self) {
        if let Err(e) = self.volume_mgr.close_dir(self.root) {
            warn!("Closing root directory failed: {:?}", Debug2Format(&e));
        }
        if let Err(e) = self.volume_mgr.close_volume(self.volume) {
            warn!("Closing volume failed: {:?}", Debug2Format(&e));
        }
    }
}

pub struct SdFile<'s, D: BlockDevice, T: TimeSource> {
    volume_mgr: &'s mut VolumeManager<D, T>,
    file: RawFile,
    len: u32,
}

impl<D: BlockDevice, T: TimeSource> Drop for SdFile<'_, D, T> {
    fn drop(&mut self) {
        if let Err(e) = self.volume_mgr.close_file(self.file) {
            warn!("Closing file failed: {:?}", Debug2Format(&e));
        }
    }
}

impl<D: BlockDevice, T: TimeSource> ImageFile for SdFile<'_, D, T> {
    type Error = SdError<D::Error>;

    fn size(&self) -> u32 {
        self.len
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        Ok(self.volume_mgr.read(self.file, buf)?)
    }

    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.volume_mgr.write(self.file, buf)?;
        Ok(buf.len())
    }
}

impl<'v, D: BlockDevice, T: TimeSource> ImageStore for SdStore<'v, D, T> {
    type Error = SdError<D::Error>;
    type File<'s>
        = SdFile<'s, D, T>
    where
        Self: 's;

    async fn open(&mut self, name: &str) -> Result<Self::File<'_>, Self::Error> {
        self.open_file(name, Mode::ReadOnly)
    }

    async fn create(&mut self, name: &str) -> Result<Self::File<'_>, Self::Error> {
        self.open_file(name, Mode::ReadWriteCreateOrTruncate)
    }

    async fn remove(&mut self, name: &str) -> Result<(), Self::Error> {
        Ok(self.volume_mgr.delete_file_in_dir(self.root, name)?)
    }
}
