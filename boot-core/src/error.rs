use embedded_storage_async::nor_flash::NorFlashErrorKind;

/// Coarse classification of a removable-storage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageErrorKind {
    NotFound,
    // The card or its bus failed
    Device,
    // Anything the filesystem layer rejected
    Filesystem,
    Timeout,
}

/// Implemented by the error type of an [`ImageStore`](crate::ImageStore).
pub trait StoreError: core::fmt::Debug {
    fn kind(&self) -> StorageErrorKind;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashOpError {
    NotAligned,
    OutOfBounds,
    Timeout,
    Other,
}

impl From<NorFlashErrorKind> for FlashOpError {
    fn from(kind: NorFlashErrorKind) -> Self {
        match kind {
            NorFlashErrorKind::NotAligned => FlashOpError::NotAligned,
            NorFlashErrorKind::OutOfBounds => FlashOpError::OutOfBounds,
            _ => FlashOpError::Other,
        }
    }
}

/// The program region does not fit the flash it is supposed to live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LayoutError {
    EmptyRegion,
    UnalignedStart { start: u32, row_size: u32 },
    OutOfCapacity { end: u32, capacity: u32 },
    PageSize { page_size: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EraseError {
    Exhausted { attempts: u8 },
}

// Offsets are relative to the start of the program region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WriteError {
    OutOfRegion { offset: u32, len: u32 },
    Flash { offset: u32, error: FlashOpError },
    Mismatch { offset: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferError {
    Open(StorageErrorKind),
    Read { offset: u32, kind: StorageErrorKind },
    UnexpectedEof { offset: u32 },
    Write(WriteError),
}

impl From<WriteError> for TransferError {
    fn from(error: WriteError) -> Self {
        TransferError::Write(error)
    }
}

/// Anything that ends the boot in a device restart instead of a launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fault {
    Layout(LayoutError),
    SelfTest(StorageErrorKind),
    Erase(EraseError),
    Transfer(TransferError),
    BootTarget(FlashOpError),
    NoApplication,
}

impl From<LayoutError> for Fault {
    fn from(error: LayoutError) -> Self {
        Fault::Layout(error)
    }
}

impl From<EraseError> for Fault {
    fn from(error: EraseError) -> Self {
        Fault::Erase(error)
    }
}

impl From<TransferError> for Fault {
    fn from(error: TransferError) -> Self {
        Fault::Transfer(error)
    }
}
