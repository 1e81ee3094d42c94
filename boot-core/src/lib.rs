//! Update logic of the slotboot second-stage bootloader.
//!
//! Picks a staged image from the card, rewrites the application region of
//! program memory with it and hands control to the result. Everything here is
//! generic over [`ImageStore`] and `NorFlash`, so it runs unchanged on the
//! board and against the in-memory fakes of the unit tests.
#![no_std]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod bootloader;
pub mod config;
pub mod error;
pub mod launch;
pub mod programmer;
pub mod selector;
pub mod self_test;
pub mod store;
pub mod transfer;

#[cfg(test)]
mod testing;

pub use bootloader::{BootState, Bootloader, Terminal, UpdateReport, launch_resident};
pub use config::{Slot, SlotFiles, UpdateConfig};
pub use error::{
    EraseError, Fault, FlashOpError, LayoutError, StorageErrorKind, StoreError, TransferError,
    WriteError,
};
pub use launch::{BootTarget, Handoff, conclude};
pub use programmer::{FlashProgrammer, ProgramRegion};
pub use selector::{Selection, select_slot};
pub use store::{ImageFile, ImageStore};
pub use transfer::{TransferCursor, transfer_image};
