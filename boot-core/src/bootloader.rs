use embassy_time::with_timeout;
use embedded_storage_async::nor_flash::NorFlash;

use crate::config::{Slot, UpdateConfig};
use crate::error::{Fault, LayoutError, StorageErrorKind, StoreError, TransferError};
use crate::launch::BootTarget;
use crate::programmer::{FlashProgrammer, ProgramRegion};
use crate::selector::{Selection, select_slot};
use crate::self_test::storage_self_test;
use crate::store::{ImageFile, ImageStore};
use crate::transfer::{TransferCursor, transfer_image};

/// Stages of one boot. `Launch` is where the pipeline ends when nothing went
/// wrong; a fault in any stage ends it in a restart instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootState {
    Init,
    ProbeSlot,
    NoUpdate,
    Erase(Selection),
    Transfer(Selection),
    CleanupMarker(Selection),
    Launch,
}

/// What an applied update did, kept for the exit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UpdateReport {
    pub slot: Slot,
    pub erase_attempts: u8,
    pub pages_written: u32,
    pub bytes_written: u32,
}

/// How the bootloader ends. Neither variant returns to the bootloader once
/// acted upon, see [`conclude`](crate::conclude).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Terminal {
    Launch {
        target: BootTarget,
        update: Option<UpdateReport>,
    },
    FatalRestart(Fault),
}

/// One update cycle over a card and the internal flash.
pub struct Bootloader<'a, S, F, const PAGE_SIZE: usize> {
    store: &'a mut S,
    programmer: FlashProgrammer<'a, F, PAGE_SIZE>,
    config: &'a UpdateConfig,
    report: Option<UpdateReport>,
}

impl<'a, S, F, const PAGE_SIZE: usize> Bootloader<'a, S, F, PAGE_SIZE>
where
    S: ImageStore,
    F: NorFlash,
{
    pub fn new(
        store: &'a mut S,
        flash: &'a mut F,
        region: ProgramRegion,
        config: &'a UpdateConfig,
    ) -> Result<Self, LayoutError> {
        Ok(Self {
            store,
            programmer: FlashProgrammer::new(flash, region, config)?,
            config,
            report: None,
        })
    }

    /// Drive the state machine until it reaches launch or a fault.
    pub async fn run(mut self) -> Terminal {
        let mut state = BootState::Init;

        while state != BootState::Launch {
            match self.step(state).await {
                Ok(next) => {
                    info!("Transitioning from {} to {}", state, next);
                    state = next;
                }
                Err(fault) => {
                    error!("{} failed: {}", state, fault);
                    return Terminal::FatalRestart(fault);
                }
            }
        }

        self.launch().await
    }

    async fn step(&mut self, state: BootState) -> Result<BootState, Fault> {
        let next = match state {
            BootState::Init => {
                if self.config.storage_self_test {
                    storage_self_test(self.store, self.config)
                        .await
                        .map_err(Fault::SelfTest)?;
                }
                BootState::ProbeSlot
            }
            BootState::ProbeSlot => {
                let capacity = self.programmer.region().len;
                match select_slot(self.store, self.config, capacity).await {
                    Some(selection) => BootState::Erase(selection),
                    None => BootState::NoUpdate,
                }
            }
            BootState::NoUpdate => BootState::Launch,
            BootState::Erase(selection) => {
                let attempts = self
                    .programmer
                    .erase_region(self.config.erase_attempts)
                    .await?;
                self.report = Some(UpdateReport {
                    slot: selection.slot,
                    erase_attempts: attempts,
                    pages_written: 0,
                    bytes_written: 0,
                });
                BootState::Transfer(selection)
            }
            BootState::Transfer(selection) => {
                let cursor = self.transfer(selection).await?;
                if let Some(report) = self.report.as_mut() {
                    report.pages_written = cursor.page;
                    report.bytes_written = cursor.consumed;
                }
                BootState::CleanupMarker(selection)
            }
            BootState::CleanupMarker(selection) => {
                self.remove_marker(selection.slot).await;
                BootState::Launch
            }
            BootState::Launch => BootState::Launch,
        };
        Ok(next)
    }

    async fn transfer(&mut self, selection: Selection) -> Result<TransferCursor, TransferError> {
        let name = self.config.files(selection.slot).image;
        let timeout = self.config.storage_timeout;

        let mut image = match with_timeout(timeout, self.store.open(name)).await {
            Ok(Ok(image)) => image,
            Ok(Err(e)) => return Err(TransferError::Open(e.kind())),
            Err(_) => return Err(TransferError::Open(StorageErrorKind::Timeout)),
        };
        let image_len = image.size();
        if image_len != selection.image_len {
            warn!(
                "{} changed size from {} to {} bytes since probing",
                name, selection.image_len, image_len
            );
        }

        transfer_image(&mut image, image_len, &mut self.programmer, timeout).await
    }

    // A marker that survives only causes the same image to be installed again
    async fn remove_marker(&mut self, slot: Slot) {
        let marker = self.config.files(slot).marker;
        match with_timeout(self.config.storage_timeout, self.store.remove(marker)).await {
            Ok(Ok(())) => info!("{} deleted", marker),
            Ok(Err(e)) => warn!("Could not delete {}: {}", marker, e.kind()),
            Err(_) => warn!("Deleting {} timed out", marker),
        }
    }

    async fn launch(mut self) -> Terminal {
        resolve_launch(&mut self.programmer, self.report).await
    }
}

/// Launch whatever is already in the program region without looking at the
/// card. Used when the card cannot be brought up, so a unit without one still
/// boots its resident application.
pub async fn launch_resident<F: NorFlash, const PAGE_SIZE: usize>(
    flash: &mut F,
    region: ProgramRegion,
    config: &UpdateConfig,
) -> Terminal {
    match FlashProgrammer::<F, PAGE_SIZE>::new(flash, region, config) {
        Ok(mut programmer) => resolve_launch(&mut programmer, None).await,
        Err(e) => {
            error!("Invalid flash layout: {}", e);
            Terminal::FatalRestart(Fault::Layout(e))
        }
    }
}

async fn resolve_launch<F: NorFlash, const PAGE_SIZE: usize>(
    programmer: &mut FlashProgrammer<'_, F, PAGE_SIZE>,
    update: Option<UpdateReport>,
) -> Terminal {
    match programmer.boot_target().await {
        Ok(target) if target.is_erased() => {
            error!("No application in program memory");
            Terminal::FatalRestart(Fault::NoApplication)
        }
        Ok(target) => Terminal::Launch { target, update },
        Err(e) => {
            error!("Reading the application vector table failed: {}", e);
            Terminal::FatalRestart(Fault::BootTarget(e))
        }
    }
}
