#![no_std]
#![no_main]

use core::cell::RefCell;

use boot_core::{
    Bootloader, Fault, StoreError, Terminal, UpdateConfig, conclude, launch_resident,
};
use config::{
    BOOTLOADER_VERSION_STR, FLASH_PAGE_SIZE, FLASH_SIZE, SD_INIT_FREQUENCY_HZ,
    SD_TRANSFER_FREQUENCY_HZ,
};
use defmt::{Debug2Format, error, info, warn};
use embassy_embedded_hal::shared_bus::blocking::spi::SpiDevice;
use embassy_executor::Spawner;
use embassy_rp::flash::Async;
use embassy_rp::gpio::{Level, Output};
use embassy_rp::spi::{self, Spi};
use embassy_sync::blocking_mutex::{Mutex, raw::NoopRawMutex};
use embassy_time::Delay;
use embedded_sdmmc::{SdCard, VolumeManager};
use {defmt_rtt as _, panic_probe as _};

mod config;
mod config_resources;
mod flash_layout;
mod handoff;
mod sd_store;

use crate::config_resources::{AssignedResources, FlashResources, SdCardResources};
use crate::handoff::RpHandoff;
use crate::sd_store::{FixedTime, SdStore};

pub type FlashType<'a> =
    embassy_rp::flash::Flash<'a, embassy_rp::peripherals::FLASH, Async, FLASH_SIZE>;

/// Bring up the card and the flash, then run one update cycle. Every driver
/// and handle is dropped before this returns. Without a usable card the
/// resident application is launched as if no update were pending.
async fn run_update(sd: SdCardResources, fl: FlashResources) -> Terminal {
    let config = UpdateConfig::default();
    let mut flash = FlashType::new(fl.flash, fl.dma);
    let region = flash_layout::app_program_region();
    info!(
        "Application region at {=u32:#x}, {} bytes",
        region.start, region.len
    );

    let mut spi_config = spi::Config::default();
    spi_config.frequency = SD_INIT_FREQUENCY_HZ;
    let spi = Spi::new_blocking(sd.spi, sd.clk, sd.mosi, sd.miso, spi_config);
    let spi_bus = Mutex::<NoopRawMutex, _>::new(RefCell::new(spi));
    let cs = Output::new(sd.cs, Level::High);
    let sdcard = SdCard::new(SpiDevice::new(&spi_bus, cs), Delay);

    info!("Initializing SD card...");
    match sdcard.num_bytes() {
        Ok(size) => info!("Card size is {} bytes", size),
        Err(e) => {
            warn!("SD card initialization failed: {:?}", Debug2Format(&e));
            return launch_resident::<_, FLASH_PAGE_SIZE>(&mut flash, region, &config).await;
        }
    }
    spi_bus.lock(|bus| bus.borrow_mut().set_frequency(SD_TRANSFER_FREQUENCY_HZ));

    let mut volume_mgr = VolumeManager::new(sdcard, FixedTime);
    let mut store = match SdStore::mount(&mut volume_mgr) {
        Ok(store) => store,
        Err(e) => {
            warn!(
                "Mounting the card failed ({}): {:?}",
                e.kind(),
                Debug2Format(&e)
            );
            return launch_resident::<_, FLASH_PAGE_SIZE>(&mut flash, region, &config).await;
        }
    };
    info!("SD card mounted");

    let bootloader =
        match Bootloader::<_, _, FLASH_PAGE_SIZE>::new(&mut store, &mut flash, region, &config) {
            Ok(bootloader) => bootloader,
            Err(e) => {
                error!("Invalid flash layout: {}", e);
                return Terminal::FatalRestart(Fault::Layout(e));
            }
        };

    bootloader.run().await
}

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    let p = embassy_rp::init(Default::default());
    let r = split_resources!(p);

    info!("slotboot {} starting up...", BOOTLOADER_VERSION_STR);

    let terminal = run_update(r.sd_card, r.flash).await;

    conclude(&mut RpHandoff, terminal)
}
