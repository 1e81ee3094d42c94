pub const FLASH_SIZE: usize = 2 * 1024 * 1024;

// XIP address at which flash offset 0 is visible to the core
pub const FLASH_BASE: u32 = 0x1000_0000;

// Program unit used when copying an image into flash. Must divide the 4 KiB
// erase sector of the QSPI flash.
pub const FLASH_PAGE_SIZE: usize = 256;

// The card is identified at 400 kHz and then clocked up for the transfer
pub const SD_INIT_FREQUENCY_HZ: u32 = 400_000; // Hz
pub const SD_TRANSFER_FREQUENCY_HZ: u32 = 16_000_000; // Hz

// Time given to the RTT log to drain before the application takes over
pub const EXIT_LOG_DELAY_MS: u64 = 100; // ms

// How long to wait after a fatal error before resetting the device
pub const RESTART_DELAY_MS: u64 = 5_000; // ms

pub const BOOTLOADER_VERSION_STR: &str = "0.1.0";
