use embassy_time::Duration;

/// Value every byte of program memory reads as after an erase.
pub const ERASED_BYTE: u8 = 0xFF;

// Marker and image file names at the root of the card
pub const SLOT_A_MARKER: &str = "FlagA";
pub const SLOT_A_IMAGE: &str = "TestA.bin";
pub const SLOT_B_MARKER: &str = "FlagB";
pub const SLOT_B_IMAGE: &str = "TestB.bin";

// Files rewritten on every boot to prove the card accepts writes
pub const SELF_TEST_TEXT_FILE: &str = "SDTEST.TXT";
pub const SELF_TEST_BINARY_FILE: &str = "SDTEST.BIN";

// Number of erase-then-verify cycles before the update is abandoned
pub const DEFAULT_ERASE_ATTEMPTS: u8 = 3;

// Upper bound for a single row erase, page write or flash read. A 4 KiB sector
// erase on the RP2040's QSPI flash takes 400 ms worst case.
pub const DEFAULT_FLASH_TIMEOUT_MS: u64 = 1_000;

// Upper bound for a single open, read or write on the card
pub const DEFAULT_STORAGE_TIMEOUT_MS: u64 = 2_000;

/// One of the two staged firmware images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Slot {
    A,
    B,
}

impl Slot {
    /// Probe order. The first slot with a marker wins.
    pub const PRIORITY: [Slot; 2] = [Slot::A, Slot::B];
}

/// File names belonging to one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotFiles {
    pub marker: &'static str,
    pub image: &'static str,
}

/// Tunables for one update cycle.
#[derive(Debug, Clone)]
pub struct UpdateConfig {
    pub slot_a: SlotFiles,
    pub slot_b: SlotFiles,
    pub erase_attempts: u8,
    pub flash_timeout: Duration,
    pub storage_timeout: Duration,
    /// Read every page back after programming it.
    pub verify_writes: bool,
    /// Write the self-test files before probing for markers.
    pub storage_self_test: bool,
    pub self_test_text_file: &'static str,
    pub self_test_binary_file: &'static str,
}

impl UpdateConfig {
    pub fn files(&self, slot: Slot) -> &SlotFiles {
        match slot {
            Slot::A => &self.slot_a,
            Slot::B => &self.slot_b,
        }
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            slot_a: SlotFiles {
                marker: SLOT_A_MARKER,
                image: SLOT_A_IMAGE,
            },
            slot_b: SlotFiles {
                marker: SLOT_B_MARKER,
                image: SLOT_B_IMAGE,
            },
            erase_attempts: DEFAULT_ERASE_ATTEMPTS,
            flash_timeout: Duration::from_millis(DEFAULT_FLASH_TIMEOUT_MS),
            storage_timeout: Duration::from_millis(DEFAULT_STORAGE_TIMEOUT_MS),
            verify_writes: true,
            storage_self_test: true,
            self_test_text_file: SELF_TEST_TEXT_FILE,
            self_test_binary_file: SELF_TEST_BINARY_FILE,
        }
    }
}
