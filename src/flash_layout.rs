use core::ops::Range;

use boot_core::ProgramRegion;

use crate::config::FLASH_BASE;

// Defined in memory.x as offsets from the start of flash
unsafe extern "C" {
    static __app_region_start: u32;
    static __app_region_end: u32;
}

pub fn get_app_region_range() -> Range<u32> {
    unsafe {
        let start = &__app_region_start as *const u32 as u32;
        let end = &__app_region_end as *const u32 as u32;
        start..end
    }
}

pub fn get_app_region_size() -> u32 {
    let range = get_app_region_range();
    range.end - range.start
}

/// The application region as seen by the flash driver, with the XIP base so
/// that the vector table address can be derived.
pub fn app_program_region() -> ProgramRegion {
    ProgramRegion::new(get_app_region_range().start, get_app_region_size(), FLASH_BASE)
}
