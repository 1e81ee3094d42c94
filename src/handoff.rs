// Final hand-off to the application, or a reset when that is not possible

use boot_core::{BootTarget, Fault, Handoff};
use cortex_m::peripheral::{NVIC, SCB};
use defmt::{debug, warn};
use embassy_time::{Duration, block_for};

use crate::config::{EXIT_LOG_DELAY_MS, RESTART_DELAY_MS};

const SCB_VTOR: u32 = 0xE000_ED08;

pub struct RpHandoff;

impl Handoff for RpHandoff {
    fn release_peripherals(&mut self) {
        // Let RTT pick up the exit log while the core still runs our code
        block_for(Duration::from_millis(EXIT_LOG_DELAY_MS));
        cortex_m::interrupt::disable();

        // Nothing the bootloader enabled may fire into the application's table
        let nvic = NVIC::PTR;
        unsafe {
            (*nvic).icer[0].write(u32::MAX);
            (*nvic).icpr[0].write(u32::MAX);
        }

        // Hold the blocks used for the card transfer in reset, the
        // application brings them up again itself
        embassy_rp::pac::RESETS.reset().modify(|w| {
            w.set_spi0(true);
            w.set_dma(true);
        });
        debug!("Peripherals released");
    }

    unsafe fn jump(&mut self, target: &BootTarget) -> ! {
        unsafe {
            core::arch::asm!(
                "msr msp, {sp}",
                "str {table}, [{vtor}]",
                "dsb",
                "isb",
                "cpsie i",
                "bx {reset}",
                table = in(reg) target.vector_table,
                vtor = in(reg) SCB_VTOR,
                sp = in(reg) target.initial_stack_pointer,
                reset = in(reg) target.reset_vector,
                options(noreturn)
            );
        }
    }

    fn restart(&mut self, fault: &Fault) -> ! {
        warn!("Restarting in {} ms after {}", RESTART_DELAY_MS, fault);
        block_for(Duration::from_millis(RESTART_DELAY_MS));
        SCB::sys_reset()
    }
}
