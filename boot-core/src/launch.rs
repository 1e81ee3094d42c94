use crate::bootloader::Terminal;
use crate::error::Fault;

/// Where control goes once the bootloader is done: the application's vector
/// table and the first two entries of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootTarget {
    pub vector_table: u32,
    pub initial_stack_pointer: u32,
    pub reset_vector: u32,
}

impl BootTarget {
    /// Decode the first two little-endian words of a Cortex-M vector table.
    pub fn from_vector_table(vector_table: u32, words: &[u8; 8]) -> Self {
        Self {
            vector_table,
            initial_stack_pointer: u32::from_le_bytes([words[0], words[1], words[2], words[3]]),
            reset_vector: u32::from_le_bytes([words[4], words[5], words[6], words[7]]),
        }
    }

    /// Both words still hold the erased pattern, so nothing was ever
    /// programmed there.
    pub fn is_erased(&self) -> bool {
        self.initial_stack_pointer == u32::MAX && self.reset_vector == u32::MAX
    }
}

/// Board side of the final hand-off.
pub trait Handoff {
    /// Return every peripheral the bootloader touched to its reset state.
    fn release_peripherals(&mut self);

    /// Load the stack pointer from `target`, point the vector table base at
    /// the application and branch to its reset vector.
    ///
    /// # Safety
    ///
    /// `target` must describe a valid application image. Nothing of the
    /// bootloader survives the call.
    unsafe fn jump(&mut self, target: &BootTarget) -> !;

    /// Wait long enough for the log to drain, then reset the device.
    fn restart(&mut self, fault: &Fault) -> !;
}

/// Act on the outcome of [`Bootloader::run`](crate::Bootloader::run).
pub fn conclude<H: Handoff>(handoff: &mut H, terminal: Terminal) -> ! {
    match terminal {
        Terminal::Launch { target, update } => {
            if let Some(report) = update {
                info!("Update applied: {}", report);
            }
            info!(
                "Exit bootloader: vector table {=u32:#x}, stack {=u32:#x}, entry {=u32:#x}",
                target.vector_table,
                target.initial_stack_pointer,
                target.reset_vector
            );
            handoff.release_peripherals();
            // SAFETY: the target was read back from the programmed region and
            // is not an erased vector table.
            unsafe { handoff.jump(&target) }
        }
        Terminal::FatalRestart(fault) => {
            error!("Fatal: {}. System will restart", fault);
            handoff.restart(&fault)
        }
    }
}
