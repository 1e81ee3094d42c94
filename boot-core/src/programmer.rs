// Erase, verify and program the application region of the internal flash

use core::future::Future;

use embassy_time::{Duration, with_timeout};
use embedded_storage_async::nor_flash::{NorFlash, NorFlashError};

use crate::config::{ERASED_BYTE, UpdateConfig};
use crate::error::{EraseError, FlashOpError, LayoutError, WriteError};
use crate::launch::BootTarget;

/// The part of program memory the application is written to.
///
/// `start` and `len` are flash offsets as understood by the `NorFlash`
/// driver. `memory_base` is the CPU address at which flash offset zero is
/// mapped, so that the vector table address can be derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProgramRegion {
    pub start: u32,
    pub len: u32,
    pub memory_base: u32,
}

impl ProgramRegion {
    pub const fn new(start: u32, len: u32, memory_base: u32) -> Self {
        Self {
            start,
            len,
            memory_base,
        }
    }

    pub const fn end(&self) -> u32 {
        self.start + self.len
    }

    pub const fn vector_table_address(&self) -> u32 {
        self.memory_base + self.start
    }

    // End of the last row that holds a byte of the region
    fn erase_end(&self, row_size: u32) -> u32 {
        self.end().div_ceil(row_size) * row_size
    }
}

enum VerifyFailure {
    NotErased { offset: u32 },
    Read(FlashOpError),
}

async fn bounded<T, E: NorFlashError>(
    timeout: Duration,
    op: impl Future<Output = Result<T, E>>,
) -> Result<T, FlashOpError> {
    match with_timeout(timeout, op).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.kind().into()),
        Err(_) => Err(FlashOpError::Timeout),
    }
}

/// Owns the flash for the duration of an update and confines every erase and
/// write to the program region.
///
/// A row is the flash erase unit (`F::ERASE_SIZE`); `PAGE_SIZE` is the chunk
/// written per [`write_page`](Self::write_page) call.
pub struct FlashProgrammer<'f, F, const PAGE_SIZE: usize> {
    flash: &'f mut F,
    region: ProgramRegion,
    timeout: Duration,
    verify_writes: bool,
}

impl<'f, F: NorFlash, const PAGE_SIZE: usize> FlashProgrammer<'f, F, PAGE_SIZE> {
    pub fn new(
        flash: &'f mut F,
        region: ProgramRegion,
        config: &UpdateConfig,
    ) -> Result<Self, LayoutError> {
        let row_size = F::ERASE_SIZE as u32;

        if PAGE_SIZE == 0
            || PAGE_SIZE % F::WRITE_SIZE != 0
            || PAGE_SIZE % F::READ_SIZE != 0
            || F::ERASE_SIZE % PAGE_SIZE != 0
        {
            return Err(LayoutError::PageSize {
                page_size: PAGE_SIZE as u32,
            });
        }
        if region.len == 0 {
            return Err(LayoutError::EmptyRegion);
        }
        if region.start % row_size != 0 {
            return Err(LayoutError::UnalignedStart {
                start: region.start,
                row_size,
            });
        }
        let capacity = flash.capacity() as u32;
        let end = region
            .start
            .checked_add(region.len)
            .and_then(|end| end.div_ceil(row_size).checked_mul(row_size))
            .unwrap_or(u32::MAX);
        if end > capacity {
            return Err(LayoutError::OutOfCapacity { end, capacity });
        }

        Ok(Self {
            flash,
            region,
            timeout: config.flash_timeout,
            verify_writes: config.verify_writes,
        })
    }

    pub fn region(&self) -> ProgramRegion {
        self.region
    }

    /// Erase every row of the region and confirm that each byte reads back as
    /// erased. The whole cycle is repeated on any failure, up to
    /// `max_attempts` times. Returns the number of cycles it took.
    pub async fn erase_region(&mut self, max_attempts: u8) -> Result<u8, EraseError> {
        let max_attempts = max_attempts.max(1);

        for attempt in 1..=max_attempts {
            info!("Erasing program region, attempt {}/{}", attempt, max_attempts);

            if !self.erase_rows().await {
                warn!("Erase error, rerunning erase");
                continue;
            }

            debug!("Flash erased, checking");
            match self.verify_erased().await {
                Ok(()) => {
                    info!("Flash erased successfully");
                    return Ok(attempt);
                }
                Err(VerifyFailure::NotErased { offset }) => {
                    warn!(
                        "Flash not erased at offset {=u32:#x}, rerunning erase",
                        offset
                    );
                }
                Err(VerifyFailure::Read(e)) => {
                    warn!("Reading back erased flash failed: {}, rerunning erase", e);
                }
            }
        }

        error!("Flash erase failed after {} attempts", max_attempts);
        Err(EraseError::Exhausted {
            attempts: max_attempts,
        })
    }

    // Issues every row erase even after a failure so each failing row is logged
    async fn erase_rows(&mut self) -> bool {
        let row_size = F::ERASE_SIZE as u32;
        let end = self.region.erase_end(row_size);
        let mut all_erased = true;

        let mut row = self.region.start;
        while row < end {
            trace!("Erasing row at {=u32:#x}", row);
            if let Err(e) = bounded(self.timeout, self.flash.erase(row, row + row_size)).await {
                error!("Erase error at {=u32:#x}: {}", row, e);
                all_erased = false;
            }
            row += row_size;
        }
        all_erased
    }

    async fn verify_erased(&mut self) -> Result<(), VerifyFailure> {
        let end = self.region.erase_end(F::ERASE_SIZE as u32);
        let mut buf = [0u8; PAGE_SIZE];

        let mut offset = self.region.start;
        while offset < end {
            bounded(self.timeout, self.flash.read(offset, &mut buf))
                .await
                .map_err(VerifyFailure::Read)?;
            if let Some(pos) = buf.iter().position(|b| *b != ERASED_BYTE) {
                return Err(VerifyFailure::NotErased {
                    offset: offset + pos as u32,
                });
            }
            offset += PAGE_SIZE as u32;
        }
        Ok(())
    }

    /// Program one chunk of at most `PAGE_SIZE` bytes at `offset` from the
    /// start of the region. The containing row must already be erased.
    pub async fn write_page(&mut self, offset: u32, data: &[u8]) -> Result<(), WriteError> {
        let len = data.len() as u32;
        let fits = offset
            .checked_add(len)
            .is_some_and(|end| end <= self.region.len);
        if data.is_empty() || data.len() > PAGE_SIZE || !fits {
            return Err(WriteError::OutOfRegion { offset, len });
        }

        // Pad a short final chunk up to the write granularity with erased bytes
        let mut page = [ERASED_BYTE; PAGE_SIZE];
        page[..data.len()].copy_from_slice(data);
        let padded = data.len().next_multiple_of(F::WRITE_SIZE);

        let address = self.region.start + offset;
        bounded(self.timeout, self.flash.write(address, &page[..padded]))
            .await
            .map_err(|error| WriteError::Flash { offset, error })?;

        if self.verify_writes {
            let mut readback = [0u8; PAGE_SIZE];
            let read_len = data.len().next_multiple_of(F::READ_SIZE);
            bounded(self.timeout, self.flash.read(address, &mut readback[..read_len]))
                .await
                .map_err(|error| WriteError::Flash { offset, error })?;
            if let Some(pos) = readback[..data.len()]
                .iter()
                .zip(data)
                .position(|(written, expected)| written != expected)
            {
                return Err(WriteError::Mismatch {
                    offset: offset + pos as u32,
                });
            }
        }
        Ok(())
    }

    /// Read the initial stack pointer and reset vector out of the first two
    /// words of the region.
    pub async fn boot_target(&mut self) -> Result<BootTarget, FlashOpError> {
        let mut words = [0u8; 8];
        bounded(self.timeout, self.flash.read(self.region.start, &mut words)).await?;
        Ok(BootTarget::from_vector_table(
            self.region.vector_table_address(),
            &words,
        ))
    }
}
