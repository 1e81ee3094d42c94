use embassy_time::Duration;
use embedded_storage_async::nor_flash::NorFlash;

use crate::error::TransferError;
use crate::programmer::FlashProgrammer;
use crate::store::{ImageFile, read_bounded};

/// Progress through an image being copied into program memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransferCursor {
    pub page: u32,
    pub consumed: u32,
    pub remaining: u32,
}

impl TransferCursor {
    pub fn new(image_len: u32) -> Self {
        Self {
            page: 0,
            consumed: 0,
            remaining: image_len,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }

    /// Bytes to request next: a full page, or what is left of the image.
    pub fn next_chunk_len(&self, page_size: u32) -> u32 {
        self.remaining.min(page_size)
    }

    fn advance(&mut self, len: u32) {
        self.page += 1;
        self.consumed += len;
        self.remaining -= len;
    }
}

/// Stream `image_len` bytes from `image` into the program region, one page at
/// a time starting at the region base. Any read or write failure aborts the
/// transfer; the region is then partially written and must be redone from
/// scratch.
pub async fn transfer_image<I, F, const PAGE_SIZE: usize>(
    image: &mut I,
    image_len: u32,
    programmer: &mut FlashProgrammer<'_, F, PAGE_SIZE>,
    read_timeout: Duration,
) -> Result<TransferCursor, TransferError>
where
    I: ImageFile,
    F: NorFlash,
{
    let mut cursor = TransferCursor::new(image_len);
    let mut chunk = [0u8; PAGE_SIZE];

    while !cursor.is_complete() {
        let len = cursor.next_chunk_len(PAGE_SIZE as u32) as usize;
        fill(image, &mut chunk[..len], cursor.consumed, read_timeout).await?;
        programmer.write_page(cursor.consumed, &chunk[..len]).await?;
        cursor.advance(len as u32);
        trace!(
            "Wrote page {} into flash, {} bytes remaining",
            cursor.page,
            cursor.remaining
        );
    }

    info!(
        "Transferred {} bytes in {} pages",
        cursor.consumed, cursor.page
    );
    Ok(cursor)
}

// Keep reading until `buf` is full; the store may return short reads
async fn fill<I: ImageFile>(
    image: &mut I,
    buf: &mut [u8],
    offset: u32,
    timeout: Duration,
) -> Result<(), TransferError> {
    let mut filled = 0;
    while filled < buf.len() {
        let at = offset + filled as u32;
        let n = read_bounded(image, &mut buf[filled..], timeout)
            .await
            .map_err(|kind| {
                error!("Error in reading file at offset {}: {}", at, kind);
                TransferError::Read { offset: at, kind }
            })?;
        if n == 0 {
            error!("Image ended early at offset {}", at);
            return Err(TransferError::UnexpectedEof { offset: at });
        }
        filled += n;
    }
    Ok(())
}
