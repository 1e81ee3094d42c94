// In-memory flash and card used by the unit tests.

extern crate std;

use core::future::pending;
use std::collections::BTreeMap;
use std::string::{String, ToString};
use std::vec;
use std::vec::Vec;

use embedded_storage_async::nor_flash::{ErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash};

use crate::config::ERASED_BYTE;
use crate::error::{StorageErrorKind, StoreError};
use crate::programmer::ProgramRegion;
use crate::store::{ImageFile, ImageStore};

pub const ROW_SIZE: usize = 256;
pub const PAGE_SIZE: usize = 64;
pub const FLASH_BYTES: usize = 16 * ROW_SIZE;

// Region used by most tests: rows 4..12 of the mock, mapped like a
// Cortex-M flash at address zero.
pub const REGION: ProgramRegion = ProgramRegion::new(0x400, 0x800, 0);

/// `len` bytes of 0x00..=0xAB repeated.
pub fn sequential_image(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 0xAC) as u8).collect()
}

pub fn run<F: core::future::Future>(fut: F) -> F::Output {
    embassy_futures::block_on(fut)
}

/// NOR flash with row-granular erase and bit-clearing writes.
pub struct MockFlash {
    pub memory: Vec<u8>,
    pub erases: Vec<(u32, u32)>,
    pub writes: Vec<(u32, usize)>,
    // (offset, cycles): the byte reads 0x00 after the next `cycles` erases
    stuck: Vec<(usize, u32)>,
    failing_erases: u32,
    fail_write_at: Option<u32>,
    stall_write_at: Option<u32>,
    corrupt_write_at: Option<u32>,
}

impl MockFlash {
    pub fn new() -> Self {
        Self::filled(0x00)
    }

    pub fn filled(value: u8) -> Self {
        Self {
            memory: vec![value; FLASH_BYTES],
            erases: Vec::new(),
            writes: Vec::new(),
            stuck: Vec::new(),
            failing_erases: 0,
            fail_write_at: None,
            stall_write_at: None,
            corrupt_write_at: None,
        }
    }

    pub fn erased() -> Self {
        Self::filled(ERASED_BYTE)
    }

    /// Place `bytes` at `offset` as if a previous boot had programmed them.
    pub fn preload(&mut self, offset: u32, bytes: &[u8]) {
        let start = offset as usize;
        self.memory[start..start + bytes.len()].copy_from_slice(bytes);
    }

    pub fn region_bytes(&self, region: ProgramRegion) -> &[u8] {
        &self.memory[region.start as usize..region.end() as usize]
    }

    pub fn stick_byte(&mut self, offset: u32, cycles: u32) {
        self.stuck.push((offset as usize, cycles));
    }

    pub fn fail_next_erases(&mut self, count: u32) {
        self.failing_erases = count;
    }

    pub fn fail_write_at(&mut self, offset: u32) {
        self.fail_write_at = Some(offset);
    }

    /// A write at `offset` never completes.
    pub fn stall_write_at(&mut self, offset: u32) {
        self.stall_write_at = Some(offset);
    }

    pub fn corrupt_write_at(&mut self, offset: u32) {
        self.corrupt_write_at = Some(offset);
    }
}

impl ErrorType for MockFlash {
    type Error = NorFlashErrorKind;
}

impl ReadNorFlash for MockFlash {
    const READ_SIZE: usize = 1;

    async fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let start = offset as usize;
        let end = start + bytes.len();
        if end > self.memory.len() {
            return Err(NorFlashErrorKind::OutOfBounds);
        }
        bytes.copy_from_slice(&self.memory[start..end]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.memory.len()
    }
}

impl NorFlash for MockFlash {
    const WRITE_SIZE: usize = 1;
    const ERASE_SIZE: usize = ROW_SIZE;

    async fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        let (start, end) = (from as usize, to as usize);
        if start % ROW_SIZE != 0 || end % ROW_SIZE != 0 || start > end {
            return Err(NorFlashErrorKind::NotAligned);
        }
        if end > self.memory.len() {
            return Err(NorFlashErrorKind::OutOfBounds);
        }
        self.erases.push((from, to));
        if self.failing_erases > 0 {
            self.failing_erases -= 1;
            return Err(NorFlashErrorKind::Other);
        }
        self.memory[start..end].fill(ERASED_BYTE);
        for (offset, cycles) in self.stuck.iter_mut() {
            if (start..end).contains(offset) && *cycles > 0 {
                self.memory[*offset] = 0x00;
                *cycles -= 1;
            }
        }
        Ok(())
    }

    async fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let start = offset as usize;
        let end = start + bytes.len();
        if end > self.memory.len() {
            return Err(NorFlashErrorKind::OutOfBounds);
        }
        self.writes.push((offset, bytes.len()));
        if self.stall_write_at == Some(offset) {
            pending::<()>().await;
        }
        if self.fail_write_at == Some(offset) {
            return Err(NorFlashErrorKind::Other);
        }
        for (cell, byte) in self.memory[start..end].iter_mut().zip(bytes) {
            *cell &= *byte;
        }
        if self.corrupt_write_at == Some(offset) {
            self.memory[start] ^= 0x01;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockError(pub StorageErrorKind);

impl StoreError for MockError {
    fn kind(&self) -> StorageErrorKind {
        self.0
    }
}

/// Card root directory held in a map.
#[derive(Default)]
pub struct MockStore {
    pub files: BTreeMap<String, Vec<u8>>,
    pub open_handles: usize,
    pub opened: Vec<String>,
    pub read_requests: Vec<usize>,
    read_fault: Option<(String, usize)>,
    read_stall: Option<(String, usize)>,
    open_fault: Option<String>,
    open_stall: Option<String>,
    max_read: Option<usize>,
    fail_creates: bool,
    fail_removes: bool,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, name: &str, contents: &[u8]) -> Self {
        self.insert(name, contents);
        self
    }

    pub fn insert(&mut self, name: &str, contents: &[u8]) {
        self.files.insert(name.to_string(), contents.to_vec());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    /// Reads of `name` that reach byte `offset` fail with a device error.
    pub fn fail_read_at(&mut self, name: &str, offset: usize) {
        self.read_fault = Some((name.to_string(), offset));
    }

    /// Reads of `name` that reach byte `offset` never complete.
    pub fn stall_read_at(&mut self, name: &str, offset: usize) {
        self.read_stall = Some((name.to_string(), offset));
    }

    pub fn fail_open(&mut self, name: &str) {
        self.open_fault = Some(name.to_string());
    }

    pub fn stall_open(&mut self, name: &str) {
        self.open_stall = Some(name.to_string());
    }

    /// Hand out at most `len` bytes per read call.
    pub fn limit_reads(&mut self, len: usize) {
        self.max_read = Some(len);
    }

    pub fn fail_creates(&mut self) {
        self.fail_creates = true;
    }

    pub fn fail_removes(&mut self) {
        self.fail_removes = true;
    }

    fn handle(&mut self, name: &str) -> MockFile<'_> {
        self.open_handles += 1;
        self.opened.push(name.to_string());
        MockFile {
            store: self,
            name: name.to_string(),
            position: 0,
        }
    }
}

pub struct MockFile<'s> {
    store: &'s mut MockStore,
    name: String,
    position: usize,
}

impl Drop for MockFile<'_> {
    fn drop(&mut self) {
        self.store.open_handles -= 1;
    }
}

impl ImageFile for MockFile<'_> {
    type Error = MockError;

    fn size(&self) -> u32 {
        self.store.files[&self.name].len() as u32
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.store.read_requests.push(buf.len());
        if let Some((name, offset)) = &self.store.read_fault {
            if *name == self.name && self.position + buf.len() > *offset {
                return Err(MockError(StorageErrorKind::Device));
            }
        }
        if let Some((name, offset)) = &self.store.read_stall {
            if *name == self.name && self.position + buf.len() > *offset {
                pending::<()>().await;
            }
        }
        let data = &self.store.files[&self.name];
        let limit = self.store.max_read.unwrap_or(usize::MAX);
        let n = buf.len().min(data.len() - self.position).min(limit);
        buf[..n].copy_from_slice(&data[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }

    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let file = self
            .store
            .files
            .get_mut(&self.name)
            .ok_or(MockError(StorageErrorKind::NotFound))?;
        file.extend_from_slice(buf);
        Ok(buf.len())
    }
}

impl ImageStore for MockStore {
    type Error = MockError;
    type File<'s>
        = MockFile<'s>
    where
        Self: 's;

    async fn open(&mut self, name: &str) -> Result<MockFile<'_>, MockError> {
        if self.open_fault.as_deref() == Some(name) {
            return Err(MockError(StorageErrorKind::Device));
        }
        if self.open_stall.as_deref() == Some(name) {
            pending::<()>().await;
        }
        if !self.files.contains_key(name) {
            return Err(MockError(StorageErrorKind::NotFound));
        }
        Ok(self.handle(name))
    }

    async fn create(&mut self, name: &str) -> Result<MockFile<'_>, MockError> {
        if self.fail_creates {
            return Err(MockError(StorageErrorKind::Filesystem));
        }
        self.files.insert(name.to_string(), Vec::new());
        Ok(self.handle(name))
    }

    async fn remove(&mut self, name: &str) -> Result<(), MockError> {
        if self.fail_removes {
            return Err(MockError(StorageErrorKind::Filesystem));
        }
        self.files
            .remove(name)
            .map(|_| ())
            .ok_or(MockError(StorageErrorKind::NotFound))
    }
}
