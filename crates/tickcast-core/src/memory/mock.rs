//! In-memory guest world for tests.
//!
//! Models the emulator as a byte map keyed by guest address, with host
//! addresses offset by a constant. The mock translator counts round trips so
//! tests can assert cache-hit properties.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::memory::process::RawMemory;
use crate::qmp::Translate;

/// Host addresses in the mock world are guest + this offset.
pub const MOCK_HOST_OFFSET: u64 = 0x7f00_0000_0000;

#[derive(Default, Clone)]
pub struct MockWorld {
    cells: Rc<RefCell<HashMap<u64, u8>>>,
}

impl MockWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_bytes(&self, guest: u64, bytes: &[u8]) {
        let mut cells = self.cells.borrow_mut();
        for (i, b) in bytes.iter().enumerate() {
            cells.insert(guest + i as u64, *b);
        }
    }

    pub fn write_u8(&self, guest: u64, value: u8) {
        self.write_bytes(guest, &[value]);
    }

    pub fn write_u16(&self, guest: u64, value: u16) {
        self.write_bytes(guest, &value.to_le_bytes());
    }

    pub fn write_u32(&self, guest: u64, value: u32) {
        self.write_bytes(guest, &value.to_le_bytes());
    }

    pub fn write_i16(&self, guest: u64, value: i16) {
        self.write_bytes(guest, &value.to_le_bytes());
    }

    pub fn write_i32(&self, guest: u64, value: i32) {
        self.write_bytes(guest, &value.to_le_bytes());
    }

    pub fn write_f32(&self, guest: u64, value: f32) {
        self.write_bytes(guest, &value.to_le_bytes());
    }

    /// Write a null-terminated UTF-8 string.
    pub fn write_str(&self, guest: u64, text: &str) {
        self.write_bytes(guest, text.as_bytes());
        self.write_u8(guest + text.len() as u64, 0);
    }

    /// Write a null-terminated UTF-16LE string.
    pub fn write_wstr(&self, guest: u64, text: &str) {
        let mut bytes = Vec::new();
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        bytes.extend_from_slice(&[0, 0]);
        self.write_bytes(guest, &bytes);
    }

    /// Unwritten cells read as zero, like freshly mapped pages.
    fn read(&self, guest: u64, len: usize) -> Vec<u8> {
        let cells = self.cells.borrow();
        (0..len as u64)
            .map(|i| cells.get(&(guest + i)).copied().unwrap_or(0))
            .collect()
    }
}

/// RawMemory over the mock world, addressed at host addresses.
#[derive(Clone)]
pub struct MockMemory {
    world: MockWorld,
}

impl MockMemory {
    pub fn new(world: MockWorld) -> Self {
        Self { world }
    }
}

impl RawMemory for MockMemory {
    fn read_bytes(&self, host: u64, len: usize) -> Result<Vec<u8>> {
        let guest = host.wrapping_sub(MOCK_HOST_OFFSET);
        Ok(self.world.read(guest, len))
    }

    fn write_bytes(&self, host: u64, bytes: &[u8]) -> Result<()> {
        let guest = host.wrapping_sub(MOCK_HOST_OFFSET);
        self.world.write_bytes(guest, bytes);
        Ok(())
    }
}

/// Translator stub with a call counter and a configurable unmapped set.
pub struct MockTranslator {
    world: MockWorld,
    unmapped: HashSet<u64>,
    pub calls: u32,
    pub reconnects: u32,
}

impl MockTranslator {
    pub fn new(world: MockWorld) -> Self {
        Self {
            world,
            unmapped: HashSet::new(),
            calls: 0,
            reconnects: 0,
        }
    }

    pub fn mark_unmapped(&mut self, guest: u64) {
        self.unmapped.insert(guest);
    }
}

impl Translate for MockTranslator {
    fn translate(&mut self, guest: u64) -> Result<u64> {
        self.calls += 1;
        if self.unmapped.contains(&guest) {
            return Err(Error::Unmapped { guest });
        }
        Ok(guest + MOCK_HOST_OFFSET)
    }

    fn read_guest(&mut self, guest: u64, len: usize) -> Result<Vec<u8>> {
        self.calls += 1;
        if self.unmapped.contains(&guest) {
            return Err(Error::Unmapped { guest });
        }
        Ok(self.world.read(guest, len))
    }

    fn reconnect(&mut self) -> Result<()> {
        self.reconnects += 1;
        Ok(())
    }
}
