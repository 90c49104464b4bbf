//! 4004 memory spaces.
//!
//! Program memory is up to 4096 bytes of ROM, read through the 12-bit
//! program counter. Data memory is 4002-style RAM: 256 four-bit main
//! characters reached through the 8-bit SRC data pointer, plus four
//! status characters per RAM register.

use crate::cpu::registers::{Precondition, SnapshotError};
use crate::nibble::{addr12, nibble};
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Program memory size in bytes.
pub const ROM_SIZE: usize = 4096;

/// Data memory size in nibbles.
pub const RAM_SIZE: usize = 256;

/// Number of RAM registers carrying status characters.
pub const STATUS_REGISTERS: usize = 16;

/// Status characters per RAM register.
pub const STATUS_CHARS: usize = 4;

/// Read-only program memory. Always exactly [`ROM_SIZE`] bytes.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "RawProgramStore")]
pub struct ProgramStore {
    bytes: Vec<u8>,
}

#[derive(Deserialize)]
struct RawProgramStore {
    bytes: Vec<u8>,
}

impl TryFrom<RawProgramStore> for ProgramStore {
    type Error = SnapshotError;

    fn try_from(raw: RawProgramStore) -> Result<Self, Self::Error> {
        check_length("rom", raw.bytes.len(), ROM_SIZE)?;
        Ok(Self { bytes: raw.bytes })
    }
}

impl ProgramStore {
    /// Create an empty (all zero) program store.
    pub fn new() -> Self {
        Self {
            bytes: vec![0; ROM_SIZE],
        }
    }

    /// Replace the contents with an image. Bytes past the image stay zero.
    pub fn load(&mut self, image: &[u8]) -> Result<(), MemoryError> {
        if image.len() > ROM_SIZE {
            return Err(MemoryError::ProgramTooLarge {
                size: image.len(),
                available: ROM_SIZE,
            });
        }

        self.clear();
        self.bytes[..image.len()].copy_from_slice(image);
        Ok(())
    }

    /// Read a byte by address (0x000-0xFFF).
    pub fn read(&self, addr: usize) -> Result<u8, Precondition> {
        self.bytes
            .get(addr)
            .copied()
            .ok_or(Precondition::ProgramAddress(addr))
    }

    /// Fetch through the program counter; the address wraps at 4K.
    #[inline]
    pub fn fetch(&self, pc: u16) -> u8 {
        self.bytes[addr12(pc) as usize]
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }
}

impl Default for ProgramStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProgramStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only report the used extent
        let used = self.bytes
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |last| last + 1);

        f.debug_struct("ProgramStore")
            .field("used_bytes", &used)
            .field("total_bytes", &ROM_SIZE)
            .finish()
    }
}

/// Read/write data memory: main characters and status characters.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "RawDataStore")]
pub struct DataStore {
    cells: Vec<u8>,
    status: Vec<[u8; STATUS_CHARS]>,
}

#[derive(Deserialize)]
struct RawDataStore {
    cells: Vec<u8>,
    status: Vec<[u8; STATUS_CHARS]>,
}

impl TryFrom<RawDataStore> for DataStore {
    type Error = SnapshotError;

    fn try_from(raw: RawDataStore) -> Result<Self, Self::Error> {
        check_length("ram cells", raw.cells.len(), RAM_SIZE)?;
        check_length("ram status", raw.status.len(), STATUS_REGISTERS)?;
        Ok(Self {
            cells: raw.cells.into_iter().map(nibble).collect(),
            status: raw.status.into_iter().map(|chars| chars.map(nibble)).collect(),
        })
    }
}

fn check_length(field: &'static str, found: usize, expected: usize) -> Result<(), SnapshotError> {
    if found != expected {
        return Err(SnapshotError::Length { field, expected, found });
    }
    Ok(())
}

impl DataStore {
    /// Create a new data store with all cells zeroed.
    pub fn new() -> Self {
        Self {
            cells: vec![0; RAM_SIZE],
            status: vec![[0; STATUS_CHARS]; STATUS_REGISTERS],
        }
    }

    /// Read a main character by address (0x00-0xFF).
    pub fn read(&self, addr: usize) -> Result<u8, Precondition> {
        self.cells
            .get(addr)
            .copied()
            .ok_or(Precondition::DataAddress(addr))
    }

    /// Write a main character, truncating the value to 4 bits.
    pub fn write(&mut self, addr: usize, value: u8) -> Result<(), Precondition> {
        let cell = self.cells
            .get_mut(addr)
            .ok_or(Precondition::DataAddress(addr))?;
        *cell = nibble(value);
        Ok(())
    }

    /// Read status character `index` of the RAM register selected by `dptr`.
    pub fn read_status(&self, dptr: u8, index: usize) -> Result<u8, Precondition> {
        self.status[Self::status_register(dptr)]
            .get(index)
            .copied()
            .ok_or(Precondition::StatusIndex(index))
    }

    /// Write status character `index` of the RAM register selected by `dptr`.
    pub fn write_status(&mut self, dptr: u8, index: usize, value: u8) -> Result<(), Precondition> {
        let cell = self.status[Self::status_register(dptr)]
            .get_mut(index)
            .ok_or(Precondition::StatusIndex(index))?;
        *cell = nibble(value);
        Ok(())
    }

    /// The high nibble of the data pointer selects chip and register.
    fn status_register(dptr: u8) -> usize {
        (dptr >> 4) as usize
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.cells
    }

    /// Clear all memory to zeros.
    pub fn clear(&mut self) {
        self.cells.fill(0);
        for chars in &mut self.status {
            *chars = [0; STATUS_CHARS];
        }
    }

    /// Dump a range of main characters (for debugging).
    pub fn dump(&self, start: usize, count: usize) -> Vec<(usize, u8)> {
        let end = start.saturating_add(count).min(RAM_SIZE);
        (start.min(end)..end)
            .map(|i| (i, self.cells[i]))
            .collect()
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only show non-zero cells
        let non_zero = self.cells.iter().filter(|&&c| c != 0).count();

        f.debug_struct("DataStore")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &RAM_SIZE)
            .finish()
    }
}

/// Errors that can occur while loading memory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("program size {size} exceeds available space {available}")]
    ProgramTooLarge { size: usize, available: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_program() {
        let mut rom = ProgramStore::new();
        rom.load(&[0xD5, 0x60, 0xC0]).unwrap();

        assert_eq!(rom.read(0), Ok(0xD5));
        assert_eq!(rom.read(1), Ok(0x60));
        assert_eq!(rom.read(2), Ok(0xC0));
        assert_eq!(rom.read(3), Ok(0x00));
        assert_eq!(rom.read(ROM_SIZE - 1), Ok(0x00));
    }

    #[test]
    fn test_load_replaces_previous_image() {
        let mut rom = ProgramStore::new();
        rom.load(&[0xFF; 8]).unwrap();
        rom.load(&[0x11]).unwrap();

        assert_eq!(rom.read(0), Ok(0x11));
        assert_eq!(rom.read(1), Ok(0x00));
    }

    #[test]
    fn test_load_too_large() {
        let mut rom = ProgramStore::new();
        assert!(rom.load(&vec![0; ROM_SIZE]).is_ok());
        assert_eq!(
            rom.load(&vec![0; ROM_SIZE + 1]),
            Err(MemoryError::ProgramTooLarge { size: ROM_SIZE + 1, available: ROM_SIZE })
        );
    }

    #[test]
    fn test_rom_bounds() {
        let rom = ProgramStore::new();
        assert_eq!(rom.read(ROM_SIZE), Err(Precondition::ProgramAddress(ROM_SIZE)));
    }

    #[test]
    fn test_fetch_wraps() {
        let mut rom = ProgramStore::new();
        rom.load(&[0x42]).unwrap();
        assert_eq!(rom.fetch(0x1000), 0x42);
    }

    #[test]
    fn test_ram_read_write_masks() {
        let mut ram = DataStore::new();
        ram.write(0x3C, 0xA7).unwrap();
        assert_eq!(ram.read(0x3C), Ok(0x7));
        assert_eq!(ram.read(RAM_SIZE), Err(Precondition::DataAddress(RAM_SIZE)));
        assert_eq!(ram.write(RAM_SIZE, 1), Err(Precondition::DataAddress(RAM_SIZE)));
    }

    #[test]
    fn test_status_characters_follow_register() {
        let mut ram = DataStore::new();
        ram.write_status(0x20, 1, 0x9).unwrap();

        // Same RAM register, different character offset
        assert_eq!(ram.read_status(0x2F, 1), Ok(0x9));
        // Different register
        assert_eq!(ram.read_status(0x30, 1), Ok(0x0));
        assert_eq!(ram.read_status(0x20, 4), Err(Precondition::StatusIndex(4)));
    }

    #[test]
    fn test_snapshot_sizes_are_checked() {
        let short_rom = serde_json::from_str::<ProgramStore>(r#"{"bytes":[0]}"#);
        assert!(short_rom.is_err());

        let mut value = serde_json::to_value(DataStore::new()).unwrap();
        value["cells"] = serde_json::json!([1, 2, 3]);
        let err = serde_json::from_value::<DataStore>(value).unwrap_err();
        assert!(err.to_string().contains("ram cells holds 3 entries"));

        let mut value = serde_json::to_value(DataStore::new()).unwrap();
        value["status"] = serde_json::json!([[0, 0, 0, 0]]);
        assert!(serde_json::from_value::<DataStore>(value).is_err());
    }

    #[test]
    fn test_snapshot_masks_ram() {
        let mut value = serde_json::to_value(DataStore::new()).unwrap();
        value["cells"][7] = serde_json::json!(0xA9);
        value["status"][2][1] = serde_json::json!(0x3C);
        let ram: DataStore = serde_json::from_value(value).unwrap();

        assert_eq!(ram.read(7), Ok(0x9));
        assert_eq!(ram.read_status(0x20, 1), Ok(0xC));
    }

    #[test]
    fn test_dump_clamps_range() {
        let mut ram = DataStore::new();
        ram.write(255, 3).unwrap();
        assert_eq!(ram.dump(254, 10), vec![(254, 0), (255, 3)]);
        assert!(ram.dump(300, 4).is_empty());
    }
}
