//! Byte addressable memory of the [Machine](crate::emulator::Machine).

use std::fmt;

/// Address at which programs are loaded and the reset vector starts.
pub const PAGE_PROGRAM: u16 = 0x0100;

/// Size of a single memory bank in bytes.
pub const BANK_SIZE: usize = 0x10000;

/// One or more 64 KiB memory banks.
///
/// Instructions only see the first bank. Addresses are 16 bits wide and all address arithmetic
/// wraps around within the bank, so a short stored at `0xFFFF` continues at `0x0000`.
#[derive(Clone, PartialEq)]
pub struct AddressSpace {
    bytes: Vec<u8>,
}

impl Default for AddressSpace {
    fn default() -> AddressSpace {
        AddressSpace::new()
    }
}

impl AddressSpace {
    /// Creates a single bank address space.
    pub fn new() -> AddressSpace {
        AddressSpace::with_banks(1)
    }

    /// Creates an address space with `banks` banks. At least one bank is always allocated.
    pub fn with_banks(banks: usize) -> AddressSpace {
        AddressSpace {
            bytes: vec![0; BANK_SIZE * banks.max(1)],
        }
    }

    pub fn banks(&self) -> usize {
        self.bytes.len() / BANK_SIZE
    }

    pub fn peek8(&self, address: u16) -> u8 {
        self.bytes[address as usize]
    }

    /// Reads a big-endian short.
    pub fn peek16(&self, address: u16) -> u16 {
        u16::from_be_bytes([self.peek8(address), self.peek8(address.wrapping_add(1))])
    }

    pub fn poke8(&mut self, address: u16, value: u8) {
        self.bytes[address as usize] = value;
    }

    /// Writes a big-endian short.
    pub fn poke16(&mut self, address: u16, value: u16) {
        let [high, low] = value.to_be_bytes();
        self.poke8(address, high);
        self.poke8(address.wrapping_add(1), low);
    }

    /// The instruction visible bank.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..BANK_SIZE]
    }

    pub fn bank(&self, bank: usize) -> Option<&[u8]> {
        self.bytes.get(bank * BANK_SIZE..(bank + 1) * BANK_SIZE)
    }

    pub fn bank_mut(&mut self, bank: usize) -> Option<&mut [u8]> {
        self.bytes.get_mut(bank * BANK_SIZE..(bank + 1) * BANK_SIZE)
    }

    /// Copies `data` into the first bank starting at `offset`.
    ///
    /// Bytes that would not fit below the end of the bank are dropped.
    ///
    /// # Returns
    /// The number of bytes copied.
    pub fn load(&mut self, offset: u16, data: &[u8]) -> usize {
        let start = offset as usize;
        let count = data.len().min(BANK_SIZE - start);

        self.bytes[start..start + count].copy_from_slice(&data[..count]);

        count
    }

    /// Zeroes every bank.
    pub fn clear(&mut self) {
        for byte in self.bytes.iter_mut() {
            *byte = 0;
        }
    }
}

impl fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AddressSpace")
            .field("banks", &self.banks())
            .finish()
    }
}
