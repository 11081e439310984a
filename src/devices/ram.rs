//! RAM device implementation.
//!
//! Provides readable and writable memory storage via the Device trait.

use super::Device;
use std::any::Any;

/// Zero-initialised RAM block.
///
/// `RamDevice` backs a RAM region in the memory map. All offsets within the
/// block are readable and writable; `reset` clears it back to zero.
///
/// # Examples
///
/// ```rust
/// use homebrew6502::{RamDevice, Device};
///
/// let mut ram = RamDevice::with_len(1024); // 1KB RAM
///
/// ram.write(0x42, 0xAA);
/// assert_eq!(ram.read(0x42), 0xAA);
///
/// ram.reset();
/// assert_eq!(ram.read(0x42), 0x00);
/// ```
pub struct RamDevice {
    data: Vec<u8>,
}

impl RamDevice {
    /// Create a new RAM block of `len` bytes, all zero.
    ///
    /// `len` may be the full 64KB, which does not fit in a `u16`.
    pub fn with_len(len: usize) -> Self {
        Self {
            data: vec![0; len],
        }
    }

    /// Load bytes into RAM at the specified offset.
    ///
    /// Bytes that would fall past the end of the block are dropped.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use homebrew6502::{RamDevice, Device};
    ///
    /// let mut ram = RamDevice::with_len(1024);
    /// ram.load_bytes(0x100, &[0x01, 0x02, 0x03]);
    ///
    /// assert_eq!(ram.read(0x100), 0x01);
    /// assert_eq!(ram.read(0x102), 0x03);
    /// ```
    pub fn load_bytes(&mut self, offset: u16, bytes: &[u8]) {
        let start = (offset as usize).min(self.data.len());
        let end = (start + bytes.len()).min(self.data.len());
        self.data[start..end].copy_from_slice(&bytes[..end - start]);
    }

    /// Number of bytes in the block.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the block holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Device for RamDevice {
    fn read(&self, offset: u16) -> u8 {
        self.data.get(offset as usize).copied().unwrap_or(0xFF)
    }

    fn write(&mut self, offset: u16, value: u8) {
        if let Some(byte) = self.data.get_mut(offset as usize) {
            *byte = value;
        }
    }

    fn size(&self) -> u16 {
        // A full 64KB block wraps to 0 here; regions carry their own bounds.
        self.data.len() as u16
    }

    fn reset(&mut self) {
        self.data.fill(0);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
