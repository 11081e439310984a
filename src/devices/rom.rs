//! ROM device implementation.
//!
//! Provides read-only memory storage via the Device trait.

use super::Device;
use std::any::Any;

/// Read-only memory device.
///
/// `RomDevice` stores an immutable image. Writes are accepted on the bus but
/// change nothing, matching EPROM and mask-ROM behavior.
///
/// # Examples
///
/// ```rust
/// use homebrew6502::{RomDevice, Device};
///
/// let mut rom = RomDevice::new(vec![0xEA, 0xEA, 0xEA]);
///
/// assert_eq!(rom.read(0), 0xEA);
///
/// rom.write(0, 0xFF);
/// assert_eq!(rom.read(0), 0xEA);
/// ```
pub struct RomDevice {
    data: Vec<u8>,
}

impl RomDevice {
    /// Create a new ROM device holding `data`.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// The ROM image.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Device for RomDevice {
    fn read(&self, offset: u16) -> u8 {
        self.data.get(offset as usize).copied().unwrap_or(0xFF)
    }

    fn write(&mut self, _offset: u16, _value: u8) {}

    fn size(&self) -> u16 {
        self.data.len() as u16
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
