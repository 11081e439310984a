//! # System Bus
//!
//! The address-space router the CPU engine sees. It composes the generic
//! [`MemoryMap`] (RAM, ROM and loosely mapped IO) with the strict
//! [`PeripheralHub`] that holds the named peripheral chips.
//!
//! ## Resolution
//!
//! Every access resolves to exactly one owner:
//!
//! 1. ROM, if a ROM region covers the address
//! 2. A hub peripheral, if one owns the address
//! 3. Whatever the memory map resolves (IO region, then RAM)
//! 4. Otherwise the access is unmapped: reads return 0xFF, writes are dropped

use crate::devices::{Device, MemoryMap, PeripheralHub, RegionKind, Result, UNMAPPED_VALUE};
use crate::MemoryBus;

/// Address-space router for one machine.
///
/// # Examples
///
/// ```rust
/// use homebrew6502::{Acia6850, MemoryBus, SystemBus};
///
/// let mut bus = SystemBus::new();
/// bus.configure_ram(0x0000, 0x8000).unwrap();
/// bus.register_peripheral(Box::new(Acia6850::new()), 0x8000, 0x8001, "acia")
///     .unwrap();
///
/// // ACIA status: transmitter empty
/// assert_eq!(bus.read(0x8000) & 0x02, 0x02);
/// ```
pub struct SystemBus {
    memory: MemoryMap,
    hub: PeripheralHub,
}

impl SystemBus {
    /// Create a bus with nothing mapped.
    pub fn new() -> Self {
        Self {
            memory: MemoryMap::new(),
            hub: PeripheralHub::new(),
        }
    }

    /// Replace the RAM region with `size` zeroed bytes at `start`.
    pub fn configure_ram(&mut self, start: u16, size: usize) -> Result<()> {
        self.memory.configure_ram(start, size)
    }

    /// Install a ROM image at `start`, replacing overlapping ROM.
    pub fn load_rom(&mut self, data: Vec<u8>, start: u16) -> Result<()> {
        self.memory.load_rom(data, start)
    }

    /// Map an anonymous peripheral, replacing overlapping IO regions.
    pub fn map_peripheral(
        &mut self,
        start: u16,
        end: u16,
        peripheral: Box<dyn Device>,
    ) -> Result<()> {
        self.memory.map_peripheral(start, end, peripheral)
    }

    /// Register a named peripheral; fails on any overlap with another.
    pub fn register_peripheral(
        &mut self,
        peripheral: Box<dyn Device>,
        start: u16,
        end: u16,
        name: impl Into<String>,
    ) -> Result<()> {
        self.hub.register_peripheral(peripheral, start, end, name)
    }

    /// Remove a named peripheral. Does nothing if absent.
    pub fn unregister_peripheral(&mut self, name: &str) -> Option<Box<dyn Device>> {
        self.hub.unregister_peripheral(name)
    }

    /// The generic memory router.
    pub fn memory(&self) -> &MemoryMap {
        &self.memory
    }

    /// The peripheral registry.
    pub fn hub(&self) -> &PeripheralHub {
        &self.hub
    }

    /// Mutable access to the peripheral registry.
    pub fn hub_mut(&mut self) -> &mut PeripheralHub {
        &mut self.hub
    }

    /// Borrow a named peripheral as its concrete type.
    pub fn peripheral<T: Device + 'static>(&self, name: &str) -> Option<&T> {
        self.hub.peripheral(name)
    }

    /// Mutably borrow a named peripheral as its concrete type.
    pub fn peripheral_mut<T: Device + 'static>(&mut self, name: &str) -> Option<&mut T> {
        self.hub.peripheral_mut(name)
    }

    /// Which kind of region answers at `addr`, if any.
    pub fn resolve(&self, addr: u16) -> Option<RegionKind> {
        let mapped = self.memory.resolve(addr).map(|region| region.kind());
        match mapped {
            Some(RegionKind::Rom) => mapped,
            _ if self.hub.contains(addr) => Some(RegionKind::Io),
            _ => mapped,
        }
    }

    /// Advance every peripheral by `cycles`.
    ///
    /// Hub peripherals run first, in start-address order, then anonymous IO.
    pub fn tick(&mut self, cycles: u32) {
        self.hub.tick(cycles);
        self.memory.tick(cycles);
    }

    /// Names of everything currently asserting an interrupt.
    ///
    /// Anonymous IO regions are named by their start address, e.g. `io@$9000`.
    pub fn interrupting(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .hub
            .interrupting()
            .into_iter()
            .map(str::to_string)
            .collect();
        names.extend(
            self.memory
                .interrupting_io()
                .into_iter()
                .map(|start| format!("io@${:04X}", start)),
        );
        names
    }

    /// Zero RAM and reset every peripheral.
    pub fn reset(&mut self) {
        self.memory.reset();
        self.hub.reset();
    }
}

impl Default for SystemBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus for SystemBus {
    fn read(&self, addr: u16) -> u8 {
        match self.resolve(addr) {
            Some(RegionKind::Io) => self
                .hub
                .read(addr)
                .unwrap_or_else(|| self.memory.read(addr)),
            Some(_) => self.memory.read(addr),
            None => {
                log::debug!("Unmapped read at ${:04X}", addr);
                UNMAPPED_VALUE
            }
        }
    }

    fn write(&mut self, addr: u16, value: u8) {
        match self.resolve(addr) {
            Some(RegionKind::Io) => {
                if !self.hub.write(addr, value) {
                    self.memory.write(addr, value);
                }
            }
            Some(_) => self.memory.write(addr, value),
            None => log::debug!("Unmapped write of ${:02X} at ${:04X} dropped", value, addr),
        }
    }

    fn irq_active(&self) -> bool {
        !self.hub.interrupting().is_empty() || self.memory.irq_active()
    }
}
