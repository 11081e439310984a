//! Memory-mapped device support for the homebrew 6502 machine.
//!
//! This module provides the address-space plumbing that sits between the CPU
//! engine and the hardware it talks to.
//!
//! # Architecture
//!
//! - **Device trait**: The capability contract shared by RAM, ROM and every
//!   peripheral chip (read, write, reset, tick, interrupt status)
//! - **MemoryMap**: Generic router over RAM/ROM/IO regions. Regions of the
//!   same kind evict each other; regions of different kinds may overlap and
//!   are resolved ROM > IO > RAM
//! - **PeripheralHub**: Stricter, named registry for peripheral chips that
//!   rejects any overlapping registration
//! - **Device implementations**: RAM, ROM, ACIA (68B50), VIA (65C22)
//!
//! # Example
//!
//! ```rust
//! use homebrew6502::{MemoryBus, MemoryMap};
//!
//! let mut memory = MemoryMap::new();
//!
//! // 32KB RAM at 0x0000-0x7FFF
//! memory.configure_ram(0x0000, 0x8000).unwrap();
//!
//! // 16KB ROM at 0xC000-0xFFFF
//! memory.load_rom(vec![0xEA; 0x4000], 0xC000).unwrap();
//!
//! memory.write(0x0200, 0x42);
//! assert_eq!(memory.read(0x0200), 0x42);
//! assert_eq!(memory.read(0xC000), 0xEA);
//! ```

use crate::MemoryBus;
use std::any::Any;
use std::fmt;
use thiserror::Error;

pub mod acia;
pub mod hub;
pub mod interrupts;
pub mod ram;
pub mod rom;
pub mod via;

pub use acia::Acia6850;
pub use hub::PeripheralHub;
pub use interrupts::{InterruptController, InterruptSource};
pub use ram::RamDevice;
pub use rom::RomDevice;
pub use via::Via6522;

/// Value driven onto the data bus when nothing answers a read.
pub const UNMAPPED_VALUE: u8 = 0xFF;

/// Capability contract for anything that can own a slice of the address space.
///
/// The bus calls these methods with offset-based addressing (0 to size-1) so
/// a device never needs to know where it is mapped. The router never branches
/// on the concrete device type.
///
/// # Design
///
/// - **Offset-based**: Device receives `absolute address - region start`
/// - **No panics**: Undefined offsets read as 0xFF and ignore writes
/// - **Immutable read**: Devices with read side effects use interior mutability
/// - **Synchronous time**: `tick` is driven by the caller, never by the device
///
/// # Examples
///
/// ```rust
/// use homebrew6502::Device;
/// use std::any::Any;
///
/// struct Latch {
///     value: u8,
/// }
///
/// impl Device for Latch {
///     fn read(&self, _offset: u16) -> u8 {
///         self.value
///     }
///
///     fn write(&mut self, _offset: u16, value: u8) {
///         self.value = value;
///     }
///
///     fn size(&self) -> u16 {
///         1
///     }
///
///     fn as_any(&self) -> &dyn Any {
///         self
///     }
///
///     fn as_any_mut(&mut self) -> &mut dyn Any {
///         self
///     }
/// }
/// ```
pub trait Device {
    /// Read byte from device at offset relative to device base address.
    fn read(&self, offset: u16) -> u8;

    /// Write byte to device at offset relative to device base address.
    fn write(&mut self, offset: u16, value: u8);

    /// Return size of device's address space in bytes.
    fn size(&self) -> u16;

    /// Return the device to its power-on state.
    fn reset(&mut self) {}

    /// Advance the device by `cycles` bus-clock cycles.
    fn tick(&mut self, _cycles: u32) {}

    /// Whether the device is currently asserting its interrupt output.
    ///
    /// Must not modify device state.
    fn has_interrupt(&self) -> bool {
        false
    }

    /// Downcast support for reaching a concrete device after registration.
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcast support.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// What a region of the address space is backed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionKind {
    /// Read/write memory.
    Ram,
    /// Read-only memory; writes are dropped.
    Rom,
    /// Memory-mapped peripheral registers.
    Io,
}

impl RegionKind {
    /// Resolution priority when regions of different kinds overlap.
    ///
    /// ROM shadows IO, which shadows RAM.
    pub fn priority(self) -> u8 {
        match self {
            RegionKind::Rom => 2,
            RegionKind::Io => 1,
            RegionKind::Ram => 0,
        }
    }
}

impl fmt::Display for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionKind::Ram => write!(f, "RAM"),
            RegionKind::Rom => write!(f, "ROM"),
            RegionKind::Io => write!(f, "IO"),
        }
    }
}

/// Errors returned while laying out the address space.
///
/// Runtime accesses never fail; only setup does.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// A peripheral range intersects one that is already registered.
    #[error(
        "address conflict: {new_name} at ${new_start:04X}-${new_end:04X} overlaps {existing_name} at ${existing_start:04X}-${existing_end:04X}"
    )]
    AddressConflict {
        /// Name of the peripheral being registered
        new_name: String,
        /// First address of the rejected range
        new_start: u16,
        /// Last address (inclusive) of the rejected range
        new_end: u16,
        /// Name of the peripheral already holding the range
        existing_name: String,
        /// First address of the existing range
        existing_start: u16,
        /// Last address (inclusive) of the existing range
        existing_end: u16,
    },

    /// A peripheral with this name is already registered.
    #[error("a peripheral named {0:?} is already registered")]
    DuplicateName(String),

    /// The end of the range lies before its start.
    #[error("invalid address range ${start:04X}-${end:04X}")]
    InvalidRange {
        /// First address
        start: u16,
        /// Last address (inclusive)
        end: u16,
    },

    /// The region is empty or runs past the top of the 16-bit address space.
    #[error("{len} bytes at ${start:04X} do not fit in the address space")]
    OutOfBounds {
        /// First address
        start: u16,
        /// Requested length in bytes
        len: usize,
    },
}

/// Result alias for bus setup operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Compute the inclusive end address of `len` bytes starting at `start`.
pub(crate) fn region_end(start: u16, len: usize) -> Result<u16> {
    if len == 0 || start as usize + len > 0x1_0000 {
        return Err(BusError::OutOfBounds { start, len });
    }
    Ok((start as usize + len - 1) as u16)
}

/// One contiguous slice of the address space and the device that owns it.
pub struct AddressRegion {
    start: u16,
    end: u16,
    kind: RegionKind,
    handler: Box<dyn Device>,
}

impl AddressRegion {
    /// Create a region spanning `start..=end`.
    pub fn new(start: u16, end: u16, kind: RegionKind, handler: Box<dyn Device>) -> Self {
        Self {
            start,
            end,
            kind,
            handler,
        }
    }

    /// First address of the region.
    pub fn start(&self) -> u16 {
        self.start
    }

    /// Last address (inclusive) of the region.
    pub fn end(&self) -> u16 {
        self.end
    }

    /// What backs the region.
    pub fn kind(&self) -> RegionKind {
        self.kind
    }

    /// Borrow the handling device.
    pub fn handler(&self) -> &dyn Device {
        self.handler.as_ref()
    }

    /// Mutably borrow the handling device.
    pub fn handler_mut(&mut self) -> &mut dyn Device {
        self.handler.as_mut()
    }

    /// Check if `addr` falls inside the region.
    pub fn contains(&self, addr: u16) -> bool {
        addr >= self.start && addr <= self.end
    }

    /// Check if the region intersects `start..=end`.
    pub fn overlaps(&self, start: u16, end: u16) -> bool {
        self.start <= end && start <= self.end
    }
}

impl fmt::Debug for AddressRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressRegion")
            .field("start", &format_args!("${:04X}", self.start))
            .field("end", &format_args!("${:04X}", self.end))
            .field("kind", &self.kind)
            .finish()
    }
}

/// Generic memory router that resolves addresses across RAM, ROM and IO regions.
///
/// `MemoryMap` implements the `MemoryBus` trait. Registration never fails on
/// overlap: a new region evicts whatever region of the *same* kind it
/// collides with, and regions of different kinds are allowed to stack, with
/// the winner chosen at access time by [`RegionKind::priority`].
///
/// # Address Routing
///
/// When the CPU reads or writes to an address:
/// 1. Collect every region covering the address
/// 2. Pick the highest-priority kind (ROM > IO > RAM)
/// 3. Call the region's handler with offset (addr - start)
/// 4. If nothing covers the address, reads return 0xFF and writes are dropped
///
/// # Examples
///
/// ```rust
/// use homebrew6502::{MemoryBus, MemoryMap};
///
/// let mut memory = MemoryMap::new();
/// memory.configure_ram(0x0000, 0x10000).unwrap();
/// memory.load_rom(vec![0xAA; 0x100], 0xFF00).unwrap();
///
/// // ROM shadows the RAM underneath it
/// memory.write(0xFF00, 0x11);
/// assert_eq!(memory.read(0xFF00), 0xAA);
/// ```
pub struct MemoryMap {
    regions: Vec<AddressRegion>,
    unmapped_value: u8,
}

impl MemoryMap {
    /// Create a new empty memory router.
    pub fn new() -> Self {
        Self {
            regions: Vec::new(),
            unmapped_value: UNMAPPED_VALUE,
        }
    }

    /// Replace any RAM region with a fresh zero-filled block of `size` bytes at `start`.
    pub fn configure_ram(&mut self, start: u16, size: usize) -> Result<()> {
        let end = region_end(start, size)?;
        self.evict(RegionKind::Ram, |_| true);
        self.regions.push(AddressRegion::new(
            start,
            end,
            RegionKind::Ram,
            Box::new(RamDevice::with_len(size)),
        ));
        log::debug!("RAM configured at ${:04X}-${:04X}", start, end);
        Ok(())
    }

    /// Install a ROM image at `start`, replacing any ROM region it overlaps.
    pub fn load_rom(&mut self, data: Vec<u8>, start: u16) -> Result<()> {
        let end = region_end(start, data.len())?;
        self.evict(RegionKind::Rom, |region| region.overlaps(start, end));
        self.regions.push(AddressRegion::new(
            start,
            end,
            RegionKind::Rom,
            Box::new(RomDevice::new(data)),
        ));
        log::debug!("ROM loaded at ${:04X}-${:04X}", start, end);
        Ok(())
    }

    /// Map a peripheral over `start..=end`, replacing any IO region it overlaps.
    pub fn map_peripheral(
        &mut self,
        start: u16,
        end: u16,
        peripheral: Box<dyn Device>,
    ) -> Result<()> {
        if end < start {
            return Err(BusError::InvalidRange { start, end });
        }
        self.evict(RegionKind::Io, |region| region.overlaps(start, end));
        self.regions
            .push(AddressRegion::new(start, end, RegionKind::Io, peripheral));
        log::debug!("IO mapped at ${:04X}-${:04X}", start, end);
        Ok(())
    }

    fn evict(&mut self, kind: RegionKind, mut predicate: impl FnMut(&AddressRegion) -> bool) {
        self.regions.retain(|region| {
            let evicted = region.kind == kind && predicate(region);
            if evicted {
                log::debug!(
                    "Evicting {} region ${:04X}-${:04X}",
                    region.kind,
                    region.start,
                    region.end
                );
            }
            !evicted
        });
    }

    /// All regions, in registration order.
    pub fn regions(&self) -> impl Iterator<Item = &AddressRegion> {
        self.regions.iter()
    }

    /// Find the region that owns `addr` after priority resolution.
    pub fn resolve(&self, addr: u16) -> Option<&AddressRegion> {
        self.regions
            .iter()
            .filter(|region| region.contains(addr))
            .max_by_key(|region| region.kind.priority())
    }

    fn resolve_mut(&mut self, addr: u16) -> Option<&mut AddressRegion> {
        self.regions
            .iter_mut()
            .filter(|region| region.contains(addr))
            .max_by_key(|region| region.kind.priority())
    }

    /// Zero all RAM and reset every mapped peripheral. ROM is untouched.
    pub fn reset(&mut self) {
        for region in &mut self.regions {
            if region.kind != RegionKind::Rom {
                region.handler.reset();
            }
        }
    }

    /// Advance every IO region by `cycles`, in start-address order.
    pub fn tick(&mut self, cycles: u32) {
        let mut io: Vec<&mut AddressRegion> = self
            .regions
            .iter_mut()
            .filter(|region| region.kind == RegionKind::Io)
            .collect();
        io.sort_by_key(|region| region.start);
        for region in io {
            region.handler.tick(cycles);
        }
    }

    /// Start addresses of IO regions currently asserting an interrupt.
    pub fn interrupting_io(&self) -> Vec<u16> {
        let mut starts: Vec<u16> = self
            .regions
            .iter()
            .filter(|region| region.kind == RegionKind::Io && region.handler.has_interrupt())
            .map(|region| region.start)
            .collect();
        starts.sort_unstable();
        starts
    }
}

impl Default for MemoryMap {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus for MemoryMap {
    fn read(&self, addr: u16) -> u8 {
        match self.resolve(addr) {
            Some(region) => region.handler.read(addr - region.start),
            None => {
                log::debug!("Unmapped read at ${:04X}", addr);
                self.unmapped_value
            }
        }
    }

    fn write(&mut self, addr: u16, value: u8) {
        match self.resolve_mut(addr) {
            Some(region) => {
                if region.kind == RegionKind::Rom {
                    log::debug!("Write of ${:02X} to ROM at ${:04X} ignored", value, addr);
                }
                let offset = addr - region.start;
                region.handler.write(offset, value);
            }
            None => log::debug!("Unmapped write of ${:02X} at ${:04X} dropped", value, addr),
        }
    }

    fn irq_active(&self) -> bool {
        self.regions
            .iter()
            .any(|region| region.kind == RegionKind::Io && region.handler.has_interrupt())
    }
}
