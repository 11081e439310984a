//! # Memory Bus Abstraction
//!
//! This module provides the `MemoryBus` trait that decouples a CPU execution
//! engine from the machine it runs in. The engine never touches RAM, ROM or a
//! peripheral directly; every fetch and store goes through this trait, which
//! `SystemBus` implements by routing to exactly one owner per address.
//!
//! ## Design Principles
//!
//! The MemoryBus trait follows 6502 hardware behavior:
//! - No bus errors - reads/writes always succeed
//! - Unmapped reads return the floating-bus value 0xFF
//! - Writes to ROM/unmapped regions are ignored

/// Memory bus trait for the CPU to read/write bytes.
///
/// # Design
///
/// - `read(&self)`: Immutable reference allows shared reads. Devices whose
///   reads have side effects (UART receive register, VIA timer acknowledge)
///   use interior mutability.
/// - `write(&mut self)`: Mutable reference makes side effects explicit
/// - No error types: 6502 hardware has no bus error mechanism
///
/// # Examples
///
/// ```
/// use homebrew6502::{MemoryBus, SystemBus};
///
/// let mut bus = SystemBus::new();
/// bus.configure_ram(0x0000, 0x8000).unwrap();
///
/// bus.write(0x1234, 0x42);
/// assert_eq!(bus.read(0x1234), 0x42);
///
/// // Nothing lives at 0x9000
/// assert_eq!(bus.read(0x9000), 0xFF);
/// ```
pub trait MemoryBus {
    /// Reads a byte from the specified 16-bit address.
    ///
    /// This method must never panic. Unmapped addresses read as 0xFF.
    fn read(&self, addr: u16) -> u8;

    /// Writes a byte to the specified 16-bit address.
    ///
    /// This method must never panic. Writes to read-only or unmapped
    /// addresses are dropped.
    fn write(&mut self, addr: u16, value: u8);

    /// Checks if the IRQ (Interrupt Request) line is active.
    ///
    /// The IRQ line on the 6502 is **level-sensitive** and **shared** among
    /// all devices: it is active while ANY device holds an interrupt.
    ///
    /// Returns `false` by default for buses without interrupt-capable devices.
    fn irq_active(&self) -> bool {
        false
    }
}
