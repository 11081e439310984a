//! # Homebrew 6502 Computer Core
//!
//! Hardware simulation for a homebrew 6502/65C02 computer: a bus router that
//! resolves every access to exactly one owner, cycle-driven models of a
//! 68B50 ACIA and a 65C22 VIA, and an interrupt aggregator that turns their
//! interrupt outputs into the CPU's IRQ and NMI inputs.
//!
//! The instruction interpreter sits behind the [`CpuEngine`] trait. A small
//! reference engine, [`BasicCpu`], is included for booting and testing.
//!
//! ## Quick Start
//!
//! ```rust
//! use homebrew6502::{
//!     Acia6850, BasicCpu, BufferedSerialPort, MemoryBus, RegisterUpdate, System, SystemBus,
//! };
//!
//! let port = BufferedSerialPort::new();
//!
//! let mut bus = SystemBus::new();
//! bus.configure_ram(0x0000, 0x8000).unwrap();
//! bus.register_peripheral(
//!     Box::new(Acia6850::with_port(port.clone())),
//!     0x8000,
//!     0x8001,
//!     "acia",
//! )
//! .unwrap();
//!
//! let mut system = System::new(bus, BasicCpu::new());
//! system.load_program(
//!     0x0200,
//!     &[
//!         0xA9, 0x03, 0x8D, 0x00, 0x80, // master reset
//!         0xA9, 0x11, 0x8D, 0x00, 0x80, // 8 bits, divide by 16
//!         0xA9, 0x41, 0x8D, 0x01, 0x80, // send 'A'
//!         0x4C, 0x0F, 0x02, // JMP *
//!     ],
//! );
//! system.set_registers(RegisterUpdate::pc(0x0200));
//! system.run(6);
//! system.run_cycles(2_000);
//!
//! assert_eq!(port.transmitted(), vec![0x41]);
//! ```
//!
//! ## Architecture
//!
//! - **Single owner per address**: ROM shadows peripherals, peripherals shadow
//!   RAM, and anything left over reads `0xFF`
//! - **Offset addressing**: Peripherals only ever see `address - start`
//! - **Synchronous ticking**: Peripherals advance by the cycles each
//!   instruction consumed; nothing runs in the background
//! - **Owned state**: Each [`System`] owns its bus, peripherals and
//!   interrupt state; there are no globals
//!
//! ## Modules
//!
//! - `memory` - The [`MemoryBus`] trait the CPU engine talks to
//! - `devices` - Device trait, memory map, peripheral hub, ACIA, VIA and
//!   interrupt aggregator
//! - `bus` - The [`SystemBus`] router combining the two registries
//! - `serial` - Serial port abstraction and reference ports
//! - `cpu` - CPU engine contract and the reference engine
//! - `system` - The coordinator tying everything together

pub mod bus;
pub mod cpu;
pub mod devices;
pub mod memory;
pub mod serial;
pub mod system;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export public API
pub use bus::SystemBus;
pub use cpu::{BasicCpu, CpuEngine, RegisterUpdate, Registers};
pub use devices::{
    acia::{AciaStatus, Parity, TransmitterControl, WordFormat},
    interrupts::LineChange,
    via::ViaInterrupt,
    Acia6850, AddressRegion, BusError, Device, InterruptController, InterruptSource, MemoryMap,
    PeripheralHub, RamDevice, RegionKind, Result, RomDevice, Via6522, UNMAPPED_VALUE,
};
pub use memory::MemoryBus;
pub use serial::{BufferedSerialPort, ConsoleSerialPort, NullSerialPort, SerialPort};
pub use system::{
    AciaConfig, RamConfig, RomConfig, RunReport, StepOutcome, System, SystemConfig, ViaConfig,
};
