//! # System Coordinator
//!
//! Owns the bus router, the CPU engine and the interrupt aggregator for one
//! machine and drives them in lockstep:
//!
//! 1. The CPU engine executes one instruction through the bus
//! 2. Every peripheral is ticked by the cycles that instruction consumed
//! 3. The peripherals now asserting an interrupt are reconciled into the
//!    aggregator
//! 4. Aggregator edges are delivered to the CPU engine
//!
//! The CPU sees one IRQ and one NMI each time the matching aggregator line
//! goes from idle to held. A handler that returns without acknowledging its
//! source is not re-entered until the line has been released and raised
//! again. Releasing the IRQ line withdraws an IRQ the CPU has not yet taken.

use crate::bus::SystemBus;
use crate::cpu::{CpuEngine, RegisterUpdate, Registers};
use crate::devices::{Acia6850, Device, InterruptController, InterruptSource, Result, Via6522};
use crate::serial::{SerialPort, DEFAULT_BAUD_RATE};
use crate::MemoryBus;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Name the ACIA is registered under by [`System::from_config`].
pub const ACIA_NAME: &str = "acia";

/// Name the VIA is registered under by [`System::from_config`].
pub const VIA_NAME: &str = "via";

/// RAM placement.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RamConfig {
    pub start: u16,
    pub size: usize,
}

impl Default for RamConfig {
    fn default() -> Self {
        Self {
            start: 0x0000,
            size: 0x8000,
        }
    }
}

/// ROM image and placement.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RomConfig {
    pub start: u16,
    pub data: Vec<u8>,
}

/// ACIA placement and line speed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AciaConfig {
    pub start: u16,
    #[cfg_attr(feature = "serde", serde(default = "default_baud_rate"))]
    pub baud_rate: u32,
}

#[cfg(feature = "serde")]
fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

impl Default for AciaConfig {
    fn default() -> Self {
        Self {
            start: 0x8000,
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// VIA placement.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ViaConfig {
    pub start: u16,
}

impl Default for ViaConfig {
    fn default() -> Self {
        Self { start: 0x8010 }
    }
}

/// Memory layout for a machine built by [`System::from_config`].
///
/// The default is 32K of RAM at `$0000`, the ACIA at `$8000` and the VIA at
/// `$8010`, with no ROM.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SystemConfig {
    pub ram: RamConfig,
    pub rom: Option<RomConfig>,
    pub acia: Option<AciaConfig>,
    pub via: Option<ViaConfig>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            ram: RamConfig::default(),
            rom: None,
            acia: Some(AciaConfig::default()),
            via: Some(ViaConfig::default()),
        }
    }
}

/// Result of one [`System::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// An instruction (or interrupt entry) ran for this many cycles.
    Executed { cycles: u32 },
    /// The CPU is parked on a breakpoint; nothing ran.
    Breakpoint,
}

/// Totals from [`System::run`] or [`System::run_cycles`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunReport {
    pub steps: usize,
    pub cycles: u64,
    /// True if the run stopped on a breakpoint.
    pub breakpoint: bool,
}

/// One complete machine.
///
/// # Examples
///
/// ```
/// use homebrew6502::{BasicCpu, BufferedSerialPort, RegisterUpdate, System, SystemConfig};
///
/// let port = BufferedSerialPort::new();
/// let mut system = System::from_config(
///     &SystemConfig::default(),
///     BasicCpu::new(),
///     Some(Box::new(port.clone())),
/// )
/// .unwrap();
///
/// // LDA #'A' ; STA $8001
/// system.load_program(0x0200, &[0xA9, 0x41, 0x8D, 0x01, 0x80]);
/// system.set_registers(RegisterUpdate::pc(0x0200));
/// system.run(2);
/// system.run_cycles(1_000);
///
/// assert_eq!(port.transmitted(), vec![0x41]);
/// ```
pub struct System<C: CpuEngine> {
    bus: SystemBus,
    cpu: C,
    interrupts: InterruptController,
    irq_delivered: bool,
    nmi_delivered: bool,
}

impl<C: CpuEngine> System<C> {
    /// Assemble a machine from an already populated bus.
    ///
    /// The CPU is reset against the bus so PC comes from the reset vector.
    pub fn new(mut bus: SystemBus, mut cpu: C) -> Self {
        cpu.reset(&mut bus);
        Self {
            bus,
            cpu,
            interrupts: InterruptController::new(),
            irq_delivered: false,
            nmi_delivered: false,
        }
    }

    /// Build the machine described by `config`.
    ///
    /// The ACIA and VIA are registered as [`ACIA_NAME`] and [`VIA_NAME`];
    /// `serial` is bound to the ACIA if both are present.
    ///
    /// # Errors
    ///
    /// Any [`BusError`](crate::BusError) raised while mapping, most notably
    /// an address conflict between the peripherals.
    pub fn from_config(
        config: &SystemConfig,
        cpu: C,
        serial: Option<Box<dyn SerialPort>>,
    ) -> Result<Self> {
        let mut bus = SystemBus::new();
        bus.configure_ram(config.ram.start, config.ram.size)?;

        if let Some(rom) = &config.rom {
            bus.load_rom(rom.data.clone(), rom.start)?;
        }

        if let Some(acia_config) = &config.acia {
            let mut acia = Acia6850::new();
            if let Some(port) = serial {
                acia.attach_port(port);
            }
            acia.set_baud_rate(acia_config.baud_rate);
            let end = acia_config.start.saturating_add(acia.size() - 1);
            bus.register_peripheral(Box::new(acia), acia_config.start, end, ACIA_NAME)?;
        }

        if let Some(via_config) = &config.via {
            let via = Via6522::new();
            let end = via_config.start.saturating_add(via.size() - 1);
            bus.register_peripheral(Box::new(via), via_config.start, end, VIA_NAME)?;
        }

        log::debug!(
            "System built: RAM ${:04X}+{:#X}, {} peripheral(s)",
            config.ram.start,
            config.ram.size,
            bus.hub().len()
        );
        Ok(Self::new(bus, cpu))
    }

    /// Execute one instruction and bring the peripherals up to date.
    pub fn step(&mut self) -> StepOutcome {
        let cycles = self.cpu.step(&mut self.bus);
        if cycles == 0 {
            return StepOutcome::Breakpoint;
        }

        self.bus.tick(cycles);

        let active = self.bus.interrupting();
        let change = self
            .interrupts
            .update_from_peripherals(active.iter().map(String::as_str));
        log::trace!("Step: {} cycles, IRQ line {:?}", cycles, change);

        self.deliver_interrupts();
        StepOutcome::Executed { cycles }
    }

    /// Step until a breakpoint or `max_steps` instructions have run.
    pub fn run(&mut self, max_steps: usize) -> RunReport {
        let mut report = RunReport::default();
        while report.steps < max_steps {
            match self.step() {
                StepOutcome::Executed { cycles } => {
                    report.steps += 1;
                    report.cycles += cycles as u64;
                }
                StepOutcome::Breakpoint => {
                    report.breakpoint = true;
                    break;
                }
            }
        }
        report
    }

    /// Step until at least `budget` cycles have run or a breakpoint is hit.
    pub fn run_cycles(&mut self, budget: u64) -> RunReport {
        let mut report = RunReport::default();
        while report.cycles < budget {
            match self.step() {
                StepOutcome::Executed { cycles } => {
                    report.steps += 1;
                    report.cycles += cycles as u64;
                }
                StepOutcome::Breakpoint => {
                    report.breakpoint = true;
                    break;
                }
            }
        }
        report
    }

    /// Zero RAM, reset every peripheral and the aggregator, then reset the CPU.
    pub fn reset(&mut self) {
        self.bus.reset();
        self.interrupts.reset();
        self.irq_delivered = false;
        self.nmi_delivered = false;
        self.cpu.clear_irq();
        self.cpu.reset(&mut self.bus);
    }

    /// Hold IRQ on behalf of `source`.
    pub fn trigger_irq(&mut self, source: InterruptSource) {
        self.interrupts.trigger_irq(source);
        self.deliver_interrupts();
    }

    /// Hold NMI on behalf of `source`.
    pub fn trigger_nmi(&mut self, source: InterruptSource) {
        self.interrupts.trigger_nmi(source);
        self.deliver_interrupts();
    }

    /// Release `source`'s hold on IRQ.
    pub fn clear_irq(&mut self, source: &InterruptSource) {
        self.interrupts.clear_irq(source);
        self.deliver_interrupts();
    }

    /// Release `source`'s hold on NMI.
    pub fn clear_nmi(&mut self, source: &InterruptSource) {
        self.interrupts.clear_nmi(source);
        self.deliver_interrupts();
    }

    fn deliver_interrupts(&mut self) {
        let irq_held = self.interrupts.is_irq_pending();
        if irq_held && !self.irq_delivered {
            log::debug!("Delivering IRQ");
            self.cpu.trigger_irq();
        } else if !irq_held && self.irq_delivered {
            self.cpu.clear_irq();
        }
        self.irq_delivered = irq_held;

        let nmi_held = self.interrupts.is_nmi_pending();
        if nmi_held && !self.nmi_delivered {
            log::debug!("Delivering NMI");
            self.cpu.trigger_nmi();
        }
        self.nmi_delivered = nmi_held;
    }

    /// Copy `bytes` onto the bus starting at `addr`.
    ///
    /// Writes go through normal resolution, so bytes aimed at ROM are dropped.
    pub fn load_program(&mut self, addr: u16, bytes: &[u8]) {
        for (i, &byte) in bytes.iter().enumerate() {
            self.bus.write(addr.wrapping_add(i as u16), byte);
        }
    }

    pub fn registers(&self) -> Registers {
        self.cpu.registers()
    }

    pub fn set_registers(&mut self, update: RegisterUpdate) {
        self.cpu.set_registers(update);
    }

    pub fn bus(&self) -> &SystemBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut SystemBus {
        &mut self.bus
    }

    pub fn cpu(&self) -> &C {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut C {
        &mut self.cpu
    }

    pub fn interrupts(&self) -> &InterruptController {
        &self.interrupts
    }

    /// Mutable access to the aggregator, e.g. to install edge callbacks.
    pub fn interrupts_mut(&mut self) -> &mut InterruptController {
        &mut self.interrupts
    }

    /// Borrow a named peripheral as its concrete type.
    pub fn peripheral<T: Device + 'static>(&self, name: &str) -> Option<&T> {
        self.bus.peripheral(name)
    }

    /// Mutably borrow a named peripheral as its concrete type.
    pub fn peripheral_mut<T: Device + 'static>(&mut self, name: &str) -> Option<&mut T> {
        self.bus.peripheral_mut(name)
    }
}
