//! # CPU Execution Engine
//!
//! The machine treats the instruction interpreter as a pluggable engine
//! behind the [`CpuEngine`] trait. The engine never owns memory: every
//! `reset` and `step` call lends it the bus router, so all fetches, loads
//! and stores go through the same address resolution as the rest of the
//! system.
//!
//! [`BasicCpu`] is a small reference engine. It executes only the handful of
//! opcodes a homebrew monitor needs to boot and talk to its peripherals, and
//! treats everything else as a 2-cycle no-op.
//!
//! ## Interrupt Inputs
//!
//! - **NMI**: Serviced before anything else on the next step, regardless of
//!   the I flag
//! - **IRQ**: Serviced on the next step only while the I flag is clear
//!
//! Servicing an interrupt clears its pending input.
//!
//! ## Breakpoints
//!
//! When PC sits on a breakpoint, `step` executes nothing and returns 0
//! cycles. The caller decides what to do next.

use std::collections::BTreeSet;

use crate::MemoryBus;

/// Reset vector address.
pub const RESET_VECTOR: u16 = 0xFFFC;

/// NMI vector address.
pub const NMI_VECTOR: u16 = 0xFFFA;

/// IRQ/BRK vector address.
pub const IRQ_VECTOR: u16 = 0xFFFE;

/// Cycles taken to push state and jump through an interrupt vector.
pub const INTERRUPT_CYCLES: u32 = 7;

const FLAG_CARRY: u8 = 0b0000_0001;
const FLAG_ZERO: u8 = 0b0000_0010;
const FLAG_INTERRUPT: u8 = 0b0000_0100;
const FLAG_DECIMAL: u8 = 0b0000_1000;
const FLAG_BREAK: u8 = 0b0001_0000;
const FLAG_CONSTANT: u8 = 0b0010_0000;
const FLAG_OVERFLOW: u8 = 0b0100_0000;
const FLAG_NEGATIVE: u8 = 0b1000_0000;

/// Snapshot of the programmer-visible CPU state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Registers {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub pc: u16,
    pub sp: u8,
    /// Packed status register (NV-BDIZC).
    pub p: u8,
    pub cycles: u64,
}

/// Partial register update; `None` fields are left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegisterUpdate {
    pub a: Option<u8>,
    pub x: Option<u8>,
    pub y: Option<u8>,
    pub pc: Option<u16>,
    pub sp: Option<u8>,
    pub p: Option<u8>,
    pub cycles: Option<u64>,
}

impl RegisterUpdate {
    /// Update that only moves the program counter.
    pub fn pc(pc: u16) -> Self {
        Self {
            pc: Some(pc),
            ..Self::default()
        }
    }
}

/// Contract between the machine and an instruction interpreter.
pub trait CpuEngine {
    /// Reset internal state and load PC from the reset vector.
    fn reset(&mut self, bus: &mut dyn MemoryBus);

    /// Execute one instruction, or service one pending interrupt.
    ///
    /// Returns the cycles consumed. Zero means PC is on a breakpoint and
    /// nothing was executed.
    fn step(&mut self, bus: &mut dyn MemoryBus) -> u32;

    /// Current register snapshot.
    fn registers(&self) -> Registers;

    /// Overwrite the registers named in `update`.
    fn set_registers(&mut self, update: RegisterUpdate);

    fn set_breakpoint(&mut self, addr: u16);

    fn remove_breakpoint(&mut self, addr: u16);

    fn has_breakpoint(&self, addr: u16) -> bool;

    /// Assert the IRQ input.
    fn trigger_irq(&mut self);

    /// Latch an NMI for the next step.
    fn trigger_nmi(&mut self);

    /// Deassert the IRQ input.
    fn clear_irq(&mut self);

    fn is_irq_pending(&self) -> bool;

    fn is_nmi_pending(&self) -> bool;
}

/// Reference 6502 engine with a minimal instruction set.
///
/// Implemented opcodes:
///
/// | Opcode | Instruction  | Cycles |
/// |--------|--------------|--------|
/// | `$00`  | BRK          | 7      |
/// | `$40`  | RTI          | 6      |
/// | `$4C`  | JMP abs      | 3      |
/// | `$58`  | CLI          | 2      |
/// | `$6C`  | JMP (ind)    | 5      |
/// | `$78`  | SEI          | 2      |
/// | `$8D`  | STA abs      | 4      |
/// | `$A9`  | LDA #imm     | 2      |
/// | `$AD`  | LDA abs      | 4      |
/// | `$EA`  | NOP          | 2      |
///
/// # Examples
///
/// ```
/// use homebrew6502::{BasicCpu, CpuEngine, MemoryBus, SystemBus};
///
/// let mut bus = SystemBus::new();
/// bus.configure_ram(0x0000, 0x10000).unwrap();
/// bus.write(0xFFFC, 0x00);
/// bus.write(0xFFFD, 0x02);
/// bus.write(0x0200, 0xA9); // LDA #$42
/// bus.write(0x0201, 0x42);
///
/// let mut cpu = BasicCpu::new();
/// cpu.reset(&mut bus);
/// assert_eq!(cpu.step(&mut bus), 2);
/// assert_eq!(cpu.registers().a, 0x42);
/// ```
#[derive(Debug, Clone)]
pub struct BasicCpu {
    a: u8,
    x: u8,
    y: u8,
    pc: u16,
    sp: u8,

    flag_n: bool,
    flag_v: bool,
    flag_b: bool,
    flag_d: bool,
    flag_i: bool,
    flag_z: bool,
    flag_c: bool,

    cycles: u64,

    irq_pending: bool,
    nmi_pending: bool,
    breakpoints: BTreeSet<u16>,
}

impl BasicCpu {
    /// Create an engine in its power-on state. Call [`CpuEngine::reset`]
    /// before stepping to load PC.
    pub fn new() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            pc: 0,
            sp: 0xFF,
            flag_n: false,
            flag_v: false,
            flag_b: false,
            flag_d: false,
            flag_i: true,
            flag_z: false,
            flag_c: false,
            cycles: 0,
            irq_pending: false,
            nmi_pending: false,
            breakpoints: BTreeSet::new(),
        }
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Returns true if the Interrupt Disable flag is set.
    pub fn flag_i(&self) -> bool {
        self.flag_i
    }

    /// Packed status register. Bit 5 always reads as 1.
    pub fn status(&self) -> u8 {
        let mut status = FLAG_CONSTANT;

        if self.flag_n {
            status |= FLAG_NEGATIVE;
        }
        if self.flag_v {
            status |= FLAG_OVERFLOW;
        }
        if self.flag_b {
            status |= FLAG_BREAK;
        }
        if self.flag_d {
            status |= FLAG_DECIMAL;
        }
        if self.flag_i {
            status |= FLAG_INTERRUPT;
        }
        if self.flag_z {
            status |= FLAG_ZERO;
        }
        if self.flag_c {
            status |= FLAG_CARRY;
        }

        status
    }

    fn set_status(&mut self, status: u8) {
        self.flag_n = status & FLAG_NEGATIVE != 0;
        self.flag_v = status & FLAG_OVERFLOW != 0;
        self.flag_b = status & FLAG_BREAK != 0;
        self.flag_d = status & FLAG_DECIMAL != 0;
        self.flag_i = status & FLAG_INTERRUPT != 0;
        self.flag_z = status & FLAG_ZERO != 0;
        self.flag_c = status & FLAG_CARRY != 0;
    }

    fn fetch(&mut self, bus: &dyn MemoryBus) -> u8 {
        let value = bus.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        value
    }

    fn fetch_word(&mut self, bus: &dyn MemoryBus) -> u16 {
        let lo = self.fetch(bus) as u16;
        let hi = self.fetch(bus) as u16;
        (hi << 8) | lo
    }

    fn read_word(bus: &dyn MemoryBus, addr: u16) -> u16 {
        let lo = bus.read(addr) as u16;
        let hi = bus.read(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    fn push(&mut self, bus: &mut dyn MemoryBus, value: u8) {
        bus.write(0x0100 | self.sp as u16, value);
        self.sp = self.sp.wrapping_sub(1);
    }

    fn pull(&mut self, bus: &mut dyn MemoryBus) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        bus.read(0x0100 | self.sp as u16)
    }

    fn set_nz(&mut self, value: u8) {
        self.flag_z = value == 0;
        self.flag_n = value & 0x80 != 0;
    }

    /// Push PC and `status`, set I and jump through `vector`.
    fn enter_interrupt(&mut self, bus: &mut dyn MemoryBus, vector: u16, status: u8) {
        self.push(bus, (self.pc >> 8) as u8);
        self.push(bus, self.pc as u8);
        self.push(bus, status);
        self.flag_i = true;
        self.pc = Self::read_word(bus, vector);
    }

    fn execute(&mut self, bus: &mut dyn MemoryBus, opcode: u8) -> u32 {
        match opcode {
            // BRK
            0x00 => {
                self.pc = self.pc.wrapping_add(1);
                let status = self.status() | FLAG_BREAK;
                self.enter_interrupt(bus, IRQ_VECTOR, status);
                7
            }
            // RTI
            0x40 => {
                let status = self.pull(bus);
                self.set_status(status);
                let lo = self.pull(bus) as u16;
                let hi = self.pull(bus) as u16;
                self.pc = (hi << 8) | lo;
                6
            }
            // JMP abs
            0x4C => {
                self.pc = self.fetch_word(bus);
                3
            }
            // CLI
            0x58 => {
                self.flag_i = false;
                2
            }
            // JMP (ind), reproducing the page-wrap bug
            0x6C => {
                let ptr = self.fetch_word(bus);
                let lo = bus.read(ptr) as u16;
                let hi_addr = (ptr & 0xFF00) | (ptr.wrapping_add(1) & 0x00FF);
                let hi = bus.read(hi_addr) as u16;
                self.pc = (hi << 8) | lo;
                5
            }
            // SEI
            0x78 => {
                self.flag_i = true;
                2
            }
            // STA abs
            0x8D => {
                let addr = self.fetch_word(bus);
                bus.write(addr, self.a);
                4
            }
            // LDA #imm
            0xA9 => {
                self.a = self.fetch(bus);
                self.set_nz(self.a);
                2
            }
            // LDA abs
            0xAD => {
                let addr = self.fetch_word(bus);
                self.a = bus.read(addr);
                self.set_nz(self.a);
                4
            }
            // NOP
            0xEA => 2,
            _ => {
                log::trace!(
                    "Unimplemented opcode ${:02X} at ${:04X}",
                    opcode,
                    self.pc.wrapping_sub(1)
                );
                2
            }
        }
    }
}

impl Default for BasicCpu {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuEngine for BasicCpu {
    fn reset(&mut self, bus: &mut dyn MemoryBus) {
        let breakpoints = std::mem::take(&mut self.breakpoints);
        *self = Self::new();
        self.breakpoints = breakpoints;
        self.set_status(FLAG_CONSTANT | FLAG_INTERRUPT);
        self.pc = Self::read_word(bus, RESET_VECTOR);
        log::debug!("CPU reset, PC=${:04X}", self.pc);
    }

    fn step(&mut self, bus: &mut dyn MemoryBus) -> u32 {
        if self.breakpoints.contains(&self.pc) {
            log::debug!("Breakpoint at ${:04X}", self.pc);
            return 0;
        }

        let cycles = if self.nmi_pending {
            self.nmi_pending = false;
            let status = self.status() & !FLAG_BREAK;
            self.enter_interrupt(bus, NMI_VECTOR, status);
            INTERRUPT_CYCLES
        } else if self.irq_pending && !self.flag_i {
            self.irq_pending = false;
            let status = self.status() & !FLAG_BREAK;
            self.enter_interrupt(bus, IRQ_VECTOR, status);
            INTERRUPT_CYCLES
        } else {
            let opcode = self.fetch(bus);
            self.execute(bus, opcode)
        };

        self.cycles += cycles as u64;
        cycles
    }

    fn registers(&self) -> Registers {
        Registers {
            a: self.a,
            x: self.x,
            y: self.y,
            pc: self.pc,
            sp: self.sp,
            p: self.status(),
            cycles: self.cycles,
        }
    }

    fn set_registers(&mut self, update: RegisterUpdate) {
        if let Some(a) = update.a {
            self.a = a;
        }
        if let Some(x) = update.x {
            self.x = x;
        }
        if let Some(y) = update.y {
            self.y = y;
        }
        if let Some(pc) = update.pc {
            self.pc = pc;
        }
        if let Some(sp) = update.sp {
            self.sp = sp;
        }
        if let Some(p) = update.p {
            self.set_status(p);
        }
        if let Some(cycles) = update.cycles {
            self.cycles = cycles;
        }
    }

    fn set_breakpoint(&mut self, addr: u16) {
        self.breakpoints.insert(addr);
    }

    fn remove_breakpoint(&mut self, addr: u16) {
        self.breakpoints.remove(&addr);
    }

    fn has_breakpoint(&self, addr: u16) -> bool {
        self.breakpoints.contains(&addr)
    }

    fn trigger_irq(&mut self) {
        self.irq_pending = true;
    }

    fn trigger_nmi(&mut self) {
        self.nmi_pending = true;
    }

    fn clear_irq(&mut self) {
        self.irq_pending = false;
    }

    fn is_irq_pending(&self) -> bool {
        self.irq_pending
    }

    fn is_nmi_pending(&self) -> bool {
        self.nmi_pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SystemBus;

    fn bus_with_program(program: &[u8]) -> SystemBus {
        let mut bus = SystemBus::new();
        bus.configure_ram(0x0000, 0x10000).unwrap();
        bus.write(0xFFFC, 0x00);
        bus.write(0xFFFD, 0x02);
        for (i, &byte) in program.iter().enumerate() {
            bus.write(0x0200 + i as u16, byte);
        }
        bus
    }

    fn booted(program: &[u8]) -> (BasicCpu, SystemBus) {
        let mut bus = bus_with_program(program);
        let mut cpu = BasicCpu::new();
        cpu.reset(&mut bus);
        (cpu, bus)
    }

    #[test]
    fn test_reset_state() {
        let (cpu, _) = booted(&[]);
        let regs = cpu.registers();

        assert_eq!(regs.pc, 0x0200);
        assert_eq!(regs.sp, 0xFF);
        assert_eq!(regs.p, 0x24);
        assert_eq!(regs.cycles, 0);
        assert!(!cpu.is_irq_pending());
    }

    #[test]
    fn test_lda_sta_roundtrip_through_bus() {
        let (mut cpu, mut bus) = booted(&[
            0xA9, 0x80, // LDA #$80
            0x8D, 0x00, 0x30, // STA $3000
            0xA9, 0x00, // LDA #$00
            0xAD, 0x00, 0x30, // LDA $3000
        ]);

        assert_eq!(cpu.step(&mut bus), 2);
        assert_eq!(cpu.registers().p & FLAG_NEGATIVE, FLAG_NEGATIVE);
        assert_eq!(cpu.step(&mut bus), 4);
        assert_eq!(bus.read(0x3000), 0x80);
        cpu.step(&mut bus);
        assert_eq!(cpu.registers().p & FLAG_ZERO, FLAG_ZERO);
        assert_eq!(cpu.step(&mut bus), 4);
        assert_eq!(cpu.registers().a, 0x80);
        assert_eq!(cpu.cycles(), 12);
    }

    #[test]
    fn test_jmp_indirect_page_wrap() {
        let (mut cpu, mut bus) = booted(&[0x6C, 0xFF, 0x30]);
        bus.write(0x30FF, 0x34);
        bus.write(0x3000, 0x12); // fetched instead of $3100
        bus.write(0x3100, 0x99);

        assert_eq!(cpu.step(&mut bus), 5);
        assert_eq!(cpu.pc(), 0x1234);
    }

    #[test]
    fn test_breakpoint_halts_without_executing() {
        let (mut cpu, mut bus) = booted(&[0xEA, 0xEA]);
        cpu.set_breakpoint(0x0201);

        assert_eq!(cpu.step(&mut bus), 2);
        assert_eq!(cpu.step(&mut bus), 0);
        assert_eq!(cpu.pc(), 0x0201);

        cpu.remove_breakpoint(0x0201);
        assert!(!cpu.has_breakpoint(0x0201));
        assert_eq!(cpu.step(&mut bus), 2);
    }

    #[test]
    fn test_irq_masked_by_i_flag() {
        let (mut cpu, mut bus) = booted(&[0xEA, 0x58, 0xEA]);
        bus.write(0xFFFE, 0x00);
        bus.write(0xFFFF, 0x40);

        cpu.trigger_irq();
        assert_eq!(cpu.step(&mut bus), 2); // NOP, I still set
        assert!(cpu.is_irq_pending());
        cpu.step(&mut bus); // CLI

        assert_eq!(cpu.step(&mut bus), INTERRUPT_CYCLES);
        assert_eq!(cpu.pc(), 0x4000);
        assert!(cpu.flag_i());
        assert!(!cpu.is_irq_pending());

        // Return address and status on the stack
        assert_eq!(bus.read(0x01FF), 0x02);
        assert_eq!(bus.read(0x01FE), 0x02);
        assert_eq!(bus.read(0x01FD) & FLAG_INTERRUPT, 0);
    }

    #[test]
    fn test_nmi_preempts_irq_and_ignores_i_flag() {
        let (mut cpu, mut bus) = booted(&[0xEA]);
        bus.write(0xFFFA, 0x00);
        bus.write(0xFFFB, 0x50);

        cpu.set_registers(RegisterUpdate {
            p: Some(0x20),
            ..RegisterUpdate::default()
        });
        cpu.trigger_irq();
        cpu.trigger_nmi();

        assert_eq!(cpu.step(&mut bus), INTERRUPT_CYCLES);
        assert_eq!(cpu.pc(), 0x5000);
        assert!(!cpu.is_nmi_pending());
        assert!(cpu.is_irq_pending());
    }

    #[test]
    fn test_brk_and_rti() {
        let (mut cpu, mut bus) = booted(&[0x00, 0xFF, 0xEA]);
        bus.write(0xFFFE, 0x00);
        bus.write(0xFFFF, 0x40);
        bus.write(0x4000, 0x40); // RTI

        assert_eq!(cpu.step(&mut bus), 7);
        assert_eq!(bus.read(0x01FD) & FLAG_BREAK, FLAG_BREAK);
        assert_eq!(cpu.step(&mut bus), 6);
        assert_eq!(cpu.pc(), 0x0202);
        assert_eq!(cpu.registers().sp, 0xFF);
    }

    #[test]
    fn test_unknown_opcode_takes_two_cycles() {
        let (mut cpu, mut bus) = booted(&[0x02]);
        assert_eq!(cpu.step(&mut bus), 2);
        assert_eq!(cpu.pc(), 0x0201);
    }

    #[test]
    fn test_partial_register_update() {
        let (mut cpu, _) = booted(&[]);
        cpu.set_registers(RegisterUpdate {
            x: Some(0x11),
            sp: Some(0x80),
            ..RegisterUpdate::default()
        });
        cpu.set_registers(RegisterUpdate::pc(0x1234));

        let regs = cpu.registers();
        assert_eq!(regs.x, 0x11);
        assert_eq!(regs.sp, 0x80);
        assert_eq!(regs.pc, 0x1234);
        assert_eq!(regs.a, 0x00);
    }

    #[test]
    fn test_reset_keeps_breakpoints() {
        let (mut cpu, mut bus) = booted(&[]);
        cpu.set_breakpoint(0x0200);
        cpu.trigger_nmi();
        cpu.reset(&mut bus);

        assert!(cpu.has_breakpoint(0x0200));
        assert!(!cpu.is_nmi_pending());
        assert_eq!(cpu.step(&mut bus), 0);
    }
}
