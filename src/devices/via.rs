//! VIA (W65C22) Versatile Interface Adapter emulation.
//!
//! Each VIA provides:
//! - Two 8-bit I/O ports (A and B) with per-bit data direction
//! - Timer 1: 16-bit countdown with latch, one-shot or free-running
//! - Timer 2: 16-bit one-shot countdown
//! - Shift register and handshake control (stored, not clocked)
//! - Interrupt flag and enable registers

use super::Device;
use bitflags::bitflags;
use std::any::Any;
use std::cell::Cell;

/// VIA register count.
pub const VIA_REGISTER_COUNT: usize = 16;

/// Port B data.
pub const REG_ORB: u16 = 0x00;
/// Port A data.
pub const REG_ORA: u16 = 0x01;
/// Port B data direction.
pub const REG_DDRB: u16 = 0x02;
/// Port A data direction.
pub const REG_DDRA: u16 = 0x03;
/// Timer 1 counter low (read) / latch low (write).
pub const REG_T1C_L: u16 = 0x04;
/// Timer 1 counter high; writing starts Timer 1.
pub const REG_T1C_H: u16 = 0x05;
/// Timer 1 latch low.
pub const REG_T1L_L: u16 = 0x06;
/// Timer 1 latch high; writing restarts Timer 1.
pub const REG_T1L_H: u16 = 0x07;
/// Timer 2 counter low (read) / latch low (write).
pub const REG_T2C_L: u16 = 0x08;
/// Timer 2 counter high; writing starts Timer 2.
pub const REG_T2C_H: u16 = 0x09;
/// Shift register.
pub const REG_SR: u16 = 0x0A;
/// Auxiliary control register.
pub const REG_ACR: u16 = 0x0B;
/// Peripheral control register.
pub const REG_PCR: u16 = 0x0C;
/// Interrupt flag register.
pub const REG_IFR: u16 = 0x0D;
/// Interrupt enable register.
pub const REG_IER: u16 = 0x0E;
/// Port A data without handshake.
pub const REG_ORA_NH: u16 = 0x0F;

/// ACR bit selecting free-running Timer 1.
pub const ACR_T1_CONTINUOUS: u8 = 0x40;

bitflags! {
    /// Bits of the interrupt flag and interrupt enable registers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ViaInterrupt: u8 {
        /// CA2 active edge
        const CA2 = 0x01;
        /// CA1 active edge
        const CA1 = 0x02;
        /// Shift register complete
        const SHIFT = 0x04;
        /// CB2 active edge
        const CB2 = 0x08;
        /// CB1 active edge
        const CB1 = 0x10;
        /// Timer 2 time-out
        const TIMER2 = 0x20;
        /// Timer 1 time-out
        const TIMER1 = 0x40;
        /// Any enabled flag set (IFR) / set-clear select (IER write)
        const ANY = 0x80;
    }
}

impl ViaInterrupt {
    /// The seven real interrupt sources, without bit 7.
    pub const SOURCES: Self = Self::from_bits_truncate(0x7F);
}

/// VIA I/O port state.
#[derive(Debug, Clone, Default)]
pub struct ViaPort {
    /// Output register.
    pub data: u8,
    /// Data direction register (0=input, 1=output).
    pub ddr: u8,
}

impl ViaPort {
    /// Create a new port with all pins as input.
    pub fn new() -> Self {
        Self { data: 0, ddr: 0 }
    }

    /// Store `value` into the output bits only.
    #[inline]
    pub fn write(&mut self, value: u8) {
        self.data = (self.data & !self.ddr) | (value & self.ddr);
    }
}

/// VIA countdown timer.
#[derive(Debug, Clone, Default)]
pub struct ViaTimer {
    /// Current countdown value.
    pub counter: u16,
    /// Reload latch value.
    pub latch: u16,
    /// Timer is counting.
    pub running: bool,
}

impl ViaTimer {
    /// Restart the counter from the latch.
    pub fn start(&mut self) {
        self.counter = self.latch;
        self.running = true;
    }

    /// Count down by `cycles`.
    ///
    /// Returns true if the timer reached zero. A free-running timer reloads
    /// from its latch; otherwise it stops at zero.
    pub fn advance(&mut self, cycles: u32, continuous: bool) -> bool {
        if !self.running {
            return false;
        }

        let remaining = i64::from(self.counter) - i64::from(cycles);
        if remaining > 0 {
            self.counter = remaining as u16;
            return false;
        }

        if continuous {
            self.counter = self.latch;
        } else {
            self.counter = 0;
            self.running = false;
        }
        true
    }

    fn set_latch_low(&mut self, value: u8) {
        self.latch = (self.latch & 0xFF00) | u16::from(value);
    }

    fn set_latch_high(&mut self, value: u8) {
        self.latch = (self.latch & 0x00FF) | (u16::from(value) << 8);
    }
}

/// W65C22 Versatile Interface Adapter.
///
/// ## Register Map
///
/// | Offset | Register | Offset | Register |
/// |--------|----------|--------|----------|
/// | 0x00 | Port B data | 0x08 | T2 counter low |
/// | 0x01 | Port A data | 0x09 | T2 counter high (starts T2) |
/// | 0x02 | DDRB | 0x0A | Shift register |
/// | 0x03 | DDRA | 0x0B | Auxiliary control |
/// | 0x04 | T1 counter low | 0x0C | Peripheral control |
/// | 0x05 | T1 counter high (starts T1) | 0x0D | Interrupt flags |
/// | 0x06 | T1 latch low | 0x0E | Interrupt enable |
/// | 0x07 | T1 latch high | 0x0F | Port A data (no handshake) |
///
/// Port reads return the output register as-is; external pin levels are not
/// modeled. The shift register, ACR (apart from Timer 1 mode) and PCR are
/// stored verbatim without shift clocking or CA/CB handshake pulses.
///
/// # Example
///
/// ```rust
/// use homebrew6502::{Device, Via6522, ViaInterrupt};
///
/// let mut via = Via6522::new();
/// via.write(0x0E, 0xC0); // enable Timer 1 interrupt
/// via.set_timer1(100);
///
/// via.tick(100);
/// assert!(via.interrupt_flags().contains(ViaInterrupt::TIMER1));
/// assert!(via.has_interrupt());
///
/// via.read(0x04); // reading T1 low acknowledges
/// assert!(!via.has_interrupt());
/// ```
#[derive(Debug)]
pub struct Via6522 {
    /// I/O Port A.
    pub port_a: ViaPort,
    /// I/O Port B.
    pub port_b: ViaPort,

    /// Timer 1.
    pub timer1: ViaTimer,
    /// Timer 2 (one-shot only).
    pub timer2: ViaTimer,

    /// Shift register.
    pub sr: u8,
    /// Auxiliary control register.
    acr: u8,
    /// Peripheral control register.
    pcr: u8,

    /// Interrupt flags. Reading a timer's low counter byte clears its flag.
    ifr: Cell<ViaInterrupt>,
    /// Interrupt enables.
    ier: ViaInterrupt,
}

impl Via6522 {
    /// Create a new VIA in power-on state.
    pub fn new() -> Self {
        Self {
            port_a: ViaPort::new(),
            port_b: ViaPort::new(),
            timer1: ViaTimer::default(),
            timer2: ViaTimer::default(),
            sr: 0,
            acr: 0,
            pcr: 0,
            ifr: Cell::new(ViaInterrupt::empty()),
            ier: ViaInterrupt::empty(),
        }
    }

    /// Reset the VIA to power-on state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Set the Port A data direction register.
    pub fn set_port_a_direction(&mut self, ddr: u8) {
        self.port_a.ddr = ddr;
    }

    /// Set the Port B data direction register.
    pub fn set_port_b_direction(&mut self, ddr: u8) {
        self.port_b.ddr = ddr;
    }

    /// Drive the output bits of Port A.
    pub fn write_port_a(&mut self, value: u8) {
        self.port_a.write(value);
    }

    /// Drive the output bits of Port B.
    pub fn write_port_b(&mut self, value: u8) {
        self.port_b.write(value);
    }

    /// Port A output register.
    pub fn read_port_a(&self) -> u8 {
        self.port_a.data
    }

    /// Port B output register.
    pub fn read_port_b(&self) -> u8 {
        self.port_b.data
    }

    /// Load Timer 1's latch with `count` and start it.
    pub fn set_timer1(&mut self, count: u16) {
        self.timer1.latch = count;
        self.timer1.start();
        self.clear_flags(ViaInterrupt::TIMER1);
    }

    /// Start Timer 2 counting down from `count`.
    pub fn set_timer2(&mut self, count: u16) {
        self.timer2.latch = count;
        self.timer2.start();
        self.clear_flags(ViaInterrupt::TIMER2);
    }

    /// Whether Timer 1 free-runs (ACR bit 6).
    pub fn timer1_continuous(&self) -> bool {
        self.acr & ACR_T1_CONTINUOUS != 0
    }

    /// Auxiliary control register.
    pub fn acr(&self) -> u8 {
        self.acr
    }

    /// Peripheral control register.
    pub fn pcr(&self) -> u8 {
        self.pcr
    }

    /// Raised interrupt flags (bit 7 excluded).
    pub fn interrupt_flags(&self) -> ViaInterrupt {
        self.ifr.get()
    }

    /// Enabled interrupt sources (bit 7 excluded).
    pub fn interrupt_enable(&self) -> ViaInterrupt {
        self.ier
    }

    fn set_flags(&self, flags: ViaInterrupt) {
        self.ifr.set(self.ifr.get() | flags);
    }

    fn clear_flags(&self, flags: ViaInterrupt) {
        self.ifr.set(self.ifr.get() - flags);
    }

    fn ifr_value(&self) -> u8 {
        let flags = self.ifr.get();
        if flags.intersects(self.ier) {
            (flags | ViaInterrupt::ANY).bits()
        } else {
            flags.bits()
        }
    }

    /// Get all VIA registers as a 16-byte array.
    ///
    /// Unlike `Device::read`, this does not acknowledge timer interrupts.
    pub fn registers(&self) -> [u8; VIA_REGISTER_COUNT] {
        let mut regs = [0u8; VIA_REGISTER_COUNT];

        regs[REG_ORB as usize] = self.port_b.data;
        regs[REG_ORA as usize] = self.port_a.data;
        regs[REG_DDRB as usize] = self.port_b.ddr;
        regs[REG_DDRA as usize] = self.port_a.ddr;
        regs[REG_T1C_L as usize] = (self.timer1.counter & 0xFF) as u8;
        regs[REG_T1C_H as usize] = (self.timer1.counter >> 8) as u8;
        regs[REG_T1L_L as usize] = (self.timer1.latch & 0xFF) as u8;
        regs[REG_T1L_H as usize] = (self.timer1.latch >> 8) as u8;
        regs[REG_T2C_L as usize] = (self.timer2.counter & 0xFF) as u8;
        regs[REG_T2C_H as usize] = (self.timer2.counter >> 8) as u8;
        regs[REG_SR as usize] = self.sr;
        regs[REG_ACR as usize] = self.acr;
        regs[REG_PCR as usize] = self.pcr;
        regs[REG_IFR as usize] = self.ifr_value();
        regs[REG_IER as usize] = (self.ier | ViaInterrupt::ANY).bits();
        regs[REG_ORA_NH as usize] = self.port_a.data;

        regs
    }
}

impl Default for Via6522 {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for Via6522 {
    fn read(&self, offset: u16) -> u8 {
        match offset {
            REG_ORB => self.port_b.data,
            REG_ORA | REG_ORA_NH => self.port_a.data,
            REG_DDRB => self.port_b.ddr,
            REG_DDRA => self.port_a.ddr,
            // Reading the low counter byte acknowledges the timer
            REG_T1C_L => {
                self.clear_flags(ViaInterrupt::TIMER1);
                (self.timer1.counter & 0xFF) as u8
            }
            REG_T1C_H => (self.timer1.counter >> 8) as u8,
            REG_T1L_L => (self.timer1.latch & 0xFF) as u8,
            REG_T1L_H => (self.timer1.latch >> 8) as u8,
            REG_T2C_L => {
                self.clear_flags(ViaInterrupt::TIMER2);
                (self.timer2.counter & 0xFF) as u8
            }
            REG_T2C_H => (self.timer2.counter >> 8) as u8,
            REG_SR => self.sr,
            REG_ACR => self.acr,
            REG_PCR => self.pcr,
            REG_IFR => self.ifr_value(),
            REG_IER => (self.ier | ViaInterrupt::ANY).bits(),
            _ => {
                log::trace!("VIA read from undefined offset {}", offset);
                0xFF
            }
        }
    }

    fn write(&mut self, offset: u16, value: u8) {
        match offset {
            REG_ORB => self.port_b.write(value),
            REG_ORA | REG_ORA_NH => self.port_a.write(value),
            REG_DDRB => self.port_b.ddr = value,
            REG_DDRA => self.port_a.ddr = value,
            REG_T1C_L | REG_T1L_L => self.timer1.set_latch_low(value),
            // Writing either high byte transfers the latch and restarts T1
            REG_T1C_H | REG_T1L_H => {
                self.timer1.set_latch_high(value);
                self.timer1.start();
                self.clear_flags(ViaInterrupt::TIMER1);
            }
            REG_T2C_L => self.timer2.set_latch_low(value),
            REG_T2C_H => {
                self.timer2.set_latch_high(value);
                self.timer2.start();
                self.clear_flags(ViaInterrupt::TIMER2);
            }
            REG_SR => self.sr = value,
            REG_ACR => self.acr = value,
            REG_PCR => self.pcr = value,
            // Write-one-to-clear
            REG_IFR => {
                self.clear_flags(ViaInterrupt::from_bits_truncate(value) & ViaInterrupt::SOURCES)
            }
            REG_IER => {
                let bits = ViaInterrupt::from_bits_truncate(value) & ViaInterrupt::SOURCES;
                if value & ViaInterrupt::ANY.bits() != 0 {
                    self.ier |= bits;
                } else {
                    self.ier -= bits;
                }
            }
            _ => log::trace!("VIA write to undefined offset {}", offset),
        }
    }

    fn size(&self) -> u16 {
        VIA_REGISTER_COUNT as u16
    }

    fn reset(&mut self) {
        Via6522::reset(self);
    }

    fn tick(&mut self, cycles: u32) {
        if self.timer1.advance(cycles, self.timer1_continuous()) {
            log::trace!("VIA timer 1 expired");
            self.set_flags(ViaInterrupt::TIMER1);
        }
        if self.timer2.advance(cycles, false) {
            log::trace!("VIA timer 2 expired");
            self.set_flags(ViaInterrupt::TIMER2);
        }
    }

    fn has_interrupt(&self) -> bool {
        self.ifr.get().intersects(self.ier)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_direction_masks_writes() {
        let mut via = Via6522::new();

        via.set_port_a_direction(0xFF);
        via.write_port_a(0x5A);
        assert_eq!(via.read_port_a(), 0x5A);

        via.set_port_a_direction(0x00);
        via.write_port_a(0xFF);
        assert_eq!(via.read_port_a(), 0x5A);

        // Mixed direction: only the low nibble follows
        via.set_port_a_direction(0x0F);
        via.write(REG_ORA, 0xA5);
        assert_eq!(via.read(REG_ORA), 0x55);
    }

    #[test]
    fn test_port_a_no_handshake_alias() {
        let mut via = Via6522::new();
        via.write(REG_DDRA, 0xFF);
        via.write(REG_ORA_NH, 0x3C);
        assert_eq!(via.read(REG_ORA), 0x3C);
        assert_eq!(via.read(REG_ORA_NH), 0x3C);
    }

    #[test]
    fn test_port_b_via_registers() {
        let mut via = Via6522::new();
        via.write(REG_DDRB, 0xF0);
        via.write(REG_ORB, 0xFF);
        assert_eq!(via.read(REG_ORB), 0xF0);
        assert_eq!(via.read(REG_DDRB), 0xF0);
    }

    #[test]
    fn test_timer1_one_shot_stops() {
        let mut via = Via6522::new();
        via.set_timer1(10);

        via.tick(9);
        assert!(!via.interrupt_flags().contains(ViaInterrupt::TIMER1));
        assert_eq!(via.timer1.counter, 1);

        via.tick(1);
        assert!(via.interrupt_flags().contains(ViaInterrupt::TIMER1));
        assert!(!via.timer1.running);
        assert_eq!(via.timer1.counter, 0);
    }

    #[test]
    fn test_timer1_continuous_reloads() {
        let mut via = Via6522::new();
        via.write(REG_ACR, ACR_T1_CONTINUOUS);
        via.set_timer1(50);

        via.tick(50);
        assert!(via.interrupt_flags().contains(ViaInterrupt::TIMER1));
        assert!(via.timer1.running);
        assert_eq!(via.timer1.counter, 50);

        via.write(REG_IFR, ViaInterrupt::TIMER1.bits());
        via.tick(50);
        assert!(via.interrupt_flags().contains(ViaInterrupt::TIMER1));
    }

    #[test]
    fn test_timer1_started_by_register_writes() {
        let mut via = Via6522::new();
        via.write(REG_T1C_L, 0x34);
        assert!(!via.timer1.running);

        via.write(REG_T1C_H, 0x12);
        assert!(via.timer1.running);
        assert_eq!(via.timer1.counter, 0x1234);
        assert_eq!(via.read(REG_T1L_L), 0x34);
        assert_eq!(via.read(REG_T1L_H), 0x12);

        // Writing the latch high byte also restarts
        via.tick(0x200);
        via.write(REG_T1L_H, 0x00);
        assert_eq!(via.timer1.counter, 0x0034);
    }

    #[test]
    fn test_timer2_one_shot_never_reloads() {
        let mut via = Via6522::new();
        via.write(REG_ACR, ACR_T1_CONTINUOUS); // does not affect T2
        via.write(REG_T2C_L, 0x20);
        via.write(REG_T2C_H, 0x00);

        via.tick(0x20);
        assert!(via.interrupt_flags().contains(ViaInterrupt::TIMER2));
        assert!(!via.timer2.running);

        via.write(REG_IFR, 0x20);
        via.tick(0x100);
        assert!(!via.interrupt_flags().contains(ViaInterrupt::TIMER2));
    }

    #[test]
    fn test_low_counter_read_acknowledges() {
        let mut via = Via6522::new();
        via.set_timer1(1);
        via.set_timer2(1);
        via.tick(1);
        assert!(via
            .interrupt_flags()
            .contains(ViaInterrupt::TIMER1 | ViaInterrupt::TIMER2));

        via.read(REG_T1C_H);
        assert!(via.interrupt_flags().contains(ViaInterrupt::TIMER1));
        via.read(REG_T1C_L);
        assert!(!via.interrupt_flags().contains(ViaInterrupt::TIMER1));

        via.read(REG_T2C_L);
        assert!(via.interrupt_flags().is_empty());
    }

    #[test]
    fn test_ifr_bit7_synthesized_from_enables() {
        let mut via = Via6522::new();
        via.set_timer2(5);
        via.tick(5);

        // Flag raised but not enabled
        assert_eq!(via.read(REG_IFR), 0x20);
        assert!(!via.has_interrupt());

        via.write(REG_IER, 0x80 | 0x20);
        assert_eq!(via.read(REG_IFR), 0xA0);
        assert!(via.has_interrupt());
    }

    #[test]
    fn test_ier_set_and_clear_modes() {
        let mut via = Via6522::new();
        via.write(REG_IER, 0xE0);
        assert_eq!(
            via.interrupt_enable(),
            ViaInterrupt::TIMER1 | ViaInterrupt::TIMER2
        );
        assert_eq!(via.read(REG_IER), 0xE0);

        via.write(REG_IER, 0x40);
        assert_eq!(via.interrupt_enable(), ViaInterrupt::TIMER2);
        assert_eq!(via.read(REG_IER), 0xA0);
    }

    #[test]
    fn test_ifr_write_one_to_clear() {
        let mut via = Via6522::new();
        via.set_timer1(1);
        via.set_timer2(1);
        via.tick(1);

        via.write(REG_IFR, 0x40);
        assert_eq!(via.interrupt_flags(), ViaInterrupt::TIMER2);
    }

    #[test]
    fn test_control_registers_stored_inert() {
        let mut via = Via6522::new();
        via.write(REG_SR, 0x81);
        via.write(REG_PCR, 0xEE);
        via.tick(1000);

        assert_eq!(via.read(REG_SR), 0x81);
        assert_eq!(via.pcr(), 0xEE);
        assert!(via.interrupt_flags().is_empty());
    }

    #[test]
    fn test_registers_snapshot_has_no_side_effects() {
        let mut via = Via6522::new();
        via.set_timer1(3);
        via.tick(3);

        let regs = via.registers();
        assert_eq!(regs[REG_IFR as usize], 0x40);
        assert!(via.interrupt_flags().contains(ViaInterrupt::TIMER1));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut via = Via6522::new();
        via.write(REG_DDRA, 0xFF);
        via.write(REG_ORA, 0x12);
        via.write(REG_IER, 0xFF);
        via.set_timer1(1);
        via.tick(1);

        Device::reset(&mut via);

        assert_eq!(via.registers()[..REG_IER as usize], [0u8; 14]);
        assert!(!via.timer1.running);
        assert!(!via.has_interrupt());
    }

    #[test]
    fn test_undefined_offset() {
        let mut via = Via6522::new();
        assert_eq!(via.size(), 16);
        assert_eq!(via.read(0x10), 0xFF);
        via.write(0x10, 0x00);
    }
}
