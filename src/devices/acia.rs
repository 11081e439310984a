//! MC68B50 ACIA UART device implementation.
//!
//! Provides cycle-timed serial communication via two memory-mapped registers
//! and an optional [`SerialPort`] backend.

use super::Device;
use crate::serial::{SerialPort, DEFAULT_BAUD_RATE};
use bitflags::bitflags;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

/// Bus clock the bit timing is derived from (1 MHz).
pub const BUS_CLOCK_HZ: u64 = 1_000_000;

/// Bits per character on the wire: start + 8 data + stop.
pub const BITS_PER_CHARACTER: u32 = 10;

/// Unread bytes the receiver holds before it starts overrunning.
pub const RX_QUEUE_DEPTH: usize = 1;

/// Register offsets.
pub const REG_CONTROL_STATUS: u16 = 0;
/// Transmit (write) / receive (read) data register.
pub const REG_DATA: u16 = 1;

/// Counter divide select field, bits 1-0 of the control register.
pub const CONTROL_DIVIDE_MASK: u8 = 0x03;
/// Divide select value that triggers a master reset.
pub const CONTROL_MASTER_RESET: u8 = 0x03;
/// Word select field, bits 4-2.
pub const CONTROL_WORD_MASK: u8 = 0x1C;
/// Transmitter control field, bits 6-5.
pub const CONTROL_TX_MASK: u8 = 0x60;
/// Receiver interrupt enable, bit 7.
pub const CONTROL_RX_IRQ_ENABLE: u8 = 0x80;

bitflags! {
    /// ACIA status register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AciaStatus: u8 {
        /// Receive Data Register Full
        const RDRF = 0x01;
        /// Transmit Data Register Empty
        const TDRE = 0x02;
        /// Data Carrier Detect
        const DCD = 0x04;
        /// Clear To Send
        const CTS = 0x08;
        /// Framing Error
        const FE = 0x10;
        /// Receiver Overrun
        const OVRN = 0x20;
        /// Parity Error
        const PE = 0x40;
        /// Interrupt Request
        const IRQ = 0x80;
    }
}

/// Parity setting from the word select field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    /// No parity bit
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Character framing selected by control bits 4-2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordFormat {
    /// Data bits per character (7 or 8)
    pub data_bits: u8,
    /// Parity bit setting
    pub parity: Parity,
    /// Stop bits (1 or 2)
    pub stop_bits: u8,
}

impl WordFormat {
    /// Decode the word select field of a control byte.
    pub fn from_control(control: u8) -> Self {
        let (data_bits, parity, stop_bits) = match (control & CONTROL_WORD_MASK) >> 2 {
            0b000 => (7, Parity::Even, 2),
            0b001 => (7, Parity::Odd, 2),
            0b010 => (7, Parity::Even, 1),
            0b011 => (7, Parity::Odd, 1),
            0b100 => (8, Parity::None, 2),
            0b101 => (8, Parity::None, 1),
            0b110 => (8, Parity::Even, 1),
            _ => (8, Parity::Odd, 1),
        };
        Self {
            data_bits,
            parity,
            stop_bits,
        }
    }
}

/// RTS / transmit interrupt / break combination selected by control bits 6-5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitterControl {
    /// RTS low, transmit interrupt disabled
    RtsLowInterruptDisabled,
    /// RTS low, transmit interrupt enabled
    RtsLowInterruptEnabled,
    /// RTS high, transmit interrupt disabled
    RtsHighInterruptDisabled,
    /// RTS low, transmit interrupt disabled, break level on the line
    RtsLowBreak,
}

impl TransmitterControl {
    /// Decode the transmitter control field of a control byte.
    pub fn from_control(control: u8) -> Self {
        match (control & CONTROL_TX_MASK) >> 5 {
            0b00 => TransmitterControl::RtsLowInterruptDisabled,
            0b01 => TransmitterControl::RtsLowInterruptEnabled,
            0b10 => TransmitterControl::RtsHighInterruptDisabled,
            _ => TransmitterControl::RtsLowBreak,
        }
    }
}

/// MC68B50 Asynchronous Communications Interface Adapter.
///
/// ## Register Map (offsets from device base address)
///
/// | Offset | Read | Write |
/// |--------|------|-------|
/// | 0      | Status | Control |
/// | 1      | Receive Data | Transmit Data |
///
/// ## Control Register
///
/// | Bits | Field |
/// |------|-------|
/// | 1-0  | Counter divide: 00 = ÷1, 01 = ÷16, 10 = ÷64, 11 = master reset |
/// | 4-2  | Word select (data bits / parity / stop bits) |
/// | 6-5  | Transmitter control (RTS, transmit interrupt, break) |
/// | 7    | Receive interrupt enable |
///
/// ## Timing
///
/// The effective bit rate is the configured baud rate divided by the counter
/// ratio, clocked from a 1 MHz bus. One character costs ten bit times, counted
/// down by the cycles passed to [`Device::tick`].
///
/// - **Transmit**: Writing the data register while a character is in flight
///   is ignored. Otherwise TDRE clears until the character has been shifted
///   out to the bound port.
/// - **Receive**: When the port has data and nothing is being received, a
///   character starts shifting in. On completion it lands in the receive
///   register and RDRF sets. A second character completing before the first
///   is read is lost and sets OVRN.
///
/// # Example
///
/// ```rust
/// use homebrew6502::{Acia6850, AciaStatus, BufferedSerialPort, Device};
///
/// let port = BufferedSerialPort::new();
/// let mut acia = Acia6850::with_port(port.clone());
///
/// acia.write(0, 0x03); // master reset
/// acia.write(0, 0x15); // 8N1, ÷16
/// acia.write(1, b'A');
/// assert!(!acia.status().contains(AciaStatus::TDRE));
///
/// acia.tick(acia.character_cycles());
/// assert_eq!(port.transmitted(), vec![b'A']);
/// assert!(acia.status().contains(AciaStatus::TDRE));
/// ```
pub struct Acia6850 {
    control: u8,

    // Transmit side: the byte being shifted out and the cycles left
    tx_shift: Option<u8>,
    tx_countdown: u32,

    // Receive side
    rx_shift: Option<u8>,
    rx_countdown: u32,
    rx_queue: RefCell<VecDeque<u8>>,
    rx_data: Cell<u8>,

    // FE / OVRN / PE / IRQ
    latched: Cell<AciaStatus>,

    port: Option<Box<dyn SerialPort>>,
    baud_rate: u32,
    cycles_per_bit: u32,
}

impl Acia6850 {
    /// Create an ACIA with no port attached, at the default baud rate.
    pub fn new() -> Self {
        let mut acia = Self {
            control: 0x00,
            tx_shift: None,
            tx_countdown: 0,
            rx_shift: None,
            rx_countdown: 0,
            rx_queue: RefCell::new(VecDeque::with_capacity(RX_QUEUE_DEPTH)),
            rx_data: Cell::new(0x00),
            latched: Cell::new(AciaStatus::empty()),
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            cycles_per_bit: 1,
        };
        acia.recompute_timing();
        acia
    }

    /// Create an ACIA bound to `port`.
    pub fn with_port<P: SerialPort + 'static>(port: P) -> Self {
        let mut acia = Self::new();
        acia.attach_port(Box::new(port));
        acia
    }

    /// Bind a serial port, replacing any existing one.
    pub fn attach_port(&mut self, mut port: Box<dyn SerialPort>) {
        port.set_baud_rate(self.baud_rate);
        self.port = Some(port);
    }

    /// Unbind and return the serial port.
    pub fn detach_port(&mut self) -> Option<Box<dyn SerialPort>> {
        self.port.take()
    }

    /// Whether a serial port is bound.
    pub fn has_port(&self) -> bool {
        self.port.is_some()
    }

    /// Set the line rate before division and forward it to the port.
    pub fn set_baud_rate(&mut self, rate: u32) {
        self.baud_rate = rate;
        self.recompute_timing();
        if let Some(port) = self.port.as_mut() {
            port.set_baud_rate(rate);
        }
    }

    /// Configured line rate before division.
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Counter divide ratio from control bits 1-0.
    pub fn divide_ratio(&self) -> u32 {
        match self.control & CONTROL_DIVIDE_MASK {
            0b01 => 16,
            0b10 => 64,
            _ => 1,
        }
    }

    /// Bus cycles per bit at the current baud rate and divide ratio.
    pub fn cycles_per_bit(&self) -> u32 {
        self.cycles_per_bit
    }

    /// Bus cycles needed to move one character.
    pub fn character_cycles(&self) -> u32 {
        self.cycles_per_bit.saturating_mul(BITS_PER_CHARACTER)
    }

    /// Raw control register.
    pub fn control(&self) -> u8 {
        self.control
    }

    /// Character framing currently selected.
    pub fn word_format(&self) -> WordFormat {
        WordFormat::from_control(self.control)
    }

    /// Transmitter control currently selected.
    pub fn transmitter_control(&self) -> TransmitterControl {
        TransmitterControl::from_control(self.control)
    }

    /// Number of received bytes waiting to be read.
    pub fn rx_queue_len(&self) -> usize {
        self.rx_queue.borrow().len()
    }

    /// Whether a character is still being shifted out.
    pub fn is_transmitting(&self) -> bool {
        self.tx_shift.is_some()
    }

    /// Whether a character is being shifted in.
    pub fn is_receiving(&self) -> bool {
        self.rx_shift.is_some()
    }

    /// Current status register, without side effects.
    pub fn status(&self) -> AciaStatus {
        let mut status = self.latched.get();
        if !self.rx_queue.borrow().is_empty() {
            status |= AciaStatus::RDRF;
        }
        if self.tx_shift.is_none() {
            status |= AciaStatus::TDRE;
        }
        if self.port.as_ref().is_some_and(|port| port.is_ready()) {
            status |= AciaStatus::DCD | AciaStatus::CTS;
        }
        status
    }

    /// Return every register, buffer and counter to power-on state.
    ///
    /// The port binding and configured baud rate survive.
    pub fn reset(&mut self) {
        self.control = 0x00;
        self.tx_shift = None;
        self.tx_countdown = 0;
        self.rx_shift = None;
        self.rx_countdown = 0;
        self.rx_queue.borrow_mut().clear();
        self.rx_data.set(0x00);
        self.latched.set(AciaStatus::empty());
        self.recompute_timing();
    }

    fn recompute_timing(&mut self) {
        let divide = self.divide_ratio() as u64;
        let baud = self.baud_rate.max(1) as u64;
        // floor(1 MHz / (baud / divide))
        let cycles = (BUS_CLOCK_HZ * divide / baud).max(1);
        self.cycles_per_bit = u32::try_from(cycles).unwrap_or(u32::MAX);
    }

    /// Write to the control register, handling master reset.
    fn write_control(&mut self, value: u8) {
        if value & CONTROL_DIVIDE_MASK == CONTROL_MASTER_RESET {
            log::debug!("ACIA master reset");
            self.reset();
            return;
        }
        self.control = value;
        self.recompute_timing();
        self.update_interrupt();
    }

    /// Write to the transmit data register.
    fn write_data(&mut self, value: u8) {
        if self.tx_shift.is_some() {
            log::debug!("ACIA busy, dropping transmit of ${:02X}", value);
            return;
        }
        self.tx_shift = Some(value);
        self.tx_countdown = self.character_cycles();
        self.update_interrupt();
    }

    /// Pop one byte from the receive queue.
    fn read_data(&self) -> u8 {
        if let Some(byte) = self.rx_queue.borrow_mut().pop_front() {
            self.rx_data.set(byte);
        }
        self.update_interrupt();
        self.rx_data.get()
    }

    fn finish_transmit(&mut self) {
        if let Some(byte) = self.tx_shift.take() {
            log::trace!("ACIA transmitted ${:02X}", byte);
            if let Some(port) = self.port.as_mut() {
                port.write(byte);
            }
        }
    }

    fn finish_receive(&mut self) {
        if let Some(byte) = self.rx_shift.take() {
            let mut queue = self.rx_queue.borrow_mut();
            if queue.len() >= RX_QUEUE_DEPTH {
                log::debug!("ACIA overrun, ${:02X} lost", byte);
                self.latched.set(self.latched.get() | AciaStatus::OVRN);
            } else {
                log::trace!("ACIA received ${:02X}", byte);
                queue.push_back(byte);
            }
        }
    }

    fn start_receive(&mut self) {
        let Some(port) = self.port.as_mut() else {
            return;
        };
        if !port.has_data() {
            return;
        }
        if let Some(byte) = port.read() {
            self.rx_shift = Some(byte);
            self.rx_countdown = self.cycles_per_bit.saturating_mul(BITS_PER_CHARACTER);
        }
    }

    fn interrupt_condition(&self) -> bool {
        let status = self.status();
        let rx_irq = self.control & CONTROL_RX_IRQ_ENABLE != 0 && status.contains(AciaStatus::RDRF);
        let tx_irq = self.transmitter_control() == TransmitterControl::RtsLowInterruptEnabled
            && status.contains(AciaStatus::TDRE);
        rx_irq || tx_irq
    }

    /// Make the IRQ bit follow the interrupt condition.
    fn update_interrupt(&self) {
        let mut latched = self.latched.get();
        latched.set(AciaStatus::IRQ, self.interrupt_condition());
        self.latched.set(latched);
    }
}

impl Default for Acia6850 {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for Acia6850 {
    fn read(&self, offset: u16) -> u8 {
        match offset {
            REG_CONTROL_STATUS => self.status().bits(),
            REG_DATA => self.read_data(),
            _ => {
                log::trace!("ACIA read from undefined offset {}", offset);
                0xFF
            }
        }
    }

    fn write(&mut self, offset: u16, value: u8) {
        match offset {
            REG_CONTROL_STATUS => self.write_control(value),
            REG_DATA => self.write_data(value),
            _ => log::trace!("ACIA write to undefined offset {}", offset),
        }
    }

    fn size(&self) -> u16 {
        2
    }

    fn reset(&mut self) {
        Acia6850::reset(self);
    }

    fn tick(&mut self, cycles: u32) {
        if self.tx_shift.is_some() {
            self.tx_countdown = self.tx_countdown.saturating_sub(cycles);
            if self.tx_countdown == 0 {
                self.finish_transmit();
            }
        }

        if self.rx_shift.is_some() {
            self.rx_countdown = self.rx_countdown.saturating_sub(cycles);
            if self.rx_countdown == 0 {
                self.finish_receive();
            }
        }

        if self.rx_shift.is_none() {
            self.start_receive();
        }

        self.update_interrupt();
    }

    fn has_interrupt(&self) -> bool {
        self.latched.get().contains(AciaStatus::IRQ)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
