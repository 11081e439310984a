//! Serial port backends for the ACIA.
//!
//! The ACIA never blocks on its port. It polls `has_data`/`is_ready` once per
//! tick, so a slow or absent port simply reads as "no data" / "not ready".
//!
//! Three backends are provided:
//!
//! - [`BufferedSerialPort`]: in-memory queues, shared between clones so tests
//!   can inspect traffic after handing the port to the ACIA
//! - [`ConsoleSerialPort`]: writes transmitted bytes to any `io::Write`
//!   (stdout by default) and receives bytes pushed in with `feed`
//! - [`NullSerialPort`]: never ready, never has data

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Write};
use std::rc::Rc;

/// Default line rate for ports that have not been configured.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Byte-oriented, polled serial line.
pub trait SerialPort {
    /// Send one byte down the line.
    fn write(&mut self, byte: u8);

    /// Take the next received byte, if any.
    fn read(&mut self) -> Option<u8>;

    /// Whether a received byte is waiting.
    fn has_data(&self) -> bool;

    /// Whether the far end is ready (drives the ACIA's CTS/DCD bits).
    fn is_ready(&self) -> bool;

    /// Change the line rate.
    fn set_baud_rate(&mut self, rate: u32);

    /// Shut the port down; afterwards it is no longer ready.
    fn close(&mut self);
}

#[derive(Debug)]
struct BufferedState {
    input: VecDeque<u8>,
    output: Vec<u8>,
    ready: bool,
    baud_rate: u32,
}

/// In-memory serial port.
///
/// Cloning yields another handle onto the same buffers.
///
/// # Example
///
/// ```rust
/// use homebrew6502::{BufferedSerialPort, SerialPort};
///
/// let port = BufferedSerialPort::new();
/// let mut line = port.clone();
///
/// line.write(b'A');
/// assert_eq!(port.transmitted(), vec![b'A']);
///
/// port.push_input(b"hi");
/// assert_eq!(line.read(), Some(b'h'));
/// ```
#[derive(Debug, Clone)]
pub struct BufferedSerialPort {
    state: Rc<RefCell<BufferedState>>,
}

impl BufferedSerialPort {
    /// Create an empty, ready port.
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(BufferedState {
                input: VecDeque::new(),
                output: Vec::new(),
                ready: true,
                baud_rate: DEFAULT_BAUD_RATE,
            })),
        }
    }

    /// Queue bytes for the ACIA to receive.
    pub fn push_input(&self, bytes: &[u8]) {
        self.state.borrow_mut().input.extend(bytes.iter().copied());
    }

    /// Every byte written to the port so far.
    pub fn transmitted(&self) -> Vec<u8> {
        self.state.borrow().output.clone()
    }

    /// Drain and return the transmitted bytes.
    pub fn take_transmitted(&self) -> Vec<u8> {
        std::mem::take(&mut self.state.borrow_mut().output)
    }

    /// Number of received bytes not yet read.
    pub fn pending_input(&self) -> usize {
        self.state.borrow().input.len()
    }

    /// Force the readiness line.
    pub fn set_ready(&self, ready: bool) {
        self.state.borrow_mut().ready = ready;
    }

    /// Line rate last configured.
    pub fn baud_rate(&self) -> u32 {
        self.state.borrow().baud_rate
    }
}

impl Default for BufferedSerialPort {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialPort for BufferedSerialPort {
    fn write(&mut self, byte: u8) {
        self.state.borrow_mut().output.push(byte);
    }

    fn read(&mut self) -> Option<u8> {
        self.state.borrow_mut().input.pop_front()
    }

    fn has_data(&self) -> bool {
        !self.state.borrow().input.is_empty()
    }

    fn is_ready(&self) -> bool {
        self.state.borrow().ready
    }

    fn set_baud_rate(&mut self, rate: u32) {
        self.state.borrow_mut().baud_rate = rate;
    }

    fn close(&mut self) {
        self.state.borrow_mut().ready = false;
    }
}

/// Serial port that prints to a writer.
///
/// Input is not read from a terminal here; the host pushes received bytes
/// with [`ConsoleSerialPort::feed`] so the emulation never waits on stdin.
pub struct ConsoleSerialPort<W: Write = io::Stdout> {
    writer: W,
    input: VecDeque<u8>,
    open: bool,
    baud_rate: u32,
}

impl ConsoleSerialPort<io::Stdout> {
    /// Console port on standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsoleSerialPort<W> {
    /// Console port on an arbitrary writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            input: VecDeque::new(),
            open: true,
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }

    /// Hand bytes typed by the user to the port.
    pub fn feed(&mut self, bytes: &[u8]) {
        if self.open {
            self.input.extend(bytes.iter().copied());
        }
    }

    /// Borrow the underlying writer.
    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Line rate last configured.
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

impl<W: Write> SerialPort for ConsoleSerialPort<W> {
    fn write(&mut self, byte: u8) {
        if !self.open {
            return;
        }
        if let Err(err) = self
            .writer
            .write_all(&[byte])
            .and_then(|()| self.writer.flush())
        {
            log::warn!("Console serial write failed: {}", err);
        }
    }

    fn read(&mut self) -> Option<u8> {
        self.input.pop_front()
    }

    fn has_data(&self) -> bool {
        !self.input.is_empty()
    }

    fn is_ready(&self) -> bool {
        self.open
    }

    fn set_baud_rate(&mut self, rate: u32) {
        self.baud_rate = rate;
    }

    fn close(&mut self) {
        self.open = false;
        self.input.clear();
    }
}

/// Port with nothing attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSerialPort;

impl SerialPort for NullSerialPort {
    fn write(&mut self, _byte: u8) {}

    fn read(&mut self) -> Option<u8> {
        None
    }

    fn has_data(&self) -> bool {
        false
    }

    fn is_ready(&self) -> bool {
        false
    }

    fn set_baud_rate(&mut self, _rate: u32) {}

    fn close(&mut self) {}
}
