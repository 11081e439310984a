//! WASM API for the homebrew machine.
//!
//! Provides JavaScript-callable interfaces for running the machine,
//! inspecting CPU state and exchanging bytes with the ACIA.

use crate::system::ACIA_NAME;
use crate::{
    Acia6850, AciaStatus, BasicCpu, BufferedSerialPort, CpuEngine, MemoryBus, RegisterUpdate,
    RomConfig, StepOutcome, System, SystemConfig,
};
use wasm_bindgen::prelude::*;

/// JavaScript-compatible error wrapper
#[wasm_bindgen]
#[derive(Debug, Clone)]
pub struct JsError {
    message: String,
}

#[wasm_bindgen]
impl JsError {
    #[wasm_bindgen(constructor)]
    pub fn new(message: &str) -> JsError {
        JsError {
            message: message.to_string(),
        }
    }

    #[wasm_bindgen(getter)]
    pub fn message(&self) -> String {
        self.message.clone()
    }
}

impl From<crate::BusError> for JsError {
    fn from(err: crate::BusError) -> Self {
        JsError::new(&err.to_string())
    }
}

/// Default boot image: 16KB of NOPs at $C000 with the reset vector at $0600.
fn boot_rom() -> RomConfig {
    let mut data = vec![0xEA; 0x4000];
    data[0x3FFC] = 0x00;
    data[0x3FFD] = 0x06;
    RomConfig {
        start: 0xC000,
        data,
    }
}

/// Main emulator interface for JavaScript
#[wasm_bindgen]
pub struct HomebrewEmulator {
    system: System<BasicCpu>,
    port: BufferedSerialPort,
    on_transmit: js_sys::Function,
}

#[wasm_bindgen]
impl HomebrewEmulator {
    /// Create a machine with 32KB RAM, the ACIA at $8000, the VIA at $8010
    /// and a 16KB boot ROM at $C000.
    ///
    /// `on_transmit` is called with each character the ACIA sends.
    #[wasm_bindgen(constructor)]
    pub fn new(on_transmit: js_sys::Function) -> Result<HomebrewEmulator, JsError> {
        let config = SystemConfig {
            rom: Some(boot_rom()),
            ..SystemConfig::default()
        };
        let port = BufferedSerialPort::new();
        let system = System::from_config(&config, BasicCpu::new(), Some(Box::new(port.clone())))?;

        Ok(HomebrewEmulator {
            system,
            port,
            on_transmit,
        })
    }

    /// Replace the ROM image at `start`.
    pub fn load_rom(&mut self, data: Vec<u8>, start: u16) -> Result<(), JsError> {
        self.system.bus_mut().load_rom(data, start)?;
        Ok(())
    }

    /// Load a program into memory and set PC
    pub fn load_program(&mut self, program: &[u8], start_addr: u16) {
        self.system.load_program(start_addr, program);
        self.system.set_registers(RegisterUpdate::pc(start_addr));
    }

    /// Execute a single instruction. Returns 0 when parked on a breakpoint.
    pub fn step(&mut self) -> u32 {
        let cycles = match self.system.step() {
            StepOutcome::Executed { cycles } => cycles,
            StepOutcome::Breakpoint => 0,
        };
        self.flush_transmit();
        cycles
    }

    /// Execute up to `max_steps` instructions and return how many ran.
    pub fn run(&mut self, max_steps: u32) -> u32 {
        let report = self.system.run(max_steps as usize);
        self.flush_transmit();
        report.steps as u32
    }

    /// Execute at least `cycles` cycles and return the actual count.
    pub fn run_for_cycles(&mut self, cycles: u32) -> u32 {
        let report = self.system.run_cycles(cycles as u64);
        self.flush_transmit();
        report.cycles as u32
    }

    /// Reset RAM, peripherals and the CPU.
    pub fn reset(&mut self) {
        self.system.reset();
        self.port.take_transmitted();
    }

    /// Queue a byte from the terminal for the ACIA to receive
    pub fn receive_byte(&mut self, byte: u8) {
        self.port.push_input(&[byte]);
    }

    /// True if the ACIA is asserting its interrupt output.
    #[wasm_bindgen(getter)]
    pub fn acia_irq(&self) -> bool {
        self.system
            .peripheral::<Acia6850>(ACIA_NAME)
            .is_some_and(|acia| acia.status().contains(AciaStatus::IRQ))
    }

    // Memory access methods

    /// Read a single byte from memory
    pub fn read_memory(&self, addr: u16) -> u8 {
        self.system.bus().read(addr)
    }

    /// Write a single byte to memory
    pub fn write_memory(&mut self, addr: u16, value: u8) {
        self.system.bus_mut().write(addr, value);
    }

    /// Read a 256-byte page from memory (for efficient display)
    pub fn get_memory_page(&self, page: u8) -> Vec<u8> {
        let start = (page as u16) << 8;
        (0..256)
            .map(|i| self.system.bus().read(start + i))
            .collect()
    }

    // Breakpoints

    pub fn set_breakpoint(&mut self, addr: u16) {
        self.system.cpu_mut().set_breakpoint(addr);
    }

    pub fn remove_breakpoint(&mut self, addr: u16) {
        self.system.cpu_mut().remove_breakpoint(addr);
    }

    // Register getters
    #[wasm_bindgen(getter)]
    pub fn a(&self) -> u8 {
        self.system.registers().a
    }

    #[wasm_bindgen(getter)]
    pub fn x(&self) -> u8 {
        self.system.registers().x
    }

    #[wasm_bindgen(getter)]
    pub fn y(&self) -> u8 {
        self.system.registers().y
    }

    #[wasm_bindgen(getter)]
    pub fn pc(&self) -> u16 {
        self.system.registers().pc
    }

    #[wasm_bindgen(getter)]
    pub fn sp(&self) -> u8 {
        self.system.registers().sp
    }

    #[wasm_bindgen(getter)]
    pub fn status(&self) -> u8 {
        self.system.registers().p
    }

    #[wasm_bindgen(getter)]
    pub fn cycles(&self) -> f64 {
        self.system.registers().cycles as f64 // Convert u64 to f64 for JavaScript
    }

    /// Set the program counter
    pub fn set_pc(&mut self, addr: u16) {
        self.system.set_registers(RegisterUpdate::pc(addr));
    }

    /// Hand every byte the ACIA finished sending to the JavaScript callback.
    fn flush_transmit(&self) {
        for byte in self.port.take_transmitted() {
            let char_str = String::from_utf8(vec![byte]).unwrap_or_else(|_| "?".to_string());
            let _ = self
                .on_transmit
                .call1(&JsValue::NULL, &JsValue::from_str(&char_str));
        }
    }
}
