//! Fuzz target for bus routing and peripheral register access.
//!
//! Drives an arbitrary sequence of reads, writes and clock ticks against the
//! default machine layout (RAM, ACIA, VIA) plus an optional ROM image.

#![no_main]

use arbitrary::Arbitrary;
use homebrew6502::{Acia6850, BufferedSerialPort, MemoryBus, RegionKind, SystemBus, Via6522};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum BusOp {
    Read(u16),
    Write(u16, u8),
    Tick(u16),
    Receive(u8),
    Reset,
}

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    rom_start: u16,
    rom: Vec<u8>,
    baud_rate: u32,
    ops: Vec<BusOp>,
}

fuzz_target!(|input: FuzzInput| {
    let port = BufferedSerialPort::new();
    let mut acia = Acia6850::with_port(port.clone());
    acia.set_baud_rate(input.baud_rate);

    let mut bus = SystemBus::new();
    bus.configure_ram(0x0000, 0x8000).unwrap();
    bus.register_peripheral(Box::new(acia), 0x8000, 0x8001, "acia")
        .unwrap();
    bus.register_peripheral(Box::new(Via6522::new()), 0x8010, 0x801F, "via")
        .unwrap();

    // Oversized or wrapping images are rejected, never panic
    let rom_loaded = bus.load_rom(input.rom.clone(), input.rom_start).is_ok();

    for op in input.ops.iter().take(1024) {
        match *op {
            BusOp::Read(addr) => {
                let value = bus.read(addr);
                if bus.resolve(addr).is_none() {
                    assert_eq!(value, 0xFF);
                }
            }
            BusOp::Write(addr, value) => {
                bus.write(addr, value);
                if bus.resolve(addr) == Some(RegionKind::Ram) {
                    assert_eq!(bus.read(addr), value);
                }
            }
            BusOp::Tick(cycles) => bus.tick(u32::from(cycles)),
            BusOp::Receive(byte) => port.push_input(&[byte]),
            BusOp::Reset => bus.reset(),
        }

        if rom_loaded && !input.rom.is_empty() {
            assert_eq!(bus.read(input.rom_start), input.rom[0]);
        }
    }
});
