//! Fuzz target for the system coordinator.
//!
//! Loads arbitrary bytes as a program into a 64K machine with both
//! peripherals mapped, then steps it while toggling interrupt inputs.

#![no_main]

use arbitrary::Arbitrary;
use homebrew6502::{BasicCpu, InterruptSource, RamConfig, RegisterUpdate, System, SystemConfig};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Action {
    Step,
    Irq,
    ClearIrq,
    Nmi,
    ClearNmi,
    Reset,
}

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    program: Vec<u8>,
    status: u8,
    actions: Vec<Action>,
}

fuzz_target!(|input: FuzzInput| {
    let config = SystemConfig {
        ram: RamConfig {
            start: 0x0000,
            size: 0x10000,
        },
        ..SystemConfig::default()
    };
    let mut system = System::from_config(&config, BasicCpu::new(), None).unwrap();

    let len = input.program.len().min(0x4000);
    system.load_program(0x0200, &input.program[..len]);
    system.set_registers(RegisterUpdate {
        pc: Some(0x0200),
        p: Some(input.status),
        ..RegisterUpdate::default()
    });

    for action in input.actions.iter().take(4096) {
        match action {
            Action::Step => {
                system.step();
            }
            Action::Irq => system.trigger_irq(InterruptSource::Debug),
            Action::ClearIrq => system.clear_irq(&InterruptSource::Debug),
            Action::Nmi => system.trigger_nmi(InterruptSource::Debug),
            Action::ClearNmi => system.clear_nmi(&InterruptSource::Debug),
            Action::Reset => system.reset(),
        }
    }

    let _ = system.registers();
});
