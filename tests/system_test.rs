//! End-to-end tests: CPU engine, bus router and peripherals driven together
//! by the system coordinator.

use homebrew6502::{
    Acia6850, AciaConfig, AciaStatus, BasicCpu, BufferedSerialPort, BusError, ConsoleSerialPort,
    CpuEngine, MemoryBus, RamConfig, RegisterUpdate, RomConfig, StepOutcome, System, SystemBus,
    SystemConfig, Via6522, ViaConfig, ViaInterrupt,
};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// LDA #value ; STA addr
fn store(value: u8, addr: u16) -> [u8; 5] {
    [0xA9, value, 0x8D, addr as u8, (addr >> 8) as u8]
}

#[test]
fn test_program_transmits_through_acia() {
    init();
    let port = BufferedSerialPort::new();

    let mut bus = SystemBus::new();
    bus.configure_ram(0x0000, 0x8000).unwrap();
    bus.register_peripheral(
        Box::new(Acia6850::with_port(port.clone())),
        0x8000,
        0x8001,
        "acia",
    )
    .unwrap();

    let mut program = Vec::new();
    program.extend_from_slice(&store(0x03, 0x8000)); // master reset
    program.extend_from_slice(&store(0x11, 0x8000)); // divide by 16
    program.extend_from_slice(&store(0x41, 0x8001)); // 'A'
    program.extend_from_slice(&[0x4C, 0x0F, 0x02]); // JMP *

    let mut system = System::new(bus, BasicCpu::new());
    system.load_program(0x0200, &program);
    system.set_registers(RegisterUpdate::pc(0x0200));

    let report = system.run(6);
    assert_eq!(report.steps, 6);
    assert!(port.transmitted().is_empty());

    system.run_cycles(5_000);
    assert_eq!(port.transmitted(), vec![0x41]);
    assert_eq!(system.registers().pc, 0x020F);

    let status = AciaStatus::from_bits_truncate(system.bus().read(0x8000));
    assert!(status.contains(AciaStatus::TDRE));
}

#[test]
fn test_program_polls_received_byte() {
    init();
    let port = BufferedSerialPort::new();
    let mut system = System::from_config(
        &SystemConfig::default(),
        BasicCpu::new(),
        Some(Box::new(port.clone())),
    )
    .unwrap();

    // LDA $8001 ; STA $0300 ; JMP *
    system.load_program(
        0x0200,
        &[0xAD, 0x01, 0x80, 0x8D, 0x00, 0x03, 0x4C, 0x06, 0x02],
    );
    system.set_registers(RegisterUpdate::pc(0x0200));

    port.push_input(b"k");
    system.run_cycles(200);

    // Received, not yet read
    let acia = system.peripheral::<Acia6850>("acia").unwrap();
    assert_eq!(acia.rx_queue_len(), 1);

    system.set_registers(RegisterUpdate::pc(0x0200));
    system.run(2);
    assert_eq!(system.bus().read(0x0300), b'k');
}

#[test]
fn test_rom_boot_and_vectors() {
    init();
    let mut rom = vec![0xEA; 0x1000];
    // JMP $F000 at the start so the CPU loops in ROM
    rom[0x0000] = 0x4C;
    rom[0x0001] = 0x00;
    rom[0x0002] = 0xF0;
    rom[0x0FFC] = 0x00;
    rom[0x0FFD] = 0xF0;

    let config = SystemConfig {
        rom: Some(RomConfig {
            start: 0xF000,
            data: rom,
        }),
        ..SystemConfig::default()
    };
    let mut system = System::from_config(&config, BasicCpu::new(), None).unwrap();
    assert_eq!(system.registers().pc, 0xF000);

    system.run(10);
    assert_eq!(system.registers().pc, 0xF000);

    // Writes into ROM through the CPU's view are dropped
    system.load_program(0xF000, &[0x00]);
    assert_eq!(system.bus().read(0xF000), 0x4C);
}

#[test]
fn test_via_timer_drives_irq_handler() {
    init();
    let config = SystemConfig {
        ram: RamConfig {
            start: 0x0000,
            size: 0x10000,
        },
        ..SystemConfig::default()
    };
    let mut system = System::from_config(&config, BasicCpu::new(), None).unwrap();

    // Main: set up T1 free-running at 100 cycles, enable its IRQ, CLI, spin
    let mut main = Vec::new();
    main.extend_from_slice(&store(0x40, 0x801B)); // ACR: T1 continuous
    main.extend_from_slice(&store(0xC0, 0x801E)); // IER: enable T1
    main.extend_from_slice(&store(100, 0x8014)); // T1 latch low
    main.extend_from_slice(&store(0x00, 0x8015)); // T1 high, start
    main.push(0x58); // CLI
    main.extend_from_slice(&[0x4C, 0x15, 0x02]); // JMP * at $0215
    system.load_program(0x0200, &main);

    // Handler at $0400: acknowledge T1 by reading T1C-L, count in $10, RTI
    let handler = [
        0xAD, 0x14, 0x80, // LDA $8014
        0xAD, 0x10, 0x00, // LDA $0010
        0x8D, 0x11, 0x00, // STA $0011 (mirror, no INC available)
        0xA9, 0x01, 0x8D, 0x10, 0x00, // LDA #1 ; STA $0010
        0x40, // RTI
    ];
    system.load_program(0x0400, &handler);
    system.load_program(0xFFFE, &[0x00, 0x04]);

    system.set_registers(RegisterUpdate::pc(0x0200));
    system.run(300);

    assert_eq!(system.bus().read(0x0010), 0x01);
    let via = system.peripheral::<Via6522>("via").unwrap();
    assert!(via.timer1.running);
    assert!(via.interrupt_enable().contains(ViaInterrupt::TIMER1));
    // Back in the main loop or in the handler, never lost
    let pc = system.registers().pc;
    assert!((0x0215..=0x0217).contains(&pc) || (0x0400..0x0410).contains(&pc));
}

#[test]
fn test_breakpoint_then_resume() {
    init();
    let mut system =
        System::from_config(&SystemConfig::default(), BasicCpu::new(), None).unwrap();
    system.load_program(0x0200, &[0xEA; 16]);
    system.set_registers(RegisterUpdate::pc(0x0200));
    system.cpu_mut().set_breakpoint(0x0208);

    let report = system.run_cycles(1_000);
    assert!(report.breakpoint);
    assert_eq!(report.cycles, 8);
    assert_eq!(system.registers().pc, 0x0208);

    // Peripherals did not advance on the halted step
    assert_eq!(system.step(), StepOutcome::Breakpoint);
    assert_eq!(system.registers().cycles, 8);

    system.cpu_mut().remove_breakpoint(0x0208);
    assert_eq!(system.step(), StepOutcome::Executed { cycles: 2 });
}

#[test]
fn test_reset_restarts_from_vector() {
    init();
    let mut rom = vec![0xEA; 0x100];
    rom[0xFC] = 0x00;
    rom[0xFD] = 0xFF;
    let config = SystemConfig {
        rom: Some(RomConfig {
            start: 0xFF00,
            data: rom,
        }),
        ..SystemConfig::default()
    };
    let mut system = System::from_config(&config, BasicCpu::new(), None).unwrap();
    system.load_program(0x1000, &[0x42]);
    system.run(20);

    system.reset();

    let regs = system.registers();
    assert_eq!(regs.pc, 0xFF00);
    assert_eq!(regs.sp, 0xFF);
    assert_eq!(regs.cycles, 0);
    assert_eq!(system.bus().read(0x1000), 0x00);
}

#[test]
fn test_peripheral_conflict_aborts_construction() {
    init();
    let config = SystemConfig {
        acia: Some(AciaConfig {
            start: 0x9000,
            baud_rate: 9600,
        }),
        via: Some(ViaConfig { start: 0x8FF8 }),
        ..SystemConfig::default()
    };

    match System::from_config(&config, BasicCpu::new(), None) {
        Err(BusError::AddressConflict {
            existing_start,
            new_start,
            ..
        }) => {
            assert_eq!(existing_start, 0x9000);
            assert_eq!(new_start, 0x8FF8);
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("overlapping peripherals were accepted"),
    }
}

#[test]
fn test_console_port_writes_to_writer() {
    init();
    let mut acia = Acia6850::with_port(ConsoleSerialPort::new(Vec::<u8>::new()));
    acia.set_baud_rate(9600);

    let mut bus = SystemBus::new();
    bus.configure_ram(0x0000, 0x8000).unwrap();
    bus.register_peripheral(Box::new(acia), 0x8000, 0x8001, "acia")
        .unwrap();

    let mut system = System::new(bus, BasicCpu::new());
    let mut program = Vec::new();
    program.extend_from_slice(&store(b'o', 0x8001));
    program.extend_from_slice(&[0x4C, 0x05, 0x02]);
    system.load_program(0x0200, &program);
    system.set_registers(RegisterUpdate::pc(0x0200));
    system.run_cycles(2_000);

    let acia = system.peripheral_mut::<Acia6850>("acia").unwrap();
    assert!(acia.status().contains(AciaStatus::TDRE));
    assert_eq!(acia.baud_rate(), 9600);
    assert!(acia.detach_port().is_some());
}
