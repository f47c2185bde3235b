//! Z80 CPU tests
//!
//! - `instructions`: instruction semantics, flags and timing
//! - `interrupts`: EI delay window, interrupt modes, HALT wakeup

use super::*;
use crate::bus::Bus;

mod interrupts;

/// Bus with RAM everywhere and serial output discarded
fn test_bus() -> Bus {
    let mut bus = Bus::with_console(Box::new(std::io::sink()));
    bus.set_rom_size(0);
    bus
}

/// CPU plus a bus holding `program` at address 0
fn setup(program: &[u8]) -> (Cpu, Bus) {
    let mut bus = test_bus();
    for (i, &byte) in program.iter().enumerate() {
        bus.write_byte(i as u16, byte);
    }
    (Cpu::new(), bus)
}

fn step_n(cpu: &mut Cpu, bus: &mut Bus, n: usize) {
    for _ in 0..n {
        cpu.step(bus);
    }
}

/// Assert the full flag byte with a readable breakdown on mismatch
fn assert_flags(cpu: &Cpu, expected: u8, context: &str) {
    assert_eq!(
        cpu.f, expected,
        "{}: flags mismatch. Expected {:08b}, got {:08b} (S={} Z={} Y={} H={} X={} PV={} N={} C={})",
        context,
        expected,
        cpu.f,
        u8::from(cpu.flag_s()),
        u8::from(cpu.flag_z()),
        u8::from(cpu.flag(flags::Y)),
        u8::from(cpu.flag_h()),
        u8::from(cpu.flag(flags::X)),
        u8::from(cpu.flag_pv()),
        u8::from(cpu.flag_n()),
        u8::from(cpu.flag_c()),
    );
}
