//! End-to-end system tests
//!
//! Small ROMs executed against the full stack: CPU, bus, UARTs, input
//! queue and the orchestrator's interrupt policy. Serial output is
//! captured through a shared console sink.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use crate::bus::{Bus, BusError};
use crate::emu::{Emu, StopReason};

/// Write sink the test can read back
#[derive(Clone, Default)]
struct SharedConsole(Rc<RefCell<Vec<u8>>>);

impl Write for SharedConsole {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn emu_with_rom(rom: &[u8]) -> (Emu, SharedConsole) {
    let console = SharedConsole::default();
    let bus = Bus::with_console(Box::new(console.clone()));
    let mut emu = Emu::with_bus(bus);
    emu.load_rom(rom).unwrap();
    (emu, console)
}

fn output_string(console: &SharedConsole) -> String {
    String::from_utf8(console.0.borrow().clone()).unwrap()
}

#[test]
fn acia_transmit() {
    // LD A,'A'; OUT ($81),A; HALT
    let (mut emu, console) = emu_with_rom(&[0x3E, 0x41, 0xD3, 0x81, 0x76]);
    assert_eq!(emu.run_cycles(1_000), StopReason::Halted);
    assert_eq!(output_string(&console), "A");
    assert!(emu.cpu().halted);
}

#[test]
fn usart_transmit_is_not_case_folded() {
    // LD A,'a'; OUT ($00),A; HALT; folding applies to input only
    let (mut emu, console) = emu_with_rom(&[0x3E, 0x61, 0xD3, 0x00, 0x76]);
    assert_eq!(emu.run_cycles(1_000), StopReason::Halted);
    assert_eq!(output_string(&console), "a");
    // the port touch selected the 8251 interrupt policy
    assert!(emu.bus().peripherals.usart.is_active());
}

#[test]
fn acia_echo_two_bytes() {
    // IN A,($81); OUT ($81),A; twice; HALT
    let rom = [0xDB, 0x81, 0xD3, 0x81, 0xDB, 0x81, 0xD3, 0x81, 0x76];
    let (mut emu, console) = emu_with_rom(&rom);
    emu.push_input(b'X');
    emu.push_input(b'Y');
    assert_eq!(emu.run_cycles(1_000), StopReason::Halted);
    assert_eq!(output_string(&console), "XY");
    assert!(!emu.bus().peripherals.usart.is_active());
}

#[test]
fn usart_polled_echo_upper_cases_input() {
    // poll:  IN A,($01); AND $02; JR Z,poll
    //        IN A,($00); OUT ($00),A; HALT
    let rom = [
        0xDB, 0x01, // IN A,($01)
        0xE6, 0x02, // AND $02
        0x28, 0xFA, // JR Z,-6
        0xDB, 0x00, // IN A,($00)
        0xD3, 0x00, // OUT ($00),A
        0x76, // HALT
    ];
    let (mut emu, console) = emu_with_rom(&rom);
    emu.push_input(b'q');
    assert_eq!(emu.run_cycles(10_000), StopReason::Halted);
    assert_eq!(output_string(&console), "Q");
}

#[test]
fn djnz_loop_cycle_count() {
    let (mut emu, _console) = emu_with_rom(&[0x06, 0x03, 0x10, 0xFE]);
    for _ in 0..4 {
        emu.step();
    }
    assert_eq!(emu.cpu().cyc, 41);
    assert_eq!(emu.cpu().b(), 0);
}

#[test]
fn serial_interrupt_vectors_to_0038() {
    // init:  IM 1; LD SP,$8000; LD A,$4E; OUT ($01),A; EI
    // spin:  JR spin
    // isr:   IN A,($00); OUT ($00),A; HALT
    let mut rom = vec![0u8; 0x3D];
    rom[..0x0C].copy_from_slice(&[
        0xED, 0x56, // IM 1
        0x31, 0x00, 0x80, // LD SP,$8000
        0x3E, 0x4E, // LD A,$4E
        0xD3, 0x01, // OUT ($01),A - marks the 8251 in use
        0xFB, // EI
        0x18, 0xFE, // JR -2
    ]);
    rom[0x38..].copy_from_slice(&[0xDB, 0x00, 0xD3, 0x00, 0x76]);

    let (mut emu, console) = emu_with_rom(&rom);
    emu.push_input(b'q');
    assert_eq!(emu.run_cycles(100_000), StopReason::Halted);
    // the ISR saw the case-folded byte and halted with interrupts off
    assert_eq!(output_string(&console), "Q");
    assert_eq!(emu.cpu().pc, 0x3C);
    assert!(!emu.cpu().iff1);
    // the return address on the stack points back into the spin loop
    let ret = emu.bus().read_word(0x7FFE);
    assert!((0x0A..=0x0C).contains(&ret), "return address {:04X}", ret);
}

#[test]
fn one_interrupt_per_input_byte() {
    // Same init, but the ISR re-enables interrupts and returns; each
    // pushed byte must produce exactly one acceptance and one echo.
    let mut rom = vec![0u8; 0x40];
    rom[..0x0C].copy_from_slice(&[
        0xED, 0x56, // IM 1
        0x31, 0x00, 0x80, // LD SP,$8000
        0x3E, 0x4E, // LD A,$4E
        0xD3, 0x01, // OUT ($01),A
        0xFB, // EI
        0x18, 0xFE, // JR -2
    ]);
    rom[0x38..0x3F].copy_from_slice(&[
        0xDB, 0x00, // IN A,($00)
        0xD3, 0x00, // OUT ($00),A
        0xFB, // EI
        0xED, 0x4D, // RETI
    ]);

    let (mut emu, console) = emu_with_rom(&rom);
    emu.push_input(b'a');
    emu.push_input(b'b');
    assert_eq!(emu.run_cycles(50_000), StopReason::CyclesComplete);
    assert_eq!(output_string(&console), "AB");
}

#[test]
fn rom_region_protects_loaded_image() {
    // LD A,$99; LD ($1000),A; LD ($3000),A; HALT
    let rom = [0x3E, 0x99, 0x32, 0x00, 0x10, 0x32, 0x00, 0x30, 0x76];
    let (mut emu, _console) = emu_with_rom(&rom);
    assert_eq!(emu.run_cycles(1_000), StopReason::Halted);
    assert_eq!(emu.bus().read_byte(0x1000), 0x00, "ROM write dropped");
    assert_eq!(emu.bus().read_byte(0x3000), 0x99, "RAM write lands");
}

#[test]
fn bounded_run_stops_at_cycle_cap() {
    let (mut emu, _console) = emu_with_rom(&[0x18, 0xFE]); // JR -2
    assert_eq!(emu.run_cycles(100), StopReason::CyclesComplete);
    assert!(emu.cpu().cyc >= 100);
    assert!(!emu.cpu().halted);
}

#[test]
fn empty_rom_is_rejected() {
    let mut emu = Emu::with_bus(Bus::with_console(Box::new(io::sink())));
    assert!(matches!(emu.load_rom(&[][..]), Err(BusError::EmptyImage)));
}

#[test]
fn halt_with_pending_input_still_wakes() {
    // EI; HALT; then the ISR echoes and halts for good
    let mut rom = vec![0u8; 0x3D];
    rom[..0x07].copy_from_slice(&[
        0xED, 0x56, // IM 1
        0x31, 0x00, 0x80, // LD SP,$8000
        0xD3, 0x01, // OUT ($01),A - 8251 policy on
    ]);
    rom[0x08] = 0xFB; // EI
    rom[0x09] = 0x76; // HALT
    rom[0x38..].copy_from_slice(&[0xDB, 0x00, 0xD3, 0x00, 0x76]);

    let (mut emu, console) = emu_with_rom(&rom);
    emu.push_input(b'z');
    assert_eq!(emu.run_cycles(100_000), StopReason::Halted);
    assert_eq!(output_string(&console), "Z");
    // woken from the first HALT: the stacked return address is past it
    assert_eq!(emu.bus().read_word(0x7FFE), 0x000A);
}
