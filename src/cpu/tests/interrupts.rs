//! Interrupt tests
//!
//! The EI one-instruction window, the three interrupt modes, HALT wakeup
//! and the flip-flop plumbing.

use super::*;

#[test]
fn pending_interrupt_waits_for_iff1() {
    let (mut cpu, mut bus) = setup(&[0x00, 0x00, 0x00]);
    cpu.im = InterruptMode::Mode1;
    cpu.raise_interrupt(0xFF);
    step_n(&mut cpu, &mut bus, 3);
    // interrupts disabled: the request just sits there
    assert_eq!(cpu.pc, 3);
    assert!(!cpu.iff1);
}

#[test]
fn interrupt_accepted_at_instruction_boundary() {
    let (mut cpu, mut bus) = setup(&[0x00, 0x00]);
    cpu.im = InterruptMode::Mode1;
    cpu.iff1 = true;
    cpu.iff2 = true;
    cpu.sp = 0x8000;
    cpu.raise_interrupt(0xFF);
    let cycles = cpu.step(&mut bus);
    assert_eq!(cpu.pc, 0x0038);
    assert_eq!(cycles, 13);
    assert!(!cpu.iff1);
    assert!(!cpu.iff2);
    assert_eq!(bus.read_word(0x7FFE), 0x0000); // interrupted before the NOP
}

#[test]
fn ei_window_delays_acceptance_by_one_instruction() {
    // EI; NOP; NOP; request raised while EI executes
    let (mut cpu, mut bus) = setup(&[0xFB, 0x00, 0x00]);
    cpu.im = InterruptMode::Mode1;
    cpu.sp = 0x8000;
    cpu.raise_interrupt(0xFF);

    cpu.step(&mut bus); // EI
    assert!(!cpu.iff1, "IFF1 must not be set during the EI step");
    cpu.step(&mut bus); // the instruction after EI always executes
    assert!(cpu.iff1);
    assert_eq!(cpu.pc, 2, "no acceptance immediately after EI");
    cpu.step(&mut bus); // now the interrupt is taken
    assert_eq!(cpu.pc, 0x0038);
    assert_eq!(bus.read_word(0x7FFE), 0x0002);
}

#[test]
fn ei_then_ret_returns_before_acceptance() {
    // The classic ISR tail: EI; RET must complete the return first
    let (mut cpu, mut bus) = setup(&[0xFB, 0xC9]);
    cpu.im = InterruptMode::Mode1;
    cpu.sp = 0x8000;
    bus.write_word(0x8000, 0x4000);
    cpu.raise_interrupt(0xFF);
    cpu.step(&mut bus); // EI
    cpu.step(&mut bus); // RET
    assert_eq!(cpu.pc, 0x4000);
    cpu.step(&mut bus); // acceptance
    assert_eq!(cpu.pc, 0x0038);
    assert_eq!(bus.read_word(0x7FFE), 0x4000);
}

#[test]
fn di_blocks_interrupts_immediately() {
    let (mut cpu, mut bus) = setup(&[0xF3, 0x00, 0x00]);
    cpu.iff1 = true;
    cpu.iff2 = true;
    cpu.step(&mut bus); // DI
    cpu.raise_interrupt(0xFF);
    step_n(&mut cpu, &mut bus, 2);
    assert_eq!(cpu.pc, 3);
    assert!(!cpu.iff1);
}

#[test]
fn halt_wakes_and_resumes_after_the_halt() {
    let (mut cpu, mut bus) = setup(&[0x00, 0x76, 0x00]);
    cpu.im = InterruptMode::Mode1;
    cpu.sp = 0x8000;
    step_n(&mut cpu, &mut bus, 2);
    assert!(cpu.halted);
    assert_eq!(cpu.pc, 1);
    step_n(&mut cpu, &mut bus, 2); // spinning
    assert_eq!(cpu.cyc, 4 + 4 + 4 + 4);

    cpu.iff1 = true;
    cpu.iff2 = true;
    cpu.raise_interrupt(0xFF);
    cpu.step(&mut bus);
    assert!(!cpu.halted);
    assert_eq!(cpu.pc, 0x0038);
    // the return address is the instruction after the HALT
    assert_eq!(bus.read_word(0x7FFE), 0x0002);
}

#[test]
fn mode0_executes_the_vector_byte() {
    let (mut cpu, mut bus) = setup(&[0x00]);
    cpu.im = InterruptMode::Mode0;
    cpu.iff1 = true;
    cpu.iff2 = true;
    cpu.sp = 0x8000;
    cpu.raise_interrupt(0xEF); // RST 28h
    let cycles = cpu.step(&mut bus);
    assert_eq!(cpu.pc, 0x0028);
    assert_eq!(cycles, 13);
    assert_eq!(bus.read_word(0x7FFE), 0x0000);
}

#[test]
fn mode2_fetches_the_vector_from_the_i_page() {
    let (mut cpu, mut bus) = setup(&[0x00]);
    cpu.im = InterruptMode::Mode2;
    cpu.i = 0x20;
    cpu.iff1 = true;
    cpu.iff2 = true;
    cpu.sp = 0x8000;
    bus.write_word(0x20FE, 0x1234); // (I<<8) | (0xFF & 0xFE)
    cpu.raise_interrupt(0xFF);
    let cycles = cpu.step(&mut bus);
    assert_eq!(cpu.pc, 0x1234);
    assert_eq!(cycles, 19);
    assert!(!cpu.iff1);
}

#[test]
fn retn_restores_iff1_from_iff2() {
    let (mut cpu, mut bus) = setup(&[0xED, 0x45]);
    cpu.iff1 = false;
    cpu.iff2 = true;
    cpu.sp = 0x8000;
    bus.write_word(0x8000, 0x4000);
    cpu.step(&mut bus);
    assert!(cpu.iff1);
    assert_eq!(cpu.pc, 0x4000);
    assert_eq!(cpu.cyc, 14);
}

#[test]
fn cycle_counter_is_monotonic() {
    let (mut cpu, mut bus) = setup(&[0xFB, 0x76]);
    cpu.im = InterruptMode::Mode1;
    cpu.sp = 0x8000;
    let mut last = 0;
    cpu.raise_interrupt(0xFF);
    for _ in 0..10 {
        cpu.step(&mut bus);
        assert!(cpu.cyc > last);
        last = cpu.cyc;
    }
}
