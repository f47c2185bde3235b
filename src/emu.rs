//! Emulator orchestrator
//!
//! Owns the CPU and the bus and drives the per-instruction loop the
//! front-ends share: execute one instruction, then decide whether the
//! serial input line should interrupt.
//!
//! The interrupt policy models the board wiring: only 8251-based firmware
//! is interrupt-driven, the request byte is 0xFF (RST 38h under IM 0, the
//! 0x0038 vector under IM 1), and a raised request is latched until the
//! CPU accepts it (observed as IFF1 dropping) so one input byte never
//! produces two interrupts.

use std::io::Read;

use log::debug;

use crate::bus::{Bus, BusError};
use crate::cpu::Cpu;

/// Data-bus byte presented with a serial interrupt request
pub const SERIAL_INT_VECTOR: u8 = 0xFF;

/// Why a bounded run returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The cycle budget was reached
    CyclesComplete,
    /// The CPU executed HALT with no wakeup pending
    Halted,
}

/// Main emulator state
pub struct Emu {
    cpu: Cpu,
    bus: Bus,
    /// An interrupt has been raised for the current input byte and the
    /// CPU has not accepted it yet
    int_pending: bool,
}

impl Emu {
    /// Emulator writing serial output to host stdout.
    pub fn new() -> Self {
        Self::with_bus(Bus::new())
    }

    /// Emulator over a caller-built bus (custom console sink or storage
    /// directory).
    pub fn with_bus(bus: Bus) -> Self {
        Self {
            cpu: Cpu::new(),
            bus,
            int_pending: false,
        }
    }

    /// Load a ROM image at address 0 and reset the CPU.
    pub fn load_rom<R: Read>(&mut self, reader: R) -> Result<usize, BusError> {
        let loaded = self.bus.load_image(reader)?;
        self.reset();
        Ok(loaded)
    }

    /// Reset the CPU and the interrupt latch. Memory and peripherals keep
    /// their state, as on a hardware reset line.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.int_pending = false;
    }

    /// Queue one byte of host input for the UARTs.
    pub fn push_input(&mut self, byte: u8) {
        self.bus.peripherals.input.push(byte);
    }

    /// Execute one instruction, then apply the serial interrupt policy.
    /// Returns the T-states consumed.
    pub fn step(&mut self) -> u32 {
        let cycles = self.cpu.step(&mut self.bus);

        if self.bus.peripherals.serial_irq_ready()
            && self.cpu.iff1
            && self.cpu.iff_delay == 0
            && !self.int_pending
        {
            self.cpu.raise_interrupt(SERIAL_INT_VECTOR);
            self.int_pending = true;
        }
        // Acceptance clears IFF1; the byte is in the ISR's hands now
        if !self.cpu.iff1 {
            self.int_pending = false;
        }

        cycles
    }

    /// Run until the cycle counter reaches `max_cycles` or the CPU halts.
    pub fn run_cycles(&mut self, max_cycles: u64) -> StopReason {
        while self.cpu.cyc < max_cycles {
            self.step();
            if self.cpu.halted && !self.interrupt_can_wake() {
                debug!(
                    "halted at PC={:04X} after {} cycles",
                    self.cpu.pc, self.cpu.cyc
                );
                return StopReason::Halted;
            }
        }
        debug!(
            "stopped at PC={:04X} after {} cycles",
            self.cpu.pc, self.cpu.cyc
        );
        StopReason::CyclesComplete
    }

    /// A halted CPU is not stuck if an accepted or acceptable interrupt
    /// can still pull it out of the HALT.
    fn interrupt_can_wake(&self) -> bool {
        self.int_pending || (self.cpu.iff1 && self.bus.peripherals.serial_irq_ready())
    }

    /// CPU state, read-only.
    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    /// Bus, including memory and peripherals.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Mutable bus access for front-end configuration (ROM size, storage
    /// directory).
    pub fn bus_mut(&mut self) -> &mut Bus {
        &mut self.bus
    }
}

impl Default for Emu {
    fn default() -> Self {
        Self::new()
    }
}
