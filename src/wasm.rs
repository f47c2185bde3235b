//! WebAssembly bindings
//!
//! A browser front-end drives the same contract the native front-ends
//! use: load a ROM, step or run, push input bytes, and read back whatever
//! the guest transmitted on its serial port. Serial output is captured in
//! a shared buffer instead of stdout and handed to JavaScript on request.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use wasm_bindgen::prelude::*;

use crate::bus::Bus;
use crate::emu::Emu;

/// Console sink shared between the bus and the binding layer
#[derive(Clone, Default)]
struct CapturedConsole(Rc<RefCell<Vec<u8>>>);

impl Write for CapturedConsole {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Browser-friendly wrapper around the emulator
#[wasm_bindgen]
pub struct WasmEmu {
    inner: Emu,
    output: CapturedConsole,
}

#[wasm_bindgen]
impl WasmEmu {
    /// Create a new emulator instance.
    #[wasm_bindgen(constructor)]
    pub fn new() -> WasmEmu {
        console_error_panic_hook::set_once();

        let output = CapturedConsole::default();
        let bus = Bus::with_console(Box::new(output.clone()));
        WasmEmu {
            inner: Emu::with_bus(bus),
            output,
        }
    }

    /// Load ROM data. Returns the number of bytes loaded, or 0 on failure.
    pub fn load_rom(&mut self, data: &[u8]) -> usize {
        self.inner.load_rom(data).unwrap_or(0)
    }

    /// Configure the write-protected ROM prefix.
    pub fn set_rom_size(&mut self, rom_size: u16) {
        self.inner.bus_mut().set_rom_size(rom_size);
    }

    /// Reset the CPU.
    pub fn reset(&mut self) {
        self.inner.reset();
    }

    /// Execute one instruction; returns the T-states consumed.
    pub fn step(&mut self) -> u32 {
        self.inner.step()
    }

    /// Run until `max_cycles` total T-states or HALT. Returns true if the
    /// CPU halted.
    pub fn run_cycles(&mut self, max_cycles: u64) -> bool {
        self.inner.run_cycles(max_cycles) == crate::emu::StopReason::Halted
    }

    /// Queue one byte of keyboard input.
    pub fn push_input(&mut self, byte: u8) {
        self.inner.push_input(byte);
    }

    /// Take everything the guest transmitted since the last call.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut *self.output.0.borrow_mut())
    }

    /// Program counter.
    pub fn pc(&self) -> u16 {
        self.inner.cpu().pc
    }

    /// Total executed T-states.
    pub fn cycles(&self) -> u64 {
        self.inner.cpu().cyc
    }

    /// Whether the CPU is halted.
    pub fn halted(&self) -> bool {
        self.inner.cpu().halted
    }
}

impl Default for WasmEmu {
    fn default() -> Self {
        Self::new()
    }
}
