//! I/O peripherals
//!
//! Everything reachable through the Z80's `IN`/`OUT` port space:
//! - Serial: Intel 8251 USART (ports 0x00/0x01) and MC6850 ACIA
//!   (ports 0x80/0x81), sharing one host input queue
//! - SD card (ports 0x10..0x15)
//!
//! Reads of unmapped ports return 0xFF; writes to them are ignored.

pub mod sd;
pub mod serial;

pub use sd::{SdCard, SD_STATUS_DATA, SD_STATUS_ERROR, SD_STATUS_READY};
pub use serial::{Acia, InputQueue, Usart};

use std::io::{self, Write};
use std::path::PathBuf;

/// 8251 data port
pub const USART_DATA: u8 = 0x00;
/// 8251 mode/command/status port
pub const USART_CTRL: u8 = 0x01;
/// ACIA control/status port
pub const ACIA_CTRL: u8 = 0x80;
/// ACIA data port
pub const ACIA_DATA: u8 = 0x81;

/// Default host directory backing the SD card
pub const DEFAULT_STORAGE_DIR: &str = "storage";

/// The peripheral fabric behind the I/O port space
pub struct Peripherals {
    /// Host-fed receive FIFO, shared by both UARTs
    pub input: InputQueue,
    pub acia: Acia,
    pub usart: Usart,
    pub sd: SdCard,
    console: Box<dyn Write>,
}

impl Peripherals {
    /// Serial output goes to host stdout.
    pub fn new() -> Self {
        Self::with_console(Box::new(io::stdout()))
    }

    /// Serial output goes to `console` (tests, browser front-ends).
    pub fn with_console(console: Box<dyn Write>) -> Self {
        Self {
            input: InputQueue::new(),
            acia: Acia::new(),
            usart: Usart::new(),
            sd: SdCard::new(PathBuf::from(DEFAULT_STORAGE_DIR)),
            console,
        }
    }

    /// Route a port read.
    pub fn port_in(&mut self, port: u8) -> u8 {
        match port {
            USART_DATA => self.usart.read_data(&mut self.input),
            USART_CTRL => self.usart.read_status(&self.input),
            ACIA_CTRL => self.acia.read_status(&self.input),
            ACIA_DATA => self.acia.read_data(&mut self.input),
            _ if SdCard::handles_port(port) => self.sd.read_port(port),
            _ => 0xFF,
        }
    }

    /// Route a port write.
    pub fn port_out(&mut self, port: u8, val: u8) {
        match port {
            USART_DATA => {
                self.usart.touch();
                self.emit(val);
            }
            USART_CTRL => self.usart.write_control(val),
            ACIA_CTRL => self.acia.write_control(val),
            ACIA_DATA => self.emit(val),
            _ if SdCard::handles_port(port) => self.sd.write_port(port, val),
            _ => {}
        }
    }

    /// Transmit one byte to the host console, flushed immediately so
    /// interactive firmware output appears as it is produced.
    fn emit(&mut self, byte: u8) {
        let _ = self.console.write_all(&[byte]);
        let _ = self.console.flush();
    }

    /// Whether the interrupt-driven input policy applies: the ROM has
    /// touched the 8251 and a byte is waiting.
    pub fn serial_irq_ready(&self) -> bool {
        self.usart.is_active() && self.input.has_data()
    }
}

impl Default for Peripherals {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Write sink that lets a test inspect what the guest transmitted.
    #[derive(Clone, Default)]
    pub(crate) struct SharedConsole(pub Rc<RefCell<Vec<u8>>>);

    impl Write for SharedConsole {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn unmapped_ports_read_ff() {
        let mut p = Peripherals::with_console(Box::new(SharedConsole::default()));
        assert_eq!(p.port_in(0x42), 0xFF);
        p.port_out(0x42, 0x00); // ignored
        assert_eq!(p.port_in(0x42), 0xFF);
    }

    #[test]
    fn both_uart_data_ports_transmit() {
        let console = SharedConsole::default();
        let mut p = Peripherals::with_console(Box::new(console.clone()));
        p.port_out(ACIA_DATA, b'A');
        p.port_out(USART_DATA, b'a'); // output is not case-folded
        assert_eq!(*console.0.borrow(), b"Aa");
        assert!(p.usart.is_active());
    }

    #[test]
    fn acia_ports_do_not_select_usart_policy() {
        let mut p = Peripherals::with_console(Box::new(SharedConsole::default()));
        p.port_in(ACIA_CTRL);
        p.port_out(ACIA_DATA, b'x');
        assert!(!p.usart.is_active());
        p.input.push(b'k');
        assert!(!p.serial_irq_ready());
        p.port_in(USART_CTRL);
        assert!(p.serial_irq_ready());
    }
}
