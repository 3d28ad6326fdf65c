//! Serial port driver for kernel debugging output.
//!
//! Uses the `uart_16550` crate to interface with COM1 at I/O port 0x3F8.
//! This is the out-of-scope UART device layer named in spec.md §1, kept
//! only as the collaborator the console and `serial_print!`/`serial_println!`
//! macros call into.

use lazy_static::lazy_static;
use spin::Mutex;
use uart_16550::SerialPort;

lazy_static! {
    pub static ref SERIAL1: Mutex<SerialPort> = {
        let mut serial_port = unsafe { SerialPort::new(0x3F8) };
        serial_port.init();
        Mutex::new(serial_port)
    };
}

#[doc(hidden)]
pub fn _print(args: ::core::fmt::Arguments) {
    use core::fmt::Write;

    crate::arch::x86::push_cli();
    SERIAL1
        .lock()
        .write_fmt(args)
        .expect("printing to serial failed");
    crate::arch::x86::pop_cli();
}

/// Mirror one console byte to the serial line, for the CGA console's
/// UART mirror (spec.md §6).
pub fn putc(c: u8) {
    crate::arch::x86::push_cli();
    SERIAL1.lock().send(c);
    crate::arch::x86::pop_cli();
}
