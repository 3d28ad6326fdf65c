//! Console device (spec.md §6): an 80x25 CGA text-mode writer mirrored
//! to the UART, and a 128-byte cooked-mode input ring fed by the PS/2
//! keyboard interrupt handler. Registered as `DeviceID` `CONSOLE` in the
//! file table's device-dispatch table.

use core::fmt::Write;

use pc_keyboard::{DecodedKey, HandleControl, Keyboard, ScancodeSet1};

use crate::arch::x86::{inb, outb};
use crate::error::{KernelError, KernelResult};
use crate::serial_println;
use crate::sync::SpinLock;

const CGA_WIDTH: usize = 80;
const CGA_HEIGHT: usize = 25;
const CGA_BASE: usize = 0xB8000;
const CGA_ATTR: u8 = 0x07;

const INPUT_RING_SIZE: usize = 128;

struct CgaWriter {
    row: usize,
    col: usize,
}

impl CgaWriter {
    const fn new() -> Self {
        CgaWriter { row: 0, col: 0 }
    }

    fn buffer(&mut self) -> &'static mut [[u16; CGA_WIDTH]; CGA_HEIGHT] {
        unsafe { &mut *(CGA_BASE as *mut [[u16; CGA_WIDTH]; CGA_HEIGHT]) }
    }

    fn putc(&mut self, c: u8) {
        match c {
            b'\n' => self.newline(),
            0x08 | 0x7F => self.backspace(),
            _ => {
                let buf = self.buffer();
                buf[self.row][self.col] = (CGA_ATTR as u16) << 8 | c as u16;
                self.col += 1;
                if self.col >= CGA_WIDTH {
                    self.newline();
                }
            }
        }
        self.update_cursor();
    }

    fn newline(&mut self) {
        self.col = 0;
        self.row += 1;
        if self.row >= CGA_HEIGHT {
            let buf = self.buffer();
            for row in 1..CGA_HEIGHT {
                buf[row - 1] = buf[row];
            }
            buf[CGA_HEIGHT - 1] = [(CGA_ATTR as u16) << 8 | b' ' as u16; CGA_WIDTH];
            self.row = CGA_HEIGHT - 1;
        }
    }

    fn backspace(&mut self) {
        if self.col > 0 {
            self.col -= 1;
        } else if self.row > 0 {
            self.row -= 1;
            self.col = CGA_WIDTH - 1;
        }
        let buf = self.buffer();
        buf[self.row][self.col] = (CGA_ATTR as u16) << 8 | b' ' as u16;
    }

    fn update_cursor(&self) {
        let pos = self.row * CGA_WIDTH + self.col;
        unsafe {
            outb(0x3D4, 0x0F);
            outb(0x3D5, (pos & 0xFF) as u8);
            outb(0x3D4, 0x0E);
            outb(0x3D5, ((pos >> 8) & 0xFF) as u8);
        }
    }
}

impl Write for CgaWriter {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for &b in s.as_bytes() {
            self.putc(b);
        }
        Ok(())
    }
}

static CGA: SpinLock<CgaWriter> = SpinLock::new("cga", CgaWriter::new());

/// Write one character to the screen and mirror it to the UART.
fn console_putc(c: u8) {
    CGA.lock().putc(c);
    crate::arch::x86::serial::putc(c);
}

/// Cooked-mode input ring: a 128-byte circular buffer with a separate
/// read cursor, filled by the keyboard interrupt handler and drained by
/// `consoleRead`. `^H`/DEL backspaces, `^U` kills the current line,
/// `^D` signals EOF, CR is translated to LF. A line becomes readable
/// when LF is typed or the buffer fills (spec.md §6).
struct InputRing {
    buf: [u8; INPUT_RING_SIZE],
    write_pos: usize,
    read_pos: usize,
    edit_pos: usize,
}

impl InputRing {
    const fn new() -> Self {
        InputRing {
            buf: [0; INPUT_RING_SIZE],
            write_pos: 0,
            read_pos: 0,
            edit_pos: 0,
        }
    }
}

static INPUT: SpinLock<InputRing> = SpinLock::new("console input", InputRing::new());

const CTRL_H: u8 = 0x08;
const CTRL_U: u8 = 0x15;
const CTRL_D: u8 = 0x04;
const CTRL_P: u8 = 0x10;

fn input_chan() -> usize {
    0xC045_0000
}

/// Feed one decoded keystroke into the input ring, echoing to the
/// screen. Called from the keyboard interrupt handler boundary.
pub fn handle_key(byte: u8) {
    match byte {
        CTRL_P => {
            crate::process::dump_all();
            return;
        }
        CTRL_U => {
            let mut ring = INPUT.lock();
            while ring.edit_pos != ring.write_pos
                && ring.buf[(ring.edit_pos - 1) % INPUT_RING_SIZE] != b'\n'
            {
                ring.edit_pos -= 1;
                console_putc(CTRL_H);
            }
            return;
        }
        CTRL_H | 0x7F => {
            let mut ring = INPUT.lock();
            if ring.edit_pos != ring.write_pos {
                ring.edit_pos -= 1;
                console_putc(CTRL_H);
            }
            return;
        }
        _ => {}
    }

    let c = if byte == b'\r' { b'\n' } else { byte };
    if c == 0 {
        return;
    }

    let mut ring = INPUT.lock();
    if ring.edit_pos - ring.read_pos >= INPUT_RING_SIZE {
        return;
    }
    let c = if c == CTRL_D { b'\n' } else { c };
    let is_eof = byte == CTRL_D;

    console_putc(if is_eof { b'\n' } else { c });
    ring.buf[ring.edit_pos % INPUT_RING_SIZE] = c;
    ring.edit_pos += 1;

    if c == b'\n' || is_eof || ring.edit_pos - ring.read_pos == INPUT_RING_SIZE {
        ring.write_pos = ring.edit_pos;
        let chan = input_chan();
        drop(ring);
        crate::sched::wakeup(chan);
    }
}

/// Device read entry point (devsw[CONSOLE].read): block until a full
/// line is available, then deliver up to `buf.len()` bytes of it,
/// stopping at `^D`'s resulting empty line. Matches the original's
/// `consoleread`.
pub fn read(buf: &mut [u8]) -> KernelResult<usize> {
    let mut ring = INPUT.lock();
    let mut n = 0;
    while n < buf.len() {
        while ring.read_pos == ring.write_pos {
            if crate::sched::current().map(|p| p.killed).unwrap_or(false) {
                return Err(KernelError::WouldBlock);
            }
            ring = crate::sched::sleep(input_chan(), ring);
        }
        let c = ring.buf[ring.read_pos % INPUT_RING_SIZE];
        ring.read_pos += 1;
        buf[n] = c;
        n += 1;
        if c == b'\n' {
            break;
        }
    }
    Ok(n)
}

/// Device write entry point (devsw[CONSOLE].write): print each byte to
/// the screen. Matches the original's `consolewrite`.
pub fn write(buf: &[u8]) -> KernelResult<usize> {
    for &b in buf {
        console_putc(b);
    }
    Ok(buf.len())
}

/// Kernel-internal formatted print, used by the `print!`/`println!`
/// macros. Bypasses the file-descriptor path entirely, matching the
/// original's `cprintf` calling `consputc` directly.
pub fn _print(args: core::fmt::Arguments) {
    let mut cga = CGA.lock();
    let _ = cga.write_fmt(args);
    drop(cga);
    serial_println!("{}", args);
}

static mut KEYBOARD: Option<Keyboard<pc_keyboard::layouts::Us104Key, ScancodeSet1>> = None;

/// Keyboard interrupt handler boundary (IRQ1): read one scancode,
/// decode it, and feed any resulting ASCII byte into the input ring.
pub fn handle_interrupt() {
    let scancode = unsafe { inb(0x60) };
    unsafe {
        let kb = (*core::ptr::addr_of_mut!(KEYBOARD)).get_or_insert_with(|| {
            Keyboard::new(ScancodeSet1::new(), pc_keyboard::layouts::Us104Key, HandleControl::Ignore)
        });
        if let Ok(Some(event)) = kb.add_byte(scancode) {
            if let Some(key) = kb.process_keyevent(event) {
                match key {
                    DecodedKey::Unicode(ch) if ch.is_ascii() => handle_key(ch as u8),
                    _ => {}
                }
            }
        }
    }
}

pub fn init() {
    CGA.lock().row = 0;
}
