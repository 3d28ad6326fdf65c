//! PIC masking and end-of-interrupt (spec.md §6 boot contract: "PIC
//! mask" and "I/O APIC"). The raw IDT gate encoding and trap-entry
//! assembly stubs are the out-of-scope vector boundary `idt.rs`
//! documents; this module owns the one piece of that boundary this
//! kernel's design does reach into directly -- telling the 8259 which
//! lines to deliver and acknowledging them once `trap::handle` is done.

use pic8259::ChainedPics;
use spin::Mutex;

use crate::arch::x86::idt::T_IRQ0;

static PICS: Mutex<ChainedPics> = Mutex::new(unsafe { ChainedPics::new(T_IRQ0, T_IRQ0 + 8) });

/// Remap the PICs past the CPU exception range and mask every line
/// except timer and keyboard; IDE is unmasked once `fs::ide::init` has a
/// queued request to wait on.
pub fn init() {
    unsafe {
        PICS.lock().initialize();
    }
    mask_all();
    unmask(crate::arch::x86::idt::IRQ_TIMER);
    unmask(crate::arch::x86::idt::IRQ_KBD);
}

fn mask_all() {
    use crate::arch::x86::{inb, outb};
    unsafe {
        outb(0x21, 0xFF);
        outb(0xA1, 0xFF);
    }
}

/// Unmask a single IRQ line, leaving the rest of the mask untouched.
pub fn unmask(irq: u8) {
    use crate::arch::x86::{inb, outb};
    unsafe {
        let port = if irq < 8 { 0x21 } else { 0xA1 };
        let bit = irq % 8;
        let mask = inb(port);
        outb(port, mask & !(1 << bit));
    }
}

/// Signal end-of-interrupt for the vector the trap stub delivered.
/// `vector` is the full IDT vector (`T_IRQ0 + irq`), matching what
/// `trap::handle` reads out of the trapframe.
pub fn end_of_interrupt(vector: u8) {
    unsafe {
        PICS.lock().notify_end_of_interrupt(vector);
    }
}
