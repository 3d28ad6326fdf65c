//! Trap dispatch (spec.md §4.12, §6): the one function the out-of-scope
//! trap-entry assembly stub (`idt.rs`) calls with a freshly built
//! [`Trapframe`] on the kernel stack. Matches the original's `trap()`.

use crate::arch::x86::idt::{T_IRQ0, T_PGFLT, T_SYSCALL, IRQ_IDE, IRQ_KBD, IRQ_TIMER};
use crate::irq;
use crate::process::process::Trapframe;
use crate::sched;
use crate::{console, fs, syscall};

/// Dispatch one trap. Called with interrupts disabled; returns with
/// interrupts however the process's saved `eflags` says they should be
/// once this trap is fully handled.
///
/// # Safety
/// `tf` must point at a live trapframe built by the trap-entry stub for
/// the process currently running on this CPU.
pub unsafe fn handle(tf: *mut Trapframe) {
    let trapno = (*tf).trapno as u8;

    if trapno == T_SYSCALL {
        let proc = sched::current().expect("trap: syscall with no current process");
        if proc.killed {
            sched::exit(-1);
        }
        syscall::syscall();
        let proc = sched::current().expect("trap: syscall with no current process");
        if proc.killed {
            sched::exit(-1);
        }
        return;
    }

    if trapno >= T_IRQ0 {
        let irq_num = trapno - T_IRQ0;
        match irq_num {
            IRQ_TIMER => {
                crate::arch::tick();
            }
            IRQ_KBD => console::handle_interrupt(),
            IRQ_IDE => fs::ide::handle_interrupt(),
            _ => {}
        }
        irq::end_of_interrupt(trapno);

        // `sys_sleep` polls the tick counter rather than blocking on a
        // wakeup channel, so nothing needs waking here; the timer's only
        // other job is forcing a reschedule so no process can monopolize
        // the CPU.
        if irq_num == IRQ_TIMER && sched::current().is_some() {
            sched::yield_now();
        }

        if let Some(proc) = sched::current() {
            if proc.killed {
                sched::exit(-1);
            }
        }
        return;
    }

    let in_kernel_mode = ((*tf).cs & 3) == 0;
    if trapno == T_PGFLT {
        log::error!("page fault at eip=0x{:x}", (*tf).eip);
    }

    if in_kernel_mode {
        panic!("trap: unexpected trap {} in kernel mode, eip=0x{:x}", trapno, (*tf).eip);
    }

    log::warn!("trap: pid killed by trap {} at eip=0x{:x}", trapno, (*tf).eip);
    sched::exit(-1);
}
