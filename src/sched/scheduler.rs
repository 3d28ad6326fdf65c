//! Scheduler, process lifecycle, and sleep/wakeup (spec.md §4.6-§4.7).
//!
//! The process table's spinlock is the one lock that protects every
//! process's `state`/`chan`/`killed` fields, exactly as the original
//! groups those operations around `ptable.lock`. `sched()` is only ever
//! called with that lock held and `push_cli` nesting depth exactly one,
//! so a fresh `swtch` into the per-CPU scheduler context re-enables
//! interrupts at the right moment without anyone else racing the state
//! transition.

use crate::arch::{self, x86::swtch::swtch};
use crate::error::{KernelError, KernelResult};
use crate::fs;
use crate::mm::vmm;
use crate::process::process::{Context, ProcState, Process};
use crate::process::table::{self, TableGuard};
use crate::sync::SpinLockGuard;

/// Pointer to the process currently running on this CPU, if any. Only
/// ever written with interrupts disabled by the CPU it belongs to, so
/// reading it from that same CPU never races.
fn current_ptr() -> Option<*mut Process> {
    unsafe { (*arch::mycpu().process.get()).map(|addr| addr as *mut Process) }
}

fn set_current_ptr(p: Option<*mut Process>) {
    unsafe {
        *arch::mycpu().process.get() = p.map(|ptr| ptr as usize);
    }
}

/// The pid of the process running on this CPU, or `None` if the CPU is
/// idling in the scheduler loop.
pub fn current_pid() -> Option<i32> {
    current_ptr().map(|p| unsafe { (*p).pid })
}

/// Mutable access to the process running on this CPU. Callers must
/// already be running in that process's context (i.e. not from an
/// interrupt on a different CPU).
pub fn current() -> Option<&'static mut Process> {
    current_ptr().map(|p| unsafe { &mut *p })
}

/// Per-CPU scheduler loop: pick a `Runnable` process, run it until it
/// yields/sleeps/exits, then look again. Never returns. Matches the
/// original's `scheduler()`.
pub fn scheduler() -> ! {
    loop {
        unsafe {
            core::arch::asm!("sti", options(nomem, nostack));
        }

        let mut table = table::lock();
        let found = table
            .procs
            .iter()
            .position(|p| p.state == ProcState::Runnable);

        if let Some(idx) = found {
            let p = &mut table.procs[idx] as *mut Process;
            unsafe {
                let kstack_top = (*p).kstack + vmm::KERNBASE + crate::param::KSTACKSIZE;
                vmm::switch_to((*p).pgdir, kstack_top);
                (*p).state = ProcState::Running;
            }
            set_current_ptr(Some(p));

            unsafe {
                let cpu = arch::mycpu();
                swtch(
                    cpu.scheduler_context.get() as *mut Context,
                    (*p).context as *const Context,
                );
            }

            vmm::switch_to_kernel_vm();
            set_current_ptr(None);
        }
        drop(table);
    }
}

/// Give up the CPU for one scheduling round. Must be called with the
/// table lock held, `push_cli` depth exactly one, and the current
/// process not `Running` (the caller already changed its state).
/// Matches the original's `sched()`.
fn sched(table: TableGuard) -> TableGuard {
    let depth = arch::cli_depth();
    if depth != 1 {
        panic!("sched: locks held, depth {}", depth);
    }
    let p = current_ptr().expect("sched: no current process");
    unsafe {
        if (*p).state == ProcState::Running {
            panic!("sched: process still running");
        }
    }

    // `push_cli` depth and the enabled-state it remembers live in this
    // CPU's descriptor, not this process's, so they read back correctly
    // on whichever process this CPU resumes after `swtch` returns here --
    // no separate save/restore needed around the switch itself.
    unsafe {
        let cpu = arch::mycpu();
        swtch(
            (*p).context as *mut Context,
            cpu.scheduler_context.get() as *const Context,
        );
    }
    table
}

/// Voluntarily give up the CPU. Matches the original's `yield`.
pub fn yield_now() {
    let mut table = table::lock();
    let p = current_ptr().expect("yield_now: no current process");
    unsafe {
        (*p).state = ProcState::Runnable;
    }
    table = sched(table);
    drop(table);
}

/// Atomically release `guard`'s lock, mark the current process `Sleeping`
/// on `chan`, and context-switch away; when woken, reacquire `guard`'s
/// lock before returning. Matches the original's `sleep`, specialized so
/// that the caller's lock is never the process-table lock itself (the
/// few call sites that already hold the table lock -- `exit`/`wait` --
/// call [`sleep_on_table_lock`] instead, avoiding the original's
/// same-lock special case entirely).
pub fn sleep<T>(chan: usize, guard: SpinLockGuard<'_, T>) -> SpinLockGuard<'_, T> {
    let lock = guard.lock_ref();
    let mut table = table::lock();
    drop(guard);

    let p = current_ptr().expect("sleep: no current process");
    unsafe {
        (*p).chan = chan;
        (*p).state = ProcState::Sleeping;
    }
    table = sched(table);
    unsafe {
        (*p).chan = 0;
    }
    drop(table);

    lock.lock()
}

/// Variant of [`sleep`] for callers that already hold the process table
/// lock (`exit`, `wait`). Consumes and returns the same table guard.
pub fn sleep_on_table_lock(chan: usize, mut table: TableGuard) -> TableGuard {
    let p = current_ptr().expect("sleep_on_table_lock: no current process");
    unsafe {
        (*p).chan = chan;
        (*p).state = ProcState::Sleeping;
    }
    table = sched(table);
    unsafe {
        (*p).chan = 0;
    }
    table
}

fn wakeup_locked(table: &mut TableGuard, chan: usize) {
    for p in table.procs.iter_mut() {
        if p.state == ProcState::Sleeping && p.chan == chan {
            p.state = ProcState::Runnable;
        }
    }
}

/// Wake every process sleeping on `chan`. Matches the original's
/// `wakeup` (which internally acquires the table lock, unlike
/// `wakeup1`).
pub fn wakeup(chan: usize) {
    let mut table = table::lock();
    wakeup_locked(&mut table, chan);
}

/// Mark `pid` killed; if it is currently sleeping, promote it to
/// runnable so it observes the kill flag promptly. Matches the
/// original's `kill`.
pub fn kill(pid: i32) -> KernelResult<()> {
    let mut table = table::lock();
    let p = table.get_mut(pid).ok_or(KernelError::NotFound)?;
    p.killed = true;
    if p.state == ProcState::Sleeping {
        p.state = ProcState::Runnable;
    }
    Ok(())
}

/// Create a child process: a fresh PCB, a full copy of the parent's
/// address space (no COW, per spec.md's Non-goals), duplicated open
/// files, and a trapframe set up to return 0 in the child. Matches the
/// original's `fork`.
pub fn fork() -> KernelResult<i32> {
    let parent_ptr = current_ptr().expect("fork: no current process");
    let parent = unsafe { &mut *parent_ptr };

    let mut table = table::lock();
    let child = table.alloc()?;
    let child_pid = child.pid;

    let new_pgdir = match vmm::copy_user_space(parent.pgdir, parent.size) {
        Ok(pd) => pd,
        Err(e) => {
            unsafe {
                crate::mm::frame_allocator::free(child.kstack);
            }
            child.kstack = 0;
            child.state = ProcState::Unused;
            return Err(e);
        }
    };
    child.pgdir = new_pgdir;
    child.size = parent.size;
    child.parent = Some(parent.pid);

    unsafe {
        *child.trapframe = *parent.trapframe;
        (*child.trapframe).eax = 0;
    }

    for (slot, file) in parent.open_files.iter().enumerate() {
        if let Some(handle) = file {
            child.open_files[slot] = Some(fs::file::dup(*handle));
        }
    }

    child.set_cwd(parent.cwd_str().as_bytes());
    child.set_name(parent.name_str().as_bytes());
    child.state = ProcState::Runnable;

    Ok(child_pid)
}

/// Terminate the current process: close its files, drop its cwd
/// reference, reparent its children to the init process (waking init if
/// any reparented child is already a zombie), become a zombie, and
/// schedule away for the last time. Never returns. Matches the
/// original's `exit`.
pub fn exit(status: i32) -> ! {
    let p = current_ptr().expect("exit: no current process");
    let pid = unsafe { (*p).pid };
    if pid == 1 {
        panic!("init exiting");
    }

    unsafe {
        for slot in (*p).open_files.iter_mut() {
            if let Some(handle) = slot.take() {
                fs::file::close(handle);
            }
        }
        (*p).set_cwd(b"");
    }

    let mut table = table::lock();

    if let Some(parent_pid) = unsafe { (*p).parent } {
        wakeup_locked(&mut table, parent_pid as usize);
    }

    let mut any_zombie_child = false;
    for child in table.procs.iter_mut() {
        if child.parent == Some(pid) {
            child.parent = Some(1);
            if child.state == ProcState::Zombie {
                any_zombie_child = true;
            }
        }
    }
    if any_zombie_child {
        wakeup_locked(&mut table, 1);
    }

    unsafe {
        (*p).exit_code = status;
        (*p).state = ProcState::Zombie;
    }
    let _ = sched(table);

    unreachable!("exit: scheduler never reschedules a zombie process");
}

/// Wait for a zombie child, reap it (free its kernel stack and page
/// table), and return its pid and exit status. Matches the original's
/// `wait`.
pub fn wait() -> KernelResult<(i32, i32)> {
    let pid = current_pid().expect("wait: no current process");
    let mut table = table::lock();

    loop {
        let mut have_children = false;
        let mut found: Option<usize> = None;
        for (idx, child) in table.procs.iter().enumerate() {
            if child.parent == Some(pid) {
                have_children = true;
                if child.state == ProcState::Zombie {
                    found = Some(idx);
                    break;
                }
            }
        }

        if let Some(idx) = found {
            let (child_pid, status, kstack, pgdir, size) = {
                let child = &table.procs[idx];
                (child.pid, child.exit_code, child.kstack, child.pgdir, child.size)
            };
            unsafe {
                crate::mm::frame_allocator::free(kstack);
                vmm::free_pagetable(pgdir, size);
            }
            table.procs[idx] = Process::unused();
            return Ok((child_pid, status));
        }

        if !have_children || unsafe { (*current_ptr().unwrap()).killed } {
            return Err(KernelError::NotFound);
        }

        table = sleep_on_table_lock(pid as usize, table);
    }
}

/// Entry point for a brand-new process's very first timeslice. Reached
/// via `swtch`'s restored `eip` pointing here, with the table lock still
/// held from the `scheduler()` call that switched into this process (the
/// original holds `ptable.lock` across the `swtch` into a process and
/// relies on the first thing that process does being to release it).
/// The very first time any process reaches this point, it also performs
/// filesystem init that needs a process context to run in.
#[no_mangle]
pub extern "C" fn forkret() {
    static FIRST: core::sync::atomic::AtomicBool = core::sync::atomic::AtomicBool::new(true);

    // `scheduler()` swtched into this process while holding the table
    // lock (never dropping its guard across the switch); release it here
    // on this process's first ever timeslice, matching the original's
    // forkret releasing `ptable.lock`.
    unsafe {
        table::PROCESS_TABLE.force_unlock();
    }

    if FIRST.swap(false, core::sync::atomic::Ordering::SeqCst) {
        fs::fat12::init();
    }
}

/// Build the very first user process: map one page at address 0 holding
/// a tiny bootstrap program, and set up its trapframe to enter user mode
/// at `eip = 0`. Matches the original's `userinit`.
pub fn init_first_process(initcode: &[u8]) -> KernelResult<()> {
    let mut table = table::lock();
    let p = table.alloc()?;

    let pgdir = vmm::setup_kernel_vm()?;
    p.pgdir = pgdir;
    p.size = vmm::grow(pgdir, 0, crate::param::PGSIZE)?;
    vmm::copyout(pgdir, 0, initcode)?;

    unsafe {
        let tf = &mut *p.trapframe;
        *tf = crate::process::process::Trapframe::zeroed();
        tf.cs = crate::arch::x86::gdt::selector(crate::arch::x86::gdt::SEG_UCODE, x86::Ring::Ring3);
        tf.ds = crate::arch::x86::gdt::selector(crate::arch::x86::gdt::SEG_UDATA, x86::Ring::Ring3);
        tf.es = tf.ds;
        tf.ss = tf.ds;
        tf.eflags = 1 << 9; // FL_IF
        tf.esp = crate::param::PGSIZE as u32;
        tf.eip = 0;
    }

    let console = fs::file::alloc()?;
    fs::file::set_device(console, crate::param::CONSOLE, true, true);
    p.open_files[0] = Some(console);
    p.open_files[1] = Some(fs::file::dup(console));
    p.open_files[2] = Some(fs::file::dup(console));

    p.set_name(b"initcode");
    p.set_cwd(b"/");
    p.state = ProcState::Runnable;
    Ok(())
}
