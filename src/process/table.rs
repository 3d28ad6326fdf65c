//! The global process table (spec.md §4.6): a fixed `NPROC`-entry array
//! behind one spinlock, exactly as the original's `ptable`. The table
//! lock doubles as the lock protecting every process's `state`/`chan`/
//! `killed` fields, matching the original's single-lock design.

use crate::arch::x86::swtch::trapret;
use crate::error::{KernelError, KernelResult};
use crate::mm::{frame_allocator, vmm};
use crate::param::{KSTACKSIZE, NPROC};
use crate::process::process::{Context, ProcState, Process, Trapframe};
use crate::sync::{SpinLock, SpinLockGuard};

pub struct ProcessTable {
    pub procs: [Process; NPROC],
    next_pid: i32,
}

pub static PROCESS_TABLE: SpinLock<ProcessTable> = SpinLock::new(
    "ptable",
    ProcessTable {
        procs: [const { Process::unused() }; NPROC],
        next_pid: 1,
    },
);

pub type TableGuard = SpinLockGuard<'static, ProcessTable>;

pub fn lock() -> TableGuard {
    PROCESS_TABLE.lock()
}

impl ProcessTable {
    /// Find an `Unused` slot, mark it `Embryo`, assign a pid, and lay out
    /// a fresh kernel stack with `Trapframe` and `Context` slots so the
    /// scheduler can `swtch` into it later via `forkret`/`trapret`.
    /// Matches the original's `allocproc`.
    pub fn alloc(&mut self) -> KernelResult<&mut Process> {
        let slot = self
            .procs
            .iter()
            .position(|p| p.state == ProcState::Unused)
            .ok_or(KernelError::OutOfProcesses)?;

        let pid = self.next_pid;
        self.next_pid += 1;

        let kstack_phys = frame_allocator::alloc()?;
        let kstack_top = (kstack_phys + vmm::KERNBASE) + KSTACKSIZE;

        let p = &mut self.procs[slot];
        *p = Process::unused();
        p.pid = pid;
        p.state = ProcState::Embryo;
        p.kstack = kstack_phys;

        let mut sp = kstack_top;

        sp -= core::mem::size_of::<Trapframe>();
        p.trapframe = sp as *mut Trapframe;

        sp -= core::mem::size_of::<usize>();
        unsafe {
            *(sp as *mut usize) = trapret as usize;
        }

        sp -= core::mem::size_of::<Context>();
        p.context = sp as *mut Context;
        unsafe {
            core::ptr::write(p.context, Context::zeroed());
            (*p.context).eip = crate::sched::scheduler::forkret as usize as u32;
        }

        Ok(p)
    }

    pub fn get_mut(&mut self, pid: i32) -> Option<&mut Process> {
        self.procs.iter_mut().find(|p| p.pid == pid && p.state != ProcState::Unused)
    }

    pub fn get(&self, pid: i32) -> Option<&Process> {
        self.procs.iter().find(|p| p.pid == pid && p.state != ProcState::Unused)
    }
}
