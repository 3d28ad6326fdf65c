//! Process control block and the two register-save layouts the kernel
//! switches between: `Context` (kernel-to-kernel, saved by `swtch`) and
//! `Trapframe` (user-to-kernel, saved by the trap entry stub). Layouts
//! match the original's `proc.h`/`x86.h` so the assembly `swtch` and the
//! trap-entry boundary can be thin.

use crate::fs::file::FileHandle;
use crate::param::{MAXCWDSIZE, NAME_MAX, NOFILE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Unused,
    Embryo,
    Sleeping,
    Runnable,
    Running,
    Zombie,
}

/// Registers `swtch` saves on the kernel stack across a kernel-to-kernel
/// context switch. Only callee-saved registers plus the return address
/// need saving -- the compiler already saved caller-saved registers
/// before calling into `swtch`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct Context {
    pub edi: u32,
    pub esi: u32,
    pub ebx: u32,
    pub ebp: u32,
    pub eip: u32,
}

impl Context {
    pub const fn zeroed() -> Self {
        Context {
            edi: 0,
            esi: 0,
            ebx: 0,
            ebp: 0,
            eip: 0,
        }
    }
}

/// Full register file the trap-entry stub pushes on a ring-3 -> ring-0
/// transition, in the order the stub pushes them (matching the original's
/// `struct trapframe`). `syscall`/page-fault handling read and write
/// this directly.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct Trapframe {
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub oesp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,

    pub gs: u16,
    _pad_gs: u16,
    pub fs: u16,
    _pad_fs: u16,
    pub es: u16,
    _pad_es: u16,
    pub ds: u16,
    _pad_ds: u16,

    pub trapno: u32,
    pub err: u32,

    pub eip: u32,
    pub cs: u16,
    _pad_cs: u16,
    pub eflags: u32,

    pub esp: u32,
    pub ss: u16,
    _pad_ss: u16,
}

impl Trapframe {
    pub const fn zeroed() -> Self {
        // SAFETY: every field is an integer type for which all-zero is valid.
        unsafe { core::mem::zeroed() }
    }
}

/// A process control block. Fields mirror spec.md's Data Model: pid,
/// parent, lifecycle state, memory size, page directory, kernel stack,
/// saved context/trapframe, sleep channel, kill flag, name, current
/// working directory, and open-file table.
pub struct Process {
    pub pid: i32,
    pub parent: Option<i32>,
    pub state: ProcState,
    /// Size in bytes of the process's user address space.
    pub size: usize,
    /// Physical address of this process's page directory.
    pub pgdir: usize,
    /// Physical address of the (kernel-heap) page backing this process's
    /// kernel stack.
    pub kstack: usize,
    pub context: *mut Context,
    pub trapframe: *mut Trapframe,
    /// Opaque channel this process is sleeping on; meaningless unless
    /// `state == Sleeping`.
    pub chan: usize,
    pub killed: bool,
    pub exit_code: i32,
    pub name: [u8; NAME_MAX],
    pub cwd: [u8; MAXCWDSIZE],
    pub open_files: [Option<FileHandle>; NOFILE],
}

unsafe impl Send for Process {}

impl Process {
    pub const fn unused() -> Self {
        Process {
            pid: 0,
            parent: None,
            state: ProcState::Unused,
            size: 0,
            pgdir: 0,
            kstack: 0,
            context: core::ptr::null_mut(),
            trapframe: core::ptr::null_mut(),
            chan: 0,
            killed: false,
            exit_code: 0,
            name: [0; NAME_MAX],
            cwd: [0; MAXCWDSIZE],
            open_files: [const { None }; NOFILE],
        }
    }

    pub fn set_name(&mut self, name: &[u8]) {
        let n = name.len().min(NAME_MAX - 1);
        self.name[..n].copy_from_slice(&name[..n]);
        self.name[n] = 0;
    }

    pub fn name_str(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(0);
        core::str::from_utf8(&self.name[..len]).unwrap_or("?")
    }

    pub fn set_cwd(&mut self, cwd: &[u8]) {
        let n = cwd.len().min(MAXCWDSIZE - 1);
        self.cwd[..n].copy_from_slice(&cwd[..n]);
        self.cwd[n] = 0;
    }

    pub fn cwd_str(&self) -> &str {
        let len = self.cwd.iter().position(|&b| b == 0).unwrap_or(0);
        core::str::from_utf8(&self.cwd[..len]).unwrap_or("/")
    }
}
