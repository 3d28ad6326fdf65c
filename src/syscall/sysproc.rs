//! Process-related system calls (spec.md §6). Matches the original's
//! `sysproc.c` one function per syscall.

use crate::arch;
use crate::error::KernelResult;
use crate::mm::vmm;
use crate::sched;

use super::{arg_int, arg_ptr, arg_str};

pub fn sys_fork() -> KernelResult<i32> {
    sched::fork()
}

/// Never returns: matches the original's `sys_exit` calling `exit()`
/// directly rather than returning a value to a trapframe that is about
/// to be torn down.
pub fn sys_exit() -> ! {
    let status = arg_int(0).unwrap_or(0);
    sched::exit(status);
}

pub fn sys_wait() -> KernelResult<i32> {
    let (pid, _status) = sched::wait()?;
    Ok(pid)
}

pub fn sys_kill() -> KernelResult<i32> {
    let pid = arg_int(0)?;
    sched::kill(pid)?;
    Ok(0)
}

pub fn sys_getpid() -> KernelResult<i32> {
    Ok(sched::current_pid().unwrap_or(-1))
}

/// Grow or shrink the calling process's heap by `n` bytes (may be
/// negative), returning the break *before* the change. Matches the
/// original's `sys_sbrk`/`growproc`.
pub fn sys_sbrk() -> KernelResult<i32> {
    let n = arg_int(0)?;
    let proc = sched::current().expect("sys_sbrk: no current process");
    let old_size = proc.size;
    let new_size = if n >= 0 {
        vmm::grow(proc.pgdir, old_size, old_size + n as usize)?
    } else {
        vmm::shrink(proc.pgdir, old_size, old_size - (-n) as usize)
    };
    proc.size = new_size;
    Ok(old_size as i32)
}

/// Block the calling process for `n` ticks, matching the original's
/// `sys_sleep`: sleeps on the global tick counter, re-checking elapsed
/// ticks each time it wakes since any interrupt can spuriously wake it.
pub fn sys_sleep() -> KernelResult<i32> {
    let n = arg_int(0)?;
    if n <= 0 {
        return Ok(0);
    }
    let target = arch::ticks() + n as usize;
    while arch::ticks() < target {
        if sched::current().map(|p| p.killed).unwrap_or(false) {
            return Err(crate::error::KernelError::Killed);
        }
        sched::yield_now();
    }
    Ok(0)
}

pub fn sys_uptime() -> KernelResult<i32> {
    Ok(arch::ticks() as i32)
}

pub fn sys_exec() -> KernelResult<i32> {
    let path = arg_str(0)?;
    let argv_ptr = arg_ptr(1)?;

    let full_path: alloc::string::String = if path.contains('.') {
        path
    } else {
        [path.as_str(), ".exe"].concat()
    };

    let mut argv_storage: alloc::vec::Vec<alloc::string::String> = alloc::vec::Vec::new();
    let proc = sched::current().expect("sys_exec: no current process");
    let pgdir = proc.pgdir;
    for i in 0..crate::param::MAXARG {
        let mut raw = [0u8; 4];
        vmm::copyin(pgdir, &mut raw, argv_ptr + i * 4)?;
        let entry = u32::from_le_bytes(raw) as usize;
        if entry == 0 {
            break;
        }
        argv_storage.push(super::fetch_str(pgdir, entry)?);
    }
    let argv_refs: alloc::vec::Vec<&[u8]> = argv_storage.iter().map(|s| s.as_bytes()).collect();

    let cwd = super::current_cwd();
    crate::exec::exec(&cwd, &full_path, &argv_refs)?;
    Ok(0)
}
