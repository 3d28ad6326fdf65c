//! System-call dispatch (spec.md §4.12, §6). User code traps with the
//! syscall number in `eax` and arguments already on the user stack (the
//! ordinary C calling convention the trap stub's `int` wrapper used to
//! get there); argument fetch validates every address against the
//! calling process's address space before touching it.

extern crate alloc;

use alloc::string::String;

use crate::error::{KernelError, KernelResult};
use crate::mm::vmm;
use crate::sched;

mod sysfile;
mod sysproc;

const SYS_FORK: u32 = 1;
const SYS_EXIT: u32 = 2;
const SYS_WAIT: u32 = 3;
const SYS_PIPE: u32 = 4;
const SYS_READ: u32 = 5;
const SYS_WRITE: u32 = 6;
const SYS_CLOSE: u32 = 7;
const SYS_KILL: u32 = 8;
const SYS_EXEC: u32 = 9;
const SYS_OPEN: u32 = 10;
const SYS_FSTAT: u32 = 11;
const SYS_DUP: u32 = 12;
const SYS_GETPID: u32 = 13;
const SYS_SBRK: u32 = 14;
const SYS_SLEEP: u32 = 15;
const SYS_UPTIME: u32 = 16;
const SYS_CHDIR: u32 = 17;
const SYS_GETCWD: u32 = 18;

/// Longest argument/path string this layer will fetch out of user
/// memory in one call.
const MAXSTR: usize = 128;

/// Read the `n`-th (0-indexed) 4-byte argument off the user stack, just
/// past the return address `exec` laid down, and validate it falls
/// within the calling process's address space. Matches the original's
/// `argint`.
fn arg_int(n: usize) -> KernelResult<i32> {
    let proc = sched::current().ok_or(KernelError::BadFileDescriptor)?;
    let esp = unsafe { (*proc.trapframe).esp } as usize;
    let addr = esp + 4 + 4 * n;
    if addr + 4 > proc.size || addr < 4 {
        return Err(KernelError::InvalidAddress { addr });
    }
    let mut buf = [0u8; 4];
    vmm::copyin(proc.pgdir, &mut buf, addr)?;
    Ok(i32::from_le_bytes(buf))
}

/// Fetch the `n`-th argument as a raw user-space address, without
/// dereferencing it. Matches the original's `argptr`'s pointer half.
fn arg_ptr(n: usize) -> KernelResult<usize> {
    Ok(arg_int(n)? as u32 as usize)
}

/// Fetch the `n`-th argument as a NUL-terminated string, copying at
/// most [`MAXSTR`] bytes. Matches the original's `argstr`.
fn arg_str(n: usize) -> KernelResult<String> {
    let proc = sched::current().ok_or(KernelError::BadFileDescriptor)?;
    let addr = arg_ptr(n)?;
    fetch_str(proc.pgdir, addr)
}

/// Copy a NUL-terminated string out of user memory at `addr`, one byte
/// at a time, stopping at the NUL or [`MAXSTR`].
fn fetch_str(pgdir: usize, addr: usize) -> KernelResult<String> {
    let mut out = alloc::vec::Vec::with_capacity(32);
    for i in 0..MAXSTR {
        let mut byte = [0u8; 1];
        vmm::copyin(pgdir, &mut byte, addr + i)?;
        if byte[0] == 0 {
            return String::from_utf8(out).map_err(|_| KernelError::WrongFormat);
        }
        out.push(byte[0]);
    }
    Err(KernelError::WrongFormat)
}

/// The calling process's current working directory as an owned string,
/// for handlers that need to pass it to the FAT12 path resolver.
fn current_cwd() -> String {
    let proc = sched::current().expect("current_cwd: no current process");
    String::from(proc.cwd_str())
}

/// Entry point called from the trap handler on `T_SYSCALL`. Reads the
/// syscall number out of `eax`, dispatches, and writes the result (or
/// `-1` on error) back into `eax` -- matches the original's `syscall()`.
pub fn syscall() {
    let proc = sched::current().expect("syscall: no current process");
    let num = unsafe { (*proc.trapframe).eax };

    let result = dispatch(num);

    let proc = sched::current().expect("syscall: no current process");
    unsafe {
        (*proc.trapframe).eax = match result {
            Ok(v) => v as u32,
            Err(e) => e.to_errno() as u32,
        };
    }
}

fn dispatch(num: u32) -> KernelResult<i32> {
    match num {
        SYS_FORK => sysproc::sys_fork(),
        SYS_EXIT => sysproc::sys_exit(),
        SYS_WAIT => sysproc::sys_wait(),
        SYS_PIPE => sysfile::sys_pipe(),
        SYS_READ => sysfile::sys_read(),
        SYS_WRITE => sysfile::sys_write(),
        SYS_CLOSE => sysfile::sys_close(),
        SYS_KILL => sysproc::sys_kill(),
        SYS_EXEC => sysproc::sys_exec(),
        SYS_OPEN => sysfile::sys_open(),
        SYS_FSTAT => sysfile::sys_fstat(),
        SYS_DUP => sysfile::sys_dup(),
        SYS_GETPID => sysproc::sys_getpid(),
        SYS_SBRK => sysproc::sys_sbrk(),
        SYS_SLEEP => sysproc::sys_sleep(),
        SYS_UPTIME => sysproc::sys_uptime(),
        SYS_CHDIR => sysfile::sys_chdir(),
        SYS_GETCWD => sysfile::sys_getcwd(),
        _ => {
            log::warn!("syscall: unknown number {}", num);
            Err(KernelError::BadFileDescriptor)
        }
    }
}
