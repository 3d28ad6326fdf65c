//! File-related system calls (spec.md §6). Matches the original's
//! `sysfile.c` one function per syscall, with file descriptors resolved
//! against the calling process's own `open_files` table before any
//! global-file-table call is made.

use alloc::string::String;

use crate::error::{KernelError, KernelResult};
use crate::fs::fat12::{self, EntryTag};
use crate::fs::file::{self, FileHandle};
use crate::fs::pipe;
use crate::mm::vmm;
use crate::param::{MAXCWDSIZE, NOFILE};
use crate::sched;

use super::{arg_int, arg_ptr, arg_str};

const O_RDONLY: i32 = 0;
const O_WRONLY: i32 = 1;
const O_RDWR: i32 = 2;

/// Resolve the `n`-th argument as a file descriptor: an index into the
/// calling process's own `open_files` table, not the global file table
/// directly. Matches the original's `argfd`.
fn arg_fd(n: usize) -> KernelResult<(usize, FileHandle)> {
    let fd = arg_int(n)?;
    if fd < 0 || fd as usize >= NOFILE {
        return Err(KernelError::BadFileDescriptor);
    }
    let fd = fd as usize;
    let proc = sched::current().ok_or(KernelError::BadFileDescriptor)?;
    let handle = proc.open_files[fd].ok_or(KernelError::BadFileDescriptor)?;
    Ok((fd, handle))
}

/// Install `handle` in the calling process's first free descriptor slot.
/// Matches the original's `fdalloc`.
fn fd_alloc(handle: FileHandle) -> KernelResult<i32> {
    let proc = sched::current().ok_or(KernelError::BadFileDescriptor)?;
    let slot = proc
        .open_files
        .iter()
        .position(|f| f.is_none())
        .ok_or(KernelError::OutOfFiles)?;
    proc.open_files[slot] = Some(handle);
    Ok(slot as i32)
}

pub fn sys_dup() -> KernelResult<i32> {
    let (_, handle) = arg_fd(0)?;
    let dup_handle = file::dup(handle);
    match fd_alloc(dup_handle) {
        Ok(fd) => Ok(fd),
        Err(e) => {
            file::close(dup_handle);
            Err(e)
        }
    }
}

pub fn sys_read() -> KernelResult<i32> {
    let (_, handle) = arg_fd(0)?;
    let addr = arg_ptr(1)?;
    let n = arg_int(2)?;
    if n < 0 {
        return Err(KernelError::InvalidAddress { addr });
    }
    let n = n as usize;

    let proc = sched::current().ok_or(KernelError::BadFileDescriptor)?;
    let pgdir = proc.pgdir;

    let mut buf = alloc::vec![0u8; n];
    let got = file::read(handle, &mut buf)?;
    vmm::copyout(pgdir, addr, &buf[..got])?;
    Ok(got as i32)
}

pub fn sys_write() -> KernelResult<i32> {
    let (_, handle) = arg_fd(0)?;
    let addr = arg_ptr(1)?;
    let n = arg_int(2)?;
    if n < 0 {
        return Err(KernelError::InvalidAddress { addr });
    }
    let n = n as usize;

    let proc = sched::current().ok_or(KernelError::BadFileDescriptor)?;
    let pgdir = proc.pgdir;

    let mut buf = alloc::vec![0u8; n];
    vmm::copyin(pgdir, &mut buf, addr)?;
    let put = file::write(handle, &buf)?;
    Ok(put as i32)
}

pub fn sys_close() -> KernelResult<i32> {
    let (fd, handle) = arg_fd(0)?;
    let proc = sched::current().ok_or(KernelError::BadFileDescriptor)?;
    proc.open_files[fd] = None;
    file::close(handle);
    Ok(0)
}

pub fn sys_fstat() -> KernelResult<i32> {
    let (_, handle) = arg_fd(0)?;
    file::stat(handle)?;
    Ok(0)
}

/// Map `flags` to readable/writable. Matches the original's `sys_open`;
/// disk files are read-only in this design, so `O_WRONLY`/`O_RDWR` are
/// accepted here but any subsequent write fails inside `file::write`.
pub fn sys_open() -> KernelResult<i32> {
    let path = arg_str(0)?;
    let flags = arg_int(1)?;

    let cwd = super::current_cwd();
    let fat_file = fat12::open(&cwd, &path, false)?;

    let readable = flags == O_RDONLY || flags == O_RDWR;
    let writable = flags == O_WRONLY || flags == O_RDWR;

    let handle = file::alloc()?;
    file::set_fat(handle, fat_file, readable, writable);

    match fd_alloc(handle) {
        Ok(fd) => Ok(fd),
        Err(e) => {
            file::close(handle);
            Err(e)
        }
    }
}

pub fn sys_pipe() -> KernelResult<i32> {
    let addr = arg_ptr(0)?;
    let (read_handle, write_handle) = pipe::alloc()?;

    let read_fd = match fd_alloc(read_handle) {
        Ok(fd) => fd,
        Err(e) => {
            file::close(read_handle);
            file::close(write_handle);
            return Err(e);
        }
    };
    let write_fd = match fd_alloc(write_handle) {
        Ok(fd) => fd,
        Err(e) => {
            let proc = sched::current().expect("sys_pipe: no current process");
            proc.open_files[read_fd as usize] = None;
            file::close(read_handle);
            file::close(write_handle);
            return Err(e);
        }
    };

    let proc = sched::current().ok_or(KernelError::BadFileDescriptor)?;
    let pgdir = proc.pgdir;
    let mut bytes = [0u8; 8];
    bytes[0..4].copy_from_slice(&(read_fd as u32).to_le_bytes());
    bytes[4..8].copy_from_slice(&(write_fd as u32).to_le_bytes());
    vmm::copyout(pgdir, addr, &bytes)?;
    Ok(0)
}

/// Normalize `path` to end in a path separator before storing it as the
/// new cwd. The original dereferences `strchr(directory, '/')`
/// unconditionally to find where to splice in a trailing slash, which is
/// undefined when the path has no `/` at all; this only appends one when
/// neither separator is already present, so there is never a null result
/// to dereference.
fn normalized_cwd(path: &str) -> String {
    if path.ends_with('/') || path.ends_with('\\') || path.contains('/') || path.contains('\\') {
        String::from(path)
    } else {
        let mut s = String::from(path);
        s.push('/');
        s
    }
}

pub fn sys_chdir() -> KernelResult<i32> {
    let path = arg_str(0)?;
    let cwd = super::current_cwd();

    let dir = fat12::open(&cwd, &path, true)?;
    if dir.tag != EntryTag::Dir {
        return Err(KernelError::NotADirectory);
    }

    let new_cwd = normalized_cwd(&path);
    let proc = sched::current().expect("sys_chdir: no current process");
    proc.set_cwd(new_cwd.as_bytes());
    Ok(0)
}

pub fn sys_getcwd() -> KernelResult<i32> {
    let addr = arg_ptr(0)?;
    let size = arg_int(1)?;
    if size < 0 {
        return Err(KernelError::InvalidAddress { addr });
    }
    let size = size as usize;

    let proc = sched::current().expect("sys_getcwd: no current process");
    let cwd = proc.cwd_str();
    let n = cwd.len().min(size.saturating_sub(1)).min(MAXCWDSIZE - 1);

    let mut bytes = alloc::vec::Vec::with_capacity(n + 1);
    bytes.extend_from_slice(&cwd.as_bytes()[..n]);
    bytes.push(0);

    vmm::copyout(proc.pgdir, addr, &bytes)?;
    Ok(n as i32)
}
