//! Pipes (spec.md §4.10): a one-page ring buffer shared by a read end
//! and a write end, each a separate entry in the global file table.

use crate::error::{KernelError, KernelResult};
use crate::fs::file::{self, FileHandle};
use crate::param::PGSIZE;
use crate::sched;
use crate::sync::SpinLock;

const RING_SIZE: usize = PGSIZE;
const NPIPE: usize = 16;

struct Ring {
    in_use: bool,
    data: [u8; RING_SIZE],
    write_count: usize,
    read_count: usize,
    read_open: bool,
    write_open: bool,
}

impl Ring {
    const fn unused() -> Self {
        Ring {
            in_use: false,
            data: [0; RING_SIZE],
            write_count: 0,
            read_count: 0,
            read_open: false,
            write_open: false,
        }
    }
}

static PIPES: SpinLock<[Ring; NPIPE]> = SpinLock::new("pipes", [const { Ring::unused() }; NPIPE]);

fn read_chan(id: usize) -> usize {
    0xC0DE_0000 + id * 2
}

fn write_chan(id: usize) -> usize {
    0xC0DE_0000 + id * 2 + 1
}

/// Allocate a ring plus two file-table entries, one read-only one
/// write-only, both pointing at it. Rolls back everything on partial
/// failure. Matches the original's `pipealloc`.
pub fn alloc() -> KernelResult<(FileHandle, FileHandle)> {
    let mut pipes = PIPES.lock();
    let id = pipes
        .iter()
        .position(|p| !p.in_use)
        .ok_or(KernelError::OutOfMemory)?;
    pipes[id] = Ring {
        in_use: true,
        data: [0; RING_SIZE],
        write_count: 0,
        read_count: 0,
        read_open: true,
        write_open: true,
    };
    drop(pipes);

    let read_handle = match file::alloc() {
        Ok(h) => h,
        Err(e) => {
            mark_unused(id);
            return Err(e);
        }
    };
    let write_handle = match file::alloc() {
        Ok(h) => h,
        Err(e) => {
            file::close(read_handle);
            mark_unused(id);
            return Err(e);
        }
    };

    file::set_pipe(read_handle, id, false);
    file::set_pipe(write_handle, id, true);
    Ok((read_handle, write_handle))
}

fn mark_unused(id: usize) {
    let mut pipes = PIPES.lock();
    pipes[id].in_use = false;
}

/// Write `buf` into the ring one byte at a time, blocking while full.
/// Matches the original's `pipewrite`.
pub fn write(id: usize, buf: &[u8]) -> KernelResult<usize> {
    let mut pipes = PIPES.lock();
    let mut i = 0;
    while i < buf.len() {
        if pipes[id].write_count == pipes[id].read_count + RING_SIZE {
            if !pipes[id].read_open || killed_current() {
                return Err(KernelError::BrokenPipe);
            }
            sched::wakeup(read_chan(id));
            pipes = sched::sleep(write_chan(id), pipes);
            continue;
        }
        let slot = pipes[id].write_count % RING_SIZE;
        pipes[id].data[slot] = buf[i];
        pipes[id].write_count += 1;
        i += 1;
    }
    sched::wakeup(read_chan(id));
    Ok(buf.len())
}

/// Drain up to `buf.len()` bytes, blocking while empty and the writer is
/// still open. Matches the original's `piperead`.
pub fn read(id: usize, buf: &mut [u8]) -> KernelResult<usize> {
    let mut pipes = PIPES.lock();
    while pipes[id].read_count == pipes[id].write_count && pipes[id].write_open {
        if killed_current() {
            return Err(KernelError::WouldBlock);
        }
        pipes = sched::sleep(read_chan(id), pipes);
    }

    let mut n = 0;
    while n < buf.len() && pipes[id].read_count < pipes[id].write_count {
        let slot = pipes[id].read_count % RING_SIZE;
        buf[n] = pipes[id].data[slot];
        pipes[id].read_count += 1;
        n += 1;
    }
    sched::wakeup(write_chan(id));
    Ok(n)
}

/// Close one end; wake the opposite end; free the ring once both ends
/// are closed. Matches the original's `pipeclose`.
pub fn close(id: usize, writable_end: bool) {
    let mut pipes = PIPES.lock();
    if writable_end {
        pipes[id].write_open = false;
        sched::wakeup(read_chan(id));
    } else {
        pipes[id].read_open = false;
        sched::wakeup(write_chan(id));
    }
    if !pipes[id].read_open && !pipes[id].write_open {
        pipes[id].in_use = false;
    }
}

fn killed_current() -> bool {
    sched::current().map(|p| p.killed).unwrap_or(false)
}
