//! Global open-file table (spec.md §4.9): fixed NFILE entries behind one
//! spinlock, tag-dispatched to the FAT reader, a pipe, or a device
//! function table -- replacing the original's tagged union and switch
//! with a Rust enum and `match`.

use crate::console;
use crate::error::{KernelError, KernelResult};
use crate::fs::{fat12, pipe};
use crate::param::{CONSOLE, NDEV, NFILE};
use crate::sync::SpinLock;

pub type FileHandle = usize;

#[derive(Clone, Copy)]
enum Kind {
    None,
    Fat(fat12::FatFile),
    Pipe { id: usize, writable_end: bool },
    Device(usize),
}

#[derive(Clone, Copy)]
struct Entry {
    refcount: usize,
    readable: bool,
    writable: bool,
    kind: Kind,
}

impl Entry {
    const fn none() -> Self {
        Entry {
            refcount: 0,
            readable: false,
            writable: false,
            kind: Kind::None,
        }
    }
}

static FILE_TABLE: SpinLock<[Entry; NFILE]> = SpinLock::new("file table", [Entry::none(); NFILE]);

/// Per-device read/write entry points, indexed by `DeviceID`. Matches
/// the original's `devsw[]`; `CONSOLE` is the only populated slot this
/// kernel ships.
type DevRead = fn(&mut [u8]) -> KernelResult<usize>;
type DevWrite = fn(&[u8]) -> KernelResult<usize>;

static DEVSW: [Option<(DevRead, DevWrite)>; NDEV] = {
    let mut table: [Option<(DevRead, DevWrite)>; NDEV] = [None; NDEV];
    table[CONSOLE] = Some((console::read as DevRead, console::write as DevWrite));
    table
};

/// Find an unused slot and reserve it with refcount 1. Matches the
/// original's `filealloc`.
pub fn alloc() -> KernelResult<FileHandle> {
    let mut table = FILE_TABLE.lock();
    let idx = table
        .iter()
        .position(|e| e.refcount == 0)
        .ok_or(KernelError::OutOfFiles)?;
    table[idx] = Entry {
        refcount: 1,
        readable: false,
        writable: false,
        kind: Kind::None,
    };
    Ok(idx)
}

pub fn set_fat(handle: FileHandle, file: fat12::FatFile, readable: bool, writable: bool) {
    let mut table = FILE_TABLE.lock();
    table[handle].kind = Kind::Fat(file);
    table[handle].readable = readable;
    table[handle].writable = writable;
}

pub fn set_pipe(handle: FileHandle, id: usize, writable_end: bool) {
    let mut table = FILE_TABLE.lock();
    table[handle].kind = Kind::Pipe { id, writable_end };
    table[handle].readable = !writable_end;
    table[handle].writable = writable_end;
}

pub fn set_device(handle: FileHandle, dev: usize, readable: bool, writable: bool) {
    let mut table = FILE_TABLE.lock();
    table[handle].kind = Kind::Device(dev);
    table[handle].readable = readable;
    table[handle].writable = writable;
}

/// Bump refcount. Matches the original's `filedup`.
pub fn dup(handle: FileHandle) -> FileHandle {
    let mut table = FILE_TABLE.lock();
    table[handle].refcount += 1;
    handle
}

/// Decrement refcount; on reaching 0, snapshot the fields, clear the
/// slot, release the table lock, then perform tag-specific teardown.
/// Matches the original's `fileclose`.
pub fn close(handle: FileHandle) {
    let kind = {
        let mut table = FILE_TABLE.lock();
        if table[handle].refcount == 0 {
            return;
        }
        table[handle].refcount -= 1;
        if table[handle].refcount > 0 {
            return;
        }
        let kind = table[handle].kind;
        table[handle] = Entry::none();
        kind
    };

    if let Kind::Pipe { id, writable_end } = kind {
        pipe::close(id, writable_end);
    }
}

fn snapshot(handle: FileHandle) -> (bool, bool, Kind) {
    let table = FILE_TABLE.lock();
    (table[handle].readable, table[handle].writable, table[handle].kind)
}

fn writeback_fat(handle: FileHandle, file: fat12::FatFile) {
    let mut table = FILE_TABLE.lock();
    table[handle].kind = Kind::Fat(file);
}

/// Read up to `buf.len()` bytes. Matches the original's `fileread`.
pub fn read(handle: FileHandle, buf: &mut [u8]) -> KernelResult<usize> {
    let (readable, _, kind) = snapshot(handle);
    if !readable {
        return Err(KernelError::BadFileDescriptor);
    }
    match kind {
        Kind::None => Err(KernelError::BadFileDescriptor),
        Kind::Fat(mut file) => {
            let n = fat12::read(&mut file, buf);
            writeback_fat(handle, file);
            Ok(n)
        }
        Kind::Pipe { id, .. } => pipe::read(id, buf),
        Kind::Device(dev) => match DEVSW.get(dev).and_then(|d| *d) {
            Some((read_fn, _)) => read_fn(buf),
            None => Err(KernelError::BadFileDescriptor),
        },
    }
}

/// Write `buf`. Matches the original's `filewrite`; disk files are
/// read-only in this design (spec.md §6), so `Fat` always fails.
pub fn write(handle: FileHandle, buf: &[u8]) -> KernelResult<usize> {
    let (_, writable, kind) = snapshot(handle);
    if !writable {
        return Err(KernelError::BadFileDescriptor);
    }
    match kind {
        Kind::None => Err(KernelError::BadFileDescriptor),
        Kind::Fat(_) => Err(KernelError::WrongFormat),
        Kind::Pipe { id, .. } => pipe::write(id, buf),
        Kind::Device(dev) => match DEVSW.get(dev).and_then(|d| *d) {
            Some((_, write_fn)) => write_fn(buf),
            None => Err(KernelError::BadFileDescriptor),
        },
    }
}

/// `fstat` on a FILE/DIR is a stub that returns success without filling
/// in the output record, per spec.md's documented Open Question --
/// preserved rather than "fixed" because no syscall caller in this
/// design reads the stat buffer back yet.
pub fn stat(handle: FileHandle) -> KernelResult<()> {
    let (_, _, kind) = snapshot(handle);
    match kind {
        Kind::None => Err(KernelError::BadFileDescriptor),
        _ => Ok(()),
    }
}
