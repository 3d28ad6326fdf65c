//! Physical page-frame allocator (spec.md §4.4): a free list of 4 KiB
//! frames threaded through the free frames themselves, exactly as the
//! original's `kalloc.c` builds it.
//!
//! Boot hands memory over in two calls, mirroring the original's
//! `kinit1`/`kinit2` split: a small low range is seeded first so the
//! kernel has frames to build its own page tables from, then the rest of
//! physical memory is added once the VM layout is final.

use core::mem::size_of;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::error::{KernelError, KernelResult};
use crate::param::PGSIZE;
use crate::sync::SpinLock;

/// A free frame's first machine word doubles as the next-pointer; every
/// frame on the list is poisoned with `0x55` so a stray read of freed
/// memory isn't silently mistaken for real data.
#[repr(C)]
struct Run {
    next: *mut Run,
}

unsafe impl Send for Run {}

static FREE_LIST: SpinLock<*mut Run> = SpinLock::new("kmem", core::ptr::null_mut());

/// Mirrors the original's `kmem.use_lock`: false during the bootstrap
/// phase seeded by `init_low`, before the kernel's own page tables (and
/// therefore the rest of the locking machinery) are up, and flipped to
/// true by `enable_locking` once `init_high` hands over the remaining
/// physical memory.
static USE_LOCK: AtomicBool = AtomicBool::new(false);

/// Switch the allocator from the unlocked bootstrap phase to normal
/// locked operation. Called once, after the kernel VM is fully installed.
pub fn enable_locking() {
    USE_LOCK.store(true, Ordering::SeqCst);
}

/// Run `f` against the free-list head, taking `FREE_LIST` only once
/// `enable_locking` has run. Before that point this kernel is still
/// single-cpu with interrupts not yet fully set up for the lock's
/// `push_cli` bookkeeping to matter, so the original's `kinit1`-phase
/// direct access is used instead.
fn with_head<R>(f: impl FnOnce(&mut *mut Run) -> R) -> R {
    if USE_LOCK.load(Ordering::SeqCst) {
        let mut head = FREE_LIST.lock();
        f(&mut head)
    } else {
        f(unsafe { &mut *FREE_LIST.data_ptr() })
    }
}

fn poison(frame: *mut u8) {
    unsafe {
        core::ptr::write_bytes(frame, 0x55, PGSIZE);
    }
}

fn align_up(addr: usize, align: usize) -> usize {
    (addr + align - 1) & !(align - 1)
}

fn push_range(head: &mut *mut Run, start: usize, end: usize) {
    assert!(size_of::<Run>() <= PGSIZE);
    let mut addr = align_up(start, PGSIZE);
    while addr + PGSIZE <= end {
        let frame = addr as *mut u8;
        poison(frame);
        let run = frame as *mut Run;
        unsafe {
            (*run).next = *head;
        }
        *head = run;
        addr += PGSIZE;
    }
}

/// Seed the free list from a physical address range. Safe to call more
/// than once (boot calls it once for the low range below the kernel
/// image and once more for the rest of physical memory).
pub fn add_range(start: usize, end: usize) {
    with_head(|head| push_range(head, start, end));
}

/// Allocate one 4 KiB physical frame, zeroed.
pub fn alloc() -> KernelResult<usize> {
    with_head(|head| {
        let run = *head;
        if run.is_null() {
            return Err(KernelError::OutOfMemory);
        }
        unsafe {
            *head = (*run).next;
            let frame = run as *mut u8;
            core::ptr::write_bytes(frame, 0, PGSIZE);
            Ok(frame as usize)
        }
    })
}

/// Free a previously allocated 4 KiB frame back to the list.
///
/// # Safety
/// `frame` must be a page-aligned address previously returned by
/// [`alloc`], and must not be referenced again after this call.
pub unsafe fn free(frame: usize) {
    assert_eq!(frame % PGSIZE, 0, "kfree: unaligned frame");
    poison(frame as *mut u8);
    let run = frame as *mut Run;
    with_head(|head| {
        (*run).next = *head;
        *head = run;
    });
}
