//! Mutual exclusion spinlock (spec.md §4.1).
//!
//! Disables interrupts on the owning CPU for as long as the lock is held
//! (directly, or nested under another held spinlock), so an interrupt
//! handler can never deadlock against code holding a lock it also wants.
//! `push_cli`/`pop_cli` nesting means a thread holding two spinlocks only
//! re-enables interrupts after releasing both.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::arch;

pub struct SpinLock<T: ?Sized> {
    locked: AtomicBool,
    name: &'static str,
    /// CPU id holding the lock, for diagnostics and the re-acquire panic
    /// check; meaningless while `locked` is false.
    holder: AtomicUsize,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Sync for SpinLock<T> {}
unsafe impl<T: ?Sized + Send> Send for SpinLock<T> {}

pub struct SpinLockGuard<'a, T: ?Sized> {
    lock: &'a SpinLock<T>,
}

impl<T> SpinLock<T> {
    pub const fn new(name: &'static str, data: T) -> Self {
        SpinLock {
            locked: AtomicBool::new(false),
            name,
            holder: AtomicUsize::new(usize::MAX),
            data: UnsafeCell::new(data),
        }
    }
}

impl<T: ?Sized> SpinLock<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// True if the calling CPU already holds this lock. Used by callers
    /// such as `sleep` that need to tell the process table lock apart
    /// from an arbitrary caller-supplied lock.
    pub fn holding(&self) -> bool {
        self.locked.load(Ordering::Acquire) && self.holder.load(Ordering::Relaxed) == arch::cpu_id()
    }

    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        arch::push_cli();
        if self.holding() {
            panic!("spinlock {}: already held by this cpu", self.name);
        }
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
        self.holder.store(arch::cpu_id(), Ordering::Relaxed);
        SpinLockGuard { lock: self }
    }

    fn unlock(&self) {
        if !self.holding() {
            panic!("spinlock {}: release by non-holder", self.name);
        }
        self.holder.store(usize::MAX, Ordering::Relaxed);
        self.locked.store(false, Ordering::Release);
        arch::pop_cli();
    }

    /// Raw pointer to the protected data, for use by `sleep`/`wakeup`
    /// which must drop and reacquire the lock around a context switch
    /// without the borrow checker seeing two live guards.
    ///
    /// # Safety
    /// The caller must already hold the lock (or otherwise guarantee
    /// exclusive access) for the lifetime of the returned pointer's use.
    pub unsafe fn data_ptr(&self) -> *mut T {
        self.data.get()
    }

    /// Release a lock that was acquired by a guard living on a different
    /// kernel stack than the one now executing -- `scheduler()` acquires
    /// the process table lock and `swtch`es into a process without that
    /// guard ever crossing the switch, so `forkret` must release it on
    /// that process's first timeslice without going through `Drop`.
    ///
    /// # Safety
    /// The calling CPU must actually hold this lock (acquired by whatever
    /// `swtch`ed into the code now running).
    pub unsafe fn force_unlock(&self) {
        self.unlock();
    }
}

impl<'a, T: ?Sized> core::ops::Deref for SpinLockGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T: ?Sized> core::ops::DerefMut for SpinLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T: ?Sized> Drop for SpinLockGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

impl<'a, T: ?Sized> SpinLockGuard<'a, T> {
    /// The lock this guard is borrowed from, for passing to `sleep`.
    pub fn lock_ref(&self) -> &'a SpinLock<T> {
        self.lock
    }
}
