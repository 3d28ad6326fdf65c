//! Sleep-lock (spec.md §4.3): a lock that can be held across a context
//! switch, used by the buffer cache so a process waiting on disk I/O
//! doesn't spin with interrupts disabled. Built on top of a spinlock plus
//! sleep/wakeup exactly as the original's `sleeplock.c` builds it.

use core::cell::UnsafeCell;

use crate::sched;
use crate::sync::spinlock::SpinLock;

struct Inner {
    locked: bool,
    /// pid of the holder, for diagnostics (process-dump shows which
    /// process is holding a buffer's sleep-lock).
    pid: i32,
}

pub struct SleepLock<T: ?Sized> {
    guard_lock: SpinLock<Inner>,
    name: &'static str,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Sync for SleepLock<T> {}
unsafe impl<T: ?Sized + Send> Send for SleepLock<T> {}

pub struct SleepLockGuard<'a, T: ?Sized> {
    lock: &'a SleepLock<T>,
}

impl<T> SleepLock<T> {
    pub const fn new(name: &'static str, data: T) -> Self {
        SleepLock {
            guard_lock: SpinLock::new(name, Inner { locked: false, pid: -1 }),
            name,
            data: UnsafeCell::new(data),
        }
    }
}

impl<T: ?Sized> SleepLock<T> {
    fn chan(&self) -> usize {
        self as *const _ as *const () as usize
    }

    pub fn lock(&self) -> SleepLockGuard<'_, T> {
        let mut guard = self.guard_lock.lock();
        while guard.locked {
            guard = sched::sleep(self.chan(), guard);
        }
        guard.locked = true;
        guard.pid = sched::current_pid().unwrap_or(-1);
        drop(guard);
        SleepLockGuard { lock: self }
    }

    pub fn holding(&self) -> bool {
        self.guard_lock.lock().locked
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Raw pointer to the protected data, for use by the IDE interrupt
    /// handler: the process that issued a disk request holds this lock
    /// across the whole round trip (asleep, not touching `Data`), so the
    /// handler may write the completed sector in directly without being
    /// able to sleep itself to reacquire the lock.
    ///
    /// # Safety
    /// The caller must guarantee no other code is concurrently accessing
    /// the data (true for a buffer whose legitimate holder is currently
    /// blocked in `ide::read_write`).
    pub unsafe fn data_ptr(&self) -> *mut T {
        self.data.get()
    }
}

impl<'a, T: ?Sized> core::ops::Deref for SleepLockGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T: ?Sized> core::ops::DerefMut for SleepLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T: ?Sized> Drop for SleepLockGuard<'a, T> {
    fn drop(&mut self) {
        let mut inner = self.lock.guard_lock.lock();
        inner.locked = false;
        inner.pid = -1;
        let chan = self.lock.chan();
        drop(inner);
        sched::wakeup(chan);
    }
}
