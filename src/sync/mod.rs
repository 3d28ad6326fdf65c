//! Low-level synchronization primitives (spec.md §4.1, §4.3).

pub mod sleeplock;
pub mod spinlock;

pub use sleeplock::{SleepLock, SleepLockGuard};
pub use spinlock::{SpinLock, SpinLockGuard};
