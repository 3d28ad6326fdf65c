//! Compile-time kernel configuration constants.
//!
//! Mirrors the xv6-style `param.h` convention the original source follows:
//! fixed table sizes rather than runtime-configured limits.

/// Max number of CPUs this kernel's scheduler loop will drive.
#[cfg(feature = "smp")]
pub const NCPU: usize = 8;
#[cfg(not(feature = "smp"))]
pub const NCPU: usize = 1;

/// Max number of simultaneous processes.
pub const NPROC: usize = 64;

/// Max open files per process.
pub const NOFILE: usize = 16;

/// Max open files system-wide.
pub const NFILE: usize = 100;

/// Size of the disk buffer cache, in buffers.
pub const NBUF: usize = 30;

/// Max number of distinct device IDs (console, etc.).
pub const NDEV: usize = 10;

/// Device ID of the console.
pub const CONSOLE: usize = 1;

/// Max exec() argument count.
pub const MAXARG: usize = 32;

/// Page size in bytes.
pub const PGSIZE: usize = 4096;

/// Kernel stack size per process, in bytes.
pub const KSTACKSIZE: usize = PGSIZE;

/// Max size in bytes of a mounted FAT12 FAT that this kernel will load into
/// memory whole, per spec.md's buffer-cache-backed FAT12 reader.
pub const MAXFATSIZE: usize = 32 * 1024;

/// Max length of the current-working-directory string, including NUL.
pub const MAXCWDSIZE: usize = 128;

/// Max length of a process name, including NUL.
pub const NAME_MAX: usize = 16;

/// Max length of a DOS 8.3 file name component, including NUL.
pub const DOS_NAME_MAX: usize = 13;
