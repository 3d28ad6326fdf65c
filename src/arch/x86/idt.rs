//! Interrupt Descriptor Table.
//!
//! spec.md §1 names "trap-vector stubs and IDT encoding" as an external
//! collaborator this kernel's design does not own: the dispatch *logic*
//! (`trap.rs`) is in scope, but the raw gate encoding and the assembly
//! stubs that build a `Trapframe` on the kernel stack are boundary code
//! supplied by the platform layer. This module records the vector
//! numbers that boundary is expected to wire up to `trap::handle`, so the
//! rest of the kernel has a single source of truth for them.

pub const T_DIVIDE: u8 = 0;
pub const T_DEBUG: u8 = 1;
pub const T_NMI: u8 = 2;
pub const T_BRKPT: u8 = 3;
pub const T_GPFLT: u8 = 13;
pub const T_PGFLT: u8 = 14;

/// IRQ vectors are remapped past the CPU exception range, matching the
/// original's `T_IRQ0 = 32`.
pub const T_IRQ0: u8 = 32;
pub const IRQ_TIMER: u8 = 0;
pub const IRQ_KBD: u8 = 1;
pub const IRQ_IDE: u8 = 14;

pub const T_SYSCALL: u8 = 64;

/// Loading the IDT is part of the out-of-scope vector-stub boundary
/// (spec.md §1); this is a no-op placeholder for where that boundary's
/// `lidt` call belongs in the boot sequence.
pub fn init() {}
