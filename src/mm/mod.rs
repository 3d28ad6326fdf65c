//! Memory management: physical frame allocator, two-level page tables,
//! and the virtual-memory manager (spec.md §4.4-§4.5).

pub mod frame_allocator;
pub mod page_table;
pub mod vmm;

use crate::param::PGSIZE;

extern "C" {
    static kernel_end: u8;
}

/// Seed the physical frame allocator and bring up the kernel-only address
/// space. Called once at boot, after the boot loader has identified
/// usable physical memory (spec.md §6's boot contract: "lower-half page
/// allocator" happens before the VM is live, so this only adds memory
/// below 4 MiB; the remaining physical range is handed over once the
/// kernel's own page tables are in place and the upper-half region is
/// known to be free).
pub fn init_low(phys_end_low: usize) {
    let kern_end = unsafe { &kernel_end as *const u8 as usize };
    let start = page_table::page_round_up(kern_end - vmm::KERNBASE);
    frame_allocator::add_range(start, phys_end_low);
}

/// Hand over the remaining physical memory once the kernel's own paging
/// is active (spec.md §6's "upper-half page allocator" boot step), and
/// switch the allocator over to locked operation now that the rest of
/// the kernel (and its SMP bring-up) can rely on spinlocks working.
pub fn init_high(phys_start: usize, phys_end: usize) {
    let start = page_table::page_round_up(phys_start);
    let end = page_table::page_round_down(phys_end.min(vmm::PHYSTOP));
    if end > start {
        frame_allocator::add_range(start, end);
    }
    frame_allocator::enable_locking();
}

pub const fn page_round_up(addr: usize) -> usize {
    page_table::page_round_up(addr)
}

pub const fn page_round_down(addr: usize) -> usize {
    page_table::page_round_down(addr)
}

pub const PAGE_SIZE: usize = PGSIZE;
