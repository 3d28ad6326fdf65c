//! Virtual memory manager (spec.md §4.5): builds and edits two-level page
//! tables, switches CR3 on context switch, and grows/shrinks a process's
//! user address space. Mirrors the original's `vm.c` algorithms; this
//! kernel does not implement copy-on-write fork (spec.md Non-goals), so
//! `copy_user_space` does a full page-for-page copy like the original.

use crate::arch::{self, x86::gdt};
use crate::error::{KernelError, KernelResult};
use crate::mm::frame_allocator;
use crate::mm::page_table::{
    page_round_down, page_round_up, pdx, ptx, Entry, PageDirectory, PageTable, PteFlags,
};
use crate::param::PGSIZE;

/// Virtual address the kernel is linked at; everything below this is user
/// space. Matches the original's `KERNBASE`.
pub const KERNBASE: usize = 0x8000_0000;
/// Physical memory is identity-mapped at `KERNBASE + addr` for the kernel
/// mapping, up to this physical limit.
pub const PHYSTOP: usize = 0x0E00_0000;
/// Memory-mapped device space, above all usable RAM.
pub const DEVSPACE: usize = 0xFE00_0000;

extern "C" {
    /// Linker-provided end of the kernel image (text+rodata+data+bss).
    static kernel_end: u8;
}

fn v2p(va: usize) -> usize {
    va - KERNBASE
}

fn p2v(pa: usize) -> usize {
    pa + KERNBASE
}

struct KernelMapping {
    virt: usize,
    phys_start: usize,
    phys_end: usize,
    flags: PteFlags,
}

/// The four static regions every address space maps identically, in the
/// original's `kmap[]` order: I/O space below 1 MiB, the kernel's own
/// text+rodata, kernel data plus the rest of free RAM, and device space.
fn kernel_mapping_table() -> [KernelMapping; 4] {
    let kern_end = unsafe { &kernel_end as *const u8 as usize };
    [
        KernelMapping {
            virt: KERNBASE,
            phys_start: 0,
            phys_end: 0x10_0000,
            flags: PteFlags::WRITABLE,
        },
        KernelMapping {
            virt: p2v(0x10_0000),
            phys_start: 0x10_0000,
            phys_end: v2p(page_round_up(kern_end)),
            flags: PteFlags::empty(),
        },
        KernelMapping {
            virt: p2v(v2p(page_round_up(kern_end))),
            phys_start: v2p(page_round_up(kern_end)),
            phys_end: PHYSTOP,
            flags: PteFlags::WRITABLE,
        },
        KernelMapping {
            virt: DEVSPACE,
            phys_start: DEVSPACE - KERNBASE,
            phys_end: 0,
            flags: PteFlags::WRITABLE,
        },
    ]
}

unsafe fn pgdir_mut(pgdir: usize) -> &'static mut PageDirectory {
    &mut *(pgdir as *mut PageDirectory)
}

/// Walk `pgdir` to find (allocating intermediate page tables if `alloc`)
/// the PTE that maps `va`.
fn walk(pgdir: usize, va: usize, alloc: bool) -> KernelResult<*mut Entry> {
    unsafe {
        let dir = pgdir_mut(pgdir);
        let pde = &mut dir.entries[pdx(va)];
        let pgtab_phys = if pde.present() {
            pde.addr()
        } else {
            if !alloc {
                return Err(KernelError::NotFound);
            }
            let frame = frame_allocator::alloc()?;
            *pde = Entry::new(frame, PteFlags::PRESENT | PteFlags::WRITABLE | PteFlags::USER);
            frame
        };
        let table = &mut *(pgtab_phys as *mut PageTable);
        Ok(&mut table.entries[ptx(va)] as *mut Entry)
    }
}

/// Map `size` bytes starting at `va` to physical memory starting at `pa`,
/// with the given permission flags.
fn map_pages(pgdir: usize, va: usize, size: usize, pa: usize, flags: PteFlags) -> KernelResult<()> {
    let mut a = page_round_down(va);
    let last = page_round_down(va + size - 1);
    let mut pa = pa;
    loop {
        let pte = walk(pgdir, a, true)?;
        unsafe {
            if (*pte).present() {
                panic!("map_pages: remap");
            }
            *pte = Entry::new(pa, flags | PteFlags::PRESENT);
        }
        if a == last {
            break;
        }
        a += PGSIZE;
        pa += PGSIZE;
    }
    Ok(())
}

/// Allocate a fresh page directory and map the kernel into it. Used both
/// for the very first kernel-only address space and as the starting
/// point for every process's page directory.
pub fn setup_kernel_vm() -> KernelResult<usize> {
    let pgdir = frame_allocator::alloc()?;
    for region in kernel_mapping_table() {
        if region.phys_end <= region.phys_start {
            continue;
        }
        if let Err(e) = map_pages(
            pgdir,
            region.virt,
            region.phys_end - region.phys_start,
            region.phys_start,
            region.flags,
        ) {
            unsafe { free_pagetable(pgdir, 0) };
            return Err(e);
        }
    }
    Ok(pgdir)
}

static mut KPGDIR: usize = 0;

/// Build the kernel-only address space used while no process is running
/// on this CPU, and record it for [`switch_to_kernel_vm`].
pub fn init_kernel_vm() -> KernelResult<()> {
    let pgdir = setup_kernel_vm()?;
    unsafe {
        KPGDIR = pgdir;
    }
    switch_to_kernel_vm();
    Ok(())
}

/// Load CR3 with the kernel-only page directory. Used when no process is
/// running on this CPU (inside the scheduler loop between processes).
pub fn switch_to_kernel_vm() {
    unsafe {
        arch::x86::load_cr3(KPGDIR as u32);
    }
}

/// Switch CR3 to `pgdir` and point this CPU's TSS at `kstack_top` so the
/// next ring-3 -> ring-0 transition lands on the incoming process's
/// kernel stack. Called by the scheduler on every dispatch.
pub fn switch_to(pgdir: usize, kstack_top: usize) {
    gdt::set_kernel_stack(kstack_top as u32);
    unsafe {
        arch::x86::load_cr3(pgdir as u32);
    }
}

/// Grow a process's user address space from `old_size` to `new_size`,
/// allocating and mapping the newly covered pages. Rolls back any pages
/// it mapped if it runs out of memory partway through, matching the
/// original's `allocuvm`.
pub fn grow(pgdir: usize, old_size: usize, new_size: usize) -> KernelResult<usize> {
    if new_size >= KERNBASE {
        return Err(KernelError::OutOfMemory);
    }
    if new_size < old_size {
        return Ok(old_size);
    }
    let mut a = page_round_up(old_size);
    while a < new_size {
        match frame_allocator::alloc() {
            Ok(frame) => {
                if let Err(e) = map_pages(
                    pgdir,
                    a,
                    PGSIZE,
                    frame,
                    PteFlags::WRITABLE | PteFlags::USER,
                ) {
                    unsafe { frame_allocator::free(frame) };
                    shrink(pgdir, a, old_size);
                    return Err(e);
                }
            }
            Err(e) => {
                shrink(pgdir, a, old_size);
                return Err(e);
            }
        }
        a += PGSIZE;
    }
    Ok(new_size)
}

/// Shrink a process's user address space from `old_size` to `new_size`,
/// freeing the pages that fall out of range. Matches the original's
/// `deallocuvm`.
pub fn shrink(pgdir: usize, old_size: usize, new_size: usize) -> usize {
    if new_size >= old_size {
        return old_size;
    }
    let mut a = page_round_up(new_size);
    while a < old_size {
        if let Ok(pte) = walk(pgdir, a, false) {
            unsafe {
                if (*pte).present() {
                    let pa = (*pte).addr();
                    if pa != 0 {
                        frame_allocator::free(pa);
                    }
                    *pte = Entry::empty();
                }
            }
        }
        a += PGSIZE;
    }
    new_size
}

/// Free every present user page below `size`, every page-table frame the
/// directory points at, and finally the directory itself. Matches the
/// original's `freevm`.
///
/// # Safety
/// `pgdir` must not be the currently loaded CR3 and must not be used
/// again after this call.
pub unsafe fn free_pagetable(pgdir: usize, size: usize) {
    if size > 0 {
        shrink(pgdir, size, 0);
    }
    let dir = pgdir_mut(pgdir);
    for pde in dir.entries.iter() {
        if pde.present() {
            frame_allocator::free(pde.addr());
        }
    }
    frame_allocator::free(pgdir);
}

/// Duplicate a process's address space: a new page directory with the
/// same kernel mappings, and a page-for-page copy (not a COW share,
/// per spec.md's Non-goals) of every present user page below `size`.
pub fn copy_user_space(pgdir: usize, size: usize) -> KernelResult<usize> {
    let new_pgdir = setup_kernel_vm()?;
    let mut va = 0;
    while va < size {
        let pte = walk(pgdir, va, false)?;
        unsafe {
            if !(*pte).present() {
                panic!("copy_user_space: page not present");
            }
            let src_pa = (*pte).addr();
            let flags = (*pte).flags();
            match frame_allocator::alloc() {
                Ok(dst_pa) => {
                    core::ptr::copy_nonoverlapping(
                        src_pa as *const u8,
                        dst_pa as *mut u8,
                        PGSIZE,
                    );
                    if let Err(e) = map_pages(new_pgdir, va, PGSIZE, dst_pa, flags) {
                        frame_allocator::free(dst_pa);
                        free_pagetable(new_pgdir, va);
                        return Err(e);
                    }
                }
                Err(e) => {
                    free_pagetable(new_pgdir, va);
                    return Err(e);
                }
            }
        }
        va += PGSIZE;
    }
    Ok(new_pgdir)
}

/// Strip the `USER` bit from the page mapping `va`, turning it into an
/// inaccessible guard page below the user stack.
pub fn clear_user_bit(pgdir: usize, va: usize) {
    if let Ok(pte) = walk(pgdir, va, false) {
        unsafe {
            (*pte).clear_user();
        }
    }
    arch::x86::tlb_flush_all();
}

/// Load one section of an executable into an already-mapped user region:
/// for each page in `[va, va+size)`, if `offset == 0` zero the page (the
/// bss convention this design adopts for zero-offset sections), else
/// read a page's worth of bytes from `file` at the matching file offset
/// into the physical page backing `va`. Matches the original's
/// `loaduvm`.
pub fn load_segment(
    pgdir: usize,
    va: usize,
    file: &mut crate::fs::fat12::FatFile,
    offset: usize,
    size: usize,
) -> KernelResult<()> {
    if va % PGSIZE != 0 {
        panic!("load_segment: va not page-aligned");
    }
    let mut i = 0;
    while i < size {
        let pte = walk(pgdir, va + i, false)?;
        let pa = unsafe {
            if !(*pte).present() {
                return Err(KernelError::InvalidAddress { addr: va + i });
            }
            (*pte).addr()
        };
        let n = core::cmp::min(PGSIZE, size - i);
        let dst = unsafe { core::slice::from_raw_parts_mut(pa as *mut u8, n) };
        if offset == 0 {
            dst.fill(0);
        } else {
            file.position = (offset + i) as u32;
            let got = crate::fs::fat12::read(file, dst);
            if got != n {
                return Err(KernelError::WrongFormat);
            }
        }
        i += PGSIZE;
    }
    Ok(())
}

/// Copy `dst.len()` bytes from user virtual address `va` into `dst`,
/// the mirror image of [`copyout`]. Used by the syscall layer to fetch
/// arguments out of the calling process's address space.
pub fn copyin(pgdir: usize, dst: &mut [u8], va: usize) -> KernelResult<()> {
    let mut va = va;
    let mut off = 0usize;
    while off < dst.len() {
        let page_base = page_round_down(va);
        let pte = walk(pgdir, page_base, false)?;
        unsafe {
            if !(*pte).present() {
                return Err(KernelError::InvalidAddress { addr: va });
            }
            let pa = (*pte).addr();
            let page_off = va - page_base;
            let n = core::cmp::min(PGSIZE - page_off, dst.len() - off);
            core::ptr::copy_nonoverlapping(
                (pa + page_off) as *const u8,
                dst[off..off + n].as_mut_ptr(),
                n,
            );
            off += n;
            va += n;
        }
    }
    Ok(())
}

/// Copy `data` into the process's address space at user virtual address
/// `va`, walking the page table to find each destination page and
/// crossing page boundaries as needed. Matches the original's `copyout`.
pub fn copyout(pgdir: usize, va: usize, data: &[u8]) -> KernelResult<()> {
    let mut va = va;
    let mut off = 0usize;
    while off < data.len() {
        let page_base = page_round_down(va);
        let pte = walk(pgdir, page_base, false)?;
        unsafe {
            if !(*pte).present() {
                return Err(KernelError::InvalidAddress { addr: va });
            }
            let pa = (*pte).addr();
            let page_off = va - page_base;
            let n = core::cmp::min(PGSIZE - page_off, data.len() - off);
            core::ptr::copy_nonoverlapping(
                data[off..off + n].as_ptr(),
                (pa + page_off) as *mut u8,
                n,
            );
            off += n;
            va += n;
        }
    }
    Ok(())
}
