//! Program loading (spec.md §4.11): replaces the calling process's
//! address space with a freshly loaded PE image and a freshly built
//! argument stack. Matches the original's `exec`, adapted to the PE
//! section-header layout instead of ELF program headers.

use alloc::vec::Vec;

use crate::error::{KernelError, KernelResult};
use crate::fs::fat12::{self, EntryTag, FatFile};
use crate::mm::page_table::page_round_up;
use crate::mm::vmm;
use crate::param::{KSTACKSIZE, MAXARG, PGSIZE};
use crate::pe;
use crate::sched;

/// Longest argument string this loader will copy onto the user stack,
/// including its terminating NUL.
const MAXARGLEN: usize = 128;

/// Walk the section table, growing `pgdir` and loading each section's
/// bytes in turn. Returns the address space size just past the highest
/// section. A `VirtualAddress` that isn't page-aligned, or a section
/// read that runs short, fails the whole load.
fn load_sections(
    pgdir: usize,
    file: &mut FatFile,
    file_header: &pe::FileHeader,
    sections_offset: u32,
) -> KernelResult<usize> {
    let mut size = 0usize;
    for i in 0..file_header.number_of_sections as u32 {
        let offset = sections_offset + i * pe::section_header_size();
        let section = pe::read_section_header(file, offset)?;
        if section.virtual_address as usize % PGSIZE != 0 {
            return Err(KernelError::WrongFormat);
        }
        let end = section.virtual_address as usize + section.actual_size as usize;
        size = vmm::grow(pgdir, size, end)?;
        vmm::load_segment(
            pgdir,
            section.virtual_address as usize,
            file,
            section.offset_in_exe_file as usize,
            section.actual_size as usize,
        )?;
    }
    Ok(size)
}

/// Load the PE image at `path` (resolved against the calling process's
/// cwd) and commit it as the calling process's new program image, with
/// `argv` copied onto a fresh user stack. On any failure before the
/// final commit the caller's address space is left exactly as it was;
/// the file is just a local [`FatFile`] value, so there is nothing to
/// close on any of those paths.
pub fn exec(cwd: &str, path: &str, argv: &[&[u8]]) -> KernelResult<()> {
    if argv.len() >= MAXARG {
        return Err(KernelError::WrongFormat);
    }

    let mut file = fat12::open(cwd, path, false)?;
    if file.tag != EntryTag::File {
        return Err(KernelError::NotADirectory);
    }

    let (file_header, optional_header, sections_offset) = pe::read_headers(&mut file)?;

    let pgdir = vmm::setup_kernel_vm()?;
    let size = match load_sections(pgdir, &mut file, &file_header, sections_offset) {
        Ok(size) => size,
        Err(e) => {
            unsafe { vmm::free_pagetable(pgdir, 0) };
            return Err(e);
        }
    };

    // Two more pages past the image: a guard page, then the user stack.
    let base = page_round_up(size);
    let new_size = match vmm::grow(pgdir, base, base + 2 * PGSIZE) {
        Ok(s) => s,
        Err(e) => {
            unsafe { vmm::free_pagetable(pgdir, base) };
            return Err(e);
        }
    };
    vmm::clear_user_bit(pgdir, new_size - 2 * PGSIZE);

    let mut sp = new_size;
    let mut arg_ptrs = [0u32; MAXARG + 1];

    for (i, arg) in argv.iter().enumerate() {
        if arg.len() + 1 > MAXARGLEN {
            unsafe { vmm::free_pagetable(pgdir, new_size) };
            return Err(KernelError::WrongFormat);
        }
        sp = (sp - (arg.len() + 1)) & !3usize;
        let mut with_nul = Vec::with_capacity(arg.len() + 1);
        with_nul.extend_from_slice(arg);
        with_nul.push(0);
        if vmm::copyout(pgdir, sp, &with_nul).is_err() {
            unsafe { vmm::free_pagetable(pgdir, new_size) };
            return Err(KernelError::InvalidAddress { addr: sp });
        }
        arg_ptrs[i] = sp as u32;
    }
    arg_ptrs[argv.len()] = 0;

    sp -= (argv.len() + 1) * 4;
    sp &= !3usize;
    let argv_ptr = sp as u32;
    {
        let mut bytes = Vec::with_capacity((argv.len() + 1) * 4);
        for p in &arg_ptrs[..argv.len() + 1] {
            bytes.extend_from_slice(&p.to_le_bytes());
        }
        if vmm::copyout(pgdir, sp, &bytes).is_err() {
            unsafe { vmm::free_pagetable(pgdir, new_size) };
            return Err(KernelError::InvalidAddress { addr: sp });
        }
    }

    // Fake return address, argc, argv -- the layout _start expects.
    let ustack = [0xFFFF_FFFFu32, argv.len() as u32, argv_ptr];
    sp -= ustack.len() * 4;
    {
        let mut bytes = Vec::with_capacity(ustack.len() * 4);
        for w in &ustack {
            bytes.extend_from_slice(&w.to_le_bytes());
        }
        if vmm::copyout(pgdir, sp, &bytes).is_err() {
            unsafe { vmm::free_pagetable(pgdir, new_size) };
            return Err(KernelError::InvalidAddress { addr: sp });
        }
    }

    let base_name = path.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(path);

    let proc = sched::current().expect("exec: no current process");
    let old_pgdir = proc.pgdir;
    let old_size = proc.size;
    proc.pgdir = pgdir;
    proc.size = new_size;
    proc.set_name(base_name.as_bytes());
    unsafe {
        (*proc.trapframe).eip = optional_header.address_of_entry_point;
        (*proc.trapframe).esp = sp as u32;
    }
    let kstack_top = proc.kstack + vmm::KERNBASE + KSTACKSIZE;
    vmm::switch_to(pgdir, kstack_top);
    unsafe { vmm::free_pagetable(old_pgdir, old_size) };

    Ok(())
}
