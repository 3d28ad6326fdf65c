//! Global Descriptor Table and per-CPU Task State Segment.
//!
//! The CPU descriptor in this kernel's data model carries "a task-state
//! segment and local GDT" (spec.md §3): `switch_to` rewrites `esp0` in the
//! TSS on every context switch so that a ring-3 -> ring-0 transition lands
//! on the incoming process's kernel stack. Segment descriptor *encoding*
//! itself is the out-of-scope boundary named in spec.md §1; this module
//! builds the flat kernel/user segments xv6-style kernels use by hand
//! (the same bit layout the original's `gdt.c` / `mmu.h` macros produce)
//! and exposes the one field the VMM touches at runtime.

use core::mem::size_of;

use x86::dtables::{lgdt, DescriptorTablePointer};
use x86::segmentation::SegmentSelector;
use x86::Ring;

pub const SEG_KCODE: u16 = 1;
pub const SEG_KDATA: u16 = 2;
pub const SEG_UCODE: u16 = 3;
pub const SEG_UDATA: u16 = 4;
pub const SEG_TSS: u16 = 5;

pub const NSEGS: usize = 6;

const STA_X: u8 = 0x8; // executable
const STA_W: u8 = 0x2; // writable (data) / readable (code)
const STA_R: u8 = 0x2; // readable (code)

/// Build one flat 32-bit segment descriptor, base/limit/type/dpl encoded
/// exactly like the original's `SEG(type, base, lim, dpl)` macro.
const fn seg_descriptor(type_bits: u8, base: u32, limit: u32, dpl: u8) -> u64 {
    let limit_scaled = limit >> 12;
    let mut d: u64 = 0;
    d |= (limit_scaled as u64 & 0xFFFF) << 0;
    d |= (base as u64 & 0xFFFFFF) << 16;
    d |= ((0x90 | type_bits) as u64) << 40; // present, dpl patched below
    d |= (((dpl & 0x3) as u64) << 45);
    d |= (((limit_scaled >> 16) as u64 & 0xF)) << 48;
    d |= 0xC << 52; // granularity=4K, D/B=1 (32-bit)
    d |= ((base >> 24) as u64 & 0xFF) << 56;
    d
}

pub fn selector(seg: u16, ring: Ring) -> u16 {
    SegmentSelector::new(seg, ring).bits()
}

/// 32-bit Task State Segment. Only the fields the kernel actually reads or
/// writes are non-reserved-zero; `switch_to` writes `esp0`/`ss0` on every
/// reschedule onto this CPU.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct TaskStateSegment {
    pub link: u16,
    _r0: u16,
    pub esp0: u32,
    pub ss0: u16,
    _r1: u16,
    pub esp1: u32,
    pub ss1: u16,
    _r2: u16,
    pub esp2: u32,
    pub ss2: u16,
    _r3: u16,
    pub cr3: u32,
    pub eip: u32,
    pub eflags: u32,
    pub eax: u32,
    pub ecx: u32,
    pub edx: u32,
    pub ebx: u32,
    pub esp: u32,
    pub ebp: u32,
    pub esi: u32,
    pub edi: u32,
    pub es: u16,
    _r4: u16,
    pub cs: u16,
    _r5: u16,
    pub ss: u16,
    _r6: u16,
    pub ds: u16,
    _r7: u16,
    pub fs: u16,
    _r8: u16,
    pub gs: u16,
    _r9: u16,
    pub ldt: u16,
    _r10: u16,
    pub trap: u16,
    /// Set above the segment limit so no I/O permission bitmap is present,
    /// matching the original's `iomb = 0xFFFF`.
    pub iomb: u16,
}

impl TaskStateSegment {
    pub const fn new() -> Self {
        // SAFETY: all-zero is a valid bit pattern for every field here.
        let mut tss: TaskStateSegment = unsafe { core::mem::zeroed() };
        tss.iomb = 0xFFFF;
        tss
    }
}

pub struct PerCpuTables {
    gdt: [u64; NSEGS],
    pub tss: TaskStateSegment,
}

impl PerCpuTables {
    pub const fn new() -> Self {
        PerCpuTables {
            gdt: [0; NSEGS],
            tss: TaskStateSegment::new(),
        }
    }

    /// Build the flat kernel/user code+data segments plus a TSS descriptor
    /// pointing at `self.tss`, then load GDTR, segment registers, and TR.
    ///
    /// # Safety
    /// Must run once per CPU, early in that CPU's boot, before any
    /// interrupt or trap can occur on it.
    pub unsafe fn load(&mut self) {
        self.gdt[0] = 0;
        self.gdt[SEG_KCODE as usize] = seg_descriptor(STA_X | STA_R, 0, 0xFFFF_FFFF, 0);
        self.gdt[SEG_KDATA as usize] = seg_descriptor(STA_W, 0, 0xFFFF_FFFF, 0);
        self.gdt[SEG_UCODE as usize] = seg_descriptor(STA_X | STA_R, 0, 0xFFFF_FFFF, 3);
        self.gdt[SEG_UDATA as usize] = seg_descriptor(STA_W, 0, 0xFFFF_FFFF, 3);

        let tss_base = &self.tss as *const _ as u32;
        let tss_limit = (size_of::<TaskStateSegment>() - 1) as u32;
        // TSS descriptor: type 0x9 (32-bit available TSS), not a code/data
        // segment so STA_X/STA_W don't apply; granularity bit left clear
        // since the limit is byte-granular here.
        let mut tss_desc = 0u64;
        tss_desc |= (tss_limit as u64 & 0xFFFF) << 0;
        tss_desc |= (tss_base as u64 & 0xFFFFFF) << 16;
        tss_desc |= 0x89u64 << 40; // present, type=0x9
        tss_desc |= ((tss_limit as u64 >> 16) & 0xF) << 48;
        tss_desc |= ((tss_base as u64 >> 24) & 0xFF) << 56;
        self.gdt[SEG_TSS as usize] = tss_desc;

        let ptr = DescriptorTablePointer::new_from_slice(&self.gdt);
        lgdt(&ptr);

        let kcode_sel = SegmentSelector::new(SEG_KCODE, Ring::Ring0);
        let kdata_sel = SegmentSelector::new(SEG_KDATA, Ring::Ring0);
        x86::segmentation::load_cs(kcode_sel);
        x86::segmentation::load_ds(kdata_sel);
        x86::segmentation::load_es(kdata_sel);
        x86::segmentation::load_ss(kdata_sel);
        x86::segmentation::load_fs(kdata_sel);
        x86::segmentation::load_gs(kdata_sel);

        x86::task::load_tr(SegmentSelector::new(SEG_TSS, Ring::Ring0));
    }

    /// Point `esp0`/`ss0` at a kernel stack so the next ring-3 -> ring-0
    /// transition (syscall, interrupt) on this CPU lands there. Called by
    /// `switch_to` on every reschedule.
    pub fn set_kernel_stack(&mut self, esp0: u32) {
        self.tss.esp0 = esp0;
        self.tss.ss0 = selector(SEG_KDATA, Ring::Ring0);
    }
}

static mut BSP_TABLES: PerCpuTables = PerCpuTables::new();

/// Load the boot CPU's GDT/TSS. Additional CPUs (under the `smp` feature)
/// would each load their own `PerCpuTables`, but multiprocessor bring-up
/// is the external boot-contract boundary this kernel does not implement.
pub fn init() {
    unsafe {
        let tables = &mut *core::ptr::addr_of_mut!(BSP_TABLES);
        tables.load();
    }
}

pub fn set_kernel_stack(esp0: u32) {
    unsafe {
        let tables = &mut *core::ptr::addr_of_mut!(BSP_TABLES);
        tables.set_kernel_stack(esp0);
    }
}
