//! Boot sequence (spec.md §6): the fixed order `main.rs`'s `_start` runs
//! once, each step gated on the one before it the way the original's
//! `main()` runs down its own list. MP detection, the local APIC and the
//! I/O APIC are the external multiprocessor-bringup boundary this kernel
//! doesn't implement (`arch::cpu_id()` always returns 0) -- they are
//! still listed here, as log-only steps, so the boot order itself stays
//! faithful to the original.

use crate::error::KernelResult;
use crate::{console, fs, irq, log_service, mm, sched};

/// A tiny hand-assembled user program, the equivalent of the original's
/// linker-embedded `initcode_start`/`initcode_end` blob (itself built
/// from a separate `initcode.S`, assembled and objcopy'd into the kernel
/// image). There is no assembler in this build; the same few
/// instructions are written out as raw opcodes instead:
///
/// ```text
/// start:
///     pushl $argv
///     pushl $path
///     pushl $0
///     movl  $SYS_EXEC, %eax
///     int   $T_SYSCALL
/// exit:
///     movl  $SYS_EXIT, %eax
///     int   $T_SYSCALL
///     jmp   exit
/// path:
///     .string "/init.exe"
/// argv:
///     .long path
///     .long 0
/// ```
///
/// mapped at virtual address 0, matching the original's `eip = 0`.
#[rustfmt::skip]
static INITCODE: [u8; 52] = [
    0x68, 0x2C, 0x00, 0x00, 0x00, // push argv (0x2C)
    0x68, 0x1F, 0x00, 0x00, 0x00, // push path (0x1F)
    0x68, 0x00, 0x00, 0x00, 0x00, // push 0
    0xB8, 0x09, 0x00, 0x00, 0x00, // mov eax, 9  (SYS_EXEC)
    0xCD, 0x40,                   // int 0x40
    0xB8, 0x02, 0x00, 0x00, 0x00, // mov eax, 2  (SYS_EXIT)   <- exit:
    0xCD, 0x40,                   // int 0x40
    0xEB, 0xF7,                   // jmp exit
    b'/', b'i', b'n', b'i', b't', b'.', b'e', b'x', b'e', 0x00, // path: "/init.exe\0"
    0x00, 0x00, 0x00,             // padding to 4-byte align argv
    0x1F, 0x00, 0x00, 0x00,       // argv[0] = path (0x1F)
    0x00, 0x00, 0x00, 0x00,       // argv[1] = NULL
];

/// Physical memory below this line is usable as soon as `kernel_end`;
/// above it needs the kernel's own page tables live first. Matches the
/// original's `main()` passing `4 * 1024 * 1024` to both allocator
/// stages.
const LOWMEM_LIMIT: usize = 4 * 1024 * 1024;

/// Run the fixed boot sequence. Panics on any step that cannot recover
/// (matches the original's `panic()` calls on the same failures).
pub fn run() -> ! {
    log_service::init();

    mm::init_low(LOWMEM_LIMIT);
    mm::vmm::init_kernel_vm().expect("bootstrap: out of memory bringing up kernel VM");

    log::info!("mp: multiprocessor bring-up not implemented, running single-cpu");
    log::info!("lapic: local APIC bring-up not implemented");

    crate::arch::init();
    irq::init();

    log::info!("ioapic: I/O APIC bring-up not implemented");

    console::init();
    log::info!("process table: {} slots", crate::param::NPROC);
    log::info!("trap vectors installed");
    log::info!("buffer cache: {} buffers", crate::param::NBUF);
    log::info!("file table: {} slots", crate::param::NFILE);

    fs::ide::init();

    mm::init_high(LOWMEM_LIMIT, mm::vmm::PHYSTOP);

    first_user_process().expect("bootstrap: could not create the first user process");

    sched::run();
}

fn first_user_process() -> KernelResult<()> {
    sched::init_first_process(&INITCODE)
}
