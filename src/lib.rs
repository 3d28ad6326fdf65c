//! UoDOS kernel library: a preemptive multiprocessor 32-bit x86 kernel in
//! the xv6 tradition -- process management, virtual memory, a buffer
//! cache and IDE driver, a read-only FAT12 filesystem, a PE/COFF program
//! loader, and the syscall surface above them.

#![no_std]
#![cfg_attr(all(test, target_os = "none"), no_main)]
#![feature(custom_test_frameworks)]
#![cfg_attr(target_os = "none", feature(alloc_error_handler))]
#![cfg_attr(target_os = "none", test_runner(crate::test_framework::test_runner))]
#![cfg_attr(target_os = "none", reexport_test_harness_main = "test_main")]

#[cfg(feature = "alloc")]
extern crate alloc;

// Bare-metal target: a real kernel heap backed by the upper-half region
// `mm::init_high` carves out. Host target (plain `cargo test`): delegate
// to the system allocator so unit tests can use Vec/String normally.
#[cfg(target_os = "none")]
use linked_list_allocator::LockedHeap;

#[cfg(target_os = "none")]
#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

#[cfg(target_os = "none")]
pub fn get_allocator() -> &'static LockedHeap {
    &ALLOCATOR
}

#[cfg(not(target_os = "none"))]
extern crate std;
#[cfg(not(target_os = "none"))]
#[global_allocator]
static SYSTEM_ALLOCATOR: std::alloc::System = std::alloc::System;

#[macro_use]
pub mod print;
#[macro_use]
pub mod serial;

mod intrinsics;

pub mod arch;
pub mod bootstrap;
pub mod console;
pub mod error;
pub mod exec;
pub mod fs;
pub mod irq;
pub mod log_service;
pub mod mm;
pub mod param;
pub mod pe;
pub mod process;
pub mod sched;
pub mod sync;
mod syscall;
pub mod trap;

pub mod test_framework;

#[cfg(all(test, target_os = "none"))]
#[no_mangle]
pub extern "C" fn _start() -> ! {
    test_main();
    loop {
        core::hint::spin_loop();
    }
}

#[cfg(all(test, target_os = "none"))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    test_framework::test_panic_handler(info)
}

/// Heap allocation failure in a `no_std` kernel is unrecoverable; the
/// `alloc_error_handler` ABI requires `-> !`.
#[cfg(target_os = "none")]
#[alloc_error_handler]
fn alloc_error_handler(layout: core::alloc::Layout) -> ! {
    panic!("allocation error: {:?}", layout);
}
