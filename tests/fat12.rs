//! FAT12 path resolution smoke test: runs against the disk image IDE
//! device 0 is attached to, the same as every other on-target test.

#![no_std]
#![no_main]

use core::panic::PanicInfo;

use uodos_kernel::error::KernelError;
use uodos_kernel::fs::fat12;
use uodos_kernel::serial_println;
use uodos_kernel::test_framework::{exit_qemu, test_panic_handler, QemuExitCode};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!("Starting FAT12 tests...");

    fat12::init();

    nonexistent_path_not_found();
    relative_path_resolves_against_cwd();

    serial_println!("All FAT12 tests passed!");
    exit_qemu(QemuExitCode::Success)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}

fn nonexistent_path_not_found() {
    let result = fat12::open("/", "nosuchfile.xyz", false);
    assert!(matches!(result, Err(KernelError::NotFound)));
}

fn relative_path_resolves_against_cwd() {
    // Neither path exists on the image this test runs against, but a
    // relative lookup under a cwd must walk the same component chain as
    // the equivalent absolute path -- both should fail for the same
    // reason (the first component, "SOMEDIR", isn't found in the root),
    // not just "both happen to be errors".
    let relative = fat12::open("SOMEDIR/", "file.txt", false);
    let absolute = fat12::open("/", "SOMEDIR/file.txt", false);
    assert!(matches!(relative, Err(KernelError::NotFound)));
    assert!(matches!(absolute, Err(KernelError::NotFound)));
}
