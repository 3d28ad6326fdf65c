//! Buffer cache identity and dirty-write smoke test: the same (dev,
//! sector) pair must always resolve to the same cache slot, and data
//! written through one handle must be visible to a later caller once
//! the first is released.

#![no_std]
#![no_main]

use core::panic::PanicInfo;

use uodos_kernel::fs::bio;
use uodos_kernel::serial_println;
use uodos_kernel::test_framework::{exit_qemu, test_panic_handler, QemuExitCode};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!("Starting buffer cache tests...");

    same_identity_reuses_slot();
    write_is_visible_after_release();

    serial_println!("All buffer cache tests passed!");
    exit_qemu(QemuExitCode::Success)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}

fn same_identity_reuses_slot() {
    let a = bio::get(0, 1);
    let index = a.index();
    assert_eq!(a.dev(), 0);
    assert_eq!(a.sector(), 1);
    bio::release(a);

    let b = bio::get(0, 1);
    assert_eq!(b.index(), index, "same (dev, sector) should reuse the same cache slot");
    bio::release(b);
}

fn write_is_visible_after_release() {
    let mut a = bio::get(0, 2);
    a[0] = 0xAB;
    a[1] = 0xCD;
    bio::release(a);

    let b = bio::get(0, 2);
    assert_eq!(b[0], 0xAB);
    assert_eq!(b[1], 0xCD);
    bio::release(b);
}
