//! Process table allocation smoke test: a fresh slot comes back
//! `Embryo` with a fresh pid and a kernel stack, and is independently
//! addressable by pid until it is handed back.

#![no_std]
#![no_main]

use core::panic::PanicInfo;

use uodos_kernel::mm;
use uodos_kernel::process::{table, ProcState};
use uodos_kernel::serial_println;
use uodos_kernel::test_framework::{exit_qemu, test_panic_handler, QemuExitCode};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!("Starting process table tests...");

    // A kernel stack page comes out of the frame allocator, so give it
    // something to hand out before exercising `alloc`.
    mm::init_low(4 * 1024 * 1024);
    mm::vmm::init_kernel_vm().expect("failed to bring up kernel VM");

    alloc_then_free();

    serial_println!("All process table tests passed!");
    exit_qemu(QemuExitCode::Success)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}

fn alloc_then_free() {
    let mut guard = table::lock();
    let pid = {
        let p = guard.alloc().expect("process table should have a free slot");
        assert_eq!(p.state, ProcState::Embryo);
        assert_ne!(p.kstack, 0);
        p.pid
    };
    assert!(guard.get(pid).is_some());

    {
        let p = guard.get_mut(pid).expect("just-allocated process should be found by pid");
        p.state = ProcState::Unused;
        p.pid = 0;
    }
    assert!(guard.get(pid).is_none());
}
