//! Pipe ring-buffer smoke test: write a short message into the write
//! end and read it back out of the read end through the ordinary
//! file-table entry points, without ever hitting the blocking path.

#![no_std]
#![no_main]

use core::panic::PanicInfo;

use uodos_kernel::fs::file;
use uodos_kernel::fs::pipe;
use uodos_kernel::serial_println;
use uodos_kernel::test_framework::{exit_qemu, test_panic_handler, QemuExitCode};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!("Starting pipe tests...");

    roundtrip();

    serial_println!("All pipe tests passed!");
    exit_qemu(QemuExitCode::Success)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}

fn roundtrip() {
    let (read_handle, write_handle) = pipe::alloc().expect("pipe alloc failed");

    let msg = b"hello, pipe";
    let put = file::write(write_handle, msg).expect("pipe write failed");
    assert_eq!(put, msg.len());

    let mut buf = [0u8; 32];
    let got = file::read(read_handle, &mut buf).expect("pipe read failed");
    assert_eq!(got, msg.len());
    assert_eq!(&buf[..got], msg);

    file::close(read_handle);
    file::close(write_handle);
}
