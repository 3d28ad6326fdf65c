//! Kernel-internal print macros. These write straight to the console
//! device (bypassing the file-descriptor path) the way the original's
//! `cprintf` calls `consputc` directly -- kernel diagnostics must work
//! even before the process/file-table machinery exists.

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::console::_print(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}
