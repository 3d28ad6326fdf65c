//! `log` crate facade (spec.md §1): a single global logger installed once
//! at boot, backed directly by the console's text output. There is no
//! buffering, no per-module filtering and no timestamping -- a log record
//! is just a level tag and the formatted message, written straight
//! through `console::_print`. Panics bypass this entirely and go through
//! the panic handler's own path.

use log::{Level, LevelFilter, Log, Metadata, Record};

struct ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let tag = match record.level() {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };
        crate::println!("[{}] {}", tag, record.args());
    }

    fn flush(&self) {}
}

static LOGGER: ConsoleLogger = ConsoleLogger;

/// Install the console logger as the global `log` backend. Called once
/// from the boot sequence, before any subsystem that logs diagnostics
/// runs. Safe to call more than once; only the first call takes effect.
pub fn init() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Trace);
    }
}
