//! Architecture support. This kernel targets a single architecture (32-bit
//! x86 protected mode); unlike the teacher crate's multi-arch layout, there
//! is exactly one backend module here.

pub mod x86;

pub use self::x86::{cli_depth, cpu_id, halt, mycpu, pop_cli, push_cli, tick, ticks, Cpu};

pub fn init() {
    x86::init();
}
