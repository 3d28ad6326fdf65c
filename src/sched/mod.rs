//! Process scheduling and sleep/wakeup (spec.md §4.6-§4.7).

pub mod scheduler;

pub use scheduler::{
    current, current_pid, exit, fork, init_first_process, kill, scheduler as run, sleep,
    sleep_on_table_lock, wait, wakeup, yield_now,
};
