//! Process control blocks and the global process table (spec.md §4.6).

pub mod process;
pub mod table;

pub use process::{Context, ProcState, Process, Trapframe};
pub use table::{lock as table_lock, ProcessTable, TableGuard, PROCESS_TABLE};

/// `^P` process dump (spec.md §6, supplemented from the original's
/// `procdump`): one line per live process, pid/state/name.
pub fn dump_all() {
    let table = table_lock();
    for p in table.procs.iter() {
        if p.state == ProcState::Unused {
            continue;
        }
        let state = match p.state {
            ProcState::Unused => "unused",
            ProcState::Embryo => "embryo",
            ProcState::Sleeping => "sleep",
            ProcState::Runnable => "runble",
            ProcState::Running => "run",
            ProcState::Zombie => "zombie",
        };
        crate::println!("{} {} {}", p.pid, state, p.name_str());
    }
}
