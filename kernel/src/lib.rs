// =============================================================================
// nicelock: Priority-Inheritance Kernel Mutexes
// =============================================================================
//
// A kernel-mediated mutex that, while held, lends its holder the best (lowest)
// nice value among the processes waiting for it. This bounds priority
// inversion: a nice-19 batch job holding a lock that a nice -20 interactive
// task needs runs at -20 until it lets go.
//
// WHAT LIVES HERE:
//   - The mutex record and its three operations (init, acquire, release)
//   - Nice adjustment, which has to respect donations already in flight
//   - The scheduler-side state those operations mutate (process table with
//     nice values and held-lock lists, wait channels)
//   - The syscall boundary that turns all of the above into status codes
//
// WHAT DOES NOT:
//   Context switching, timers, address spaces, run-queue policy. The host
//   kernel provides those through the `Platform` trait and is expected to
//   prefer lower nice values when it picks the next process to run.
//
// LOCKING:
//   Every field of every mutex and every process's nice / held-lock list is
//   guarded by ONE lock, the global scheduling-state lock inside `Kernel`.
//   It is coarse, but mutex operations are short and the donation protocol
//   needs a consistent view across several mutexes at once (release has to
//   look at every other lock the caller still holds).
//
// =============================================================================

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod error;
pub mod handle;
pub mod kernel;
pub mod platform;
pub mod sched;
pub mod sync;
pub mod syscall;
pub mod task;

pub use config::{Config, TraceFlags};
pub use error::{KResult, KernelError};
pub use kernel::Kernel;
pub use platform::Platform;
pub use sync::acquire::AcquireStep;
pub use sync::mutex::{MutexId, MutexRecord};
pub use task::channel::Channel;
pub use task::nice::Nice;
pub use task::process::{HeldLocks, Pid, Process, ProcessState};
