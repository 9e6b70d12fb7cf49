//! Limits and runtime knobs for the mutex subsystem.
//!
//! The table sizes are compile-time defaults; `Config` lets the embedding
//! kernel shrink them (or grow them) when it builds its `Kernel`.

use bitflags::bitflags;

/// Default capacity of the process table.
pub const MAX_PROCESSES: usize = 64;

/// Default capacity of the mutex table.
pub const MAX_MUTEXES: usize = 128;

/// How many mutexes one process may hold at the same time.
///
/// Acquire fails with `HeldLocksFull` instead of overflowing the list.
pub const MAX_HELD_LOCKS: usize = 8;

/// First wait-channel id handed out by `mutex_init`. Channels count up from
/// here and are never reused.
pub const FIRST_CHANNEL: u64 = 0x1000;

bitflags! {
    /// Which subsystems emit per-event `debug`/`trace` log lines.
    ///
    /// Failures are always logged; these flags only gate the chatter.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TraceFlags: u32 {
        /// Mutex initialisation.
        const INIT    = 1 << 0;
        /// Successful acquires.
        const ACQUIRE = 1 << 1;
        /// Releases and the nice value they restore.
        const RELEASE = 1 << 2;
        /// Priority donations from a waiter to a holder.
        const DONATE  = 1 << 3;
        /// Nice adjustments.
        const NICE    = 1 << 4;
        /// Park / unpark on wait channels.
        const PARK    = 1 << 5;
        /// Process spawn / exit / kill.
        const PROC    = 1 << 6;
        /// Every syscall entry.
        const SYSCALL = 1 << 7;
    }
}

/// Runtime configuration for a `Kernel`.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Process table capacity.
    pub max_processes: usize,
    /// Mutex table capacity.
    pub max_mutexes: usize,
    /// Trace mask.
    pub trace: TraceFlags,
}

impl Config {
    /// Same limits as `Default`, with tracing switched off.
    pub fn quiet() -> Self {
        Self {
            trace: TraceFlags::empty(),
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_processes: MAX_PROCESSES,
            max_mutexes: MAX_MUTEXES,
            trace: TraceFlags::all(),
        }
    }
}
