//! Wait channels: park a process until a wake on the same channel.
//!
//! Provides two operations:
//!   - `park(guard, pid, channel)`: mark `pid` blocked on `channel`, drop
//!     the scheduling-state lock, and yield until woken.
//!   - `unpark_all(channel)`: make every process blocked on `channel`
//!     runnable again.
//!
//! The blocked state is recorded while the lock is still held, so a wake
//! that races with the park either sees the process as blocked (and wakes
//! it) or happened before the process looked at the mutex at all (and the
//! process sees it unlocked). No wakeup is lost in between.

use core::fmt;

use spin::MutexGuard;

use crate::kernel::Kernel;
use crate::platform::Platform;
use crate::sched::Sched;
use crate::task::process::{Pid, ProcessState};
use crate::TraceFlags;

/// Opaque wait-queue identifier. One per mutex, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Channel(u64);

impl Channel {
    pub const fn new(raw: u64) -> Self {
        Channel(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chan {:#x}", self.0)
    }
}

impl Sched {
    /// Wake every process blocked on `channel`. Caller holds the lock.
    ///
    /// Returns the number of processes woken.
    pub fn wake(&mut self, channel: Channel) -> usize {
        let mut woken = 0;
        for proc in self.procs.iter_mut() {
            if proc.state == ProcessState::Blocked(channel) {
                proc.state = ProcessState::Runnable;
                woken += 1;
            }
        }
        if woken > 0 && self.trace.contains(TraceFlags::PARK) {
            log::trace!("[pi] woke {} on {}", woken, channel);
        }
        woken
    }
}

impl<P: Platform> Kernel<P> {
    /// Block `pid` on `channel`, releasing `sched` as part of the block.
    ///
    /// Returns once the process is runnable again (woken, killed, or torn
    /// down). The caller must re-check whatever condition it was waiting
    /// for; a wake only means "something changed".
    pub(crate) fn park(&self, mut sched: MutexGuard<'_, Sched>, pid: Pid, channel: Channel) {
        match sched.procs.get_mut(pid) {
            Some(proc) if !proc.killed => proc.state = ProcessState::Blocked(channel),
            _ => return,
        }
        if sched.trace.contains(TraceFlags::PARK) {
            log::trace!("[pi] {} parked on {}", pid, channel);
        }
        drop(sched);

        loop {
            self.platform.yield_now();
            let sched = self.sched.lock();
            match sched.procs.get(pid) {
                Some(proc) if proc.state == ProcessState::Blocked(channel) => continue,
                _ => return,
            }
        }
    }

    /// Wake every process parked on `channel`.
    pub(crate) fn unpark_all(&self, channel: Channel) -> usize {
        self.sched.lock().wake(channel)
    }
}
