//! Acquire: claim the mutex, or donate priority and park.

use crate::error::{KResult, KernelError};
use crate::kernel::Kernel;
use crate::platform::Platform;
use crate::sched::Sched;
use crate::sync::mutex::MutexId;
use crate::task::channel::Channel;
use crate::task::process::Pid;
use crate::TraceFlags;

/// Outcome of one attempt under the scheduling-state lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireStep {
    /// The caller now holds the mutex.
    Acquired,
    /// Held by a live process; donation done, park on this channel.
    Wait(Channel),
    /// Locked but no resolvable holder (mid-transition, or the recorded
    /// holder is gone). Yield and try again without parking.
    Retry,
}

impl Sched {
    /// One pass of the acquire loop for `pid` on mutex `id`.
    ///
    /// Nothing is mutated on the `Err` paths.
    pub fn try_acquire(&mut self, pid: Pid, id: MutexId) -> KResult<AcquireStep> {
        let me = self.procs.get(pid).ok_or(KernelError::NoProcess)?;
        if me.killed {
            return Err(KernelError::Killed);
        }
        let my_nice = me.nice;
        if me.held.is_full() {
            return Err(KernelError::HeldLocksFull);
        }

        let record = self.mutexes.get_mut(id).ok_or(KernelError::InvalidArgument)?;

        if !record.locked {
            let me = self.procs.get_mut(pid).ok_or(KernelError::NoProcess)?;
            me.held.push(id)?;
            record.locked = true;
            record.holder = Some(pid);
            record.saved_priority = my_nice;
            if self.trace.contains(TraceFlags::ACQUIRE) {
                log::debug!("[mutex] {} acquired {} (saved nice {})", pid, id, my_nice);
            }
            return Ok(AcquireStep::Acquired);
        }

        let holder_pid = match record.holder {
            Some(holder) if holder == pid => return Err(KernelError::Deadlock),
            Some(holder) => holder,
            None => return Ok(AcquireStep::Retry),
        };
        let Some(holder) = self.procs.get_mut(holder_pid) else {
            return Ok(AcquireStep::Retry);
        };

        if my_nice < holder.nice {
            if self.trace.contains(TraceFlags::DONATE) {
                log::debug!(
                    "[pi] {} (nice {}) donates to {} (nice {}) via {}",
                    pid,
                    my_nice,
                    holder_pid,
                    holder.nice,
                    id
                );
            }
            holder.nice = my_nice;
        }

        let record = self.mutexes.get_mut(id).ok_or(KernelError::InvalidArgument)?;
        record.lowest_pending_priority = record.lowest_pending_priority.min(my_nice);
        Ok(AcquireStep::Wait(record.channel))
    }
}

impl<P: Platform> Kernel<P> {
    /// Block until the calling process holds mutex `id`.
    ///
    /// There is no timeout. The only ways out besides success are a bad
    /// handle, a full held-lock list, re-acquiring a held lock, or being
    /// killed while parked.
    pub fn mutex_acquire(&self, id: MutexId) -> KResult<()> {
        let pid = self.current_pid()?;
        loop {
            let mut sched = self.sched.lock();
            let step = sched.try_acquire(pid, id)?;
            match step {
                AcquireStep::Acquired => return Ok(()),
                AcquireStep::Wait(channel) => self.park(sched, pid, channel),
                AcquireStep::Retry => {
                    drop(sched);
                    self.platform.yield_now();
                }
            }
        }
    }
}
