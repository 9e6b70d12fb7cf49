// =============================================================================
// nicelock: Global Scheduling State
// =============================================================================
//
// `Sched` is everything guarded by the global scheduling-state lock:
//   - the process table (nice values, held-lock lists, run state)
//   - the mutex table (every mutex record)
//   - the wait-channel counter
//
// All of the protocol steps (try_acquire, release, nice_adjust, wake) are
// methods on `Sched`, so they run with `&mut Sched` and are trivially
// serialised. `Kernel` wraps them with the blocking and yielding parts, which
// must happen with the lock dropped.
//
// LOCK ORDERING:
//   There is exactly one lock. Never call into the host's scheduler (yield,
//   context switch) while holding it; `Kernel::park` drops it first.
//
// =============================================================================

use alloc::vec::Vec;

use crate::config::{Config, FIRST_CHANNEL};
use crate::error::{KResult, KernelError};
use crate::sync::mutex::MutexTable;
use crate::task::channel::Channel;
use crate::task::nice::Nice;
use crate::task::process::{Pid, ProcessState, ProcessTable};
use crate::TraceFlags;

/// State behind the global scheduling-state lock.
pub struct Sched {
    pub(crate) procs: ProcessTable,
    pub(crate) mutexes: MutexTable,
    pub(crate) next_channel: u64,
    pub(crate) trace: TraceFlags,
}

impl Sched {
    pub fn new(config: &Config) -> Self {
        Self {
            procs: ProcessTable::with_capacity(config.max_processes),
            mutexes: MutexTable::with_capacity(config.max_mutexes),
            next_channel: FIRST_CHANNEL,
            trace: config.trace,
        }
    }

    /// Hand out the next wait channel. Monotonic, never rolled back.
    pub(crate) fn alloc_channel(&mut self) -> Channel {
        let channel = Channel::new(self.next_channel);
        self.next_channel += 1;
        channel
    }

    /// Create a runnable process.
    pub fn spawn(&mut self, nice: Nice) -> KResult<Pid> {
        let pid = self.procs.spawn(nice)?;
        if self.trace.contains(TraceFlags::PROC) {
            log::debug!("[proc] spawned {} nice={}", pid, nice);
        }
        Ok(pid)
    }

    /// Tear down `pid`.
    ///
    /// Mutexes it still holds are force-released: reset to unlocked with no
    /// pending waiters, and everyone parked on them is woken to re-race.
    /// Mutexes it created are reclaimed if they are unlocked and nobody is
    /// parked on them; the rest go when their last holder releases them.
    /// Returns how many mutexes were force-released.
    pub fn exit(&mut self, pid: Pid) -> KResult<usize> {
        let proc = self.procs.remove(pid).ok_or(KernelError::NoProcess)?;

        let mut channels = Vec::with_capacity(proc.held.len());
        for id in proc.held.iter() {
            if let Some(record) = self.mutexes.get_mut(id) {
                record.reset_unlocked();
                channels.push(record.channel);
            }
        }

        let owned: Vec<_> = self
            .mutexes
            .iter()
            .filter(|m| m.owner == Some(pid))
            .map(|m| (m.id, m.channel))
            .collect();
        let mut reclaimed = 0;
        for (id, channel) in owned {
            let parked = self
                .procs
                .iter()
                .any(|p| p.state == ProcessState::Blocked(channel));
            if !parked && self.reclaim_orphan(id) {
                reclaimed += 1;
            }
        }

        for &channel in &channels {
            self.wake(channel);
        }

        if !channels.is_empty() {
            log::info!("[proc] {} exited holding {} mutex(es); force-released", pid, channels.len());
        } else if self.trace.contains(TraceFlags::PROC) {
            log::debug!("[proc] {} exited", pid);
        }
        if reclaimed > 0 && self.trace.contains(TraceFlags::PROC) {
            log::debug!("[proc] {} left {} mutex(es), reclaimed", pid, reclaimed);
        }
        Ok(channels.len())
    }

    /// Mark `pid` killed and make it runnable if it is parked.
    ///
    /// A parked acquire notices on wake and fails with `Killed`; the host is
    /// responsible for actually tearing the process down afterwards.
    pub fn kill(&mut self, pid: Pid) -> KResult<()> {
        let proc = self.procs.get_mut(pid).ok_or(KernelError::NoProcess)?;
        proc.killed = true;
        if let ProcessState::Blocked(_) = proc.state {
            proc.state = ProcessState::Runnable;
        }
        if self.trace.contains(TraceFlags::PROC) {
            log::debug!("[proc] {} killed", pid);
        }
        Ok(())
    }
}
