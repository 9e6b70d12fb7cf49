// =============================================================================
// nicelock: Kernel Handle
// =============================================================================
//
// `Kernel<P>` is what the embedding kernel holds: the global scheduling-state
// lock (a `spin::Mutex<Sched>`), the host `Platform`, and the `Config` it was
// built with.
//
// Every public operation resolves the calling process through
// `Platform::current`, takes the lock for as short a time as the protocol
// allows, and never yields while holding it.
//
// =============================================================================

use spin::Mutex;

use crate::config::Config;
use crate::error::{KResult, KernelError};
use crate::platform::Platform;
use crate::sched::Sched;
use crate::sync::mutex::{MutexId, MutexRecord};
use crate::task::nice::Nice;
use crate::task::process::{Pid, Process};

/// The mutex subsystem, bound to one host platform.
pub struct Kernel<P: Platform> {
    pub(crate) sched: Mutex<Sched>,
    pub(crate) platform: P,
    config: Config,
}

impl<P: Platform> Kernel<P> {
    /// Build a kernel with empty process and mutex tables sized by `config`.
    pub fn new(platform: P, config: Config) -> Self {
        log::info!(
            "[proc] nicelock up: {} process slots, {} mutex slots, trace={:?}",
            config.max_processes,
            config.max_mutexes,
            config.trace
        );
        Self {
            sched: Mutex::new(Sched::new(&config)),
            platform,
            config,
        }
    }

    /// The host hooks this kernel was built with.
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Table sizes and trace mask, as passed to [`Kernel::new`].
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The process the current call runs on behalf of.
    pub(crate) fn current_pid(&self) -> KResult<Pid> {
        self.platform.current().ok_or(KernelError::NoProcess)
    }

    // ── Process lifecycle ───────────────────────────────────────

    /// Create a runnable process at `nice`.
    pub fn spawn(&self, nice: Nice) -> KResult<Pid> {
        self.sched.lock().spawn(nice)
    }

    /// Tear down `pid`, force-releasing any mutex it still holds and
    /// reclaiming the idle ones it created.
    pub fn exit(&self, pid: Pid) -> KResult<usize> {
        self.sched.lock().exit(pid)
    }

    /// Kill `pid`. If it is parked in `mutex_acquire`, that call returns
    /// `Killed`.
    pub fn kill(&self, pid: Pid) -> KResult<()> {
        self.sched.lock().kill(pid)
    }

    /// Give up the processor.
    pub fn yield_now(&self) {
        self.platform.yield_now();
    }

    // ── Mutex / nice operations ─────────────────────────────────

    /// Create a fresh mutex owned by the calling process, if there is one.
    ///
    /// An owned mutex is reclaimed once its owner has exited and nobody
    /// holds it; an anonymous one lives as long as the kernel.
    pub fn mutex_init(&self) -> KResult<MutexId> {
        let owner = self.platform.current();
        self.sched.lock().mutex_create_for(owner, 0)
    }

    /// Initialise the mutex the calling process keeps at user address
    /// `storage`.
    ///
    /// `existing` is whatever that word held. It is re-initialised in place
    /// only if it names a record this process created for this same address.
    /// Zero, garbage, a stale handle or a handle copied from another word
    /// gets a fresh record.
    pub fn mutex_init_at(&self, storage: u64, existing: Option<MutexId>) -> KResult<MutexId> {
        let pid = self.current_pid()?;
        self.sched.lock().mutex_init_at(pid, storage, existing)
    }

    /// Apply `delta` to the calling process's nice value.
    pub fn nice_adjust(&self, delta: i64) -> KResult<Nice> {
        let pid = self.current_pid()?;
        self.sched.lock().nice_adjust(pid, delta)
    }

    // ── Introspection ───────────────────────────────────────────

    /// Snapshot of a process record.
    pub fn process(&self, pid: Pid) -> Option<Process> {
        self.sched.lock().procs.get(pid).copied()
    }

    /// Snapshot of a mutex record.
    pub fn mutex(&self, id: MutexId) -> Option<MutexRecord> {
        self.sched.lock().mutexes.get(id).copied()
    }

    /// Log one line per live process and per locked mutex.
    pub fn procdump(&self) {
        let sched = self.sched.lock();
        log::info!(
            "[proc] procdump: {} process(es), {} mutex(es)",
            sched.procs.count(),
            sched.mutexes.count()
        );
        for proc in sched.procs.iter() {
            log::info!(
                "[proc]   {} nice={} {:?} held={}{}",
                proc.pid,
                proc.nice,
                proc.state,
                proc.held.len(),
                if proc.killed { " killed" } else { "" }
            );
        }
        for record in sched.mutexes.iter().filter(|m| m.locked) {
            if let Some(holder) = record.holder {
                log::info!(
                    "[mutex]  {} held by {} saved={} pending={}",
                    record.id,
                    holder,
                    record.saved_priority,
                    record.lowest_pending_priority
                );
            }
        }
    }
}
