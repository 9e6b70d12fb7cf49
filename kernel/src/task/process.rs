//! Process records as the mutex subsystem sees them.
//!
//! A process here is just what priority inheritance needs: a nice value, the
//! ordered list of mutexes it holds, and whether it is parked on a wait
//! channel. Registers, stacks and address spaces belong to the host kernel.

use core::fmt;

use crate::config::MAX_HELD_LOCKS;
use crate::error::{KResult, KernelError};
use crate::handle::{handle_unpack, HandleTable};
use crate::sync::mutex::MutexId;
use crate::task::channel::Channel;
use crate::task::nice::Nice;

// ── Process identifiers ─────────────────────────────────────────

/// Generation-guarded handle to a process.
///
/// Holding a `Pid` does not keep the process alive; once it exits, the
/// handle simply stops resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid(u64);

impl Pid {
    /// Rebuild a handle from its raw word.
    pub const fn from_raw(raw: u64) -> Self {
        Pid(raw)
    }

    /// The raw handle word.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (generation, index) = handle_unpack(self.0);
        write!(f, "pid {}.{}", index, generation)
    }
}

// ── Process state ───────────────────────────────────────────────

/// Run state as far as this crate is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Eligible to run.
    Runnable,
    /// Parked until someone wakes the channel.
    Blocked(Channel),
}

// ── Held-lock list ──────────────────────────────────────────────

/// The mutexes a process holds, in acquisition order.
///
/// Fixed capacity; `push` fails instead of overflowing and `remove` compacts
/// only over the live prefix, so there is no way to read past the end.
#[derive(Debug, Clone, Copy)]
pub struct HeldLocks {
    locks: [MutexId; MAX_HELD_LOCKS],
    len: usize,
}

impl HeldLocks {
    /// An empty list.
    pub const fn new() -> Self {
        Self {
            locks: [MutexId::from_raw(0); MAX_HELD_LOCKS],
            len: 0,
        }
    }

    /// Number of held mutexes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == MAX_HELD_LOCKS
    }

    /// The earliest-acquired mutex still held.
    pub fn first(&self) -> Option<MutexId> {
        self.as_slice().first().copied()
    }

    pub fn contains(&self, id: MutexId) -> bool {
        self.as_slice().contains(&id)
    }

    /// Append a newly acquired mutex.
    pub fn push(&mut self, id: MutexId) -> KResult<()> {
        if self.is_full() {
            return Err(KernelError::HeldLocksFull);
        }
        self.locks[self.len] = id;
        self.len += 1;
        Ok(())
    }

    /// Remove `id`, keeping the rest in order. Returns `false` if absent.
    pub fn remove(&mut self, id: MutexId) -> bool {
        let Some(pos) = self.as_slice().iter().position(|&held| held == id) else {
            return false;
        };
        self.locks.copy_within(pos + 1..self.len, pos);
        self.len -= 1;
        true
    }

    /// Held mutexes, earliest first.
    pub fn iter(&self) -> impl Iterator<Item = MutexId> + '_ {
        self.as_slice().iter().copied()
    }

    pub fn as_slice(&self) -> &[MutexId] {
        &self.locks[..self.len]
    }
}

impl Default for HeldLocks {
    fn default() -> Self {
        Self::new()
    }
}

// ── Process record ──────────────────────────────────────────────

/// One schedulable unit.
#[derive(Debug, Clone, Copy)]
pub struct Process {
    /// This process's own handle.
    pub pid: Pid,
    /// Effective nice, possibly donated by a waiter.
    pub nice: Nice,
    /// Runnable or parked.
    pub state: ProcessState,
    /// Mutexes held, in acquisition order.
    pub held: HeldLocks,
    /// Set by `kill`; a parked acquire gives up when it sees this.
    pub killed: bool,
}

impl Process {
    fn new(pid: Pid, nice: Nice) -> Self {
        Self {
            pid,
            nice,
            state: ProcessState::Runnable,
            held: HeldLocks::new(),
            killed: false,
        }
    }
}

// ── Process table ───────────────────────────────────────────────

/// All live processes, addressed by `Pid`.
pub struct ProcessTable {
    slots: HandleTable<Process>,
}

impl ProcessTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: HandleTable::with_capacity(capacity),
        }
    }

    /// Create a runnable process with the given nice (clamped by `Nice`).
    pub fn spawn(&mut self, nice: Nice) -> KResult<Pid> {
        self.slots
            .insert_with(|raw| Process::new(Pid(raw), nice))
            .map(Pid)
            .ok_or(KernelError::TableFull)
    }

    pub fn get(&self, pid: Pid) -> Option<&Process> {
        self.slots.get(pid.0)
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut Process> {
        self.slots.get_mut(pid.0)
    }

    pub fn remove(&mut self, pid: Pid) -> Option<Process> {
        self.slots.remove(pid.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Process> {
        self.slots.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Process> {
        self.slots.iter_mut()
    }

    /// Number of live processes.
    pub fn count(&self) -> usize {
        self.slots.count()
    }
}
