//! The mutex record and its initialisation.
//!
//! User space owns one word per mutex. `mutex_init` stores a `MutexId` in
//! that word; the record itself lives in the kernel's mutex table, where the
//! holder is a `Pid` handle rather than a pointer into the process table.

use core::fmt;

use crate::error::{KResult, KernelError};
use crate::handle::{handle_unpack, HandleTable};
use crate::sched::Sched;
use crate::task::channel::Channel;
use crate::task::nice::Nice;
use crate::task::process::Pid;
use crate::TraceFlags;

/// Generation-guarded handle to a mutex record. This is the value user space
/// keeps in its mutex word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutexId(u64);

impl MutexId {
    pub const fn from_raw(raw: u64) -> Self {
        MutexId(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MutexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (generation, index) = handle_unpack(self.0);
        write!(f, "mutex {}.{}", index, generation)
    }
}

/// One lock.
///
/// Invariants, all maintained under the scheduling-state lock:
/// - `holder.is_none()` iff `!locked`
/// - `lowest_pending_priority` is `Nice::NO_WAITER` right after every
///   transition to unlocked, and only ever decreases while locked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutexRecord {
    /// This record's own handle.
    pub id: MutexId,
    /// Currently held.
    pub locked: bool,
    /// Where waiters park.
    pub channel: Channel,
    /// Current holder. Non-owning.
    pub holder: Option<Pid>,
    /// Holder's nice at acquire time (or as later re-based by nice_adjust);
    /// what release restores to when no other held lock is contended.
    pub saved_priority: Nice,
    /// Best nice among processes that waited since the last release.
    pub lowest_pending_priority: Nice,
    /// Process that created the record. Its exit reclaims the record.
    pub owner: Option<Pid>,
    /// User address of the mutex word the record was created for, 0 when
    /// created from inside the kernel.
    pub storage: u64,
}

impl MutexRecord {
    fn new(id: MutexId, channel: Channel, owner: Option<Pid>, storage: u64) -> Self {
        Self {
            id,
            locked: false,
            channel,
            holder: None,
            saved_priority: Nice::NO_WAITER,
            lowest_pending_priority: Nice::NO_WAITER,
            owner,
            storage,
        }
    }

    /// Transition to unlocked: no holder, nobody pending.
    pub(crate) fn reset_unlocked(&mut self) {
        self.lowest_pending_priority = Nice::NO_WAITER;
        self.holder = None;
        self.locked = false;
    }
}

/// Every mutex record in the system.
pub struct MutexTable {
    slots: HandleTable<MutexRecord>,
}

impl MutexTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: HandleTable::with_capacity(capacity),
        }
    }

    pub fn get(&self, id: MutexId) -> Option<&MutexRecord> {
        self.slots.get(id.0)
    }

    pub fn get_mut(&mut self, id: MutexId) -> Option<&mut MutexRecord> {
        self.slots.get_mut(id.0)
    }

    pub fn remove(&mut self, id: MutexId) -> Option<MutexRecord> {
        self.slots.remove(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MutexRecord> {
        self.slots.iter()
    }

    /// Number of live records.
    pub fn count(&self) -> usize {
        self.slots.count()
    }
}

impl Sched {
    /// Allocate and initialise a new mutex record with no owner.
    pub fn mutex_create(&mut self) -> KResult<MutexId> {
        self.mutex_create_for(None, 0)
    }

    /// Allocate and initialise a new mutex record for `owner`'s word at
    /// `storage`.
    pub fn mutex_create_for(&mut self, owner: Option<Pid>, storage: u64) -> KResult<MutexId> {
        let Sched {
            mutexes,
            next_channel,
            trace,
            ..
        } = self;
        let raw = mutexes
            .slots
            .insert_with(|raw| {
                let channel = Channel::new(*next_channel);
                *next_channel += 1;
                MutexRecord::new(MutexId(raw), channel, owner, storage)
            })
            .ok_or(KernelError::TableFull)?;
        let id = MutexId(raw);

        if trace.contains(TraceFlags::INIT) {
            if let Some(record) = mutexes.get(id) {
                log::debug!(
                    "[mutex] init {} on {} storage={:#x}",
                    id,
                    record.channel,
                    storage
                );
            }
        }
        Ok(id)
    }

    /// Re-initialise an existing, unlocked record in place with a fresh
    /// channel.
    ///
    /// Any process still parked on the old channel is woken so it can
    /// re-check the (now unlocked) mutex instead of sleeping on a channel
    /// nobody will ever signal again.
    pub fn mutex_reinit(&mut self, id: MutexId) -> KResult<()> {
        let record = self.mutexes.get(id).ok_or(KernelError::InvalidArgument)?;
        if record.locked {
            return Err(KernelError::Busy);
        }
        let old_channel = record.channel;
        let owner = record.owner;
        let storage = record.storage;

        let channel = self.alloc_channel();
        if let Some(record) = self.mutexes.get_mut(id) {
            *record = MutexRecord::new(id, channel, owner, storage);
        }
        self.wake(old_channel);

        if self.trace.contains(TraceFlags::INIT) {
            log::debug!("[mutex] re-init {} on {} (was {})", id, channel, old_channel);
        }
        Ok(())
    }

    /// Initialise the mutex word at `storage` on behalf of `owner`.
    ///
    /// `existing` is what the word held. It is re-initialised in place only
    /// if it is a live record that `owner` created for this same address. A
    /// word copied from another mutex, or zeroed or garbage storage, gets a
    /// fresh record, so two words never share one lock.
    pub fn mutex_init_at(
        &mut self,
        owner: Pid,
        storage: u64,
        existing: Option<MutexId>,
    ) -> KResult<MutexId> {
        if let Some(id) = existing {
            let bound_here = self
                .mutexes
                .get(id)
                .is_some_and(|m| m.owner == Some(owner) && m.storage == storage);
            if bound_here {
                self.mutex_reinit(id)?;
                return Ok(id);
            }
        }
        self.mutex_create_for(Some(owner), storage)
    }

    /// Drop the unlocked record `id` if its owner is gone.
    ///
    /// Returns `true` if the record was removed.
    pub(crate) fn reclaim_orphan(&mut self, id: MutexId) -> bool {
        let orphaned = match self.mutexes.get(id) {
            Some(record) if !record.locked => match record.owner {
                Some(owner) => self.procs.get(owner).is_none(),
                None => false,
            },
            _ => false,
        };
        if !orphaned {
            return false;
        }
        self.mutexes.remove(id);
        if self.trace.contains(TraceFlags::INIT) {
            log::debug!("[mutex] reclaimed {}", id);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;

    #[test]
    fn init_sets_sentinels() {
        let mut sched = Sched::new(&Config::quiet());
        let id = sched.mutex_create().unwrap();
        let record = sched.mutexes.get(id).unwrap();

        assert_eq!(record.id, id);
        assert!(!record.locked);
        assert_eq!(record.holder, None);
        assert_eq!(record.saved_priority, Nice::NO_WAITER);
        assert_eq!(record.lowest_pending_priority, Nice::NO_WAITER);
    }

    #[test]
    fn each_mutex_gets_its_own_channel() {
        let mut sched = Sched::new(&Config::quiet());
        let a = sched.mutex_create().unwrap();
        let b = sched.mutex_create().unwrap();
        let chan_a = sched.mutexes.get(a).unwrap().channel;
        let chan_b = sched.mutexes.get(b).unwrap().channel;
        assert_ne!(chan_a, chan_b);

        sched.mutex_reinit(a).unwrap();
        let chan_a2 = sched.mutexes.get(a).unwrap().channel;
        assert!(chan_a2.raw() > chan_b.raw());
    }

    #[test]
    fn table_full() {
        let config = Config {
            max_mutexes: 1,
            ..Config::quiet()
        };
        let mut sched = Sched::new(&config);
        sched.mutex_create().unwrap();
        let next_channel = sched.next_channel;

        assert_eq!(sched.mutex_create(), Err(KernelError::TableFull));
        // A failed init does not burn a channel.
        assert_eq!(sched.next_channel, next_channel);
    }

    #[test]
    fn reinit_held_mutex_is_busy() {
        let mut sched = Sched::new(&Config::quiet());
        let pid = sched.spawn(Nice::DEFAULT).unwrap();
        let id = sched.mutex_create().unwrap();
        sched.try_acquire(pid, id).unwrap();
        let before = *sched.mutexes.get(id).unwrap();

        assert_eq!(sched.mutex_reinit(id), Err(KernelError::Busy));
        assert_eq!(*sched.mutexes.get(id).unwrap(), before);
    }

    #[test]
    fn init_at_reuses_only_its_own_word() {
        let mut sched = Sched::new(&Config::quiet());
        let pid = sched.spawn(Nice::DEFAULT).unwrap();
        let other = sched.spawn(Nice::DEFAULT).unwrap();
        let a = sched.mutex_init_at(pid, 0x1000, None).unwrap();
        let chan_a = sched.mutexes.get(a).unwrap().channel;

        // Same owner, same word: re-initialised in place.
        assert_eq!(sched.mutex_init_at(pid, 0x1000, Some(a)), Ok(a));
        assert_ne!(sched.mutexes.get(a).unwrap().channel, chan_a);
        assert_eq!(sched.mutexes.get(a).unwrap().storage, 0x1000);

        // A copy of the word at another address is a new lock.
        let b = sched.mutex_init_at(pid, 0x1008, Some(a)).unwrap();
        assert_ne!(a, b);
        // So is the same address seen from another process.
        let c = sched.mutex_init_at(other, 0x1000, Some(a)).unwrap();
        assert_ne!(a, c);
        assert_eq!(sched.mutexes.count(), 3);
    }

    #[test]
    fn reclaim_only_unlocked_orphans() {
        let mut sched = Sched::new(&Config::quiet());
        let owner = sched.spawn(Nice::DEFAULT).unwrap();
        let user = sched.spawn(Nice::DEFAULT).unwrap();
        let id = sched.mutex_create_for(Some(owner), 0x1000).unwrap();
        let anon = sched.mutex_create().unwrap();

        assert!(!sched.reclaim_orphan(id));
        sched.try_acquire(user, id).unwrap();
        sched.procs.remove(owner).unwrap();
        assert!(!sched.reclaim_orphan(id));

        sched.release(user, id).unwrap();
        assert!(sched.mutexes.get(id).is_none());
        assert!(!sched.reclaim_orphan(anon));
    }

    #[test]
    fn reinit_stale_handle() {
        let mut sched = Sched::new(&Config::quiet());
        let id = sched.mutex_create().unwrap();
        sched.mutexes.remove(id).unwrap();
        assert_eq!(sched.mutex_reinit(id), Err(KernelError::InvalidArgument));
        assert_eq!(sched.mutex_reinit(MutexId::from_raw(0)), Err(KernelError::InvalidArgument));
    }
}
