//! Release: give the mutex back, drop any donation it carried, wake waiters.

use crate::error::{KResult, KernelError};
use crate::kernel::Kernel;
use crate::platform::Platform;
use crate::sched::Sched;
use crate::sync::mutex::MutexId;
use crate::task::channel::Channel;
use crate::task::nice::Nice;
use crate::task::process::Pid;
use crate::TraceFlags;

impl Sched {
    /// Release mutex `id` on behalf of `pid` and restore `pid`'s priority.
    ///
    /// The restored nice is the saved priority of the released mutex, unless
    /// another mutex the caller still holds has a waiter that is more urgent;
    /// then that waiter's donation stays in effect.
    ///
    /// Returns the channel to wake. The caller wakes it; waking is kept out
    /// of here so `Kernel` can do it after the state change is complete.
    ///
    /// If the process that created the mutex has exited and nobody waited
    /// for it during this hold, the record is reclaimed.
    pub fn release(&mut self, pid: Pid, id: MutexId) -> KResult<Channel> {
        let Sched {
            procs,
            mutexes,
            trace,
            ..
        } = self;
        let proc = procs.get_mut(pid).ok_or(KernelError::NoProcess)?;
        let record = mutexes.get(id).ok_or(KernelError::InvalidArgument)?;
        if !proc.held.contains(id) {
            log::warn!("[mutex] {} released {} without holding it", pid, id);
            return Err(KernelError::NotHolder);
        }
        let saved = record.saved_priority;
        let channel = record.channel;
        let contended = record.lowest_pending_priority != Nice::NO_WAITER;

        proc.held.remove(id);

        let before = proc.nice;
        proc.nice = proc
            .held
            .iter()
            .filter_map(|other| mutexes.get(other))
            .map(|other| other.lowest_pending_priority)
            .fold(saved, |acc, pending| acc.min(pending));

        if let Some(record) = mutexes.get_mut(id) {
            record.reset_unlocked();
        }

        if trace.contains(TraceFlags::RELEASE) {
            log::debug!(
                "[mutex] {} released {} nice {} -> {}",
                pid,
                id,
                before,
                proc.nice
            );
        }

        // Nobody is waiting to re-race for it; drop it if its creator is gone.
        if !contended {
            self.reclaim_orphan(id);
        }
        Ok(channel)
    }
}

impl<P: Platform> Kernel<P> {
    /// Release mutex `id`, held by the calling process, and wake everyone
    /// waiting for it. Waiters re-race; there is no hand-off.
    pub fn mutex_release(&self, id: MutexId) -> KResult<()> {
        let pid = self.current_pid()?;
        let channel = self.sched.lock().release(pid, id)?;
        self.unpark_all(channel);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::acquire::AcquireStep;
    use crate::task::process::ProcessState;
    use crate::Config;

    fn setup() -> Sched {
        Sched::new(&Config::quiet())
    }

    #[test]
    fn release_restores_saved_priority() {
        let mut sched = setup();
        let holder = sched.spawn(Nice::clamped(8)).unwrap();
        let waiter = sched.spawn(Nice::clamped(-4)).unwrap();
        let m = sched.mutex_create().unwrap();
        sched.try_acquire(holder, m).unwrap();
        sched.try_acquire(waiter, m).unwrap();
        assert_eq!(sched.procs.get(holder).unwrap().nice.get(), -4);

        let channel = sched.release(holder, m).unwrap();
        assert_eq!(channel, sched.mutexes.get(m).unwrap().channel);
        assert_eq!(sched.procs.get(holder).unwrap().nice.get(), 8);
        assert!(sched.procs.get(holder).unwrap().held.is_empty());
    }

    #[test]
    fn release_resets_record() {
        let mut sched = setup();
        let holder = sched.spawn(Nice::DEFAULT).unwrap();
        let waiter = sched.spawn(Nice::clamped(-1)).unwrap();
        let m = sched.mutex_create().unwrap();
        sched.try_acquire(holder, m).unwrap();
        sched.try_acquire(waiter, m).unwrap();

        sched.release(holder, m).unwrap();
        let record = sched.mutexes.get(m).unwrap();
        assert!(!record.locked);
        assert_eq!(record.holder, None);
        assert_eq!(record.lowest_pending_priority, Nice::NO_WAITER);
    }

    // Holder takes A then B; a nice-5 waiter queues on A and a nice-10 waiter
    // on B. Releasing B must keep the donation from A's waiter.
    #[test]
    fn release_keeps_donation_from_other_held_lock() {
        let mut sched = setup();
        let holder = sched.spawn(Nice::clamped(15)).unwrap();
        let on_a = sched.spawn(Nice::clamped(5)).unwrap();
        let on_b = sched.spawn(Nice::clamped(10)).unwrap();
        let a = sched.mutex_create().unwrap();
        let b = sched.mutex_create().unwrap();

        sched.try_acquire(holder, a).unwrap();
        sched.try_acquire(holder, b).unwrap();
        sched.try_acquire(on_a, a).unwrap();
        sched.try_acquire(on_b, b).unwrap();
        assert_eq!(sched.procs.get(holder).unwrap().nice.get(), 5);

        sched.release(holder, b).unwrap();
        assert_eq!(sched.procs.get(holder).unwrap().nice.get(), 5);

        sched.release(holder, a).unwrap();
        assert_eq!(sched.procs.get(holder).unwrap().nice.get(), 15);
    }

    // Out-of-order release: A is released while B (uncontended) stays held.
    #[test]
    fn release_out_of_order_drops_donation() {
        let mut sched = setup();
        let holder = sched.spawn(Nice::clamped(12)).unwrap();
        let waiter = sched.spawn(Nice::clamped(-6)).unwrap();
        let a = sched.mutex_create().unwrap();
        let b = sched.mutex_create().unwrap();

        sched.try_acquire(holder, a).unwrap();
        sched.try_acquire(holder, b).unwrap();
        sched.try_acquire(waiter, a).unwrap();
        assert_eq!(sched.procs.get(holder).unwrap().nice.get(), -6);

        sched.release(holder, a).unwrap();
        assert_eq!(sched.procs.get(holder).unwrap().nice.get(), 12);
        assert_eq!(sched.procs.get(holder).unwrap().held.as_slice(), &[b]);
    }

    #[test]
    fn non_holder_release_changes_nothing() {
        let mut sched = setup();
        let holder = sched.spawn(Nice::clamped(3)).unwrap();
        let other = sched.spawn(Nice::clamped(-2)).unwrap();
        let m = sched.mutex_create().unwrap();
        sched.try_acquire(holder, m).unwrap();
        let before = *sched.mutexes.get(m).unwrap();

        assert_eq!(sched.release(other, m), Err(KernelError::NotHolder));
        assert_eq!(*sched.mutexes.get(m).unwrap(), before);
        assert_eq!(sched.procs.get(other).unwrap().nice.get(), -2);

        // Unlocked mutex, never held.
        let free = sched.mutex_create().unwrap();
        assert_eq!(sched.release(holder, free), Err(KernelError::NotHolder));
    }

    #[test]
    fn release_bad_handles() {
        let mut sched = setup();
        let pid = sched.spawn(Nice::DEFAULT).unwrap();
        assert_eq!(
            sched.release(pid, MutexId::from_raw(0)),
            Err(KernelError::InvalidArgument)
        );
        let m = sched.mutex_create().unwrap();
        assert_eq!(
            sched.release(Pid::from_raw(0), m),
            Err(KernelError::NoProcess)
        );
    }

    #[test]
    fn restored_nice_is_always_legal() {
        let mut sched = setup();
        let holder = sched.spawn(Nice::MAX).unwrap();
        let a = sched.mutex_create().unwrap();
        let b = sched.mutex_create().unwrap();
        sched.try_acquire(holder, a).unwrap();
        sched.try_acquire(holder, b).unwrap();

        // No waiters anywhere: the sentinel on A must not leak into nice.
        sched.release(holder, b).unwrap();
        let nice = sched.procs.get(holder).unwrap().nice;
        assert!(nice.is_legal());
        assert_eq!(nice, Nice::MAX);
    }

    #[test]
    fn parked_waiters_are_woken_by_channel() {
        let mut sched = setup();
        let holder = sched.spawn(Nice::DEFAULT).unwrap();
        let waiter = sched.spawn(Nice::DEFAULT).unwrap();
        let m = sched.mutex_create().unwrap();
        sched.try_acquire(holder, m).unwrap();
        let channel = match sched.try_acquire(waiter, m) {
            Ok(AcquireStep::Wait(channel)) => channel,
            other => panic!("waiter should have been told to park, got {other:?}"),
        };
        sched.procs.get_mut(waiter).unwrap().state = ProcessState::Blocked(channel);

        let to_wake = sched.release(holder, m).unwrap();
        assert_eq!(sched.wake(to_wake), 1);
        assert_eq!(sched.procs.get(waiter).unwrap().state, ProcessState::Runnable);
    }
}
