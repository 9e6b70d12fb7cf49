//! Nice values and the nice-adjustment operation.
//!
//! Lower nice = higher priority; the legal range is [-20, 19]. The extra
//! value 21 is the mutex subsystem's "nobody is waiting" sentinel and never
//! becomes a process's nice.
//!
//! Adjusting nice while holding mutexes is the subtle part: the process may
//! be running on a donated value, and a voluntary change must not be a way
//! to shed that donation. So while locks are held the request only takes
//! effect if it *raises* priority, and the requested value is written into
//! every held lock's saved priority so the eventual release lands on it.

use core::fmt;

use crate::error::{KResult, KernelError};
use crate::sched::Sched;
use crate::task::process::Pid;
use crate::TraceFlags;

/// A scheduling priority. Ordering follows the numeric value, so `min` picks
/// the more urgent of two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Nice(i8);

impl Nice {
    /// Highest priority.
    pub const MIN: Nice = Nice(-20);
    /// Lowest priority.
    pub const MAX: Nice = Nice(19);
    /// What a freshly spawned process gets unless told otherwise.
    pub const DEFAULT: Nice = Nice(0);
    /// Lowest-pending-priority of a mutex nobody has waited on since it was
    /// last released. One past `MAX`, so any real waiter compares lower.
    pub const NO_WAITER: Nice = Nice(21);

    /// Clamp an arbitrary integer into [-20, 19].
    pub const fn clamped(value: i64) -> Nice {
        if value < Self::MIN.0 as i64 {
            Self::MIN
        } else if value > Self::MAX.0 as i64 {
            Self::MAX
        } else {
            Nice(value as i8)
        }
    }

    /// Numeric value.
    #[inline]
    pub const fn get(self) -> i8 {
        self.0
    }

    /// `true` for values a process may actually run at.
    #[inline]
    pub const fn is_legal(self) -> bool {
        self.0 >= Self::MIN.0 && self.0 <= Self::MAX.0
    }

    /// `self + delta`, clamped. Never overflows, whatever `delta` is.
    pub const fn offset(self, delta: i64) -> Nice {
        Self::clamped((self.0 as i64).saturating_add(delta))
    }
}

impl Default for Nice {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Nice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Sched {
    /// Apply `delta` to `pid`'s nice value. Returns the resulting nice.
    ///
    /// The base for the adjustment is the priority the process had before
    /// any donation: the saved priority of its earliest-held mutex, or its
    /// current nice if it holds none.
    pub fn nice_adjust(&mut self, pid: Pid, delta: i64) -> KResult<Nice> {
        let Sched {
            procs,
            mutexes,
            trace,
            ..
        } = self;
        let proc = procs.get_mut(pid).ok_or(KernelError::NoProcess)?;

        let base = proc
            .held
            .first()
            .and_then(|id| mutexes.get(id))
            .map_or(proc.nice, |m| m.saved_priority);
        let requested = base.offset(delta);

        if proc.held.is_empty() {
            proc.nice = requested;
        } else {
            proc.nice = proc.nice.min(requested);
            for id in proc.held.iter() {
                if let Some(m) = mutexes.get_mut(id) {
                    m.saved_priority = requested;
                }
            }
        }

        if trace.contains(TraceFlags::NICE) {
            log::debug!(
                "[nice] {} base={} delta={} -> requested={} effective={}",
                pid,
                base,
                delta,
                requested,
                proc.nice
            );
        }
        Ok(proc.nice)
    }
}
