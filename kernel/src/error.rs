//! Kernel error type and its syscall status codes.
//!
//! Every error here is local and recoverable: it goes back to the caller as a
//! negative status and nothing has been mutated on the way out.

use core::fmt;

/// Result alias used throughout the crate.
pub type KResult<T> = Result<T, KernelError>;

/// Failures of the mutex / nice syscalls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// A user pointer or handle failed validation.
    InvalidArgument,
    /// Release of a mutex the caller does not hold.
    NotHolder,
    /// The caller already holds `MAX_HELD_LOCKS` mutexes.
    HeldLocksFull,
    /// The process or mutex table is exhausted.
    TableFull,
    /// Re-initialising a mutex that is currently held.
    Busy,
    /// Acquiring a mutex the caller already holds.
    Deadlock,
    /// The caller was killed while waiting.
    Killed,
    /// The calling (or target) process does not exist.
    NoProcess,
    /// Unknown syscall number.
    NoSys,
}

impl KernelError {
    /// Negative status returned across the syscall boundary.
    ///
    /// Values follow the Linux errno numbering so user space can print them
    /// with familiar names.
    pub const fn status(self) -> i64 {
        match self {
            KernelError::NotHolder => -1,       // EPERM
            KernelError::NoProcess => -3,       // ESRCH
            KernelError::Killed => -4,          // EINTR
            KernelError::TableFull => -12,      // ENOMEM
            KernelError::Busy => -16,           // EBUSY
            KernelError::InvalidArgument => -22, // EINVAL
            KernelError::Deadlock => -35,       // EDEADLK
            KernelError::HeldLocksFull => -37,  // ENOLCK
            KernelError::NoSys => -38,          // ENOSYS
        }
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            KernelError::InvalidArgument => "invalid argument",
            KernelError::NotHolder => "mutex not held by caller",
            KernelError::HeldLocksFull => "held-lock list full",
            KernelError::TableFull => "kernel table full",
            KernelError::Busy => "mutex is held",
            KernelError::Deadlock => "mutex already held by caller",
            KernelError::Killed => "process killed while waiting",
            KernelError::NoProcess => "no such process",
            KernelError::NoSys => "unknown syscall",
        };
        f.write_str(msg)
    }
}
