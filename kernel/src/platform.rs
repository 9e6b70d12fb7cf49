//! The seam between the mutex subsystem and the host kernel.
//!
//! The host owns context switching and address spaces; this crate owns the
//! scheduler state the donation protocol needs (nice values, held locks,
//! wait channels). `Platform` is everything the crate asks of the host.

use crate::task::process::Pid;

/// Services the host kernel provides.
///
/// A bare-metal kernel implements `yield_now` with its scheduler's
/// `do_schedule()`, which skips processes this crate has marked blocked.
/// The test harness implements it with `std::thread::yield_now`.
pub trait Platform: Sync {
    /// The process on whose behalf the current syscall runs, if any.
    fn current(&self) -> Option<Pid>;

    /// Give up the processor without changing the caller's run state.
    fn yield_now(&self);

    /// Read the 64-bit user word at `addr`. `None` if unmapped.
    ///
    /// `addr` has already passed the syscall layer's range and alignment
    /// checks.
    fn read_user(&self, addr: u64) -> Option<u64>;

    /// Write the 64-bit user word at `addr`. `false` if unmapped.
    fn write_user(&self, addr: u64, value: u64) -> bool;
}
