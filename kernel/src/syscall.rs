//! Syscall boundary for the mutex and nice calls.
//!
//! Turns a raw `(nr, a0)` pair into one of the `Kernel` operations and the
//! result into a status word: `0` on success, a negative `KernelError`
//! status on failure.
//!
//! User space names a mutex by the address of a 64-bit word it owns.
//! `SYS_MUTEX_INIT` stores the kernel's `MutexId` in that word; the other
//! calls read it back on every use.

use crate::error::{KResult, KernelError};
use crate::kernel::Kernel;
use crate::platform::Platform;
use crate::sync::mutex::MutexId;
use crate::TraceFlags;

/// Syscall numbers.
pub mod nr {
	/// `sys_yield()`: voluntarily give up the CPU.
	pub const SYS_YIELD: u64 = 2;
	/// `sys_mutex_init(word_ptr)`: initialise the mutex named by `*word_ptr`.
	pub const SYS_MUTEX_INIT: u64 = 26;
	/// `sys_mutex_acquire(word_ptr)`: block until the mutex is held.
	pub const SYS_MUTEX_ACQUIRE: u64 = 27;
	/// `sys_mutex_release(word_ptr)`: release a held mutex.
	pub const SYS_MUTEX_RELEASE: u64 = 28;
	/// `sys_nice(delta)`: adjust the caller's nice value by `delta as i64`.
	pub const SYS_NICE: u64 = 29;
}

// ── User-pointer validation ────────────────────────────────────

/// The upper bound of user-space canonical addresses.
/// Anything at or above this address is kernel memory.
pub const USER_SPACE_END: u64 = 0x0000_8000_0000_0000;

/// Size and alignment of a user mutex word.
const WORD: u64 = core::mem::size_of::<u64>() as u64;

/// Validate that a user-space pointer range `[ptr, ptr+len)` is
/// safe for the kernel to access on behalf of a user process.
///
/// Returns `false` if:
/// - `ptr` is null
/// - `ptr + len` overflows
/// - any byte in the range falls in kernel address space
#[inline]
pub fn validate_user_ptr(ptr: u64, len: usize) -> bool {
	if ptr == 0 {
		return false;
	}
	if len == 0 {
		return true;
	}
	match ptr.checked_add(len as u64) {
		Some(end) => end <= USER_SPACE_END,
		None => false,
	}
}

/// A mutex word must be a valid, naturally aligned user address.
#[inline]
fn validate_word_ptr(ptr: u64) -> KResult<()> {
	if ptr % WORD != 0 || !validate_user_ptr(ptr, WORD as usize) {
		return Err(KernelError::InvalidArgument);
	}
	Ok(())
}

impl<P: Platform> Kernel<P> {
	/// Syscall entry. Returns `0` or a negative status.
	pub fn syscall(&self, nr: u64, a0: u64) -> i64 {
		let trace = self.config().trace.contains(TraceFlags::SYSCALL);
		if trace {
			log::trace!("[syscall] nr={} a0={:#x}", nr, a0);
		}
		match self.dispatch(nr, a0) {
			Ok(()) => 0,
			Err(KernelError::NoSys) => {
				log::warn!("[syscall] unknown syscall nr={}", nr);
				KernelError::NoSys.status()
			}
			Err(e) => {
				if trace {
					log::debug!("[syscall] nr={} failed: {} ({})", nr, e, e.status());
				}
				e.status()
			}
		}
	}

	fn dispatch(&self, nr: u64, a0: u64) -> KResult<()> {
		match nr {
			nr::SYS_MUTEX_INIT => self.sys_mutex_init(a0),
			nr::SYS_MUTEX_ACQUIRE => {
				let id = self.read_mutex_word(a0)?;
				self.mutex_acquire(id)
			}
			nr::SYS_MUTEX_RELEASE => {
				let id = self.read_mutex_word(a0)?;
				self.mutex_release(id)
			}
			nr::SYS_NICE => self.nice_adjust(a0 as i64).map(|_| ()),
			nr::SYS_YIELD => {
				self.yield_now();
				Ok(())
			}
			_ => Err(KernelError::NoSys),
		}
	}

	/// Fetch the `MutexId` stored in the user word at `ptr`.
	fn read_mutex_word(&self, ptr: u64) -> KResult<MutexId> {
		validate_word_ptr(ptr)?;
		self.platform
			.read_user(ptr)
			.map(MutexId::from_raw)
			.ok_or(KernelError::InvalidArgument)
	}

	fn sys_mutex_init(&self, ptr: u64) -> KResult<()> {
		let word = self.read_mutex_word(ptr)?;
		let existing = (word.raw() != 0).then_some(word);
		let id = self.mutex_init_at(ptr, existing)?;
		if id == word {
			return Ok(());
		}
		if !self.platform.write_user(ptr, id.raw()) {
			// Nobody can name the new record; drop it again.
			self.sched.lock().mutexes.remove(id);
			return Err(KernelError::InvalidArgument);
		}
		Ok(())
	}
}
