//! Generation-guarded handle tables.
//!
//! Processes and mutexes are never referred to by pointer. A reference is a
//! composite handle `(generation << 32 | index)` into a fixed-capacity table,
//! resolved on every use.
//!
//! **Invariants:**
//! - Generations start at 1, so the all-zero word never resolves. Zeroed
//!   user storage therefore reads as "no mutex".
//! - Removing an entry bumps its slot's generation, invalidating every handle
//!   that still encodes the old one. A mutex that remembers a holder which
//!   has since exited resolves that holder to `None` instead of dangling.

use alloc::vec::Vec;

/// First generation handed out for every slot.
const FIRST_GENERATION: u32 = 1;

/// Pack a (generation, index) pair into a composite handle.
#[inline]
pub fn handle_pack(generation: u32, index: usize) -> u64 {
	((generation as u64) << 32) | (index as u64 & 0xFFFF_FFFF)
}

/// Unpack a composite handle into (generation, index).
#[inline]
pub fn handle_unpack(handle: u64) -> (u32, usize) {
	let generation = (handle >> 32) as u32;
	let index = (handle & 0xFFFF_FFFF) as usize;
	(generation, index)
}

struct Slot<T> {
	value: Option<T>,
	generation: u32,
}

/// A fixed-capacity table of `T`, addressed by composite handles.
pub struct HandleTable<T> {
	slots: Vec<Slot<T>>,
}

impl<T> HandleTable<T> {
	/// Create a table with `capacity` empty slots.
	pub fn with_capacity(capacity: usize) -> Self {
		let mut slots = Vec::with_capacity(capacity);
		for _ in 0..capacity {
			slots.push(Slot {
				value: None,
				generation: FIRST_GENERATION,
			});
		}
		Self { slots }
	}

	/// Insert into the first free slot.
	///
	/// `make` receives the handle the value is about to live under, so a
	/// record can carry its own identity. Returns `None` if the table is full.
	pub fn insert_with(&mut self, make: impl FnOnce(u64) -> T) -> Option<u64> {
		let (index, slot) = self
			.slots
			.iter_mut()
			.enumerate()
			.find(|(_, slot)| slot.value.is_none())?;
		let handle = handle_pack(slot.generation, index);
		slot.value = Some(make(handle));
		Some(handle)
	}

	/// Look up a live entry. `None` if the handle is out of range, stale or
	/// empty.
	pub fn get(&self, handle: u64) -> Option<&T> {
		let (generation, index) = handle_unpack(handle);
		let slot = self.slots.get(index)?;
		if slot.generation != generation {
			return None;
		}
		slot.value.as_ref()
	}

	/// Mutable lookup, same validation as `get`.
	pub fn get_mut(&mut self, handle: u64) -> Option<&mut T> {
		let (generation, index) = handle_unpack(handle);
		let slot = self.slots.get_mut(index)?;
		if slot.generation != generation {
			return None;
		}
		slot.value.as_mut()
	}

	/// Remove an entry and retire its handle.
	pub fn remove(&mut self, handle: u64) -> Option<T> {
		let (generation, index) = handle_unpack(handle);
		let slot = self.slots.get_mut(index)?;
		if slot.generation != generation {
			return None;
		}
		let removed = slot.value.take()?;
		// Skip 0 on wrap so a recycled slot still never produces handle 0.
		slot.generation = match slot.generation.wrapping_add(1) {
			0 => FIRST_GENERATION,
			next => next,
		};
		Some(removed)
	}

	/// Iterate over live entries.
	pub fn iter(&self) -> impl Iterator<Item = &T> {
		self.slots.iter().filter_map(|slot| slot.value.as_ref())
	}

	/// Iterate mutably over live entries.
	pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
		self.slots.iter_mut().filter_map(|slot| slot.value.as_mut())
	}

	/// Count the number of occupied slots.
	pub fn count(&self) -> usize {
		self.iter().count()
	}

	/// Total number of slots.
	pub fn capacity(&self) -> usize {
		self.slots.len()
	}
}
