// =============================================================================
// nicelock: Priority-Inheritance Mutex
// =============================================================================
//
// A mutex here is a kernel record (see `mutex.rs`) plus three operations:
//
//   init     : fresh wait channel, unlocked, no holder, sentinel priorities
//   acquire  : claim if free; otherwise lend our nice to the holder if ours
//              is better, note it as the lowest pending nice, and park
//   release  : fall back to the saved nice (or a still-pending donation from
//              another held lock), reset, wake everyone parked
//
// There is no FIFO hand-off. Released waiters re-race; the donation only
// makes it more likely that the urgent one gets the CPU first.
//
// Each step that touches shared state is a method on `Sched` and runs under
// the global scheduling-state lock. Nothing in here takes a per-mutex lock.
//
// =============================================================================

pub mod acquire;
pub mod mutex;
pub mod release;
