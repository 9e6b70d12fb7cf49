//! Scheduler-side process state: nice values, process records, wait channels.

pub mod channel;
pub mod nice;
pub mod process;
