//! Hosted platform for the integration tests.
//!
//! Every test thread plays one process: `bind(pid)` sets the thread-local
//! "current process", `yield_now` is a thread yield, and user memory is a
//! small array of atomic words starting at `USER_BASE`.

#![allow(dead_code)]

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use nicelock::{Config, Kernel, Nice, Pid, Platform, ProcessState};

/// First mapped user address.
pub const USER_BASE: u64 = 0x1000;

/// Number of mapped user words.
pub const USER_WORDS: usize = 64;

thread_local! {
    static CURRENT: Cell<Option<Pid>> = const { Cell::new(None) };
}

/// Make the calling thread act as `pid`.
pub fn bind(pid: Pid) {
    CURRENT.with(|current| current.set(Some(pid)));
}

pub struct HostPlatform {
    memory: Vec<AtomicU64>,
    read_only: AtomicBool,
}

impl HostPlatform {
    pub fn new() -> Self {
        Self {
            memory: (0..USER_WORDS).map(|_| AtomicU64::new(0)).collect(),
            read_only: AtomicBool::new(false),
        }
    }

    /// Address of user word `index`.
    pub fn word(index: usize) -> u64 {
        USER_BASE + (index as u64) * 8
    }

    pub fn peek(&self, addr: u64) -> u64 {
        self.slot(addr).map_or(0, |w| w.load(Ordering::SeqCst))
    }

    pub fn poke(&self, addr: u64, value: u64) {
        if let Some(w) = self.slot(addr) {
            w.store(value, Ordering::SeqCst);
        }
    }

    /// Make every `write_user` fail, as if the page were read-only.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    fn slot(&self, addr: u64) -> Option<&AtomicU64> {
        if addr < USER_BASE || addr % 8 != 0 {
            return None;
        }
        self.memory.get(((addr - USER_BASE) / 8) as usize)
    }
}

impl Platform for HostPlatform {
    fn current(&self) -> Option<Pid> {
        CURRENT.with(|current| current.get())
    }

    fn yield_now(&self) {
        thread::yield_now();
    }

    fn read_user(&self, addr: u64) -> Option<u64> {
        self.slot(addr).map(|w| w.load(Ordering::SeqCst))
    }

    fn write_user(&self, addr: u64, value: u64) -> bool {
        if self.read_only.load(Ordering::SeqCst) {
            return false;
        }
        match self.slot(addr) {
            Some(w) => {
                w.store(value, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }
}

pub fn kernel() -> Arc<Kernel<HostPlatform>> {
    kernel_with(Config::quiet())
}

pub fn kernel_with(config: Config) -> Arc<Kernel<HostPlatform>> {
    Arc::new(Kernel::new(HostPlatform::new(), config))
}

/// Poll `cond` until it holds. Panics after five seconds instead of hanging.
pub fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        if Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        thread::sleep(Duration::from_millis(1));
    }
}

/// `pid` is parked on some wait channel.
pub fn is_parked(kernel: &Kernel<HostPlatform>, pid: Pid) -> bool {
    matches!(
        kernel.process(pid).map(|p| p.state),
        Some(ProcessState::Blocked(_))
    )
}

/// Current nice of `pid`. Panics if it does not exist.
pub fn nice_of(kernel: &Kernel<HostPlatform>, pid: Pid) -> Nice {
    kernel.process(pid).expect("process exists").nice
}
