use std::sync::atomic::{
    AtomicBool,
    Ordering,
};

/// Non-blocking "one cycle at a time" flag for a subsystem.
///
/// Contention is never waited on: a caller that does not get a permit skips
/// its cycle.
#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    busy: AtomicBool,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the guard busy iff it is currently free. The returned permit
    /// frees it again when dropped, on every exit path.
    pub fn try_acquire(&self) -> Option<GuardPermit<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GuardPermit { guard: self })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

#[must_use = "the guard is released as soon as the permit is dropped"]
#[derive(Debug)]
pub struct GuardPermit<'a> {
    guard: &'a ReentrancyGuard,
}

impl Drop for GuardPermit<'_> {
    fn drop(&mut self) {
        self.guard.busy.store(false, Ordering::Release);
    }
}
