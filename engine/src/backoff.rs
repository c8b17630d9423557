use std::{
    sync::{
        Mutex,
        MutexGuard,
        PoisonError,
    },
    time::Duration,
};
use tokio::time::Instant;

/// How long a subsystem rests after fatal collection failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub interval: Duration,
    pub max_multiplier: u32,
}

impl BackoffPolicy {
    /// Minimum time since the last failure after `consecutive` failures in a row.
    pub fn delay(&self, consecutive: u32) -> Duration {
        self.interval * consecutive.min(self.max_multiplier)
    }
}

#[derive(Debug, Clone, Copy)]
struct FailureRecord {
    consecutive: u32,
    last_failure: Instant,
}

/// Per-subsystem record of recent fatal failures.
#[derive(Debug, Default)]
pub struct BackoffEntry {
    record: Mutex<Option<FailureRecord>>,
}

impl BackoffEntry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<FailureRecord>> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the number of consecutive failures including this one.
    pub fn record_failure(&self) -> u32 {
        self.record_failure_at(Instant::now())
    }

    pub fn record_failure_at(&self, at: Instant) -> u32 {
        let mut record = self.lock();
        let consecutive = record.map_or(0, |r| r.consecutive).saturating_add(1);
        *record = Some(FailureRecord {
            consecutive,
            last_failure: at,
        });
        consecutive
    }

    pub fn clear(&self) {
        self.lock().take();
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().map_or(0, |r| r.consecutive)
    }

    /// Whether a new cycle may start at `now`.
    pub fn is_ready(&self, policy: &BackoffPolicy, now: Instant) -> bool {
        match *self.lock() {
            None => true,
            Some(record) => now.saturating_duration_since(record.last_failure) >= policy.delay(record.consecutive),
        }
    }
}
