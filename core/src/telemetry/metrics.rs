use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

/// Counters shared between the aligner, the tap, and whoever reports on them.
pub struct MetricsRecorder {
    inner: Mutex<MetricsSnapshot>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub aligned_pairs: u64,
    pub protocol_mismatches: u64,
    pub tap_forwarded: u64,
    pub tap_dropped: u64,
    pub errors: u64,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut MetricsSnapshot)) {
        apply(&mut self.inner.lock().unwrap_or_else(PoisonError::into_inner));
    }

    pub fn record_aligned(&self) {
        self.update(|m| m.aligned_pairs += 1);
    }

    pub fn record_mismatch(&self) {
        self.update(|m| m.protocol_mismatches += 1);
    }

    pub fn record_forwarded(&self) {
        self.update(|m| m.tap_forwarded += 1);
    }

    pub fn record_dropped(&self) {
        self.update(|m| m.tap_dropped += 1);
    }

    pub fn record_error(&self) {
        self.update(|m| m.errors += 1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
