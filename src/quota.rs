use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Quota units charged per YouTube Data API read call.
pub const UNITS_PER_CALL: u64 = 1;

/// Shared tally of metadata-provider quota spent by this process.
///
/// Cloning hands out another handle to the same counter. It only grows,
/// except through [`QuotaCounter::reset`].
#[derive(Debug, Clone, Default)]
pub struct QuotaCounter {
    used: Arc<AtomicU64>,
}

impl QuotaCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn charge(&self, units: u64) -> u64 {
        self.used.fetch_add(units, Ordering::Relaxed) + units
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.used.store(0, Ordering::Relaxed);
    }
}
