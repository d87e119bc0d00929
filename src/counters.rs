//! Process-wide monotonic counters with a 24-hour reset window.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crate::origin::Origin;

const RESET_INTERVAL_MS: i64 = 24 * 60 * 60 * 1000;

/// Per-origin event counters plus pipeline-wide drop/reject counters.
///
/// All fields reset together every 24h (spec.md §2 item 2); `maybe_reset`
/// is checked on every increment so there's no separate background timer.
pub struct FeedCounters {
    window_start_ms: AtomicI64,
    pumpfun: AtomicU64,
    letsbonk: AtomicU64,
    moonshot: AtomicU64,
    raydium: AtomicU64,
    orca: AtomicU64,
    parse_misses: AtomicU64,
    validation_rejects: AtomicU64,
    duplicate_drops: AtomicU64,
    last_event_ts_ms: AtomicI64,
}

impl FeedCounters {
    pub fn new(now_ms: i64) -> Self {
        Self {
            window_start_ms: AtomicI64::new(now_ms),
            pumpfun: AtomicU64::new(0),
            letsbonk: AtomicU64::new(0),
            moonshot: AtomicU64::new(0),
            raydium: AtomicU64::new(0),
            orca: AtomicU64::new(0),
            parse_misses: AtomicU64::new(0),
            validation_rejects: AtomicU64::new(0),
            duplicate_drops: AtomicU64::new(0),
            last_event_ts_ms: AtomicI64::new(0),
        }
    }

    fn maybe_reset(&self, now_ms: i64) {
        let start = self.window_start_ms.load(Ordering::Relaxed);
        if now_ms - start >= RESET_INTERVAL_MS {
            self.pumpfun.store(0, Ordering::Relaxed);
            self.letsbonk.store(0, Ordering::Relaxed);
            self.moonshot.store(0, Ordering::Relaxed);
            self.raydium.store(0, Ordering::Relaxed);
            self.orca.store(0, Ordering::Relaxed);
            self.parse_misses.store(0, Ordering::Relaxed);
            self.validation_rejects.store(0, Ordering::Relaxed);
            self.duplicate_drops.store(0, Ordering::Relaxed);
            self.window_start_ms.store(now_ms, Ordering::Relaxed);
        }
    }

    fn counter_for(&self, origin: Origin) -> &AtomicU64 {
        match origin {
            Origin::Pumpfun => &self.pumpfun,
            Origin::Letsbonk => &self.letsbonk,
            Origin::Moonshot => &self.moonshot,
            Origin::Raydium => &self.raydium,
            Origin::Orca => &self.orca,
        }
    }

    pub fn record_event(&self, origin: Origin, now_ms: i64) {
        self.maybe_reset(now_ms);
        self.counter_for(origin).fetch_add(1, Ordering::Relaxed);
        self.last_event_ts_ms.store(now_ms, Ordering::Relaxed);
    }

    pub fn record_parse_miss(&self, now_ms: i64) {
        self.maybe_reset(now_ms);
        self.parse_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_validation_reject(&self, now_ms: i64) {
        self.maybe_reset(now_ms);
        self.validation_rejects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate_drop(&self, now_ms: i64) {
        self.maybe_reset(now_ms);
        self.duplicate_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_count(&self, origin: Origin) -> u64 {
        self.counter_for(origin).load(Ordering::Relaxed)
    }

    pub fn last_event_ts_ms(&self) -> i64 {
        self.last_event_ts_ms.load(Ordering::Relaxed)
    }

    pub fn parse_misses(&self) -> u64 {
        self.parse_misses.load(Ordering::Relaxed)
    }

    pub fn validation_rejects(&self) -> u64 {
        self.validation_rejects.load(Ordering::Relaxed)
    }

    pub fn duplicate_drops(&self) -> u64 {
        self.duplicate_drops.load(Ordering::Relaxed)
    }

    pub fn subscribed_program_count(&self, set: &crate::origin::ProgramIdSet) -> usize {
        set.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_per_origin() {
        let c = FeedCounters::new(0);
        c.record_event(Origin::Pumpfun, 100);
        c.record_event(Origin::Pumpfun, 200);
        c.record_event(Origin::Orca, 300);
        assert_eq!(c.event_count(Origin::Pumpfun), 2);
        assert_eq!(c.event_count(Origin::Orca), 1);
        assert_eq!(c.last_event_ts_ms(), 300);
    }

    #[test]
    fn resets_after_24h() {
        let c = FeedCounters::new(0);
        c.record_event(Origin::Pumpfun, 100);
        assert_eq!(c.event_count(Origin::Pumpfun), 1);
        c.record_event(Origin::Pumpfun, RESET_INTERVAL_MS + 1);
        assert_eq!(c.event_count(Origin::Pumpfun), 1);
    }
}
