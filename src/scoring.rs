//! Conviction scoring: bucketed integer score plus cohort/deployer boosts.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::microstructure::Snapshot;

/// Pure bucketed score over a Snapshot, clamped to `[0, 100]`.
///
/// `cohort_boost` and `deployer_boost` are pre-resolved by the caller (see
/// `CohortTracker` and `DeployerRegistry` below) so this function stays a
/// pure integer sum, matching the teacher's scoring tier style.
pub fn score(snapshot: &Snapshot, cohort_boost: i32, deployer_boost: i32) -> i32 {
    let mut total: i32 = 0;

    total += if snapshot.buyers >= 8 {
        30
    } else if snapshot.buyers >= 6 {
        20
    } else {
        0
    };

    total += if snapshot.unique_funders >= 6 {
        20
    } else if snapshot.unique_funders >= 5 {
        15
    } else {
        0
    };

    total += if snapshot.price_jumps >= 2 {
        20
    } else if snapshot.price_jumps >= 1 {
        10
    } else {
        0
    };

    total += if snapshot.depth_est >= 0.35 {
        20
    } else if snapshot.depth_est >= 0.30 {
        10
    } else {
        0
    };

    if snapshot.same_funder_ratio > 0.60 {
        total -= 20;
    }

    total += cohort_boost;
    total += deployer_boost;

    total.clamp(0, 100)
}

/// Tracks the most recent smart-money "hit" timestamp per mint.
pub struct CohortTracker {
    last_hit_ts: Mutex<HashMap<String, i64>>,
}

impl Default for CohortTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CohortTracker {
    pub fn new() -> Self {
        Self { last_hit_ts: Mutex::new(HashMap::new()) }
    }

    pub fn record_hit(&self, mint: &str, ts: i64) {
        self.last_hit_ts.lock().unwrap().insert(mint.to_string(), ts);
    }

    /// Returns `boost_amount` iff a hit was recorded for `mint` within `decay_sec` of `now_ms`.
    pub fn boost_for(&self, mint: &str, now_ms: i64, decay_sec: i64, boost_amount: i32) -> i32 {
        let map = self.last_hit_ts.lock().unwrap();
        match map.get(mint) {
            Some(&hit_ts) if now_ms - hit_ts <= decay_sec * 1000 => boost_amount,
            _ => 0,
        }
    }
}

/// Per-creator accept/total history used to derive the deployer-boost bucket.
#[derive(Default)]
pub struct DeployerRegistry {
    stats: Mutex<HashMap<String, (u32, u32)>>,
}

impl DeployerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_outcome(&self, creator: &str, accepted: bool) {
        let mut stats = self.stats.lock().unwrap();
        let entry = stats.entry(creator.to_string()).or_insert((0, 0));
        entry.1 += 1;
        if accepted {
            entry.0 += 1;
        }
    }

    fn good_rate(&self, creator: &str) -> Option<f64> {
        let stats = self.stats.lock().unwrap();
        stats.get(creator).filter(|(_, total)| *total > 0).map(|(accepts, total)| *accepts as f64 / *total as f64)
    }

    /// Boost contribution for `creator`'s historical good-rate bucket.
    pub fn boost_for(&self, creator: &str) -> i32 {
        match self.good_rate(creator) {
            Some(rate) if rate >= 0.8 => 15,
            Some(rate) if rate >= 0.6 => 10,
            Some(rate) if rate >= 0.4 => 5,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(buyers: usize, unique_funders: usize, price_jumps: u32, depth_est: f64, same_funder_ratio: f64) -> Snapshot {
        Snapshot { buyers, unique_funders, same_funder_ratio, price_jumps, depth_est, last_ts: 0 }
    }

    #[test]
    fn apex_happy_path_scenario() {
        // buyers:8, uniqueFunders:6, sameFunderRatio:0.3, priceJumps:1, depthEst:0.4 => 30+20+10+20 = 80
        let s = snap(8, 6, 1, 0.4, 0.3);
        assert_eq!(score(&s, 0, 0), 80);
    }

    #[test]
    fn same_funder_penalty_applies() {
        let s = snap(8, 6, 1, 0.4, 0.65);
        assert_eq!(score(&s, 0, 0), 60);
    }

    #[test]
    fn clamps_to_zero_and_hundred() {
        let s = snap(0, 0, 0, 0.0, 0.9);
        assert_eq!(score(&s, 0, 0), 0);
        let s2 = snap(8, 6, 2, 0.4, 0.3);
        assert_eq!(score(&s2, 50, 50), 100);
    }

    #[test]
    fn cohort_boost_decays() {
        let tracker = CohortTracker::new();
        tracker.record_hit("mint1", 1_000);
        assert_eq!(tracker.boost_for("mint1", 1_500, 60, 25), 25);
        assert_eq!(tracker.boost_for("mint1", 1_000 + 61_000, 60, 25), 0);
    }

    #[test]
    fn deployer_boost_buckets() {
        let registry = DeployerRegistry::new();
        for _ in 0..8 {
            registry.record_outcome("creatorA", true);
        }
        for _ in 0..2 {
            registry.record_outcome("creatorA", false);
        }
        assert_eq!(registry.boost_for("creatorA"), 15);
        assert_eq!(registry.boost_for("unknown-creator"), 0);
    }
}
