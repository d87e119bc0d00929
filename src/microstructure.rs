//! Per-mint microstructure ring and the derived Snapshot.

use std::collections::{HashMap, VecDeque};
use std::sync::LazyLock;

use dashmap::DashMap;
use regex::Regex;

use crate::origin::{Origin, ProgramIdSet};
use crate::validator::{base58_tokens, is_valid_mint};

static PRICE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)(?:price|p)[=:]\s*([0-9]*\.?[0-9]+)").unwrap());

const MAX_EVENTS: usize = 100;
const EXPIRE_TTL_MS: i64 = 120_000;

#[derive(Debug, Clone)]
pub struct RingEvent {
    pub ts: i64,
    pub raw_line: String,
    pub funder: Option<String>,
    pub price: Option<f64>,
}

/// Derived, read-only view of a mint's microstructure at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Snapshot {
    pub buyers: usize,
    pub unique_funders: usize,
    pub same_funder_ratio: f64,
    pub price_jumps: u32,
    pub depth_est: f64,
    pub last_ts: i64,
}

struct MicrostructureState {
    origin: Origin,
    first_seen_ts: i64,
    last_seen_ts: i64,
    events: VecDeque<RingEvent>,
    funder_counts: HashMap<String, u32>,
    price_jumps: u32,
    last_price: Option<f64>,
    last_emit_ts: i64,
    last_snapshot: Snapshot,
}

impl MicrostructureState {
    fn new(origin: Origin, ts: i64) -> Self {
        Self {
            origin,
            first_seen_ts: ts,
            last_seen_ts: ts,
            events: VecDeque::new(),
            funder_counts: HashMap::new(),
            price_jumps: 0,
            last_price: None,
            last_emit_ts: 0,
            last_snapshot: Snapshot::default(),
        }
    }

    fn compute_snapshot(&self) -> Snapshot {
        let buyers = self.events.len();
        let unique_funders = self.funder_counts.len();
        let max_funder = self.funder_counts.values().copied().max().unwrap_or(0);
        let same_funder_ratio = if buyers > 0 { max_funder as f64 / buyers as f64 } else { 0.0 };
        let depth_est = (buyers as f64 / 20.0).clamp(0.0, 1.0);
        let last_ts = self.events.back().map(|e| e.ts).unwrap_or(self.last_seen_ts);
        Snapshot {
            buyers,
            unique_funders,
            same_funder_ratio,
            price_jumps: self.price_jumps,
            depth_est,
            last_ts,
        }
    }
}

/// Result of ingesting a single log line for a mint.
pub struct TrackResult {
    pub buyer: Option<String>,
    pub snapshot: Snapshot,
    pub changed: bool,
}

/// Tracks per-mint microstructure state derived from ingested log lines.
pub struct MicrostructureTracker {
    states: DashMap<String, MicrostructureState>,
}

impl Default for MicrostructureTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl MicrostructureTracker {
    pub fn new() -> Self {
        Self { states: DashMap::new() }
    }

    /// Ingest one raw log line for `mint`. Returns `None` if `mint` is invalid.
    pub fn track(
        &self,
        mint: &str,
        origin: Origin,
        ts: i64,
        raw_line: &str,
        program_ids: &ProgramIdSet,
    ) -> Option<TrackResult> {
        if !is_valid_mint(mint, program_ids) {
            return None;
        }

        let mut entry = self
            .states
            .entry(mint.to_string())
            .or_insert_with(|| MicrostructureState::new(origin, ts));
        entry.last_seen_ts = ts;

        let funder = base58_tokens(raw_line)
            .into_iter()
            .find(|tok| tok != mint && is_valid_mint(tok, program_ids));
        if let Some(ref f) = funder {
            *entry.funder_counts.entry(f.clone()).or_insert(0) += 1;
        }

        let price = PRICE_RE
            .captures(raw_line)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok());
        if let (Some(last), Some(p)) = (entry.last_price, price) {
            if last != 0.0 && ((p - last).abs() / last) >= 0.10 {
                entry.price_jumps += 1;
            }
        }
        if price.is_some() {
            entry.last_price = price;
        }

        entry.events.push_back(RingEvent {
            ts,
            raw_line: raw_line.to_string(),
            funder: funder.clone(),
            price,
        });
        if entry.events.len() > MAX_EVENTS {
            entry.events.pop_front();
        }

        let snapshot = entry.compute_snapshot();
        let prev = entry.last_snapshot;
        let changed = snapshot.buyers != prev.buyers
            || snapshot.unique_funders != prev.unique_funders
            || snapshot.price_jumps != prev.price_jumps
            || (snapshot.depth_est - prev.depth_est).abs() >= 0.02
            || (snapshot.same_funder_ratio - prev.same_funder_ratio).abs() >= 0.02
            || ts - entry.last_emit_ts > 5_000;

        if changed {
            entry.last_snapshot = snapshot;
            entry.last_emit_ts = ts;
        }

        Some(TrackResult { buyer: funder, snapshot, changed })
    }

    /// Deterministic read; returns a zeroed snapshot for an unknown mint.
    pub fn snapshot(&self, mint: &str) -> Snapshot {
        self.states.get(mint).map(|s| s.compute_snapshot()).unwrap_or_default()
    }

    /// Remove every state whose `last_seen_ts` is older than `now - ttl_ms`.
    pub fn expire(&self, now_ms: i64, ttl_ms: i64) {
        self.states.retain(|_, state| now_ms - state.last_seen_ts <= ttl_ms);
    }

    pub fn origin_of(&self, mint: &str) -> Option<Origin> {
        self.states.get(mint).map(|s| s.origin)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

pub const DEFAULT_EXPIRE_TTL_MS: i64 = EXPIRE_TTL_MS;

#[cfg(test)]
mod tests {
    use super::*;

    fn set() -> ProgramIdSet {
        ProgramIdSet::default()
    }

    fn mint() -> &'static str {
        "DYw8jCTfwHNRJhhmFcbXvVDTqWMEVFBX6ZKUmG5CNSKK"
    }

    fn funder(n: u8) -> String {
        format!("Funder{:038}", n)
    }

    #[test]
    fn rejects_invalid_mint() {
        let tracker = MicrostructureTracker::new();
        assert!(tracker.track("bad", Origin::Pumpfun, 0, "line", &set()).is_none());
    }

    #[test]
    fn tracks_buyers_and_funders() {
        let tracker = MicrostructureTracker::new();
        let line = format!("buy mint={} funder={}", mint(), funder(1));
        let result = tracker.track(mint(), Origin::Pumpfun, 1000, &line, &set()).unwrap();
        assert_eq!(result.snapshot.buyers, 1);
        assert_eq!(result.snapshot.unique_funders, 1);
        assert!(result.changed);
    }

    #[test]
    fn detects_price_jump() {
        let tracker = MicrostructureTracker::new();
        let l1 = format!("buy mint={} price=1.0", mint());
        let l2 = format!("buy mint={} price=1.2", mint());
        tracker.track(mint(), Origin::Pumpfun, 1000, &l1, &set()).unwrap();
        let r2 = tracker.track(mint(), Origin::Pumpfun, 2000, &l2, &set()).unwrap();
        assert_eq!(r2.snapshot.price_jumps, 1);
    }

    #[test]
    fn ring_caps_at_100() {
        let tracker = MicrostructureTracker::new();
        for i in 0..150 {
            let line = format!("buy mint={} funder={}", mint(), funder(i as u8));
            tracker.track(mint(), Origin::Pumpfun, i as i64, &line, &set()).unwrap();
        }
        assert_eq!(tracker.snapshot(mint()).buyers, 100);
    }

    #[test]
    fn expire_removes_stale_mints() {
        let tracker = MicrostructureTracker::new();
        let line = format!("buy mint={}", mint());
        tracker.track(mint(), Origin::Pumpfun, 0, &line, &set()).unwrap();
        tracker.expire(121_000, EXPIRE_TTL_MS);
        assert!(tracker.is_empty());
    }

    #[test]
    fn unknown_mint_snapshot_is_zero() {
        let tracker = MicrostructureTracker::new();
        let snap = tracker.snapshot("unknown");
        assert_eq!(snap, Snapshot::default());
    }
}
