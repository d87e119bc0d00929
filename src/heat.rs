//! Minute-indexed accept-rate ring and heat-adjusted thresholds.

use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Cold,
    Neutral,
    Hot,
}

#[derive(Debug, Clone, Copy)]
pub struct ScoreBuyersDelta {
    pub score: i32,
    pub buyers: i32,
}

#[derive(Debug, Clone, Copy)]
pub struct HeatConfig {
    pub enabled: bool,
    pub window_min: i64,
    pub min_accepts_per_hr: f64,
    pub max_accepts_per_hr: f64,
    pub loosen: ScoreBuyersDelta,
    pub tighten: ScoreBuyersDelta,
    pub floor: ScoreBuyersDelta,
    pub ceil: ScoreBuyersDelta,
    pub base_min_score: i32,
    pub base_apex_score: i32,
    pub base_min_buyers: i32,
    pub base_min_unique: i32,
}

impl Default for HeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_min: 10,
            min_accepts_per_hr: 2.0,
            max_accepts_per_hr: 40.0,
            loosen: ScoreBuyersDelta { score: 10, buyers: 1 },
            tighten: ScoreBuyersDelta { score: 10, buyers: 1 },
            floor: ScoreBuyersDelta { score: 40, buyers: 3 },
            ceil: ScoreBuyersDelta { score: 95, buyers: 15 },
            base_min_score: 60,
            base_apex_score: 80,
            base_min_buyers: 4,
            base_min_unique: 4,
        }
    }
}

/// Effective, heat-adjusted thresholds for a given instant.
#[derive(Debug, Clone, Copy)]
pub struct EffectiveThresholds {
    pub band: Band,
    pub min_score: i32,
    pub apex_score: i32,
    pub min_buyers: i32,
    pub min_unique: i32,
}

fn clamp_i32(v: i32, lo: i32, hi: i32) -> i32 {
    v.clamp(lo.min(hi), hi.max(lo))
}

/// Minute-indexed ring of distinct-mint-accept sets.
pub struct HeatController {
    config: HeatConfig,
    ring: Mutex<Vec<(i64, HashSet<String>)>>,
    len: i64,
}

impl HeatController {
    pub fn new(config: HeatConfig) -> Self {
        let len = config.window_min.max(60);
        Self {
            config,
            ring: Mutex::new(vec![(-1, HashSet::new()); len as usize]),
            len,
        }
    }

    fn minute_bucket(&self, ts_ms: i64) -> i64 {
        (ts_ms / 60_000).rem_euclid(self.len)
    }

    /// Record an accept for `mint` at `ts_ms`, zeroing out any stale bucket it lands on.
    pub fn record_accept(&self, mint: &str, ts_ms: i64) {
        let minute = ts_ms / 60_000;
        let idx = self.minute_bucket(ts_ms) as usize;
        let mut ring = self.ring.lock().unwrap();
        if ring[idx].0 != minute {
            ring[idx] = (minute, HashSet::new());
        }
        ring[idx].1.insert(mint.to_string());
    }

    /// Distinct mints accepted in the last `window_min` minutes, scaled to a per-hour rate.
    pub fn accepts_per_hour(&self, ts_ms: i64) -> f64 {
        let current_minute = ts_ms / 60_000;
        let window = self.config.window_min.max(1);
        let ring = self.ring.lock().unwrap();
        let mut distinct = HashSet::new();
        for offset in 0..window {
            let minute = current_minute - offset;
            if minute < 0 {
                continue;
            }
            let idx = (minute.rem_euclid(self.len)) as usize;
            let (bucket_minute, set) = &ring[idx];
            if *bucket_minute == minute {
                distinct.extend(set.iter().cloned());
            }
        }
        distinct.len() as f64 * (60.0 / window as f64)
    }

    fn band(&self, rate: f64) -> Band {
        if rate < self.config.min_accepts_per_hr {
            Band::Cold
        } else if rate > self.config.max_accepts_per_hr {
            Band::Hot
        } else {
            Band::Neutral
        }
    }

    pub fn effective_thresholds(&self, ts_ms: i64) -> EffectiveThresholds {
        let cfg = &self.config;
        if !cfg.enabled {
            return EffectiveThresholds {
                band: Band::Neutral,
                min_score: cfg.base_min_score,
                apex_score: cfg.base_apex_score,
                min_buyers: cfg.base_min_buyers,
                min_unique: cfg.base_min_unique,
            };
        }

        let rate = self.accepts_per_hour(ts_ms);
        let band = self.band(rate);

        let (score_delta, buyers_delta) = match band {
            Band::Cold => (-cfg.loosen.score.abs(), -cfg.loosen.buyers.abs()),
            Band::Hot => (cfg.tighten.score.abs(), cfg.tighten.buyers.abs()),
            Band::Neutral => (0, 0),
        };

        let floor_score = if band == Band::Cold { cfg.floor.score.max(40) } else { cfg.floor.score };
        let min_score = clamp_i32(cfg.base_min_score + score_delta, floor_score, cfg.ceil.score);

        let apex_score = clamp_i32(cfg.base_apex_score, cfg.floor.score, cfg.ceil.score);

        let floor_buyers = if band == Band::Cold { cfg.floor.buyers.max(5) } else { cfg.floor.buyers };
        let min_buyers = clamp_i32(cfg.base_min_buyers + buyers_delta, floor_buyers, cfg.ceil.buyers);

        let unique_floor = if band == Band::Cold {
            (4).max(floor_buyers - 1)
        } else {
            (0).max(cfg.floor.buyers - 1)
        };
        let unique_ceil = (0).max(cfg.ceil.buyers - 2);
        let min_unique = clamp_i32(cfg.base_min_unique + buyers_delta, unique_floor, unique_ceil);

        EffectiveThresholds { band, min_score, apex_score, min_buyers, min_unique }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_per_hour_scales_window() {
        let heat = HeatController::new(HeatConfig { window_min: 10, ..Default::default() });
        heat.record_accept("mintA", 0);
        heat.record_accept("mintB", 30_000);
        let rate = heat.accepts_per_hour(60_000);
        assert_eq!(rate, 2.0 * 6.0);
    }

    #[test]
    fn band_transitions_at_exact_threshold() {
        let cfg = HeatConfig { window_min: 60, min_accepts_per_hr: 2.0, max_accepts_per_hr: 4.0, ..Default::default() };
        let heat = HeatController::new(cfg);
        // zero accepts => rate 0 < 2.0 => cold
        let eff = heat.effective_thresholds(0);
        assert_eq!(eff.band, Band::Cold);
    }

    #[test]
    fn apex_score_never_drifts_with_heat() {
        let cfg = HeatConfig { window_min: 60, min_accepts_per_hr: 100.0, ..Default::default() };
        let heat = HeatController::new(cfg);
        let eff = heat.effective_thresholds(0);
        assert_eq!(eff.band, Band::Cold);
        assert_eq!(eff.apex_score, 80);
    }

    #[test]
    fn disabled_heat_uses_base_thresholds() {
        let cfg = HeatConfig { enabled: false, ..Default::default() };
        let heat = HeatController::new(cfg);
        let eff = heat.effective_thresholds(1_000_000);
        assert_eq!(eff.min_score, 60);
        assert_eq!(eff.min_buyers, 4);
    }
}
