//! Read-only status aggregation (spec.md §6 Status endpoint).
//!
//! `positions`, `trades`, and `halts` belong to the persistent-store schema
//! and migration tool, both explicitly out of scope (spec.md §1); this
//! module reports zeroed placeholders for those fields rather than reading
//! tables this pipeline never writes, and documents the gap in each field's
//! doc comment instead of guessing at executor semantics.

use std::sync::Arc;

use serde::Serialize;

use crate::alerts::{AlertSummary, DecisionKind};
use crate::entry::{Decision, DecisionRecord, EntryEngine};
use crate::heat::Band;
use crate::origin::Origin;
use crate::pipeline::Pipeline;
use crate::store::TokenStore;
use crate::tx_introspect::TxClient;
use crate::validator::AccountFetcher;
use crate::alerts::AlertSink;

const SCHEMA_VERSION: u32 = 1;
const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Serialize)]
pub struct FeedStatus {
    pub subscribed_program_count: usize,
    pub pumpfun_events: u64,
    pub letsbonk_events: u64,
    pub moonshot_events: u64,
    pub raydium_events: u64,
    pub orca_events: u64,
    pub parse_misses: u64,
    pub validation_rejects: u64,
    pub duplicate_drops: u64,
    pub last_event_ts_ms: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionSummary {
    pub mint: String,
    pub ts: i64,
    pub decision: String,
}

impl From<DecisionRecord> for DecisionSummary {
    fn from(r: DecisionRecord) -> Self {
        Self { mint: r.mint, ts: r.ts, decision: decision_label(r.decision).to_string() }
    }
}

fn decision_label(d: Decision) -> &'static str {
    match d {
        Decision::Hold => "hold",
        Decision::RejectedSoft => "rejected_soft",
        Decision::RejectedFatal => "rejected_fatal",
        Decision::AcceptedSmall => "accepted_small",
        Decision::AcceptedApex => "accepted_apex",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionStats {
    pub accepted_24h: i64,
    pub rejected_fatal_24h: i64,
    pub pending_24h: i64,
    pub soft_rejected_24h: i64,
    pub last_10_decisions: Vec<DecisionSummary>,
    pub last_10_accepted: Vec<DecisionSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MicrostructureSummary {
    pub tracked_mint_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertMetadata {
    pub accepted_small_count: u64,
    pub accepted_apex_count: u64,
    pub rejected_fatal_count: u64,
    pub reconnect_burst_count: u64,
    pub last_alert_ts_ms: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeatSummary {
    pub band: String,
    pub min_score: i32,
    pub apex_score: i32,
    pub min_buyers: i32,
    pub min_unique: i32,
    pub accepts_per_hour: f64,
}

fn band_label(b: Band) -> &'static str {
    match b {
        Band::Cold => "cold",
        Band::Neutral => "neutral",
        Band::Hot => "hot",
    }
}

/// Full status payload. `open_positions`, `realized_pnl_sol_today`, and
/// `active_halts` are placeholders for the out-of-scope executor/store
/// layer (spec.md §1); a real deployment backs them with the `positions`,
/// `trades`, and `halts` tables named in spec.md §6.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub schema_version: u32,
    pub open_positions: i64,
    pub realized_pnl_sol_today: f64,
    pub active_halts: i64,
    pub feed: FeedStatus,
    pub decisions: DecisionStats,
    pub microstructure: MicrostructureSummary,
    pub alerts: AlertMetadata,
    pub heat: HeatSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub version: u32,
}

pub fn health() -> HealthResponse {
    HealthResponse { ok: true, version: SCHEMA_VERSION }
}

pub fn build<S, A, C, F>(pipeline: &Pipeline<S, A, C, F>, alert_summary: &Arc<AlertSummary>, now_ms: i64) -> StatusSnapshot
where
    S: TokenStore,
    A: AlertSink,
    C: TxClient,
    F: AccountFetcher,
{
    build_from_parts(
        &pipeline.counters,
        &pipeline.entry,
        &pipeline.microstructure,
        &pipeline.heat,
        alert_summary,
        pipeline.program_ids.len(),
        now_ms,
    )
}

#[allow(clippy::too_many_arguments)]
fn build_from_parts<S: TokenStore, A: AlertSink>(
    counters: &crate::counters::FeedCounters,
    entry: &EntryEngine<S, A>,
    microstructure: &crate::microstructure::MicrostructureTracker,
    heat: &crate::heat::HeatController,
    alert_summary: &Arc<AlertSummary>,
    subscribed_program_count: usize,
    now_ms: i64,
) -> StatusSnapshot {
    let since_24h = now_ms - DAY_MS;

    let feed = FeedStatus {
        subscribed_program_count,
        pumpfun_events: counters.event_count(Origin::Pumpfun),
        letsbonk_events: counters.event_count(Origin::Letsbonk),
        moonshot_events: counters.event_count(Origin::Moonshot),
        raydium_events: counters.event_count(Origin::Raydium),
        orca_events: counters.event_count(Origin::Orca),
        parse_misses: counters.parse_misses(),
        validation_rejects: counters.validation_rejects(),
        duplicate_drops: counters.duplicate_drops(),
        last_event_ts_ms: counters.last_event_ts_ms(),
    };

    let accepted_24h = entry.count_since(since_24h, |d| matches!(d, Decision::AcceptedSmall | Decision::AcceptedApex)) as i64;
    let rejected_fatal_24h = entry.count_since(since_24h, |d| d == Decision::RejectedFatal) as i64;
    let pending_24h = entry.count_since(since_24h, |d| d == Decision::Hold) as i64;
    let soft_rejected_24h = entry.count_since(since_24h, |d| d == Decision::RejectedSoft) as i64;

    let decisions = DecisionStats {
        accepted_24h,
        rejected_fatal_24h,
        pending_24h,
        soft_rejected_24h,
        last_10_decisions: entry.last_decisions(10).into_iter().map(DecisionSummary::from).collect(),
        last_10_accepted: entry.last_accepted(10).into_iter().map(DecisionSummary::from).collect(),
    };

    let alerts = AlertMetadata {
        accepted_small_count: alert_summary.count_for(DecisionKind::AcceptedSmall),
        accepted_apex_count: alert_summary.count_for(DecisionKind::AcceptedApex),
        rejected_fatal_count: alert_summary.count_for(DecisionKind::RejectedFatal),
        reconnect_burst_count: alert_summary.count_for(DecisionKind::ReconnectBurst),
        last_alert_ts_ms: alert_summary.last_alert_ts(),
    };

    let eff = heat.effective_thresholds(now_ms);
    let heat_summary = HeatSummary {
        band: band_label(eff.band).to_string(),
        min_score: eff.min_score,
        apex_score: eff.apex_score,
        min_buyers: eff.min_buyers,
        min_unique: eff.min_unique,
        accepts_per_hour: heat.accepts_per_hour(now_ms),
    };

    StatusSnapshot {
        schema_version: SCHEMA_VERSION,
        open_positions: 0,
        realized_pnl_sol_today: 0.0,
        active_halts: 0,
        feed,
        decisions,
        microstructure: MicrostructureSummary { tracked_mint_count: microstructure.len() },
        alerts,
        heat: heat_summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::LoggingAlertSink;
    use crate::entry::EntryConfig;
    use crate::heat::HeatConfig;
    use crate::scoring::{CohortTracker, DeployerRegistry};
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn build_reports_zeroed_counters_cold_start() {
        let counters = crate::counters::FeedCounters::new(0);
        let heat = crate::heat::HeatController::new(HeatConfig::default());
        let microstructure = crate::microstructure::MicrostructureTracker::new();
        let alert_summary = Arc::new(AlertSummary::new());
        let entry = EntryEngine::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(LoggingAlertSink),
            alert_summary.clone(),
            Arc::new(heat),
            Arc::new(CohortTracker::new()),
            Arc::new(DeployerRegistry::new()),
            EntryConfig::default(),
        );
        let heat2 = crate::heat::HeatController::new(HeatConfig::default());
        let snapshot = build_from_parts(&counters, &entry, &microstructure, &heat2, &alert_summary, 5, 0);
        assert_eq!(snapshot.schema_version, 1);
        assert_eq!(snapshot.feed.subscribed_program_count, 5);
        assert_eq!(snapshot.decisions.accepted_24h, 0);
        assert_eq!(snapshot.microstructure.tracked_mint_count, 0);
    }

    #[test]
    fn health_reports_ok() {
        let h = health();
        assert!(h.ok);
        assert_eq!(h.version, 1);
    }
}
