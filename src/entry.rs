//! EntryEngine: the per-mint decision state machine.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tracing::debug;

use crate::alerts::{Alert, AlertSink, AlertSummary, DecisionKind};
use crate::heat::HeatController;
use crate::microstructure::Snapshot;
use crate::safety;
use crate::scoring::{self, CohortTracker, DeployerRegistry};
use crate::store::{EventRow, OrderStatus, RejectionRow, SizeTier, TokenStore, UnitaryEntryOrder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Hold,
    RejectedSoft,
    RejectedFatal,
    AcceptedSmall,
    AcceptedApex,
}

impl Decision {
    fn is_accepted(self) -> bool {
        matches!(self, Decision::AcceptedSmall | Decision::AcceptedApex)
    }
}

/// One row of the decision-history ring the status endpoint reads from.
#[derive(Debug, Clone)]
pub struct DecisionRecord {
    pub mint: String,
    pub ts: i64,
    pub decision: Decision,
}

const DECISION_HISTORY_CAP: usize = 200;

#[derive(Debug, Clone)]
struct MintDecisionState {
    first_seen_ts: i64,
    last_eval_ts: i64,
    reeval_count: u32,
    best_score: i32,
    last_decision: Decision,
    last_accepted_ts: Option<i64>,
    sticky_fatal: bool,
}

impl MintDecisionState {
    fn new(now_ts: i64) -> Self {
        Self {
            first_seen_ts: now_ts,
            last_eval_ts: 0,
            reeval_count: 0,
            best_score: 0,
            last_decision: Decision::Hold,
            last_accepted_ts: None,
            sticky_fatal: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EntryConfig {
    pub reeval_cooldown_sec: i64,
    pub accept_cooldown_sec: i64,
    pub hold_ttl_sec: i64,
    pub hold_max_reevals: u32,
    pub dry_run: bool,
    pub cohort_boost_amount: i32,
    pub cohort_decay_sec: i64,
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            reeval_cooldown_sec: 5,
            accept_cooldown_sec: 60,
            hold_ttl_sec: 300,
            hold_max_reevals: 20,
            dry_run: true,
            cohort_boost_amount: 25,
            cohort_decay_sec: 60,
        }
    }
}

pub struct EntryEngine<S: TokenStore, A: AlertSink> {
    states: DashMap<String, MintDecisionState>,
    store: Arc<S>,
    alert_sink: Arc<A>,
    alert_summary: Arc<AlertSummary>,
    heat: Arc<HeatController>,
    cohort: Arc<CohortTracker>,
    deployer: Arc<DeployerRegistry>,
    config: EntryConfig,
    history: Mutex<VecDeque<DecisionRecord>>,
}

impl<S: TokenStore, A: AlertSink> EntryEngine<S, A> {
    pub fn new(
        store: Arc<S>,
        alert_sink: Arc<A>,
        alert_summary: Arc<AlertSummary>,
        heat: Arc<HeatController>,
        cohort: Arc<CohortTracker>,
        deployer: Arc<DeployerRegistry>,
        config: EntryConfig,
    ) -> Self {
        Self {
            states: DashMap::new(),
            store,
            alert_sink,
            alert_summary,
            heat,
            cohort,
            deployer,
            config,
            history: Mutex::new(VecDeque::new()),
        }
    }

    pub fn last_decision(&self, mint: &str) -> Decision {
        self.states.get(mint).map(|s| s.last_decision).unwrap_or(Decision::Hold)
    }

    fn record_history(&self, mint: &str, ts: i64, decision: Decision) {
        let mut history = self.history.lock().unwrap();
        history.push_back(DecisionRecord { mint: mint.to_string(), ts, decision });
        if history.len() > DECISION_HISTORY_CAP {
            history.pop_front();
        }
    }

    /// Most recent `n` decisions, newest first.
    pub fn last_decisions(&self, n: usize) -> Vec<DecisionRecord> {
        let history = self.history.lock().unwrap();
        history.iter().rev().take(n).cloned().collect()
    }

    /// Most recent `n` accepted decisions, newest first.
    pub fn last_accepted(&self, n: usize) -> Vec<DecisionRecord> {
        let history = self.history.lock().unwrap();
        history.iter().rev().filter(|r| r.decision.is_accepted()).take(n).cloned().collect()
    }

    /// Count of history-ring entries at or after `since_ts` matching `pred`.
    /// Bounded by the ring's capacity, so under sustained high throughput this
    /// undercounts a full 24h window rather than growing unbounded.
    pub fn count_since(&self, since_ts: i64, pred: impl Fn(Decision) -> bool) -> usize {
        let history = self.history.lock().unwrap();
        history.iter().filter(|r| r.ts >= since_ts && pred(r.decision)).count()
    }

    pub async fn evaluate(
        &self,
        mint: &str,
        origin: crate::origin::Origin,
        now_ts: i64,
        snapshot: Snapshot,
        creator: Option<&str>,
    ) -> Decision {
        let decision = self.evaluate_inner(mint, origin, now_ts, snapshot, creator).await;
        self.record_history(mint, now_ts, decision);
        decision
    }

    async fn evaluate_inner(
        &self,
        mint: &str,
        origin: crate::origin::Origin,
        now_ts: i64,
        snapshot: Snapshot,
        creator: Option<&str>,
    ) -> Decision {
        // Copy the per-mint state out and drop the DashMap guard immediately;
        // holding a shard guard across an `.await` risks deadlocking other
        // shards' readers on a multi-threaded runtime.
        let mut state = self
            .states
            .entry(mint.to_string())
            .or_insert_with(|| MintDecisionState::new(now_ts))
            .clone();

        if state.sticky_fatal {
            return state.last_decision;
        }

        if state.last_eval_ts > 0 && now_ts - state.last_eval_ts < self.config.reeval_cooldown_sec * 1000 {
            return state.last_decision;
        }
        state.last_eval_ts = now_ts;
        state.reeval_count += 1;

        if state.last_decision == Decision::Hold
            && ((self.config.hold_ttl_sec > 0 && now_ts - state.first_seen_ts > self.config.hold_ttl_sec * 1000)
                || (self.config.hold_max_reevals > 0 && state.reeval_count >= self.config.hold_max_reevals))
        {
            state.last_decision = Decision::RejectedSoft;
            debug!(mint, "hold ttl expired, soft-rejecting");
            let decision = state.last_decision;
            self.states.insert(mint.to_string(), state);
            return decision;
        }

        let eff = self.heat.effective_thresholds(now_ts);

        if snapshot.buyers < eff.min_buyers as usize || snapshot.unique_funders < eff.min_unique as usize {
            state.last_decision = Decision::Hold;
            self.states.insert(mint.to_string(), state);
            return Decision::Hold;
        }

        if safety::is_fatal(&snapshot) {
            state.last_decision = Decision::RejectedFatal;
            state.sticky_fatal = true;
            let row = RejectionRow {
                mint: mint.to_string(),
                origin: origin.to_string(),
                reason: "sameFunderRatio>0.75".to_string(),
                rejected_ts: now_ts,
            };
            let _ = self.store.record_rejection(row).await;
            self.alert_sink
                .send(&Alert {
                    kind: DecisionKind::RejectedFatal,
                    mint: Some(mint.to_string()),
                    message: format!("{mint} rejected: sameFunderRatio>0.75"),
                    ts_ms: now_ts,
                })
                .await;
            self.alert_summary.bump_summary(DecisionKind::RejectedFatal, now_ts);
            self.states.insert(mint.to_string(), state);
            return Decision::RejectedFatal;
        }

        let verdict = safety::evaluate(&snapshot);
        if !verdict.passed {
            state.last_decision = Decision::RejectedSoft;
            self.states.insert(mint.to_string(), state);
            return Decision::RejectedSoft;
        }

        let cohort_boost = self.cohort.boost_for(mint, now_ts, self.config.cohort_decay_sec, self.config.cohort_boost_amount);
        let deployer_boost = creator.map(|c| self.deployer.boost_for(c)).unwrap_or(0);
        let score = scoring::score(&snapshot, cohort_boost, deployer_boost);
        state.best_score = state.best_score.max(score);

        let tier = if score >= eff.apex_score {
            Some(Decision::AcceptedApex)
        } else if score >= eff.min_score {
            Some(Decision::AcceptedSmall)
        } else {
            None
        };

        let Some(tier) = tier else {
            state.last_decision = Decision::Hold;
            self.states.insert(mint.to_string(), state);
            return Decision::Hold;
        };

        if tier == Decision::AcceptedApex && state.last_decision == Decision::AcceptedSmall {
            if let Some(last_accepted) = state.last_accepted_ts {
                if now_ts - last_accepted < self.config.accept_cooldown_sec * 1000 {
                    let decision = state.last_decision;
                    self.states.insert(mint.to_string(), state);
                    return decision;
                }
            }
        }

        if state.last_decision.is_accepted() && !(state.last_decision == Decision::AcceptedSmall && tier == Decision::AcceptedApex) {
            let decision = state.last_decision;
            self.states.insert(mint.to_string(), state);
            return decision;
        }

        let is_first_accept = !state.last_decision.is_accepted();

        let size_tier = if tier == Decision::AcceptedApex { SizeTier::Apex } else { SizeTier::Small };
        let order = UnitaryEntryOrder {
            market: mint.to_string(),
            status: if self.config.dry_run { OrderStatus::DryRun } else { OrderStatus::Open },
            mint: mint.to_string(),
            origin: origin.to_string(),
            decided_ts: now_ts,
            size_tier,
            notes: None,
        };
        let _ = self.store.upsert_unitary_entry(order).await;

        state.last_accepted_ts = Some(now_ts);
        state.last_decision = tier;

        let kind = if tier == Decision::AcceptedApex { DecisionKind::AcceptedApex } else { DecisionKind::AcceptedSmall };
        self.alert_sink
            .send(&Alert {
                kind,
                mint: Some(mint.to_string()),
                message: format!("{mint} accepted at {} with score {score}", size_tier.as_str()),
                ts_ms: now_ts,
            })
            .await;
        self.alert_summary.bump_summary(kind, now_ts);

        if is_first_accept {
            self.heat.record_accept(mint, now_ts);
        }

        self.states.insert(mint.to_string(), state);
        tier
    }

    pub async fn record_event_snapshot(&self, row: EventRow) {
        let _ = self.store.record_event(row).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::LoggingAlertSink;
    use crate::heat::{HeatConfig, HeatController};
    use crate::origin::Origin;
    use crate::store::InMemoryStore;

    fn snap(buyers: usize, unique_funders: usize, same_funder_ratio: f64, price_jumps: u32, depth_est: f64) -> Snapshot {
        Snapshot { buyers, unique_funders, same_funder_ratio, price_jumps, depth_est, last_ts: 0 }
    }

    fn engine() -> EntryEngine<InMemoryStore, LoggingAlertSink> {
        EntryEngine::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(LoggingAlertSink),
            Arc::new(AlertSummary::new()),
            Arc::new(HeatController::new(HeatConfig::default())),
            Arc::new(CohortTracker::new()),
            Arc::new(DeployerRegistry::new()),
            EntryConfig::default(),
        )
    }

    #[tokio::test]
    async fn cold_start_holds_below_observation_gate() {
        let e = engine();
        let decision = e.evaluate("mint1", Origin::Pumpfun, 0, snap(1, 0, 0.0, 0, 0.05), None).await;
        assert_eq!(decision, Decision::Hold);
    }

    #[tokio::test]
    async fn accept_happy_path_reaches_apex() {
        let e = engine();
        let decision = e.evaluate("mint1", Origin::Pumpfun, 0, snap(8, 6, 0.3, 1, 0.4), None).await;
        assert_eq!(decision, Decision::AcceptedApex);
        assert_eq!(e.store.accepted_count(0).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn fatal_safety_sticks() {
        let e = engine();
        let decision = e.evaluate("mint1", Origin::Pumpfun, 0, snap(8, 6, 0.80, 1, 0.4), None).await;
        assert_eq!(decision, Decision::RejectedFatal);
        let decision2 = e.evaluate("mint1", Origin::Pumpfun, 100_000, snap(8, 6, 0.80, 1, 0.4), None).await;
        assert_eq!(decision2, Decision::RejectedFatal);
    }

    #[tokio::test]
    async fn small_to_apex_upgrade_records_accept_once() {
        let e = engine();
        let d1 = e.evaluate("mint1", Origin::Pumpfun, 0, snap(6, 6, 0.1, 1, 0.30), None).await;
        assert_eq!(d1, Decision::AcceptedSmall);

        let d2 = e.evaluate("mint1", Origin::Pumpfun, 120_000, snap(8, 6, 0.1, 2, 0.4), None).await;
        assert_eq!(d2, Decision::AcceptedApex);

        assert_eq!(e.heat.accepts_per_hour(120_000) > 0.0, true);
    }

    #[tokio::test]
    async fn reeval_cooldown_suppresses_rapid_calls() {
        let e = engine();
        e.evaluate("mint1", Origin::Pumpfun, 1_000, snap(1, 0, 0.0, 0, 0.05), None).await;
        let decision = e.evaluate("mint1", Origin::Pumpfun, 1_500, snap(8, 6, 0.3, 1, 0.4), None).await;
        assert_eq!(decision, Decision::Hold);
    }

    #[tokio::test]
    async fn hold_ttl_expires_to_rejected_soft() {
        let e = engine();
        e.evaluate("mint1", Origin::Pumpfun, 1_000, snap(1, 0, 0.0, 0, 0.05), None).await;
        let decision = e.evaluate("mint1", Origin::Pumpfun, 400_000, snap(1, 0, 0.0, 0, 0.05), None).await;
        assert_eq!(decision, Decision::RejectedSoft);
    }

    #[tokio::test]
    async fn history_ring_tracks_recent_decisions() {
        let e = engine();
        e.evaluate("mint1", Origin::Pumpfun, 0, snap(1, 0, 0.0, 0, 0.05), None).await;
        e.evaluate("mint2", Origin::Pumpfun, 0, snap(8, 6, 0.3, 1, 0.4), None).await;
        let recent = e.last_decisions(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].mint, "mint2");
        let accepted = e.last_accepted(10);
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].mint, "mint2");
    }
}
