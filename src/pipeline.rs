//! Pipeline: the single owner struct wiring every subsystem together and
//! running the per-batch pipeline described for `LaunchWatcher` (spec.md §4.9).
//!
//! Kept as one process-wide owner rather than module-level statics so tests
//! can instantiate independent pipelines in parallel (spec.md §9).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use crate::alerts::AlertSink;
use crate::entry::{Decision, EntryConfig, EntryEngine};
use crate::heat::HeatController;
use crate::microstructure::MicrostructureTracker;
use crate::origin::{Origin, ProgramIdSet};
use crate::parser;
use crate::scoring::{CohortTracker, DeployerRegistry};
use crate::store::{EventRow, TokenRow, TokenStore};
use crate::tx_introspect::{TxClient, TxIntrospector};
use crate::validator::{AccountFetcher, MintValidator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MintVerifyMode {
    Eager,
    Deferred,
    Off,
}

/// One ingested log batch, as delivered by the subscription transport.
#[derive(Debug, Clone)]
pub struct LogBatch {
    pub signature: Option<String>,
    pub logs: Vec<String>,
}

const DEDUP_TTL_MS: i64 = 60_000;

pub struct Pipeline<S: TokenStore, A: AlertSink, C: TxClient, F: AccountFetcher> {
    pub program_ids: Arc<ProgramIdSet>,
    pub validator: Arc<MintValidator<F>>,
    pub microstructure: Arc<MicrostructureTracker>,
    pub heat: Arc<HeatController>,
    pub entry: Arc<EntryEngine<S, A>>,
    pub introspector: Arc<TxIntrospector<C, Arc<MintValidator<F>>>>,
    pub counters: Arc<crate::counters::FeedCounters>,
    pub cohort: Arc<CohortTracker>,
    pub store: Arc<S>,
    dedup: DashMap<String, Instant>,
    cohort_addresses: HashSet<String>,
    mint_verify_mode: MintVerifyMode,
}

#[allow(clippy::too_many_arguments)]
impl<S: TokenStore, A: AlertSink, C: TxClient, F: AccountFetcher> Pipeline<S, A, C, F> {
    pub fn new(
        program_ids: ProgramIdSet,
        validator: Arc<MintValidator<F>>,
        microstructure: Arc<MicrostructureTracker>,
        heat: Arc<HeatController>,
        entry: Arc<EntryEngine<S, A>>,
        introspector: Arc<TxIntrospector<C, Arc<MintValidator<F>>>>,
        counters: Arc<crate::counters::FeedCounters>,
        cohort: Arc<CohortTracker>,
        store: Arc<S>,
        cohort_addresses: HashSet<String>,
        mint_verify_mode: MintVerifyMode,
    ) -> Self {
        Self {
            program_ids: Arc::new(program_ids),
            validator,
            microstructure,
            heat,
            entry,
            introspector,
            counters,
            cohort,
            store,
            dedup: DashMap::new(),
            cohort_addresses,
            mint_verify_mode,
        }
    }

    fn is_duplicate(&self, key: &str, now_ms: i64) -> bool {
        if let Some(entry) = self.dedup.get(key) {
            if entry.elapsed() < Duration::from_millis(DEDUP_TTL_MS as u64) {
                return true;
            }
        }
        self.dedup.insert(key.to_string(), Instant::now());
        // Opportunistic cleanup; bounded by the number of unique signatures
        // seen in the last minute, which is small relative to total traffic.
        if self.dedup.len() > 50_000 {
            self.dedup.retain(|_, inserted| inserted.elapsed() < Duration::from_millis(DEDUP_TTL_MS as u64));
        }
        let _ = now_ms;
        false
    }

    /// Run one log batch through parse → dedup → introspection → mint
    /// verification → microstructure → cohort hit → decision → persistence.
    pub async fn process_batch(&self, origin: Origin, program_id: &str, batch: LogBatch, now_ms: i64) -> Option<Decision> {
        if let Some(sig) = &batch.signature {
            if self.is_duplicate(sig, now_ms) {
                self.counters.record_duplicate_drop(now_ms);
                return None;
            }
        }

        let parsed = parser::parse(&batch.logs, origin, &self.program_ids);

        let mut mint = parsed.mint.clone();
        let mut buyer = parsed.buyer.clone();

        if mint.is_none() {
            if let Some(sig) = &batch.signature {
                let result = self.introspector.introspect(sig, origin, now_ms).await;
                mint = result.mint;
                buyer = buyer.or(result.owner);
            }
        }

        let Some(mint) = mint else {
            self.counters.record_parse_miss(now_ms);
            debug!(program_id, reason = ?parsed.reason_if_miss, "log batch yielded no mint");
            return None;
        };

        if self.mint_verify_mode == MintVerifyMode::Eager && !self.validator.is_real_mint(&mint).await {
            self.counters.record_validation_reject(now_ms);
            return None;
        }

        let raw_line = batch.logs.join("\n");
        let Some(track) = self.microstructure.track(&mint, origin, now_ms, &raw_line, &self.program_ids) else {
            self.counters.record_validation_reject(now_ms);
            return None;
        };

        if self.mint_verify_mode == MintVerifyMode::Deferred {
            let eff = self.heat.effective_thresholds(now_ms);
            let observation_gate_met = track.snapshot.buyers >= eff.min_buyers as usize
                && track.snapshot.unique_funders >= eff.min_unique as usize
                && track.snapshot.same_funder_ratio <= 0.70;
            if observation_gate_met && !self.validator.is_real_mint(&mint).await {
                self.counters.record_validation_reject(now_ms);
                return None;
            }
        }

        if let Some(buyer) = buyer.or(track.buyer.clone()) {
            if self.cohort_addresses.contains(&buyer) {
                self.cohort.record_hit(&mint, now_ms);
            }
        }

        if track.changed {
            let _ = self
                .store
                .record_event(EventRow {
                    ts: now_ms,
                    signature: batch.signature.clone(),
                    mint: mint.clone(),
                    origin: origin.to_string(),
                    buyers: track.snapshot.buyers as i64,
                    unique_funders: track.snapshot.unique_funders as i64,
                    same_funder_ratio: track.snapshot.same_funder_ratio,
                    price_jumps: track.snapshot.price_jumps as i64,
                    depth_est: track.snapshot.depth_est,
                    creator: parsed.creator.clone(),
                    snapshot_json: format!(
                        "{{\"buyers\":{},\"uniqueFunders\":{},\"sameFunderRatio\":{},\"priceJumps\":{},\"depthEst\":{}}}",
                        track.snapshot.buyers,
                        track.snapshot.unique_funders,
                        track.snapshot.same_funder_ratio,
                        track.snapshot.price_jumps,
                        track.snapshot.depth_est
                    ),
                })
                .await;
        }

        let decision = self
            .entry
            .evaluate(&mint, origin, now_ms, track.snapshot, parsed.creator.as_deref())
            .await;

        let _ = self
            .store
            .upsert_token(TokenRow {
                mint: mint.clone(),
                first_seen_ts: now_ms,
                last_seen_ts: now_ms,
                origin: origin.to_string(),
                creator: parsed.creator.clone(),
                name: None,
                symbol: None,
                seen_count: 0,
            })
            .await;

        self.counters.record_event(origin, now_ms);

        Some(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertSummary, LoggingAlertSink};
    use crate::heat::HeatConfig;
    use crate::store::InMemoryStore;
    use crate::tx_introspect::{IntrospectResult, Mode, TxData};
    use async_trait::async_trait;

    struct NoopClient;

    #[async_trait]
    impl TxClient for NoopClient {
        async fn get_transaction(&self, _signature: &str) -> crate::error::Result<TxData> {
            Ok(TxData::default())
        }
        async fn get_token_account_owner(&self, _pubkey: &str) -> crate::error::Result<Option<String>> {
            Ok(None)
        }
    }

    struct AlwaysMissingFetcher;

    #[async_trait]
    impl AccountFetcher for AlwaysMissingFetcher {
        async fn get_account(&self, _addr: &str) -> crate::error::Result<Option<crate::validator::AccountInfo>> {
            Ok(None)
        }
    }

    fn build_pipeline() -> Pipeline<InMemoryStore, LoggingAlertSink, NoopClient, AlwaysMissingFetcher> {
        let validator = Arc::new(MintValidator::new(AlwaysMissingFetcher));
        let store = Arc::new(InMemoryStore::new());
        let heat = Arc::new(HeatController::new(HeatConfig::default()));
        let entry = Arc::new(EntryEngine::new(
            store.clone(),
            Arc::new(LoggingAlertSink),
            Arc::new(AlertSummary::new()),
            heat.clone(),
            Arc::new(CohortTracker::new()),
            Arc::new(DeployerRegistry::new()),
            EntryConfig::default(),
        ));
        let introspector = Arc::new(TxIntrospector::new(NoopClient, validator.clone(), Mode::Off, 10.0, 60));
        Pipeline::new(
            ProgramIdSet::default(),
            validator,
            Arc::new(MicrostructureTracker::new()),
            heat,
            entry,
            introspector,
            Arc::new(crate::counters::FeedCounters::new(0)),
            Arc::new(CohortTracker::new()),
            store,
            HashSet::new(),
            MintVerifyMode::Off,
        )
    }

    fn mint() -> &'static str {
        "DYw8jCTfwHNRJhhmFcbXvVDTqWMEVFBX6ZKUmG5CNSKK"
    }

    #[tokio::test]
    async fn cold_start_create_batch_holds() {
        let pipeline = build_pipeline();
        let batch = LogBatch {
            signature: Some("sig1".to_string()),
            logs: vec![format!("Program log: Instruction: Create mint={}", mint())],
        };
        let decision = pipeline.process_batch(Origin::Pumpfun, "prog1", batch, 0).await;
        assert_eq!(decision, Some(Decision::Hold));
        assert_eq!(pipeline.store.accepted_count(0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn duplicate_signature_is_dropped() {
        let pipeline = build_pipeline();
        let batch = LogBatch {
            signature: Some("sig1".to_string()),
            logs: vec![format!("Program log: Instruction: Create mint={}", mint())],
        };
        pipeline.process_batch(Origin::Pumpfun, "prog1", batch.clone(), 0).await;
        let second = pipeline.process_batch(Origin::Pumpfun, "prog1", batch, 1_000).await;
        assert_eq!(second, None);
        assert_eq!(pipeline.counters.duplicate_drops(), 1);
    }

    #[tokio::test]
    async fn unparseable_batch_counts_parse_miss() {
        let pipeline = build_pipeline();
        let batch = LogBatch { signature: Some("sig2".to_string()), logs: vec!["Program log: nothing".to_string()] };
        let decision = pipeline.process_batch(Origin::Pumpfun, "prog1", batch, 0).await;
        assert_eq!(decision, None);
        assert_eq!(pipeline.counters.parse_misses(), 1);
    }

    #[tokio::test]
    async fn introspect_result() {
        // sanity: IntrospectResult constructible in tests that need it.
        let _ = IntrospectResult { mint: None, owner: None, reason: None };
    }
}
