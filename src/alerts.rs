//! Alert sink abstraction plus pure, side-effect-free summary counters.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionKind {
    AcceptedSmall,
    AcceptedApex,
    RejectedFatal,
    ReconnectBurst,
}

#[derive(Debug, Clone)]
pub struct Alert {
    pub kind: DecisionKind,
    pub mint: Option<String>,
    pub message: String,
    pub ts_ms: i64,
}

/// Outbound notification surface. The default implementation just logs;
/// a real notifier (webhook, Telegram, etc.) is a collaborator the pipeline
/// injects, kept out of the decision core per spec.md §9.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, alert: &Alert);
}

pub struct LoggingAlertSink;

#[async_trait]
impl AlertSink for LoggingAlertSink {
    async fn send(&self, alert: &Alert) {
        match alert.kind {
            DecisionKind::RejectedFatal => warn!(mint = ?alert.mint, "{}", alert.message),
            _ => info!(mint = ?alert.mint, "{}", alert.message),
        }
    }
}

/// Pure counters the alerting layer's 5-minute summary timer reads from.
/// Kept separate from the sink so the decision core is testable without a
/// live notifier (spec.md §9 Design Notes).
#[derive(Default)]
pub struct AlertSummary {
    counts: Mutex<HashMap<DecisionKind, u64>>,
    last_alert_ts_ms: AtomicI64,
}

impl AlertSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump_summary(&self, kind: DecisionKind, ts_ms: i64) {
        let mut counts = self.counts.lock().unwrap();
        *counts.entry(kind).or_insert(0) += 1;
        self.last_alert_ts_ms.store(ts_ms, Ordering::Relaxed);
    }

    pub fn count_for(&self, kind: DecisionKind) -> u64 {
        *self.counts.lock().unwrap().get(&kind).unwrap_or(&0)
    }

    pub fn last_alert_ts(&self) -> i64 {
        self.last_alert_ts_ms.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_summary_tracks_per_kind_counts() {
        let summary = AlertSummary::new();
        summary.bump_summary(DecisionKind::AcceptedSmall, 100);
        summary.bump_summary(DecisionKind::AcceptedSmall, 200);
        summary.bump_summary(DecisionKind::RejectedFatal, 150);
        assert_eq!(summary.count_for(DecisionKind::AcceptedSmall), 2);
        assert_eq!(summary.count_for(DecisionKind::RejectedFatal), 1);
        assert_eq!(summary.last_alert_ts(), 200);
    }

    #[tokio::test]
    async fn logging_sink_does_not_panic() {
        let sink = LoggingAlertSink;
        sink.send(&Alert {
            kind: DecisionKind::AcceptedApex,
            mint: Some("MintA".to_string()),
            message: "accepted".to_string(),
            ts_ms: 0,
        })
        .await;
    }
}
