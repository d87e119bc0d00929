//! LaunchWatcher: multi-endpoint WS log subscription with failover and dedup.
//!
//! Grounded on the teacher's PumpPortal client (`stream/pumpportal.rs`): a
//! `tokio::spawn`ed reconnect loop driven by `tokio::select!` between a ping
//! timer and the socket read half, with every transient failure folded back
//! into the same outer loop rather than propagated.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::alerts::{Alert, AlertSink, AlertSummary, DecisionKind};
use crate::error::{Error, Result};
use crate::origin::Origin;
use crate::pipeline::{LogBatch, Pipeline};
use crate::store::TokenStore;
use crate::tx_introspect::TxClient;
use crate::validator::AccountFetcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointSet {
    Primary,
    Backup,
}

const ERROR_WINDOW_MS: i64 = 30_000;
const PRIMARY_FAILOVER_THRESHOLD: usize = 3;
const BACKUP_STABLE_MS: i64 = 10 * 60 * 1000;

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub primary_ws_url: String,
    pub backup_ws_url: String,
    pub commitment: String,
    pub ping_interval_sec: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            primary_ws_url: String::new(),
            backup_ws_url: String::new(),
            commitment: "confirmed".to_string(),
            ping_interval_sec: 30,
        }
    }
}

struct ReconnectState {
    endpoint: EndpointSet,
    error_window: VecDeque<i64>,
    attempts: u32,
    stable_since: i64,
}

impl ReconnectState {
    fn new(now_ms: i64) -> Self {
        Self { endpoint: EndpointSet::Primary, error_window: VecDeque::new(), attempts: 0, stable_since: now_ms }
    }

    fn record_error(&mut self, now_ms: i64) -> usize {
        self.error_window.push_back(now_ms);
        while let Some(&front) = self.error_window.front() {
            if now_ms - front > ERROR_WINDOW_MS {
                self.error_window.pop_front();
            } else {
                break;
            }
        }
        self.error_window.len()
    }
}

fn backoff_ms(attempts: u32) -> u64 {
    let exp = attempts.saturating_sub(1).min(6);
    (30_000u64).min(1_000 * 2u64.pow(exp))
}

/// Drives one multiplexed log subscription connection per clock tick,
/// reconnecting/failing over as configured, and feeds each batch to `Pipeline`.
pub struct LaunchWatcher<S: TokenStore, A: AlertSink, C: TxClient, F: AccountFetcher> {
    pipeline: Arc<Pipeline<S, A, C, F>>,
    config: WatcherConfig,
    alert_sink: Arc<A>,
    alert_summary: Arc<AlertSummary>,
    state: Mutex<ReconnectState>,
    req_id: AtomicU64,
}

impl<S: TokenStore, A: AlertSink, C: TxClient, F: AccountFetcher> LaunchWatcher<S, A, C, F> {
    pub fn new(pipeline: Arc<Pipeline<S, A, C, F>>, config: WatcherConfig, alert_sink: Arc<A>, alert_summary: Arc<AlertSummary>) -> Self {
        Self { pipeline, config, alert_sink, alert_summary, state: Mutex::new(ReconnectState::new(0)), req_id: AtomicU64::new(1) }
    }

    fn current_url(&self, endpoint: EndpointSet) -> &str {
        match endpoint {
            EndpointSet::Primary => &self.config.primary_ws_url,
            EndpointSet::Backup => &self.config.backup_ws_url,
        }
    }

    /// Runs until the socket is told to shut down; never returns `Ok` under
    /// normal operation, matching the teacher's "reconnect forever" loop.
    pub async fn run(&self, now_ms_fn: impl Fn() -> i64) {
        loop {
            let endpoint = self.state.lock().await.endpoint;
            let url = self.current_url(endpoint).to_string();
            if url.is_empty() {
                error!("no websocket url configured for {:?}, backing off", endpoint);
                sleep(Duration::from_secs(5)).await;
                continue;
            }

            info!(?endpoint, url, "connecting launch watcher");
            let result = self.connect_and_stream(&url).await;
            let now_ms = now_ms_fn();

            match result {
                Ok(()) => {
                    let mut state = self.state.lock().await;
                    state.attempts = 0;
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "launch watcher transport error");
                    let mut state = self.state.lock().await;
                    let burst_len = state.record_error(now_ms);
                    state.attempts += 1;

                    if state.endpoint == EndpointSet::Primary && burst_len > PRIMARY_FAILOVER_THRESHOLD {
                        state.endpoint = EndpointSet::Backup;
                        state.stable_since = now_ms;
                        state.attempts = 0;
                        info!("failing over to backup endpoint after {} errors in window", burst_len);
                    } else if state.endpoint == EndpointSet::Backup && now_ms - state.stable_since > BACKUP_STABLE_MS {
                        state.endpoint = EndpointSet::Primary;
                        state.stable_since = now_ms;
                        state.attempts = 0;
                        info!("switching back to primary endpoint after stable backup period");
                    }

                    if burst_len == 1 {
                        self.alert_sink
                            .send(&Alert {
                                kind: DecisionKind::ReconnectBurst,
                                mint: None,
                                message: format!("transport error: {e}"),
                                ts_ms: now_ms,
                            })
                            .await;
                        self.alert_summary.bump_summary(DecisionKind::ReconnectBurst, now_ms);
                    }

                    let delay = backoff_ms(state.attempts);
                    drop(state);
                    sleep(Duration::from_millis(delay)).await;
                }
            }
        }
    }

    async fn connect_and_stream(&self, url: &str) -> Result<()> {
        let (ws_stream, _) = connect_async(url).await.map_err(|e| Error::WsConnection(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let program_ids = self.pipeline.program_ids.subscription_ids();
        let mut pending_subscribe: HashMap<u64, String> = HashMap::new();
        let mut sub_to_program: HashMap<u64, String> = HashMap::new();

        for program_id in &program_ids {
            let id = self.req_id.fetch_add(1, Ordering::Relaxed);
            let req = json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": "logsSubscribe",
                "params": [
                    { "mentions": [program_id] },
                    { "commitment": self.config.commitment },
                ],
            });
            pending_subscribe.insert(id, program_id.clone());
            write
                .send(Message::Text(req.to_string()))
                .await
                .map_err(|e| Error::WsConnection(e.to_string()))?;
        }
        info!(count = program_ids.len(), "subscribed to program log streams");

        let mut ping_timer = tokio::time::interval(Duration::from_secs(self.config.ping_interval_sec));

        loop {
            tokio::select! {
                _ = ping_timer.tick() => {
                    if write.send(Message::Ping(Vec::new())).await.is_err() {
                        return Err(Error::WsDisconnected);
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_message(&text, &mut pending_subscribe, &mut sub_to_program).await;
                        }
                        Some(Ok(Message::Pong(_))) => {}
                        Some(Ok(Message::Close(_))) => {
                            info!("log stream closed by server");
                            return Err(Error::WsDisconnected);
                        }
                        Some(Err(e)) => return Err(Error::WsConnection(e.to_string())),
                        None => return Err(Error::WsDisconnected),
                        _ => {}
                    }
                }
            }
        }
    }

    async fn handle_message(&self, text: &str, pending: &mut HashMap<u64, String>, sub_to_program: &mut HashMap<u64, String>) {
        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "unparseable watcher message");
                return;
            }
        };

        if let (Some(id), Some(sub_id)) = (value.get("id").and_then(Value::as_u64), value.get("result").and_then(Value::as_u64)) {
            if let Some(program_id) = pending.remove(&id) {
                sub_to_program.insert(sub_id, program_id);
            }
            return;
        }

        let Some(params) = value.get("params") else { return };
        let Some(sub_id) = params.get("subscription").and_then(Value::as_u64) else { return };
        let Some(program_id) = sub_to_program.get(&sub_id) else { return };
        let Some(origin) = self.pipeline.program_ids.origin_of(program_id) else { return };

        let result = params.get("result").and_then(|r| r.get("value"));
        let signature = result.and_then(|v| v.get("signature")).and_then(Value::as_str).map(str::to_string);
        let logs: Vec<String> = result
            .and_then(|v| v.get("logs"))
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|l| l.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        if logs.is_empty() {
            return;
        }

        let batch = LogBatch { signature, logs };
        let now_ms = chrono_now_ms();
        self.pipeline.process_batch(origin, program_id, batch, now_ms).await;
    }
}

/// Wall-clock millis, isolated in one place so `Pipeline`'s own methods stay
/// deterministic and testable with injected timestamps.
fn chrono_now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff_ms(1), 1_000);
        assert_eq!(backoff_ms(2), 2_000);
        assert_eq!(backoff_ms(7), 64_000.min(30_000));
        assert_eq!(backoff_ms(100), 30_000);
    }

    #[test]
    fn error_window_evicts_old_entries() {
        let mut state = ReconnectState::new(0);
        assert_eq!(state.record_error(0), 1);
        assert_eq!(state.record_error(10_000), 2);
        assert_eq!(state.record_error(40_000), 2);
    }
}
