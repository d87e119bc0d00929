//! CLI command implementations: start, status, config, health.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::alerts::{AlertSummary, LoggingAlertSink};
use crate::config::Config;
use crate::entry::{EntryConfig, EntryEngine};
use crate::heat::HeatController;
use crate::microstructure::MicrostructureTracker;
use crate::pipeline::Pipeline;
use crate::scoring::{CohortTracker, DeployerRegistry};
use crate::store::{SqliteStore, TokenStore};
use crate::tx_introspect::TxIntrospector;
use crate::validator::MintValidator;
use crate::watcher::{LaunchWatcher, WatcherConfig};

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Start the launch-detection pipeline and its log watcher.
pub async fn start(config: &Config, dry_run: bool) -> Result<()> {
    if dry_run {
        warn!("running with dry-run forced on; no unitary-entry orders leave dry_run status");
    }
    info!(
        min_score = config.entry.min_score,
        apex_score = config.entry.apex_score,
        "starting launch detection pipeline"
    );

    let store = Arc::new(
        SqliteStore::open(&config.store_path).with_context(|| format!("opening store at {}", config.store_path))?,
    );

    let program_ids = config.program_ids.to_program_id_set();
    let validator = Arc::new(MintValidator::new(crate::validator::RpcAccountFetcher::new(
        config.feed.primary_http_url.clone(),
    )));
    let microstructure = Arc::new(MicrostructureTracker::new());
    let heat = Arc::new(HeatController::new(config.heat.to_heat_config(&config.entry)));
    let alert_summary = Arc::new(AlertSummary::new());

    let mut entry_config: EntryConfig = config.entry.to_entry_config();
    entry_config.dry_run = entry_config.dry_run || dry_run;

    let entry = Arc::new(EntryEngine::new(
        store.clone(),
        Arc::new(LoggingAlertSink),
        alert_summary.clone(),
        heat.clone(),
        Arc::new(CohortTracker::new()),
        Arc::new(DeployerRegistry::new()),
        entry_config,
    ));

    let tx_client = crate::tx_introspect::RpcTxClient::new(config.feed.primary_http_url.clone());
    let introspector = Arc::new(TxIntrospector::new(
        tx_client,
        validator.clone(),
        config.tx_lookup.to_mode(),
        config.tx_lookup.qps,
        config.tx_lookup.max_per_min,
    ));

    let cohort_addresses = config.cohort_addresses.iter().cloned().collect();

    let pipeline = Arc::new(Pipeline::new(
        program_ids,
        validator,
        microstructure,
        heat,
        entry,
        introspector,
        Arc::new(crate::counters::FeedCounters::new(now_ms())),
        Arc::new(CohortTracker::new()),
        store,
        cohort_addresses,
        config.mint_verify.to_pipeline_mode(),
    ));

    let watcher_config = WatcherConfig {
        primary_ws_url: config.feed.primary_ws_url.clone(),
        backup_ws_url: config.feed.backup_ws_url.clone(),
        commitment: config.feed.commitment.clone(),
        ping_interval_sec: 30,
    };
    let watcher = LaunchWatcher::new(pipeline, watcher_config, Arc::new(LoggingAlertSink), alert_summary);

    info!("launch watcher running, ctrl-c to stop");
    tokio::select! {
        _ = watcher.run(now_ms) => {
            warn!("launch watcher exited");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
    }

    Ok(())
}

/// Print a point-in-time status readout, sourced from the persistent store
/// (spec.md §6). Live in-process fields (feed counters, microstructure
/// summary, decision history) only exist inside a running `start` process;
/// wiring those into a queryable endpoint is the out-of-scope status
/// endpoint (spec.md §1).
pub async fn status(config: &Config) -> Result<()> {
    let store = SqliteStore::open(&config.store_path).with_context(|| format!("opening store at {}", config.store_path))?;
    let now = now_ms();
    let since_24h = now - 24 * 60 * 60 * 1000;

    let accepted = store.accepted_count(since_24h).await?;
    let rejected = store.rejected_count(since_24h).await?;
    let health = crate::status::health();

    println!("\n=== LAUNCH PIPELINE STATUS ===\n");
    println!("schema_version: {}", health.version);
    println!("store: {}", config.store_path);
    println!("accepted (24h): {}", accepted);
    println!("rejected_fatal (24h): {}", rejected);
    println!("mint_verify mode: {:?}", config.mint_verify.mode);
    println!("tx_lookup mode: {:?}", config.tx_lookup.mode);
    println!(
        "\nNote: feed counters, microstructure summary, and decision history are \
         only available from the running `start` process; this command reads \
         only the persistent store."
    );

    Ok(())
}

/// Show current configuration (secrets masked).
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

/// Check system health: RPC reachability, feed endpoint reachability, store path.
pub async fn health(config: &Config) -> Result<()> {
    println!("\n=== SYSTEM HEALTH CHECK ===\n");
    let mut all_healthy = true;

    print!("RPC endpoint... ");
    match check_rpc(config).await {
        Ok(latency_ms) => println!("OK ({latency_ms}ms)"),
        Err(e) => {
            println!("FAILED: {e}");
            all_healthy = false;
        }
    }

    print!("Primary feed websocket... ");
    match check_ws(&config.feed.primary_ws_url).await {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED: {e}");
            all_healthy = false;
        }
    }

    if !config.feed.backup_ws_url.is_empty() {
        print!("Backup feed websocket... ");
        match check_ws(&config.feed.backup_ws_url).await {
            Ok(()) => println!("OK"),
            Err(e) => println!("FAILED: {e}"),
        }
    }

    print!("Store path writable... ");
    match SqliteStore::open(&config.store_path) {
        Ok(_) => println!("OK"),
        Err(e) => {
            println!("FAILED: {e}");
            all_healthy = false;
        }
    }

    if !all_healthy {
        error!("one or more health checks failed");
        anyhow::bail!("health check failed");
    }

    Ok(())
}

async fn check_rpc(config: &Config) -> Result<u64> {
    if config.feed.primary_http_url.is_empty() {
        anyhow::bail!("no primary_http_url configured");
    }
    let url = config.feed.primary_http_url.clone();
    let start = Instant::now();
    tokio::task::spawn_blocking(move || {
        let client = solana_client::rpc_client::RpcClient::new_with_timeout(url, std::time::Duration::from_secs(5));
        client.get_slot()
    })
    .await
    .context("rpc task panicked")?
    .context("rpc call failed")?;
    Ok(start.elapsed().as_millis() as u64)
}

async fn check_ws(url: &str) -> Result<()> {
    if url.is_empty() {
        anyhow::bail!("no websocket url configured");
    }
    let timeout = std::time::Duration::from_secs(5);
    match tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url)).await {
        Ok(Ok((ws, _))) => {
            drop(ws);
            Ok(())
        }
        Ok(Err(e)) => Err(anyhow::anyhow!("websocket connection failed: {e}")),
        Err(_) => Err(anyhow::anyhow!("connection timed out after {}s", timeout.as_secs())),
    }
}
