//! Configuration loading and validation.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::entry::EntryConfig;
use crate::heat::{HeatConfig, ScoreBuyersDelta};
use crate::origin::{Origin, ProgramIdSet};
use crate::tx_introspect::Mode as TxLookupMode;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_store_path")]
    pub store_path: String,
    pub feed: FeedConfig,
    #[serde(default)]
    pub program_ids: ProgramIdsConfig,
    #[serde(default)]
    pub entry: EntrySettings,
    #[serde(default)]
    pub heat: HeatSettings,
    #[serde(default)]
    pub mint_verify: MintVerifySettings,
    #[serde(default)]
    pub tx_lookup: TxLookupSettings,
    #[serde(default)]
    pub alerts: AlertSettings,
    #[serde(default)]
    pub cohort_addresses: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    #[serde(default)]
    pub primary_ws_url: String,
    #[serde(default)]
    pub backup_ws_url: String,
    #[serde(default)]
    pub primary_http_url: String,
    #[serde(default)]
    pub backup_http_url: String,
    #[serde(default = "default_commitment")]
    pub commitment: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            primary_ws_url: String::new(),
            backup_ws_url: String::new(),
            primary_http_url: String::new(),
            backup_http_url: String::new(),
            commitment: default_commitment(),
        }
    }
}

/// Five per-origin program-id lists (spec.md §6 Configuration).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgramIdsConfig {
    #[serde(default)]
    pub pumpfun: Vec<String>,
    #[serde(default)]
    pub letsbonk: Vec<String>,
    #[serde(default)]
    pub moonshot: Vec<String>,
    #[serde(default)]
    pub raydium: Vec<String>,
    #[serde(default)]
    pub orca: Vec<String>,
}

impl ProgramIdsConfig {
    pub fn to_program_id_set(&self) -> ProgramIdSet {
        ProgramIdSet::build(&[
            (Origin::Pumpfun, self.pumpfun.clone()),
            (Origin::Letsbonk, self.letsbonk.clone()),
            (Origin::Moonshot, self.moonshot.clone()),
            (Origin::Raydium, self.raydium.clone()),
            (Origin::Orca, self.orca.clone()),
        ])
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntrySettings {
    #[serde(default = "default_min_score")]
    pub min_score: i32,
    #[serde(default = "default_apex_score")]
    pub apex_score: i32,
    #[serde(default = "default_reeval_cooldown_sec")]
    pub reeval_cooldown_sec: i64,
    #[serde(default = "default_accept_cooldown_sec")]
    pub accept_cooldown_sec: i64,
    #[serde(default = "default_min_obs_buyers")]
    pub min_obs_buyers: i32,
    #[serde(default = "default_min_obs_unique")]
    pub min_obs_unique: i32,
    #[serde(default = "default_hold_ttl_sec")]
    pub hold_ttl_sec: i64,
    #[serde(default = "default_hold_max_reevals")]
    pub hold_max_reevals: u32,
    #[serde(default = "default_true")]
    pub dry_run: bool,
    #[serde(default = "default_cohort_boost_amount")]
    pub cohort_boost_amount: i32,
    #[serde(default = "default_cohort_decay_sec")]
    pub cohort_decay_sec: i64,
}

impl Default for EntrySettings {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            apex_score: default_apex_score(),
            reeval_cooldown_sec: default_reeval_cooldown_sec(),
            accept_cooldown_sec: default_accept_cooldown_sec(),
            min_obs_buyers: default_min_obs_buyers(),
            min_obs_unique: default_min_obs_unique(),
            hold_ttl_sec: default_hold_ttl_sec(),
            hold_max_reevals: default_hold_max_reevals(),
            dry_run: true,
            cohort_boost_amount: default_cohort_boost_amount(),
            cohort_decay_sec: default_cohort_decay_sec(),
        }
    }
}

impl EntrySettings {
    pub fn to_entry_config(&self) -> EntryConfig {
        EntryConfig {
            reeval_cooldown_sec: self.reeval_cooldown_sec,
            accept_cooldown_sec: self.accept_cooldown_sec,
            hold_ttl_sec: self.hold_ttl_sec,
            hold_max_reevals: self.hold_max_reevals,
            dry_run: self.dry_run,
            cohort_boost_amount: self.cohort_boost_amount,
            cohort_decay_sec: self.cohort_decay_sec,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeatSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_window_min")]
    pub window_min: i64,
    #[serde(default = "default_min_accepts_per_hr")]
    pub min_accepts_per_hr: f64,
    #[serde(default = "default_max_accepts_per_hr")]
    pub max_accepts_per_hr: f64,
    #[serde(default = "default_loosen")]
    pub loosen_delta: ScoreBuyers,
    #[serde(default = "default_tighten")]
    pub tighten_delta: ScoreBuyers,
    #[serde(default = "default_floor")]
    pub floor: ScoreBuyers,
    #[serde(default = "default_ceil")]
    pub ceil: ScoreBuyers,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ScoreBuyers {
    pub score: i32,
    pub buyers: i32,
}

impl Default for HeatSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            window_min: default_window_min(),
            min_accepts_per_hr: default_min_accepts_per_hr(),
            max_accepts_per_hr: default_max_accepts_per_hr(),
            loosen_delta: default_loosen(),
            tighten_delta: default_tighten(),
            floor: default_floor(),
            ceil: default_ceil(),
        }
    }
}

impl HeatSettings {
    pub fn to_heat_config(&self, entry: &EntrySettings) -> HeatConfig {
        HeatConfig {
            enabled: self.enabled,
            window_min: self.window_min,
            min_accepts_per_hr: self.min_accepts_per_hr,
            max_accepts_per_hr: self.max_accepts_per_hr,
            loosen: ScoreBuyersDelta { score: self.loosen_delta.score, buyers: self.loosen_delta.buyers },
            tighten: ScoreBuyersDelta { score: self.tighten_delta.score, buyers: self.tighten_delta.buyers },
            floor: ScoreBuyersDelta { score: self.floor.score, buyers: self.floor.buyers },
            ceil: ScoreBuyersDelta { score: self.ceil.score, buyers: self.ceil.buyers },
            base_min_score: entry.min_score,
            base_apex_score: entry.apex_score,
            base_min_buyers: entry.min_obs_buyers,
            base_min_unique: entry.min_obs_unique,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MintVerifyMode {
    Eager,
    Deferred,
    Off,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MintVerifySettings {
    #[serde(default = "default_mint_verify_mode")]
    pub mode: MintVerifyMode,
    #[serde(default = "default_mint_verify_ttl_sec")]
    pub ttl_sec: u64,
}

impl Default for MintVerifySettings {
    fn default() -> Self {
        Self { mode: default_mint_verify_mode(), ttl_sec: default_mint_verify_ttl_sec() }
    }
}

impl MintVerifySettings {
    pub fn to_pipeline_mode(&self) -> crate::pipeline::MintVerifyMode {
        match self.mode {
            MintVerifyMode::Eager => crate::pipeline::MintVerifyMode::Eager,
            MintVerifyMode::Deferred => crate::pipeline::MintVerifyMode::Deferred,
            MintVerifyMode::Off => crate::pipeline::MintVerifyMode::Off,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxLookupModeSetting {
    Off,
    PumpfunOnly,
    All,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxLookupSettings {
    #[serde(default = "default_tx_lookup_mode")]
    pub mode: TxLookupModeSetting,
    #[serde(default = "default_tx_qps")]
    pub qps: f64,
    #[serde(default = "default_tx_max_per_min")]
    pub max_per_min: u32,
}

impl Default for TxLookupSettings {
    fn default() -> Self {
        Self { mode: default_tx_lookup_mode(), qps: default_tx_qps(), max_per_min: default_tx_max_per_min() }
    }
}

impl TxLookupSettings {
    pub fn to_mode(&self) -> TxLookupMode {
        match self.mode {
            TxLookupModeSetting::Off => TxLookupMode::Off,
            TxLookupModeSetting::PumpfunOnly => TxLookupMode::PumpfunOnly,
            TxLookupModeSetting::All => TxLookupMode::All,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertSettings {
    #[serde(default)]
    pub accepted_only: bool,
    #[serde(default = "default_alert_min_score")]
    pub min_score: i32,
    #[serde(default = "default_alert_rate_limit_sec")]
    pub rate_limit_sec: i64,
    #[serde(default = "default_summary_every_sec")]
    pub summary_every_sec: i64,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            accepted_only: false,
            min_score: default_alert_min_score(),
            rate_limit_sec: default_alert_rate_limit_sec(),
            summary_every_sec: default_summary_every_sec(),
        }
    }
}

fn default_log_level() -> String {
    std::env::var("LAUNCHD_LOG_LEVEL").unwrap_or_else(|_| "info".into())
}
fn default_store_path() -> String {
    "launchd.sqlite3".into()
}
fn default_commitment() -> String {
    "confirmed".into()
}
fn default_min_score() -> i32 {
    60
}
fn default_apex_score() -> i32 {
    80
}
fn default_reeval_cooldown_sec() -> i64 {
    5
}
fn default_accept_cooldown_sec() -> i64 {
    60
}
fn default_min_obs_buyers() -> i32 {
    4
}
fn default_min_obs_unique() -> i32 {
    4
}
fn default_hold_ttl_sec() -> i64 {
    300
}
fn default_hold_max_reevals() -> u32 {
    20
}
fn default_cohort_boost_amount() -> i32 {
    25
}
fn default_cohort_decay_sec() -> i64 {
    60
}
fn default_window_min() -> i64 {
    10
}
fn default_min_accepts_per_hr() -> f64 {
    2.0
}
fn default_max_accepts_per_hr() -> f64 {
    40.0
}
fn default_loosen() -> ScoreBuyers {
    ScoreBuyers { score: 10, buyers: 1 }
}
fn default_tighten() -> ScoreBuyers {
    ScoreBuyers { score: 10, buyers: 1 }
}
fn default_floor() -> ScoreBuyers {
    ScoreBuyers { score: 40, buyers: 3 }
}
fn default_ceil() -> ScoreBuyers {
    ScoreBuyers { score: 95, buyers: 15 }
}
fn default_mint_verify_mode() -> MintVerifyMode {
    MintVerifyMode::Deferred
}
fn default_mint_verify_ttl_sec() -> u64 {
    3600
}
fn default_tx_lookup_mode() -> TxLookupModeSetting {
    TxLookupModeSetting::PumpfunOnly
}
fn default_tx_qps() -> f64 {
    5.0
}
fn default_tx_max_per_min() -> u32 {
    120
}
fn default_alert_min_score() -> i32 {
    60
}
fn default_alert_rate_limit_sec() -> i64 {
    5
}
fn default_summary_every_sec() -> i64 {
    300
}
fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from file and environment variables (`LAUNCHD_` prefix).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(config::Environment::with_prefix("LAUNCHD").separator("__").try_parsing(true))
            .build()
            .context("failed to build configuration")?;

        let config: Config = settings.try_deserialize().context("failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.feed.primary_ws_url.is_empty() {
            anyhow::bail!("feed.primary_ws_url must be set");
        }
        if self.entry.apex_score < self.entry.min_score {
            anyhow::bail!("entry.apex_score must be >= entry.min_score");
        }
        if self.heat.min_accepts_per_hr >= self.heat.max_accepts_per_hr {
            anyhow::bail!("heat.min_accepts_per_hr must be < heat.max_accepts_per_hr");
        }
        for addr in &self.cohort_addresses {
            if addr.len() < 32 || addr.len() > 44 {
                anyhow::bail!("invalid cohort address: {addr}");
            }
        }
        Ok(())
    }

    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  log_level: {}
  store_path: {}
  feed.primary_ws_url: {}
  feed.backup_ws_url: {}
  entry: minScore={} apexScore={} dryRun={}
  heat: enabled={} windowMin={}
  mintVerify.mode: {:?}
  txLookup.mode: {:?}
"#,
            self.log_level,
            self.store_path,
            mask_url(&self.feed.primary_ws_url),
            mask_url(&self.feed.backup_ws_url),
            self.entry.min_score,
            self.entry.apex_score,
            self.entry.dry_run,
            self.heat.enabled,
            self.heat.window_min,
            self.mint_verify.mode,
            self.tx_lookup.mode,
        )
    }
}

fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_into_entry_config() {
        let entry = EntrySettings::default();
        let cfg = entry.to_entry_config();
        assert_eq!(cfg.reeval_cooldown_sec, 5);
        assert_eq!(cfg.hold_ttl_sec, 300);
    }

    #[test]
    fn defaults_round_trip_into_heat_config() {
        let entry = EntrySettings::default();
        let heat = HeatSettings::default().to_heat_config(&entry);
        assert_eq!(heat.base_min_score, 60);
        assert_eq!(heat.base_apex_score, 80);
    }

    #[test]
    fn program_ids_config_builds_set() {
        let cfg = ProgramIdsConfig {
            pumpfun: vec!["Prog1111111111111111111111111111111111111".to_string()],
            ..Default::default()
        };
        let set = cfg.to_program_id_set();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn mask_url_strips_query() {
        assert_eq!(mask_url("wss://host/ws?token=secret"), "wss://host/ws?***");
        assert_eq!(mask_url("wss://host/ws"), "wss://host/ws");
    }
}
