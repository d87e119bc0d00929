//! Rate-limited transaction introspection: recover a mint and its funding
//! wallet from pre/post token balances when the log parser alone can't.

use std::collections::VecDeque;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::origin::Origin;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Off,
    PumpfunOnly,
    All,
}

#[derive(Debug, Clone)]
pub struct TokenBalance {
    pub account_index: usize,
    pub mint: String,
    pub ui_amount: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct TxData {
    pub pre_balances: Vec<TokenBalance>,
    pub post_balances: Vec<TokenBalance>,
    pub account_keys: Vec<String>,
}

/// Abstraction over the RPC transaction/account-data fetch surface.
#[async_trait]
pub trait TxClient: Send + Sync {
    async fn get_transaction(&self, signature: &str) -> crate::error::Result<TxData>;
    async fn get_token_account_owner(&self, pubkey: &str) -> crate::error::Result<Option<String>>;
}

/// Abstraction over `MintValidator::is_real_mint`, kept separate so
/// `TxIntrospector` doesn't need to own a whole validator.
#[async_trait]
pub trait MintChecker: Send + Sync {
    async fn is_real_mint(&self, mint: &str) -> bool;
}

#[async_trait]
impl<F: crate::validator::AccountFetcher> MintChecker for crate::validator::MintValidator<F> {
    async fn is_real_mint(&self, mint: &str) -> bool {
        crate::validator::MintValidator::is_real_mint(self, mint).await
    }
}

#[async_trait]
impl<T: MintChecker + ?Sized> MintChecker for std::sync::Arc<T> {
    async fn is_real_mint(&self, mint: &str) -> bool {
        (**self).is_real_mint(mint).await
    }
}

#[derive(Debug, Clone)]
pub struct IntrospectResult {
    pub mint: Option<String>,
    pub owner: Option<String>,
    pub reason: Option<String>,
}

impl IntrospectResult {
    fn miss(reason: &str) -> Self {
        Self { mint: None, owner: None, reason: Some(reason.to_string()) }
    }
}

struct RateLimiter {
    qps: f64,
    max_per_min: u32,
    window: StdMutex<VecDeque<i64>>,
}

impl RateLimiter {
    fn new(qps: f64, max_per_min: u32) -> Self {
        Self { qps, max_per_min, window: StdMutex::new(VecDeque::new()) }
    }

    fn tick_interval_ms(&self) -> u64 {
        (1000.0 / self.qps.max(0.001)).floor().max(50.0) as u64
    }

    fn try_acquire(&self, now_ms: i64) -> bool {
        let mut window = self.window.lock().unwrap();
        while let Some(&front) = window.front() {
            if now_ms - front >= 60_000 {
                window.pop_front();
            } else {
                break;
            }
        }
        if window.len() as u32 >= self.max_per_min {
            false
        } else {
            window.push_back(now_ms);
            true
        }
    }
}

pub struct TxIntrospector<C: TxClient, M: MintChecker> {
    client: C,
    checker: M,
    mode: Mode,
    cache: DashMap<String, (IntrospectResult, Instant)>,
    owner_cache: DashMap<String, (String, Instant)>,
    in_flight: DashMap<String, broadcast::Sender<ResultMsg>>,
    rate: RateLimiter,
    cache_ttl: Duration,
    owner_ttl: Duration,
}

#[derive(Clone)]
struct ResultMsg(IntrospectResult);

impl<C: TxClient, M: MintChecker> TxIntrospector<C, M> {
    pub fn new(client: C, checker: M, mode: Mode, qps: f64, max_per_min: u32) -> Self {
        Self {
            client,
            checker,
            mode,
            cache: DashMap::new(),
            owner_cache: DashMap::new(),
            in_flight: DashMap::new(),
            rate: RateLimiter::new(qps, max_per_min),
            cache_ttl: Duration::from_secs(1800),
            owner_ttl: Duration::from_secs(3600),
        }
    }

    pub fn tick_interval_ms(&self) -> u64 {
        self.rate.tick_interval_ms()
    }

    /// Drain one scheduling tick; kept as an explicit call so the rate-limit
    /// logic is testable without a live timer. The watcher drives this from
    /// a `tokio::time::interval` of `tick_interval_ms()`.
    pub async fn introspect(&self, signature: &str, origin: Origin, now_ms: i64) -> IntrospectResult {
        match self.mode {
            Mode::Off => return IntrospectResult::miss("introspection-off"),
            Mode::PumpfunOnly if origin != Origin::Pumpfun => return IntrospectResult::miss("origin-not-pumpfun"),
            _ => {}
        }

        if let Some(entry) = self.cache.get(signature) {
            if entry.1.elapsed() < self.cache_ttl {
                return entry.0.clone();
            }
        }

        if let Some(tx) = self.in_flight.get(signature) {
            let mut rx = tx.subscribe();
            drop(tx);
            if let Ok(ResultMsg(result)) = rx.recv().await {
                return result;
            }
        }

        let (tx, _rx) = broadcast::channel(4);
        self.in_flight.insert(signature.to_string(), tx.clone());

        if !self.rate.try_acquire(now_ms) {
            let result = IntrospectResult::miss("rate-cap");
            self.finish(signature, result.clone(), &tx);
            return result;
        }

        let result = self.fetch_and_resolve(signature).await;
        self.cache.insert(signature.to_string(), (result.clone(), Instant::now()));
        self.finish(signature, result.clone(), &tx);
        result
    }

    fn finish(&self, signature: &str, result: IntrospectResult, tx: &broadcast::Sender<ResultMsg>) {
        self.in_flight.remove(signature);
        let _ = tx.send(ResultMsg(result));
    }

    async fn fetch_and_resolve(&self, signature: &str) -> IntrospectResult {
        let tx = match self.client.get_transaction(signature).await {
            Ok(tx) => tx,
            Err(_) => return IntrospectResult::miss("tx-fetch-error"),
        };

        let mut pre_by_index: std::collections::HashMap<usize, &TokenBalance> = std::collections::HashMap::new();
        for bal in &tx.pre_balances {
            pre_by_index.insert(bal.account_index, bal);
        }

        let mut candidates: Vec<(usize, String, f64)> = Vec::new();
        for bal in &tx.post_balances {
            let post_ui = bal.ui_amount.unwrap_or(0.0);
            let pre_ui = pre_by_index.get(&bal.account_index).and_then(|b| b.ui_amount).unwrap_or(0.0);
            if pre_ui.abs() < 1e-9 && post_ui > 0.0 {
                candidates.push((bal.account_index, bal.mint.clone(), post_ui));
            }
        }

        let mut real_candidates = Vec::new();
        for candidate in candidates.drain(..) {
            if self.checker.is_real_mint(&candidate.1).await {
                real_candidates.push(candidate);
            }
        }

        real_candidates.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

        let Some((account_index, mint, _delta)) = real_candidates.into_iter().next() else {
            return IntrospectResult::miss("no-real-mint");
        };

        let owner = match tx.account_keys.get(account_index) {
            Some(pubkey) => self.resolve_owner(pubkey).await,
            None => None,
        };

        IntrospectResult { mint: Some(mint), owner, reason: None }
    }

    async fn resolve_owner(&self, pubkey: &str) -> Option<String> {
        if let Some(entry) = self.owner_cache.get(pubkey) {
            if entry.1.elapsed() < self.owner_ttl {
                return Some(entry.0.clone());
            }
        }
        let owner = self.client.get_token_account_owner(pubkey).await.ok().flatten();
        if let Some(ref o) = owner {
            self.owner_cache.insert(pubkey.to_string(), (o.clone(), Instant::now()));
        }
        owner
    }
}

/// Production `TxClient` backed by a blocking `solana_client::RpcClient`,
/// matching the wire contract in spec.md §6 ("External transaction fetch
/// contract"): `getTransaction` with `maxSupportedTransactionVersion: 0`,
/// pre/post token balances indexable by `accountIndex`.
pub struct RpcTxClient {
    http_url: String,
}

impl RpcTxClient {
    pub fn new(http_url: String) -> Self {
        Self { http_url }
    }
}

#[async_trait]
impl TxClient for RpcTxClient {
    async fn get_transaction(&self, signature: &str) -> crate::error::Result<TxData> {
        use solana_transaction_status::{UiTransactionEncoding, option_serializer::OptionSerializer};
        use solana_client::rpc_config::RpcTransactionConfig;

        let url = self.http_url.clone();
        let sig = signature.to_string();
        tokio::task::spawn_blocking(move || -> crate::error::Result<TxData> {
            use solana_sdk::commitment_config::CommitmentConfig;
            use solana_sdk::signature::Signature;
            use std::str::FromStr;

            let signature = Signature::from_str(&sig).map_err(|e| crate::error::Error::TxFetch(e.to_string()))?;
            let client = solana_client::rpc_client::RpcClient::new_with_timeout(url, std::time::Duration::from_secs(10));
            let config = RpcTransactionConfig {
                encoding: Some(UiTransactionEncoding::Json),
                commitment: Some(CommitmentConfig::confirmed()),
                max_supported_transaction_version: Some(0),
            };
            let tx = client
                .get_transaction_with_config(&signature, config)
                .map_err(|e| crate::error::Error::TxFetch(e.to_string()))?;

            let meta = tx.transaction.meta.ok_or_else(|| crate::error::Error::TxFetch("missing meta".to_string()))?;

            let account_keys: Vec<String> = match tx.transaction.transaction.decode() {
                Some(decoded) => decoded.message.static_account_keys().iter().map(|k| k.to_string()).collect(),
                None => Vec::new(),
            };

            let to_balances = |bals: OptionSerializer<Vec<solana_transaction_status::UiTransactionTokenBalance>>| -> Vec<TokenBalance> {
                match bals {
                    OptionSerializer::Some(list) => list
                        .into_iter()
                        .map(|b| TokenBalance {
                            account_index: b.account_index as usize,
                            mint: b.mint,
                            ui_amount: match b.ui_token_amount.ui_amount {
                                Some(v) => Some(v),
                                None => None,
                            },
                        })
                        .collect(),
                    _ => Vec::new(),
                }
            };

            Ok(TxData {
                pre_balances: to_balances(meta.pre_token_balances),
                post_balances: to_balances(meta.post_token_balances),
                account_keys,
            })
        })
        .await
        .map_err(|e| crate::error::Error::Internal(e.to_string()))?
    }

    /// SPL token-account layout places the owning wallet's pubkey at bytes
    /// [32,64) of the account's raw data (after the 32-byte mint field).
    async fn get_token_account_owner(&self, pubkey: &str) -> crate::error::Result<Option<String>> {
        let url = self.http_url.clone();
        let pubkey = pubkey.to_string();
        tokio::task::spawn_blocking(move || -> crate::error::Result<Option<String>> {
            use solana_sdk::pubkey::Pubkey;
            use std::str::FromStr;

            let pk = match Pubkey::from_str(&pubkey) {
                Ok(pk) => pk,
                Err(_) => return Ok(None),
            };
            let client = solana_client::rpc_client::RpcClient::new_with_timeout(url, std::time::Duration::from_secs(5));
            let account = match client.get_account(&pk) {
                Ok(account) => account,
                Err(e) => {
                    if e.to_string().contains("AccountNotFound") {
                        return Ok(None);
                    }
                    return Err(crate::error::Error::TxFetch(e.to_string()));
                }
            };
            if account.data.len() < 64 {
                return Ok(None);
            }
            let owner_bytes: [u8; 32] = account.data[32..64].try_into().unwrap();
            Ok(Some(bs58::encode(owner_bytes).into_string()))
        })
        .await
        .map_err(|e| crate::error::Error::Internal(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FakeClient {
        tx: TxData,
        owner: Option<String>,
        fetch_calls: AtomicU32,
    }

    #[async_trait]
    impl TxClient for FakeClient {
        async fn get_transaction(&self, _signature: &str) -> crate::error::Result<TxData> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.tx.clone())
        }

        async fn get_token_account_owner(&self, _pubkey: &str) -> crate::error::Result<Option<String>> {
            Ok(self.owner.clone())
        }
    }

    struct AlwaysReal;

    #[async_trait]
    impl MintChecker for AlwaysReal {
        async fn is_real_mint(&self, _mint: &str) -> bool {
            true
        }
    }

    fn sample_tx() -> TxData {
        TxData {
            pre_balances: vec![TokenBalance { account_index: 1, mint: "MintA".into(), ui_amount: Some(0.0) }],
            post_balances: vec![TokenBalance { account_index: 1, mint: "MintA".into(), ui_amount: Some(5.0) }],
            account_keys: vec!["acct0".into(), "acct1".into()],
        }
    }

    #[tokio::test]
    async fn off_mode_short_circuits() {
        let client = FakeClient { tx: sample_tx(), owner: None, fetch_calls: AtomicU32::new(0) };
        let introspector = TxIntrospector::new(client, AlwaysReal, Mode::Off, 10.0, 60);
        let result = introspector.introspect("sig1", Origin::Pumpfun, 0).await;
        assert_eq!(result.reason.as_deref(), Some("introspection-off"));
    }

    #[tokio::test]
    async fn pumpfun_only_skips_other_origins() {
        let client = FakeClient { tx: sample_tx(), owner: None, fetch_calls: AtomicU32::new(0) };
        let introspector = TxIntrospector::new(client, AlwaysReal, Mode::PumpfunOnly, 10.0, 60);
        let result = introspector.introspect("sig1", Origin::Orca, 0).await;
        assert_eq!(result.reason.as_deref(), Some("origin-not-pumpfun"));
    }

    #[tokio::test]
    async fn resolves_mint_and_owner() {
        let client = FakeClient { tx: sample_tx(), owner: Some("OwnerPubkey".into()), fetch_calls: AtomicU32::new(0) };
        let introspector = TxIntrospector::new(client, AlwaysReal, Mode::All, 10.0, 60);
        let result = introspector.introspect("sig1", Origin::Pumpfun, 0).await;
        assert_eq!(result.mint.as_deref(), Some("MintA"));
        assert_eq!(result.owner.as_deref(), Some("OwnerPubkey"));
    }

    #[tokio::test]
    async fn caches_result_across_calls() {
        let client = FakeClient { tx: sample_tx(), owner: Some("OwnerPubkey".into()), fetch_calls: AtomicU32::new(0) };
        let introspector = TxIntrospector::new(client, AlwaysReal, Mode::All, 10.0, 60);
        introspector.introspect("sig1", Origin::Pumpfun, 0).await;
        introspector.introspect("sig1", Origin::Pumpfun, 1_000).await;
        assert_eq!(introspector.client.fetch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rate_cap_rejects_excess_tasks() {
        let client = FakeClient { tx: sample_tx(), owner: None, fetch_calls: AtomicU32::new(0) };
        let introspector = TxIntrospector::new(client, AlwaysReal, Mode::All, 100.0, 1);
        let r1 = introspector.introspect("sig1", Origin::Pumpfun, 0).await;
        let r2 = introspector.introspect("sig2", Origin::Pumpfun, 10).await;
        assert!(r1.reason.is_none());
        assert_eq!(r2.reason.as_deref(), Some("rate-cap"));
    }

    struct NeverReal;

    #[async_trait]
    impl MintChecker for NeverReal {
        async fn is_real_mint(&self, _mint: &str) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn no_real_mint_when_checker_rejects_all() {
        let client = FakeClient { tx: sample_tx(), owner: None, fetch_calls: AtomicU32::new(0) };
        let introspector = TxIntrospector::new(client, NeverReal, Mode::All, 10.0, 60);
        let result = introspector.introspect("sig1", Origin::Pumpfun, 0).await;
        assert_eq!(result.reason.as_deref(), Some("no-real-mint"));
    }
}
