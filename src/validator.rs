//! MintId validity predicates and the real-fungible-mint TTL cache.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::origin::ProgramIdSet;

/// Well-known system/program identifiers that are never valid mints.
const DENYLIST: &[&str] = &[
    "11111111111111111111111111111111",
    "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA",
    "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb",
    "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL",
    "ComputeBudget111111111111111111111111111111",
    "SysvarRent111111111111111111111111111111111",
    "SysvarC1ock11111111111111111111111111111111",
    "Vote111111111111111111111111111111111111111",
    "Stake11111111111111111111111111111111111111",
];

const SPL_TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
const SPL_TOKEN_DATA_LEN: usize = 82;

fn is_base58_charset(s: &str) -> bool {
    const ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
    !s.is_empty() && s.chars().all(|c| ALPHABET.contains(c))
}

/// A Solana pubkey is 32 raw bytes; decoding confirms it's not just
/// base58-shaped text but an actual well-formed key.
fn decodes_to_pubkey(addr: &str) -> bool {
    matches!(bs58::decode(addr).into_vec(), Ok(bytes) if bytes.len() == 32)
}

/// Pure predicate: length/charset, decodability, denylist, and
/// not-a-subscribed-program-id.
pub fn is_valid_mint(addr: &str, program_ids: &ProgramIdSet) -> bool {
    if addr.len() < 32 || addr.len() > 44 {
        return false;
    }
    if !is_base58_charset(addr) {
        return false;
    }
    if !decodes_to_pubkey(addr) {
        return false;
    }
    if DENYLIST.contains(&addr) {
        return false;
    }
    if program_ids.contains(addr) {
        return false;
    }
    true
}

/// Extracts every distinct base58 token of length 32-44 from a line, in order of first appearance.
pub fn base58_tokens(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for word in text.split(|c: char| !c.is_ascii_alphanumeric()) {
        if word.len() >= 32 && word.len() <= 44 && is_base58_charset(word) && seen.insert(word.to_string()) {
            out.push(word.to_string());
        }
    }
    out
}

struct CacheEntry {
    ok: bool,
    inserted_at: Instant,
}

/// Result of a single account-info fetch, as needed by `is_real_mint`.
#[derive(Debug, Clone)]
pub struct AccountInfo {
    pub owner: String,
    pub data_len: usize,
}

/// Abstraction over the RPC account-info fetch so `MintValidator` is testable
/// without a live cluster connection.
#[async_trait]
pub trait AccountFetcher: Send + Sync {
    async fn get_account(&self, addr: &str) -> crate::error::Result<Option<AccountInfo>>;
}

/// TTL cache of "is this a real fungible-token mint" verdicts, capped at
/// 10,000 entries with oldest-5% insertion-order eviction (spec.md §3/§4.2).
pub struct MintValidator<F: AccountFetcher> {
    fetcher: F,
    cache: DashMap<String, CacheEntry>,
    insertion_order: std::sync::Mutex<VecDeque<String>>,
    ttl: Duration,
    cap: usize,
}

impl<F: AccountFetcher> MintValidator<F> {
    pub fn new(fetcher: F) -> Self {
        Self::with_ttl(fetcher, Duration::from_secs(3600))
    }

    pub fn with_ttl(fetcher: F, ttl: Duration) -> Self {
        Self {
            fetcher,
            cache: DashMap::new(),
            insertion_order: std::sync::Mutex::new(VecDeque::new()),
            ttl: ttl.max(Duration::from_secs(60)),
            cap: 10_000,
        }
    }

    pub fn is_valid_mint(&self, addr: &str, program_ids: &ProgramIdSet) -> bool {
        is_valid_mint(addr, program_ids)
    }

    /// Consult the cache; on miss, issue a single account-info fetch and cache the verdict.
    pub async fn is_real_mint(&self, addr: &str) -> bool {
        if let Some(entry) = self.cache.get(addr) {
            if entry.inserted_at.elapsed() < self.ttl {
                return entry.ok;
            }
        }

        let ok = match self.fetcher.get_account(addr).await {
            Ok(Some(info)) => info.owner == SPL_TOKEN_PROGRAM && info.data_len == SPL_TOKEN_DATA_LEN,
            _ => false,
        };

        self.insert(addr, ok);
        ok
    }

    fn insert(&self, addr: &str, ok: bool) {
        self.cache.insert(
            addr.to_string(),
            CacheEntry {
                ok,
                inserted_at: Instant::now(),
            },
        );
        let mut order = self.insertion_order.lock().unwrap();
        order.push_back(addr.to_string());

        if self.cache.len() > self.cap {
            let evict_count = (self.cap / 20).max(1); // 5%
            for _ in 0..evict_count {
                if let Some(oldest) = order.pop_front() {
                    self.cache.remove(&oldest);
                } else {
                    break;
                }
            }
        }
    }

    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }
}

/// Production `AccountFetcher` backed by a blocking `solana_client::RpcClient`,
/// off-loaded to `spawn_blocking` so it never parks a tokio worker thread.
pub struct RpcAccountFetcher {
    http_url: String,
}

impl RpcAccountFetcher {
    pub fn new(http_url: String) -> Self {
        Self { http_url }
    }
}

#[async_trait]
impl AccountFetcher for RpcAccountFetcher {
    async fn get_account(&self, addr: &str) -> crate::error::Result<Option<AccountInfo>> {
        let url = self.http_url.clone();
        let addr = addr.to_string();
        tokio::task::spawn_blocking(move || -> crate::error::Result<Option<AccountInfo>> {
            use solana_sdk::pubkey::Pubkey;
            use std::str::FromStr;

            let pubkey = match Pubkey::from_str(&addr) {
                Ok(pk) => pk,
                Err(_) => return Ok(None),
            };
            let client = solana_client::rpc_client::RpcClient::new_with_timeout(url, Duration::from_secs(5));
            match client.get_account(&pubkey) {
                Ok(account) => Ok(Some(AccountInfo { owner: account.owner.to_string(), data_len: account.data.len() })),
                Err(e) => {
                    if e.to_string().contains("AccountNotFound") {
                        Ok(None)
                    } else {
                        Err(e.into())
                    }
                }
            }
        })
        .await
        .map_err(|e| crate::error::Error::Internal(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::origin::Origin;

    struct FakeFetcher {
        real: std::collections::HashSet<String>,
    }

    #[async_trait]
    impl AccountFetcher for FakeFetcher {
        async fn get_account(&self, addr: &str) -> crate::error::Result<Option<AccountInfo>> {
            if self.real.contains(addr) {
                Ok(Some(AccountInfo {
                    owner: SPL_TOKEN_PROGRAM.to_string(),
                    data_len: SPL_TOKEN_DATA_LEN,
                }))
            } else {
                Ok(None)
            }
        }
    }

    fn sample_mint() -> String {
        "DYw8jCTfwHNRJhhmFcbXvVDTqWMEVFBX6ZKUmG5CNSKK".to_string()
    }

    #[test]
    fn rejects_short_or_long() {
        let set = ProgramIdSet::default();
        assert!(!is_valid_mint("short", &set));
        assert!(!is_valid_mint(&"a".repeat(60), &set));
    }

    #[test]
    fn rejects_denylisted() {
        let set = ProgramIdSet::default();
        assert!(!is_valid_mint(SPL_TOKEN_PROGRAM, &set));
    }

    #[test]
    fn rejects_subscribed_program_id() {
        let set = ProgramIdSet::build(&[(Origin::Pumpfun, vec![sample_mint()])]);
        assert!(!is_valid_mint(&sample_mint(), &set));
    }

    #[test]
    fn accepts_plausible_mint() {
        let set = ProgramIdSet::default();
        assert!(is_valid_mint(&sample_mint(), &set));
    }

    #[tokio::test]
    async fn is_real_mint_caches_result() {
        let mut real = std::collections::HashSet::new();
        real.insert(sample_mint());
        let validator = MintValidator::new(FakeFetcher { real });

        assert!(validator.is_real_mint(&sample_mint()).await);
        assert_eq!(validator.cache_size(), 1);
        // second call hits cache, same result
        assert!(validator.is_real_mint(&sample_mint()).await);
        assert_eq!(validator.cache_size(), 1);
    }

    #[tokio::test]
    async fn is_real_mint_false_on_missing_account() {
        let validator = MintValidator::new(FakeFetcher {
            real: Default::default(),
        });
        assert!(!validator.is_real_mint(&sample_mint()).await);
    }

    #[test]
    fn base58_tokens_extracts_distinct_candidates() {
        let toks = base58_tokens(&format!("create mint={} buyer=xyz", sample_mint()));
        assert!(toks.contains(&sample_mint()));
    }
}
