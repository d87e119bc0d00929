//! Persistent-store contract plus the SQLite and in-memory implementations.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    DryRun,
    Open,
    Filled,
    Rejected,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::DryRun => "dry_run",
            OrderStatus::Open => "open",
            OrderStatus::Filled => "filled",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeTier {
    Small,
    Apex,
}

impl SizeTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeTier::Small => "SMALL",
            SizeTier::Apex => "APEX",
        }
    }
}

/// A `tokens` row: first-sighting metadata for a mint.
#[derive(Debug, Clone)]
pub struct TokenRow {
    pub mint: String,
    pub first_seen_ts: i64,
    pub last_seen_ts: i64,
    pub origin: String,
    pub creator: Option<String>,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub seen_count: i64,
}

/// An `orders` row, used here exclusively for `type = "unitary-entry"` rows
/// recording an EntryEngine accept decision (spec.md §6).
#[derive(Debug, Clone)]
pub struct UnitaryEntryOrder {
    pub market: String,
    pub status: OrderStatus,
    pub mint: String,
    pub origin: String,
    pub decided_ts: i64,
    pub size_tier: SizeTier,
    pub notes: Option<String>,
}

/// An `events` row: one microstructure snapshot sample.
#[derive(Debug, Clone)]
pub struct EventRow {
    pub ts: i64,
    pub signature: Option<String>,
    pub mint: String,
    pub origin: String,
    pub buyers: i64,
    pub unique_funders: i64,
    pub same_funder_ratio: f64,
    pub price_jumps: i64,
    pub depth_est: f64,
    pub creator: Option<String>,
    pub snapshot_json: String,
}

/// A rejected-mint row, persisted only for sticky-fatal rejections (spec.md §9).
#[derive(Debug, Clone)]
pub struct RejectionRow {
    pub mint: String,
    pub origin: String,
    pub reason: String,
    pub rejected_ts: i64,
}

/// Abstraction over the pipeline's persistent storage so the decision path
/// is testable without a real SQLite file.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn upsert_token(&self, row: TokenRow) -> Result<()>;

    /// Insert or update the single `(market, "unitary-entry")` accept row.
    /// Must only overwrite a prior row whose status isn't already an accept.
    /// Returns `true` if the row was written, `false` if a conflicting
    /// accept already existed (store-conflict, ignored per spec.md §7).
    async fn upsert_unitary_entry(&self, order: UnitaryEntryOrder) -> Result<bool>;

    async fn record_event(&self, row: EventRow) -> Result<()>;

    async fn record_rejection(&self, row: RejectionRow) -> Result<()>;

    async fn accepted_count(&self, since_ts: i64) -> Result<i64>;

    async fn rejected_count(&self, since_ts: i64) -> Result<i64>;
}
