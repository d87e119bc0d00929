//! SQLite-backed `TokenStore`: WAL mode, foreign keys, prepared statements.

use std::path::Path;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;
use tracing::info;

use super::{EventRow, OrderStatus, RejectionRow, SizeTier, TokenRow, TokenStore, UnitaryEntryOrder};
use crate::error::Result;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;\
             PRAGMA foreign_keys=ON;\
             PRAGMA busy_timeout=3000;",
        )?;

        let mut store = Self { conn: Mutex::new(conn) };
        store.initialize_schema()?;
        info!("persistent store initialized");
        Ok(store)
    }

    fn initialize_schema(&mut self) -> Result<()> {
        let conn = self.conn.get_mut().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT
            );

            CREATE TABLE IF NOT EXISTS tokens (
                mint TEXT PRIMARY KEY,
                first_seen_ts INTEGER NOT NULL,
                last_seen_ts INTEGER NOT NULL,
                origin TEXT NOT NULL,
                creator TEXT,
                name TEXT,
                symbol TEXT,
                seen_count INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS positions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                market TEXT NOT NULL,
                direction TEXT CHECK(direction IN ('long','short')) NOT NULL,
                size_base REAL NOT NULL,
                avg_entry_price REAL NOT NULL,
                status TEXT CHECK(status IN ('open','closed')) NOT NULL,
                opened_at INTEGER NOT NULL,
                closed_at INTEGER
            );

            CREATE TABLE IF NOT EXISTS orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                client_order_id TEXT,
                market TEXT NOT NULL,
                side TEXT CHECK(side IN ('buy','sell')) NOT NULL,
                type TEXT NOT NULL,
                status TEXT NOT NULL,
                quantity_base REAL NOT NULL DEFAULT 0,
                price REAL,
                position_id INTEGER REFERENCES positions(id),
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                mint TEXT,
                origin TEXT,
                decided_ts INTEGER,
                size_tier TEXT,
                notes TEXT
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_orders_unitary_entry
                ON orders(market, type) WHERE type = 'unitary-entry';

            CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                position_id INTEGER NOT NULL REFERENCES positions(id),
                order_id INTEGER REFERENCES orders(id),
                price REAL NOT NULL,
                size_base REAL NOT NULL,
                fee_sol REAL NOT NULL DEFAULT 0,
                jito_tip_sol REAL NOT NULL DEFAULT 0,
                realized_pnl_sol REAL NOT NULL DEFAULT 0,
                liquidity TEXT CHECK(liquidity IN ('taker','maker')),
                signature TEXT,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS halts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                market TEXT NOT NULL,
                reason TEXT,
                active INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                cleared_at INTEGER
            );

            CREATE TABLE IF NOT EXISTS tips_ledger (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                day TEXT NOT NULL,
                spent_sol REAL NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts INTEGER NOT NULL,
                signature TEXT,
                mint TEXT NOT NULL,
                origin TEXT NOT NULL,
                buyers INTEGER NOT NULL,
                unique_funders INTEGER NOT NULL,
                same_funder_ratio REAL NOT NULL,
                price_jumps INTEGER NOT NULL,
                depth_est REAL NOT NULL,
                creator TEXT,
                snapshot_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS rejections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                mint TEXT NOT NULL,
                origin TEXT NOT NULL,
                reason TEXT NOT NULL,
                rejected_ts INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS quotes (
                mint TEXT NOT NULL,
                ts INTEGER NOT NULL,
                size_sol REAL NOT NULL,
                origin TEXT NOT NULL,
                route TEXT NOT NULL,
                est_fill_price_sol REAL,
                est_slippage_bps REAL,
                reserves_json TEXT,
                PRIMARY KEY (mint, ts, size_sol)
            );
            "#,
        )?;
        Ok(())
    }
}

#[async_trait]
impl TokenStore for SqliteStore {
    async fn upsert_token(&self, row: TokenRow) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO tokens (mint, first_seen_ts, last_seen_ts, origin, creator, name, symbol, seen_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1)
             ON CONFLICT(mint) DO UPDATE SET
                last_seen_ts = excluded.last_seen_ts,
                creator = COALESCE(tokens.creator, excluded.creator),
                name = COALESCE(tokens.name, excluded.name),
                symbol = COALESCE(tokens.symbol, excluded.symbol),
                seen_count = tokens.seen_count + 1",
            params![row.mint, row.first_seen_ts, row.last_seen_ts, row.origin, row.creator, row.name, row.symbol],
        )?;
        Ok(())
    }

    async fn upsert_unitary_entry(&self, order: UnitaryEntryOrder) -> Result<bool> {
        let mut conn = self.conn.lock().await;
        let txn = conn.transaction()?;

        let existing_status: Option<String> = txn
            .query_row(
                "SELECT status FROM orders WHERE market = ?1 AND type = 'unitary-entry'",
                params![order.market],
                |r| r.get(0),
            )
            .optional()?;

        if let Some(status) = &existing_status {
            if status == OrderStatus::Filled.as_str()
                || status == OrderStatus::DryRun.as_str()
                || status == OrderStatus::Open.as_str()
            {
                if order.size_tier != SizeTier::Apex {
                    txn.commit()?;
                    return Ok(false);
                }
            }
        }

        let now = order.decided_ts;
        txn.execute(
            "INSERT INTO orders (market, side, type, status, quantity_base, created_at, updated_at, mint, origin, decided_ts, size_tier, notes)
             VALUES (?1, 'buy', 'unitary-entry', ?2, 0, ?3, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(market, type) WHERE type = 'unitary-entry' DO UPDATE SET
                status = excluded.status,
                updated_at = excluded.updated_at,
                decided_ts = excluded.decided_ts,
                size_tier = excluded.size_tier,
                notes = excluded.notes",
            params![
                order.market,
                order.status.as_str(),
                now,
                order.mint,
                order.origin,
                order.decided_ts,
                order.size_tier.as_str(),
                order.notes
            ],
        )?;
        txn.commit()?;
        Ok(true)
    }

    async fn record_event(&self, row: EventRow) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO events (ts, signature, mint, origin, buyers, unique_funders, same_funder_ratio, price_jumps, depth_est, creator, snapshot_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                row.ts,
                row.signature,
                row.mint,
                row.origin,
                row.buyers,
                row.unique_funders,
                row.same_funder_ratio,
                row.price_jumps,
                row.depth_est,
                row.creator,
                row.snapshot_json
            ],
        )?;
        Ok(())
    }

    async fn record_rejection(&self, row: RejectionRow) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO rejections (mint, origin, reason, rejected_ts) VALUES (?1, ?2, ?3, ?4)",
            params![row.mint, row.origin, row.reason, row.rejected_ts],
        )?;
        Ok(())
    }

    async fn accepted_count(&self, since_ts: i64) -> Result<i64> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM orders WHERE type = 'unitary-entry' AND decided_ts >= ?1",
            params![since_ts],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    async fn rejected_count(&self, since_ts: i64) -> Result<i64> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM rejections WHERE rejected_ts >= ?1",
            params![since_ts],
            |r| r.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(market: &str, status: OrderStatus, tier: SizeTier, ts: i64) -> UnitaryEntryOrder {
        UnitaryEntryOrder {
            market: market.to_string(),
            status,
            mint: market.to_string(),
            origin: "pumpfun".to_string(),
            decided_ts: ts,
            size_tier: tier,
            notes: None,
        }
    }

    #[tokio::test]
    async fn small_to_apex_upgrade_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("store.sqlite3")).unwrap();
        assert!(store.upsert_unitary_entry(order("m1", OrderStatus::DryRun, SizeTier::Small, 0)).await.unwrap());
        assert!(store.upsert_unitary_entry(order("m1", OrderStatus::DryRun, SizeTier::Apex, 100)).await.unwrap());
        assert_eq!(store.accepted_count(0).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_accept_at_same_tier_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("store.sqlite3")).unwrap();
        assert!(store.upsert_unitary_entry(order("m1", OrderStatus::DryRun, SizeTier::Apex, 0)).await.unwrap());
        assert!(!store.upsert_unitary_entry(order("m1", OrderStatus::DryRun, SizeTier::Small, 100)).await.unwrap());
    }

    #[tokio::test]
    async fn live_open_status_blocks_small_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("store.sqlite3")).unwrap();
        assert!(store.upsert_unitary_entry(order("m1", OrderStatus::Open, SizeTier::Apex, 0)).await.unwrap());
        assert!(!store.upsert_unitary_entry(order("m1", OrderStatus::Open, SizeTier::Small, 100)).await.unwrap());
    }

    #[tokio::test]
    async fn live_open_status_allows_small_to_apex_upgrade() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("store.sqlite3")).unwrap();
        assert!(store.upsert_unitary_entry(order("m1", OrderStatus::Open, SizeTier::Small, 0)).await.unwrap());
        assert!(store.upsert_unitary_entry(order("m1", OrderStatus::Open, SizeTier::Apex, 100)).await.unwrap());
        assert_eq!(store.accepted_count(0).await.unwrap(), 1);
    }
}
