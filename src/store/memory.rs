//! In-memory `TokenStore` double, used by unit and integration tests.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{EventRow, OrderStatus, RejectionRow, SizeTier, TokenRow, TokenStore, UnitaryEntryOrder};
use crate::error::Result;

#[derive(Default)]
struct State {
    tokens: std::collections::HashMap<String, TokenRow>,
    unitary_entries: std::collections::HashMap<String, UnitaryEntryOrder>,
    events: Vec<EventRow>,
    rejections: Vec<RejectionRow>,
}

/// Single-process, non-persistent `TokenStore`. Mirrors `SqliteStore`'s
/// accept/upgrade semantics so tests can assert against the decision engine
/// without touching disk.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for InMemoryStore {
    async fn upsert_token(&self, row: TokenRow) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.tokens.get_mut(&row.mint) {
            Some(existing) => {
                existing.last_seen_ts = row.last_seen_ts;
                existing.seen_count += 1;
                existing.creator = existing.creator.clone().or(row.creator);
                existing.name = existing.name.clone().or(row.name);
                existing.symbol = existing.symbol.clone().or(row.symbol);
            }
            None => {
                state.tokens.insert(row.mint.clone(), row);
            }
        }
        Ok(())
    }

    async fn upsert_unitary_entry(&self, order: UnitaryEntryOrder) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.unitary_entries.get(&order.market) {
            let existing_is_accept = matches!(existing.status, OrderStatus::DryRun | OrderStatus::Filled | OrderStatus::Open);
            if existing_is_accept && order.size_tier != SizeTier::Apex {
                return Ok(false);
            }
        }
        state.unitary_entries.insert(order.market.clone(), order);
        Ok(true)
    }

    async fn record_event(&self, row: EventRow) -> Result<()> {
        self.state.lock().unwrap().events.push(row);
        Ok(())
    }

    async fn record_rejection(&self, row: RejectionRow) -> Result<()> {
        self.state.lock().unwrap().rejections.push(row);
        Ok(())
    }

    async fn accepted_count(&self, since_ts: i64) -> Result<i64> {
        let state = self.state.lock().unwrap();
        Ok(state.unitary_entries.values().filter(|o| o.decided_ts >= since_ts).count() as i64)
    }

    async fn rejected_count(&self, since_ts: i64) -> Result<i64> {
        let state = self.state.lock().unwrap();
        Ok(state.rejections.iter().filter(|r| r.rejected_ts >= since_ts).count() as i64)
    }
}
