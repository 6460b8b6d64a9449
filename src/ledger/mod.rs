//! Order ledger — append-only order records plus outcome settlement.
//!
//! The store behind the ledger is an external collaborator reached through
//! the `LedgerStore` trait. Store failures are classified structurally:
//! permission / not-found class errors are transient (logged and swallowed,
//! the cycle continues), everything else propagates and aborts the cycle.

pub mod sqlite;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::types::{DrawRecord, Order, Outcome};

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

/// Typed error from a ledger store. `is_transient` drives the
/// swallow-vs-propagate decision without inspecting message text.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store permission denied: {0}")]
    Unauthorized(String),

    #[error("store object not found: {0}")]
    NotFound(String),

    #[error("corrupt ledger row: {0}")]
    Corrupt(String),

    #[error("store backend error: {0}")]
    Backend(#[from] sqlx::Error),
}

impl StoreError {
    /// Transient failures are non-fatal to a cycle: the write is skipped
    /// and the next scheduled cycle retries naturally.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unauthorized(_) | StoreError::NotFound(_))
    }
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Abstraction over the external order store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Append an order row. Re-inserting an existing id is a no-op.
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError>;

    /// All rows with `outcome` still unset.
    async fn unsettled_orders(&self) -> Result<Vec<Order>, StoreError>;

    /// Set outcome/pnl on a row iff it is still unsettled. Returns whether
    /// a row was updated — false means the guard found it already settled.
    async fn record_settlement(
        &self,
        id: &str,
        outcome: Outcome,
        pnl_u: i64,
    ) -> Result<bool, StoreError>;
}

// ---------------------------------------------------------------------------
// Ledger facade
// ---------------------------------------------------------------------------

/// Result of one settlement pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettlementReport {
    /// Orders settled this pass.
    pub settled: usize,
    /// Unsettled orders whose draw has not been realized yet.
    pub pending: usize,
}

pub struct Ledger {
    store: Arc<dyn LedgerStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Record a new order. Transient store errors are logged and swallowed;
    /// the cycle continues without the write.
    pub async fn upsert_order(&self, order: &Order) -> Result<(), StoreError> {
        match self.store.insert_order(order).await {
            Ok(()) => {
                info!(
                    id = %order.id,
                    market = %order.market,
                    draw_id = order.draw_id,
                    p_win = format!("{:.4}", order.p_win),
                    stake_u = order.stake_u,
                    "Order recorded"
                );
                Ok(())
            }
            Err(e) if e.is_transient() => {
                warn!(id = %order.id, error = %e, "Ledger write skipped (transient store error)");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Settle every unsettled order whose draw has been realized: apply the
    /// market's win rule and set `outcome` plus `pnl_u = ±stake_u`.
    ///
    /// Safe to call repeatedly — the store's unsettled-only guard means a
    /// second pass never revisits settled rows.
    pub async fn settle_orders(&self, draws: &[DrawRecord]) -> Result<SettlementReport, StoreError> {
        let unsettled = self.store.unsettled_orders().await?;
        if unsettled.is_empty() {
            return Ok(SettlementReport::default());
        }

        let by_draw: HashMap<i64, &DrawRecord> =
            draws.iter().map(|d| (d.draw_id, d)).collect();

        let mut report = SettlementReport::default();
        for order in &unsettled {
            let Some(draw) = by_draw.get(&order.draw_id) else {
                report.pending += 1;
                continue;
            };
            let outcome = order.market.settle(draw.sum);
            let pnl_u = match outcome {
                Outcome::Win => order.stake_u,
                Outcome::Lose => -order.stake_u,
            };
            if self
                .store
                .record_settlement(&order.id, outcome, pnl_u)
                .await?
            {
                info!(
                    id = %order.id,
                    draw_id = order.draw_id,
                    sum = draw.sum,
                    outcome = %outcome,
                    pnl_u,
                    "Order settled"
                );
                report.settled += 1;
            }
        }

        info!(settled = report.settled, pending = report.pending, "Settlement pass complete");
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
