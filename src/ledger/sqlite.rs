//! SQLite-backed ledger store.
//!
//! One `score_ledger` table. The settlement update carries the
//! `outcome IS NULL` guard, so repeated settlement passes never touch a
//! row twice.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::info;

use super::{LedgerStore, StoreError};
use crate::types::{Market, Order, Outcome};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS score_ledger (
    id         TEXT PRIMARY KEY,
    market     TEXT NOT NULL,
    draw_id    INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    p_win      REAL NOT NULL,
    ev         REAL NOT NULL,
    kelly_frac REAL NOT NULL,
    stake_u    INTEGER NOT NULL,
    outcome    TEXT,
    pnl_u      INTEGER,
    tag        TEXT NOT NULL,
    note       TEXT NOT NULL
)
"#;

pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    /// Open (creating if missing) the ledger database and ensure the schema.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // The orchestrator is single-threaded; one connection suffices and
        // keeps in-memory databases coherent.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        info!(url, "Ledger store ready");
        Ok(Self { pool })
    }

    /// Classify a sqlx failure into the store error taxonomy. SQLite signals
    /// a vanished table through the generic error code with a "no such table"
    /// message; permission-class failures carry dedicated codes (SQLITE_PERM,
    /// SQLITE_READONLY, SQLITE_AUTH). Everything else stays a backend error.
    fn classify(err: sqlx::Error) -> StoreError {
        if let sqlx::Error::Database(db) = &err {
            let code = db.code().map(|c| c.to_string()).unwrap_or_default();
            let message = db.message().to_string();
            match code.as_str() {
                "1" if message.contains("no such table") => {
                    return StoreError::NotFound(message);
                }
                "3" | "8" | "23" => return StoreError::Unauthorized(message),
                _ => {}
            }
        }
        StoreError::Backend(err)
    }

    fn row_to_order(row: &sqlx::sqlite::SqliteRow) -> Result<Order, StoreError> {
        let market: String = row.try_get("market")?;
        let market = Market::from_str(&market).map_err(StoreError::Corrupt)?;

        let outcome: Option<String> = row.try_get("outcome")?;
        let outcome = outcome
            .map(|s| Outcome::from_str(&s).map_err(StoreError::Corrupt))
            .transpose()?;

        let created_at: String = row.try_get("created_at")?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| StoreError::Corrupt(format!("created_at: {e}")))?
            .with_timezone(&Utc);

        Ok(Order {
            id: row.try_get("id")?,
            market,
            draw_id: row.try_get("draw_id")?,
            created_at,
            p_win: row.try_get("p_win")?,
            ev: row.try_get("ev")?,
            kelly_frac: row.try_get("kelly_frac")?,
            stake_u: row.try_get("stake_u")?,
            outcome,
            pnl_u: row.try_get("pnl_u")?,
            tag: row.try_get("tag")?,
            note: row.try_get("note")?,
        })
    }
}

#[async_trait]
impl LedgerStore for SqliteLedger {
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO score_ledger
               (id, market, draw_id, created_at, p_win, ev, kelly_frac,
                stake_u, outcome, pnl_u, tag, note)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, NULL, ?, ?)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(&order.id)
        .bind(order.market.as_str())
        .bind(order.draw_id)
        .bind(order.created_at.to_rfc3339())
        .bind(order.p_win)
        .bind(order.ev)
        .bind(order.kelly_frac)
        .bind(order.stake_u)
        .bind(&order.tag)
        .bind(&order.note)
        .execute(&self.pool)
        .await
        .map_err(Self::classify)?;
        Ok(())
    }

    async fn unsettled_orders(&self) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query("SELECT * FROM score_ledger WHERE outcome IS NULL")
            .fetch_all(&self.pool)
            .await
            .map_err(Self::classify)?;
        rows.iter().map(Self::row_to_order).collect()
    }

    async fn record_settlement(
        &self,
        id: &str,
        outcome: Outcome,
        pnl_u: i64,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE score_ledger SET outcome = ?, pnl_u = ?
             WHERE id = ? AND outcome IS NULL",
        )
        .bind(outcome.as_str())
        .bind(pnl_u)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Self::classify)?;
        Ok(result.rows_affected() > 0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
