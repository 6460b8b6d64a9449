//! Orchestrator — one end-to-end decision cycle.
//!
//! Strictly sequential: fetch → vote → calibrate → adapt threshold →
//! stake & record → settle → persist. Any error aborts the remainder of
//! the cycle via `?`; the previously persisted run state stays
//! last-known-good because the save only happens after all mutating work.
//! Cycles are driven externally and never overlap.

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::calibrate::hybrid_calibrate;
use crate::controller::PIController;
use crate::ledger::{Ledger, SettlementReport};
use crate::risk::RiskManager;
use crate::sources::{DrawFeed, MarketFeed};
use crate::storage;
use crate::types::{CalibrationParams, Decision, Order, RunState};
use crate::voting::{PerfSignal, WeightedVoting};

// ---------------------------------------------------------------------------
// Cycle report
// ---------------------------------------------------------------------------

/// Summary of one completed cycle, for logging.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub candidates_seen: usize,
    pub decision: Option<Decision>,
    /// Id of the order placed this cycle, if any.
    pub order_id: Option<String>,
    pub settlement: SettlementReport,
    /// Acceptance floor after this cycle's controller step.
    pub min_accept: f64,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    voting: WeightedVoting,
    controller: PIController,
    risk: RiskManager,
    ledger: Ledger,
    feed: Arc<dyn MarketFeed>,
    draws: Arc<dyn DrawFeed>,
    calibration: CalibrationParams,
    state_path: PathBuf,
    order_tag: String,
    /// External per-source performance signal; zero until fed.
    perf: PerfSignal,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        voting: WeightedVoting,
        controller: PIController,
        risk: RiskManager,
        ledger: Ledger,
        feed: Arc<dyn MarketFeed>,
        draws: Arc<dyn DrawFeed>,
        calibration: CalibrationParams,
        state_path: PathBuf,
        order_tag: String,
    ) -> Self {
        Self {
            voting,
            controller,
            risk,
            ledger,
            feed,
            draws,
            calibration,
            state_path,
            order_tag,
            perf: PerfSignal::default(),
        }
    }

    /// Inject the per-source performance signal used by the next weight
    /// adaptation (e.g. trailing accuracy deltas computed upstream).
    pub fn set_perf_signal(&mut self, perf: PerfSignal) {
        self.perf = perf;
    }

    pub fn min_accept(&self) -> f64 {
        self.controller.min_accept()
    }

    /// Run one full decision cycle.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        // 1. Fetch — an empty read is a quiet cycle, not an error.
        let kpi = self.feed.kpi_window().await.context("KPI read failed")?;
        let candidates = self
            .feed
            .read_candidates()
            .await
            .context("Candidate read failed")?;
        info!(count = candidates.len(), kpi = kpi.is_some(), "Fetched cycle inputs");

        // 2. Vote.
        let mut decision = self.voting.decide(&candidates, &self.perf);

        // 3. Calibrate the blended probability.
        if let Some(d) = &mut decision {
            let raw = d.p_star;
            d.p_star = hybrid_calibrate(raw, &self.calibration);
            debug!(
                raw = format!("{raw:.4}"),
                calibrated = format!("{:.4}", d.p_star),
                "Calibration applied"
            );
        }

        // 4. Adapt the acceptance floor for subsequent gating.
        if let Some(k) = &kpi {
            let step = self.controller.step(k.cov_w, k.acc);
            if step.changed {
                info!(
                    min_accept = format!("{:.4}", step.min_accept),
                    "Acceptance floor adjusted"
                );
            }
        }

        // 5. Stake and record.
        let mut order_id = None;
        if let Some(d) = &decision {
            if d.p_star >= self.controller.min_accept() {
                let kelly_frac = self.risk.kelly_fraction(d.p_star);
                let stake_u = self.risk.stake_units(d.p_star);
                if stake_u > 0 {
                    let order = Order::new(
                        d.market,
                        d.draw_id,
                        d.p_star,
                        kelly_frac,
                        stake_u,
                        &self.order_tag,
                        format!("auto_e2e_{}", d.bucket),
                    );
                    self.ledger.upsert_order(&order).await?;
                    order_id = Some(order.id);
                }
            } else {
                debug!(
                    p_star = format!("{:.4}", d.p_star),
                    min_accept = format!("{:.4}", self.controller.min_accept()),
                    "Decision below acceptance floor"
                );
            }
        }

        // 6. Settle prior orders against realized draws.
        let realized = self
            .draws
            .recent_draws()
            .await
            .context("Draw read failed")?;
        let settlement = self.ledger.settle_orders(&realized).await?;

        // 7. Persist run state — only after all mutating work completed.
        let state = RunState {
            last_run: Some(Utc::now()),
            last_decision: decision.clone(),
        };
        storage::save_state(&self.state_path, &state)?;

        Ok(CycleReport {
            candidates_seen: candidates.len(),
            decision,
            order_id,
            settlement,
            min_accept: self.controller.min_accept(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
