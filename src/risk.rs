//! Kelly-based stake sizing.
//!
//! Assumes an even-money payout structure, where `2p - 1` is the standard
//! Kelly fraction. The fraction is capped to bound variance independent of
//! the computed edge, and discretized to whole unit multiples to match
//! ledger accounting granularity.

use crate::prob::clip;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RiskConfig {
    /// Hard cap on the Kelly fraction.
    pub kelly_cap: f64,
    /// Stake granularity in ledger units.
    pub unit_size: i64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            kelly_cap: 0.05,
            unit_size: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Risk manager
// ---------------------------------------------------------------------------

pub struct RiskManager {
    config: RiskConfig,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Even-money edge: `2p - 1`. Recorded on orders as `ev`.
    pub fn expected_value(p_win: f64) -> f64 {
        2.0 * p_win - 1.0
    }

    /// Capped Kelly fraction: `clip(2p - 1, 0, cap)`.
    pub fn kelly_fraction(&self, p_win: f64) -> f64 {
        clip(Self::expected_value(p_win), 0.0, self.config.kelly_cap)
    }

    /// Stake in whole unit multiples: the Kelly fraction as a share of the
    /// cap, rounded, times `unit_size`. Never negative.
    pub fn stake_units(&self, p_win: f64) -> i64 {
        let f = self.kelly_fraction(p_win);
        let steps = (f / self.config.kelly_cap.max(1e-9)).round() as i64;
        (steps * self.config.unit_size).max(0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
