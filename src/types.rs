//! Shared types for the VERDICT engine.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that feed, strategy, ledger,
//! and engine modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A draw sum at or above this value wins the size market.
pub const SIZE_WIN_THRESHOLD: i64 = 14;

// ---------------------------------------------------------------------------
// Markets
// ---------------------------------------------------------------------------

/// A bettable market on a recurring draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Market {
    /// Parity market: wins iff the draw sum is even. Wire name "oe".
    #[serde(rename = "oe")]
    Parity,
    /// Size market: wins iff the draw sum meets the size threshold.
    Size,
}

impl Market {
    /// Wire/ledger identifier for this market.
    pub fn as_str(&self) -> &'static str {
        match self {
            Market::Parity => "oe",
            Market::Size => "size",
        }
    }

    /// Apply this market's win rule to a realized draw sum.
    pub fn settle(&self, draw_sum: i64) -> Outcome {
        let won = match self {
            Market::Parity => draw_sum % 2 == 0,
            Market::Size => draw_sum >= SIZE_WIN_THRESHOLD,
        };
        if won {
            Outcome::Win
        } else {
            Outcome::Lose
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Market {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "oe" => Ok(Market::Parity),
            "size" => Ok(Market::Size),
            other => Err(format!("unknown market '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Probability sources
// ---------------------------------------------------------------------------

/// Identifier of an upstream win-probability source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    Cloud,
    Map,
    Size,
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::Cloud => f.write_str("cloud"),
            SourceId::Map => f.write_str("map"),
            SourceId::Size => f.write_str("size"),
        }
    }
}

/// A single per-source win-probability reading for one draw, as delivered
/// by the upstream candidate feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub draw_id: i64,
    pub market: Market,
    pub source: SourceId,
    /// Win probability in (0,1). Defensively clipped before any transform.
    pub p_win: f64,
    /// Optional source-reported confidence.
    #[serde(default)]
    pub confidence: Option<f64>,
}

// ---------------------------------------------------------------------------
// Weights
// ---------------------------------------------------------------------------

/// Per-source blend weights. Normalized so the three sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    pub cloud: f64,
    pub map: f64,
    pub size: f64,
}

impl WeightVector {
    pub fn get(&self, source: SourceId) -> f64 {
        match source {
            SourceId::Cloud => self.cloud,
            SourceId::Map => self.map,
            SourceId::Size => self.size,
        }
    }

    pub fn sum(&self) -> f64 {
        self.cloud + self.map + self.size
    }

    /// Scale so the weights sum to 1. A degenerate all-zero vector is left
    /// untouched rather than dividing by zero.
    pub fn normalize(&mut self) {
        let s = self.sum();
        if s > 1e-9 {
            self.cloud /= s;
            self.map /= s;
            self.size /= s;
        }
    }
}

impl Default for WeightVector {
    fn default() -> Self {
        Self {
            cloud: 0.5,
            map: 0.3,
            size: 0.2,
        }
    }
}

impl fmt::Display for WeightVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cloud={:.3} map={:.3} size={:.3}",
            self.cloud, self.map, self.size
        )
    }
}

// ---------------------------------------------------------------------------
// Calibration parameters
// ---------------------------------------------------------------------------

/// Platt affine transform (A, B) followed by temperature scale T.
/// The default is the identity transform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CalibrationParams {
    #[serde(rename = "A", default = "CalibrationParams::default_a")]
    pub a: f64,
    #[serde(rename = "B", default)]
    pub b: f64,
    #[serde(rename = "T", default = "CalibrationParams::default_t")]
    pub t: f64,
}

impl CalibrationParams {
    fn default_a() -> f64 {
        1.0
    }
    fn default_t() -> f64 {
        1.0
    }
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            t: 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Outcome of one voting pass over a draw's candidate readings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub draw_id: i64,
    pub market: Market,
    /// Combined (and later calibrated) win probability.
    pub p_star: f64,
    /// Confidence tier label, e.g. "0.50" or "0.67".
    pub bucket: String,
    pub accept: bool,
    /// Snapshot of the weights used, for auditability.
    pub weights: WeightVector,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "draw {} [{}] p*={:.4} bucket={} accept={}",
            self.draw_id, self.market, self.p_star, self.bucket, self.accept
        )
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// Terminal result of a settled order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Lose,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Win => "win",
            Outcome::Lose => "lose",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "win" => Ok(Outcome::Win),
            "lose" => Ok(Outcome::Lose),
            other => Err(format!("unknown outcome '{other}'")),
        }
    }
}

/// An append-only ledger row. `outcome`/`pnl_u` start unset and move to a
/// terminal value exactly once, at settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub market: Market,
    pub draw_id: i64,
    pub created_at: DateTime<Utc>,
    pub p_win: f64,
    /// Expected value under even-money payout: 2p - 1.
    pub ev: f64,
    pub kelly_frac: f64,
    /// Stake in whole units.
    pub stake_u: i64,
    #[serde(default)]
    pub outcome: Option<Outcome>,
    #[serde(default)]
    pub pnl_u: Option<i64>,
    pub tag: String,
    pub note: String,
}

impl Order {
    /// Build a fresh unsettled order. The id is derived from the creation
    /// timestamp and draw id so reruns within the same second dedupe.
    pub fn new(
        market: Market,
        draw_id: i64,
        p_win: f64,
        kelly_frac: f64,
        stake_u: i64,
        tag: &str,
        note: String,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            id: format!("ord_{}_{}", created_at.timestamp(), draw_id),
            market,
            draw_id,
            created_at,
            p_win,
            ev: 2.0 * p_win - 1.0,
            kelly_frac,
            stake_u,
            outcome: None,
            pnl_u: None,
            tag: tag.to_string(),
            note,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.outcome.is_some()
    }
}

// ---------------------------------------------------------------------------
// Draws and KPIs
// ---------------------------------------------------------------------------

/// A realized draw with its numeric summary, as delivered by the draw feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawRecord {
    pub draw_id: i64,
    /// Deterministic numeric summary the win rules key off.
    pub sum: i64,
    pub timestamp: DateTime<Utc>,
}

/// Trailing-window KPI snapshot for a market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KpiWindow {
    /// Fraction of eligible draws a bet was placed on.
    pub cov_w: f64,
    /// Realized accuracy; None until enough orders settle.
    #[serde(default)]
    pub acc: Option<f64>,
    #[serde(default)]
    pub pbar: Option<f64>,
    #[serde(default)]
    pub brier: Option<f64>,
    pub n_set: u64,
    pub n_ord: u64,
    pub n_draw: u64,
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// Orchestrator state persisted after every cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunState {
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_decision: Option<Decision>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- Market tests --

    #[test]
    fn test_market_wire_names() {
        assert_eq!(Market::Parity.as_str(), "oe");
        assert_eq!(Market::Size.as_str(), "size");
    }

    #[test]
    fn test_parity_settlement() {
        assert_eq!(Market::Parity.settle(14), Outcome::Win);
        assert_eq!(Market::Parity.settle(13), Outcome::Lose);
        assert_eq!(Market::Parity.settle(0), Outcome::Win);
    }

    #[test]
    fn test_size_settlement() {
        assert_eq!(Market::Size.settle(SIZE_WIN_THRESHOLD), Outcome::Win);
        assert_eq!(Market::Size.settle(SIZE_WIN_THRESHOLD - 1), Outcome::Lose);
        assert_eq!(Market::Size.settle(27), Outcome::Win);
    }

    #[test]
    fn test_market_serde_roundtrip() {
        let json = serde_json::to_string(&Market::Parity).unwrap();
        assert_eq!(json, "\"oe\"");
        let back: Market = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Market::Parity);
    }

    // -- WeightVector tests --

    #[test]
    fn test_weight_vector_default_sums_to_one() {
        let w = WeightVector::default();
        assert!((w.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_weight_vector_normalize() {
        let mut w = WeightVector {
            cloud: 2.0,
            map: 1.0,
            size: 1.0,
        };
        w.normalize();
        assert!((w.sum() - 1.0).abs() < 1e-9);
        assert!((w.cloud - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_weight_vector_normalize_zero_safe() {
        let mut w = WeightVector {
            cloud: 0.0,
            map: 0.0,
            size: 0.0,
        };
        w.normalize();
        assert_eq!(w.sum(), 0.0);
    }

    // -- Order tests --

    #[test]
    fn test_order_id_derivation() {
        let order = Order::new(Market::Parity, 3_312_001, 0.62, 0.05, 1, "prod", String::new());
        assert!(order.id.starts_with("ord_"));
        assert!(order.id.ends_with("_3312001"));
        assert!(!order.is_settled());
        assert!(order.outcome.is_none());
        assert!(order.pnl_u.is_none());
    }

    #[test]
    fn test_order_ev_is_even_money_edge() {
        let order = Order::new(Market::Size, 1, 0.70, 0.05, 1, "prod", String::new());
        assert!((order.ev - 0.40).abs() < 1e-12);
    }

    // -- CalibrationParams tests --

    #[test]
    fn test_calibration_params_default_identity() {
        let p = CalibrationParams::default();
        assert_eq!(p.a, 1.0);
        assert_eq!(p.b, 0.0);
        assert_eq!(p.t, 1.0);
    }

    #[test]
    fn test_calibration_params_serde_uppercase_keys() {
        let p: CalibrationParams = serde_json::from_str(r#"{"A":1.2,"B":-0.1,"T":1.5}"#).unwrap();
        assert_eq!(p.a, 1.2);
        assert_eq!(p.b, -0.1);
        assert_eq!(p.t, 1.5);
    }

    // -- RunState tests --

    #[test]
    fn test_run_state_default_is_empty() {
        let state = RunState::default();
        assert!(state.last_run.is_none());
        assert!(state.last_decision.is_none());
    }

    #[test]
    fn test_run_state_serde_roundtrip() {
        let state = RunState {
            last_run: Some(Utc::now()),
            last_decision: Some(Decision {
                draw_id: 42,
                market: Market::Parity,
                p_star: 0.61,
                bucket: "0.50".into(),
                accept: true,
                weights: WeightVector::default(),
            }),
        };
        let json = serde_json::to_string(&state).unwrap();
        let back: RunState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.last_decision.unwrap().draw_id, 42);
    }
}
