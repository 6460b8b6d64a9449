//! PI controller for the acceptance floor.
//!
//! Feedback loop that trades volume against precision: coverage below
//! target lowers the floor (more permissive), accuracy above target raises
//! it. The two error terms combine additively so the floor self-balances
//! without manual threshold tuning.

use serde::Deserialize;
use std::fmt;
use tracing::debug;

use crate::prob::clip;

/// Floor movements smaller than this are treated as noise.
const CHANGE_HYSTERESIS: f64 = 1e-3;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Gain preset selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerMode {
    Conservative,
    Balanced,
    Aggressive,
}

impl fmt::Display for ControllerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerMode::Conservative => f.write_str("conservative"),
            ControllerMode::Balanced => f.write_str("balanced"),
            ControllerMode::Aggressive => f.write_str("aggressive"),
        }
    }
}

/// Gain constants for one mode.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Gains {
    pub k_cov: f64,
    pub k_acc_up: f64,
    pub k_acc_dn: f64,
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub target_cov: f64,
    pub target_acc: f64,
    pub conservative: Gains,
    pub balanced: Gains,
    pub aggressive: Gains,
    /// Bounds on the live acceptance floor.
    pub min_accept_bound: f64,
    pub max_accept_bound: f64,
    /// Starting floor, normally the voting accept_floor.
    pub initial_floor: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            target_cov: 0.60,
            target_acc: 0.80,
            conservative: Gains {
                k_cov: 0.02,
                k_acc_up: 0.06,
                k_acc_dn: 0.02,
            },
            balanced: Gains {
                k_cov: 0.04,
                k_acc_up: 0.04,
                k_acc_dn: 0.04,
            },
            aggressive: Gains {
                k_cov: 0.08,
                k_acc_up: 0.02,
                k_acc_dn: 0.06,
            },
            min_accept_bound: 0.40,
            max_accept_bound: 0.90,
            initial_floor: 0.50,
        }
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// One controller step's result bundle.
#[derive(Debug, Clone, Copy)]
pub struct StepResult {
    pub min_accept: f64,
    pub changed: bool,
    pub err_cov: f64,
    pub err_acc: f64,
    pub mode: ControllerMode,
}

pub struct PIController {
    config: ControllerConfig,
    mode: ControllerMode,
    /// Live acceptance floor, bounded to the configured knob range.
    min_accept: f64,
}

impl PIController {
    pub fn new(config: ControllerConfig, mode: ControllerMode) -> Self {
        let min_accept = clip(
            config.initial_floor,
            config.min_accept_bound,
            config.max_accept_bound,
        );
        Self {
            config,
            mode,
            min_accept,
        }
    }

    pub fn min_accept(&self) -> f64 {
        self.min_accept
    }

    pub fn mode(&self) -> ControllerMode {
        self.mode
    }

    /// Switch gain preset at runtime. The floor carries over.
    pub fn set_mode(&mut self, mode: ControllerMode) {
        self.mode = mode;
    }

    fn gains(&self) -> Gains {
        match self.mode {
            ControllerMode::Conservative => self.config.conservative,
            ControllerMode::Balanced => self.config.balanced,
            ControllerMode::Aggressive => self.config.aggressive,
        }
    }

    /// Advance one step from the trailing window's coverage and (optional)
    /// accuracy. Unknown accuracy contributes a zero error term.
    pub fn step(&mut self, coverage: f64, accuracy: Option<f64>) -> StepResult {
        let gains = self.gains();

        let err_cov = self.config.target_cov - coverage;
        let err_acc = accuracy.map(|acc| self.config.target_acc - acc).unwrap_or(0.0);

        let delta = gains.k_cov * err_cov
            + (gains.k_acc_dn * err_acc.max(0.0) - gains.k_acc_up * (-err_acc).max(0.0));

        let new_floor = clip(
            self.min_accept - delta,
            self.config.min_accept_bound,
            self.config.max_accept_bound,
        );
        let changed = (new_floor - self.min_accept).abs() >= CHANGE_HYSTERESIS;
        self.min_accept = new_floor;

        debug!(
            min_accept = format!("{new_floor:.4}"),
            changed,
            err_cov = format!("{err_cov:.4}"),
            err_acc = format!("{err_acc:.4}"),
            mode = %self.mode,
            "Controller step"
        );

        StepResult {
            min_accept: new_floor,
            changed,
            err_cov,
            err_acc,
            mode: self.mode,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
