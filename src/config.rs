//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs, then
//! validates every knob eagerly so a malformed value fails at startup
//! instead of deep inside a decision cycle. Secrets (feed API token) are
//! referenced by env-var name and resolved at runtime.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;

use crate::controller::{ControllerConfig, ControllerMode, Gains};
use crate::risk::RiskConfig;
use crate::types::{CalibrationParams, WeightVector};
use crate::voting::{ExtremeGate, VotingConfig};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub feed: FeedConfig,
    pub ledger: LedgerConfig,
    pub voting: VotingSection,
    pub controller: ControllerSection,
    pub risk: RiskSection,
    #[serde(default)]
    pub calibration: CalibrationParams,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub cycle_interval_secs: u64,
    pub state_path: String,
    /// Tag written onto every ledger row.
    #[serde(default = "AgentConfig::default_tag")]
    pub order_tag: String,
}

impl AgentConfig {
    fn default_tag() -> String {
        "prod".to_string()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub base_url: String,
    /// Env-var name holding the bearer token, if the feed requires one.
    #[serde(default)]
    pub api_token_env: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    /// SQLite URL, e.g. "sqlite://verdict_ledger.db".
    pub database_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VotingSection {
    pub weights_init: WeightVector,
    pub weight_floor: f64,
    pub weight_ceiling: f64,
    pub weight_eta: f64,
    pub extreme_gate: ExtremeGateSection,
    pub accept_floor: f64,
    pub buckets: Vec<f64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtremeGateSection {
    pub enable: bool,
    pub hi: f64,
    pub lo: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ControllerSection {
    pub run_mode: ControllerMode,
    pub targets: TargetsSection,
    pub conservative: Gains,
    pub balanced: Gains,
    pub aggressive: Gains,
    pub knobs_bounds: KnobsBounds,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TargetsSection {
    pub cov: f64,
    pub acc: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KnobsBounds {
    pub min_accept: f64,
    pub max_accept: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RiskSection {
    pub kelly_cap: f64,
    pub unit_size: i64,
}

impl AppConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Fail fast on malformed knobs.
    pub fn validate(&self) -> Result<()> {
        let v = &self.voting;
        if !(0.0..1.0).contains(&v.weight_floor) || v.weight_ceiling <= v.weight_floor {
            bail!(
                "voting: weight bounds invalid (floor={}, ceiling={})",
                v.weight_floor,
                v.weight_ceiling
            );
        }
        if v.weight_eta < 0.0 {
            bail!("voting: weight_eta must be non-negative, got {}", v.weight_eta);
        }
        if !(0.0..1.0).contains(&v.accept_floor) {
            bail!("voting: accept_floor must be in [0,1), got {}", v.accept_floor);
        }
        if v.extreme_gate.hi <= v.extreme_gate.lo {
            bail!(
                "voting: extreme gate hi ({}) must exceed lo ({})",
                v.extreme_gate.hi,
                v.extreme_gate.lo
            );
        }
        if v.buckets.is_empty() || v.buckets.windows(2).any(|w| w[0] >= w[1]) {
            bail!("voting: buckets must be a non-empty ascending ladder");
        }

        let c = &self.controller;
        if c.knobs_bounds.min_accept >= c.knobs_bounds.max_accept {
            bail!(
                "controller: knobs_bounds invalid (min_accept={}, max_accept={})",
                c.knobs_bounds.min_accept,
                c.knobs_bounds.max_accept
            );
        }
        if !(0.0..=1.0).contains(&c.targets.cov) || !(0.0..=1.0).contains(&c.targets.acc) {
            bail!(
                "controller: targets out of range (cov={}, acc={})",
                c.targets.cov,
                c.targets.acc
            );
        }

        if self.risk.kelly_cap <= 0.0 || self.risk.kelly_cap > 1.0 {
            bail!("risk: kelly_cap must be in (0,1], got {}", self.risk.kelly_cap);
        }
        if self.risk.unit_size < 1 {
            bail!("risk: unit_size must be at least 1, got {}", self.risk.unit_size);
        }

        if self.calibration.t <= 0.0 {
            bail!("calibration: T must be positive, got {}", self.calibration.t);
        }

        if self.agent.cycle_interval_secs == 0 {
            bail!("agent: cycle_interval_secs must be positive");
        }

        Ok(())
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    pub fn voting_config(&self) -> VotingConfig {
        VotingConfig {
            weights_init: self.voting.weights_init,
            weight_floor: self.voting.weight_floor,
            weight_ceiling: self.voting.weight_ceiling,
            weight_eta: self.voting.weight_eta,
            extreme_gate: ExtremeGate {
                enable: self.voting.extreme_gate.enable,
                hi: self.voting.extreme_gate.hi,
                lo: self.voting.extreme_gate.lo,
            },
            accept_floor: self.voting.accept_floor,
            buckets: self.voting.buckets.clone(),
        }
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            target_cov: self.controller.targets.cov,
            target_acc: self.controller.targets.acc,
            conservative: self.controller.conservative,
            balanced: self.controller.balanced,
            aggressive: self.controller.aggressive,
            min_accept_bound: self.controller.knobs_bounds.min_accept,
            max_accept_bound: self.controller.knobs_bounds.max_accept,
            initial_floor: self.voting.accept_floor,
        }
    }

    pub fn risk_config(&self) -> RiskConfig {
        RiskConfig {
            kelly_cap: self.risk.kelly_cap,
            unit_size: self.risk.unit_size,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [agent]
        name = "VERDICT-001"
        cycle_interval_secs = 300
        state_path = "/tmp/verdict/state.json"

        [feed]
        base_url = "http://feed.local/api"

        [ledger]
        database_url = "sqlite://verdict_ledger.db"

        [voting]
        weights_init = { cloud = 0.5, map = 0.3, size = 0.2 }
        weight_floor = 0.10
        weight_ceiling = 0.70
        weight_eta = 0.02
        extreme_gate = { enable = true, hi = 0.80, lo = 0.20 }
        accept_floor = 0.50
        buckets = [0.50, 0.67, 1.00]

        [controller]
        run_mode = "balanced"
        targets = { cov = 0.60, acc = 0.80 }
        conservative = { k_cov = 0.02, k_acc_up = 0.06, k_acc_dn = 0.02 }
        balanced = { k_cov = 0.04, k_acc_up = 0.04, k_acc_dn = 0.04 }
        aggressive = { k_cov = 0.08, k_acc_up = 0.02, k_acc_dn = 0.06 }
        knobs_bounds = { min_accept = 0.40, max_accept = 0.90 }

        [risk]
        kelly_cap = 0.05
        unit_size = 1

        [calibration]
        A = 1.0
        B = 0.0
        T = 1.0
    "#;

    fn parse(toml_str: &str) -> AppConfig {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn test_parse_and_validate_sample() {
        let cfg = parse(SAMPLE);
        cfg.validate().unwrap();
        assert_eq!(cfg.agent.name, "VERDICT-001");
        assert_eq!(cfg.agent.order_tag, "prod"); // defaulted
        assert_eq!(cfg.controller.run_mode, ControllerMode::Balanced);
        assert!((cfg.voting.weights_init.cloud - 0.5).abs() < 1e-12);
        assert_eq!(cfg.risk.unit_size, 1);
    }

    #[test]
    fn test_missing_section_fails_parse() {
        let broken = SAMPLE.replace("[risk]", "[risk_oops]");
        assert!(toml::from_str::<AppConfig>(&broken).is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_weight_bounds() {
        let mut cfg = parse(SAMPLE);
        cfg.voting.weight_floor = 0.8;
        cfg.voting.weight_ceiling = 0.2;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_gate() {
        let mut cfg = parse(SAMPLE);
        cfg.voting.extreme_gate.hi = 0.1;
        cfg.voting.extreme_gate.lo = 0.9;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unsorted_buckets() {
        let mut cfg = parse(SAMPLE);
        cfg.voting.buckets = vec![0.67, 0.50];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_kelly_cap() {
        let mut cfg = parse(SAMPLE);
        cfg.risk.kelly_cap = 0.0;
        assert!(cfg.validate().is_err());
        cfg.risk.kelly_cap = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_nonpositive_temperature() {
        let mut cfg = parse(SAMPLE);
        cfg.calibration.t = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_knob_bounds() {
        let mut cfg = parse(SAMPLE);
        cfg.controller.knobs_bounds.min_accept = 0.95;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_component_config_mapping() {
        let cfg = parse(SAMPLE);
        let voting = cfg.voting_config();
        assert_eq!(voting.buckets, vec![0.50, 0.67, 1.00]);

        let controller = cfg.controller_config();
        assert!((controller.initial_floor - 0.50).abs() < 1e-12);
        assert!((controller.aggressive.k_cov - 0.08).abs() < 1e-12);

        let risk = cfg.risk_config();
        assert!((risk.kelly_cap - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_calibration_defaults_to_identity_when_absent() {
        let without: String = SAMPLE
            .lines()
            .take_while(|l| !l.contains("[calibration]"))
            .collect::<Vec<_>>()
            .join("\n");
        let cfg: AppConfig = toml::from_str(&without).unwrap();
        assert_eq!(cfg.calibration.a, 1.0);
        assert_eq!(cfg.calibration.t, 1.0);
    }
}
