//! Weighted voting — adaptive multi-source probability fusion.
//!
//! Blends the three upstream win-probability sources in logit space with
//! adaptively-tuned weights. Logit-space averaging is the natural space for
//! combining independent log-odds estimates; naive linear averaging drags
//! the blend toward 0.5.

use tracing::debug;

use crate::prob::{clip, logit, sigmoid, P_EPS};
use crate::types::{Candidate, Decision, SourceId, WeightVector};

/// Acceptance never drops below this, regardless of configured floor.
pub const HARD_ACCEPT_MIN: f64 = 0.33;

/// Fixed nudge applied by the extreme gate.
const EXTREME_NUDGE: f64 = 0.02;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Extreme-gate settings: sharpen already-confident blended signals instead
/// of letting the ensemble regress them to the mean.
#[derive(Debug, Clone)]
pub struct ExtremeGate {
    pub enable: bool,
    /// Above this, nudge the blend up by `EXTREME_NUDGE` (capped at 0.999).
    pub hi: f64,
    /// Below this, nudge the blend down by `EXTREME_NUDGE` (floored at 0.001).
    pub lo: f64,
}

impl Default for ExtremeGate {
    fn default() -> Self {
        Self {
            enable: true,
            hi: 0.80,
            lo: 0.20,
        }
    }
}

/// Voting configuration.
#[derive(Debug, Clone)]
pub struct VotingConfig {
    pub weights_init: WeightVector,
    /// Per-source weight bounds applied after each adaptation step.
    pub weight_floor: f64,
    pub weight_ceiling: f64,
    /// Adaptation step size.
    pub weight_eta: f64,
    pub extreme_gate: ExtremeGate,
    /// Minimum blended probability for `accept`.
    pub accept_floor: f64,
    /// Ascending bucket ladder for confidence tiering.
    pub buckets: Vec<f64>,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            weights_init: WeightVector::default(),
            weight_floor: 0.10,
            weight_ceiling: 0.70,
            weight_eta: 0.02,
            extreme_gate: ExtremeGate::default(),
            accept_floor: 0.50,
            buckets: vec![0.50, 0.67, 1.00],
        }
    }
}

/// Recent per-source performance signal (e.g. accuracy delta over the
/// trailing window). Positive nudges a source's weight up, negative down.
/// A missing signal is a zero nudge.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerfSignal {
    pub cloud: f64,
    pub map: f64,
    pub size: f64,
}

impl PerfSignal {
    fn get(&self, source: SourceId) -> f64 {
        match source {
            SourceId::Cloud => self.cloud,
            SourceId::Map => self.map,
            SourceId::Size => self.size,
        }
    }
}

// ---------------------------------------------------------------------------
// Weighted voting
// ---------------------------------------------------------------------------

pub struct WeightedVoting {
    config: VotingConfig,
    /// Live weights — adapted in place each cycle, owned by this component.
    weights: WeightVector,
}

impl WeightedVoting {
    pub fn new(config: VotingConfig) -> Self {
        let mut weights = config.weights_init;
        weights.normalize();
        Self { config, weights }
    }

    /// Current (normalized) weight vector.
    pub fn weights(&self) -> WeightVector {
        self.weights
    }

    /// Nudge each source weight by `eta * perf`, clip into
    /// `[weight_floor, weight_ceiling]`, then renormalize to sum 1.
    pub fn adapt_weights(&mut self, perf: &PerfSignal) {
        let floor = self.config.weight_floor;
        let ceiling = self.config.weight_ceiling;
        let eta = self.config.weight_eta;

        self.weights.cloud = clip(
            self.weights.cloud + eta * perf.get(SourceId::Cloud),
            floor,
            ceiling,
        );
        self.weights.map = clip(
            self.weights.map + eta * perf.get(SourceId::Map),
            floor,
            ceiling,
        );
        self.weights.size = clip(
            self.weights.size + eta * perf.get(SourceId::Size),
            floor,
            ceiling,
        );
        self.weights.normalize();

        debug!(weights = %self.weights, "Weights adapted");
    }

    /// Blend the three source probabilities: clip each into the open
    /// interval, weighted-average the logits, map back through the logistic.
    pub fn combine_probs(&self, p_cloud: f64, p_map: f64, p_size: f64) -> f64 {
        let w = &self.weights;
        let s = w.sum().max(1e-9);
        let z = (w.cloud * logit(p_cloud) + w.map * logit(p_map) + w.size * logit(p_size)) / s;
        sigmoid(z)
    }

    /// Sharpen an already-confident blend past the gate thresholds.
    fn apply_extreme_gate(&self, p: f64) -> f64 {
        let gate = &self.config.extreme_gate;
        if !gate.enable {
            return p;
        }
        if p >= gate.hi {
            (p + EXTREME_NUDGE).min(0.999)
        } else if p <= gate.lo {
            (p - EXTREME_NUDGE).max(0.001)
        } else {
            p
        }
    }

    /// Highest bucket threshold in the ascending ladder that `p` meets or
    /// exceeds, with its label. Falls back to the lowest rung.
    pub fn vote_bucket(&self, p: f64) -> (f64, String) {
        let mut best = *self.config.buckets.first().unwrap_or(&0.50);
        for &b in &self.config.buckets {
            if p >= b {
                best = b;
            }
        }
        (best, format!("{best:.2}"))
    }

    /// Run one full voting pass over a draw's candidate readings.
    ///
    /// Readings are keyed by source; a source absent from the batch
    /// contributes a neutral 0.5. Returns `None` for an empty batch —
    /// no data is not an error.
    pub fn decide(&mut self, candidates: &[Candidate], perf: &PerfSignal) -> Option<Decision> {
        let first = candidates.first()?;

        let mut p_cloud = 0.5;
        let mut p_map = 0.5;
        let mut p_size = 0.5;
        for c in candidates {
            let p = clip(c.p_win, P_EPS, 1.0 - P_EPS);
            match c.source {
                SourceId::Cloud => p_cloud = p,
                SourceId::Map => p_map = p,
                SourceId::Size => p_size = p,
            }
        }

        self.adapt_weights(perf);
        let combined = self.combine_probs(p_cloud, p_map, p_size);
        let p_star = self.apply_extreme_gate(combined);

        let (_, bucket) = self.vote_bucket(p_star);
        let accept = p_star >= self.config.accept_floor.max(HARD_ACCEPT_MIN);

        let decision = Decision {
            draw_id: first.draw_id,
            market: first.market,
            p_star,
            bucket,
            accept,
            weights: self.weights,
        };

        debug!(%decision, "Vote complete");
        Some(decision)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Market;

    fn make_candidate(source: SourceId, p_win: f64) -> Candidate {
        Candidate {
            draw_id: 3_312_001,
            market: Market::Parity,
            source,
            p_win,
            confidence: None,
        }
    }

    fn candidates(p_cloud: f64, p_map: f64, p_size: f64) -> Vec<Candidate> {
        vec![
            make_candidate(SourceId::Cloud, p_cloud),
            make_candidate(SourceId::Map, p_map),
            make_candidate(SourceId::Size, p_size),
        ]
    }

    #[test]
    fn test_identical_sources_collapse_to_input() {
        let voting = WeightedVoting::new(VotingConfig::default());
        for &p in &[0.1, 0.3, 0.5, 0.7, 0.9] {
            let combined = voting.combine_probs(p, p, p);
            assert!((combined - p).abs() < 1e-9, "p={p} combined={combined}");
        }
    }

    #[test]
    fn test_reference_blend_scenario() {
        // cloud=0.60, map=0.55, size=0.62 at weights 0.5/0.3/0.2
        let mut voting = WeightedVoting::new(VotingConfig::default());
        let decision = voting
            .decide(&candidates(0.60, 0.55, 0.62), &PerfSignal::default())
            .unwrap();
        assert!(
            (decision.p_star - 0.588).abs() < 0.005,
            "p_star={}",
            decision.p_star
        );
        assert!(decision.accept);
        assert_eq!(decision.bucket, "0.50");
        assert_eq!(decision.draw_id, 3_312_001);
    }

    #[test]
    fn test_empty_batch_yields_no_decision() {
        let mut voting = WeightedVoting::new(VotingConfig::default());
        assert!(voting.decide(&[], &PerfSignal::default()).is_none());
    }

    #[test]
    fn test_missing_source_defaults_neutral() {
        let mut voting = WeightedVoting::new(VotingConfig::default());
        // Only the cloud source reports; map/size default to 0.5.
        let decision = voting
            .decide(
                &[make_candidate(SourceId::Cloud, 0.9)],
                &PerfSignal::default(),
            )
            .unwrap();
        // Blend sits between 0.5 and 0.9.
        assert!(decision.p_star > 0.5 && decision.p_star < 0.9);
    }

    #[test]
    fn test_adapt_weights_invariants() {
        let cfg = VotingConfig::default();
        let mut voting = WeightedVoting::new(cfg.clone());
        let perf = PerfSignal {
            cloud: 1.0,
            map: -1.0,
            size: 0.0,
        };
        for _ in 0..50 {
            voting.adapt_weights(&perf);
            let w = voting.weights();
            assert!((w.sum() - 1.0).abs() < 1e-9, "sum={}", w.sum());
        }
        // Repeated positive signal pushes cloud up, negative pushes map down.
        let w = voting.weights();
        assert!(w.cloud > 0.5);
        assert!(w.map < 0.3);
    }

    #[test]
    fn test_adapt_weights_respects_bounds_before_normalize() {
        let cfg = VotingConfig {
            weight_eta: 10.0, // huge step to force clipping
            ..VotingConfig::default()
        };
        let mut voting = WeightedVoting::new(cfg);
        voting.adapt_weights(&PerfSignal {
            cloud: 1.0,
            map: 1.0,
            size: 1.0,
        });
        // All clipped to the 0.70 ceiling, then normalized to thirds.
        let w = voting.weights();
        assert!((w.cloud - w.map).abs() < 1e-9);
        assert!((w.map - w.size).abs() < 1e-9);
    }

    #[test]
    fn test_zero_perf_leaves_default_weights() {
        let mut voting = WeightedVoting::new(VotingConfig::default());
        voting.adapt_weights(&PerfSignal::default());
        let w = voting.weights();
        assert!((w.cloud - 0.5).abs() < 1e-9);
        assert!((w.map - 0.3).abs() < 1e-9);
        assert!((w.size - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_extreme_gate_sharpens_high() {
        let mut voting = WeightedVoting::new(VotingConfig::default());
        let decision = voting
            .decide(&candidates(0.95, 0.95, 0.95), &PerfSignal::default())
            .unwrap();
        // Identical 0.95 inputs collapse to 0.95, then the gate adds 0.02.
        assert!((decision.p_star - 0.97).abs() < 1e-6, "p={}", decision.p_star);
    }

    #[test]
    fn test_extreme_gate_suppresses_low() {
        let mut voting = WeightedVoting::new(VotingConfig::default());
        let decision = voting
            .decide(&candidates(0.05, 0.05, 0.05), &PerfSignal::default())
            .unwrap();
        assert!((decision.p_star - 0.03).abs() < 1e-6, "p={}", decision.p_star);
        assert!(!decision.accept);
    }

    #[test]
    fn test_extreme_gate_caps_at_bounds() {
        let mut voting = WeightedVoting::new(VotingConfig::default());
        let hi = voting
            .decide(&candidates(0.999, 0.999, 0.999), &PerfSignal::default())
            .unwrap();
        assert!(hi.p_star <= 0.999);
        let lo = voting
            .decide(&candidates(0.001, 0.001, 0.001), &PerfSignal::default())
            .unwrap();
        assert!(lo.p_star >= 0.001);
    }

    #[test]
    fn test_extreme_gate_disabled_is_passthrough() {
        let cfg = VotingConfig {
            extreme_gate: ExtremeGate {
                enable: false,
                ..ExtremeGate::default()
            },
            ..VotingConfig::default()
        };
        let mut voting = WeightedVoting::new(cfg);
        let decision = voting
            .decide(&candidates(0.95, 0.95, 0.95), &PerfSignal::default())
            .unwrap();
        assert!((decision.p_star - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_vote_bucket_ladder() {
        let voting = WeightedVoting::new(VotingConfig::default());
        assert_eq!(voting.vote_bucket(0.10).1, "0.50");
        assert_eq!(voting.vote_bucket(0.55).1, "0.50");
        assert_eq!(voting.vote_bucket(0.67).1, "0.67");
        assert_eq!(voting.vote_bucket(0.90).1, "0.67");
        // The top rung only triggers at exactly 1.0, which clipping makes
        // unreachable on the live path.
        assert_eq!(voting.vote_bucket(1.0).1, "1.00");
    }

    #[test]
    fn test_out_of_range_inputs_are_clipped_not_fatal() {
        let mut voting = WeightedVoting::new(VotingConfig::default());
        let decision = voting
            .decide(&candidates(1.5, -0.3, 0.5), &PerfSignal::default())
            .unwrap();
        assert!(decision.p_star.is_finite());
        assert!(decision.p_star > 0.0 && decision.p_star < 1.0);
    }

    #[test]
    fn test_hard_minimum_overrides_low_floor() {
        let cfg = VotingConfig {
            accept_floor: 0.0,
            extreme_gate: ExtremeGate {
                enable: false,
                ..ExtremeGate::default()
            },
            ..VotingConfig::default()
        };
        let mut voting = WeightedVoting::new(cfg);
        let decision = voting
            .decide(&candidates(0.30, 0.30, 0.30), &PerfSignal::default())
            .unwrap();
        // 0.30 < HARD_ACCEPT_MIN even though the configured floor is 0.
        assert!(!decision.accept);
    }
}
