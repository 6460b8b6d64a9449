//! Two-stage probability calibration: Platt scaling then temperature.
//!
//! The live decision path only uses `hybrid_calibrate` with parameters
//! fitted offline. `platt_fit` / `temp_scale_fit` are the periodic offline
//! procedure: per-sample SGD on cross-entropy over historical
//! (raw probability, realized outcome) pairs.

use crate::prob::{clip, logit, sigmoid, P_EPS};
use crate::types::CalibrationParams;

/// Fitted temperature is kept inside this range.
const TEMP_MIN: f64 = 0.1;
const TEMP_MAX: f64 = 5.0;

/// A historical sample: raw predicted probability and whether it won.
pub type FitSample = (f64, bool);

// ---------------------------------------------------------------------------
// Live transforms
// ---------------------------------------------------------------------------

/// Affine transform in logit space: `sigmoid(A*logit(p) + B)`.
pub fn apply_platt(p: f64, a: f64, b: f64) -> f64 {
    sigmoid(a * logit(p) + b)
}

/// Temperature scale: `sigmoid(logit(p) / T)`. T < 1 sharpens, T > 1 softens.
pub fn apply_temp(p: f64, t: f64) -> f64 {
    sigmoid(logit(p) / t.max(1e-6))
}

/// Platt then temperature, clipped back into the open interval.
pub fn hybrid_calibrate(p_raw: f64, params: &CalibrationParams) -> f64 {
    let p = apply_temp(apply_platt(p_raw, params.a, params.b), params.t);
    clip(p, P_EPS, 1.0 - P_EPS)
}

// ---------------------------------------------------------------------------
// Offline fitting
// ---------------------------------------------------------------------------

/// Fit Platt parameters (A, B) by per-sample SGD on cross-entropy.
pub fn platt_fit(samples: &[FitSample], iters: usize, lr: f64) -> (f64, f64) {
    let mut a = 1.0_f64;
    let mut b = 0.0_f64;
    for _ in 0..iters {
        for &(p, won) in samples {
            let x = logit(p);
            let pred = sigmoid(a * x + b);
            let y = if won { 1.0 } else { 0.0 };
            let g = pred - y;
            a -= lr * g * x;
            b -= lr * g;
        }
    }
    (a, b)
}

/// Fit the temperature T by per-sample SGD on cross-entropy, clamped to
/// `[TEMP_MIN, TEMP_MAX]` after every step.
pub fn temp_scale_fit(samples: &[FitSample], iters: usize, lr: f64) -> f64 {
    let mut t = 1.0_f64;
    for _ in 0..iters {
        for &(p, won) in samples {
            let z = logit(p) / t.max(1e-6);
            let q = sigmoid(z);
            let y = if won { 1.0 } else { 0.0 };
            // First-order gradient of cross-entropy w.r.t. T.
            let g = (q - y) * (-z) / t.max(1e-6);
            t -= lr * g;
            t = clip(t, TEMP_MIN, TEMP_MAX);
        }
    }
    t
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
