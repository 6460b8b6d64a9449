//! Probability-space primitives shared by voting and calibration.
//!
//! Every entry into a logit transform goes through `clip` first, so the
//! transforms never see a probability at or outside the (0,1) boundary.

/// Open-interval clamp applied before any logit transform.
pub const P_EPS: f64 = 1e-6;

/// Clamp `x` into `[lo, hi]`.
pub fn clip(x: f64, lo: f64, hi: f64) -> f64 {
    x.max(lo).min(hi)
}

/// Natural-log odds: `ln(p / (1-p))`.
///
/// The input is clipped into `[P_EPS, 1-P_EPS]` so the transform is total.
pub fn logit(p: f64) -> f64 {
    let p = clip(p, P_EPS, 1.0 - P_EPS);
    (p / (1.0 - p)).ln()
}

/// Logistic function, inverse of `logit`.
pub fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
