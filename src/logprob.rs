//! Log-arithmetic utilities (C1), spec §4.1.
//!
//! All beam scores are log-probabilities; combining two alternative routes
//! to the same prefix is `logaddexp`, never a replace. Nothing in this module
//! allocates — it runs in the innermost per-label, per-beam loop.

/// Negative infinity standing in for `log(0)`.
pub const LOG_ZERO: f32 = f32::NEG_INFINITY;

/// `log(exp(a) + exp(b))`, computed without leaving log-space and stable for
/// `a` or `b` equal to `LOG_ZERO`.
///
/// `logaddexp(-inf, x) == x` by convention (spec §4.1), which `f32` infinity
/// arithmetic gives us for free as long as we special-case both-`-inf` to
/// avoid `inf - inf = NaN`.
#[inline]
pub fn logaddexp(a: f32, b: f32) -> f32 {
    if a == LOG_ZERO {
        return b;
    }
    if b == LOG_ZERO {
        return a;
    }
    let hi = a.max(b);
    let lo = a.min(b);
    hi + ln_1p_exp_neg(hi - lo)
}

/// `log1p(exp(-x))` for `x >= 0`.
///
/// Gated behind the `fastexp` feature as a seam for swapping in a
/// faster/vectorized `exp` (matching the teacher's `fastexp` feature), but
/// both paths currently compute the precise value: spec Testable Property 3
/// requires bit-identical beam orderings across runs and worker counts, and
/// an approximated `exp` would make scores depend on which feature set the
/// crate was built with, which is observable through beam tie-breaking.
#[inline]
fn ln_1p_exp_neg(x: f32) -> f32 {
    debug_assert!(x >= 0.0);
    (-x).exp().ln_1p()
}

/// Apply `ln` elementwise, once per timestep, when the caller's input is raw
/// probabilities rather than already being in log-space (spec §4.1's
/// `is_nll`/`log_probs_input` flag). Non-finite results (from non-positive
/// input) are mapped to `LOG_ZERO` with a debug assertion, matching the
/// corrupt-input contract in spec §7 (the caller's validation layer is
/// responsible for rejecting the row outright; this is the last-ditch clamp).
#[inline]
pub fn safe_ln(p: f32) -> f32 {
    if p <= 0.0 {
        LOG_ZERO
    } else {
        p.ln()
    }
}

/// Total log-probability of a node: `logaddexp(p_b, p_nb)`.
#[inline]
pub fn total_score(p_b: f32, p_nb: f32) -> f32 {
    logaddexp(p_b, p_nb)
}
