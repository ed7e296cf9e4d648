//! Numerically stable primitives for probability-vector arithmetic.
//!
//! All belief math runs through these kernels. Distributions are kept
//! strictly positive with the floor [`EPS`], which keeps entropies and
//! KL terms finite even for near-degenerate beliefs.

/// Numerical floor for probability components.
pub const EPS: f64 = 1e-16;

/// Stable log(sum(exp(values))).
///
/// Returns NEG_INFINITY for empty input or all -inf inputs.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NEG_INFINITY;
    }
    if values.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    if max == f64::INFINITY {
        return f64::INFINITY;
    }
    let mut sum = 0.0;
    for v in values {
        sum += (*v - max).exp();
    }
    max + sum.ln()
}

/// Stable softmax: exp(x_i - lse(x)) for each component.
///
/// The output sums to 1 and every component is at least [`EPS`].
pub fn softmax(values: &[f64]) -> Vec<f64> {
    let lse = log_sum_exp(values);
    if !lse.is_finite() {
        return uniform(values.len());
    }
    let mut out: Vec<f64> = values.iter().map(|v| (v - lse).exp()).collect();
    floor_and_renormalize(&mut out);
    out
}

/// Stable log-softmax: x_i - lse(x).
pub fn log_softmax(values: &[f64]) -> Vec<f64> {
    let lse = log_sum_exp(values);
    values.iter().map(|v| v - lse).collect()
}

/// Uniform distribution over `n` components. Empty input yields empty output.
pub fn uniform(n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    vec![1.0 / n as f64; n]
}

/// Normalize `values` in place to sum to 1, flooring each component at
/// [`EPS`] first.
///
/// Returns false when the input cannot be normalized (non-finite entries
/// or an all-zero vector); the vector is left untouched in that case so
/// the caller can fall back to a uniform belief.
pub fn floor_and_renormalize(values: &mut [f64]) -> bool {
    if values.is_empty() {
        return false;
    }
    if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return false;
    }
    let sum: f64 = values.iter().sum();
    if sum <= 0.0 {
        return false;
    }
    for v in values.iter_mut() {
        *v = (*v / sum).max(EPS);
    }
    // Flooring disturbs the sum slightly; renormalize once more.
    let sum: f64 = values.iter().sum();
    for v in values.iter_mut() {
        *v /= sum;
    }
    true
}

/// Shannon entropy of a categorical distribution, in nats.
///
/// Components at or below [`EPS`] contribute zero.
pub fn entropy(dist: &[f64]) -> f64 {
    let mut h = 0.0;
    for &p in dist {
        if p > EPS {
            h -= p * p.ln();
        }
    }
    h
}

/// Entropy normalized to [0, 1] by the maximum log(n).
///
/// Used by the adaptive-horizon planner to widen or narrow the horizon.
pub fn normalized_entropy(dist: &[f64]) -> f64 {
    if dist.len() < 2 {
        return 0.0;
    }
    (entropy(dist) / (dist.len() as f64).ln()).clamp(0.0, 1.0)
}

/// KL divergence KL(p || q) for categorical distributions, in nats.
///
/// Both inputs are floored at [`EPS`] so the result stays finite.
pub fn kl_divergence(p: &[f64], q: &[f64]) -> f64 {
    debug_assert_eq!(p.len(), q.len());
    let mut kl = 0.0;
    for (&pi, &qi) in p.iter().zip(q.iter()) {
        let pi = pi.max(EPS);
        let qi = qi.max(EPS);
        kl += pi * (pi.ln() - qi.ln());
    }
    kl.max(0.0)
}

/// Largest absolute componentwise difference between two vectors.
pub fn max_abs_diff(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

/// Dot product.
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine similarity between two vectors; 0.0 when either has zero norm.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let na: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let nb: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot(a, b) / (na * nb)
}
