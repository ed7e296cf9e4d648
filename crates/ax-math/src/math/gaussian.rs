//! Diagonal-Gaussian kernels for the continuous generative model.
//!
//! Variances travel as `log sigma^2`, clamped to [`LOG_VAR_MIN`,
//! `LOG_VAR_MAX`] so that `exp` never overflows and precisions stay
//! bounded.

use std::f64::consts::PI;

/// Lower clamp for log-variance parameters.
pub const LOG_VAR_MIN: f64 = -10.0;
/// Upper clamp for log-variance parameters.
pub const LOG_VAR_MAX: f64 = 10.0;

/// Clamp a log-variance into the stable range.
pub fn clamp_log_var(log_var: f64) -> f64 {
    if log_var.is_nan() {
        return 0.0;
    }
    log_var.clamp(LOG_VAR_MIN, LOG_VAR_MAX)
}

/// Negative log-likelihood of `x` under `N(mean, exp(log_var))`,
/// summed over components.
pub fn gaussian_nll(x: &[f64], mean: &[f64], log_var: &[f64]) -> f64 {
    debug_assert_eq!(x.len(), mean.len());
    debug_assert_eq!(x.len(), log_var.len());
    let mut nll = 0.0;
    for i in 0..x.len() {
        let lv = clamp_log_var(log_var[i]);
        let var = lv.exp();
        let diff = x[i] - mean[i];
        nll += 0.5 * (lv + diff * diff / var + (2.0 * PI).ln());
    }
    nll
}

/// Gradient of [`gaussian_nll`] with respect to `mean`:
/// `d/d mu = -(x - mu) / var` per component.
pub fn gaussian_nll_grad_mean(x: &[f64], mean: &[f64], log_var: &[f64]) -> Vec<f64> {
    (0..x.len())
        .map(|i| {
            let var = clamp_log_var(log_var[i]).exp();
            -(x[i] - mean[i]) / var
        })
        .collect()
}

/// Analytic KL divergence `KL(q || p)` between diagonal Gaussians,
/// summed over components.
///
/// `q = N(mu_q, exp(lv_q))`, `p = N(mu_p, exp(lv_p))`.
pub fn kl_diag_gaussians(mu_q: &[f64], lv_q: &[f64], mu_p: &[f64], lv_p: &[f64]) -> f64 {
    debug_assert_eq!(mu_q.len(), lv_q.len());
    debug_assert_eq!(mu_q.len(), mu_p.len());
    debug_assert_eq!(mu_q.len(), lv_p.len());
    let mut kl = 0.0;
    for i in 0..mu_q.len() {
        let lvq = clamp_log_var(lv_q[i]);
        let lvp = clamp_log_var(lv_p[i]);
        let vq = lvq.exp();
        let vp = lvp.exp();
        let diff = mu_q[i] - mu_p[i];
        kl += 0.5 * (lvp - lvq + (vq + diff * diff) / vp - 1.0);
    }
    kl.max(0.0)
}

/// Clip a gradient vector to a maximum L2 norm.
pub fn clip_grad_norm(grad: &mut [f64], max_norm: f64) {
    let norm: f64 = grad.iter().map(|g| g * g).sum::<f64>().sqrt();
    if norm > max_norm && norm > 0.0 {
        let scale = max_norm / norm;
        for g in grad.iter_mut() {
            *g *= scale;
        }
    }
}
