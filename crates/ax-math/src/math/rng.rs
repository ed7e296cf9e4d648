//! Seeded deterministic randomness.
//!
//! Every stochastic component (Dirichlet initialization, policy
//! sampling, particle filtering, MCTS rollouts) draws from a
//! [`DetRng`] forked from the run's master seed. Each agent owns its
//! own stream, so the optional worker-pool mode produces the same
//! draws as the sequential mode regardless of thread interleaving.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Deterministic RNG stream.
#[derive(Debug, Clone)]
pub struct DetRng {
    inner: StdRng,
}

impl DetRng {
    /// Seed a master stream.
    pub fn from_seed(seed: u64) -> Self {
        DetRng {
            inner: StdRng::seed_from_u64(seed),
        }
    }

    /// Derive an independent child stream.
    ///
    /// The child seed mixes the parent seed space with `stream` via
    /// splitmix64, so neighboring streams are uncorrelated.
    pub fn fork(seed: u64, stream: u64) -> Self {
        DetRng::from_seed(splitmix64(seed ^ splitmix64(stream)))
    }

    /// Uniform draw in [0, 1).
    pub fn uniform01(&mut self) -> f64 {
        self.inner.random::<f64>()
    }

    /// Uniform integer in [0, n). Returns 0 when n == 0.
    pub fn below(&mut self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        self.inner.random_range(0..n)
    }

    /// Sample an index from an (unnormalized, non-negative) weight vector.
    ///
    /// Falls back to index 0 when the weights are degenerate.
    pub fn sample_categorical(&mut self, weights: &[f64]) -> usize {
        let total: f64 = weights.iter().filter(|w| w.is_finite() && **w > 0.0).sum();
        if total <= 0.0 || weights.is_empty() {
            return 0;
        }
        let mut target = self.uniform01() * total;
        for (i, &w) in weights.iter().enumerate() {
            if w.is_finite() && w > 0.0 {
                target -= w;
                if target <= 0.0 {
                    return i;
                }
            }
        }
        weights.len() - 1
    }

    /// Standard normal draw via the polar method.
    pub fn normal(&mut self) -> f64 {
        loop {
            let u = 2.0 * self.uniform01() - 1.0;
            let v = 2.0 * self.uniform01() - 1.0;
            let s = u * u + v * v;
            if s > 0.0 && s < 1.0 {
                return u * (-2.0 * s.ln() / s).sqrt();
            }
        }
    }

    /// Gamma(shape, 1) draw via Marsaglia-Tsang squeeze.
    ///
    /// Requires shape > 0; shapes below 1 use the boost
    /// `Gamma(a) = Gamma(a+1) * U^(1/a)`.
    pub fn gamma(&mut self, shape: f64) -> f64 {
        if shape < 1.0 {
            let u: f64 = self.uniform01().max(f64::MIN_POSITIVE);
            return self.gamma(shape + 1.0) * u.powf(1.0 / shape);
        }
        let d = shape - 1.0 / 3.0;
        let c = 1.0 / (9.0 * d).sqrt();
        loop {
            let x = self.normal();
            let v = (1.0 + c * x).powi(3);
            if v <= 0.0 {
                continue;
            }
            let u = self.uniform01();
            if u < 1.0 - 0.0331 * x.powi(4) {
                return d * v;
            }
            if u.ln() < 0.5 * x * x + d * (1.0 - v + v.ln()) {
                return d * v;
            }
        }
    }

    /// Dirichlet draw with the given concentrations.
    ///
    /// Degenerate concentrations yield a uniform vector.
    pub fn dirichlet(&mut self, alpha: &[f64]) -> Vec<f64> {
        if alpha.is_empty() {
            return Vec::new();
        }
        let draws: Vec<f64> = alpha
            .iter()
            .map(|&a| if a > 0.0 { self.gamma(a) } else { 0.0 })
            .collect();
        let total: f64 = draws.iter().sum();
        if total <= 0.0 || !total.is_finite() {
            return vec![1.0 / alpha.len() as f64; alpha.len()];
        }
        draws.into_iter().map(|g| g / total).collect()
    }

    /// Systematic resampling: `n` ancestor indices proportional to
    /// normalized `weights`, using a single uniform offset.
    pub fn systematic_resample(&mut self, weights: &[f64], n: usize) -> Vec<usize> {
        let total: f64 = weights.iter().sum();
        if total <= 0.0 || weights.is_empty() || n == 0 {
            return (0..n).map(|i| i % weights.len().max(1)).collect();
        }
        let step = total / n as f64;
        let offset = self.uniform01() * step;
        let mut out = Vec::with_capacity(n);
        let mut cumulative = weights[0];
        let mut idx = 0;
        for k in 0..n {
            let target = offset + step * k as f64;
            while cumulative < target && idx + 1 < weights.len() {
                idx += 1;
                cumulative += weights[idx];
            }
            out.push(idx);
        }
        out
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = DetRng::from_seed(42);
        let mut b = DetRng::from_seed(42);
        for _ in 0..32 {
            assert_eq!(a.uniform01().to_bits(), b.uniform01().to_bits());
        }
    }

    #[test]
    fn forked_streams_diverge() {
        let mut a = DetRng::fork(42, 1);
        let mut b = DetRng::fork(42, 2);
        let same = (0..16).filter(|_| a.uniform01() == b.uniform01()).count();
        assert!(same < 16);
    }

    #[test]
    fn categorical_respects_point_mass() {
        let mut rng = DetRng::from_seed(7);
        for _ in 0..64 {
            assert_eq!(rng.sample_categorical(&[0.0, 1.0, 0.0]), 1);
        }
    }

    #[test]
    fn categorical_degenerate_falls_back() {
        let mut rng = DetRng::from_seed(7);
        assert_eq!(rng.sample_categorical(&[0.0, 0.0]), 0);
    }

    #[test]
    fn normal_has_near_zero_mean() {
        let mut rng = DetRng::from_seed(11);
        let n = 10_000;
        let mean: f64 = (0..n).map(|_| rng.normal()).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.05);
    }

    #[test]
    fn gamma_mean_tracks_shape() {
        let mut rng = DetRng::from_seed(13);
        let n = 10_000;
        let mean: f64 = (0..n).map(|_| rng.gamma(3.0)).sum::<f64>() / n as f64;
        assert!((mean - 3.0).abs() < 0.15);
    }

    #[test]
    fn dirichlet_draws_normalize() {
        let mut rng = DetRng::from_seed(17);
        let draw = rng.dirichlet(&[1.0, 2.0, 0.5]);
        let sum: f64 = draw.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(draw.iter().all(|p| *p >= 0.0));
    }

    #[test]
    fn systematic_resample_prefers_heavy_weights() {
        let mut rng = DetRng::from_seed(19);
        let idx = rng.systematic_resample(&[0.01, 0.98, 0.01], 100);
        let ones = idx.iter().filter(|i| **i == 1).count();
        assert!(ones >= 90);
        assert_eq!(idx.len(), 100);
    }
}
