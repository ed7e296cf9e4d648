//! Sequential Monte Carlo over discrete states.
//!
//! Particles propagate through the transition tensor, get reweighted
//! by the observation likelihood, and resample systematically whenever
//! the effective sample size drops below half the particle count.

use ax_common::Result;
use ax_config::InferenceSettings;
use ax_math::{floor_and_renormalize, DetRng};

use crate::belief::Belief;
use crate::inference::{Inferred, InferenceContext, Observation};
use crate::model::DiscreteModel;

/// Particle filter engine with its own deterministic stream.
#[derive(Debug, Clone)]
pub struct ParticleFilter {
    num_particles: usize,
    rng: DetRng,
}

impl ParticleFilter {
    pub fn new(settings: &InferenceSettings, seed: u64) -> Self {
        ParticleFilter {
            num_particles: settings.num_particles.max(2),
            rng: DetRng::fork(seed, 0x5a17),
        }
    }

    pub fn infer(
        &mut self,
        model: &DiscreteModel,
        observation: &Observation,
        prior: Option<&Belief>,
        ctx: InferenceContext<'_>,
    ) -> Result<Inferred> {
        let states = model.dims().states;
        let n = self.num_particles;

        // Start from the previous particle set when one is available,
        // otherwise bootstrap from the prior (or D).
        let mut particles: Vec<usize> = match ctx.previous_belief {
            Some(Belief::Particles {
                states: prev_states,
                ..
            }) if prev_states.len() == n => prev_states.clone(),
            Some(other) => {
                let cat = other.to_categorical(states);
                (0..n).map(|_| self.rng.sample_categorical(&cat)).collect()
            }
            None => {
                let cat = prior
                    .map(|p| p.to_categorical(states))
                    .unwrap_or_else(|| model.d().to_vec());
                (0..n).map(|_| self.rng.sample_categorical(&cat)).collect()
            }
        };

        // Propagate through the transition model.
        if let Some(action) = ctx.action {
            if action >= model.dims().actions {
                return Ok(Inferred::degenerate(
                    states,
                    &format!("action {action} outside {} actions", model.dims().actions),
                ));
            }
            for p in particles.iter_mut() {
                let col = model.b().slice(action).col(*p);
                *p = self.rng.sample_categorical(&col);
            }
        }

        // Weight by the observation likelihood.
        let likelihood = match observation {
            Observation::Index(o) => match model.likelihood(*o) {
                Ok(row) => row.to_vec(),
                Err(_) => {
                    return Ok(Inferred::degenerate(
                        states,
                        &format!("observation {o} outside {} classes", model.dims().observations),
                    ))
                }
            },
            Observation::Distribution(dist) => {
                if dist.len() != model.dims().observations
                    || dist.iter().any(|p| !p.is_finite() || *p < 0.0)
                {
                    return Ok(Inferred::degenerate(states, "malformed soft observation"));
                }
                let total: f64 = dist.iter().sum();
                if total <= 0.0 {
                    return Ok(Inferred::degenerate(states, "soft observation has zero mass"));
                }
                let mut l = vec![0.0; states];
                for (o, &w) in dist.iter().enumerate() {
                    if w > 0.0 {
                        for (s, li) in
                            model.likelihood(o).expect("index in range").iter().enumerate()
                        {
                            l[s] += w / total * li;
                        }
                    }
                }
                l
            }
            Observation::Continuous(_) => {
                return Ok(Inferred::degenerate(
                    states,
                    "continuous observation against a discrete model",
                ))
            }
        };

        let mut weights: Vec<f64> = particles.iter().map(|&s| likelihood[s]).collect();
        if !floor_and_renormalize(&mut weights) {
            return Ok(Inferred::degenerate(states, "zero-probability event"));
        }

        // Resample when the effective sample size collapses.
        let ess = 1.0 / weights.iter().map(|w| w * w).sum::<f64>();
        if ess < n as f64 / 2.0 {
            let ancestors = self.rng.systematic_resample(&weights, n);
            particles = ancestors.into_iter().map(|i| particles[i]).collect();
            weights = vec![1.0 / n as f64; n];
        }

        Ok(Inferred {
            belief: Belief::particles(particles, weights)?,
            iterations: 1,
            converged: true,
            warning: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::discrete::fixtures::corridor;

    fn filter(seed: u64) -> ParticleFilter {
        let mut settings = InferenceSettings::default();
        settings.num_particles = 200;
        ParticleFilter::new(&settings, seed)
    }

    #[test]
    fn repeated_evidence_concentrates_particles() {
        let model = corridor();
        let mut pf = filter(3);
        let mut belief: Option<Belief> = None;
        for _ in 0..6 {
            let ctx = InferenceContext {
                previous_belief: belief.as_ref(),
                action: None,
            };
            let out = pf
                .infer(&model, &Observation::Index(1), None, ctx)
                .unwrap();
            belief = Some(out.belief);
        }
        let probs = belief.unwrap().to_categorical(4);
        assert!(probs[1] > 0.8, "mass on state 1 was {}", probs[1]);
    }

    #[test]
    fn propagation_follows_the_transition_model() {
        let model = corridor();
        let mut pf = filter(5);
        let prev = Belief::particles(vec![0; 200], vec![1.0 / 200.0; 200]).unwrap();
        let ctx = InferenceContext {
            previous_belief: Some(&prev),
            action: Some(0),
        };
        let out = pf.infer(&model, &Observation::Index(1), None, ctx).unwrap();
        // All particles started in state 0 and action 0 shifts right.
        let probs = out.belief.to_categorical(4);
        assert!(probs[1] > 0.99);
    }

    #[test]
    fn identical_seeds_give_identical_particles() {
        let model = corridor();
        let mut a = filter(11);
        let mut b = filter(11);
        let out_a = a
            .infer(&model, &Observation::Index(0), None, InferenceContext::default())
            .unwrap();
        let out_b = b
            .infer(&model, &Observation::Index(0), None, InferenceContext::default())
            .unwrap();
        assert_eq!(out_a.belief, out_b.belief);
    }

    #[test]
    fn bad_action_degenerates() {
        let model = corridor();
        let mut pf = filter(13);
        let prev = Belief::uniform(4);
        let ctx = InferenceContext {
            previous_belief: Some(&prev),
            action: Some(99),
        };
        let out = pf.infer(&model, &Observation::Index(0), None, ctx).unwrap();
        assert!(out.warning.is_some());
    }
}
