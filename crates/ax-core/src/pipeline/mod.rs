//! Belief-update pipeline: graph features to posterior beliefs.
//!
//! Each tick the world hands the agent a graph-structured feature
//! vector. An observation map turns the feature into a soft
//! observation over classes, and one of three update modes fuses it
//! into the belief:
//!
//! - **Bayesian**: soft observation through the inference engine
//! - **Gradient**: `b <- b + eta * grad_b log p(g | b)`, projected
//!   back onto the simplex
//! - **Hybrid**: convex blend of both, with optional temporal
//!   smoothing toward the previous belief
//!
//! The optional attention layer scores historical features against the
//! belief's expected feature and replaces the raw input with the
//! attended mixture. The hierarchical variant stacks one updater per
//! level with bottom-up evidence and top-down prior adjustment.

use std::collections::VecDeque;

use ax_common::{Error, Result};
use ax_config::{PipelineMode, PipelineSettings};
use ax_math::{cosine_similarity, floor_and_renormalize, softmax, Matrix};

use crate::belief::Belief;
use crate::inference::{Engine, InferenceContext, Observation};
use crate::model::DiscreteModel;

/// Maps a graph feature vector to a soft observation over classes.
#[derive(Debug, Clone)]
pub enum ObservationMap {
    /// Gaussian prototypes: `p(o | g) ∝ exp(-|g - proto_o|^2 / 2 sigma^2)`.
    Prototype {
        /// One row per observation class, `feature_dim` columns.
        prototypes: Matrix,
        noise: f64,
    },
    /// Learned linear mapping: logits = `weights * g`.
    Linear {
        /// `O x feature_dim` weights.
        weights: Matrix,
    },
}

impl ObservationMap {
    pub fn feature_dim(&self) -> usize {
        match self {
            ObservationMap::Prototype { prototypes, .. } => prototypes.cols(),
            ObservationMap::Linear { weights } => weights.cols(),
        }
    }

    pub fn classes(&self) -> usize {
        match self {
            ObservationMap::Prototype { prototypes, .. } => prototypes.rows(),
            ObservationMap::Linear { weights } => weights.rows(),
        }
    }

    /// Soft observation distribution for a feature vector.
    pub fn observe(&self, feature: &[f64]) -> Result<Vec<f64>> {
        if feature.len() != self.feature_dim() {
            return Err(Error::DimensionMismatch {
                expected: format!("feature of length {}", self.feature_dim()),
                actual: format!("length {}", feature.len()),
            });
        }
        let logits: Vec<f64> = match self {
            ObservationMap::Prototype { prototypes, noise } => {
                let var = noise.max(1e-6);
                (0..prototypes.rows())
                    .map(|o| {
                        let row = prototypes.row(o);
                        let dist: f64 = row
                            .iter()
                            .zip(feature.iter())
                            .map(|(p, g)| (g - p) * (g - p))
                            .sum();
                        -dist / (2.0 * var)
                    })
                    .collect()
            }
            ObservationMap::Linear { weights } => weights
                .matvec(feature)
                .expect("dimension checked above"),
        };
        Ok(softmax(&logits))
    }

    /// Expected feature under an observation distribution; used by the
    /// attention layer as the belief's query vector.
    pub fn expected_feature(&self, obs_dist: &[f64]) -> Vec<f64> {
        let dim = self.feature_dim();
        let mut out = vec![0.0; dim];
        match self {
            ObservationMap::Prototype { prototypes, .. } => {
                for (o, &w) in obs_dist.iter().enumerate().take(prototypes.rows()) {
                    for (i, p) in prototypes.row(o).iter().enumerate() {
                        out[i] += w * p;
                    }
                }
            }
            ObservationMap::Linear { weights } => {
                // Rows act as class directions; mix them by weight.
                for (o, &w) in obs_dist.iter().enumerate().take(weights.rows()) {
                    for (i, p) in weights.row(o).iter().enumerate() {
                        out[i] += w * p;
                    }
                }
            }
        }
        out
    }
}

/// Attention over historical graph features.
#[derive(Debug, Clone)]
struct AttentionLayer {
    history: VecDeque<Vec<f64>>,
    window: usize,
}

impl AttentionLayer {
    fn new(window: usize) -> Self {
        AttentionLayer {
            history: VecDeque::new(),
            window: window.max(1),
        }
    }

    /// Blend the history by similarity to the query; the current
    /// feature always participates.
    fn attend(&mut self, feature: &[f64], query: &[f64]) -> Vec<f64> {
        self.history.push_back(feature.to_vec());
        while self.history.len() > self.window {
            self.history.pop_front();
        }
        let scores: Vec<f64> = self
            .history
            .iter()
            .map(|h| cosine_similarity(h, query))
            .collect();
        let weights = softmax(&scores);
        let mut out = vec![0.0; feature.len()];
        for (h, &w) in self.history.iter().zip(weights.iter()) {
            for (i, x) in h.iter().enumerate() {
                out[i] += w * x;
            }
        }
        out
    }
}

/// Result of one pipeline pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineUpdate {
    pub belief: Belief,
    /// Propagated from the inference engine when it recovered from a
    /// degenerate soft observation.
    pub warning: Option<String>,
}

/// Single-level belief updater.
///
/// The inference engine is supplied per call so the pipeline fuses
/// through whichever §4.2 variant the run is configured with.
#[derive(Debug, Clone)]
pub struct BeliefUpdater {
    settings: PipelineSettings,
    map: ObservationMap,
    attention: Option<AttentionLayer>,
}

impl BeliefUpdater {
    pub fn new(settings: &PipelineSettings, map: ObservationMap) -> Self {
        let attention = settings
            .attention
            .then(|| AttentionLayer::new(settings.history_window));
        BeliefUpdater {
            settings: settings.clone(),
            map,
            attention,
        }
    }

    pub fn map(&self) -> &ObservationMap {
        &self.map
    }

    /// Fuse one graph feature into the belief.
    pub fn update(
        &mut self,
        model: &DiscreteModel,
        engine: &mut Engine,
        current: &Belief,
        feature: &[f64],
        action: Option<usize>,
        previous: Option<&Belief>,
    ) -> Result<PipelineUpdate> {
        let states = model.dims().states;
        let current_cat = current.to_categorical(states);

        let effective_feature = match self.attention.as_mut() {
            Some(attention) => {
                let obs_pred = model.predict_obs(&current_cat)?;
                let query = self.map.expected_feature(&obs_pred);
                attention.attend(feature, &query)
            }
            None => feature.to_vec(),
        };
        let soft_obs = self.map.observe(&effective_feature)?;

        let mut warning = None;
        let mut updated = match self.settings.mode {
            PipelineMode::Bayesian => self.bayesian_update(
                model,
                engine,
                &current_cat,
                &soft_obs,
                action,
                previous,
                &mut warning,
            )?,
            PipelineMode::Gradient => self.gradient_update(model, &current_cat, &soft_obs)?,
            PipelineMode::Hybrid => {
                let bayes = self.bayesian_update(
                    model,
                    engine,
                    &current_cat,
                    &soft_obs,
                    action,
                    previous,
                    &mut warning,
                )?;
                let grad = self.gradient_update(model, &current_cat, &soft_obs)?;
                let alpha = self.settings.hybrid_alpha;
                bayes
                    .iter()
                    .zip(grad.iter())
                    .map(|(b, g)| alpha * b + (1.0 - alpha) * g)
                    .collect()
            }
        };

        // Temporal smoothing toward the previous belief.
        if let Some(previous) = previous {
            let sigma = self.settings.temporal_smoothing;
            let prev_cat = previous.to_categorical(states);
            for (b, p) in updated.iter_mut().zip(prev_cat.iter()) {
                *b = sigma * *b + (1.0 - sigma) * p;
            }
        }

        if !floor_and_renormalize(&mut updated) {
            return Ok(PipelineUpdate {
                belief: Belief::uniform(states),
                warning: Some("degenerate-observation: fused belief lost all mass".into()),
            });
        }
        Ok(PipelineUpdate {
            belief: Belief::Categorical { probs: updated },
            warning,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn bayesian_update(
        &mut self,
        model: &DiscreteModel,
        engine: &mut Engine,
        current: &[f64],
        soft_obs: &[f64],
        action: Option<usize>,
        previous: Option<&Belief>,
        warning: &mut Option<String>,
    ) -> Result<Vec<f64>> {
        let prior = Belief::Categorical {
            probs: current.to_vec(),
        };
        let ctx = match (previous, action) {
            (Some(prev), Some(action)) => InferenceContext {
                previous_belief: Some(prev),
                action: Some(action),
            },
            _ => InferenceContext::default(),
        };
        let out = engine.infer(
            model,
            &Observation::Distribution(soft_obs.to_vec()),
            Some(&prior),
            ctx,
        )?;
        if out.warning.is_some() {
            *warning = out.warning;
        }
        Ok(out.belief.to_categorical(model.dims().states))
    }

    /// `b <- b + eta * grad_b log p(g | b)`, with
    /// `p(g | b) = sum_s b_s * p(g | s)` and the per-state likelihood
    /// marginalized through `A`.
    fn gradient_update(
        &self,
        model: &DiscreteModel,
        current: &[f64],
        soft_obs: &[f64],
    ) -> Result<Vec<f64>> {
        let states = model.dims().states;
        let mut state_lik = vec![0.0; states];
        for (o, &w) in soft_obs.iter().enumerate() {
            if w > 0.0 {
                for (s, l) in model.likelihood(o)?.iter().enumerate() {
                    state_lik[s] += w * l;
                }
            }
        }
        let marginal: f64 = current
            .iter()
            .zip(state_lik.iter())
            .map(|(b, l)| b * l)
            .sum();
        if marginal <= 0.0 {
            return Ok(current.to_vec());
        }
        let eta = self.settings.gradient_rate;
        let mut out: Vec<f64> = current
            .iter()
            .zip(state_lik.iter())
            .map(|(b, l)| (b + eta * l / marginal).max(0.0))
            .collect();
        if !floor_and_renormalize(&mut out) {
            return Ok(current.to_vec());
        }
        Ok(out)
    }
}

/// One updater per level; evidence flows bottom-up, priors top-down.
///
/// Models are supplied per call (one per level) so online parameter
/// learning on the caller's model is always visible to the hierarchy.
pub struct HierarchicalUpdater {
    updaters: Vec<BeliefUpdater>,
    /// `coupling[i]` maps level `i+1` beliefs down to level `i` states:
    /// an `S_i x S_{i+1}` non-negative matrix.
    coupling: Vec<Matrix>,
    top_down: f64,
}

impl HierarchicalUpdater {
    pub fn new(updaters: Vec<BeliefUpdater>, coupling: Vec<Matrix>, top_down: f64) -> Result<Self> {
        if updaters.is_empty() {
            return Err(Error::Config("hierarchy needs at least one level".into()));
        }
        if coupling.len() + 1 != updaters.len() {
            return Err(Error::Config(format!(
                "{} levels need {} coupling matrices, got {}",
                updaters.len(),
                updaters.len() - 1,
                coupling.len()
            )));
        }
        Ok(HierarchicalUpdater {
            updaters,
            coupling,
            top_down: top_down.clamp(0.0, 1.0),
        })
    }

    pub fn depth(&self) -> usize {
        self.updaters.len()
    }

    /// Run one hierarchical pass.
    ///
    /// Bottom-up: each level fuses its own feature; the next level up
    /// receives the fused posterior as its feature vector. Top-down:
    /// each level's belief is multiplied by the coupled projection of
    /// the level above and renormalized.
    pub fn update(
        &mut self,
        models: &[&DiscreteModel],
        engine: &mut Engine,
        beliefs: &[Belief],
        features_per_level: &[Vec<f64>],
    ) -> Result<Vec<Belief>> {
        if beliefs.len() != self.updaters.len() || models.len() != self.updaters.len() {
            return Err(Error::DimensionMismatch {
                expected: format!("{} beliefs and models", self.updaters.len()),
                actual: format!("{} beliefs, {} models", beliefs.len(), models.len()),
            });
        }

        // Bottom-up sweep.
        let mut updated: Vec<Belief> = Vec::with_capacity(self.updaters.len());
        let mut carried: Option<Vec<f64>> = None;
        for (i, updater) in self.updaters.iter_mut().enumerate() {
            let own = features_per_level.get(i).cloned().unwrap_or_default();
            let feature = match carried.take() {
                Some(mut evidence) => {
                    evidence.resize(updater.map.feature_dim(), 0.0);
                    evidence
                }
                None => own,
            };
            let out = updater.update(
                models[i],
                engine,
                &beliefs[i],
                &feature,
                None,
                Some(&beliefs[i]),
            )?;
            carried = Some(out.belief.to_categorical(models[i].dims().states));
            updated.push(out.belief);
        }

        // Top-down sweep: prior adjustment from the level above.
        for i in (0..self.updaters.len().saturating_sub(1)).rev() {
            let states = models[i].dims().states;
            let above = updated[i + 1].to_categorical(models[i + 1].dims().states);
            let projected = self.coupling[i]
                .matvec(&above)
                .ok_or_else(|| Error::DimensionMismatch {
                    expected: format!(
                        "coupling of shape {}x{}",
                        states,
                        models[i + 1].dims().states
                    ),
                    actual: format!(
                        "{}x{}",
                        self.coupling[i].rows(),
                        self.coupling[i].cols()
                    ),
                })?;
            let own = updated[i].to_categorical(states);
            let mut adjusted: Vec<f64> = own
                .iter()
                .zip(projected.iter())
                .map(|(b, p)| b * (1.0 - self.top_down + self.top_down * p.max(0.0)))
                .collect();
            if floor_and_renormalize(&mut adjusted) {
                updated[i] = Belief::Categorical { probs: adjusted };
            }
        }

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::discrete::fixtures::corridor;
    use ax_config::InferenceSettings;

    fn prototype_map() -> ObservationMap {
        // Three observation classes with 2-d prototypes at the corners.
        ObservationMap::Prototype {
            prototypes: Matrix::from_rows(&[
                vec![0.0, 0.0],
                vec![1.0, 0.0],
                vec![0.0, 1.0],
            ])
            .unwrap(),
            noise: 0.05,
        }
    }

    fn engine() -> Engine {
        Engine::from_settings(&InferenceSettings::default(), 0)
    }

    fn updater(mode: PipelineMode) -> BeliefUpdater {
        let settings = PipelineSettings {
            mode,
            temporal_smoothing: 1.0,
            ..PipelineSettings::default()
        };
        BeliefUpdater::new(&settings, prototype_map())
    }

    #[test]
    fn observe_prefers_the_nearest_prototype() {
        let map = prototype_map();
        let obs = map.observe(&[0.95, 0.02]).unwrap();
        assert!(obs[1] > 0.9);
    }

    #[test]
    fn observe_rejects_wrong_arity() {
        let map = prototype_map();
        assert!(map.observe(&[1.0]).is_err());
    }

    #[test]
    fn bayesian_update_moves_mass_toward_evidence() {
        let model = corridor();
        let mut updater = updater(PipelineMode::Bayesian);
        // Feature near prototype 1 implies observation 1, likeliest
        // from state 1.
        let out = updater
            .update(&model, &mut engine(), &Belief::uniform(4), &[1.0, 0.0], None, None)
            .unwrap();
        let probs = out.belief.to_categorical(4);
        assert!(probs[1] > probs[0]);
        assert!(out.belief.is_normalized(1e-9));
        assert!(out.warning.is_none());
    }

    #[test]
    fn gradient_update_stays_on_the_simplex() {
        let model = corridor();
        let mut updater = updater(PipelineMode::Gradient);
        let out = updater
            .update(&model, &mut engine(), &Belief::uniform(4), &[0.0, 1.0], None, None)
            .unwrap();
        assert!(out.belief.is_normalized(1e-9));
    }

    #[test]
    fn hybrid_sits_between_the_two_modes() {
        let model = corridor();
        let feature = [1.0, 0.0];
        let bayes = updater(PipelineMode::Bayesian)
            .update(&model, &mut engine(), &Belief::uniform(4), &feature, None, None)
            .unwrap()
            .belief
            .to_categorical(4);
        let grad = updater(PipelineMode::Gradient)
            .update(&model, &mut engine(), &Belief::uniform(4), &feature, None, None)
            .unwrap()
            .belief
            .to_categorical(4);
        let hybrid = updater(PipelineMode::Hybrid)
            .update(&model, &mut engine(), &Belief::uniform(4), &feature, None, None)
            .unwrap()
            .belief
            .to_categorical(4);
        let lo = bayes[1].min(grad[1]) - 1e-9;
        let hi = bayes[1].max(grad[1]) + 1e-9;
        assert!(hybrid[1] >= lo && hybrid[1] <= hi);
    }

    #[test]
    fn temporal_smoothing_pulls_toward_previous() {
        let model = corridor();
        let settings = PipelineSettings {
            mode: PipelineMode::Bayesian,
            temporal_smoothing: 0.1,
            ..PipelineSettings::default()
        };
        let mut updater = BeliefUpdater::new(&settings, prototype_map());
        let previous = Belief::categorical(vec![0.97, 0.01, 0.01, 0.01]).unwrap();
        let out = updater
            .update(
                &model,
                &mut engine(),
                &Belief::uniform(4),
                &[1.0, 0.0],
                None,
                Some(&previous),
            )
            .unwrap();
        let probs = out.belief.to_categorical(4);
        // sigma = 0.1 keeps 90% of the previous belief.
        assert!(probs[0] > 0.8);
    }

    #[test]
    fn attention_keeps_updates_normalized() {
        let model = corridor();
        let settings = PipelineSettings {
            mode: PipelineMode::Bayesian,
            attention: true,
            history_window: 4,
            temporal_smoothing: 1.0,
            ..PipelineSettings::default()
        };
        let mut updater = BeliefUpdater::new(&settings, prototype_map());
        let mut eng = engine();
        let mut belief = Belief::uniform(4);
        for i in 0..6 {
            let feature = if i % 2 == 0 { [1.0, 0.0] } else { [0.0, 1.0] };
            belief = updater
                .update(&model, &mut eng, &belief, &feature, None, None)
                .unwrap()
                .belief;
            assert!(belief.is_normalized(1e-9));
        }
    }

    #[test]
    fn hierarchy_rejects_mismatched_coupling() {
        let updaters = vec![
            updater(PipelineMode::Bayesian),
            updater(PipelineMode::Bayesian),
        ];
        assert!(HierarchicalUpdater::new(updaters, vec![], 0.5).is_err());
    }

    #[test]
    fn hierarchy_runs_bottom_up_and_top_down() {
        let model = corridor();
        let updaters = vec![
            updater(PipelineMode::Bayesian),
            updater(PipelineMode::Bayesian),
        ];
        // Identity coupling between two same-sized levels.
        let mut eye = Matrix::zeros(4, 4);
        for i in 0..4 {
            eye.set(i, i, 1.0);
        }
        let mut hier = HierarchicalUpdater::new(updaters, vec![eye], 0.5).unwrap();
        let out = hier
            .update(
                &[&model, &model],
                &mut engine(),
                &[Belief::uniform(4), Belief::uniform(4)],
                &[vec![1.0, 0.0], vec![0.0, 0.0]],
            )
            .unwrap();
        assert_eq!(out.len(), 2);
        for b in out {
            assert!(b.is_normalized(1e-9));
        }
    }
}
