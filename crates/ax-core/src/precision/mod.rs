//! Precision control: inverse-variance weighting of prediction errors.
//!
//! Each observation modality owns one controller. The controller keeps
//! a sliding window of squared prediction errors, estimates volatility
//! as the window's variance-to-mean ratio, and relaxes its
//! log-precision toward `clamp(gain / (volatility + eps), min, max)`.
//! The hierarchical variant couples each level's target with the level
//! above through the coupling weight `c`.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use ax_common::{Error, Result};
use ax_config::PrecisionSettings;
use ax_math::EPS;

/// Single-modality precision controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecisionController {
    min: f64,
    max: f64,
    gain: f64,
    learning_rate: f64,
    momentum: f64,
    window: usize,
    log_precision: f64,
    /// Momentum carry on the log-precision step.
    velocity: f64,
    errors: VecDeque<f64>,
}

impl PrecisionController {
    pub fn new(settings: &PrecisionSettings) -> Result<Self> {
        if !(settings.min > 0.0 && settings.min < settings.max) {
            return Err(Error::Config(format!(
                "precision bounds must satisfy 0 < min < max, got [{}, {}]",
                settings.min, settings.max
            )));
        }
        // Start in the middle of the bounds, geometrically.
        let initial = (settings.min * settings.max).sqrt();
        Ok(PrecisionController {
            min: settings.min,
            max: settings.max,
            gain: settings.gain,
            learning_rate: settings.learning_rate,
            momentum: settings.momentum.clamp(0.0, 0.99),
            window: settings.window.max(2),
            log_precision: initial.ln(),
            velocity: 0.0,
            errors: VecDeque::new(),
        })
    }

    /// Current precision.
    pub fn precision(&self) -> f64 {
        self.log_precision.exp().clamp(self.min, self.max)
    }

    /// Volatility estimate over the error window: `Var / (mean + eps)`.
    pub fn volatility(&self) -> f64 {
        let n = self.errors.len();
        if n < 2 {
            return 0.0;
        }
        let mean: f64 = self.errors.iter().sum::<f64>() / n as f64;
        let var: f64 = self
            .errors
            .iter()
            .map(|e| (e - mean) * (e - mean))
            .sum::<f64>()
            / n as f64;
        var / (mean + EPS)
    }

    /// Target precision given the current window and the caller's
    /// expected uncertainty for this modality.
    pub fn target(&self, expected_uncertainty: f64) -> f64 {
        let spread = self.volatility() + expected_uncertainty.max(0.0);
        (self.gain / (spread + EPS)).clamp(self.min, self.max)
    }

    /// Record a prediction error and adapt. Returns the new precision.
    pub fn update(&mut self, prediction_error: f64, expected_uncertainty: f64) -> f64 {
        if prediction_error.is_finite() {
            self.errors.push_back(prediction_error * prediction_error);
            while self.errors.len() > self.window {
                self.errors.pop_front();
            }
        }
        let target = self.target(expected_uncertainty);
        self.step_toward(target)
    }

    /// Relax log-precision toward a target precision.
    pub fn step_toward(&mut self, target: f64) -> f64 {
        let target = target.clamp(self.min, self.max);
        let delta = self.learning_rate * (target.ln() - self.log_precision);
        self.velocity = self.momentum * self.velocity + delta;
        self.log_precision += self.velocity;
        self.log_precision = self
            .log_precision
            .clamp(self.min.ln(), self.max.ln());
        self.precision()
    }
}

/// One controller per observation modality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModalityPrecision {
    controllers: Vec<PrecisionController>,
}

impl ModalityPrecision {
    pub fn new(modalities: usize, settings: &PrecisionSettings) -> Result<Self> {
        let controller = PrecisionController::new(settings)?;
        Ok(ModalityPrecision {
            controllers: vec![controller; modalities.max(1)],
        })
    }

    pub fn modalities(&self) -> usize {
        self.controllers.len()
    }

    /// Current precision vector.
    pub fn precisions(&self) -> Vec<f64> {
        self.controllers.iter().map(|c| c.precision()).collect()
    }

    /// Update every modality with its error and expected uncertainty.
    ///
    /// Shorter inputs update a prefix of the modalities.
    pub fn update(&mut self, errors: &[f64], uncertainties: &[f64]) -> Vec<f64> {
        for (i, controller) in self.controllers.iter_mut().enumerate() {
            if let Some(&e) = errors.get(i) {
                let u = uncertainties.get(i).copied().unwrap_or(0.0);
                controller.update(e, u);
            }
        }
        self.precisions()
    }

    /// Mean precision across modalities, used to scale policy scores.
    pub fn mean_precision(&self) -> f64 {
        let sum: f64 = self.controllers.iter().map(|c| c.precision()).sum();
        sum / self.controllers.len() as f64
    }
}

/// Hierarchical controller: one level per depth, coupled top-down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchicalPrecision {
    levels: Vec<PrecisionController>,
    coupling: f64,
}

impl HierarchicalPrecision {
    pub fn new(depth: usize, settings: &PrecisionSettings) -> Result<Self> {
        let level = PrecisionController::new(settings)?;
        Ok(HierarchicalPrecision {
            levels: vec![level; depth.max(1)],
            coupling: settings.hierarchy_coupling.clamp(0.0, 1.0),
        })
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    pub fn precisions(&self) -> Vec<f64> {
        self.levels.iter().map(|c| c.precision()).collect()
    }

    /// Update every level bottom-up, then couple each level's target
    /// with the precision of the level above:
    /// `pi*_i = c * pi_{i+1} + (1 - c) * pi*_i`.
    pub fn update(&mut self, errors_per_level: &[f64]) -> Vec<f64> {
        // Top level first so lower levels couple against fresh values.
        for i in (0..self.levels.len()).rev() {
            let error = errors_per_level.get(i).copied().unwrap_or(0.0);
            let own_target = {
                let level = &mut self.levels[i];
                if error.is_finite() {
                    level.errors.push_back(error * error);
                    while level.errors.len() > level.window {
                        level.errors.pop_front();
                    }
                }
                level.target(0.0)
            };
            let target = match self.levels.get(i + 1) {
                Some(above) => {
                    self.coupling * above.precision() + (1.0 - self.coupling) * own_target
                }
                None => own_target,
            };
            self.levels[i].step_toward(target);
        }
        self.precisions()
    }
}
