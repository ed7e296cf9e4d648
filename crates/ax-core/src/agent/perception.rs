//! Perception and action mapping.
//!
//! Perception side: stimuli collapse into an observation vector with
//! one slot per modality (`O_total = sum of modality dims`, unused
//! slots zero-filled), which feeds the inference engine as a soft
//! observation. Action side: policy action indices map onto concrete
//! world actions through a fixed template table, so the model's `U`
//! selects a prefix of the canonical action repertoire.

use ax_common::AgentId;

use crate::world::{Action, MessageKind, Stimulus, StimulusKind};

/// Encodes stimuli into a soft observation over `O` classes.
#[derive(Debug, Clone)]
pub struct ObservationEncoder {
    observations: usize,
}

impl ObservationEncoder {
    pub fn new(observations: usize) -> Self {
        ObservationEncoder {
            observations: observations.max(1),
        }
    }

    /// Slot index for a modality; modalities beyond `O` share the last
    /// slot.
    fn slot(&self, kind: StimulusKind) -> usize {
        let index = StimulusKind::ALL
            .iter()
            .position(|k| *k == kind)
            .unwrap_or(0);
        index.min(self.observations - 1)
    }

    /// Observation vector: per-modality intensity, salience times
    /// confidence, maximum across that modality's stimuli.
    pub fn encode(&self, stimuli: &[Stimulus]) -> Vec<f64> {
        let mut out = vec![0.0; self.observations];
        for stimulus in stimuli {
            let slot = self.slot(stimulus.kind);
            let intensity =
                (stimulus.salience.clamp(0.0, 1.0)) * stimulus.confidence.clamp(0.0, 1.0);
            if intensity > out[slot] {
                out[slot] = intensity;
            }
        }
        out
    }

    /// Index of the dominant modality, if any stimulus registered.
    pub fn dominant(&self, encoded: &[f64]) -> Option<usize> {
        let (idx, &max) = encoded
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))?;
        (max > 0.0).then_some(idx)
    }
}

/// Maps policy action indices to world actions.
#[derive(Debug, Clone)]
pub struct ActionMapper {
    templates: Vec<Action>,
}

impl ActionMapper {
    /// The canonical repertoire, truncated to the model's `U`. Index 0
    /// is always `wait` so the degenerate-planner fallback maps
    /// cleanly.
    pub fn standard(actions: usize) -> Self {
        let canonical = vec![
            Action::Wait,
            Action::Observe,
            Action::Move { dx: 0, dy: 1 },
            Action::Move { dx: 0, dy: -1 },
            Action::Move { dx: 1, dy: 0 },
            Action::Move { dx: -1, dy: 0 },
            Action::Consume,
            Action::Interact { target: None },
            Action::Communicate {
                to: None,
                kind: MessageKind::Text,
                payload: serde_json::json!({}),
            },
        ];
        let take = actions.clamp(1, canonical.len());
        ActionMapper {
            templates: canonical.into_iter().take(take).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Concrete action for a policy index; out-of-range indices wait.
    pub fn action_for(&self, index: usize) -> Action {
        self.templates
            .get(index)
            .cloned()
            .unwrap_or(Action::Wait)
    }

    /// Index of the `observe` action when the repertoire has one.
    pub fn observe_index(&self) -> Option<usize> {
        self.templates
            .iter()
            .position(|a| matches!(a, Action::Observe))
    }

    /// Fill in the recipient for a communicate template.
    pub fn direct_message(&self, index: usize, to: AgentId, payload: serde_json::Value) -> Action {
        match self.action_for(index) {
            Action::Communicate { kind, .. } => Action::Communicate {
                to: Some(to),
                kind,
                payload,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stimulus(kind: StimulusKind, salience: f64, confidence: f64) -> Stimulus {
        Stimulus {
            kind,
            salience,
            confidence,
            payload: vec![],
            source: None,
        }
    }

    #[test]
    fn encoding_fills_modality_slots() {
        let encoder = ObservationEncoder::new(5);
        let encoded = encoder.encode(&[
            stimulus(StimulusKind::Visual, 0.8, 1.0),
            stimulus(StimulusKind::Internal, 0.4, 0.5),
        ]);
        assert_eq!(encoded.len(), 5);
        assert!((encoded[0] - 0.8).abs() < 1e-12);
        assert!((encoded[4] - 0.2).abs() < 1e-12);
        assert_eq!(encoded[1], 0.0);
    }

    #[test]
    fn strongest_stimulus_wins_a_slot() {
        let encoder = ObservationEncoder::new(5);
        let encoded = encoder.encode(&[
            stimulus(StimulusKind::Visual, 0.3, 1.0),
            stimulus(StimulusKind::Visual, 0.9, 1.0),
        ]);
        assert!((encoded[0] - 0.9).abs() < 1e-12);
    }

    #[test]
    fn small_models_share_the_last_slot() {
        let encoder = ObservationEncoder::new(3);
        let encoded = encoder.encode(&[
            stimulus(StimulusKind::Social, 0.5, 1.0),
            stimulus(StimulusKind::Internal, 0.9, 1.0),
        ]);
        // Both social and internal collapse onto slot 2.
        assert!((encoded[2] - 0.9).abs() < 1e-12);
    }

    #[test]
    fn dominant_requires_nonzero_intensity() {
        let encoder = ObservationEncoder::new(4);
        assert_eq!(encoder.dominant(&[0.0, 0.0, 0.0, 0.0]), None);
        assert_eq!(encoder.dominant(&[0.1, 0.7, 0.0, 0.0]), Some(1));
    }

    #[test]
    fn mapper_index_zero_is_wait() {
        let mapper = ActionMapper::standard(6);
        assert_eq!(mapper.action_for(0), Action::Wait);
        assert_eq!(mapper.len(), 6);
    }

    #[test]
    fn out_of_range_indices_wait() {
        let mapper = ActionMapper::standard(2);
        assert_eq!(mapper.action_for(99), Action::Wait);
    }

    #[test]
    fn observe_index_tracks_the_repertoire() {
        assert_eq!(ActionMapper::standard(6).observe_index(), Some(1));
        assert_eq!(ActionMapper::standard(1).observe_index(), None);
    }

    #[test]
    fn direct_message_fills_recipient() {
        let mapper = ActionMapper::standard(9);
        let action = mapper.direct_message(8, AgentId(7), serde_json::json!({"x": 1}));
        match action {
            Action::Communicate { to, .. } => assert_eq!(to, Some(AgentId(7))),
            other => panic!("expected communicate, got {other:?}"),
        }
    }
}
