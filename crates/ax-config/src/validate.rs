//! Configuration validation errors and semantic validation.

use thiserror::Error;

use crate::settings::Settings;

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("semantic validation failed: {0}")]
    Semantic(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::Io(_) => 60,
            ValidationError::Parse(_) => 61,
            ValidationError::Semantic(_) => 62,
            ValidationError::InvalidValue { .. } => 63,
        }
    }
}

/// Validate a settings document semantically, collecting every
/// violation rather than stopping at the first.
pub fn validate_settings(settings: &Settings) -> Result<(), Vec<ValidationError>> {
    let mut issues = Vec::new();

    let mut require = |ok: bool, field: &str, message: String| {
        if !ok {
            issues.push(ValidationError::InvalidValue {
                field: field.to_string(),
                message,
            });
        }
    };

    let inf = &settings.inference;
    require(
        !matches!(
            inf.algorithm,
            crate::settings::InferenceKind::GradientVi
                | crate::settings::InferenceKind::NaturalGradientVi
        ),
        "inference.algorithm",
        "gradient_vi and natural_gradient_vi are continuous-state engines; \
         discrete runs use vmp, belief_propagation, or particle_filter"
            .into(),
    );
    require(
        inf.convergence_threshold > 0.0,
        "inference.convergence_threshold",
        "must be positive".into(),
    );
    require(
        inf.max_iterations > 0,
        "inference.max_iterations",
        "must be at least 1".into(),
    );
    require(
        inf.num_particles > 1,
        "inference.num_particles",
        "must be at least 2".into(),
    );
    require(
        inf.learning_rate > 0.0 && inf.learning_rate <= 1.0,
        "inference.learning_rate",
        "must be in (0, 1]".into(),
    );

    let pol = &settings.policy;
    require(pol.horizon > 0, "policy.horizon", "must be at least 1".into());
    require(
        pol.epistemic_weight >= 0.0 && pol.pragmatic_weight >= 0.0,
        "policy.weights",
        "epistemic and pragmatic weights must be non-negative".into(),
    );
    require(
        pol.policy_precision > 0.0,
        "policy.policy_precision",
        "must be positive".into(),
    );
    require(
        (0.0..1.0).contains(&pol.prune_threshold),
        "policy.prune_threshold",
        "must be in [0, 1)".into(),
    );
    require(
        pol.num_samples > 0,
        "policy.num_samples",
        "must be at least 1".into(),
    );

    let plan = &settings.planning;
    require(
        plan.beam_width > 0,
        "planning.beam_width",
        "must be at least 1".into(),
    );
    require(
        plan.num_simulations > 0,
        "planning.num_simulations",
        "must be at least 1".into(),
    );
    require(
        plan.min_horizon >= 1 && plan.min_horizon <= plan.max_horizon,
        "planning.min_horizon",
        "must satisfy 1 <= min_horizon <= max_horizon".into(),
    );
    require(
        plan.discount > 0.0 && plan.discount <= 1.0,
        "planning.discount",
        "must be in (0, 1]".into(),
    );

    let prec = &settings.precision;
    require(
        prec.min > 0.0 && prec.min < prec.max,
        "precision.min",
        "must satisfy 0 < min < max".into(),
    );
    require(
        prec.window >= 2,
        "precision.window",
        "must be at least 2".into(),
    );
    require(
        (0.0..=1.0).contains(&prec.hierarchy_coupling),
        "precision.hierarchy_coupling",
        "must be in [0, 1]".into(),
    );
    require(
        prec.levels >= 1,
        "precision.levels",
        "must be at least 1".into(),
    );
    require(
        prec.learning_rate > 0.0 && prec.learning_rate <= 1.0,
        "precision.learning_rate",
        "must be in (0, 1]".into(),
    );

    let mem = &settings.memory;
    require(
        mem.working_capacity > 0 && mem.episodic_capacity > 0 && mem.longterm_capacity > 0,
        "memory.capacities",
        "all capacities must be at least 1".into(),
    );
    require(
        mem.consolidation_interval > 0,
        "memory.consolidation_interval",
        "must be at least 1".into(),
    );

    let pipe = &settings.pipeline;
    require(
        (0.0..=1.0).contains(&pipe.hybrid_alpha),
        "pipeline.hybrid_alpha",
        "must be in [0, 1]".into(),
    );
    require(
        (0.0..=1.0).contains(&pipe.temporal_smoothing),
        "pipeline.temporal_smoothing",
        "must be in [0, 1]".into(),
    );
    require(
        pipe.hierarchy_levels >= 1,
        "pipeline.hierarchy_levels",
        "must be at least 1".into(),
    );
    require(
        (0.0..=1.0).contains(&pipe.top_down),
        "pipeline.top_down",
        "must be in [0, 1]".into(),
    );

    for (i, entry) in settings.population.iter().enumerate() {
        let known = matches!(
            entry.preset.as_str(),
            "generic" | "explorer" | "merchant" | "guardian"
        );
        require(
            known,
            &format!("population[{i}].preset"),
            format!("unknown preset `{}`", entry.preset),
        );
        require(
            entry.count > 0,
            &format!("population[{i}].count"),
            "must be at least 1".into(),
        );
    }

    let world = &settings.world;
    require(
        world.width > 0 && world.height > 0,
        "world.dimensions",
        "width and height must be positive".into(),
    );
    require(
        (0.0..=1.0).contains(&world.resource_density)
            && (0.0..=1.0).contains(&world.danger_density),
        "world.densities",
        "densities must be in [0, 1]".into(),
    );

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}
