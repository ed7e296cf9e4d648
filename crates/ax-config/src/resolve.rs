//! Configuration resolution and path discovery.
//!
//! Resolution order: CLI argument → `AXON_CONFIG` env var → XDG config
//! directory → built-in defaults. Individual scalar overrides (`SEED`,
//! `NUM_WORKERS`, `TICK_MS`) are applied on top of whichever document
//! was loaded.

use std::path::{Path, PathBuf};

use crate::settings::Settings;
use crate::validate::{ValidationError, ValidationResult};

/// Where the settings document was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via CLI argument.
    CliArgument,
    /// Set via the `AXON_CONFIG` environment variable.
    Environment,
    /// Found in the XDG config directory.
    XdgConfig,
    /// Using built-in defaults.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

const ENV_CONFIG_PATH: &str = "AXON_CONFIG";
const ENV_SEED: &str = "SEED";
const ENV_NUM_WORKERS: &str = "NUM_WORKERS";
const ENV_TICK_MS: &str = "TICK_MS";
const CONFIG_FILENAME: &str = "config.toml";
const APP_NAME: &str = "axon";

/// Load settings using the standard resolution order, then apply scalar
/// env overrides.
pub fn load_settings(cli_path: Option<&Path>) -> ValidationResult<(Settings, ConfigSource)> {
    let (mut settings, source) = match resolve_path(cli_path) {
        Some((path, source)) => (read_settings_file(&path)?, source),
        None => (Settings::default(), ConfigSource::BuiltinDefault),
    };
    apply_env_overrides(&mut settings)?;
    Ok((settings, source))
}

fn resolve_path(cli_path: Option<&Path>) -> Option<(PathBuf, ConfigSource)> {
    if let Some(path) = cli_path {
        return Some((path.to_path_buf(), ConfigSource::CliArgument));
    }
    if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
        if !path.is_empty() {
            return Some((PathBuf::from(path), ConfigSource::Environment));
        }
    }
    if let Some(dir) = dirs::config_dir() {
        let candidate = dir.join(APP_NAME).join(CONFIG_FILENAME);
        if candidate.is_file() {
            return Some((candidate, ConfigSource::XdgConfig));
        }
    }
    None
}

/// Read and parse a settings document from `path`.
pub fn read_settings_file(path: &Path) -> ValidationResult<Settings> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ValidationError::Io(format!("{}: {e}", path.display())))?;
    toml::from_str(&text).map_err(|e| ValidationError::Parse(format!("{}: {e}", path.display())))
}

/// Apply `SEED`, `NUM_WORKERS`, and `TICK_MS` env overrides in place.
pub fn apply_env_overrides(settings: &mut Settings) -> ValidationResult<()> {
    if let Some(seed) = parse_env_var::<u64>(ENV_SEED)? {
        settings.seed = seed;
    }
    if let Some(workers) = parse_env_var::<usize>(ENV_NUM_WORKERS)? {
        settings.scheduler.num_workers = workers;
    }
    if let Some(tick_ms) = parse_env_var::<u64>(ENV_TICK_MS)? {
        settings.scheduler.tick_ms = tick_ms;
    }
    Ok(())
}

fn parse_env_var<T: std::str::FromStr>(name: &str) -> ValidationResult<Option<T>> {
    match std::env::var(name) {
        Ok(raw) if !raw.is_empty() => {
            raw.parse::<T>()
                .map(Some)
                .map_err(|_| ValidationError::InvalidValue {
                    field: name.to_string(),
                    message: format!("cannot parse `{raw}`"),
                })
        }
        _ => Ok(None),
    }
}
