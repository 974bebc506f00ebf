use std::env;
use std::path::{Path, PathBuf};

use crate::config::{ConfigError, Result, Settings};

pub const CONFIG_ENV: &str = "GITHAUL_CONFIG";
pub const PARALLEL_ENV: &str = "GITHAUL_PARALLEL";
pub const TIMEOUT_ENV: &str = "GITHAUL_TIMEOUT";

/// Find the config file to load: an explicit path, then `$GITHAUL_CONFIG`,
/// then `<root>/.githaul/config.toml` when it exists. Explicitly named
/// files must exist.
pub fn locate_config(
    explicit: Option<PathBuf>,
    root: &Path,
) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        return require_file(path).map(Some);
    }

    if let Ok(path) = env::var(CONFIG_ENV) {
        return require_file(PathBuf::from(path)).map(Some);
    }

    let default_path = root.join(".githaul").join("config.toml");
    if default_path.is_file() {
        return Ok(Some(default_path));
    }

    Ok(None)
}

pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let path = match path {
        Some(path) => path,
        None => return Ok(Settings::default()),
    };
    if !path.is_file() {
        return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
    }

    let contents = std::fs::read_to_string(path)?;
    let settings: Settings = toml::from_str(&contents).map_err(|source| ConfigError::Toml {
        path: path.to_path_buf(),
        source,
    })?;
    validate(&settings)?;
    Ok(settings)
}

pub fn apply_env(settings: &mut Settings) -> Result<()> {
    apply_env_with(settings, |key| env::var(key).ok())
}

pub fn apply_env_with<F>(settings: &mut Settings, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(PARALLEL_ENV) {
        settings.sync.jobs = Some(parse_positive(PARALLEL_ENV, &value)? as usize);
    }
    if let Some(value) = lookup(TIMEOUT_ENV) {
        settings.sync.timeout_secs = parse_positive(TIMEOUT_ENV, &value)?;
    }
    Ok(())
}

/// Values given on the command line. They win over the environment and
/// the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub jobs: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub offline: bool,
    pub no_submodule_detect: bool,
}

pub fn apply_overrides(settings: &mut Settings, overrides: &Overrides) -> Result<()> {
    if let Some(jobs) = overrides.jobs {
        if jobs == 0 {
            return Err(invalid("--jobs", "0", "must be at least 1"));
        }
        settings.sync.jobs = Some(jobs);
    }
    if let Some(timeout) = overrides.timeout_secs {
        if timeout == 0 {
            return Err(invalid("--timeout", "0", "must be at least 1"));
        }
        settings.sync.timeout_secs = timeout;
    }
    if overrides.offline {
        settings.sync.refresh_remote = false;
    }
    if overrides.no_submodule_detect {
        settings.github.detect_submodules = false;
    }
    Ok(())
}

fn validate(settings: &Settings) -> Result<()> {
    if settings.sync.jobs == Some(0) {
        return Err(invalid("sync.jobs", "0", "must be at least 1"));
    }
    if settings.sync.timeout_secs == 0 {
        return Err(invalid("sync.timeout_secs", "0", "must be at least 1"));
    }
    if settings.github.token_env.trim().is_empty() {
        return Err(invalid("github.token_env", "", "must name an environment variable"));
    }
    Ok(())
}

fn parse_positive(key: &str, value: &str) -> Result<u64> {
    match value.trim().parse::<u64>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(invalid(key, value, "expected a positive integer")),
    }
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn require_file(path: PathBuf) -> Result<PathBuf> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(ConfigError::ConfigNotFound(path))
    }
}
