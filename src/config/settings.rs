use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub github: GithubSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncSettings {
    /// Worker pool size for probing and dispatch. Defaults to the
    /// available parallelism.
    #[serde(default)]
    pub jobs: Option<usize>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_true")]
    pub refresh_remote: bool,
    #[serde(default = "default_stale_after_days")]
    pub stale_after_days: u64,
}

impl SyncSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            jobs: None,
            timeout_secs: default_timeout_secs(),
            refresh_remote: true,
            stale_after_days: default_stale_after_days(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubSettings {
    #[serde(default = "default_api_host")]
    pub api_host: String,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_true")]
    pub detect_submodules: bool,
}

impl Default for GithubSettings {
    fn default() -> Self {
        Self {
            api_host: default_api_host(),
            token_env: default_token_env(),
            detect_submodules: true,
        }
    }
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_stale_after_days() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_api_host() -> String {
    "github.com".to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
