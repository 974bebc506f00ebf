use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::core::identity::IdentityError;
use crate::forge::CatalogError;
use crate::git::ops::GitCommandError;

/// Fatal, pre-flight failures. Any of these aborts the run before a
/// repository is touched.
#[derive(Debug, Error)]
pub enum GithaulError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("local root {}: {reason}", path.display())]
    LocalRoot { path: PathBuf, reason: String },
    #[error("ssh access to git@{alias} could not be verified for user '{user}': {detail}")]
    SshUnverified {
        alias: String,
        user: String,
        detail: String,
    },
    #[error("git error: {0}")]
    Git(#[source] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, GithaulError>;

/// Failures isolated to a single repository. They are recorded in that
/// repository's `ActionResult` and never abort sibling work.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RepoFailure {
    #[error("{} is not a usable repository: {reason}", path.display())]
    LocalCorrupt { path: PathBuf, reason: String },
    #[error(
        "cannot fast-forward {}: local is {ahead} ahead and {behind} behind {upstream}",
        path.display()
    )]
    NonFastForward {
        path: PathBuf,
        upstream: String,
        ahead: usize,
        behind: usize,
    },
    #[error("{} changed since it was probed: {reason}", path.display())]
    StalePrecondition { path: PathBuf, reason: String },
    #[error("{operation} in {} timed out after {seconds}s", path.display())]
    OperationTimedOut {
        path: PathBuf,
        operation: String,
        seconds: u64,
    },
    #[error("{operation} in {} failed: {detail}", path.display())]
    GitFailed {
        path: PathBuf,
        operation: String,
        detail: String,
    },
}

impl RepoFailure {
    pub fn from_command(path: impl Into<PathBuf>, err: GitCommandError) -> Self {
        let path = path.into();
        match err {
            GitCommandError::TimedOut { command, timeout } => RepoFailure::OperationTimedOut {
                path,
                operation: format!("git {command}"),
                seconds: timeout.as_secs(),
            },
            GitCommandError::Failed { command, stderr, code } => RepoFailure::GitFailed {
                path,
                operation: format!("git {command}"),
                detail: if stderr.is_empty() {
                    format!("exited with {code}")
                } else {
                    format!("exited with {code}: {stderr}")
                },
            },
            GitCommandError::Spawn { command, source } => RepoFailure::GitFailed {
                path,
                operation: format!("git {command}"),
                detail: format!("could not start git: {source}"),
            },
            GitCommandError::UnexpectedOutput { command, output } => RepoFailure::GitFailed {
                path,
                operation: format!("git {command}"),
                detail: format!("unexpected output '{output}'"),
            },
        }
    }

    /// Map an error from the gix-backed helpers. A git subprocess failure
    /// inside keeps its own kind, so timeouts stay `OperationTimedOut`.
    pub fn from_git(path: impl Into<PathBuf>, operation: &str, err: GithaulError) -> Self {
        let path = path.into();
        let detail = match err {
            GithaulError::Git(source) => match source.downcast::<GitCommandError>() {
                Ok(command) => return RepoFailure::from_command(path, command),
                Err(source) => source.to_string(),
            },
            other => other.to_string(),
        };
        RepoFailure::GitFailed {
            path,
            operation: operation.to_string(),
            detail,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RepoFailure::LocalCorrupt { .. } => "LocalCorrupt",
            RepoFailure::NonFastForward { .. } => "NonFastForward",
            RepoFailure::StalePrecondition { .. } => "StalePrecondition",
            RepoFailure::OperationTimedOut { .. } => "OperationTimedOut",
            RepoFailure::GitFailed { .. } => "GitFailed",
        }
    }
}
