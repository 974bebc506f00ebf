use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RepoName(String);

impl RepoName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
    Internal,
}

impl Visibility {
    pub fn label(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::Internal => "internal",
        }
    }
}

/// One repository as listed by the catalog. Read-only for the rest of the
/// run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteRepo {
    pub name: RepoName,
    pub default_branch: String,
    pub has_submodules: bool,
    pub clone_url: String,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmoduleState {
    pub path: PathBuf,
    pub initialized: bool,
}

/// Snapshot of a repository's local counterpart, taken once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalProbe {
    pub local_path: PathBuf,
    pub exists: bool,
    pub current_branch: Option<String>,
    pub head: Option<String>,
    pub upstream: Option<String>,
    pub ahead_count: usize,
    pub behind_count: usize,
    pub upstream_age_days: Option<u64>,
    pub is_dirty: bool,
    pub has_conflict_markers: bool,
    pub submodule_states: Vec<SubmoduleState>,
}

impl LocalProbe {
    pub fn absent(local_path: PathBuf) -> Self {
        Self {
            local_path,
            exists: false,
            current_branch: None,
            head: None,
            upstream: None,
            ahead_count: 0,
            behind_count: 0,
            upstream_age_days: None,
            is_dirty: false,
            has_conflict_markers: false,
            submodule_states: Vec::new(),
        }
    }

    pub fn initialized_submodules(&self) -> usize {
        self.submodule_states
            .iter()
            .filter(|state| state.initialized)
            .count()
    }
}
