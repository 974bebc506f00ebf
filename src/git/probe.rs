use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::core::repo::{LocalProbe, RemoteRepo, SubmoduleState};
use crate::error::RepoFailure;
use crate::git::ops::{
    commit_age_days, current_branch, declared_submodules, divergence, fetch_remote, head_commit,
    open_repo, repo_status, Divergence, OpenRepo,
};

#[derive(Debug, Clone, Copy)]
pub struct ProbeOptions {
    /// Fetch before comparing with the upstream so behind counts are
    /// current. Only remote-tracking refs change.
    pub refresh_remote: bool,
    pub timeout: Duration,
}

pub fn local_path(remote: &RemoteRepo, root: &Path) -> PathBuf {
    root.join(remote.name.as_str())
}

pub fn probe_repo(
    remote: &RemoteRepo,
    root: &Path,
    options: &ProbeOptions,
) -> Result<LocalProbe, RepoFailure> {
    probe_path(local_path(remote, root), options)
}

pub fn probe_path(path: PathBuf, options: &ProbeOptions) -> Result<LocalProbe, RepoFailure> {
    match fs::symlink_metadata(&path) {
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(LocalProbe::absent(path)),
        Err(err) => return Err(corrupt(&path, format!("cannot inspect path: {err}"))),
    }

    let open = open_checked(&path)?;

    let status = repo_status(&open.repo)
        .map_err(|err| corrupt(&path, format!("cannot read working tree status: {err}")))?;
    let is_dirty = status.is_dirty();
    let has_conflict_markers = status.has_conflict_markers();
    if is_dirty || has_conflict_markers {
        debug!(path = %path.display(), status = %status.describe(), "working tree not clean");
    }

    let branch = current_branch(&open.repo)
        .map_err(|err| corrupt(&path, format!("cannot read HEAD: {err}")))?;
    let head = head_commit(&open.repo);

    let mut probe = LocalProbe {
        local_path: path.clone(),
        exists: true,
        current_branch: branch,
        head,
        upstream: None,
        ahead_count: 0,
        behind_count: 0,
        upstream_age_days: None,
        is_dirty,
        has_conflict_markers,
        submodule_states: Vec::new(),
    };

    match compare_with_upstream(open, &probe, options) {
        Ok(Some(found)) => {
            if found.behind > 0 {
                probe.upstream_age_days =
                    commit_age_days(&path, &found.upstream_id, options.timeout);
            }
            probe.upstream = Some(found.upstream);
            probe.ahead_count = found.ahead;
            probe.behind_count = found.behind;
        }
        Ok(None) => {}
        // Dirty or conflicted trees are reported as such whatever the
        // upstream says.
        Err(failure) if is_dirty || has_conflict_markers => {
            warn!(path = %path.display(), %failure, "upstream comparison skipped for unclean repository");
        }
        Err(failure) => return Err(failure),
    }

    probe.submodule_states = submodule_states(&path, options.timeout)?;
    Ok(probe)
}

/// Open `path` and insist it is the root of a non-bare repository.
pub(crate) fn open_checked(path: &Path) -> Result<OpenRepo, RepoFailure> {
    if !path.is_dir() {
        return Err(corrupt(path, "exists but is not a directory"));
    }
    if !path.join(".git").exists() {
        return Err(corrupt(path, "no .git found, not a repository root"));
    }

    let open = open_repo(path).map_err(|err| corrupt(path, err.to_string()))?;
    match open.repo.workdir() {
        Some(workdir) if same_dir(workdir, path) => Ok(open),
        Some(workdir) => Err(corrupt(
            path,
            format!("repository worktree is {}", workdir.display()),
        )),
        None => Err(corrupt(path, "repository is bare")),
    }
}

fn compare_with_upstream(
    open: OpenRepo,
    probe: &LocalProbe,
    options: &ProbeOptions,
) -> Result<Option<Divergence>, RepoFailure> {
    if probe.current_branch.is_none() || probe.head.is_none() {
        return Ok(None);
    }

    let open = if options.refresh_remote {
        fetch_remote(&open.path, options.timeout)
            .map_err(|err| RepoFailure::from_command(&open.path, err))?;
        // Reopen so ref lookups see what the fetch wrote.
        open_repo(&open.path).map_err(|err| corrupt(&open.path, err.to_string()))?
    } else {
        open
    };

    divergence(&open, options.timeout)
        .map_err(|err| RepoFailure::from_git(&open.path, "compare with upstream", err))
}

fn submodule_states(path: &Path, timeout: Duration) -> Result<Vec<SubmoduleState>, RepoFailure> {
    let declared = declared_submodules(path, timeout)
        .map_err(|err| RepoFailure::from_git(path, "read .gitmodules", err))?;

    Ok(declared
        .into_iter()
        .map(|submodule| {
            let initialized = path.join(&submodule).join(".git").exists();
            SubmoduleState {
                path: submodule,
                initialized,
            }
        })
        .collect())
}

fn same_dir(left: &Path, right: &Path) -> bool {
    match (left.canonicalize(), right.canonicalize()) {
        (Ok(left), Ok(right)) => left == right,
        _ => left == right,
    }
}

fn corrupt(path: &Path, reason: impl Into<String>) -> RepoFailure {
    RepoFailure::LocalCorrupt {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}
