use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use indicatif::ProgressBar;
use tracing::{debug, info, warn};

use crate::core::plan::{Action, ActionPlan, ActionResult, Operation, PlanItem, PlannedRepo};
use crate::core::status::StatusCategory;
use crate::error::RepoFailure;
use crate::git::ops::{
    clone_repo, count_commits, current_branch, divergence, fast_forward_to, fetch_remote,
    head_commit, head_is_ancestor_of, open_repo, repo_status, update_submodules, GitCommandError,
};
use crate::git::probe::open_checked;
use crate::util::parallel::run_in_parallel;

#[derive(Debug, Clone, Copy)]
pub struct DispatchOptions {
    pub jobs: Option<usize>,
    pub timeout: Duration,
}

/// Run every approved item on the worker pool. Each repository appears in
/// the plan once, so no two workers touch the same path.
pub fn dispatch(
    plan: ActionPlan,
    options: &DispatchOptions,
    progress: &ProgressBar,
) -> Vec<ActionResult> {
    let items = plan.into_items();
    info!(count = items.len(), "dispatching approved actions");
    run_in_parallel(items, options.jobs, |item| {
        progress.set_message(item.repo.name().to_string());
        let result = execute(&item, options.timeout);
        progress.inc(1);
        result
    })
}

pub fn execute(item: &PlanItem, timeout: Duration) -> ActionResult {
    let repo = &item.repo;
    let operation = item.action.operation();
    let outcome = match item.action {
        Action::Clone => clone_missing(repo, timeout),
        Action::FastForward => fast_forward(repo, timeout),
        Action::ReportOnly => Ok(ActionResult::success(
            repo.name().clone(),
            repo.probe.local_path.clone(),
            operation,
        )
        .with_note(report_note(item.category, repo))),
    };

    match outcome {
        Ok(result) => {
            debug!(repo = %repo.name(), %operation, "action succeeded");
            result
        }
        Err(failure) => {
            warn!(repo = %repo.name(), %operation, %failure, "action failed");
            ActionResult::failure(
                repo.name().clone(),
                repo.probe.local_path.clone(),
                operation,
                failure,
            )
        }
    }
}

fn clone_missing(repo: &PlannedRepo, timeout: Duration) -> Result<ActionResult, RepoFailure> {
    let path = repo.probe.local_path.as_path();
    ensure_still_absent(path)?;

    info!(repo = %repo.name(), url = %repo.remote.clone_url, "cloning");
    if let Err(err) = clone_repo(&repo.remote.clone_url, path, timeout) {
        if matches!(err, GitCommandError::TimedOut { .. }) {
            remove_partial_clone(path);
        }
        return Err(RepoFailure::from_command(path, err));
    }

    if path.join(".gitmodules").is_file() {
        info!(repo = %repo.name(), "initializing submodules");
        update_submodules(path, timeout).map_err(|err| RepoFailure::from_command(path, err))?;
    }

    let open = open_repo(path).map_err(|err| git_failed(path, "open fresh clone", err))?;
    let branch = current_branch(&open.repo).ok().flatten();
    let note = match branch {
        Some(branch) => format!("checked out {branch}"),
        None => "cloned with detached HEAD".to_string(),
    };
    Ok(ActionResult::success(repo.name().clone(), path.to_path_buf(), Operation::Clone).with_note(note))
}

fn ensure_still_absent(path: &Path) -> Result<(), RepoFailure> {
    match fs::symlink_metadata(path) {
        Ok(_) => Err(RepoFailure::StalePrecondition {
            path: path.to_path_buf(),
            reason: "path appeared after it was probed as missing".to_string(),
        }),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(RepoFailure::LocalCorrupt {
            path: path.to_path_buf(),
            reason: format!("cannot inspect path: {err}"),
        }),
    }
}

/// The guard saw nothing at `path`, so anything there now came from the
/// killed clone.
fn remove_partial_clone(path: &Path) {
    if !path.exists() {
        return;
    }
    match fs::remove_dir_all(path) {
        Ok(()) => debug!(path = %path.display(), "removed partial clone"),
        Err(err) => warn!(path = %path.display(), %err, "could not remove partial clone"),
    }
}

fn fast_forward(repo: &PlannedRepo, timeout: Duration) -> Result<ActionResult, RepoFailure> {
    let path = repo.probe.local_path.as_path();
    ensure_unchanged(repo)?;

    fetch_remote(path, timeout).map_err(|err| RepoFailure::from_command(path, err))?;
    let open = open_repo(path).map_err(|err| git_failed(path, "reopen after fetch", err))?;
    let upstream = divergence(&open, timeout)
        .map_err(|err| RepoFailure::from_git(path, "compare with upstream", err))?
        .ok_or_else(|| RepoFailure::StalePrecondition {
            path: path.to_path_buf(),
            reason: "branch no longer has an upstream".to_string(),
        })?;

    let result = ActionResult::success(repo.name().clone(), path.to_path_buf(), Operation::FastForward);
    if upstream.ahead == 0 && upstream.behind == 0 {
        return Ok(result
            .with_commits(0)
            .with_note(format!("already at {}", upstream.upstream)));
    }

    let reachable = upstream.ahead == 0
        && head_is_ancestor_of(&open, &upstream.upstream_id)
            .map_err(|err| RepoFailure::from_git(path, "check ancestry", err))?;
    if !reachable {
        return Err(RepoFailure::NonFastForward {
            path: path.to_path_buf(),
            upstream: upstream.upstream,
            ahead: upstream.ahead,
            behind: upstream.behind,
        });
    }

    let before = head_commit(&open.repo).unwrap_or_default();
    let commits = count_commits(path, &before, &upstream.upstream_id, timeout)
        .map_err(|err| RepoFailure::from_command(path, err))?;
    fast_forward_to(path, &upstream.upstream_id, timeout)
        .map_err(|err| RepoFailure::from_command(path, err))?;

    let after = open_repo(path)
        .ok()
        .and_then(|open| head_commit(&open.repo));
    if after.as_deref() != Some(upstream.upstream_id.as_str()) {
        return Err(RepoFailure::GitFailed {
            path: path.to_path_buf(),
            operation: "verify fast-forward".to_string(),
            detail: format!(
                "HEAD is {} instead of {}",
                after.as_deref().unwrap_or("unknown"),
                upstream.upstream_id
            ),
        });
    }

    let mut note = format!(
        "{} -> {} ({})",
        short_id(&before),
        upstream.upstream,
        short_id(&upstream.upstream_id)
    );
    // A moved gitlink leaves the submodule checkout behind the new HEAD.
    if path.join(".gitmodules").is_file() {
        info!(repo = %repo.name(), "updating submodules");
        update_submodules(path, timeout).map_err(|err| RepoFailure::from_command(path, err))?;
        note.push_str(", submodules updated");
    }

    info!(repo = %repo.name(), commits, upstream = %upstream.upstream, "fast-forwarded");
    Ok(result.with_commits(commits).with_note(note))
}

/// The repository must look exactly as it did when probed.
fn ensure_unchanged(repo: &PlannedRepo) -> Result<(), RepoFailure> {
    let path = repo.probe.local_path.as_path();
    let stale = |reason: String| RepoFailure::StalePrecondition {
        path: path.to_path_buf(),
        reason,
    };

    let open = open_checked(path).map_err(|failure| stale(format!("no longer opens: {failure}")))?;
    let status = repo_status(&open.repo).map_err(|err| git_failed(path, "read status", err))?;
    if status.is_dirty() || status.has_conflict_markers() {
        return Err(stale(format!(
            "working tree is no longer clean ({})",
            status.describe()
        )));
    }

    let branch = current_branch(&open.repo).map_err(|err| git_failed(path, "read HEAD", err))?;
    if branch != repo.probe.current_branch {
        return Err(stale(format!(
            "branch is {} but was {} when probed",
            branch.as_deref().unwrap_or("(detached)"),
            repo.probe.current_branch.as_deref().unwrap_or("(detached)")
        )));
    }

    let head = head_commit(&open.repo);
    if head != repo.probe.head {
        return Err(stale(format!(
            "HEAD moved from {} to {}",
            repo.probe.head.as_deref().map(short_id).unwrap_or("(none)"),
            head.as_deref().map(short_id).unwrap_or("(none)")
        )));
    }
    Ok(())
}

fn report_note(category: StatusCategory, repo: &PlannedRepo) -> String {
    let probe = &repo.probe;
    let upstream = probe.upstream.as_deref().unwrap_or("upstream");
    match category {
        StatusCategory::AheadOrDiverged => format!(
            "left untouched: {} ahead, {} behind {upstream}",
            probe.ahead_count, probe.behind_count
        ),
        StatusCategory::DirtyOrConflicted => {
            let state = if probe.has_conflict_markers {
                "conflicts or an interrupted operation"
            } else {
                "uncommitted changes"
            };
            if probe.behind_count > 0 {
                format!(
                    "left untouched: {state}; {} behind {upstream}",
                    probe.behind_count
                )
            } else {
                format!("left untouched: {state}")
            }
        }
        StatusCategory::NotPresent | StatusCategory::BehindOnly | StatusCategory::UpToDate => {
            category.label().to_lowercase()
        }
    }
}

fn git_failed(path: &Path, operation: &str, err: impl std::fmt::Display) -> RepoFailure {
    RepoFailure::GitFailed {
        path: path.to_path_buf(),
        operation: operation.to_string(),
        detail: err.to_string(),
    }
}

fn short_id(id: &str) -> &str {
    &id[..id.len().min(10)]
}
