use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use gix::bstr::{BString, ByteSlice};
use gix::progress::Discard;
use gix::remote;
use gix::status::index_worktree::iter::Summary;
use thiserror::Error;
use tracing::debug;

use crate::error::{GithaulError, Result};
use crate::git::status::{in_progress_marker, StatusSummary};
use crate::util::process::{run_captured, ProcessError};

#[derive(Debug, Error)]
pub enum GitCommandError {
    #[error("git {command} timed out after {}s", timeout.as_secs())]
    TimedOut { command: String, timeout: Duration },
    #[error("git {command} exited with {code}: {stderr}")]
    Failed {
        command: String,
        code: String,
        stderr: String,
    },
    #[error("failed to run git {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("git {command} printed unexpected output '{output}'")]
    UnexpectedOutput { command: String, output: String },
}

pub struct OpenRepo {
    pub path: PathBuf,
    pub repo: gix::Repository,
}

/// Where HEAD stands relative to its upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Divergence {
    pub upstream: String,
    pub upstream_id: String,
    pub ahead: usize,
    pub behind: usize,
}

fn git_err<E>(err: E) -> GithaulError
where
    E: std::error::Error + Send + Sync + 'static,
{
    GithaulError::Git(anyhow::Error::new(err))
}

pub fn open_repo(path: &Path) -> Result<OpenRepo> {
    let repo = gix::open(path).map_err(git_err)?;
    Ok(OpenRepo {
        path: path.to_path_buf(),
        repo,
    })
}

pub fn repo_status(repo: &gix::Repository) -> Result<StatusSummary> {
    let platform = repo.status(Discard).map_err(git_err)?;
    let mut summary = StatusSummary::default();

    for item in platform.into_iter(Vec::new()).map_err(git_err)? {
        let item = item.map_err(git_err)?;
        match item {
            gix::status::Item::TreeIndex(tree_index) => {
                let path = PathBuf::from(tree_index.location().to_str_lossy().to_string());
                summary.staged.push(path);
            }
            gix::status::Item::IndexWorktree(index_item) => {
                let path = PathBuf::from(index_item.rela_path().to_str_lossy().to_string());
                match index_item.summary() {
                    Some(Summary::Added) | Some(Summary::IntentToAdd) => {
                        summary.untracked.push(path);
                    }
                    Some(Summary::Conflict) => {
                        summary.conflicts.push(path);
                    }
                    _ => {
                        summary.modified.push(path);
                    }
                }
            }
        }
    }

    summary.in_progress = in_progress_marker(repo.git_dir());
    Ok(summary)
}

/// Short name of the checked-out branch, or `None` when HEAD is detached.
pub fn current_branch(repo: &gix::Repository) -> Result<Option<String>> {
    let head = repo.head().map_err(git_err)?;
    if head.is_detached() {
        return Ok(None);
    }
    Ok(head
        .referent_name()
        .map(|name| name.shorten().to_str_lossy().into_owned()))
}

/// Commit HEAD points at; `None` for an unborn branch.
pub fn head_commit(repo: &gix::Repository) -> Option<String> {
    repo.head_id().ok().map(|id| id.detach().to_string())
}

/// Compare HEAD with its upstream. `Ok(None)` when HEAD has no upstream
/// ref to compare against.
pub fn divergence(open: &OpenRepo, timeout: Duration) -> Result<Option<Divergence>> {
    let remote_name = fetch_remote_name(&open.repo);
    let tracking = match tracking_ref_name_for_head(&open.repo, remote_name.as_deref())? {
        Some(tracking) => tracking,
        None => return Ok(None),
    };
    let tracking_name = tracking.to_str_lossy().to_string();

    let mut tracking_ref = match open
        .repo
        .try_find_reference(tracking.as_bstr())
        .map_err(git_err)?
    {
        Some(reference) => reference,
        None => return Ok(None),
    };
    let upstream_id = tracking_ref.peel_to_id().map_err(git_err)?.detach();

    let range = format!("HEAD...{upstream_id}");
    let counts = run_git(
        &open.path,
        &["rev-list", "--left-right", "--count", range.as_str()],
        timeout,
    )
    .map_err(git_err)?;
    let (ahead, behind) = parse_left_right(&counts).ok_or_else(|| {
        GithaulError::Git(anyhow::anyhow!(format!(
            "unexpected rev-list output '{}' in {}",
            counts,
            open.path.display()
        )))
    })?;

    Ok(Some(Divergence {
        upstream: short_ref_name(&tracking_name),
        upstream_id: upstream_id.to_string(),
        ahead,
        behind,
    }))
}

/// Whether HEAD can move to `target` by fast-forward alone.
pub fn head_is_ancestor_of(open: &OpenRepo, target: &str) -> Result<bool> {
    let local = open.repo.head_id().map_err(git_err)?.detach();
    let target = gix::ObjectId::from_hex(target.as_bytes()).map_err(git_err)?;
    if local == target {
        return Ok(true);
    }
    let base = open.repo.merge_base(local, target).map_err(git_err)?.detach();
    Ok(base == local)
}

/// Age in whole days of the commit `rev`, measured by committer time.
pub fn commit_age_days(dir: &Path, rev: &str, timeout: Duration) -> Option<u64> {
    let output = run_git(dir, &["log", "-1", "--format=%ct", rev], timeout).ok()?;
    let committed: u64 = output.trim().parse().ok()?;
    let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
    Some(now.saturating_sub(committed) / 86_400)
}

/// Paths declared in `.gitmodules`, in file order.
pub fn declared_submodules(dir: &Path, timeout: Duration) -> Result<Vec<PathBuf>> {
    if !dir.join(".gitmodules").is_file() {
        return Ok(Vec::new());
    }
    let output = run_git(
        dir,
        &[
            "config",
            "--file",
            ".gitmodules",
            "--get-regexp",
            r"^submodule\..*\.path$",
        ],
        timeout,
    );
    let output = match output {
        Ok(output) => output,
        // `git config --get-regexp` exits 1 when nothing matches.
        Err(GitCommandError::Failed { code, .. }) if code == "1" => return Ok(Vec::new()),
        Err(err) => return Err(GithaulError::Git(anyhow::Error::new(err))),
    };

    Ok(output
        .lines()
        .filter_map(|line| line.split_once(' '))
        .map(|(_, path)| PathBuf::from(path.trim()))
        .filter(|path| !path.as_os_str().is_empty())
        .collect())
}

pub fn clone_repo(
    url: &str,
    dest: &Path,
    timeout: Duration,
) -> std::result::Result<(), GitCommandError> {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    let dest = dest.to_string_lossy();
    run_git(
        parent,
        &["clone", "--quiet", "--", url, dest.as_ref()],
        timeout,
    )
    .map(|_| ())
}

/// Update remote-tracking refs only. Local branches and the worktree are
/// left alone.
pub fn fetch_remote(dir: &Path, timeout: Duration) -> std::result::Result<(), GitCommandError> {
    run_git(dir, &["fetch", "--quiet"], timeout).map(|_| ())
}

/// Move HEAD to exactly `target`, refusing anything but a fast-forward.
pub fn fast_forward_to(
    dir: &Path,
    target: &str,
    timeout: Duration,
) -> std::result::Result<(), GitCommandError> {
    run_git(dir, &["merge", "--ff-only", "--quiet", target], timeout).map(|_| ())
}

pub fn update_submodules(dir: &Path, timeout: Duration) -> std::result::Result<(), GitCommandError> {
    run_git(
        dir,
        &["submodule", "update", "--init", "--recursive"],
        timeout,
    )
    .map(|_| ())
}

pub fn count_commits(
    dir: &Path,
    from: &str,
    to: &str,
    timeout: Duration,
) -> std::result::Result<usize, GitCommandError> {
    let range = format!("{from}..{to}");
    let output = run_git(dir, &["rev-list", "--count", range.as_str()], timeout)?;
    parse_count(&output).ok_or_else(|| GitCommandError::UnexpectedOutput {
        command: format!("rev-list --count {range}"),
        output,
    })
}

/// Run git in `dir`, killing it once `timeout` elapses. Returns trimmed
/// stdout on success. Prompts are disabled so a missing credential fails
/// instead of hanging.
pub fn run_git(
    dir: &Path,
    args: &[&str],
    timeout: Duration,
) -> std::result::Result<String, GitCommandError> {
    let command = args.join(" ");
    debug!(dir = %dir.display(), %command, "git");

    let mut cmd = Command::new("git");
    cmd.args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0");
    if std::env::var_os("GIT_SSH_COMMAND").is_none() {
        cmd.env("GIT_SSH_COMMAND", "ssh -o BatchMode=yes");
    }

    let output = run_captured(&mut cmd, timeout).map_err(|err| match err {
        ProcessError::TimedOut(timeout) => GitCommandError::TimedOut {
            command: command.clone(),
            timeout,
        },
        ProcessError::Io(source) => GitCommandError::Spawn {
            command: command.clone(),
            source,
        },
    })?;

    if output.status.success() {
        return Ok(output.stdout.trim_end().to_string());
    }

    Err(GitCommandError::Failed {
        command,
        code: output.exit_code(),
        stderr: output.stderr.trim().to_string(),
    })
}

fn fetch_remote_name(repo: &gix::Repository) -> Option<String> {
    let remote = repo.find_fetch_remote(None).ok()?;
    remote
        .name()
        .and_then(|name| name.as_symbol())
        .map(|name| name.to_string())
}

fn tracking_ref_name_for_head(
    repo: &gix::Repository,
    remote_name: Option<&str>,
) -> Result<Option<BString>> {
    let head = repo.head().map_err(git_err)?;
    let head_ref = match head.referent_name() {
        Some(name) => name,
        None => return Ok(None),
    };

    if let Some(tracking) = repo
        .branch_remote_tracking_ref_name(head_ref, remote::Direction::Fetch)
        .transpose()
        .map_err(git_err)?
    {
        return Ok(Some(tracking.into_owned().into()));
    }

    let remote = match remote_name {
        Some(remote) => remote,
        None => return Ok(None),
    };
    let short = head_ref.shorten().to_str_lossy();
    Ok(Some(BString::from(format!(
        "refs/remotes/{remote}/{short}"
    ))))
}

fn short_ref_name(full: &str) -> String {
    full.strip_prefix("refs/remotes/")
        .or_else(|| full.strip_prefix("refs/heads/"))
        .unwrap_or(full)
        .to_string()
}

fn parse_count(output: &str) -> Option<usize> {
    output.trim().parse().ok()
}

fn parse_left_right(output: &str) -> Option<(usize, usize)> {
    let mut counts = output.split_whitespace();
    let left = counts.next()?.parse().ok()?;
    let right = counts.next()?.parse().ok()?;
    Some((left, right))
}
