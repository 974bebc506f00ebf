pub mod consent;
pub mod dispatch;

pub use consent::{build_plan, AssumeYes, ConsentSource, DeclineAll, LineConsent, TerminalConsent};
pub use dispatch::{dispatch, DispatchOptions};

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::core::identity::Identity;
use crate::core::plan::{ActionResult, ClassifiedRepo, Operation, ProbeOutcome};
use crate::core::repo::{RemoteRepo, RepoName};
use crate::core::status::StatusCategory;
use crate::error::{GithaulError, Result};
use crate::forge::{Catalog, CatalogError};
use crate::git::probe::{local_path, probe_repo, ProbeOptions};
use crate::report::Renderer;
use crate::util::parallel::run_in_parallel;
use crate::util::ssh::SshVerifier;

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub jobs: Option<usize>,
    pub timeout: Duration,
    /// Fetch before the pre-action probe. The post-action probe never does.
    pub refresh_remote: bool,
    pub show_progress: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            jobs: None,
            timeout: Duration::from_secs(120),
            refresh_remote: true,
            show_progress: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    /// `[ORG:]USER@SSH_ALIAS`
    pub identity: String,
    pub org: Option<String>,
    pub local_root: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub identity: Identity,
    pub pre_action: Vec<ClassifiedRepo>,
    /// Categories the user approved, with the repositories in each.
    pub approved: Vec<(StatusCategory, Vec<RepoName>)>,
    pub results: Vec<ActionResult>,
    pub post_action: Vec<ClassifiedRepo>,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.results.iter().filter(|result| !result.succeeded).count()
    }

    pub fn exit_code(&self) -> i32 {
        if self.failed() == 0 {
            0
        } else {
            2
        }
    }
}

/// The reconciliation pipeline. Every outside dependency is handed in, so
/// tests can run it against local remotes with scripted answers.
pub struct Engine<'a> {
    catalog: &'a dyn Catalog,
    ssh: &'a dyn SshVerifier,
    consent: &'a mut dyn ConsentSource,
    renderer: &'a dyn Renderer,
    options: EngineOptions,
}

impl<'a> Engine<'a> {
    pub fn new(
        catalog: &'a dyn Catalog,
        ssh: &'a dyn SshVerifier,
        consent: &'a mut dyn ConsentSource,
        renderer: &'a dyn Renderer,
        options: EngineOptions,
    ) -> Self {
        Self {
            catalog,
            ssh,
            consent,
            renderer,
            options,
        }
    }

    pub fn run(&mut self, request: &RunRequest) -> Result<RunSummary> {
        let identity = Identity::resolve(&request.identity, request.org.as_deref())?;
        info!(%identity, "identity resolved");

        let root = request.local_root.as_path();
        validate_root(root)?;
        self.ssh.verify(&identity)?;

        let remotes = match self.catalog.list_repos(&identity) {
            Ok(remotes) => remotes,
            Err(CatalogError::CatalogEmpty { owner }) => {
                warn!(%owner, "catalog lists no repositories");
                Vec::new()
            }
            Err(err) => return Err(err.into()),
        };
        info!(count = remotes.len(), "catalog fetched");

        let pre_action = self.probe_all(&remotes, root, self.options.refresh_remote, "probing");
        self.renderer.pre_action(&identity, &pre_action);

        let plan = build_plan(&pre_action, &mut *self.consent, self.renderer);
        let approved = plan
            .categories()
            .map(|category| (category, plan.names(category)))
            .collect();
        info!(actions = plan.len(), mutating = plan.mutating_len(), "consent resolved");

        let mut results = probe_failures(&pre_action);
        if !plan.is_empty() {
            let progress = self.progress(plan.len(), "updating");
            let options = DispatchOptions {
                jobs: self.options.jobs,
                timeout: self.options.timeout,
            };
            results.extend(dispatch(plan, &options, &progress));
            progress.finish_and_clear();
        }
        self.renderer.results(&results);

        let post_action = self.probe_all(&remotes, root, false, "re-checking");
        self.renderer.post_action(&post_action);

        Ok(RunSummary {
            identity,
            pre_action,
            approved,
            results,
            post_action,
        })
    }

    fn probe_all(
        &self,
        remotes: &[RemoteRepo],
        root: &Path,
        refresh_remote: bool,
        stage: &'static str,
    ) -> Vec<ClassifiedRepo> {
        let options = ProbeOptions {
            refresh_remote,
            timeout: self.options.timeout,
        };
        let progress = self.progress(remotes.len(), stage);
        let classified = run_in_parallel(remotes.to_vec(), self.options.jobs, |remote| {
            let path = local_path(&remote, root);
            let classified = match probe_repo(&remote, root, &options) {
                Ok(probe) => ClassifiedRepo::from_probe(remote, probe),
                Err(failure) => {
                    warn!(repo = %remote.name, %failure, "probe failed");
                    ClassifiedRepo::failed(remote, path, failure)
                }
            };
            progress.inc(1);
            classified
        });
        progress.finish_and_clear();
        classified
    }

    fn progress(&self, len: usize, stage: &'static str) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{prefix:>12} [{bar:30}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_prefix(stage);
        bar
    }
}

/// The root must already exist and accept new entries.
fn validate_root(path: &Path) -> Result<()> {
    let local_root = |reason: String| GithaulError::LocalRoot {
        path: path.to_path_buf(),
        reason,
    };

    let metadata = fs::metadata(path).map_err(|err| local_root(format!("cannot access: {err}")))?;
    if !metadata.is_dir() {
        return Err(local_root("is not a directory".to_string()));
    }

    let marker = path.join(format!(".githaul-write-check-{}", std::process::id()));
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&marker)
        .map_err(|err| local_root(format!("is not writable: {err}")))?;
    let _ = fs::remove_file(&marker);
    Ok(())
}

fn probe_failures(classified: &[ClassifiedRepo]) -> Vec<ActionResult> {
    classified
        .iter()
        .filter_map(|repo| match &repo.outcome {
            ProbeOutcome::Failed { failure } => Some(ActionResult::failure(
                repo.remote.name.clone(),
                repo.local_path.clone(),
                Operation::Probe,
                failure.clone(),
            )),
            ProbeOutcome::Classified { .. } => None,
        })
        .collect()
}
