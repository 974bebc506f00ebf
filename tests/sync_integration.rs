use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;
use std::time::Duration;

use githaul::core::plan::{ActionResult, ClassifiedRepo, Operation};
use githaul::core::repo::{RemoteRepo, RepoName, Visibility};
use githaul::core::status::StatusCategory;
use githaul::core::{Identity, IdentityError};
use githaul::engine::{AssumeYes, ConsentSource, DeclineAll, Engine, EngineOptions, RunRequest, RunSummary};
use githaul::error::{GithaulError, RepoFailure};
use githaul::forge::{Catalog, CatalogError};
use githaul::report::Renderer;
use githaul::util::ssh::SkipSshVerification;
use tempfile::TempDir;

struct LocalCatalog {
    repos: Vec<RemoteRepo>,
    calls: AtomicUsize,
}

impl LocalCatalog {
    fn new(repos: Vec<RemoteRepo>) -> Self {
        Self {
            repos,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Catalog for LocalCatalog {
    fn list_repos(&self, identity: &Identity) -> Result<Vec<RemoteRepo>, CatalogError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.repos.is_empty() {
            return Err(CatalogError::CatalogEmpty {
                owner: identity.owner().to_string(),
            });
        }
        Ok(self.repos.clone())
    }
}

struct Quiet;

impl Renderer for Quiet {
    fn pre_action(&self, _identity: &Identity, _repos: &[ClassifiedRepo]) {}
    fn consent_table(&self, _category: StatusCategory, _repos: &[&ClassifiedRepo]) {}
    fn results(&self, _results: &[ActionResult]) {}
    fn post_action(&self, _repos: &[ClassifiedRepo]) {}
}

/// Answers per category; anything unlisted is declined.
struct PerCategory(Vec<(StatusCategory, bool)>);

impl ConsentSource for PerCategory {
    fn decide(&mut self, category: StatusCategory, _prompt: &str) -> Option<bool> {
        Some(
            self.0
                .iter()
                .any(|(approved, answer)| *approved == category && *answer),
        )
    }
}

/// Runs `change` when the first question is asked, then approves
/// everything. The change lands between probing and dispatch.
struct ChangeThenApprove<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> ConsentSource for ChangeThenApprove<F> {
    fn decide(&mut self, _category: StatusCategory, _prompt: &str) -> Option<bool> {
        if let Some(change) = self.0.take() {
            change();
        }
        Some(true)
    }
}

static GIT_ENV: Once = Once::new();

/// Local submodule URLs need the file transport allowed. SSH never
/// answers, so an `ssh://` remote hangs until the timeout kills it.
fn configure_git_env() {
    GIT_ENV.call_once(|| {
        std::env::set_var("GIT_CONFIG_COUNT", "1");
        std::env::set_var("GIT_CONFIG_KEY_0", "protocol.file.allow");
        std::env::set_var("GIT_CONFIG_VALUE_0", "always");
        std::env::set_var("GIT_SSH_COMMAND", "sleep 10; :");
    });
}

const HUNG_URL: &str = "ssh://git@hung.invalid/acme/hung.git";

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        configure_git_env();
        let dir = TempDir::new().expect("temp dir");
        for sub in ["sources", "remotes", "root"] {
            fs::create_dir_all(dir.path().join(sub)).expect("create fixture dir");
        }
        Self { dir }
    }

    fn root(&self) -> PathBuf {
        self.dir.path().join("root")
    }

    fn source(&self, name: &str) -> PathBuf {
        self.dir.path().join("sources").join(name)
    }

    fn bare(&self, name: &str) -> PathBuf {
        self.dir.path().join("remotes").join(format!("{name}.git"))
    }

    /// A bare remote with one commit on `main`, plus the working source it
    /// was made from.
    fn remote(&self, name: &str) -> RemoteRepo {
        let source = self.source(name);
        fs::create_dir_all(&source).expect("create source");
        fs::write(source.join("README.md"), format!("{name}\n")).expect("write README");
        init_git_repo(&source, "initial");
        run_git(&source, &["branch", "-M", "main"]);
        run_git(
            self.dir.path(),
            &[
                "clone",
                "--quiet",
                "--bare",
                path_str(&source),
                path_str(&self.bare(name)),
            ],
        );

        RemoteRepo {
            name: RepoName::new(name),
            default_branch: "main".to_string(),
            has_submodules: false,
            clone_url: format!("file://{}", self.bare(name).display()),
            visibility: Visibility::Public,
        }
    }

    /// Push `count` new commits from the source to the bare remote.
    fn advance(&self, name: &str, count: usize) {
        let source = self.source(name);
        let existing: usize = git_output(&source, &["rev-list", "--count", "HEAD"])
            .parse()
            .expect("commit count");
        for index in existing..existing + count {
            fs::write(source.join(format!("change-{index}.txt")), "change\n").expect("write change");
            run_git(&source, &["add", "-A"]);
            run_git(&source, &["commit", "--quiet", "-m", &format!("change {index}")]);
        }
        run_git(&source, &["push", "--quiet", path_str(&self.bare(name)), "main"]);
    }

    /// `name` with `lib` registered as a submodule at `vendor/lib`,
    /// pushed to its bare remote.
    fn with_submodule(&self, name: &str, lib: &str) -> RemoteRepo {
        let remote = self.remote(name);
        let lib_url = self.remote(lib).clone_url;
        let source = self.source(name);
        run_git(&source, &["submodule", "--quiet", "add", &lib_url, "vendor/lib"]);
        run_git(&source, &["commit", "--quiet", "-m", "add lib submodule"]);
        run_git(&source, &["push", "--quiet", path_str(&self.bare(name)), "main"]);
        RemoteRepo {
            has_submodules: true,
            ..remote
        }
    }

    fn clone_locally(&self, repo: &RemoteRepo) -> PathBuf {
        let dest = self.root().join(repo.name.as_str());
        run_git(
            &self.root(),
            &["clone", "--quiet", &repo.clone_url, path_str(&dest)],
        );
        configure_identity(&dest);
        dest
    }

    fn run(
        &self,
        catalog: &LocalCatalog,
        consent: &mut dyn ConsentSource,
    ) -> Result<RunSummary, GithaulError> {
        self.run_as(catalog, consent, "acme:matt@github-work", None)
    }

    fn run_as(
        &self,
        catalog: &LocalCatalog,
        consent: &mut dyn ConsentSource,
        identity: &str,
        org: Option<&str>,
    ) -> Result<RunSummary, GithaulError> {
        self.run_with(catalog, consent, identity, org, Duration::from_secs(60))
    }

    fn run_with(
        &self,
        catalog: &LocalCatalog,
        consent: &mut dyn ConsentSource,
        identity: &str,
        org: Option<&str>,
        timeout: Duration,
    ) -> Result<RunSummary, GithaulError> {
        let options = EngineOptions {
            jobs: Some(2),
            timeout,
            refresh_remote: true,
            show_progress: false,
        };
        let mut engine = Engine::new(catalog, &SkipSshVerification, consent, &Quiet, options);
        engine.run(&RunRequest {
            identity: identity.to_string(),
            org: org.map(str::to_string),
            local_root: self.root(),
        })
    }
}

fn category_of(summary: &RunSummary, name: &str) -> Option<StatusCategory> {
    summary
        .pre_action
        .iter()
        .find(|repo| repo.remote.name.as_str() == name)
        .and_then(ClassifiedRepo::category)
}

fn result_for<'a>(summary: &'a RunSummary, name: &str) -> &'a ActionResult {
    summary
        .results
        .iter()
        .find(|result| result.repo_name.as_str() == name)
        .unwrap_or_else(|| panic!("no result for {name}"))
}

fn post_category_of(summary: &RunSummary, name: &str) -> Option<StatusCategory> {
    summary
        .post_action
        .iter()
        .find(|repo| repo.remote.name.as_str() == name)
        .and_then(ClassifiedRepo::category)
}

#[test]
fn clones_missing_repository_on_its_default_branch() {
    let fixture = Fixture::new();
    let catalog = LocalCatalog::new(vec![fixture.remote("widgets")]);

    let summary = fixture.run(&catalog, &mut AssumeYes).expect("run");

    assert_eq!(category_of(&summary, "widgets"), Some(StatusCategory::NotPresent));
    assert_eq!(summary.results.len(), 1);
    let result = &summary.results[0];
    assert_eq!(result.repo_name.as_str(), "widgets");
    assert_eq!(result.operation, Operation::Clone);
    assert!(result.succeeded, "clone failed: {:?}", result.error_detail);

    let local = fixture.root().join("widgets");
    assert!(local.join(".git").exists());
    assert_eq!(git_output(&local, &["rev-parse", "--abbrev-ref", "HEAD"]), "main");
    assert_eq!(post_category_of(&summary, "widgets"), Some(StatusCategory::UpToDate));
    assert_eq!(summary.exit_code(), 0);
}

#[test]
fn fast_forwards_exactly_the_missing_commits() {
    let fixture = Fixture::new();
    let remote = fixture.remote("widgets");
    let local = fixture.clone_locally(&remote);
    let before = git_output(&local, &["rev-parse", "HEAD"]);
    fixture.advance("widgets", 3);
    let upstream = git_output(&fixture.bare("widgets"), &["rev-parse", "main"]);
    let catalog = LocalCatalog::new(vec![remote]);

    let summary = fixture.run(&catalog, &mut AssumeYes).expect("run");

    assert_eq!(category_of(&summary, "widgets"), Some(StatusCategory::BehindOnly));
    let probe = summary.pre_action[0].probe().expect("probed");
    assert_eq!(probe.behind_count, 3);
    assert_eq!(probe.ahead_count, 0);
    assert_eq!(probe.head.as_deref(), Some(before.as_str()));

    let result = &summary.results[0];
    assert_eq!(result.operation, Operation::FastForward);
    assert!(result.succeeded, "fast-forward failed: {:?}", result.error_detail);
    assert_eq!(result.commits_advanced, Some(3));
    assert_eq!(git_output(&local, &["rev-parse", "HEAD"]), upstream);
    assert_eq!(post_category_of(&summary, "widgets"), Some(StatusCategory::UpToDate));
}

#[test]
fn declining_a_category_leaves_it_untouched() {
    let fixture = Fixture::new();
    let missing = fixture.remote("widgets");
    let behind = fixture.remote("gadgets");
    let local = fixture.clone_locally(&behind);
    let before = git_output(&local, &["rev-parse", "HEAD"]);
    fixture.advance("gadgets", 2);
    let catalog = LocalCatalog::new(vec![missing, behind]);

    let mut consent = PerCategory(vec![(StatusCategory::BehindOnly, true)]);
    let summary = fixture.run(&catalog, &mut consent).expect("run");

    assert!(!fixture.root().join("widgets").exists());
    assert!(summary
        .results
        .iter()
        .all(|result| result.repo_name.as_str() != "widgets"));
    assert_eq!(summary.approved.len(), 1);
    assert_eq!(summary.approved[0].0, StatusCategory::BehindOnly);
    assert_ne!(git_output(&local, &["rev-parse", "HEAD"]), before);
}

#[test]
fn declining_everything_changes_nothing() {
    let fixture = Fixture::new();
    let remote = fixture.remote("widgets");
    let local = fixture.clone_locally(&remote);
    let before = git_output(&local, &["rev-parse", "HEAD"]);
    fixture.advance("widgets", 1);
    let catalog = LocalCatalog::new(vec![remote, fixture.remote("gadgets")]);

    let summary = fixture.run(&catalog, &mut DeclineAll).expect("run");

    assert!(summary.approved.is_empty());
    assert!(summary.results.is_empty());
    assert!(!fixture.root().join("gadgets").exists());
    assert_eq!(git_output(&local, &["rev-parse", "HEAD"]), before);
    assert_eq!(summary.exit_code(), 0);
}

#[test]
fn second_run_has_nothing_to_do() {
    let fixture = Fixture::new();
    let catalog = LocalCatalog::new(vec![fixture.remote("widgets"), fixture.remote("gadgets")]);

    let first = fixture.run(&catalog, &mut AssumeYes).expect("first run");
    assert!(first.results.iter().all(|result| result.succeeded));

    let second = fixture.run(&catalog, &mut AssumeYes).expect("second run");
    assert!(second.approved.is_empty());
    assert!(second.results.is_empty());
    assert!(second
        .pre_action
        .iter()
        .all(|repo| repo.category() == Some(StatusCategory::UpToDate)));
}

#[test]
fn dirty_repository_is_reported_not_updated() {
    let fixture = Fixture::new();
    let remote = fixture.remote("widgets");
    let local = fixture.clone_locally(&remote);
    let before = git_output(&local, &["rev-parse", "HEAD"]);
    fixture.advance("widgets", 2);
    fs::write(local.join("README.md"), "work in progress\n").expect("edit tracked file");
    let catalog = LocalCatalog::new(vec![remote]);

    let summary = fixture.run(&catalog, &mut AssumeYes).expect("run");

    assert_eq!(
        category_of(&summary, "widgets"),
        Some(StatusCategory::DirtyOrConflicted)
    );
    let result = &summary.results[0];
    assert_eq!(result.operation, Operation::ReportOnly);
    assert!(result.succeeded);
    assert_eq!(git_output(&local, &["rev-parse", "HEAD"]), before);
    assert_eq!(
        fs::read_to_string(local.join("README.md")).expect("read README"),
        "work in progress\n"
    );
}

#[test]
fn diverged_repository_is_reported_not_updated() {
    let fixture = Fixture::new();
    let remote = fixture.remote("widgets");
    let local = fixture.clone_locally(&remote);
    fixture.advance("widgets", 1);
    fs::write(local.join("local.txt"), "local\n").expect("write local change");
    run_git(&local, &["add", "-A"]);
    run_git(&local, &["commit", "--quiet", "-m", "local change"]);
    let before = git_output(&local, &["rev-parse", "HEAD"]);
    let catalog = LocalCatalog::new(vec![remote]);

    let summary = fixture.run(&catalog, &mut AssumeYes).expect("run");

    assert_eq!(
        category_of(&summary, "widgets"),
        Some(StatusCategory::AheadOrDiverged)
    );
    let probe = summary.pre_action[0].probe().expect("probed");
    assert_eq!((probe.ahead_count, probe.behind_count), (1, 1));
    assert_eq!(summary.results[0].operation, Operation::ReportOnly);
    assert_eq!(git_output(&local, &["rev-parse", "HEAD"]), before);
}

#[test]
fn lists_declared_but_uninitialized_submodules() {
    let fixture = Fixture::new();
    let remote = fixture.remote("widgets");
    let source = fixture.source("widgets");
    fs::write(
        source.join(".gitmodules"),
        "[submodule \"vendor/lib\"]\n\tpath = vendor/lib\n\turl = ../lib.git\n",
    )
    .expect("write .gitmodules");
    run_git(&source, &["add", "-A"]);
    run_git(&source, &["commit", "--quiet", "-m", "declare submodule"]);
    run_git(&source, &["push", "--quiet", path_str(&fixture.bare("widgets")), "main"]);
    fixture.clone_locally(&remote);
    let catalog = LocalCatalog::new(vec![remote]);

    let summary = fixture.run(&catalog, &mut DeclineAll).expect("run");

    let probe = summary.pre_action[0].probe().expect("probed");
    assert_eq!(probe.submodule_states.len(), 1);
    assert_eq!(probe.submodule_states[0].path, PathBuf::from("vendor/lib"));
    assert!(!probe.submodule_states[0].initialized);
}

#[test]
fn corrupt_local_path_fails_only_that_repository() {
    let fixture = Fixture::new();
    let broken = fixture.remote("widgets");
    let healthy = fixture.remote("gadgets");
    let path = fixture.root().join("widgets");
    fs::create_dir_all(&path).expect("create plain dir");
    fs::write(path.join("README.md"), "not a checkout\n").expect("write file");
    let catalog = LocalCatalog::new(vec![broken, healthy]);

    let summary = fixture.run(&catalog, &mut AssumeYes).expect("run");

    let failed: Vec<&ActionResult> = summary.results.iter().filter(|result| !result.succeeded).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].repo_name.as_str(), "widgets");
    assert_eq!(failed[0].operation, Operation::Probe);
    assert!(matches!(failed[0].failure, Some(RepoFailure::LocalCorrupt { .. })));
    assert!(fixture.root().join("gadgets").join(".git").exists());
    assert_eq!(summary.exit_code(), 2);
}

#[test]
fn org_mismatch_stops_before_the_catalog() {
    let fixture = Fixture::new();
    let catalog = LocalCatalog::new(vec![fixture.remote("widgets")]);

    let err = fixture
        .run_as(&catalog, &mut AssumeYes, "Beta:matt@github-work", Some("Alpha"))
        .unwrap_err();

    match err {
        GithaulError::Identity(IdentityError::IdentityMismatch { flag, embedded }) => {
            assert_eq!(flag, "Alpha");
            assert_eq!(embedded, "Beta");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(catalog.calls.load(Ordering::SeqCst), 0);
    assert!(!fixture.root().join("widgets").exists());
}

#[test]
fn empty_catalog_is_not_fatal() {
    let fixture = Fixture::new();
    let catalog = LocalCatalog::new(Vec::new());

    let summary = fixture.run(&catalog, &mut AssumeYes).expect("run");

    assert!(summary.pre_action.is_empty());
    assert!(summary.results.is_empty());
    assert_eq!(summary.exit_code(), 0);
}

#[test]
fn rewritten_upstream_is_not_forced_onto_the_local_branch() {
    let fixture = Fixture::new();
    let remote = fixture.remote("widgets");
    fixture.advance("widgets", 1);
    let local = fixture.clone_locally(&remote);
    let before = git_output(&local, &["rev-parse", "HEAD"]);
    fixture.advance("widgets", 1);
    let catalog = LocalCatalog::new(vec![remote]);

    let source = fixture.source("widgets");
    let bare = fixture.bare("widgets");
    let mut consent = ChangeThenApprove(Some(move || {
        run_git(&source, &["reset", "--quiet", "--hard", "HEAD~2"]);
        fs::write(source.join("rewritten.txt"), "rewritten\n").expect("write rewrite");
        run_git(&source, &["add", "-A"]);
        run_git(&source, &["commit", "--quiet", "-m", "rewritten history"]);
        run_git(&source, &["push", "--quiet", "--force", path_str(&bare), "main"]);
    }));
    let summary = fixture.run(&catalog, &mut consent).expect("run");

    assert_eq!(category_of(&summary, "widgets"), Some(StatusCategory::BehindOnly));
    let result = result_for(&summary, "widgets");
    assert_eq!(result.operation, Operation::FastForward);
    assert!(!result.succeeded);
    match &result.failure {
        Some(RepoFailure::NonFastForward { ahead, behind, .. }) => {
            assert_eq!((*ahead, *behind), (1, 1));
        }
        other => panic!("expected a non-fast-forward failure, got {other:?}"),
    }
    assert_eq!(git_output(&local, &["rev-parse", "HEAD"]), before);
    assert_eq!(summary.exit_code(), 2);
}

#[test]
fn changes_after_probing_are_not_overwritten() {
    let fixture = Fixture::new();
    let dirty_remote = fixture.remote("widgets");
    let moved_remote = fixture.remote("gadgets");
    let dirty = fixture.clone_locally(&dirty_remote);
    let moved = fixture.clone_locally(&moved_remote);
    fixture.advance("widgets", 1);
    fixture.advance("gadgets", 1);
    let dirty_head = git_output(&dirty, &["rev-parse", "HEAD"]);
    let catalog = LocalCatalog::new(vec![dirty_remote, moved_remote]);

    let (edit, commit) = (dirty.clone(), moved.clone());
    let mut consent = ChangeThenApprove(Some(move || {
        fs::write(edit.join("README.md"), "edited mid-run\n").expect("edit README");
        run_git(&commit, &["commit", "--quiet", "--allow-empty", "-m", "local work"]);
    }));
    let summary = fixture.run(&catalog, &mut consent).expect("run");

    for name in ["widgets", "gadgets"] {
        assert_eq!(category_of(&summary, name), Some(StatusCategory::BehindOnly));
        let result = result_for(&summary, name);
        assert!(!result.succeeded, "{name} should not have been updated");
        assert!(
            matches!(result.failure, Some(RepoFailure::StalePrecondition { .. })),
            "{name}: {:?}",
            result.failure
        );
    }
    assert_eq!(git_output(&dirty, &["rev-parse", "HEAD"]), dirty_head);
    assert_eq!(
        fs::read_to_string(dirty.join("README.md")).expect("read README"),
        "edited mid-run\n"
    );
    assert_eq!(git_output(&moved, &["log", "-1", "--format=%s"]), "local work");
    assert_eq!(summary.exit_code(), 2);
}

#[test]
fn hung_remote_times_out_without_blocking_others() {
    let fixture = Fixture::new();
    let healthy = fixture.remote("widgets");
    let hung = RemoteRepo {
        name: RepoName::new("hung"),
        default_branch: "main".to_string(),
        has_submodules: false,
        clone_url: HUNG_URL.to_string(),
        visibility: Visibility::Private,
    };
    let catalog = LocalCatalog::new(vec![hung, healthy]);

    let summary = fixture
        .run_with(
            &catalog,
            &mut AssumeYes,
            "acme:matt@github-work",
            None,
            Duration::from_secs(3),
        )
        .expect("run");

    let hung = result_for(&summary, "hung");
    assert_eq!(hung.operation, Operation::Clone);
    assert!(
        matches!(hung.failure, Some(RepoFailure::OperationTimedOut { seconds: 3, .. })),
        "{:?}",
        hung.failure
    );
    assert!(!fixture.root().join("hung").exists());

    let healthy = result_for(&summary, "widgets");
    assert!(healthy.succeeded, "clone failed: {:?}", healthy.error_detail);
    assert!(fixture.root().join("widgets").join(".git").exists());
    assert_eq!(post_category_of(&summary, "hung"), Some(StatusCategory::NotPresent));
    assert_eq!(summary.exit_code(), 2);
}

#[test]
fn cloning_initializes_declared_submodules() {
    let fixture = Fixture::new();
    let remote = fixture.with_submodule("widgets", "lib");
    let catalog = LocalCatalog::new(vec![remote]);

    let summary = fixture.run(&catalog, &mut AssumeYes).expect("run");

    let result = result_for(&summary, "widgets");
    assert!(result.succeeded, "clone failed: {:?}", result.error_detail);
    let local = fixture.root().join("widgets");
    assert!(local.join("vendor/lib/.git").exists());
    assert!(local.join("vendor/lib/README.md").is_file());

    assert_eq!(post_category_of(&summary, "widgets"), Some(StatusCategory::UpToDate));
    let probe = summary.post_action[0].probe().expect("re-probed");
    assert_eq!(probe.submodule_states.len(), 1);
    assert_eq!(probe.submodule_states[0].path, PathBuf::from("vendor/lib"));
    assert!(probe.submodule_states[0].initialized);
}

#[test]
fn fast_forward_moves_submodules_with_their_gitlink() {
    let fixture = Fixture::new();
    let remote = fixture.with_submodule("widgets", "lib");
    let catalog = LocalCatalog::new(vec![remote]);
    let first = fixture.run(&catalog, &mut AssumeYes).expect("first run");
    assert!(first.results.iter().all(|result| result.succeeded));

    fixture.advance("lib", 1);
    let lib_tip = git_output(&fixture.bare("lib"), &["rev-parse", "main"]);
    let source = fixture.source("widgets");
    let checkout = source.join("vendor/lib");
    run_git(&checkout, &["fetch", "--quiet", "origin"]);
    run_git(&checkout, &["checkout", "--quiet", &lib_tip]);
    run_git(&source, &["add", "vendor/lib"]);
    run_git(&source, &["commit", "--quiet", "-m", "bump lib"]);
    run_git(&source, &["push", "--quiet", path_str(&fixture.bare("widgets")), "main"]);

    let second = fixture.run(&catalog, &mut AssumeYes).expect("second run");

    assert_eq!(category_of(&second, "widgets"), Some(StatusCategory::BehindOnly));
    let result = result_for(&second, "widgets");
    assert_eq!(result.operation, Operation::FastForward);
    assert!(result.succeeded, "fast-forward failed: {:?}", result.error_detail);
    assert!(result
        .note
        .as_deref()
        .is_some_and(|note| note.contains("submodules updated")));
    let local = fixture.root().join("widgets");
    assert_eq!(git_output(&local.join("vendor/lib"), &["rev-parse", "HEAD"]), lib_tip);
    assert_eq!(post_category_of(&second, "widgets"), Some(StatusCategory::UpToDate));

    let third = fixture.run(&catalog, &mut AssumeYes).expect("third run");
    assert_eq!(category_of(&third, "widgets"), Some(StatusCategory::UpToDate));
    assert!(third.results.is_empty());
}

#[test]
fn interrupted_merge_is_reported_as_conflicted() {
    let fixture = Fixture::new();
    let remote = fixture.remote("widgets");
    let local = fixture.clone_locally(&remote);

    let source = fixture.source("widgets");
    fs::write(source.join("README.md"), "upstream edit\n").expect("edit upstream README");
    run_git(&source, &["commit", "--quiet", "-am", "upstream edit"]);
    run_git(&source, &["push", "--quiet", path_str(&fixture.bare("widgets")), "main"]);

    fs::write(local.join("README.md"), "local edit\n").expect("edit local README");
    run_git(&local, &["commit", "--quiet", "-am", "local edit"]);
    run_git(&local, &["fetch", "--quiet"]);
    assert!(!try_git(&local, &["merge", "--quiet", "origin/main"]));
    assert!(local.join(".git/MERGE_HEAD").exists());
    let before = git_output(&local, &["rev-parse", "HEAD"]);
    let catalog = LocalCatalog::new(vec![remote]);

    let summary = fixture.run(&catalog, &mut AssumeYes).expect("run");

    assert_eq!(
        category_of(&summary, "widgets"),
        Some(StatusCategory::DirtyOrConflicted)
    );
    let probe = summary.pre_action[0].probe().expect("probed");
    assert!(probe.has_conflict_markers);
    let result = result_for(&summary, "widgets");
    assert_eq!(result.operation, Operation::ReportOnly);
    assert!(result.succeeded);
    assert!(result
        .note
        .as_deref()
        .is_some_and(|note| note.contains("conflicts")));
    assert!(local.join(".git/MERGE_HEAD").exists());
    assert_eq!(git_output(&local, &["rev-parse", "HEAD"]), before);
    assert_eq!(summary.exit_code(), 0);
}

fn init_git_repo(repo_path: &Path, message: &str) {
    run_git(repo_path, &["init", "--quiet"]);
    configure_identity(repo_path);
    run_git(repo_path, &["add", "-A"]);
    run_git(repo_path, &["commit", "--quiet", "-m", message]);
}

fn configure_identity(repo_path: &Path) {
    run_git(repo_path, &["config", "user.name", "Githaul Test"]);
    run_git(repo_path, &["config", "user.email", "githaul-test@example.com"]);
}

fn run_git(repo_path: &Path, args: &[&str]) {
    let output = Command::new("git")
        .current_dir(repo_path)
        .args(args)
        .output()
        .expect("run git command");
    assert!(
        output.status.success(),
        "git command failed in {}: git {}\nstderr:\n{}",
        repo_path.display(),
        args.join(" "),
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Like `run_git` but for commands expected to fail.
fn try_git(repo_path: &Path, args: &[&str]) -> bool {
    Command::new("git")
        .current_dir(repo_path)
        .args(args)
        .output()
        .expect("run git command")
        .status
        .success()
}

fn git_output(repo_path: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(repo_path)
        .args(args)
        .output()
        .expect("run git command");
    assert!(output.status.success(), "git {} failed", args.join(" "));
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("utf-8 path")
}
