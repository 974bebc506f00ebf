use std::env;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::Parser;
use tracing::debug;

use crate::config::{apply_env, apply_overrides, load_settings, locate_config, Overrides, Settings};
use crate::engine::{
    AssumeYes, ConsentSource, DeclineAll, Engine, EngineOptions, LineConsent, RunRequest,
    TerminalConsent,
};
use crate::error::Result;
use crate::forge::GitHubClient;
use crate::report::{ConsoleRenderer, JsonRenderer, Renderer};
use crate::util::parallel::default_jobs;
use crate::util::ssh::{SkipSshVerification, SshCommandVerifier, SshVerifier};
use crate::util::{logging, output};

#[derive(Parser, Debug)]
#[command(name = "githaul", version)]
#[command(
    about = "Audit and safely sync every repository of a GitHub user or organization over SSH",
    long_about = None
)]
pub struct Cli {
    /// USER@SSH_ALIAS or ORG:USER@SSH_ALIAS, e.g. matt@github-personal
    pub identity: String,
    /// Directory holding one checkout per repository
    pub local_root: PathBuf,
    /// Organization to sync; must match the one in the identity if both are given
    #[arg(long)]
    pub org: Option<String>,
    /// Approve every category without prompting
    #[arg(short = 'y', long, conflicts_with = "dry_run")]
    pub yes: bool,
    /// Report only; decline every category
    #[arg(short = 'n', long)]
    pub dry_run: bool,
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,
    /// Per git operation timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
    /// Compare against remote-tracking refs as they are, without fetching first
    #[arg(long)]
    pub offline: bool,
    #[arg(long)]
    pub json: bool,
    #[arg(long)]
    pub skip_ssh_check: bool,
    #[arg(long)]
    pub no_submodule_detect: bool,
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
    #[arg(short, long)]
    pub quiet: bool,
    #[arg(long)]
    pub no_color: bool,
}

pub fn run() {
    let cli = Cli::parse();
    if cli.no_color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }
    logging::init(cli.verbose, cli.quiet);

    match execute(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            output::error(&err.to_string());
            std::process::exit(1);
        }
    }
}

fn execute(cli: Cli) -> Result<i32> {
    let settings = resolve_settings(&cli)?;
    debug!(?settings, "settings resolved");

    let token = env::var(&settings.github.token_env).ok();
    let catalog = GitHubClient::new(settings.github.api_host.clone(), token)
        .with_submodule_detection(settings.github.detect_submodules);
    if !catalog.has_token() {
        debug!(
            token_env = %settings.github.token_env,
            "no API token; private repositories will not be listed"
        );
    }

    let ssh: Box<dyn SshVerifier> = if cli.skip_ssh_check {
        Box::new(SkipSshVerification)
    } else {
        Box::new(SshCommandVerifier::new(settings.sync.timeout()))
    };
    let renderer: Box<dyn Renderer> = if cli.json {
        Box::new(JsonRenderer::new(settings.sync.stale_after_days))
    } else {
        Box::new(ConsoleRenderer::new(settings.sync.stale_after_days))
    };
    let mut consent = consent_source(&cli);
    if cli.dry_run {
        output::info("Dry run: every category will be declined and nothing changed.");
    }

    let options = EngineOptions {
        jobs: Some(settings.sync.jobs.unwrap_or_else(default_jobs)),
        timeout: settings.sync.timeout(),
        refresh_remote: settings.sync.refresh_remote,
        show_progress: !cli.quiet && !cli.json && io::stderr().is_terminal(),
    };
    let request = RunRequest {
        identity: cli.identity,
        org: cli.org,
        local_root: cli.local_root,
    };

    let mut engine = Engine::new(
        &catalog,
        ssh.as_ref(),
        consent.as_mut(),
        renderer.as_ref(),
        options,
    );
    let summary = engine.run(&request)?;
    Ok(summary.exit_code())
}

fn resolve_settings(cli: &Cli) -> Result<Settings> {
    let path = locate_config(cli.config.clone(), &cli.local_root)?;
    let mut settings = load_settings(path.as_deref())?;
    apply_env(&mut settings)?;
    apply_overrides(
        &mut settings,
        &Overrides {
            jobs: cli.jobs,
            timeout_secs: cli.timeout,
            offline: cli.offline,
            no_submodule_detect: cli.no_submodule_detect,
        },
    )?;
    Ok(settings)
}

fn consent_source(cli: &Cli) -> Box<dyn ConsentSource> {
    if cli.yes {
        Box::new(AssumeYes)
    } else if cli.dry_run {
        Box::new(DeclineAll)
    } else if io::stdin().is_terminal() {
        Box::new(TerminalConsent)
    } else {
        Box::new(LineConsent::stdin())
    }
}
