use std::collections::BTreeMap;
use std::io::{self, BufRead, Stderr, StdinLock, Write};

use tracing::{debug, info, warn};

use crate::core::plan::{ActionPlan, ClassifiedRepo, PlannedRepo};
use crate::core::status::StatusCategory;
use crate::report::Renderer;
use crate::util::output;

const MAX_ATTEMPTS: usize = 3;

/// Where per-category yes/no decisions come from. `None` means no answer
/// could be obtained at all.
pub trait ConsentSource {
    fn decide(&mut self, category: StatusCategory, prompt: &str) -> Option<bool>;
}

/// Interactive prompt on the controlling terminal.
#[derive(Debug, Default)]
pub struct TerminalConsent;

impl ConsentSource for TerminalConsent {
    fn decide(&mut self, category: StatusCategory, prompt: &str) -> Option<bool> {
        match output::confirm(prompt) {
            Ok(answer) => Some(answer),
            Err(err) => {
                warn!(%category, %err, "prompt failed");
                None
            }
        }
    }
}

/// Reads answers line by line, e.g. from a pipe.
pub struct LineConsent<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> LineConsent<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }
}

impl LineConsent<StdinLock<'static>, Stderr> {
    pub fn stdin() -> Self {
        Self::new(io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> ConsentSource for LineConsent<R, W> {
    fn decide(&mut self, category: StatusCategory, prompt: &str) -> Option<bool> {
        for _ in 0..MAX_ATTEMPTS {
            let _ = write!(self.writer, "{prompt} [y/N] ");
            let _ = self.writer.flush();

            let mut line = String::new();
            match self.reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(err) => {
                    warn!(%category, %err, "could not read answer");
                    return None;
                }
            }
            match parse_answer(&line) {
                Some(answer) => return Some(answer),
                None => {
                    let _ = writeln!(self.writer, "Please answer y, yes, n or no.");
                }
            }
        }
        warn!(%category, attempts = MAX_ATTEMPTS, "no valid answer; treating as no");
        Some(false)
    }
}

/// `--yes`: the user consented to every group up front.
#[derive(Debug, Default)]
pub struct AssumeYes;

impl ConsentSource for AssumeYes {
    fn decide(&mut self, category: StatusCategory, prompt: &str) -> Option<bool> {
        debug!(%category, prompt, "assuming yes");
        Some(true)
    }
}

/// `--dry-run`: report everything, change nothing.
#[derive(Debug, Default)]
pub struct DeclineAll;

impl ConsentSource for DeclineAll {
    fn decide(&mut self, category: StatusCategory, prompt: &str) -> Option<bool> {
        debug!(%category, prompt, "dry run, declining");
        Some(false)
    }
}

/// Blank means the default, which is no.
fn parse_answer(line: &str) -> Option<bool> {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" | "" => Some(false),
        _ => None,
    }
}

/// Group probed repositories by category and ask once per group. Only
/// approved groups make it into the plan; failed probes and up-to-date
/// repositories never do.
pub fn build_plan(
    classified: &[ClassifiedRepo],
    consent: &mut dyn ConsentSource,
    renderer: &dyn Renderer,
) -> ActionPlan {
    let mut groups: BTreeMap<StatusCategory, Vec<&ClassifiedRepo>> = BTreeMap::new();
    for repo in classified {
        if let Some(category) = repo.category() {
            groups.entry(category).or_default().push(repo);
        }
    }

    let mut plan = ActionPlan::default();
    for (category, repos) in groups {
        if !category.requires_consent() {
            debug!(%category, count = repos.len(), "no action needed");
            continue;
        }

        renderer.consent_table(category, &repos);
        let approved = match consent.decide(category, &category.prompt(repos.len())) {
            Some(answer) => answer,
            None => {
                warn!(%category, "no answer received; treating as no");
                false
            }
        };
        info!(%category, count = repos.len(), approved, "consent");

        if approved {
            let planned = repos
                .iter()
                .filter_map(|repo| {
                    repo.probe().map(|probe| PlannedRepo {
                        remote: repo.remote.clone(),
                        probe: probe.clone(),
                    })
                })
                .collect();
            plan.approve(category, planned);
        }
    }
    plan
}
