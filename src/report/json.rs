use std::io::{self, Write};

use serde::Serialize;
use tracing::warn;

use crate::core::identity::Identity;
use crate::core::plan::{ActionResult, ClassifiedRepo};
use crate::core::status::StatusCategory;
use crate::report::{is_stale, Renderer};

/// One JSON document per stage, newline-delimited on stdout.
#[derive(Debug, Clone)]
pub struct JsonRenderer {
    stale_after_days: u64,
}

#[derive(Serialize)]
struct Row<'a> {
    #[serde(flatten)]
    repo: &'a ClassifiedRepo,
    stale: bool,
}

#[derive(Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
enum Event<'a> {
    PreAction {
        owner: &'a str,
        user: &'a str,
        ssh_alias: &'a str,
        repos: Vec<Row<'a>>,
    },
    Consent {
        category: StatusCategory,
        repos: Vec<Row<'a>>,
    },
    Results {
        failed: usize,
        results: &'a [ActionResult],
    },
    PostAction {
        repos: Vec<Row<'a>>,
    },
}

impl JsonRenderer {
    pub fn new(stale_after_days: u64) -> Self {
        Self { stale_after_days }
    }

    fn rows<'a, I>(&self, repos: I) -> Vec<Row<'a>>
    where
        I: IntoIterator<Item = &'a ClassifiedRepo>,
    {
        repos
            .into_iter()
            .map(|repo| Row {
                repo,
                stale: is_stale(repo, self.stale_after_days),
            })
            .collect()
    }

    fn emit(&self, event: &Event<'_>) {
        match serde_json::to_string(event) {
            Ok(line) => {
                let mut stdout = io::stdout().lock();
                let _ = writeln!(stdout, "{line}");
            }
            Err(err) => warn!(%err, "could not serialize report"),
        }
    }
}

impl Renderer for JsonRenderer {
    fn pre_action(&self, identity: &Identity, repos: &[ClassifiedRepo]) {
        self.emit(&Event::PreAction {
            owner: identity.owner(),
            user: identity.user(),
            ssh_alias: identity.ssh_alias(),
            repos: self.rows(repos),
        });
    }

    fn consent_table(&self, category: StatusCategory, repos: &[&ClassifiedRepo]) {
        self.emit(&Event::Consent {
            category,
            repos: self.rows(repos.iter().copied()),
        });
    }

    fn results(&self, results: &[ActionResult]) {
        self.emit(&Event::Results {
            failed: results.iter().filter(|result| !result.succeeded).count(),
            results,
        });
    }

    fn post_action(&self, repos: &[ClassifiedRepo]) {
        self.emit(&Event::PostAction {
            repos: self.rows(repos),
        });
    }
}
