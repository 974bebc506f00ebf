use console::{style, StyledObject};

use crate::core::identity::Identity;
use crate::core::plan::{ActionResult, ClassifiedRepo, ProbeOutcome};
use crate::core::status::StatusCategory;
use crate::report::{is_stale, submodule_cell, Renderer};
use crate::util::output;

const HEADERS: [&str; 6] = [
    "Repository",
    "Branch",
    "Status",
    "Ahead/Behind",
    "Visibility",
    "Submodules",
];

/// Plain-text tables on stdout, colored by category.
#[derive(Debug, Clone)]
pub struct ConsoleRenderer {
    stale_after_days: u64,
}

impl ConsoleRenderer {
    pub fn new(stale_after_days: u64) -> Self {
        Self { stale_after_days }
    }

    fn status_table(&self, repos: &[&ClassifiedRepo]) {
        let rows: Vec<Row> = repos.iter().map(|repo| self.row(repo)).collect();
        let mut widths = HEADERS.map(str::len);
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row.cells.iter()) {
                *width = (*width).max(cell.len());
            }
        }

        let header: Vec<String> = HEADERS
            .iter()
            .zip(widths.iter())
            .map(|(title, width)| format!("{title:<width$}"))
            .collect();
        println!("{}", style(header.join("  ").trim_end().to_string()).bold());
        println!("{}", "-".repeat(widths.iter().sum::<usize>() + 2 * (widths.len() - 1)));

        for row in rows {
            let mut line = String::new();
            for (index, (cell, width)) in row.cells.iter().zip(widths.iter()).enumerate() {
                if index > 0 {
                    line.push_str("  ");
                }
                let padded = format!("{cell:<width$}");
                if index == 2 {
                    line.push_str(&paint(row.tone, padded).to_string());
                } else {
                    line.push_str(&padded);
                }
            }
            println!("{}", line.trim_end());
            if let Some(detail) = row.detail {
                println!("    {}", style(detail).red());
            }
        }
    }

    fn row(&self, repo: &ClassifiedRepo) -> Row {
        let name = repo.remote.name.to_string();
        let visibility = repo.remote.visibility.label().to_string();
        let submodules = submodule_cell(repo);

        match &repo.outcome {
            ProbeOutcome::Classified { probe, category } => {
                let branch = match (probe.exists, probe.current_branch.as_deref()) {
                    (false, _) => format!("({})", repo.remote.default_branch),
                    (true, Some(branch)) => branch.to_string(),
                    (true, None) => "(detached)".to_string(),
                };
                let mut status = category.label().to_string();
                if is_stale(repo, self.stale_after_days) {
                    if let Some(age) = probe.upstream_age_days {
                        status.push_str(&format!(" (stale, {age}d)"));
                    }
                }
                let counts = match (probe.exists, probe.upstream.as_deref()) {
                    (false, _) => "-".to_string(),
                    (true, None) => "no upstream".to_string(),
                    (true, Some(_)) => format!("+{} / -{}", probe.ahead_count, probe.behind_count),
                };
                Row {
                    cells: [name, branch, status, counts, visibility, submodules],
                    tone: Tone::Category(*category),
                    detail: None,
                }
            }
            ProbeOutcome::Failed { failure } => Row {
                cells: [
                    name,
                    "-".to_string(),
                    format!("PROBE FAILED ({})", failure.kind()),
                    "-".to_string(),
                    visibility,
                    submodules,
                ],
                tone: Tone::Failed,
                detail: Some(failure.to_string()),
            },
        }
    }
}

impl Renderer for ConsoleRenderer {
    fn pre_action(&self, identity: &Identity, repos: &[ClassifiedRepo]) {
        output::heading(&format!("{} repositories for {identity}", repos.len()));
        if repos.is_empty() {
            return;
        }
        let rows: Vec<&ClassifiedRepo> = repos.iter().collect();
        self.status_table(&rows);

        let mut counts = Vec::new();
        for category in StatusCategory::ALL {
            let count = repos
                .iter()
                .filter(|repo| repo.category() == Some(category))
                .count();
            if count > 0 {
                counts.push(format!("{count} {}", category.label().to_lowercase()));
            }
        }
        let failed = repos.iter().filter(|repo| repo.category().is_none()).count();
        if failed > 0 {
            counts.push(format!("{failed} probe failed"));
        }
        println!("\n{}", counts.join(", "));
    }

    fn consent_table(&self, category: StatusCategory, repos: &[&ClassifiedRepo]) {
        output::heading(&format!(
            "{} ({}): {}",
            category.label(),
            repos.len(),
            category.operation()
        ));
        self.status_table(repos);
    }

    fn results(&self, results: &[ActionResult]) {
        output::heading("Results");
        if results.is_empty() {
            println!("No actions were taken.");
            return;
        }

        let width = results
            .iter()
            .map(|result| result.repo_name.as_str().len())
            .max()
            .unwrap_or(0)
            .max("Repository".len());
        println!(
            "{}",
            style(format!("{:<width$}  {:<20}  {:<6}  Detail", "Repository", "Operation", "Result"))
                .bold()
        );
        for result in results {
            let outcome = if result.succeeded {
                style(format!("{:<6}", "ok")).green()
            } else {
                style(format!("{:<6}", "FAILED")).red().bold()
            };
            println!(
                "{:<width$}  {:<20}  {}  {}",
                result.repo_name.as_str(),
                result.operation.label(),
                outcome,
                result_detail(result)
            );
        }

        let failed = results.iter().filter(|result| !result.succeeded).count();
        if failed == 0 {
            output::success(&format!("{} action(s) completed", results.len()));
        } else {
            output::warn(&format!("{failed} of {} action(s) failed", results.len()));
        }
    }

    fn post_action(&self, repos: &[ClassifiedRepo]) {
        output::heading("Status after actions");
        if repos.is_empty() {
            return;
        }
        let rows: Vec<&ClassifiedRepo> = repos.iter().collect();
        self.status_table(&rows);
    }
}

struct Row {
    cells: [String; 6],
    tone: Tone,
    detail: Option<String>,
}

#[derive(Clone, Copy)]
enum Tone {
    Category(StatusCategory),
    Failed,
}

fn paint(tone: Tone, text: String) -> StyledObject<String> {
    match tone {
        Tone::Category(StatusCategory::UpToDate) => style(text).green(),
        Tone::Category(StatusCategory::NotPresent) => style(text).cyan(),
        Tone::Category(StatusCategory::BehindOnly) => style(text).yellow(),
        Tone::Category(StatusCategory::AheadOrDiverged) => style(text).magenta(),
        Tone::Category(StatusCategory::DirtyOrConflicted) => style(text).red(),
        Tone::Failed => style(text).red().bold(),
    }
}

fn result_detail(result: &ActionResult) -> String {
    let mut parts = Vec::new();
    if let Some(commits) = result.commits_advanced {
        parts.push(format!("advanced {commits} commit(s)"));
    }
    if let Some(note) = result.note.as_ref() {
        parts.push(note.clone());
    }
    if let Some(error) = result.error_detail.as_ref() {
        parts.push(error.clone());
    }
    parts.join("; ")
}
