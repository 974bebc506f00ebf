use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::core::repo::{LocalProbe, RemoteRepo, RepoName};
use crate::core::status::{classify, StatusCategory};
use crate::error::RepoFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Probe,
    Clone,
    FastForward,
    ReportOnly,
    None,
}

impl Operation {
    pub fn label(self) -> &'static str {
        match self {
            Operation::Probe => "probe",
            Operation::Clone => "clone",
            Operation::FastForward => "fetch + fast-forward",
            Operation::ReportOnly => "report only",
            Operation::None => "none",
        }
    }

    pub fn is_mutating(self) -> bool {
        matches!(self, Operation::Clone | Operation::FastForward)
    }
}

/// Work the dispatcher can actually run. Probing and doing nothing are
/// result labels only, so they have no variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Clone,
    FastForward,
    ReportOnly,
}

impl Action {
    pub fn operation(self) -> Operation {
        match self {
            Action::Clone => Operation::Clone,
            Action::FastForward => Operation::FastForward,
            Action::ReportOnly => Operation::ReportOnly,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Classified {
        probe: LocalProbe,
        category: StatusCategory,
    },
    Failed {
        failure: RepoFailure,
    },
}

/// A catalog entry together with what probing found locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedRepo {
    pub remote: RemoteRepo,
    pub local_path: PathBuf,
    pub outcome: ProbeOutcome,
}

impl ClassifiedRepo {
    pub fn from_probe(remote: RemoteRepo, probe: LocalProbe) -> Self {
        let category = classify(&probe);
        Self {
            remote,
            local_path: probe.local_path.clone(),
            outcome: ProbeOutcome::Classified { probe, category },
        }
    }

    pub fn failed(remote: RemoteRepo, local_path: PathBuf, failure: RepoFailure) -> Self {
        Self {
            remote,
            local_path,
            outcome: ProbeOutcome::Failed { failure },
        }
    }

    pub fn category(&self) -> Option<StatusCategory> {
        match &self.outcome {
            ProbeOutcome::Classified { category, .. } => Some(*category),
            ProbeOutcome::Failed { .. } => None,
        }
    }

    pub fn probe(&self) -> Option<&LocalProbe> {
        match &self.outcome {
            ProbeOutcome::Classified { probe, .. } => Some(probe),
            ProbeOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRepo {
    pub remote: RemoteRepo,
    pub probe: LocalProbe,
}

impl PlannedRepo {
    pub fn name(&self) -> &RepoName {
        &self.remote.name
    }
}

/// One unit of approved work as handed to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanItem {
    pub category: StatusCategory,
    pub action: Action,
    pub repo: PlannedRepo,
}

/// Approved work, keyed by category. Built by the consent grouper and
/// consumed once by the dispatcher. Categories without an action are
/// never recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionPlan {
    groups: BTreeMap<StatusCategory, Vec<PlannedRepo>>,
}

impl ActionPlan {
    pub fn approve(&mut self, category: StatusCategory, repos: Vec<PlannedRepo>) {
        if repos.is_empty() || category.action().is_none() {
            return;
        }
        self.groups.entry(category).or_default().extend(repos);
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn categories(&self) -> impl Iterator<Item = StatusCategory> + '_ {
        self.groups.keys().copied()
    }

    pub fn repos(&self, category: StatusCategory) -> &[PlannedRepo] {
        self.groups
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn names(&self, category: StatusCategory) -> Vec<RepoName> {
        self.repos(category)
            .iter()
            .map(|repo| repo.name().clone())
            .collect()
    }

    pub fn mutating_len(&self) -> usize {
        self.groups
            .iter()
            .filter(|(category, _)| category.operation().is_mutating())
            .map(|(_, repos)| repos.len())
            .sum()
    }

    pub fn into_items(self) -> Vec<PlanItem> {
        self.groups
            .into_iter()
            .filter_map(|(category, repos)| category.action().map(|action| (category, action, repos)))
            .flat_map(|(category, action, repos)| {
                repos.into_iter().map(move |repo| PlanItem {
                    category,
                    action,
                    repo,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionResult {
    pub repo_name: RepoName,
    pub local_path: PathBuf,
    pub operation: Operation,
    pub succeeded: bool,
    pub error_detail: Option<String>,
    pub failure: Option<RepoFailure>,
    pub commits_advanced: Option<usize>,
    pub note: Option<String>,
}

impl ActionResult {
    pub fn success(repo_name: RepoName, local_path: PathBuf, operation: Operation) -> Self {
        Self {
            repo_name,
            local_path,
            operation,
            succeeded: true,
            error_detail: None,
            failure: None,
            commits_advanced: None,
            note: None,
        }
    }

    pub fn failure(
        repo_name: RepoName,
        local_path: PathBuf,
        operation: Operation,
        failure: RepoFailure,
    ) -> Self {
        Self {
            repo_name,
            local_path,
            operation,
            succeeded: false,
            error_detail: Some(failure.to_string()),
            failure: Some(failure),
            commits_advanced: None,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_commits(mut self, commits: usize) -> Self {
        self.commits_advanced = Some(commits);
        self
    }
}
