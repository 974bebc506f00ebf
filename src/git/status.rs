use std::path::{Path, PathBuf};

use serde::Serialize;

/// Files in the git dir that mean a merge, rebase, cherry-pick or revert
/// stopped half way.
const IN_PROGRESS_MARKERS: [&str; 6] = [
    "MERGE_HEAD",
    "REBASE_HEAD",
    "CHERRY_PICK_HEAD",
    "REVERT_HEAD",
    "rebase-merge",
    "rebase-apply",
];

#[derive(Debug, Default, Clone, Serialize)]
pub struct StatusSummary {
    pub staged: Vec<PathBuf>,
    pub modified: Vec<PathBuf>,
    pub untracked: Vec<PathBuf>,
    pub conflicts: Vec<PathBuf>,
    pub in_progress: Option<String>,
}

impl StatusSummary {
    pub fn is_dirty(&self) -> bool {
        !self.staged.is_empty() || !self.modified.is_empty() || !self.untracked.is_empty()
    }

    pub fn has_conflict_markers(&self) -> bool {
        !self.conflicts.is_empty() || self.in_progress.is_some()
    }

    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if !self.staged.is_empty() {
            parts.push(format!("{} staged", self.staged.len()));
        }
        if !self.modified.is_empty() {
            parts.push(format!("{} modified", self.modified.len()));
        }
        if !self.untracked.is_empty() {
            parts.push(format!("{} untracked", self.untracked.len()));
        }
        if !self.conflicts.is_empty() {
            parts.push(format!("{} conflicted", self.conflicts.len()));
        }
        if let Some(marker) = self.in_progress.as_ref() {
            parts.push(format!("{marker} present"));
        }
        if parts.is_empty() {
            "clean".to_string()
        } else {
            parts.join(", ")
        }
    }
}

pub fn in_progress_marker(git_dir: &Path) -> Option<String> {
    IN_PROGRESS_MARKERS
        .iter()
        .find(|marker| git_dir.join(marker).exists())
        .map(|marker| marker.to_string())
}
