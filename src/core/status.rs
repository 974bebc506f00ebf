use std::fmt;

use serde::Serialize;

use crate::core::plan::{Action, Operation};
use crate::core::repo::LocalProbe;

/// Sync state of one repository. Exhaustive and mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum StatusCategory {
    NotPresent,
    UpToDate,
    BehindOnly,
    AheadOrDiverged,
    DirtyOrConflicted,
}

impl StatusCategory {
    pub const ALL: [StatusCategory; 5] = [
        StatusCategory::NotPresent,
        StatusCategory::UpToDate,
        StatusCategory::BehindOnly,
        StatusCategory::AheadOrDiverged,
        StatusCategory::DirtyOrConflicted,
    ];

    pub fn label(self) -> &'static str {
        match self {
            StatusCategory::NotPresent => "NOT PRESENT",
            StatusCategory::UpToDate => "UP TO DATE",
            StatusCategory::BehindOnly => "BEHIND",
            StatusCategory::AheadOrDiverged => "AHEAD/DIVERGED",
            StatusCategory::DirtyOrConflicted => "DIRTY/CONFLICTED",
        }
    }

    /// The single action the dispatcher may run for this category.
    /// Up-to-date repositories have nothing to run.
    pub fn action(self) -> Option<Action> {
        match self {
            StatusCategory::NotPresent => Some(Action::Clone),
            StatusCategory::BehindOnly => Some(Action::FastForward),
            StatusCategory::AheadOrDiverged | StatusCategory::DirtyOrConflicted => {
                Some(Action::ReportOnly)
            }
            StatusCategory::UpToDate => None,
        }
    }

    pub fn operation(self) -> Operation {
        self.action()
            .map(Action::operation)
            .unwrap_or(Operation::None)
    }

    /// Up-to-date repositories are shown but never prompted for.
    pub fn requires_consent(self) -> bool {
        match self {
            StatusCategory::UpToDate => false,
            StatusCategory::NotPresent
            | StatusCategory::BehindOnly
            | StatusCategory::AheadOrDiverged
            | StatusCategory::DirtyOrConflicted => true,
        }
    }

    pub fn prompt(self, count: usize) -> String {
        let noun = if count == 1 {
            "repository"
        } else {
            "repositories"
        };
        match self {
            StatusCategory::NotPresent => format!("Clone {count} missing {noun}?"),
            StatusCategory::BehindOnly => {
                format!("Fetch and fast-forward {count} {noun} that are behind?")
            }
            StatusCategory::AheadOrDiverged => format!(
                "Record {count} ahead/diverged {noun} in the report? (nothing is changed)"
            ),
            StatusCategory::DirtyOrConflicted => format!(
                "Record {count} dirty/conflicted {noun} in the report? (nothing is changed)"
            ),
            StatusCategory::UpToDate => format!("{count} {noun} already up to date"),
        }
    }
}

impl fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Map a probe to its category. Dirtiness is checked before divergence so
/// uncommitted work is never offered a fast-forward.
pub fn classify(probe: &LocalProbe) -> StatusCategory {
    if !probe.exists {
        return StatusCategory::NotPresent;
    }
    if probe.is_dirty || probe.has_conflict_markers {
        return StatusCategory::DirtyOrConflicted;
    }
    if probe.ahead_count > 0 {
        return StatusCategory::AheadOrDiverged;
    }
    if probe.behind_count > 0 {
        return StatusCategory::BehindOnly;
    }
    StatusCategory::UpToDate
}
