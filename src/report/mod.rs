pub mod console;
pub mod json;

pub use console::ConsoleRenderer;
pub use json::JsonRenderer;

use crate::core::identity::Identity;
use crate::core::plan::{ActionResult, ClassifiedRepo};
use crate::core::status::StatusCategory;

/// Presentation of each stage of a run. Implementations only display;
/// nothing they do feeds back into the engine.
pub trait Renderer: Send + Sync {
    /// Every catalog repository with its category, before anything runs.
    fn pre_action(&self, identity: &Identity, repos: &[ClassifiedRepo]);
    /// The group a consent question is about to be asked for.
    fn consent_table(&self, category: StatusCategory, repos: &[&ClassifiedRepo]);
    fn results(&self, results: &[ActionResult]);
    fn post_action(&self, repos: &[ClassifiedRepo]);
}

/// A behind repository whose upstream tip is at least `threshold_days` old.
/// Display only; the category is unaffected.
pub fn is_stale(repo: &ClassifiedRepo, threshold_days: u64) -> bool {
    match (repo.category(), repo.probe()) {
        (Some(StatusCategory::BehindOnly), Some(probe)) => probe
            .upstream_age_days
            .map(|age| age >= threshold_days)
            .unwrap_or(false),
        _ => false,
    }
}

/// Text for the submodule column. Never empty, so every row is complete.
pub fn submodule_cell(repo: &ClassifiedRepo) -> String {
    let probe = match repo.probe() {
        Some(probe) => probe,
        None => return "-".to_string(),
    };
    if !probe.exists {
        return if repo.remote.has_submodules {
            "(not cloned; declares submodules)".to_string()
        } else {
            "(not cloned)".to_string()
        };
    }
    if probe.submodule_states.is_empty() {
        return "(none)".to_string();
    }

    let declared = probe.submodule_states.len();
    let initialized = probe.initialized_submodules();
    let missing: Vec<String> = probe
        .submodule_states
        .iter()
        .filter(|state| !state.initialized)
        .map(|state| state.path.display().to_string())
        .collect();
    if missing.is_empty() {
        format!("{initialized}/{declared} initialized")
    } else {
        format!(
            "{initialized}/{declared} initialized; uninitialized: {}",
            missing.join(", ")
        )
    }
}
