pub mod identity;
pub mod plan;
pub mod repo;
pub mod status;

pub use identity::{Identity, IdentityError};
pub use plan::{ActionPlan, ActionResult, ClassifiedRepo, Operation, PlannedRepo, ProbeOutcome};
pub use repo::{LocalProbe, RemoteRepo, RepoName, SubmoduleState, Visibility};
pub use status::{classify, StatusCategory};
