pub mod github;
pub mod traits;

pub use github::GitHubClient;
pub use traits::Catalog;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("repository catalog unavailable for '{owner}': {detail}")]
    CatalogUnavailable { owner: String, detail: String },
    #[error("repository catalog for '{owner}' is incomplete: {detail}")]
    CatalogIncomplete { owner: String, detail: String },
    #[error("no repositories found for '{owner}'")]
    CatalogEmpty { owner: String },
}
