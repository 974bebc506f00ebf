use crate::core::identity::Identity;
use crate::core::repo::RemoteRepo;
use crate::forge::CatalogError;

/// Source of truth for which repositories exist remotely.
///
/// Implementations must page through every result. A listing that cannot be
/// proven complete is `CatalogIncomplete`, and zero repositories is
/// `CatalogEmpty` so callers can warn about it explicitly.
pub trait Catalog: Send + Sync {
    fn list_repos(&self, identity: &Identity) -> Result<Vec<RemoteRepo>, CatalogError>;
}
