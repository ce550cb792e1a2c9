use crate::DomainResult;
use crate::ports::BoxFuture;

/// Read-only view of the account store owned by another service.
pub trait UserDirectory: Send + Sync {
    fn exists(&self, user_id: &str) -> BoxFuture<'_, DomainResult<bool>>;
}
