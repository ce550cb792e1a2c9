use crate::DomainResult;
use crate::notifications::Notification;
use crate::ports::BoxFuture;

#[derive(Clone, Debug)]
pub struct NotificationRepositoryListQuery {
    pub recipient_id: String,
    pub is_read: Option<bool>,
    pub is_meetup: Option<bool>,
    pub limit: usize,
}

impl NotificationRepositoryListQuery {
    pub fn matches(&self, notification: &Notification) -> bool {
        notification.recipient_id == self.recipient_id
            && self
                .is_read
                .is_none_or(|is_read| notification.is_read() == is_read)
            && self
                .is_meetup
                .is_none_or(|is_meetup| notification.is_meetup() == is_meetup)
    }
}

/// One indivisible negotiation step: the proposal is removed and the
/// follow-ups are stored together, or nothing changes.
#[derive(Clone, Debug)]
pub struct ProposalResolution {
    pub proposal_id: String,
    pub recipient_id: String,
    pub emitted: Vec<Notification>,
}

pub trait NotificationRepository: Send + Sync {
    fn create(&self, notification: &Notification) -> BoxFuture<'_, DomainResult<Notification>>;

    fn get(&self, notification_id: &str) -> BoxFuture<'_, DomainResult<Option<Notification>>>;

    /// Newest first.
    fn list(
        &self,
        query: &NotificationRepositoryListQuery,
    ) -> BoxFuture<'_, DomainResult<Vec<Notification>>>;

    fn unread_count(&self, recipient_id: &str) -> BoxFuture<'_, DomainResult<usize>>;

    fn mark_read(
        &self,
        recipient_id: &str,
        notification_id: &str,
        read_at_ms: i64,
    ) -> BoxFuture<'_, DomainResult<Notification>>;

    fn mark_all_read(
        &self,
        recipient_id: &str,
        read_at_ms: i64,
    ) -> BoxFuture<'_, DomainResult<usize>>;

    fn delete(&self, recipient_id: &str, notification_id: &str)
    -> BoxFuture<'_, DomainResult<()>>;

    fn delete_all(&self, recipient_id: &str) -> BoxFuture<'_, DomainResult<usize>>;

    /// Deletes the proposal only if it still exists as a meet-up addressed to
    /// `recipient_id`, and stores `emitted` in the same step. A proposal that
    /// is already gone yields `NotFound`, so at most one caller wins.
    fn resolve_proposal(
        &self,
        resolution: &ProposalResolution,
    ) -> BoxFuture<'_, DomainResult<Vec<Notification>>>;
}
