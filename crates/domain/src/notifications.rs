use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;
use crate::identity::ActorIdentity;
use crate::meetup::MeetupAction;
use crate::ports::items::ItemRepository;
use crate::ports::notifications::{NotificationRepository, NotificationRepositoryListQuery};
use crate::ports::users::UserDirectory;
use crate::util::{non_blank, now_ms, uuid_v7_without_dashes};

pub const MAX_TEXT_LENGTH: usize = 2_000;
pub const MAX_LOCATION_LENGTH: usize = 500;
const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 100;

pub const MSG_TEXT_REQUIRED: &str = "User ID and notification text are required";
pub const MSG_MEETUP_TERMS_REQUIRED: &str =
    "Location and meet time are required for meet-up notifications";
pub const MSG_MEET_TIME_IN_PAST: &str = "Meet time must be in the future";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MeetupTerms {
    pub location: String,
    pub meet_time_ms: i64,
}

impl MeetupTerms {
    /// Checks presence, length and that the meeting lies strictly after `now_ms`.
    pub fn validate(
        location: Option<&str>,
        meet_time_ms: Option<i64>,
        now_ms: i64,
    ) -> DomainResult<Self> {
        let (Some(location), Some(meet_time_ms)) = (non_blank(location), meet_time_ms) else {
            return Err(DomainError::Validation(MSG_MEETUP_TERMS_REQUIRED.into()));
        };
        if location.chars().count() > MAX_LOCATION_LENGTH {
            return Err(DomainError::Validation(format!(
                "location must be at most {MAX_LOCATION_LENGTH} characters"
            )));
        }
        if meet_time_ms <= now_ms {
            return Err(DomainError::Validation(MSG_MEET_TIME_IN_PAST.into()));
        }
        Ok(Self {
            location: location.to_string(),
            meet_time_ms,
        })
    }
}

/// What a notification says. A meet-up proposal always carries its terms.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationBody {
    Plain {
        text: String,
    },
    MeetupProposal {
        text: String,
        location: String,
        meet_time_ms: i64,
    },
}

impl NotificationBody {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn proposal(text: impl Into<String>, terms: MeetupTerms) -> Self {
        Self::MeetupProposal {
            text: text.into(),
            location: terms.location,
            meet_time_ms: terms.meet_time_ms,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Plain { text } | Self::MeetupProposal { text, .. } => text,
        }
    }

    pub fn is_meetup(&self) -> bool {
        matches!(self, Self::MeetupProposal { .. })
    }

    pub fn terms(&self) -> Option<MeetupTerms> {
        match self {
            Self::Plain { .. } => None,
            Self::MeetupProposal {
                location,
                meet_time_ms,
                ..
            } => Some(MeetupTerms {
                location: location.clone(),
                meet_time_ms: *meet_time_ms,
            }),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub notification_id: String,
    pub recipient_id: String,
    pub sender_id: Option<String>,
    pub item_id: Option<String>,
    #[serde(flatten)]
    pub body: NotificationBody,
    pub read_at_ms: Option<i64>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl Notification {
    pub fn new(
        recipient_id: impl Into<String>,
        sender_id: Option<String>,
        item_id: Option<String>,
        body: NotificationBody,
        now_ms: i64,
    ) -> Self {
        Self {
            notification_id: uuid_v7_without_dashes(),
            recipient_id: recipient_id.into(),
            sender_id,
            item_id,
            body,
            read_at_ms: None,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }

    pub fn is_read(&self) -> bool {
        self.read_at_ms.is_some()
    }

    pub fn is_meetup(&self) -> bool {
        self.body.is_meetup()
    }
}

#[derive(Clone, Debug, Default)]
pub struct NotificationCreate {
    pub recipient_id: String,
    pub sender_id: Option<String>,
    pub item_id: Option<String>,
    pub text: String,
    pub is_meetup: bool,
    pub location: Option<String>,
    pub meet_time_ms: Option<i64>,
}

#[derive(Clone, Debug)]
pub struct NotificationListQuery {
    pub recipient_id: String,
    pub is_read: Option<bool>,
    pub is_meetup: Option<bool>,
    pub limit: Option<usize>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NotificationPage {
    pub results: Vec<Notification>,
    pub count: usize,
    pub unread_count: usize,
}

/// A notification as seen by its recipient, with the negotiation actions it
/// currently offers. Plain messages offer none.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NotificationView {
    pub notification: Notification,
    pub actions: Vec<MeetupAction>,
}

#[derive(Clone)]
pub struct NotificationService {
    notifications: Arc<dyn NotificationRepository>,
    users: Arc<dyn UserDirectory>,
    items: Arc<dyn ItemRepository>,
}

impl NotificationService {
    pub fn new(
        notifications: Arc<dyn NotificationRepository>,
        users: Arc<dyn UserDirectory>,
        items: Arc<dyn ItemRepository>,
    ) -> Self {
        Self {
            notifications,
            users,
            items,
        }
    }

    pub(crate) fn repository(&self) -> &Arc<dyn NotificationRepository> {
        &self.notifications
    }

    pub async fn create(&self, input: NotificationCreate) -> DomainResult<Notification> {
        let now = now_ms();
        let body = validate_create(&input, now)?;
        let recipient_id = input.recipient_id.trim().to_string();
        let sender_id = non_blank(input.sender_id.as_deref()).map(str::to_string);
        let item_id = non_blank(input.item_id.as_deref()).map(str::to_string);

        if !self.users.exists(&recipient_id).await? {
            return Err(DomainError::NotFound("recipient not found".into()));
        }
        if let Some(sender_id) = sender_id.as_deref() {
            if !self.users.exists(sender_id).await? {
                return Err(DomainError::NotFound("sender not found".into()));
            }
        }
        if let Some(item_id) = item_id.as_deref() {
            if self.items.get(item_id).await?.is_none() {
                return Err(DomainError::NotFound("item not found".into()));
            }
        }

        let notification = Notification::new(recipient_id, sender_id, item_id, body, now);
        let notification = self.notifications.create(&notification).await?;
        tracing::info!(
            notification_id = %notification.notification_id,
            recipient_id = %notification.recipient_id,
            is_meetup = notification.is_meetup(),
            "notification created"
        );
        Ok(notification)
    }

    pub async fn list(
        &self,
        actor: &ActorIdentity,
        query: NotificationListQuery,
    ) -> DomainResult<NotificationPage> {
        ensure_own_scope(actor, &query.recipient_id)?;
        let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
        if !(1..=MAX_LIST_LIMIT).contains(&limit) {
            return Err(DomainError::Validation(format!(
                "limit must be between 1 and {MAX_LIST_LIMIT}"
            )));
        }
        let repo_query = NotificationRepositoryListQuery {
            recipient_id: query.recipient_id.clone(),
            is_read: query.is_read,
            is_meetup: query.is_meetup,
            limit,
        };
        let results = self.notifications.list(&repo_query).await?;
        let unread_count = self.notifications.unread_count(&query.recipient_id).await?;
        Ok(NotificationPage {
            count: results.len(),
            results,
            unread_count,
        })
    }

    /// Fetches a notification addressed to `actor`.
    pub async fn get_own(
        &self,
        actor: &ActorIdentity,
        notification_id: &str,
    ) -> DomainResult<Notification> {
        let notification = self
            .notifications
            .get(notification_id)
            .await?
            .ok_or_else(|| DomainError::NotFound("notification not found".into()))?;
        ensure_own_scope(actor, &notification.recipient_id)?;
        Ok(notification)
    }

    /// Retrieval marks the notification read.
    pub async fn view(
        &self,
        actor: &ActorIdentity,
        notification_id: &str,
    ) -> DomainResult<NotificationView> {
        let notification = self.get_own(actor, notification_id).await?;
        let notification = if notification.is_read() {
            notification
        } else {
            self.notifications
                .mark_read(&actor.user_id, notification_id, now_ms())
                .await?
        };
        let actions = if notification.is_meetup() {
            MeetupAction::ALL.to_vec()
        } else {
            Vec::new()
        };
        Ok(NotificationView {
            notification,
            actions,
        })
    }

    pub async fn mark_read(
        &self,
        actor: &ActorIdentity,
        notification_id: &str,
    ) -> DomainResult<Notification> {
        self.notifications
            .mark_read(&actor.user_id, notification_id, now_ms())
            .await
    }

    pub async fn mark_all_read(
        &self,
        actor: &ActorIdentity,
        recipient_id: &str,
    ) -> DomainResult<usize> {
        ensure_own_scope(actor, recipient_id)?;
        self.notifications
            .mark_all_read(recipient_id, now_ms())
            .await
    }

    pub async fn delete(&self, actor: &ActorIdentity, notification_id: &str) -> DomainResult<()> {
        self.notifications
            .delete(&actor.user_id, notification_id)
            .await
    }

    pub async fn delete_all(&self, actor: &ActorIdentity, recipient_id: &str) -> DomainResult<usize> {
        ensure_own_scope(actor, recipient_id)?;
        let deleted = self.notifications.delete_all(recipient_id).await?;
        tracing::info!(recipient_id, deleted, "notifications cleared");
        Ok(deleted)
    }
}

/// Validates a create request without touching any store.
pub fn validate_create(input: &NotificationCreate, now_ms: i64) -> DomainResult<NotificationBody> {
    let (Some(_), Some(text)) = (
        non_blank(Some(input.recipient_id.as_str())),
        non_blank(Some(input.text.as_str())),
    ) else {
        return Err(DomainError::Validation(MSG_TEXT_REQUIRED.into()));
    };
    if text.chars().count() > MAX_TEXT_LENGTH {
        return Err(DomainError::Validation(format!(
            "text must be at most {MAX_TEXT_LENGTH} characters"
        )));
    }
    if !input.is_meetup {
        return Ok(NotificationBody::plain(text));
    }
    let terms = MeetupTerms::validate(input.location.as_deref(), input.meet_time_ms, now_ms)?;
    Ok(NotificationBody::proposal(text, terms))
}

pub(crate) fn ensure_own_scope(actor: &ActorIdentity, recipient_id: &str) -> DomainResult<()> {
    if actor.user_id != recipient_id {
        return Err(DomainError::Forbidden(
            "notifications belong to another user".into(),
        ));
    }
    Ok(())
}
