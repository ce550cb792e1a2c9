use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lostfound_domain::DomainResult;
use lostfound_domain::error::DomainError;
use lostfound_domain::notifications::{Notification, NotificationBody};
use lostfound_domain::ports::BoxFuture;
use lostfound_domain::ports::notifications::{
    NotificationRepository, NotificationRepositoryListQuery, ProposalResolution,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use surrealdb::{Surreal, engine::remote::ws::Client};
use tokio::sync::RwLock;

use super::rows::{
    PROPOSAL_NOT_FOUND, decode_count, decode_rows, invalid_result, map_surreal_error,
    map_transaction_errors, to_payload,
};
use crate::db::with_store_timeout;

const KIND_PLAIN: &str = "plain";
const KIND_MEETUP_PROPOSAL: &str = "meetup_proposal";

fn newest_first(left: &Notification, right: &Notification) -> std::cmp::Ordering {
    right
        .created_at_ms
        .cmp(&left.created_at_ms)
        .then_with(|| right.notification_id.cmp(&left.notification_id))
}

fn not_found() -> DomainError {
    DomainError::NotFound("notification not found".into())
}

fn other_recipient() -> DomainError {
    DomainError::Forbidden("notification belongs to another user".into())
}

#[derive(Default)]
pub struct InMemoryNotificationRepository {
    by_id: Arc<RwLock<HashMap<String, Notification>>>,
}

impl InMemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NotificationRepository for InMemoryNotificationRepository {
    fn create(&self, notification: &Notification) -> BoxFuture<'_, DomainResult<Notification>> {
        let notification = notification.clone();
        let by_id = self.by_id.clone();
        Box::pin(async move {
            let mut by_id = by_id.write().await;
            if by_id.contains_key(&notification.notification_id) {
                return Err(DomainError::Conflict("notification already exists".into()));
            }
            by_id.insert(notification.notification_id.clone(), notification.clone());
            Ok(notification)
        })
    }

    fn get(&self, notification_id: &str) -> BoxFuture<'_, DomainResult<Option<Notification>>> {
        let notification_id = notification_id.to_string();
        let by_id = self.by_id.clone();
        Box::pin(async move { Ok(by_id.read().await.get(&notification_id).cloned()) })
    }

    fn list(
        &self,
        query: &NotificationRepositoryListQuery,
    ) -> BoxFuture<'_, DomainResult<Vec<Notification>>> {
        let query = query.clone();
        let by_id = self.by_id.clone();
        Box::pin(async move {
            let mut items: Vec<Notification> = by_id
                .read()
                .await
                .values()
                .filter(|notification| query.matches(notification))
                .cloned()
                .collect();
            items.sort_by(newest_first);
            items.truncate(query.limit);
            Ok(items)
        })
    }

    fn unread_count(&self, recipient_id: &str) -> BoxFuture<'_, DomainResult<usize>> {
        let recipient_id = recipient_id.to_string();
        let by_id = self.by_id.clone();
        Box::pin(async move {
            let count = by_id
                .read()
                .await
                .values()
                .filter(|notification| {
                    notification.recipient_id == recipient_id && !notification.is_read()
                })
                .count();
            Ok(count)
        })
    }

    fn mark_read(
        &self,
        recipient_id: &str,
        notification_id: &str,
        read_at_ms: i64,
    ) -> BoxFuture<'_, DomainResult<Notification>> {
        let recipient_id = recipient_id.to_string();
        let notification_id = notification_id.to_string();
        let by_id = self.by_id.clone();
        Box::pin(async move {
            let mut by_id = by_id.write().await;
            let Some(notification) = by_id.get_mut(&notification_id) else {
                return Err(not_found());
            };
            if notification.recipient_id != recipient_id {
                return Err(other_recipient());
            }
            if notification.read_at_ms.is_none() {
                notification.read_at_ms = Some(read_at_ms);
                notification.updated_at_ms = read_at_ms;
            }
            Ok(notification.clone())
        })
    }

    fn mark_all_read(
        &self,
        recipient_id: &str,
        read_at_ms: i64,
    ) -> BoxFuture<'_, DomainResult<usize>> {
        let recipient_id = recipient_id.to_string();
        let by_id = self.by_id.clone();
        Box::pin(async move {
            let mut updated = 0;
            for notification in by_id.write().await.values_mut() {
                if notification.recipient_id == recipient_id && notification.read_at_ms.is_none() {
                    notification.read_at_ms = Some(read_at_ms);
                    notification.updated_at_ms = read_at_ms;
                    updated += 1;
                }
            }
            Ok(updated)
        })
    }

    fn delete(
        &self,
        recipient_id: &str,
        notification_id: &str,
    ) -> BoxFuture<'_, DomainResult<()>> {
        let recipient_id = recipient_id.to_string();
        let notification_id = notification_id.to_string();
        let by_id = self.by_id.clone();
        Box::pin(async move {
            let mut by_id = by_id.write().await;
            match by_id.get(&notification_id) {
                None => Err(not_found()),
                Some(notification) if notification.recipient_id != recipient_id => {
                    Err(other_recipient())
                }
                Some(_) => {
                    by_id.remove(&notification_id);
                    Ok(())
                }
            }
        })
    }

    fn delete_all(&self, recipient_id: &str) -> BoxFuture<'_, DomainResult<usize>> {
        let recipient_id = recipient_id.to_string();
        let by_id = self.by_id.clone();
        Box::pin(async move {
            let mut by_id = by_id.write().await;
            let before = by_id.len();
            by_id.retain(|_, notification| notification.recipient_id != recipient_id);
            Ok(before - by_id.len())
        })
    }

    fn resolve_proposal(
        &self,
        resolution: &ProposalResolution,
    ) -> BoxFuture<'_, DomainResult<Vec<Notification>>> {
        let resolution = resolution.clone();
        let by_id = self.by_id.clone();
        Box::pin(async move {
            let mut by_id = by_id.write().await;
            let still_open = by_id.get(&resolution.proposal_id).is_some_and(|proposal| {
                proposal.recipient_id == resolution.recipient_id && proposal.is_meetup()
            });
            if !still_open {
                return Err(not_found());
            }
            by_id.remove(&resolution.proposal_id);
            for notification in &resolution.emitted {
                by_id.insert(notification.notification_id.clone(), notification.clone());
            }
            Ok(resolution.emitted)
        })
    }
}

#[derive(Clone)]
pub struct SurrealNotificationRepository {
    client: Arc<Surreal<Client>>,
    store_timeout: Duration,
}

impl SurrealNotificationRepository {
    pub fn with_client(client: Arc<Surreal<Client>>, store_timeout: Duration) -> Self {
        Self {
            client,
            store_timeout,
        }
    }

    fn to_row(notification: &Notification) -> SurrealNotificationRow {
        let (kind, text, location, meet_time_ms) = match &notification.body {
            NotificationBody::Plain { text } => (KIND_PLAIN, text.clone(), None, None),
            NotificationBody::MeetupProposal {
                text,
                location,
                meet_time_ms,
            } => (
                KIND_MEETUP_PROPOSAL,
                text.clone(),
                Some(location.clone()),
                Some(*meet_time_ms),
            ),
        };
        SurrealNotificationRow {
            notification_id: notification.notification_id.clone(),
            recipient_id: notification.recipient_id.clone(),
            sender_id: notification.sender_id.clone(),
            item_id: notification.item_id.clone(),
            kind: kind.to_string(),
            text,
            location,
            meet_time_ms,
            read_at_ms: notification.read_at_ms,
            created_at_ms: notification.created_at_ms,
            updated_at_ms: notification.updated_at_ms,
        }
    }

    fn from_row(row: SurrealNotificationRow) -> DomainResult<Notification> {
        let body = match (row.kind.as_str(), row.location, row.meet_time_ms) {
            (KIND_PLAIN, _, _) => NotificationBody::Plain { text: row.text },
            (KIND_MEETUP_PROPOSAL, Some(location), Some(meet_time_ms)) => {
                NotificationBody::MeetupProposal {
                    text: row.text,
                    location,
                    meet_time_ms,
                }
            }
            (kind, _, _) => {
                return Err(DomainError::Unavailable(format!(
                    "malformed notification row '{}' of kind '{kind}'",
                    row.notification_id
                )));
            }
        };
        Ok(Notification {
            notification_id: row.notification_id,
            recipient_id: row.recipient_id,
            sender_id: row.sender_id,
            item_id: row.item_id,
            body,
            read_at_ms: row.read_at_ms,
            created_at_ms: row.created_at_ms,
            updated_at_ms: row.updated_at_ms,
        })
    }

    fn map_rows(rows: Vec<Value>) -> DomainResult<Vec<Notification>> {
        decode_rows::<SurrealNotificationRow>(rows, "notification")?
            .into_iter()
            .map(Self::from_row)
            .collect()
    }

    async fn fetch(&self, notification_id: String) -> DomainResult<Option<Notification>> {
        let mut response = self
            .client
            .query("SELECT * FROM notification WHERE notification_id = $notification_id LIMIT 1")
            .bind(("notification_id", notification_id))
            .await
            .map_err(map_surreal_error)?;
        let rows: Vec<Value> = response.take(0).map_err(invalid_result)?;
        Ok(Self::map_rows(rows)?.pop())
    }

    async fn fetch_owned(
        &self,
        recipient_id: &str,
        notification_id: String,
    ) -> DomainResult<Notification> {
        let notification = self.fetch(notification_id).await?.ok_or_else(not_found)?;
        if notification.recipient_id != recipient_id {
            return Err(other_recipient());
        }
        Ok(notification)
    }
}

impl NotificationRepository for SurrealNotificationRepository {
    fn create(&self, notification: &Notification) -> BoxFuture<'_, DomainResult<Notification>> {
        let notification = notification.clone();
        let payload = to_payload(&Self::to_row(&notification));
        Box::pin(with_store_timeout(
            self.store_timeout,
            "notification create",
            async move {
                let response = self
                    .client
                    .query("CREATE notification CONTENT $payload")
                    .bind(("payload", payload?))
                    .await
                    .map_err(map_surreal_error)?;
                response.check().map_err(map_surreal_error)?;
                Ok(notification)
            },
        ))
    }

    fn get(&self, notification_id: &str) -> BoxFuture<'_, DomainResult<Option<Notification>>> {
        let notification_id = notification_id.to_string();
        Box::pin(with_store_timeout(
            self.store_timeout,
            "notification lookup",
            self.fetch(notification_id),
        ))
    }

    fn list(
        &self,
        query: &NotificationRepositoryListQuery,
    ) -> BoxFuture<'_, DomainResult<Vec<Notification>>> {
        let query = query.clone();
        Box::pin(with_store_timeout(self.store_timeout, "notification list", async move {
            let mut filters = vec!["recipient_id = $recipient_id"];
            match query.is_read {
                Some(true) => filters.push("read_at_ms IS NOT NONE"),
                Some(false) => filters.push("read_at_ms IS NONE"),
                None => {}
            }
            match query.is_meetup {
                Some(true) => filters.push("kind = 'meetup_proposal'"),
                Some(false) => filters.push("kind != 'meetup_proposal'"),
                None => {}
            }
            let statement = format!(
                "SELECT * FROM notification WHERE {} \
                 ORDER BY created_at_ms DESC, notification_id DESC LIMIT $limit",
                filters.join(" AND ")
            );
            let mut response = self
                .client
                .query(statement)
                .bind(("recipient_id", query.recipient_id.clone()))
                .bind(("limit", query.limit as i64))
                .await
                .map_err(map_surreal_error)?;
            let rows: Vec<Value> = response.take(0).map_err(invalid_result)?;
            Self::map_rows(rows)
        }))
    }

    fn unread_count(&self, recipient_id: &str) -> BoxFuture<'_, DomainResult<usize>> {
        let recipient_id = recipient_id.to_string();
        Box::pin(with_store_timeout(self.store_timeout, "notification unread count", async move {
            let mut response = self
                .client
                .query(
                    "SELECT count() AS unread_count FROM notification \
                     WHERE recipient_id = $recipient_id AND read_at_ms IS NONE GROUP ALL",
                )
                .bind(("recipient_id", recipient_id))
                .await
                .map_err(map_surreal_error)?;
            let rows: Vec<Value> = response.take(0).map_err(invalid_result)?;
            decode_count(rows, "unread_count")
        }))
    }

    fn mark_read(
        &self,
        recipient_id: &str,
        notification_id: &str,
        read_at_ms: i64,
    ) -> BoxFuture<'_, DomainResult<Notification>> {
        let recipient_id = recipient_id.to_string();
        let notification_id = notification_id.to_string();
        Box::pin(with_store_timeout(self.store_timeout, "notification mark read", async move {
            let notification = self
                .fetch_owned(&recipient_id, notification_id.clone())
                .await?;
            if notification.is_read() {
                return Ok(notification);
            }
            let mut response = self
                .client
                .query(
                    "UPDATE notification \
                     SET read_at_ms = $read_at_ms, updated_at_ms = $read_at_ms \
                     WHERE notification_id = $notification_id AND read_at_ms IS NONE \
                     RETURN AFTER",
                )
                .bind(("read_at_ms", read_at_ms))
                .bind(("notification_id", notification_id.clone()))
                .await
                .map_err(map_surreal_error)?;
            let rows: Vec<Value> = response.take(0).map_err(invalid_result)?;
            match Self::map_rows(rows)?.pop() {
                Some(notification) => Ok(notification),
                // Marked read or removed concurrently.
                None => self.fetch(notification_id).await?.ok_or_else(not_found),
            }
        }))
    }

    fn mark_all_read(
        &self,
        recipient_id: &str,
        read_at_ms: i64,
    ) -> BoxFuture<'_, DomainResult<usize>> {
        let recipient_id = recipient_id.to_string();
        Box::pin(with_store_timeout(self.store_timeout, "notification mark all read", async move {
            let mut response = self
                .client
                .query(
                    "UPDATE notification \
                     SET read_at_ms = $read_at_ms, updated_at_ms = $read_at_ms \
                     WHERE recipient_id = $recipient_id AND read_at_ms IS NONE \
                     RETURN notification_id",
                )
                .bind(("read_at_ms", read_at_ms))
                .bind(("recipient_id", recipient_id))
                .await
                .map_err(map_surreal_error)?;
            let rows: Vec<Value> = response.take(0).map_err(invalid_result)?;
            Ok(rows.len())
        }))
    }

    fn delete(
        &self,
        recipient_id: &str,
        notification_id: &str,
    ) -> BoxFuture<'_, DomainResult<()>> {
        let recipient_id = recipient_id.to_string();
        let notification_id = notification_id.to_string();
        Box::pin(with_store_timeout(self.store_timeout, "notification delete", async move {
            self.fetch_owned(&recipient_id, notification_id.clone())
                .await?;
            let mut response = self
                .client
                .query(
                    "DELETE notification \
                     WHERE notification_id = $notification_id AND recipient_id = $recipient_id \
                     RETURN BEFORE",
                )
                .bind(("notification_id", notification_id))
                .bind(("recipient_id", recipient_id))
                .await
                .map_err(map_surreal_error)?;
            let rows: Vec<Value> = response.take(0).map_err(invalid_result)?;
            if rows.is_empty() {
                return Err(not_found());
            }
            Ok(())
        }))
    }

    fn delete_all(&self, recipient_id: &str) -> BoxFuture<'_, DomainResult<usize>> {
        let recipient_id = recipient_id.to_string();
        Box::pin(with_store_timeout(self.store_timeout, "notification delete all", async move {
            let mut response = self
                .client
                .query("DELETE notification WHERE recipient_id = $recipient_id RETURN BEFORE")
                .bind(("recipient_id", recipient_id))
                .await
                .map_err(map_surreal_error)?;
            let rows: Vec<Value> = response.take(0).map_err(invalid_result)?;
            Ok(rows.len())
        }))
    }

    fn resolve_proposal(
        &self,
        resolution: &ProposalResolution,
    ) -> BoxFuture<'_, DomainResult<Vec<Notification>>> {
        let resolution = resolution.clone();
        let payload: DomainResult<Vec<Value>> = resolution
            .emitted
            .iter()
            .map(|notification| to_payload(&Self::to_row(notification)))
            .collect();
        Box::pin(with_store_timeout(self.store_timeout, "proposal resolution", async move {
            let statement = format!(
                "BEGIN TRANSACTION; \
                 LET $removed = (DELETE notification \
                     WHERE notification_id = $proposal_id \
                     AND recipient_id = $recipient_id \
                     AND kind = 'meetup_proposal' \
                     RETURN BEFORE); \
                 IF array::len($removed) = 0 {{ THROW \"{PROPOSAL_NOT_FOUND}\"; }}; \
                 FOR $row IN $emitted {{ CREATE notification CONTENT $row; }}; \
                 COMMIT TRANSACTION;"
            );
            let mut response = self
                .client
                .query(statement)
                .bind(("proposal_id", resolution.proposal_id.clone()))
                .bind(("recipient_id", resolution.recipient_id.clone()))
                .bind(("emitted", Value::Array(payload?)))
                .await
                .map_err(map_surreal_error)?;
            let mut errors: Vec<(usize, surrealdb::Error)> =
                response.take_errors().into_iter().collect();
            if !errors.is_empty() {
                errors.sort_by_key(|(index, _)| *index);
                return Err(map_transaction_errors(
                    errors.into_iter().map(|(_, err)| err.to_string()),
                ));
            }
            Ok(resolution.emitted)
        }))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SurrealNotificationRow {
    notification_id: String,
    recipient_id: String,
    sender_id: Option<String>,
    item_id: Option<String>,
    kind: String,
    text: String,
    location: Option<String>,
    meet_time_ms: Option<i64>,
    read_at_ms: Option<i64>,
    created_at_ms: i64,
    updated_at_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use lostfound_domain::notifications::MeetupTerms;

    #[test]
    fn rows_keep_meetup_terms() {
        let notification = Notification::new(
            "user-b",
            Some("user-a".into()),
            Some("item-1".into()),
            NotificationBody::proposal(
                "Meet at the library?",
                MeetupTerms {
                    location: "Library".into(),
                    meet_time_ms: 2_000,
                },
            ),
            1_000,
        );
        let row = SurrealNotificationRepository::to_row(&notification);
        assert_eq!(row.kind, KIND_MEETUP_PROPOSAL);
        assert_eq!(row.meet_time_ms, Some(2_000));
        let restored = SurrealNotificationRepository::from_row(row).unwrap();
        assert_eq!(restored, notification);
    }

    #[test]
    fn meetup_row_without_terms_is_rejected() {
        let row = SurrealNotificationRow {
            notification_id: "n-1".into(),
            recipient_id: "user-b".into(),
            sender_id: None,
            item_id: None,
            kind: KIND_MEETUP_PROPOSAL.into(),
            text: "meet?".into(),
            location: None,
            meet_time_ms: Some(5),
            read_at_ms: None,
            created_at_ms: 1,
            updated_at_ms: 1,
        };
        assert!(matches!(
            SurrealNotificationRepository::from_row(row),
            Err(DomainError::Unavailable(_))
        ));
    }
}
