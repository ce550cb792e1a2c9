use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;
use crate::geo::GeoPoint;
use crate::identity::ActorIdentity;
use crate::notifications::{Notification, NotificationBody};
use crate::ports::items::{ItemFilter, ItemRepository, ItemStatusUpdate};
use crate::ports::notifications::NotificationRepository;
use crate::util::{non_blank, now_ms, uuid_v7_without_dashes};

const MAX_TITLE_LENGTH: usize = 200;
const MAX_DESCRIPTION_LENGTH: usize = 4_000;
const DEFAULT_CATEGORY: &str = "Other";
const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 200;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Lost,
    Found,
    Pending,
    Claimed,
    Returned,
}

impl ItemStatus {
    pub const ALL: [ItemStatus; 5] = [
        ItemStatus::Lost,
        ItemStatus::Found,
        ItemStatus::Pending,
        ItemStatus::Claimed,
        ItemStatus::Returned,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "lost" => Some(Self::Lost),
            "found" => Some(Self::Found),
            "pending" => Some(Self::Pending),
            "claimed" => Some(Self::Claimed),
            "returned" => Some(Self::Returned),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lost => "lost",
            Self::Found => "found",
            Self::Pending => "pending",
            Self::Claimed => "claimed",
            Self::Returned => "returned",
        }
    }

    /// Claimed and returned items are settled and hidden from matching.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Claimed | Self::Returned)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ItemReport {
    pub item_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub status: ItemStatus,
    pub location: Option<GeoPoint>,
    pub location_text: String,
    pub owner_id: String,
    pub claimer_id: Option<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Clone, Debug)]
pub struct ItemReportCreate {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_text: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ItemListQuery {
    pub status: Option<ItemStatus>,
    pub category: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Clone)]
pub struct ItemService {
    repository: Arc<dyn ItemRepository>,
    notifications: Arc<dyn NotificationRepository>,
}

impl ItemService {
    pub fn new(
        repository: Arc<dyn ItemRepository>,
        notifications: Arc<dyn NotificationRepository>,
    ) -> Self {
        Self {
            repository,
            notifications,
        }
    }

    pub async fn create(
        &self,
        actor: &ActorIdentity,
        input: ItemReportCreate,
    ) -> DomainResult<ItemReport> {
        let title = non_blank(Some(input.title.as_str()))
            .ok_or_else(|| DomainError::Validation("title is required".into()))?
            .to_string();
        if title.chars().count() > MAX_TITLE_LENGTH {
            return Err(DomainError::Validation(format!(
                "title must be at most {MAX_TITLE_LENGTH} characters"
            )));
        }
        let description = input.description.unwrap_or_default().trim().to_string();
        if description.chars().count() > MAX_DESCRIPTION_LENGTH {
            return Err(DomainError::Validation(format!(
                "description must be at most {MAX_DESCRIPTION_LENGTH} characters"
            )));
        }
        let location = match (input.latitude, input.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint::new(latitude, longitude)?),
            (None, None) => None,
            _ => {
                return Err(DomainError::MissingParameters(
                    "Latitude and longitude required".into(),
                ));
            }
        };

        let now = now_ms();
        let item = ItemReport {
            item_id: uuid_v7_without_dashes(),
            title,
            description,
            category: non_blank(input.category.as_deref())
                .unwrap_or(DEFAULT_CATEGORY)
                .to_string(),
            status: ItemStatus::Lost,
            location,
            location_text: input.location_text.unwrap_or_default().trim().to_string(),
            owner_id: actor.user_id.clone(),
            claimer_id: None,
            created_at_ms: now,
            updated_at_ms: now,
        };
        let item = self.repository.create(&item).await?;
        tracing::info!(item_id = %item.item_id, owner_id = %item.owner_id, "item report created");
        Ok(item)
    }

    pub async fn get(&self, item_id: &str) -> DomainResult<ItemReport> {
        self.repository
            .get(item_id)
            .await?
            .ok_or_else(|| DomainError::NotFound("item not found".into()))
    }

    pub async fn list(&self, query: ItemListQuery) -> DomainResult<Vec<ItemReport>> {
        let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
        if !(1..=MAX_LIST_LIMIT).contains(&limit) {
            return Err(DomainError::Validation(format!(
                "limit must be between 1 and {MAX_LIST_LIMIT}"
            )));
        }
        let filter = ItemFilter {
            status: query.status,
            category: non_blank(query.category.as_deref()).map(str::to_string),
            limit,
            ..ItemFilter::default()
        };
        self.repository.find_by_filter(&filter).await
    }

    pub async fn update_status(
        &self,
        actor: &ActorIdentity,
        item_id: &str,
        status: ItemStatus,
    ) -> DomainResult<ItemReport> {
        let item = self.get(item_id).await?;
        if item.owner_id != actor.user_id {
            return Err(DomainError::Forbidden(
                "only the reporting user can change item status".into(),
            ));
        }
        let update = ItemStatusUpdate {
            item_id: item.item_id,
            status,
            claimer_id: item.claimer_id,
            expected_statuses: Vec::new(),
            updated_at_ms: now_ms(),
        };
        self.repository.update_status(&update).await
    }

    pub async fn claim(&self, actor: &ActorIdentity, item_id: &str) -> DomainResult<ItemReport> {
        let item = self.get(item_id).await?;
        if item.owner_id == actor.user_id {
            return Err(DomainError::Validation(
                "you cannot claim your own item report".into(),
            ));
        }
        if item.status.is_settled() {
            return Err(DomainError::Conflict(format!(
                "item is already {}",
                item.status.as_str()
            )));
        }
        let update = ItemStatusUpdate {
            item_id: item.item_id,
            status: ItemStatus::Claimed,
            claimer_id: Some(actor.user_id.clone()),
            expected_statuses: ItemStatus::ALL
                .into_iter()
                .filter(|status| !status.is_settled())
                .collect(),
            updated_at_ms: now_ms(),
        };
        let item = self.repository.update_status(&update).await?;
        tracing::info!(item_id = %item.item_id, claimer_id = %actor.user_id, "item claimed");

        // The claim is already stored; a lost receipt must not undo it.
        let receipt = claim_receipt(actor, &item, update.updated_at_ms);
        if let Err(err) = self.notifications.create(&receipt).await {
            tracing::warn!(
                item_id = %item.item_id,
                claimer_id = %actor.user_id,
                error = %err,
                "claim receipt not stored"
            );
        }
        Ok(item)
    }
}

/// Inbox entry that keeps a claimed item traceable from the claimer's side.
pub fn claim_receipt(actor: &ActorIdentity, item: &ItemReport, now_ms: i64) -> Notification {
    Notification::new(
        actor.user_id.clone(),
        None,
        Some(item.item_id.clone()),
        NotificationBody::plain(format!("You claimed: {}", item.title)),
        now_ms,
    )
}
