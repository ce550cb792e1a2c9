use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lostfound_domain::DomainResult;
use lostfound_domain::error::DomainError;
use lostfound_domain::geo::GeoPoint;
use lostfound_domain::items::{ItemReport, ItemStatus};
use lostfound_domain::ports::BoxFuture;
use lostfound_domain::ports::items::{ItemFilter, ItemRepository, ItemStatusUpdate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use surrealdb::{Surreal, engine::remote::ws::Client};
use tokio::sync::RwLock;

use super::rows::{decode_rows, invalid_result, map_surreal_error, to_payload};
use crate::db::with_store_timeout;

fn newest_first(left: &ItemReport, right: &ItemReport) -> std::cmp::Ordering {
    right
        .created_at_ms
        .cmp(&left.created_at_ms)
        .then_with(|| right.item_id.cmp(&left.item_id))
}

#[derive(Default)]
pub struct InMemoryItemRepository {
    by_id: Arc<RwLock<HashMap<String, ItemReport>>>,
}

impl InMemoryItemRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ItemRepository for InMemoryItemRepository {
    fn create(&self, item: &ItemReport) -> BoxFuture<'_, DomainResult<ItemReport>> {
        let item = item.clone();
        let by_id = self.by_id.clone();
        Box::pin(async move {
            let mut by_id = by_id.write().await;
            if by_id.contains_key(&item.item_id) {
                return Err(DomainError::Conflict("item already exists".into()));
            }
            by_id.insert(item.item_id.clone(), item.clone());
            Ok(item)
        })
    }

    fn get(&self, item_id: &str) -> BoxFuture<'_, DomainResult<Option<ItemReport>>> {
        let item_id = item_id.to_string();
        let by_id = self.by_id.clone();
        Box::pin(async move { Ok(by_id.read().await.get(&item_id).cloned()) })
    }

    fn find_by_filter(&self, filter: &ItemFilter) -> BoxFuture<'_, DomainResult<Vec<ItemReport>>> {
        let filter = filter.clone();
        let by_id = self.by_id.clone();
        Box::pin(async move {
            let mut items: Vec<ItemReport> = by_id
                .read()
                .await
                .values()
                .filter(|item| filter.matches(item))
                .cloned()
                .collect();
            items.sort_by(newest_first);
            items.truncate(filter.limit);
            Ok(items)
        })
    }

    fn get_location(&self, item_id: &str) -> BoxFuture<'_, DomainResult<Option<GeoPoint>>> {
        let item_id = item_id.to_string();
        let by_id = self.by_id.clone();
        Box::pin(async move {
            by_id
                .read()
                .await
                .get(&item_id)
                .map(|item| item.location)
                .ok_or_else(|| DomainError::NotFound("item not found".into()))
        })
    }

    fn update_status(
        &self,
        update: &ItemStatusUpdate,
    ) -> BoxFuture<'_, DomainResult<ItemReport>> {
        let update = update.clone();
        let by_id = self.by_id.clone();
        Box::pin(async move {
            let mut by_id = by_id.write().await;
            let Some(item) = by_id.get_mut(&update.item_id) else {
                return Err(DomainError::NotFound("item not found".into()));
            };
            if !update.expected_statuses.is_empty()
                && !update.expected_statuses.contains(&item.status)
            {
                return Err(DomainError::Conflict(format!(
                    "item is already {}",
                    item.status.as_str()
                )));
            }
            item.status = update.status;
            item.claimer_id = update.claimer_id;
            item.updated_at_ms = update.updated_at_ms;
            Ok(item.clone())
        })
    }
}

#[derive(Clone)]
pub struct SurrealItemRepository {
    client: Arc<Surreal<Client>>,
    store_timeout: Duration,
}

impl SurrealItemRepository {
    pub fn with_client(client: Arc<Surreal<Client>>, store_timeout: Duration) -> Self {
        Self {
            client,
            store_timeout,
        }
    }

    fn to_row(item: &ItemReport) -> SurrealItemRow {
        SurrealItemRow {
            item_id: item.item_id.clone(),
            title: item.title.clone(),
            description: item.description.clone(),
            category: item.category.clone(),
            status: item.status.as_str().to_string(),
            coordinates: item
                .location
                .map(|point| point.coordinates().to_vec())
                .unwrap_or_default(),
            location_text: item.location_text.clone(),
            owner_id: item.owner_id.clone(),
            claimer_id: item.claimer_id.clone(),
            created_at_ms: item.created_at_ms,
            updated_at_ms: item.updated_at_ms,
        }
    }

    fn from_row(row: SurrealItemRow) -> DomainResult<ItemReport> {
        let status = ItemStatus::parse(&row.status).ok_or_else(|| {
            DomainError::Unavailable(format!("unknown item status '{}'", row.status))
        })?;
        Ok(ItemReport {
            item_id: row.item_id,
            title: row.title,
            description: row.description,
            category: row.category,
            status,
            location: GeoPoint::from_coordinates(&row.coordinates),
            location_text: row.location_text,
            owner_id: row.owner_id,
            claimer_id: row.claimer_id,
            created_at_ms: row.created_at_ms,
            updated_at_ms: row.updated_at_ms,
        })
    }

    fn map_rows(rows: Vec<Value>) -> DomainResult<Vec<ItemReport>> {
        decode_rows::<SurrealItemRow>(rows, "item")?
            .into_iter()
            .map(Self::from_row)
            .collect()
    }

    /// Renders the WHERE clause for `filter`. Items without exactly two
    /// coordinates never match a spatial filter.
    fn filter_clause(filter: &ItemFilter) -> (String, Vec<(String, Value)>) {
        let mut clauses = Vec::new();
        let mut binds: Vec<(String, Value)> = Vec::new();

        if let Some(within) = &filter.within {
            clauses.push("array::len(coordinates) = 2".to_string());
            clauses.push("coordinates[1] >= $min_lat AND coordinates[1] <= $max_lat".to_string());
            binds.push(("min_lat".into(), Value::from(within.min_latitude)));
            binds.push(("max_lat".into(), Value::from(within.max_latitude)));
            let ranges: Vec<String> = within
                .longitude_ranges
                .iter()
                .enumerate()
                .map(|(index, range)| {
                    binds.push((format!("min_lng_{index}"), Value::from(range.min)));
                    binds.push((format!("max_lng_{index}"), Value::from(range.max)));
                    format!(
                        "(coordinates[0] >= $min_lng_{index} AND coordinates[0] <= $max_lng_{index})"
                    )
                })
                .collect();
            if !ranges.is_empty() {
                clauses.push(format!("({})", ranges.join(" OR ")));
            }
        }
        if let Some(status) = filter.status {
            clauses.push("status = $status".to_string());
            binds.push(("status".into(), Value::from(status.as_str())));
        }
        if !filter.exclude_statuses.is_empty() {
            clauses.push("status NOTINSIDE $excluded_statuses".to_string());
            binds.push((
                "excluded_statuses".into(),
                Value::from(
                    filter
                        .exclude_statuses
                        .iter()
                        .map(|status| status.as_str())
                        .collect::<Vec<_>>(),
                ),
            ));
        }
        if let Some(category) = &filter.category {
            clauses.push("string::lowercase(category) = string::lowercase($category)".to_string());
            binds.push(("category".into(), Value::from(category.clone())));
        }
        if let Some(exclude_item_id) = &filter.exclude_item_id {
            clauses.push("item_id != $exclude_item_id".to_string());
            binds.push(("exclude_item_id".into(), Value::from(exclude_item_id.clone())));
        }

        let clause = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        (clause, binds)
    }

    async fn fetch(&self, item_id: String) -> DomainResult<Option<ItemReport>> {
        let mut response = self
            .client
            .query("SELECT * FROM lost_item WHERE item_id = $item_id LIMIT 1")
            .bind(("item_id", item_id))
            .await
            .map_err(map_surreal_error)?;
        let rows: Vec<Value> = response.take(0).map_err(invalid_result)?;
        Ok(Self::map_rows(rows)?.pop())
    }
}

impl ItemRepository for SurrealItemRepository {
    fn create(&self, item: &ItemReport) -> BoxFuture<'_, DomainResult<ItemReport>> {
        let item = item.clone();
        let payload = to_payload(&Self::to_row(&item));
        Box::pin(with_store_timeout(self.store_timeout, "item create", async move {
            let response = self
                .client
                .query("CREATE lost_item CONTENT $payload")
                .bind(("payload", payload?))
                .await
                .map_err(map_surreal_error)?;
            response.check().map_err(map_surreal_error)?;
            Ok(item)
        }))
    }

    fn get(&self, item_id: &str) -> BoxFuture<'_, DomainResult<Option<ItemReport>>> {
        let item_id = item_id.to_string();
        Box::pin(with_store_timeout(
            self.store_timeout,
            "item lookup",
            self.fetch(item_id),
        ))
    }

    fn find_by_filter(&self, filter: &ItemFilter) -> BoxFuture<'_, DomainResult<Vec<ItemReport>>> {
        let (clause, binds) = Self::filter_clause(filter);
        let limit = filter.limit as i64;
        Box::pin(with_store_timeout(self.store_timeout, "item search", async move {
            let statement = format!(
                "SELECT * FROM lost_item{clause} ORDER BY created_at_ms DESC, item_id DESC LIMIT $limit"
            );
            let mut query = self.client.query(statement).bind(("limit", limit));
            for (name, value) in binds {
                query = query.bind((name, value));
            }
            let mut response = query.await.map_err(map_surreal_error)?;
            let rows: Vec<Value> = response.take(0).map_err(invalid_result)?;
            Self::map_rows(rows)
        }))
    }

    fn get_location(&self, item_id: &str) -> BoxFuture<'_, DomainResult<Option<GeoPoint>>> {
        let item_id = item_id.to_string();
        Box::pin(with_store_timeout(self.store_timeout, "item location", async move {
            let mut response = self
                .client
                .query("SELECT coordinates FROM lost_item WHERE item_id = $item_id LIMIT 1")
                .bind(("item_id", item_id))
                .await
                .map_err(map_surreal_error)?;
            let rows: Vec<Value> = response.take(0).map_err(invalid_result)?;
            let Some(row) = decode_rows::<SurrealLocationRow>(rows, "item location")?.pop() else {
                return Err(DomainError::NotFound("item not found".into()));
            };
            Ok(GeoPoint::from_coordinates(&row.coordinates))
        }))
    }

    fn update_status(
        &self,
        update: &ItemStatusUpdate,
    ) -> BoxFuture<'_, DomainResult<ItemReport>> {
        let update = update.clone();
        Box::pin(with_store_timeout(self.store_timeout, "item status update", async move {
            let expected: Vec<&str> = update
                .expected_statuses
                .iter()
                .map(|status| status.as_str())
                .collect();
            let mut response = self
                .client
                .query(
                    "UPDATE lost_item \
                     SET status = $status, claimer_id = $claimer_id, updated_at_ms = $updated_at_ms \
                     WHERE item_id = $item_id \
                     AND (array::len($expected) = 0 OR status INSIDE $expected) \
                     RETURN AFTER",
                )
                .bind(("status", update.status.as_str().to_string()))
                .bind(("claimer_id", update.claimer_id.clone()))
                .bind(("updated_at_ms", update.updated_at_ms))
                .bind(("item_id", update.item_id.clone()))
                .bind(("expected", Value::from(expected)))
                .await
                .map_err(map_surreal_error)?;
            let rows: Vec<Value> = response.take(0).map_err(invalid_result)?;
            if let Some(item) = Self::map_rows(rows)?.pop() {
                return Ok(item);
            }
            // Nothing matched: tell a missing item apart from a lost race.
            match self.fetch(update.item_id).await? {
                None => Err(DomainError::NotFound("item not found".into())),
                Some(item) => Err(DomainError::Conflict(format!(
                    "item is already {}",
                    item.status.as_str()
                ))),
            }
        }))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SurrealItemRow {
    item_id: String,
    title: String,
    description: String,
    category: String,
    status: String,
    #[serde(default)]
    coordinates: Vec<f64>,
    location_text: String,
    owner_id: String,
    claimer_id: Option<String>,
    created_at_ms: i64,
    updated_at_ms: i64,
}

#[derive(Debug, Deserialize)]
struct SurrealLocationRow {
    #[serde(default)]
    coordinates: Vec<f64>,
}
