use crate::DomainResult;
use crate::geo::{BoundingBox, GeoPoint};
use crate::items::{ItemReport, ItemStatus};
use crate::ports::BoxFuture;

/// Filter accepted by [`ItemRepository::find_by_filter`]. Results are always
/// newest first and capped at `limit`.
#[derive(Clone, Debug, Default)]
pub struct ItemFilter {
    pub within: Option<BoundingBox>,
    pub status: Option<ItemStatus>,
    pub exclude_statuses: Vec<ItemStatus>,
    pub category: Option<String>,
    pub exclude_item_id: Option<String>,
    pub limit: usize,
}

impl ItemFilter {
    pub fn matches(&self, item: &ItemReport) -> bool {
        if let Some(within) = &self.within {
            match item.location {
                Some(point) if within.contains(point) => {}
                _ => return false,
            }
        }
        if self
            .status
            .as_ref()
            .is_some_and(|status| *status != item.status)
        {
            return false;
        }
        if self.exclude_statuses.contains(&item.status) {
            return false;
        }
        if self
            .category
            .as_deref()
            .is_some_and(|category| !category.eq_ignore_ascii_case(&item.category))
        {
            return false;
        }
        if self.exclude_item_id.as_deref() == Some(item.item_id.as_str()) {
            return false;
        }
        true
    }
}

#[derive(Clone, Debug)]
pub struct ItemStatusUpdate {
    pub item_id: String,
    pub status: ItemStatus,
    pub claimer_id: Option<String>,
    pub expected_statuses: Vec<ItemStatus>,
    pub updated_at_ms: i64,
}

pub trait ItemRepository: Send + Sync {
    fn create(&self, item: &ItemReport) -> BoxFuture<'_, DomainResult<ItemReport>>;

    fn get(&self, item_id: &str) -> BoxFuture<'_, DomainResult<Option<ItemReport>>>;

    fn find_by_filter(&self, filter: &ItemFilter) -> BoxFuture<'_, DomainResult<Vec<ItemReport>>>;

    /// `Ok(None)` when the item exists but has no usable point;
    /// `Err(NotFound)` when the item does not exist.
    fn get_location(&self, item_id: &str) -> BoxFuture<'_, DomainResult<Option<GeoPoint>>>;

    /// Applies the update only while the item is still in one of
    /// `expected_statuses` (any status when empty). Returns `Conflict` otherwise.
    fn update_status(&self, update: &ItemStatusUpdate)
    -> BoxFuture<'_, DomainResult<ItemReport>>;
}
