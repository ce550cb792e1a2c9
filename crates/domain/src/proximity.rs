use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;
use crate::geo::{BoundingBox, GeoPoint, haversine_km, round_km};
use crate::items::{ItemReport, ItemStatus};
use crate::ports::items::{ItemFilter, ItemRepository};

pub const DEFAULT_RADIUS_KM: f64 = 5.0;
pub const CANDIDATE_LIMIT: usize = 50;

/// Raw search input as received from a caller; nothing is validated yet.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProximityQuery {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub radius_km: Option<f64>,
}

impl ProximityQuery {
    /// Parses textual parameters. Blank values count as missing and
    /// unparsable coordinates become NaN so range validation rejects them.
    pub fn parse(
        latitude: Option<&str>,
        longitude: Option<&str>,
        radius_km: Option<&str>,
    ) -> DomainResult<Self> {
        let radius_km = match blank_to_none(radius_km) {
            Some(raw) => Some(raw.parse::<f64>().map_err(|_| invalid_radius())?),
            None => None,
        };
        Ok(Self {
            latitude: blank_to_none(latitude).map(parse_coordinate),
            longitude: blank_to_none(longitude).map(parse_coordinate),
            radius_km,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RankedItem {
    #[serde(flatten)]
    pub item: ItemReport,
    pub distance: f64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct SearchLocation {
    pub latitude: f64,
    pub longitude: f64,
}

impl From<GeoPoint> for SearchLocation {
    fn from(point: GeoPoint) -> Self {
        Self {
            latitude: point.latitude,
            longitude: point.longitude,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProximityResults {
    pub results: Vec<RankedItem>,
    pub count: usize,
    pub radius_km: f64,
    pub search_location: SearchLocation,
}

#[derive(Clone)]
pub struct ProximityService {
    repository: Arc<dyn ItemRepository>,
}

impl ProximityService {
    pub fn new(repository: Arc<dyn ItemRepository>) -> Self {
        Self { repository }
    }

    pub async fn search(&self, query: ProximityQuery) -> DomainResult<ProximityResults> {
        let (origin, radius_km) = normalize_query(&query)?;
        self.search_around(origin, radius_km, None).await
    }

    /// Searches around the stored point of an existing report, leaving the
    /// report itself out of the results.
    pub async fn search_near_item(
        &self,
        item_id: &str,
        radius_km: Option<f64>,
    ) -> DomainResult<ProximityResults> {
        let radius_km = normalize_radius(radius_km)?;
        let origin = self
            .repository
            .get_location(item_id)
            .await?
            .ok_or_else(|| DomainError::Validation("item has no location".into()))?;
        self.search_around(origin, radius_km, Some(item_id)).await
    }

    async fn search_around(
        &self,
        origin: GeoPoint,
        radius_km: f64,
        exclude_item_id: Option<&str>,
    ) -> DomainResult<ProximityResults> {
        let filter = ItemFilter {
            within: Some(BoundingBox::around(origin, radius_km)),
            exclude_statuses: vec![ItemStatus::Claimed, ItemStatus::Returned],
            exclude_item_id: exclude_item_id.map(str::to_string),
            limit: CANDIDATE_LIMIT,
            ..ItemFilter::default()
        };
        let candidates = self.repository.find_by_filter(&filter).await?;
        let candidate_count = candidates.len();
        let results = rank_candidates(origin, radius_km, candidates);
        tracing::debug!(
            latitude = origin.latitude,
            longitude = origin.longitude,
            radius_km,
            candidate_count,
            result_count = results.len(),
            "proximity search ranked candidates"
        );

        Ok(ProximityResults {
            count: results.len(),
            results,
            radius_km,
            search_location: origin.into(),
        })
    }
}

/// Computes exact distances, drops anything outside the radius, settled or
/// without a point, and orders nearest first. The sort is stable so equal
/// distances keep the store's newest-first order.
pub fn rank_candidates(
    origin: GeoPoint,
    radius_km: f64,
    candidates: Vec<ItemReport>,
) -> Vec<RankedItem> {
    let mut ranked: Vec<RankedItem> = candidates
        .into_iter()
        .filter(|item| !item.status.is_settled())
        .filter_map(|item| {
            let point = item.location?;
            let distance = round_km(haversine_km(origin, point));
            (distance <= radius_km).then_some(RankedItem { item, distance })
        })
        .collect();
    ranked.sort_by(|left, right| left.distance.total_cmp(&right.distance));
    ranked.truncate(CANDIDATE_LIMIT);
    ranked
}

pub fn normalize_query(query: &ProximityQuery) -> DomainResult<(GeoPoint, f64)> {
    let (Some(latitude), Some(longitude)) = (query.latitude, query.longitude) else {
        return Err(DomainError::MissingParameters(
            "Latitude and longitude required".into(),
        ));
    };
    let origin = GeoPoint::new(latitude, longitude)?;
    let radius_km = normalize_radius(query.radius_km)?;
    Ok((origin, radius_km))
}

pub fn normalize_radius(radius_km: Option<f64>) -> DomainResult<f64> {
    match radius_km {
        None => Ok(DEFAULT_RADIUS_KM),
        Some(radius) if radius.is_finite() && radius > 0.0 => Ok(radius),
        Some(_) => Err(invalid_radius()),
    }
}

fn invalid_radius() -> DomainError {
    DomainError::Validation("radius_km must be a positive number".into())
}

fn blank_to_none(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn parse_coordinate(raw: &str) -> f64 {
    raw.parse::<f64>().unwrap_or(f64::NAN)
}
