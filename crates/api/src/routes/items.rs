use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
};
use lostfound_domain::items::{ItemListQuery, ItemReport, ItemReportCreate, ItemStatus};
use lostfound_domain::proximity::{ProximityQuery, ProximityResults};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::actor_identity;
use crate::extract::{JsonBody, QueryParams};
use crate::middleware::AuthContext;
use crate::{error::ApiError, observability, state::AppState, validation};

#[derive(Debug, Deserialize, Validate)]
pub(super) struct CreateItemRequest {
    #[validate(length(min = 1, max = 200))]
    title: String,
    #[validate(length(max = 4000))]
    description: Option<String>,
    #[validate(length(max = 64))]
    category: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    #[validate(length(max = 500))]
    location_text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ListItemsParams {
    status: Option<String>,
    category: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize, Validate)]
pub(super) struct UpdateItemStatusRequest {
    #[validate(length(min = 1, max = 32))]
    status: String,
}

/// Raw strings so malformed numbers reach domain validation instead of
/// failing extraction.
#[derive(Debug, Deserialize)]
pub(super) struct NearbyParams {
    lat: Option<String>,
    lng: Option<String>,
    radius_km: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RadiusParams {
    radius_km: Option<String>,
}

#[derive(Serialize)]
pub(super) struct ItemListResponse {
    results: Vec<ItemReport>,
    count: usize,
}

fn parse_status(raw: &str) -> Result<ItemStatus, ApiError> {
    ItemStatus::parse(raw).ok_or_else(|| {
        ApiError::Validation(
            "status must be one of lost, found, pending, claimed, returned".into(),
        )
    })
}

pub(super) async fn create_item(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    JsonBody(payload): JsonBody<CreateItemRequest>,
) -> Result<(StatusCode, Json<ItemReport>), ApiError> {
    validation::validate(&payload)?;
    let actor = actor_identity(&auth)?;
    let item = state
        .items
        .create(
            &actor,
            ItemReportCreate {
                title: payload.title,
                description: payload.description,
                category: payload.category,
                latitude: payload.latitude,
                longitude: payload.longitude,
                location_text: payload.location_text,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub(super) async fn list_items(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<ListItemsParams>,
) -> Result<Json<ItemListResponse>, ApiError> {
    let status = params.status.as_deref().map(parse_status).transpose()?;
    let results = state
        .items
        .list(ItemListQuery {
            status,
            category: params.category,
            limit: params.limit,
        })
        .await?;
    Ok(Json(ItemListResponse {
        count: results.len(),
        results,
    }))
}

pub(super) async fn get_item(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> Result<Json<ItemReport>, ApiError> {
    Ok(Json(state.items.get(&item_id).await?))
}

pub(super) async fn update_item_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(item_id): Path<String>,
    JsonBody(payload): JsonBody<UpdateItemStatusRequest>,
) -> Result<Json<ItemReport>, ApiError> {
    validation::validate(&payload)?;
    let actor = actor_identity(&auth)?;
    let status = parse_status(&payload.status)?;
    let item = state.items.update_status(&actor, &item_id, status).await?;
    Ok(Json(item))
}

pub(super) async fn claim_item(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(item_id): Path<String>,
) -> Result<Json<ItemReport>, ApiError> {
    let actor = actor_identity(&auth)?;
    Ok(Json(state.items.claim(&actor, &item_id).await?))
}

pub(super) async fn nearby_items(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<NearbyParams>,
) -> Result<Json<ProximityResults>, ApiError> {
    let query = ProximityQuery::parse(
        params.lat.as_deref(),
        params.lng.as_deref(),
        params.radius_km.as_deref(),
    )?;
    let results = state.proximity.search(query).await?;
    observability::register_proximity_search("point", results.count);
    Ok(Json(results))
}

pub(super) async fn items_near_item(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    QueryParams(params): QueryParams<RadiusParams>,
) -> Result<Json<ProximityResults>, ApiError> {
    let radius_km = ProximityQuery::parse(None, None, params.radius_km.as_deref())?.radius_km;
    let results = state
        .proximity
        .search_near_item(&item_id, radius_km)
        .await?;
    observability::register_proximity_search("item", results.count);
    Ok(Json(results))
}
