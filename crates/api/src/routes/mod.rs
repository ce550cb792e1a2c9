mod items;
mod notifications;

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use lostfound_domain::identity::ActorIdentity;
use serde::Serialize;

use crate::error::ApiError;
use crate::middleware::AuthContext;
use crate::{middleware as app_middleware, observability, state::AppState};

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/v1/items", post(items::create_item))
        .route(
            "/v1/items/:item_id/status",
            patch(items::update_item_status),
        )
        .route("/v1/items/:item_id/claim", post(items::claim_item))
        .route("/v1/notifications", post(notifications::create_notification))
        .route(
            "/v1/notifications/:notification_id",
            get(notifications::view_notification).delete(notifications::delete_notification),
        )
        .route(
            "/v1/notifications/:notification_id/read",
            post(notifications::mark_notification_read),
        )
        .route(
            "/v1/notifications/:notification_id/accept",
            post(notifications::accept_meetup),
        )
        .route(
            "/v1/notifications/:notification_id/contest",
            post(notifications::contest_meetup),
        )
        .route(
            "/v1/notifications/:notification_id/deny",
            post(notifications::deny_meetup),
        )
        .route(
            "/v1/users/:user_id/notifications",
            get(notifications::list_notifications).delete(notifications::delete_all_notifications),
        )
        .route(
            "/v1/users/:user_id/notifications/read-all",
            post(notifications::mark_all_notifications_read),
        )
        .route_layer(middleware::from_fn(app_middleware::require_auth_middleware));

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/v1/items", get(items::list_items))
        .route("/v1/items/nearby", get(items::nearby_items))
        .route("/v1/items/:item_id", get(items::get_item))
        .route("/v1/items/:item_id/nearby", get(items::items_near_item))
        .merge(protected)
        .layer(middleware::from_fn(app_middleware::metrics_layer))
        .layer(app_middleware::timeout_layer())
        .layer(app_middleware::trace_layer())
        .layer(app_middleware::set_request_id_layer())
        .layer(app_middleware::propagate_request_id_layer())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::auth_middleware,
        ))
        .layer(middleware::from_fn(
            app_middleware::correlation_id_middleware,
        ));

    if !state.config.app_env.eq_ignore_ascii_case("test") {
        app = app.layer(app_middleware::rate_limit_layer());
    }

    app.with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
    data_backend: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.app_env.clone(),
        data_backend: state.config.data_backend.clone(),
    })
}

async fn metrics() -> Response {
    match observability::render_metrics() {
        Some(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => ApiError::NotFound("metrics recorder is not installed".into()).into_response(),
    }
}

fn actor_identity(auth: &AuthContext) -> Result<ActorIdentity, ApiError> {
    let user_id = auth
        .user_id
        .as_ref()
        .filter(|user_id| !user_id.trim().is_empty())
        .ok_or(ApiError::Unauthorized)?;
    Ok(ActorIdentity {
        user_id: user_id.to_string(),
        username: auth.username.clone().unwrap_or_else(|| user_id.to_string()),
    })
}
