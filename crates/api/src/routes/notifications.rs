use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
};
use lostfound_domain::meetup::{MeetupAction, ResolutionReceipt};
use lostfound_domain::notifications::{Notification, NotificationCreate, NotificationListQuery};
use lostfound_domain::util::{format_ms_rfc3339, non_blank, parse_rfc3339_ms};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::actor_identity;
use crate::extract::{JsonBody, QueryParams};
use crate::middleware::{AuthContext, CorrelationId};
use crate::{error::ApiError, observability, state::AppState, validation};

#[derive(Debug, Deserialize, Validate)]
pub(super) struct CreateNotificationRequest {
    #[validate(length(max = 128))]
    recipient_id: Option<String>,
    #[validate(length(max = 128))]
    sender_id: Option<String>,
    #[validate(length(max = 128))]
    item_id: Option<String>,
    text: Option<String>,
    #[serde(default)]
    is_meetup: bool,
    location: Option<String>,
    meet_time: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ListNotificationsParams {
    is_read: Option<bool>,
    is_meetup: Option<bool>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize, Validate)]
pub(super) struct ContestRequest {
    #[validate(length(max = 500))]
    location: Option<String>,
    meet_time: Option<String>,
}

#[derive(Serialize)]
pub(super) struct NotificationResponse {
    #[serde(flatten)]
    notification: Notification,
    is_read: bool,
    is_meetup: bool,
    meet_time: Option<String>,
}

impl From<Notification> for NotificationResponse {
    fn from(notification: Notification) -> Self {
        Self {
            is_read: notification.is_read(),
            is_meetup: notification.is_meetup(),
            meet_time: notification
                .body
                .terms()
                .map(|terms| format_ms_rfc3339(terms.meet_time_ms)),
            notification,
        }
    }
}

#[derive(Serialize)]
pub(super) struct NotificationListResponse {
    results: Vec<NotificationResponse>,
    count: usize,
    unread_count: usize,
}

#[derive(Serialize)]
pub(super) struct NotificationViewResponse {
    notification: NotificationResponse,
    actions: Vec<MeetupAction>,
}

#[derive(Serialize)]
pub(super) struct ResolutionResponse {
    proposal_id: String,
    outcome: &'static str,
    notifications: Vec<NotificationResponse>,
}

impl From<ResolutionReceipt> for ResolutionResponse {
    fn from(receipt: ResolutionReceipt) -> Self {
        Self {
            proposal_id: receipt.proposal_id,
            outcome: receipt.outcome.as_str(),
            notifications: receipt.notifications.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Serialize)]
pub(super) struct UpdatedResponse {
    updated: usize,
}

#[derive(Serialize)]
pub(super) struct DeletedResponse {
    deleted: usize,
}

fn parse_meet_time(raw: Option<&str>) -> Result<Option<i64>, ApiError> {
    non_blank(raw)
        .map(|value| parse_rfc3339_ms("meet_time", value))
        .transpose()
        .map_err(ApiError::from)
}

pub(super) async fn create_notification(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    JsonBody(payload): JsonBody<CreateNotificationRequest>,
) -> Result<(StatusCode, Json<NotificationResponse>), ApiError> {
    validation::validate(&payload)?;
    let actor = actor_identity(&auth)?;
    let sender_id = match non_blank(payload.sender_id.as_deref()) {
        Some(sender_id) if sender_id != actor.user_id => {
            return Err(ApiError::Forbidden(
                "sender must be the authenticated user".into(),
            ));
        }
        _ => actor.user_id.clone(),
    };
    let meet_time_ms = if payload.is_meetup {
        parse_meet_time(payload.meet_time.as_deref())?
    } else {
        None
    };

    let input = NotificationCreate {
        recipient_id: payload.recipient_id.unwrap_or_default(),
        sender_id: Some(sender_id),
        item_id: payload.item_id,
        text: payload.text.unwrap_or_default(),
        is_meetup: payload.is_meetup,
        location: payload.location,
        meet_time_ms,
    };
    let notification = if input.is_meetup {
        state.negotiator.propose(input).await?
    } else {
        state.notifications.create(input).await?
    };
    Ok((StatusCode::CREATED, Json(notification.into())))
}

pub(super) async fn list_notifications(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<String>,
    QueryParams(params): QueryParams<ListNotificationsParams>,
) -> Result<Json<NotificationListResponse>, ApiError> {
    let actor = actor_identity(&auth)?;
    let page = state
        .notifications
        .list(
            &actor,
            NotificationListQuery {
                recipient_id: user_id,
                is_read: params.is_read,
                is_meetup: params.is_meetup,
                limit: params.limit,
            },
        )
        .await?;
    Ok(Json(NotificationListResponse {
        results: page.results.into_iter().map(Into::into).collect(),
        count: page.count,
        unread_count: page.unread_count,
    }))
}

pub(super) async fn view_notification(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(notification_id): Path<String>,
) -> Result<Json<NotificationViewResponse>, ApiError> {
    let actor = actor_identity(&auth)?;
    let view = state.notifications.view(&actor, &notification_id).await?;
    Ok(Json(NotificationViewResponse {
        notification: view.notification.into(),
        actions: view.actions,
    }))
}

pub(super) async fn mark_notification_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(notification_id): Path<String>,
) -> Result<Json<NotificationResponse>, ApiError> {
    let actor = actor_identity(&auth)?;
    let notification = state
        .notifications
        .mark_read(&actor, &notification_id)
        .await?;
    Ok(Json(notification.into()))
}

pub(super) async fn mark_all_notifications_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<String>,
) -> Result<Json<UpdatedResponse>, ApiError> {
    let actor = actor_identity(&auth)?;
    let updated = state.notifications.mark_all_read(&actor, &user_id).await?;
    Ok(Json(UpdatedResponse { updated }))
}

pub(super) async fn delete_notification(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(notification_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let actor = actor_identity(&auth)?;
    state.notifications.delete(&actor, &notification_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn delete_all_notifications(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let actor = actor_identity(&auth)?;
    let deleted = state.notifications.delete_all(&actor, &user_id).await?;
    Ok(Json(DeletedResponse { deleted }))
}

pub(super) async fn accept_meetup(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Extension(correlation_id): Extension<CorrelationId>,
    Path(notification_id): Path<String>,
) -> Result<Json<ResolutionResponse>, ApiError> {
    let actor = actor_identity(&auth)?;
    let result = state.negotiator.accept(&actor, &notification_id).await;
    finish_resolution(MeetupAction::Accept, &correlation_id, result)
}

pub(super) async fn contest_meetup(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Extension(correlation_id): Extension<CorrelationId>,
    Path(notification_id): Path<String>,
    JsonBody(payload): JsonBody<ContestRequest>,
) -> Result<Json<ResolutionResponse>, ApiError> {
    validation::validate(&payload)?;
    let actor = actor_identity(&auth)?;
    let meet_time_ms = parse_meet_time(payload.meet_time.as_deref())?;
    let result = state
        .negotiator
        .contest(
            &actor,
            &notification_id,
            payload.location.as_deref(),
            meet_time_ms,
        )
        .await;
    finish_resolution(MeetupAction::Contest, &correlation_id, result)
}

pub(super) async fn deny_meetup(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Extension(correlation_id): Extension<CorrelationId>,
    Path(notification_id): Path<String>,
) -> Result<Json<ResolutionResponse>, ApiError> {
    let actor = actor_identity(&auth)?;
    let result = state.negotiator.deny(&actor, &notification_id).await;
    finish_resolution(MeetupAction::Deny, &correlation_id, result)
}

fn finish_resolution(
    action: MeetupAction,
    correlation_id: &CorrelationId,
    result: lostfound_domain::DomainResult<ResolutionReceipt>,
) -> Result<Json<ResolutionResponse>, ApiError> {
    let outcome = action.outcome().as_str();
    match result {
        Ok(receipt) => {
            observability::register_meetup_resolution(outcome, "success");
            Ok(Json(receipt.into()))
        }
        Err(err) => {
            tracing::info!(
                correlation_id = %correlation_id.0,
                outcome,
                error = %err,
                "meet-up resolution rejected"
            );
            observability::register_meetup_resolution(outcome, "rejected");
            Err(err.into())
        }
    }
}
