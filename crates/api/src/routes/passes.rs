//! Pass routes: batch creation by administrators and clubs, and lookups.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use domain::models::{Pass, PassStatistics, Requester};
use domain::services::BatchOutcome;
use serde::{Deserialize, Serialize};
use shared::pagination::{Page, PageQuery};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::metrics::record_passes_created;

/// Request body for creating passes on behalf of an administrator or club.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePassesRequest {
    pub requester: Requester,
    #[validate(custom(function = "shared::validation::validate_user_ids"))]
    pub user_ids: Vec<i64>,
    #[validate(custom(function = "shared::validation::validate_reason"))]
    #[serde(default)]
    pub reason: String,
    /// Overrides the computed delivery time.
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPassesResponse {
    pub event_id: Uuid,
    pub passes: Vec<Pass>,
    pub statistics: PassStatistics,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassListResponse {
    pub passes: Vec<Pass>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequesterPassesResponse {
    pub requester: Requester,
    pub passes: Vec<Pass>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Create passes for several users of an event.
///
/// POST /api/v1/events/:event_id/passes
///
/// Returns 201 when at least one pass was created. Per-user failures are
/// listed in `errors` and do not fail the request.
pub async fn create_event_passes(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Json(request): Json<CreatePassesRequest>,
) -> Result<(StatusCode, Json<BatchOutcome>), ApiError> {
    request.validate()?;

    let outcome = match request.requester {
        Requester::Admin(admin_id) => {
            state
                .passes
                .create_passes_by_admin(
                    event_id,
                    &request.user_ids,
                    admin_id,
                    &request.reason,
                    request.scheduled_at,
                )
                .await?
        }
        Requester::Club(club_id) => {
            state
                .passes
                .create_passes_by_club(
                    event_id,
                    &request.user_ids,
                    club_id,
                    &request.reason,
                    request.scheduled_at,
                )
                .await?
        }
        Requester::User(_) => {
            return Err(ApiError::Validation(
                "requester must be an admin or a club".to_string(),
            ))
        }
    };

    record_passes_created(request.requester.pass_type().as_str(), outcome.created.len());
    info!(
        event_id = %event_id,
        requester = %request.requester,
        created = outcome.created.len(),
        failed = outcome.errors.len(),
        "Passes requested"
    );

    let status = if outcome.created.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(outcome)))
}

/// List every pass of an event with per-status counts.
///
/// GET /api/v1/events/:event_id/passes
pub async fn list_event_passes(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<EventPassesResponse>, ApiError> {
    let passes = state.passes.passes_for_event(event_id).await?;
    let statistics = state.passes.event_statistics(event_id).await?;

    Ok(Json(EventPassesResponse {
        event_id,
        passes,
        statistics,
    }))
}

/// Get the pending or sent pass of a user for an event.
///
/// GET /api/v1/events/:event_id/users/:user_id/pass
pub async fn get_active_pass(
    State(state): State<AppState>,
    Path((event_id, user_id)): Path<(Uuid, i64)>,
) -> Result<Json<Pass>, ApiError> {
    state
        .passes
        .active_pass(event_id, user_id)
        .await?
        .map(Json)
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "No active pass for user {} on event {}",
                user_id, event_id
            ))
        })
}

/// GET /api/v1/passes/:pass_id
pub async fn get_pass(
    State(state): State<AppState>,
    Path(pass_id): Path<Uuid>,
) -> Result<Json<Pass>, ApiError> {
    let pass = state.passes.get_pass(pass_id).await?;
    Ok(Json(pass))
}

/// List a user's passes, newest first.
///
/// GET /api/v1/users/:user_id/passes
pub async fn list_user_passes(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PassListResponse>, ApiError> {
    let page = Page::try_from(query)?;
    let passes = state.passes.passes_for_user(user_id, page).await?;

    Ok(Json(PassListResponse {
        passes,
        limit: page.limit,
        offset: page.offset,
    }))
}

/// List passes created by one requester.
///
/// GET /api/v1/requesters/:requester_type/:requester_id/passes
pub async fn list_requester_passes(
    State(state): State<AppState>,
    Path((requester_type, requester_id)): Path<(String, String)>,
    Query(query): Query<PageQuery>,
) -> Result<Json<RequesterPassesResponse>, ApiError> {
    let requester = Requester::from_parts(&requester_type, &requester_id).ok_or_else(|| {
        ApiError::Validation(format!(
            "Invalid requester {}/{}",
            requester_type, requester_id
        ))
    })?;
    let page = Page::try_from(query)?;

    let passes = state.passes.passes_by_requester(requester, page).await?;
    let total = state.passes.count_by_requester(requester).await?;

    Ok(Json(RequesterPassesResponse {
        requester,
        passes,
        total,
        limit: page.limit,
        offset: page.offset,
    }))
}
