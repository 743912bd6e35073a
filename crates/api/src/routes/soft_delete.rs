//! Soft-delete routes for events and clubs.

use axum::{
    extract::{Path, State},
    Json,
};
use domain::services::{CascadeReport, CleanupAction, SoftDeleteTarget};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::metrics::record_passes_cancelled;

/// Soft-delete an event, cancelling its pending passes.
///
/// DELETE /api/v1/events/:event_id
pub async fn delete_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<CascadeReport>, ApiError> {
    run(&state, SoftDeleteTarget::Event(event_id)).await
}

/// Soft-delete a club and every event it owns.
///
/// DELETE /api/v1/clubs/:club_id
pub async fn delete_club(
    State(state): State<AppState>,
    Path(club_id): Path<Uuid>,
) -> Result<Json<CascadeReport>, ApiError> {
    run(&state, SoftDeleteTarget::Club(club_id)).await
}

async fn run(state: &AppState, target: SoftDeleteTarget) -> Result<Json<CascadeReport>, ApiError> {
    let report = state.soft_deleter.soft_delete(target).await?;
    record_passes_cancelled(
        "cascade",
        report.affected_by(CleanupAction::CancelPendingPasses),
    );
    Ok(Json(report))
}
