//! Registration hooks called by the bot when a user joins or leaves an event.
//!
//! Both endpoints are best-effort: failures inside the lifecycle service are
//! logged and never block the registration flow itself.

use axum::{
    extract::{Path, State},
    Json,
};
use domain::models::{Pass, PassType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::metrics::{record_passes_cancelled, record_passes_created};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    #[validate(range(min = 1, message = "userId must be positive"))]
    pub user_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub pass_created: bool,
    pub pass: Option<Pass>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnregistrationResponse {
    pub cancelled: u64,
}

/// Record a registration and create the user's pass when one is needed.
///
/// POST /api/v1/events/:event_id/registrations
pub async fn register(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Json(request): Json<RegistrationRequest>,
) -> Result<Json<RegistrationResponse>, ApiError> {
    request.validate()?;

    let pass = state
        .passes
        .handle_registration(event_id, request.user_id)
        .await;
    if pass.is_some() {
        record_passes_created(PassType::Event.as_str(), 1);
    }

    Ok(Json(RegistrationResponse {
        pass_created: pass.is_some(),
        pass,
    }))
}

/// Cancel pending passes after a user leaves an event.
///
/// DELETE /api/v1/events/:event_id/registrations/:user_id
pub async fn unregister(
    State(state): State<AppState>,
    Path((event_id, user_id)): Path<(Uuid, i64)>,
) -> Result<Json<UnregistrationResponse>, ApiError> {
    let cancelled = state.passes.handle_unregistration(event_id, user_id).await;
    record_passes_cancelled("unregistration", cancelled);

    Ok(Json(UnregistrationResponse { cancelled }))
}
