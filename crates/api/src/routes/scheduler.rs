//! Scheduler inspection and manual delivery runs.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use domain::models::DeliveryBucket;
use domain::services::TickSummary;
use domain::DeliveryError;
use serde::Serialize;
use tracing::info;

use crate::app::AppState;
use crate::error::ApiError;
use crate::jobs::SchedulerInfo;
use crate::middleware::metrics::{record_delivery_failure, record_delivery_tick};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketInfo {
    pub name: String,
    pub active: bool,
    pub trigger: String,
    pub lead_time_hours: i64,
    pub has_email: bool,
    pub has_chat: bool,
    pub next_run: Option<DateTime<Utc>>,
}

impl BucketInfo {
    fn from_bucket(bucket: &DeliveryBucket, now: DateTime<Utc>) -> Self {
        Self {
            name: bucket.name.clone(),
            active: bucket.active,
            trigger: bucket.trigger.describe(),
            lead_time_hours: bucket.lead_time.num_hours(),
            has_email: bucket.targets.has_email(),
            has_chat: bucket.targets.has_chat(),
            next_run: if bucket.active {
                bucket.trigger.next_fire_after(now)
            } else {
                None
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerResponse {
    pub scheduler: SchedulerInfo,
    pub buckets: Vec<BucketInfo>,
    pub last_tick: Option<TickSummary>,
}

/// Show registered jobs, delivery buckets and the last tick.
///
/// GET /api/v1/scheduler
pub async fn get_scheduler(State(state): State<AppState>) -> Json<SchedulerResponse> {
    let now = Utc::now();
    Json(SchedulerResponse {
        scheduler: state.scheduler.snapshot(now),
        buckets: state
            .buckets
            .iter()
            .map(|b| BucketInfo::from_bucket(b, now))
            .collect(),
        last_tick: state.delivery.last_tick().await,
    })
}

/// Run one delivery tick for a bucket immediately.
///
/// POST /api/v1/scheduler/buckets/:bucket/run
///
/// Inactive buckets can still be run by hand.
pub async fn run_bucket(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<TickSummary>, ApiError> {
    let bucket = state
        .bucket(&name)
        .ok_or_else(|| ApiError::NotFound(format!("Delivery bucket {} not found", name)))?;

    match state.delivery.run_tick(bucket, Utc::now()).await {
        Ok(summary) => {
            record_delivery_tick(&summary);
            info!(
                bucket = %summary.bucket,
                delivered = summary.passes_delivered,
                "Manual delivery run finished"
            );
            Ok(Json(summary))
        }
        Err(e) => {
            record_delivery_failure(&bucket.name);
            Err(match e {
                DeliveryError::Report(msg) => ApiError::Internal(msg),
                other => ApiError::ServiceUnavailable(other.to_string()),
            })
        }
    }
}
