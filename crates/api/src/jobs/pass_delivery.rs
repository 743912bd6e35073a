//! Wall-clock job delivering due passes for one bucket.

use std::sync::Arc;

use chrono::Utc;
use domain::models::DeliveryBucket;
use domain::services::PassDeliveryService;

use super::scheduler::{Job, JobFrequency};
use crate::middleware::metrics::{record_delivery_failure, record_delivery_tick};

/// Runs one delivery tick each time the bucket's trigger fires.
pub struct PassDeliveryJob {
    name: String,
    bucket: DeliveryBucket,
    service: Arc<PassDeliveryService>,
}

impl PassDeliveryJob {
    pub fn new(bucket: DeliveryBucket, service: Arc<PassDeliveryService>) -> Self {
        Self {
            name: format!("pass_delivery_{}", bucket.name),
            bucket,
            service,
        }
    }

    pub fn bucket(&self) -> &DeliveryBucket {
        &self.bucket
    }
}

#[async_trait::async_trait]
impl Job for PassDeliveryJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::WallClock(self.bucket.trigger.clone())
    }

    async fn execute(&self) -> Result<(), String> {
        match self.service.run_tick(&self.bucket, Utc::now()).await {
            Ok(summary) => {
                record_delivery_tick(&summary);
                Ok(())
            }
            Err(e) => {
                record_delivery_failure(&self.bucket.name);
                Err(e.to_string())
            }
        }
    }
}
