//! Background job scheduler and job implementations.

mod pass_delivery;
mod pool_metrics;
mod scheduler;

pub use pass_delivery::PassDeliveryJob;
pub use pool_metrics::PoolMetricsJob;
pub use scheduler::{
    validate_frequency, Job, JobFrequency, JobInfo, JobScheduler, SchedulerError, SchedulerInfo,
    SchedulerStatus,
};
