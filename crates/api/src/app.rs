use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use domain::models::DeliveryBucket;
use domain::services::{
    CascadeRegistry, DocumentSender, EmailSender, MultiChannelDispatcher, PassDeliveryService,
    PassLifecycleService, SoftDeleter,
};
use domain::store::{DirectoryLookup, InMemoryStore, PassStore, SoftDeleteStore};
use persistence::repositories::{DirectoryRepository, PassRepository, SoftDeleteRepository};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{Config, ConfigValidationError};
use crate::jobs::{JobScheduler, PassDeliveryJob, PoolMetricsJob, SchedulerStatus};
use crate::middleware::{metrics_handler, metrics_middleware, require_api_key, trace_id};
use crate::routes::{health, passes, registrations, scheduler, soft_delete};

/// Storage the services run against.
#[derive(Clone)]
pub struct StoreBackend {
    pub passes: Arc<dyn PassStore>,
    pub directory: Arc<dyn DirectoryLookup>,
    pub soft_delete: Arc<dyn SoftDeleteStore>,
    /// Set for Postgres; used by health checks and pool metrics.
    pub pool: Option<PgPool>,
}

impl StoreBackend {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            passes: Arc::new(PassRepository::new(pool.clone())),
            directory: Arc::new(DirectoryRepository::new(pool.clone())),
            soft_delete: Arc::new(SoftDeleteRepository::new(pool.clone())),
            pool: Some(pool),
        }
    }

    pub fn in_memory(store: InMemoryStore) -> Self {
        Self {
            passes: Arc::new(store.clone()),
            directory: Arc::new(store.clone()),
            soft_delete: Arc::new(store),
            pool: None,
        }
    }
}

/// Outbound transports for the consolidated report.
#[derive(Clone)]
pub struct Channels {
    pub email: Arc<dyn EmailSender>,
    pub telegram: Arc<dyn DocumentSender>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub passes: Arc<PassLifecycleService>,
    pub soft_deleter: Arc<SoftDeleter>,
    pub delivery: Arc<PassDeliveryService>,
    pub buckets: Arc<Vec<DeliveryBucket>>,
    pub scheduler: Arc<SchedulerStatus>,
    pub pool: Option<PgPool>,
}

impl AppState {
    /// Wires the domain services from configuration.
    pub fn new(
        config: Config,
        backend: StoreBackend,
        channels: Channels,
        scheduler: Arc<SchedulerStatus>,
    ) -> Result<Self, ConfigValidationError> {
        let policy = config.pass_policy()?;
        let buckets = config.delivery_buckets()?;
        let timezone = policy.timezone;

        let passes = PassLifecycleService::new(
            Arc::clone(&backend.passes),
            Arc::clone(&backend.directory),
            policy,
        );
        let soft_deleter =
            SoftDeleter::new(Arc::clone(&backend.soft_delete), CascadeRegistry::standard());
        let delivery = PassDeliveryService::new(
            Arc::clone(&backend.passes),
            Arc::clone(&backend.directory),
            MultiChannelDispatcher::new(channels.email, channels.telegram),
            timezone,
            config.delivery_timeout(),
        );

        Ok(Self {
            config: Arc::new(config),
            passes: Arc::new(passes),
            soft_deleter: Arc::new(soft_deleter),
            delivery: Arc::new(delivery),
            buckets: Arc::new(buckets),
            scheduler,
            pool: backend.pool,
        })
    }

    /// Registers one delivery job per active bucket, plus pool metrics.
    pub fn register_jobs(&self, scheduler: &mut JobScheduler) {
        for bucket in self.buckets.iter().filter(|b| b.active) {
            scheduler.register(PassDeliveryJob::new(
                bucket.clone(),
                Arc::clone(&self.delivery),
            ));
        }
        if let Some(pool) = &self.pool {
            scheduler.register(PoolMetricsJob::new(pool.clone()));
        }
    }

    pub fn bucket(&self, name: &str) -> Option<&DeliveryBucket> {
        self.buckets.iter().find(|b| b.name == name)
    }
}

pub fn create_app(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    // Bot-facing routes (require the shared API key)
    let protected_routes = Router::new()
        .route(
            "/api/v1/events/:event_id/registrations",
            post(registrations::register),
        )
        .route(
            "/api/v1/events/:event_id/registrations/:user_id",
            delete(registrations::unregister),
        )
        .route(
            "/api/v1/events/:event_id/passes",
            post(passes::create_event_passes).get(passes::list_event_passes),
        )
        .route(
            "/api/v1/events/:event_id/users/:user_id/pass",
            get(passes::get_active_pass),
        )
        .route("/api/v1/passes/:pass_id", get(passes::get_pass))
        .route("/api/v1/users/:user_id/passes", get(passes::list_user_passes))
        .route(
            "/api/v1/requesters/:requester_type/:requester_id/passes",
            get(passes::list_requester_passes),
        )
        .route("/api/v1/events/:event_id", delete(soft_delete::delete_event))
        .route("/api/v1/clubs/:club_id", delete(soft_delete::delete_club))
        .route("/api/v1/scheduler", get(scheduler::get_scheduler))
        .route(
            "/api/v1/scheduler/buckets/:bucket/run",
            post(scheduler::run_bucket),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        // Global middleware (order matters: bottom layers run first)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .with_state(state)
}
