//! Common test utilities for integration tests.
//!
//! Tests run the full router against the in-memory store and recording
//! channel mocks, so no database or network is needed.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request},
    Router,
};
use chrono::{DateTime, Duration, Utc};
use domain::models::{Club, Event, User, UserRole};
use domain::services::dispatch::{MockDocumentSender, MockEmailSender};
use domain::store::InMemoryStore;
use pass_engine_api::app::{create_app, AppState, Channels, StoreBackend};
use pass_engine_api::config::{
    BucketConfig, Config, DatabaseConfig, EmailConfig, LoggingConfig, PassesConfig,
    SecurityConfig, ServerConfig, TelegramConfig,
};
use pass_engine_api::jobs::JobScheduler;
use uuid::Uuid;

pub const TEST_API_KEY: &str = "integration-test-key";
pub const SECURITY_EMAIL: &str = "security@campus.example";
pub const SECURITY_CHAT: &str = "-100200300";

/// Test configuration: in-memory friendly, both channels targeted.
pub fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            request_timeout_secs: 30,
            shutdown_timeout_secs: 5,
        },
        database: DatabaseConfig {
            url: "postgres://unused@localhost/unused".to_string(),
            max_connections: 2,
            min_connections: 1,
            connect_timeout_secs: 5,
            idle_timeout_secs: 60,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
        },
        security: SecurityConfig {
            api_key: TEST_API_KEY.to_string(),
        },
        email: EmailConfig {
            enabled: true,
            ..EmailConfig::default()
        },
        telegram: TelegramConfig::default(),
        passes: PassesConfig {
            timezone: "Europe/Moscow".to_string(),
            excluded_roles: vec!["student".to_string()],
            email_recipients: vec![SECURITY_EMAIL.to_string()],
            chat_id: Some(SECURITY_CHAT.to_string()),
            delivery_timeout_secs: 5,
            weekday: BucketConfig {
                active: true,
                hour: 16,
                minute: 0,
                weekdays: ["Mon", "Tue", "Wed", "Thu", "Fri"]
                    .iter()
                    .map(|d| d.to_string())
                    .collect(),
            },
            weekend: BucketConfig {
                active: true,
                hour: 12,
                minute: 0,
                weekdays: vec!["Sat".to_string(), "Sun".to_string()],
            },
        },
    }
}

/// A router wired to an in-memory store and recording channels.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: InMemoryStore,
    pub email: MockEmailSender,
    pub telegram: MockDocumentSender,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_channels(test_config(), MockEmailSender::new(), MockDocumentSender::new())
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_channels(config, MockEmailSender::new(), MockDocumentSender::new())
    }

    pub fn with_channels(
        config: Config,
        email: MockEmailSender,
        telegram: MockDocumentSender,
    ) -> Self {
        let store = InMemoryStore::new();
        let channels = Channels {
            email: Arc::new(email.clone()),
            telegram: Arc::new(telegram.clone()),
        };
        let scheduler = JobScheduler::new();
        let state = AppState::new(
            config,
            StoreBackend::in_memory(store.clone()),
            channels,
            scheduler.status(),
        )
        .expect("test config must be valid");

        Self {
            router: create_app(state.clone()),
            state,
            store,
            email,
            telegram,
        }
    }

    /// Sends one request through a clone of the router.
    pub async fn send(&self, request: Request<Body>) -> axum::response::Response {
        use tower::ServiceExt;

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }
}

/// Seeds a live club.
pub async fn seed_club(store: &InMemoryStore) -> Club {
    let club = Club {
        id: Uuid::new_v4(),
        name: "Robotics club".to_string(),
        deleted_at: None,
    };
    store.insert_club(club.clone()).await;
    club
}

/// Seeds a pass-required event of `club_id` starting at `start_time`.
pub async fn seed_event(store: &InMemoryStore, club_id: Uuid, start_time: DateTime<Utc>) -> Event {
    let event = Event {
        id: Uuid::new_v4(),
        club_id,
        name: "Robotics night".to_string(),
        location: "Hall B".to_string(),
        start_time,
        pass_required: true,
        deleted_at: None,
    };
    store.insert_event(event.clone()).await;
    event
}

/// Seeds a pass-required event three days from now.
pub async fn seed_upcoming_event(store: &InMemoryStore) -> Event {
    seed_event(store, Uuid::new_v4(), Utc::now() + Duration::days(3)).await
}

pub async fn seed_user(store: &InMemoryStore, id: i64, role: UserRole) -> User {
    let user = User {
        id,
        fio: format!("Test User {}", id),
        role,
        email: None,
    };
    store.insert_user(user.clone()).await;
    user
}

/// Build a JSON request carrying the API key.
pub fn json_request_with_api_key(
    method: Method,
    uri: &str,
    body: serde_json::Value,
) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-API-Key", TEST_API_KEY)
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

/// Build a body-less request carrying the API key.
pub fn request_with_api_key(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("X-API-Key", TEST_API_KEY)
        .body(Body::empty())
        .unwrap()
}

pub fn get_request_with_api_key(uri: &str) -> Request<Body> {
    request_with_api_key(Method::GET, uri)
}

pub fn delete_request_with_api_key(uri: &str) -> Request<Body> {
    request_with_api_key(Method::DELETE, uri)
}

/// Parse response body as JSON.
pub async fn parse_response_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
}
