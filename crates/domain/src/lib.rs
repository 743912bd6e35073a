//! Domain layer for the pass engine.
//!
//! This crate contains:
//! - Domain models (Pass, Event, User, Club, delivery buckets)
//! - Storage traits and an in-memory implementation
//! - Pass lifecycle, scheduling, reporting, dispatch and cascade services
//! - Domain error types

pub mod error;
pub mod models;
pub mod services;
pub mod store;

pub use error::{CascadeError, ChannelError, DeliveryError, PassError, StoreError};
