//! Persistence layer for the pass engine.
//!
//! This crate contains:
//! - Database connection management and migrations
//! - Entity definitions (database row mappings)
//! - Postgres implementations of the domain storage traits

pub mod db;
pub mod entities;
pub mod error;
pub mod metrics;
pub mod repositories;
