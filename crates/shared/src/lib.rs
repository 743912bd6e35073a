//! Shared utilities and common types for the pass engine.
//!
//! This crate provides common functionality used across all other crates:
//! - Hashing helpers for API key comparison
//! - Offset pagination
//! - Common validation logic
//! - Timezone parsing and local-time formatting

pub mod crypto;
pub mod pagination;
pub mod time;
pub mod validation;
