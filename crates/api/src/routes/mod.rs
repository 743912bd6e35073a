//! HTTP route handlers.

pub mod health;
pub mod passes;
pub mod registrations;
pub mod scheduler;
pub mod soft_delete;
