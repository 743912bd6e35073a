//! Database entity definitions (row mappings).

pub mod event;
pub mod pass;
pub mod user;

pub use event::EventEntity;
pub use pass::{PassEntity, PassStatisticsEntity};
pub use user::UserEntity;
