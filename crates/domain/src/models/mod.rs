//! Domain models for the pass engine.

pub mod club;
pub mod delivery;
pub mod event;
pub mod pass;
pub mod user;

pub use club::Club;
pub use delivery::{DeliveryBucket, DeliveryTargets, WallClockTrigger};
pub use event::Event;
pub use pass::{NewPass, Pass, PassStatistics, PassStatus, PassType, Requester};
pub use user::{User, UserRole};
