//! Repository implementations of the domain storage traits.

pub mod directory;
pub mod pass;
pub mod soft_delete;

pub use directory::DirectoryRepository;
pub use pass::PassRepository;
pub use soft_delete::{PgSoftDeleteTx, SoftDeleteRepository};
