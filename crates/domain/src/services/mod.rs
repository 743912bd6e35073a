//! Domain services.

pub mod cascade;
pub mod delivery;
pub mod dispatch;
pub mod pass_lifecycle;
pub mod report;
pub mod scheduling;

pub use cascade::{CascadeRegistry, CascadeReport, CleanupAction, EntityKind, SoftDeleteTarget, SoftDeleter};
pub use delivery::{PassDeliveryService, TickSummary};
pub use dispatch::{
    Attachment, DispatchOutcome, DocumentSender, EmailSender, MultiChannelDispatcher,
    OutgoingEmail,
};
pub use pass_lifecycle::{BatchItemError, BatchOutcome, PassLifecycleService, PassPolicy};
pub use report::{ConsolidatedReport, EventPasses};
