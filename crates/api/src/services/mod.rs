//! Outbound channel integrations.

pub mod email;
pub mod telegram;

pub use email::EmailService;
pub use telegram::TelegramService;
