//! Alerting system for ChurnWatch
//!
//! Decides which risk snapshots alert, formats Discord embeds, and delivers
//! them to the configured webhook with rate limiting and retries.

mod decision;
mod dispatcher;
mod message;
mod notifier;
mod repository;

pub use decision::classify;
pub use dispatcher::{AlertDispatcher, DispatchOutcome};
pub use message::{DiscordMessage, Embed, EmbedField};
pub use notifier::{NotificationError, WebhookNotifier};
pub use repository::AlertRepository;
