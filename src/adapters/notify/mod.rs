//! Notifier Adapters - Operator Alert Channels
//!
//! Implements the `Notifier` port:
//! - `LogNotifier`: writes alerts to the structured log only
//! - `WebhookNotifier`: posts alerts to a mail relay over HTTP

pub mod log;
pub mod webhook;

pub use log::LogNotifier;
pub use webhook::{WebhookNotifier, WebhookNotifierConfig};
