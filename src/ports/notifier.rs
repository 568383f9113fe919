//! Notifier Port - Operator Alert Mail

use async_trait::async_trait;

/// Trait for operator notification channels.
///
/// One call is one mail: a subject plus its body lines. Callers batch
/// everything a tick produced into a single call.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
  /// Send an alert mail and wait for the channel to accept it.
  async fn send_alert(&self, subject: &str, lines: &[String]) -> anyhow::Result<()>;
}
