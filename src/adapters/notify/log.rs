//! Log-only notifier for setups without a mail relay.

use async_trait::async_trait;
use tracing::error;

use crate::ports::notifier::Notifier;

#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_alert(&self, subject: &str, lines: &[String]) -> anyhow::Result<()> {
        error!(subject, lines = ?lines, "Operator alert");
        Ok(())
    }
}
