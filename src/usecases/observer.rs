//! Metric Observer - Producers of Typed Metric Snapshots
//!
//! An observer owns one `(subsystem, metric)` key and a publish
//! channel holding its latest value. It refreshes either by pull
//! (`fetch`, driven by an external scheduler) or by push
//! (`on_webhook`); both are unsupported unless overridden.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{broadcast, watch};

use crate::domain::snapshot::{MetricName, SubsystemName};
use crate::error::{MonitoringError, MonitoringResult};

/// Buffered publishes per subscriber before it lags.
const CHANNEL_CAPACITY: usize = 256;

/// Publish channel of one observer.
///
/// Keeps the latest value and fans every publish out to current
/// subscribers in publish order. Delivery is asynchronous: `publish`
/// never waits for a subscriber. A new subscription only sees values
/// published after it was created; nothing is replayed.
pub struct MetricChannel<T> {
  subsystem: SubsystemName,
  metric: MetricName,
  latest: watch::Sender<Option<T>>,
  updates: broadcast::Sender<T>,
  published: AtomicU64,
}

impl<T: Clone + Send + Sync + 'static> MetricChannel<T> {
  pub fn new(subsystem: impl Into<SubsystemName>, metric: impl Into<MetricName>) -> Self {
    let (latest, _) = watch::channel(None);
    let (updates, _) = broadcast::channel(CHANNEL_CAPACITY);

    Self {
      subsystem: subsystem.into(),
      metric: metric.into(),
      latest,
      updates,
      published: AtomicU64::new(0),
    }
  }

  pub fn subsystem(&self) -> &str {
    &self.subsystem
  }

  pub fn metric(&self) -> &str {
    &self.metric
  }

  /// Most recently published (or seeded) value.
  pub fn latest(&self) -> Option<T> {
    self.latest.borrow().clone()
  }

  /// Set the latest value without notifying subscribers.
  ///
  /// Used to rehydrate an observer from persisted state.
  pub fn seed(&self, value: T) {
    self.latest.send_replace(Some(value));
  }

  /// Store `value` as latest and notify every subscriber once.
  pub fn publish(&self, value: T) {
    self.latest.send_replace(Some(value.clone()));
    // Counted before the send so a subscriber never receives an uncounted value.
    self.published.fetch_add(1, Ordering::SeqCst);
    // No subscribers is fine: the value is still kept as latest.
    let _ = self.updates.send(value);
  }

  pub fn subscribe(&self) -> broadcast::Receiver<T> {
    self.updates.subscribe()
  }

  /// Number of values published so far (seeds excluded).
  pub fn published(&self) -> u64 {
    self.published.load(Ordering::SeqCst)
  }
}

/// A producer of snapshots for one `(subsystem, metric)` key.
#[async_trait]
pub trait MetricObserver: Send + Sync + 'static {
  /// Payload type published by this observer.
  type Data: Clone + Serialize + DeserializeOwned + Send + Sync + 'static;

  fn channel(&self) -> &MetricChannel<Self::Data>;

  fn subsystem(&self) -> &str {
    self.channel().subsystem()
  }

  fn metric(&self) -> &str {
    self.channel().metric()
  }

  fn latest(&self) -> Option<Self::Data> {
    self.channel().latest()
  }

  fn publish(&self, value: Self::Data) {
    self.channel().publish(value);
  }

  /// Pull a fresh value, publish it and return it.
  async fn fetch(&self) -> MonitoringResult<Self::Data> {
    Err(not_implemented(self.subsystem(), self.metric(), "fetch"))
  }

  /// Accept a pushed value, validate it and publish it.
  async fn on_webhook(&self, _payload: Value) -> MonitoringResult<()> {
    Err(not_implemented(self.subsystem(), self.metric(), "webhook"))
  }

  /// Convert a webhook payload into `P`, mapping failures to `InvalidPayload`.
  fn decode_payload<P: DeserializeOwned>(&self, payload: Value) -> MonitoringResult<P>
  where
    Self: Sized,
  {
    serde_json::from_value(payload).map_err(|source| MonitoringError::InvalidPayload {
      subsystem: self.subsystem().to_string(),
      metric: self.metric().to_string(),
      source,
    })
  }
}

fn not_implemented(subsystem: &str, metric: &str, operation: &'static str) -> MonitoringError {
  MonitoringError::NotImplemented {
    subsystem: subsystem.to_string(),
    metric: metric.to_string(),
    operation,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Silent {
    channel: MetricChannel<u32>,
  }

  impl MetricObserver for Silent {
    type Data = u32;

    fn channel(&self) -> &MetricChannel<u32> {
      &self.channel
    }
  }

  #[tokio::test]
  async fn test_publish_is_fifo_and_keeps_latest() {
    let channel = MetricChannel::new("dex", "volume");
    let mut rx = channel.subscribe();
    assert_eq!(channel.latest(), None);

    channel.publish(1u32);
    channel.publish(2);
    channel.publish(3);

    assert_eq!(channel.latest(), Some(3));
    assert_eq!(channel.published(), 3);
    assert_eq!(rx.recv().await.unwrap(), 1);
    assert_eq!(rx.recv().await.unwrap(), 2);
    assert_eq!(rx.recv().await.unwrap(), 3);
  }

  #[tokio::test]
  async fn test_seed_does_not_notify() {
    let channel = MetricChannel::new("dex", "volume");
    let mut rx = channel.subscribe();

    channel.seed(7u32);
    assert_eq!(channel.latest(), Some(7));
    assert!(rx.try_recv().is_err());
    assert_eq!(channel.published(), 0);
  }

  #[tokio::test]
  async fn test_subscription_does_not_replay() {
    let channel = MetricChannel::new("dex", "volume");
    channel.publish(1u32);

    let mut rx = channel.subscribe();
    channel.publish(2);
    assert_eq!(rx.recv().await.unwrap(), 2);
  }

  #[tokio::test]
  async fn test_default_operations_are_not_implemented() {
    let observer = Silent {
      channel: MetricChannel::new("dex", "volume"),
    };

    let fetched = observer.fetch().await;
    assert!(matches!(
      fetched,
      Err(MonitoringError::NotImplemented { operation: "fetch", .. })
    ));

    let pushed = observer.on_webhook(serde_json::json!(5)).await;
    assert!(matches!(
      pushed,
      Err(MonitoringError::NotImplemented { operation: "webhook", .. })
    ));
  }

  #[test]
  fn test_decode_payload_reports_invalid_shape() {
    let observer = Silent {
      channel: MetricChannel::new("dex", "volume"),
    };
    let result: MonitoringResult<u32> = observer.decode_payload(serde_json::json!("nope"));
    assert!(matches!(result, Err(MonitoringError::InvalidPayload { .. })));
  }
}
