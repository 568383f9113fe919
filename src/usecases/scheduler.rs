//! Poll Scheduler - Periodic Observer Refresh
//!
//! The only timer in the system: drives `fetch()` on an observer at a
//! fixed interval until shutdown. A tick that falls behind is skipped
//! rather than bursted.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::error::MonitoringError;
use crate::usecases::observer::MetricObserver;

/// Spawn a task calling `observer.fetch()` every `period`.
///
/// The first fetch runs immediately. Fetch errors are logged and the
/// loop keeps going.
pub fn spawn_poller<O: MetricObserver>(
  observer: Arc<O>,
  period: Duration,
  mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
      subsystem = observer.subsystem(),
      metric = observer.metric(),
      period_secs = period.as_secs(),
      "Poller started"
    );

    loop {
      tokio::select! {
        _ = ticker.tick() => {
          match observer.fetch().await {
            Ok(_) => debug!(subsystem = observer.subsystem(), metric = observer.metric(), "Poll complete"),
            Err(e @ MonitoringError::TickInProgress { .. }) => debug!(error = %e, "Poll skipped"),
            Err(e) => warn!(
              subsystem = observer.subsystem(),
              metric = observer.metric(),
              error = %e,
              "Poll failed"
            ),
          }
        }
        _ = shutdown_rx.recv() => {
          info!(subsystem = observer.subsystem(), metric = observer.metric(), "Poller stopped");
          break;
        }
      }
    }
  })
}
