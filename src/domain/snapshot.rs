//! Metric snapshots and the merged system state tree.
//!
//! Every metric keeps only its latest value. The tree is
//! `subsystem → metric → Snapshot` and serializes to the persisted
//! layout `{ [subsystem]: { [metric]: { data, updatedAt } } }`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Subsystem half of an observer key (e.g. `node`).
pub type SubsystemName = String;

/// Metric half of an observer key (e.g. `health`).
pub type MetricName = String;

/// Latest value of a single metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot<T> {
    /// Payload as published by the observer.
    pub data: T,
    /// When the store merged this value.
    pub updated_at: DateTime<Utc>,
}

impl<T> Snapshot<T> {
    /// Wrap a value stamped with the current time.
    pub fn now(data: T) -> Self {
        Self {
            data,
            updated_at: Utc::now(),
        }
    }
}

/// All metrics of one subsystem.
pub type SubsystemState = BTreeMap<MetricName, Snapshot<Value>>;

/// The full queryable tree.
pub type SystemState = BTreeMap<SubsystemName, SubsystemState>;

/// Compare two trees on their keys and payloads, ignoring `updatedAt`.
///
/// Re-publishing an identical value only moves the timestamp, which
/// must not count as a change worth persisting.
pub fn same_data(a: &SystemState, b: &SystemState) -> bool {
    a.len() == b.len()
        && a.iter().all(|(subsystem, metrics)| {
            b.get(subsystem).is_some_and(|other| {
                metrics.len() == other.len()
                    && metrics
                        .iter()
                        .all(|(metric, snapshot)| other.get(metric).is_some_and(|o| o.data == snapshot.data))
            })
        })
}
