//! Monitoring error types.

use thiserror::Error;

/// Errors surfaced by the observer registry, the state store and the
/// observers themselves.
#[derive(Debug, Error)]
pub enum MonitoringError {
    #[error("observer for {subsystem}/{metric} already registered")]
    DuplicateRegistration { subsystem: String, metric: String },

    #[error("subsystem not found: {0}")]
    SubsystemNotFound(String),

    #[error("metric not found, subsystem: {subsystem}, metric: {metric}")]
    MetricNotFound { subsystem: String, metric: String },

    #[error("observer not found, subsystem: {subsystem}, metric: {metric}")]
    ObserverNotFound { subsystem: String, metric: String },

    #[error("{operation} not supported by observer {subsystem}/{metric}")]
    NotImplemented {
        subsystem: String,
        metric: String,
        operation: &'static str,
    },

    #[error("invalid payload for {subsystem}/{metric}: {source}")]
    InvalidPayload {
        subsystem: String,
        metric: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("previous tick of {subsystem}/{metric} still running")]
    TickInProgress { subsystem: String, metric: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("collaborator failure: {0}")]
    Collaborator(#[from] anyhow::Error),
}

impl MonitoringError {
    /// True for the query errors a caller maps to "404".
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SubsystemNotFound(_) | Self::MetricNotFound { .. } | Self::ObserverNotFound { .. }
        )
    }
}

pub type MonitoringResult<T> = Result<T, MonitoringError>;
