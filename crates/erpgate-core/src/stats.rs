//! Per-connector request statistics

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ConnectorKind;

/// Running counters owned by a connector instance.
///
/// Only the caller holding the connector's lease mutates these, so no
/// synchronisation is needed. Every attempt made by `execute_with_retry`
/// counts as a request; failed attempts additionally count as failures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectorStats {
    /// Attempts made, successful or not
    total_requests: u64,
    /// Attempts that returned an error
    failed_requests: u64,
    /// Wall time spent in all attempts
    total_response_time: Duration,
    /// Duration of the last successful connect
    connection_time: Option<Duration>,
}

impl ConnectorStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful attempt and how long it took
    pub fn record_success(&mut self, elapsed: Duration) {
        self.total_requests += 1;
        self.total_response_time += elapsed;
    }

    /// Record a failed attempt and how long it took
    pub fn record_failure(&mut self, elapsed: Duration) {
        self.total_requests += 1;
        self.failed_requests += 1;
        self.total_response_time += elapsed;
    }

    /// Record how long the last successful connect took
    pub fn record_connect(&mut self, elapsed: Duration) {
        self.connection_time = Some(elapsed);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests
    }

    pub fn failed_requests(&self) -> u64 {
        self.failed_requests
    }

    pub fn total_response_time(&self) -> Duration {
        self.total_response_time
    }

    pub fn connection_time(&self) -> Option<Duration> {
        self.connection_time
    }

    /// Percentage of requests that succeeded, 100 when nothing ran yet
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            100.0
        } else {
            let succeeded = self.total_requests - self.failed_requests;
            succeeded as f64 / self.total_requests as f64 * 100.0
        }
    }

    /// Mean response time in seconds, 0 when nothing ran yet
    pub fn average_response_time(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.total_response_time.as_secs_f64() / self.total_requests as f64
        }
    }

    /// Snapshot for the status surface
    pub fn snapshot(&self, kind: ConnectorKind, connected: bool) -> ConnectorStatistics {
        ConnectorStatistics {
            kind,
            connected,
            connection_time: self.connection_time.map(|d| d.as_secs_f64()),
            total_requests: self.total_requests,
            failed_requests: self.failed_requests,
            success_rate: self.success_rate(),
            average_response_time: self.average_response_time(),
        }
    }
}

/// Serializable view of a connector's statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorStatistics {
    /// Backend family of the connector
    pub kind: ConnectorKind,
    /// Whether the connector held a live session when the snapshot was taken
    pub connected: bool,
    /// Seconds the last successful connect took
    pub connection_time: Option<f64>,
    /// Attempts made, including retries
    pub total_requests: u64,
    /// Attempts that failed
    pub failed_requests: u64,
    /// Percentage of attempts that succeeded (0 to 100)
    pub success_rate: f64,
    /// Mean seconds per attempt
    pub average_response_time: f64,
}
