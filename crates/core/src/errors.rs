//! Error types and handling
//!
//! This module provides the domain-specific error types used across the crate.
//! Each concern (configuration, remote API, archive, run monitoring, log
//! collection) has its own type; the binary carries them through `anyhow`
//! and inspects the chain for exit codes.

use crate::logs::{LogPhase, LogStage};
use crate::policy::MonitoringMode;
use std::time::Duration;
use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Required inputs were neither passed as flags nor found in the environment
    #[error("Missing required arguments: {}", names.join(", "))]
    MissingArguments { names: Vec<String> },

    /// An input was present but could not be interpreted
    #[error("Invalid value '{value}' for {name}: {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },

    /// Configuration validation error
    #[error("Configuration validation error: {message}")]
    Validation { message: String },
}

/// Errors talking to the remote run-orchestration API
#[derive(Error, Debug)]
pub enum ApiError {
    /// Transport-level failure (DNS, TLS, connection reset, body read)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status code
    #[error("{method} {url} returned HTTP {status}: {body}")]
    Status {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    /// The response body was not the JSON document we expected
    #[error("Failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    /// The response decoded but lacked a field we rely on
    #[error("Response from {url} is missing {field}")]
    MissingField { url: String, field: String },
}

/// Archive creation errors
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// The source directory does not exist or is not a directory
    #[error("Working directory not found: {path}")]
    NotADirectory { path: String },

    /// Filesystem failure while walking or writing
    #[error("Archive I/O error at {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failures raised by the run monitor.
///
/// The lifecycle policy itself never fails; these are produced when the
/// monitor turns an `Error` classification, a failed fetch, the deadline or a
/// cancellation into a stopping condition.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// The status fetch capability failed (transport or non-success response)
    #[error("Failed to fetch status of run {run_id}")]
    FetchFailed {
        run_id: String,
        #[source]
        source: ApiError,
    },

    /// The deadline passed while the run was still in progress
    #[error("Run {run_id} still '{last_status}' after waiting {}s", waited.as_secs())]
    Timeout {
        run_id: String,
        waited: Duration,
        last_status: String,
    },

    /// The remote service reached a failure or cancellation status
    #[error("Run {run_id} stopped unexpectedly with status '{status}'")]
    Terminated { run_id: String, status: String },

    /// The status is outside what the lifecycle accepts
    #[error("Run {run_id} reported status '{status}', which is not valid for the {mode} lifecycle")]
    UnknownStatus {
        run_id: String,
        status: String,
        mode: MonitoringMode,
    },

    /// Monitoring was cancelled before a terminal status was observed
    #[error("Monitoring of run {run_id} was cancelled")]
    Cancelled { run_id: String },
}

impl MonitorError {
    /// Process exit code the CLI uses for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            MonitorError::FetchFailed { .. } => 1,
            MonitorError::Terminated { .. } => 3,
            MonitorError::UnknownStatus { .. } => 4,
            MonitorError::Timeout { .. } => 5,
            MonitorError::Cancelled { .. } => 130,
        }
    }
}

/// A phase's log could not be retrieved after the phase was known to have run.
///
/// `stage` tells whether the log-location lookup or the content read failed.
#[derive(Error, Debug)]
#[error("{phase} log unavailable ({stage} failed)")]
pub struct LogUnavailable {
    pub phase: LogPhase,
    pub stage: LogStage,
    #[source]
    pub source: ApiError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_config_error_display() {
        let error = ConfigError::MissingArguments {
            names: vec!["tfe-token".to_string(), "tfe-host-name".to_string()],
        };
        assert_eq!(
            error.to_string(),
            "Missing required arguments: tfe-token, tfe-host-name"
        );

        let error = ConfigError::InvalidValue {
            name: "speculative".to_string(),
            value: "maybe".to_string(),
            reason: "expected true or false".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid value 'maybe' for speculative: expected true or false"
        );
    }

    #[test]
    fn test_monitor_error_display() {
        let error = MonitorError::Terminated {
            run_id: "run-abc".to_string(),
            status: "errored".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Run run-abc stopped unexpectedly with status 'errored'"
        );

        let error = MonitorError::UnknownStatus {
            run_id: "run-abc".to_string(),
            status: "fetching".to_string(),
            mode: MonitoringMode::ApplyLifecycle,
        };
        assert_eq!(
            error.to_string(),
            "Run run-abc reported status 'fetching', which is not valid for the apply lifecycle"
        );

        let error = MonitorError::Timeout {
            run_id: "run-abc".to_string(),
            waited: Duration::from_secs(90),
            last_status: "planning".to_string(),
        };
        assert_eq!(error.to_string(), "Run run-abc still 'planning' after waiting 90s");
    }

    #[test]
    fn test_monitor_exit_codes_are_distinct() {
        let codes = [
            MonitorError::Terminated {
                run_id: String::new(),
                status: String::new(),
            }
            .exit_code(),
            MonitorError::UnknownStatus {
                run_id: String::new(),
                status: String::new(),
                mode: MonitoringMode::PlanLifecycle,
            }
            .exit_code(),
            MonitorError::Timeout {
                run_id: String::new(),
                waited: Duration::ZERO,
                last_status: String::new(),
            }
            .exit_code(),
            MonitorError::Cancelled {
                run_id: String::new(),
            }
            .exit_code(),
        ];
        assert_eq!(codes, [3, 4, 5, 130]);
    }

    fn status_error() -> ApiError {
        ApiError::Status {
            method: "GET".to_string(),
            url: "https://tfe.example.com/api/v2/runs/run-abc".to_string(),
            status: 503,
            body: "unavailable".to_string(),
        }
    }

    #[test]
    fn test_fetch_failed_keeps_source_chain() {
        let error = MonitorError::FetchFailed {
            run_id: "run-abc".to_string(),
            source: status_error(),
        };
        let source = error.source().expect("api error");
        assert!(source.to_string().contains("HTTP 503"));

        let chained = anyhow::Error::from(error);
        assert!(chained
            .chain()
            .any(|cause| cause.downcast_ref::<MonitorError>().is_some()));
    }

    #[test]
    fn test_log_unavailable_names_cause_once() {
        let error = LogUnavailable {
            phase: LogPhase::Plan,
            stage: LogStage::Location,
            source: status_error(),
        };
        assert_eq!(error.to_string(), "plan log unavailable (location lookup failed)");

        let rendered = format!("{:#}", anyhow::Error::from(error));
        assert_eq!(rendered.matches("HTTP 503").count(), 1, "{rendered}");
    }

    #[test]
    fn test_archive_error_through_anyhow() {
        let error = ArchiveError::NotADirectory {
            path: "/nope".to_string(),
        };
        let anyhow_error = anyhow::Error::from(error);
        assert!(anyhow_error.to_string().contains("Working directory not found"));
    }
}
