//! Run monitor
//!
//! Drives the poll loop for one run: fetch the status, classify it with the
//! lifecycle policy, and either sleep and fetch again or stop. The loop is
//! bounded by a deadline and can be cancelled through a
//! [`CancellationToken`].
//!
//! The optional-phase flags (cost estimate, policy check) are latched from the
//! first fetch and never re-read, so a later poll that momentarily omits a
//! relationship cannot make the monitor skip waiting for that phase.

use crate::errors::{ApiError, MonitorError};
use crate::observability;
use crate::policy::{
    classify_status, Classification, CompletionKind, ErrorKind, MonitoringMode, PhaseFlags,
    TerminalClass,
};
use crate::status::RunStatus;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

/// Default delay between two status fetches
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default upper bound on how long a run is watched
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(30 * 60);

/// One provisioning attempt on the remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub workspace_id: String,
    pub configuration_version_id: Option<String>,
    pub is_destroy: bool,
    pub is_speculative: bool,
}

impl Run {
    /// A run known only by its id
    pub fn from_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            workspace_id: String::new(),
            configuration_version_id: None,
            is_destroy: false,
            is_speculative: false,
        }
    }
}

/// What a single status fetch returns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSnapshot {
    /// Raw status string, parsed by the policy
    pub status: String,
    pub has_cost_estimate: bool,
    pub has_policy_check: bool,
    pub cost_estimate_id: Option<String>,
    pub policy_check_id: Option<String>,
    /// Reference used to locate the plan log
    pub plan_id: Option<String>,
    /// Reference used to locate the apply log
    pub apply_id: Option<String>,
    pub is_destroy: bool,
}

impl RunSnapshot {
    pub fn flags(&self) -> PhaseFlags {
        PhaseFlags::new(self.has_cost_estimate, self.has_policy_check)
    }
}

/// Capability to fetch the current state of a run
#[async_trait]
pub trait RunStatusSource: Send + Sync {
    async fn fetch_status(&self, run_id: &str) -> std::result::Result<RunSnapshot, ApiError>;
}

/// Polling discipline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

impl MonitorConfig {
    pub fn new(poll_interval: Duration, max_wait: Duration) -> Self {
        Self {
            poll_interval,
            max_wait,
        }
    }
}

/// A run that reached a stopping point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalOutcome {
    pub run_id: String,
    pub mode: MonitoringMode,
    pub completion: CompletionKind,
    pub status: RunStatus,
    /// Optional phases latched at the first fetch
    pub flags: PhaseFlags,
    /// The snapshot that produced the terminal classification
    pub snapshot: RunSnapshot,
    pub polls: u32,
    pub elapsed: Duration,
}

impl TerminalOutcome {
    pub fn terminal_class(&self) -> TerminalClass {
        self.completion.terminal_class()
    }

    /// Whether the outcome is a full success (not a soft stop or soft failure)
    pub fn is_success(&self) -> bool {
        self.completion == CompletionKind::Success
    }
}

/// Poll `source` until `run` reaches a terminal classification for `mode`.
///
/// Exactly one fetch happens per iteration. Before sleeping, the monitor
/// checks whether the next poll would land at or past `start + max_wait`; if
/// so it fails with `Timeout` instead of sleeping.
pub async fn await_terminal<S>(
    source: &S,
    run: &Run,
    mode: MonitoringMode,
    config: &MonitorConfig,
    cancel: &CancellationToken,
) -> std::result::Result<TerminalOutcome, MonitorError>
where
    S: RunStatusSource + ?Sized,
{
    let span = observability::run_monitor_span(&run.id, mode);
    async move {
        let outcome = poll_until_terminal(source, run, mode, config, cancel).await;
        if let Ok(outcome) = &outcome {
            tracing::Span::current().record(observability::fields::POLLS, outcome.polls);
        }
        outcome
    }
    .instrument(span)
    .await
}

async fn poll_until_terminal<S>(
    source: &S,
    run: &Run,
    mode: MonitoringMode,
    config: &MonitorConfig,
    cancel: &CancellationToken,
) -> std::result::Result<TerminalOutcome, MonitorError>
where
    S: RunStatusSource + ?Sized,
{
    if cancel.is_cancelled() {
        return Err(MonitorError::Cancelled {
            run_id: run.id.clone(),
        });
    }

    let started = Instant::now();
    // `None` when the deadline lies beyond what `Instant` can represent
    let deadline = started.checked_add(config.max_wait);

    let mut snapshot = fetch(source, &run.id).await?;
    let mut polls: u32 = 1;
    let flags = snapshot.flags();
    info!(
        has_cost_estimate = flags.has_cost_estimate,
        has_policy_check = flags.has_policy_check,
        "Run {} starts in status '{}'",
        run.id,
        snapshot.status
    );

    let mut last_status = snapshot.status.clone();
    loop {
        if snapshot.flags() != flags {
            debug!(
                observed = ?snapshot.flags(),
                latched = ?flags,
                "Ignoring change in optional phases after first observation"
            );
        }

        let status = match snapshot.status.parse::<RunStatus>() {
            Ok(status) => status,
            Err(_) => return Err(unknown_status(run, mode, &snapshot.status)),
        };

        match classify_status(status, flags, mode) {
            Classification::Complete(completion) => {
                info!(
                    status = %status,
                    phase = %status.phase(),
                    polls,
                    "Run {} reached a stopping point ({})",
                    run.id,
                    completion.terminal_class()
                );
                return Ok(TerminalOutcome {
                    run_id: run.id.clone(),
                    mode,
                    completion,
                    status,
                    flags,
                    snapshot,
                    polls,
                    elapsed: started.elapsed(),
                });
            }
            Classification::Error(ErrorKind::Terminated) => {
                warn!(status = %status, "Run {} stopped unexpectedly", run.id);
                return Err(MonitorError::Terminated {
                    run_id: run.id.clone(),
                    status: status.to_string(),
                });
            }
            Classification::Error(ErrorKind::UnknownStatus) => {
                return Err(unknown_status(run, mode, status.as_str()));
            }
            Classification::InProgress => {}
        }

        if next_poll_past_deadline(config.poll_interval, deadline) {
            warn!(polls, "Deadline reached while run {} is still in progress", run.id);
            return Err(MonitorError::Timeout {
                run_id: run.id.clone(),
                waited: started.elapsed(),
                last_status: status.to_string(),
            });
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!("Cancellation requested while monitoring run {}", run.id);
                return Err(MonitorError::Cancelled { run_id: run.id.clone() });
            }
            () = tokio::time::sleep(config.poll_interval) => {}
        }

        snapshot = fetch(source, &run.id).await?;
        polls += 1;
        if snapshot.status != last_status {
            info!("Run {} moved from '{}' to '{}'", run.id, last_status, snapshot.status);
            last_status = snapshot.status.clone();
        } else {
            debug!(polls, "Run {} still '{}'", run.id, snapshot.status);
        }
    }
}

/// Whether a poll scheduled `interval` from now would land at or past `deadline`
fn next_poll_past_deadline(interval: Duration, deadline: Option<Instant>) -> bool {
    match (deadline, Instant::now().checked_add(interval)) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(deadline), Some(next_poll)) => next_poll >= deadline,
    }
}

async fn fetch<S>(source: &S, run_id: &str) -> std::result::Result<RunSnapshot, MonitorError>
where
    S: RunStatusSource + ?Sized,
{
    source
        .fetch_status(run_id)
        .await
        .map_err(|source| MonitorError::FetchFailed {
            run_id: run_id.to_string(),
            source,
        })
}

fn unknown_status(run: &Run, mode: MonitoringMode, status: &str) -> MonitorError {
    warn!(status, %mode, "Run {} reported an unexpected status", run.id);
    MonitorError::UnknownStatus {
        run_id: run.id.clone(),
        status: status.to_string(),
        mode,
    }
}
