//! Lifecycle policy
//!
//! A pure mapping from an observed run status (plus which optional phases the
//! run has, and which lifecycle is being watched) to one of three outcomes:
//! keep polling, stop with a completion kind, or stop with an error kind.
//!
//! The plan and apply lifecycles share one function so their rules cannot
//! drift apart. The policy never fails and keeps no state; turning an
//! `Error` classification into a failure is the monitor's job.

use crate::status::RunStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which part of a run's life is being observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringMode {
    /// From creation until the plan (and any cost estimate / policy check) is done
    PlanLifecycle,
    /// From apply confirmation until the apply finishes
    ApplyLifecycle,
}

impl fmt::Display for MonitoringMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitoringMode::PlanLifecycle => f.write_str("plan"),
            MonitoringMode::ApplyLifecycle => f.write_str("apply"),
        }
    }
}

/// Optional phases a run goes through, latched from the first observation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseFlags {
    pub has_cost_estimate: bool,
    pub has_policy_check: bool,
}

impl PhaseFlags {
    pub fn new(has_cost_estimate: bool, has_policy_check: bool) -> Self {
        Self {
            has_cost_estimate,
            has_policy_check,
        }
    }

    /// Neither optional phase applies
    pub fn is_ungated(&self) -> bool {
        !self.has_cost_estimate && !self.has_policy_check
    }
}

/// Why a run is considered complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionKind {
    /// Plan finished and no cost estimate or policy check follows
    PlanOnly,
    /// Cost estimate finished and no policy check follows
    AfterCostEstimate,
    /// A policy soft-failed; an operator must override before apply
    SoftFailure,
    /// Policies passed, or the run reached a successful final status
    Success,
}

/// Why a run can no longer be monitored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The service reported a failure or cancellation status
    Terminated,
    /// The status is unknown, or not valid for the lifecycle being watched
    UnknownStatus,
}

/// Result of classifying one observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    InProgress,
    Complete(CompletionKind),
    Error(ErrorKind),
}

/// Coarse outcome used for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalClass {
    Success,
    SoftStop,
    SoftFailure,
    Failure,
}

impl CompletionKind {
    pub fn terminal_class(&self) -> TerminalClass {
        match self {
            CompletionKind::PlanOnly | CompletionKind::AfterCostEstimate => TerminalClass::SoftStop,
            CompletionKind::SoftFailure => TerminalClass::SoftFailure,
            CompletionKind::Success => TerminalClass::Success,
        }
    }
}

impl fmt::Display for TerminalClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TerminalClass::Success => "success",
            TerminalClass::SoftStop => "soft stop",
            TerminalClass::SoftFailure => "soft failure",
            TerminalClass::Failure => "failure",
        };
        f.write_str(s)
    }
}

/// Classify a raw status string.
///
/// Strings outside the status enumeration classify as
/// `Error(UnknownStatus)`.
pub fn classify(
    status: &str,
    has_cost_estimate: bool,
    has_policy_check: bool,
    mode: MonitoringMode,
) -> Classification {
    match status.parse::<RunStatus>() {
        Ok(status) => classify_status(
            status,
            PhaseFlags::new(has_cost_estimate, has_policy_check),
            mode,
        ),
        Err(_) => Classification::Error(ErrorKind::UnknownStatus),
    }
}

/// Classify a parsed status
pub fn classify_status(
    status: RunStatus,
    flags: PhaseFlags,
    mode: MonitoringMode,
) -> Classification {
    // A plan still queued or running is in progress whatever is being watched
    if status.is_plan_queue() {
        return Classification::InProgress;
    }

    match mode {
        MonitoringMode::PlanLifecycle => classify_plan(status, flags),
        MonitoringMode::ApplyLifecycle => classify_apply(status),
    }
}

fn classify_plan(status: RunStatus, flags: PhaseFlags) -> Classification {
    use Classification::*;

    match status {
        RunStatus::Queued | RunStatus::Pending | RunStatus::PlanQueued | RunStatus::Planning => {
            InProgress
        }
        RunStatus::Planned => {
            if flags.is_ungated() {
                Complete(CompletionKind::PlanOnly)
            } else {
                InProgress
            }
        }
        RunStatus::CostEstimating => InProgress,
        RunStatus::CostEstimated => {
            if flags.has_policy_check {
                InProgress
            } else {
                Complete(CompletionKind::AfterCostEstimate)
            }
        }
        RunStatus::PolicyChecking => InProgress,
        // Soft-failed policy waiting on a human override
        RunStatus::PolicyOverride => InProgress,
        RunStatus::PolicySoftFailed => Complete(CompletionKind::SoftFailure),
        RunStatus::PolicyChecked => Complete(CompletionKind::Success),
        RunStatus::ApplyQueued | RunStatus::Applying | RunStatus::Confirmed => InProgress,
        RunStatus::Applied | RunStatus::PlannedAndFinished => Complete(CompletionKind::Success),
        RunStatus::Discarded | RunStatus::Errored | RunStatus::Canceled | RunStatus::ForceCanceled => {
            Error(ErrorKind::Terminated)
        }
    }
}

fn classify_apply(status: RunStatus) -> Classification {
    if status.is_apply_in_flight() {
        Classification::InProgress
    } else if status.is_failure() {
        Classification::Error(ErrorKind::Terminated)
    } else if status == RunStatus::Applied {
        Classification::Complete(CompletionKind::Success)
    } else {
        Classification::Error(ErrorKind::UnknownStatus)
    }
}
