//! Run status model
//!
//! The remote service reports a run's progress as a free-form status string.
//! This module pins that string down to a closed enumeration and groups the
//! values into the ordered phases a run moves through:
//! queued -> planning -> (cost estimating) -> (policy checking) -> apply queue
//! -> applying -> terminal.
//!
//! Parsing is strict: a value outside the enumeration is an error, never a
//! default.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every status value the remote service can report for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Queued,
    PlanQueued,
    Planning,
    Planned,
    CostEstimating,
    CostEstimated,
    PolicyChecking,
    PolicyOverride,
    PolicySoftFailed,
    PolicyChecked,
    Confirmed,
    ApplyQueued,
    Applying,
    Applied,
    PlannedAndFinished,
    Discarded,
    Errored,
    Canceled,
    ForceCanceled,
}

/// Ordered grouping of statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Queued,
    Planning,
    CostEstimating,
    PolicyChecking,
    ApplyQueue,
    Applying,
    Terminal,
}

/// A status string outside the closed enumeration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown run status '{0}'")]
pub struct UnknownStatus(pub String);

impl RunStatus {
    /// All statuses in lifecycle order
    pub const ALL: [RunStatus; 20] = [
        RunStatus::Pending,
        RunStatus::Queued,
        RunStatus::PlanQueued,
        RunStatus::Planning,
        RunStatus::Planned,
        RunStatus::CostEstimating,
        RunStatus::CostEstimated,
        RunStatus::PolicyChecking,
        RunStatus::PolicyOverride,
        RunStatus::PolicySoftFailed,
        RunStatus::PolicyChecked,
        RunStatus::Confirmed,
        RunStatus::ApplyQueued,
        RunStatus::Applying,
        RunStatus::Applied,
        RunStatus::PlannedAndFinished,
        RunStatus::Discarded,
        RunStatus::Errored,
        RunStatus::Canceled,
        RunStatus::ForceCanceled,
    ];

    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Queued => "queued",
            RunStatus::PlanQueued => "plan_queued",
            RunStatus::Planning => "planning",
            RunStatus::Planned => "planned",
            RunStatus::CostEstimating => "cost_estimating",
            RunStatus::CostEstimated => "cost_estimated",
            RunStatus::PolicyChecking => "policy_checking",
            RunStatus::PolicyOverride => "policy_override",
            RunStatus::PolicySoftFailed => "policy_soft_failed",
            RunStatus::PolicyChecked => "policy_checked",
            RunStatus::Confirmed => "confirmed",
            RunStatus::ApplyQueued => "apply_queued",
            RunStatus::Applying => "applying",
            RunStatus::Applied => "applied",
            RunStatus::PlannedAndFinished => "planned_and_finished",
            RunStatus::Discarded => "discarded",
            RunStatus::Errored => "errored",
            RunStatus::Canceled => "canceled",
            RunStatus::ForceCanceled => "force_canceled",
        }
    }

    /// The phase this status belongs to
    pub fn phase(&self) -> Phase {
        match self {
            RunStatus::Pending | RunStatus::Queued | RunStatus::PlanQueued => Phase::Queued,
            RunStatus::Planning | RunStatus::Planned => Phase::Planning,
            RunStatus::CostEstimating | RunStatus::CostEstimated => Phase::CostEstimating,
            RunStatus::PolicyChecking
            | RunStatus::PolicyOverride
            | RunStatus::PolicySoftFailed
            | RunStatus::PolicyChecked => Phase::PolicyChecking,
            RunStatus::Confirmed | RunStatus::ApplyQueued => Phase::ApplyQueue,
            RunStatus::Applying => Phase::Applying,
            RunStatus::Applied
            | RunStatus::PlannedAndFinished
            | RunStatus::Discarded
            | RunStatus::Errored
            | RunStatus::Canceled
            | RunStatus::ForceCanceled => Phase::Terminal,
        }
    }

    /// Statuses waiting for a plan to start or finish
    pub fn is_plan_queue(&self) -> bool {
        matches!(
            self,
            RunStatus::Queued | RunStatus::Pending | RunStatus::PlanQueued | RunStatus::Planning
        )
    }

    /// Statuses between confirmation and the end of an apply
    pub fn is_apply_in_flight(&self) -> bool {
        matches!(
            self,
            RunStatus::ApplyQueued | RunStatus::Applying | RunStatus::Confirmed
        )
    }

    /// Terminal statuses that mean the run did not succeed
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            RunStatus::Discarded | RunStatus::Errored | RunStatus::Canceled | RunStatus::ForceCanceled
        )
    }

    /// Whether an apply may be confirmed from this status
    pub fn is_applicable(&self) -> bool {
        matches!(
            self,
            RunStatus::Planned | RunStatus::CostEstimated | RunStatus::PolicyChecked
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RunStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Queued => "queued",
            Phase::Planning => "planning",
            Phase::CostEstimating => "cost_estimating",
            Phase::PolicyChecking => "policy_checking",
            Phase::ApplyQueue => "apply_queue",
            Phase::Applying => "applying",
            Phase::Terminal => "terminal",
        }
    }

    /// Whether the phase only happens for some runs
    pub fn is_optional(&self) -> bool {
        matches!(self, Phase::CostEstimating | Phase::PolicyChecking)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
