//! Phase log collection
//!
//! Once a run has stopped, fetch the log of every phase that actually ran.
//! Each log is a two-step lookup: first a phase-specific log location, then
//! the content behind it. Either step can fail on its own, and a failure is
//! kept as a [`LogUnavailable`] entry instead of turning into empty text.
//!
//! Logs are normalized before they leave this module: ANSI escape sequences
//! are stripped because summary storage does not render them.

use crate::errors::{ApiError, LogUnavailable};
use crate::monitor::{RunSnapshot, TerminalOutcome};
use crate::observability;
use crate::policy::MonitoringMode;
use crate::status::RunStatus;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn, Instrument};

/// CSI sequences (`ESC [ params intermediates final`) and two-byte `ESC Fe`
/// escapes. `[` is left out of the two-byte range so CSI is matched whole.
static ANSI_ESCAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1B(?:[@-Z\x5C-_]|\[[0-?]*[ -/]*[@-~])").expect("ANSI escape pattern is valid")
});

/// Remove ANSI color and cursor escape sequences
pub fn strip_ansi(input: &str) -> String {
    ANSI_ESCAPE.replace_all(input, "").into_owned()
}

/// Phases that produce a log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogPhase {
    Plan,
    CostEstimate,
    PolicyCheck,
    Apply,
}

impl LogPhase {
    /// Heading used in summaries
    pub fn title(&self) -> &'static str {
        match self {
            LogPhase::Plan => "Plan",
            LogPhase::CostEstimate => "Cost Estimate",
            LogPhase::PolicyCheck => "Policy Check",
            LogPhase::Apply => "Apply",
        }
    }
}

impl fmt::Display for LogPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogPhase::Plan => "plan",
            LogPhase::CostEstimate => "cost estimate",
            LogPhase::PolicyCheck => "policy check",
            LogPhase::Apply => "apply",
        };
        f.write_str(s)
    }
}

/// Which half of the two-step lookup failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStage {
    Location,
    Content,
}

impl fmt::Display for LogStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogStage::Location => f.write_str("location lookup"),
            LogStage::Content => f.write_str("content read"),
        }
    }
}

/// Capability to locate and read phase logs
#[async_trait]
pub trait PhaseLogSource: Send + Sync {
    /// Resolve where the log of `phase` can be read from
    async fn log_location(
        &self,
        run_id: &str,
        snapshot: &RunSnapshot,
        phase: LogPhase,
    ) -> std::result::Result<String, ApiError>;

    /// Read the log behind a location returned by `log_location`
    async fn read_log(
        &self,
        phase: LogPhase,
        location: &str,
    ) -> std::result::Result<String, ApiError>;
}

/// Logs of the phases a run went through
///
/// A `None` section either did not apply to the run or could not be fetched;
/// the latter case always has a matching entry in `unavailable`.
#[derive(Debug, Default)]
pub struct PhaseLogs {
    pub plan: Option<String>,
    pub cost_estimate: Option<String>,
    pub policy_check: Option<String>,
    pub apply: Option<String>,
    pub unavailable: Vec<LogUnavailable>,
}

impl PhaseLogs {
    pub fn get(&self, phase: LogPhase) -> Option<&str> {
        match phase {
            LogPhase::Plan => self.plan.as_deref(),
            LogPhase::CostEstimate => self.cost_estimate.as_deref(),
            LogPhase::PolicyCheck => self.policy_check.as_deref(),
            LogPhase::Apply => self.apply.as_deref(),
        }
    }

    fn set(&mut self, phase: LogPhase, text: String) {
        let slot = match phase {
            LogPhase::Plan => &mut self.plan,
            LogPhase::CostEstimate => &mut self.cost_estimate,
            LogPhase::PolicyCheck => &mut self.policy_check,
            LogPhase::Apply => &mut self.apply,
        };
        *slot = Some(text);
    }

    pub fn is_complete(&self) -> bool {
        self.unavailable.is_empty()
    }

    /// Fail with the first missing log, if any
    pub fn ensure_complete(mut self) -> std::result::Result<Self, LogUnavailable> {
        if self.unavailable.is_empty() {
            Ok(self)
        } else {
            Err(self.unavailable.remove(0))
        }
    }
}

/// Phases whose logs should be collected for `outcome`, in report order
pub fn phases_to_collect(outcome: &TerminalOutcome) -> Vec<LogPhase> {
    let mut phases = vec![LogPhase::Plan];
    if outcome.flags.has_cost_estimate {
        phases.push(LogPhase::CostEstimate);
    }
    if outcome.flags.has_policy_check {
        phases.push(LogPhase::PolicyCheck);
    }
    // A plan-lifecycle watch that ends in `applied` saw an auto-apply
    let applied = outcome.mode == MonitoringMode::ApplyLifecycle
        || outcome.status == RunStatus::Applied;
    if applied && outcome.is_success() {
        phases.push(LogPhase::Apply);
    }
    phases
}

/// Collect the logs of every phase that ran.
///
/// Never fails: missing logs are listed in [`PhaseLogs::unavailable`] so they
/// cannot mask the outcome the monitor already determined.
pub async fn collect<S>(source: &S, outcome: &TerminalOutcome) -> PhaseLogs
where
    S: PhaseLogSource + ?Sized,
{
    let span = observability::run_collect_logs_span(&outcome.run_id);
    async move {
        let mut logs = PhaseLogs::default();
        for phase in phases_to_collect(outcome) {
            match fetch_phase_log(source, outcome, phase).await {
                Ok(text) => {
                    debug!(%phase, bytes = text.len(), "Collected log");
                    logs.set(phase, strip_ansi(&text));
                }
                Err(unavailable) => {
                    warn!(%phase, stage = %unavailable.stage, error = %unavailable.source, "{}", unavailable);
                    logs.unavailable.push(unavailable);
                }
            }
        }
        info!(
            missing = logs.unavailable.len(),
            "Collected logs for run {}",
            outcome.run_id
        );
        logs
    }
    .instrument(span)
    .await
}

async fn fetch_phase_log<S>(
    source: &S,
    outcome: &TerminalOutcome,
    phase: LogPhase,
) -> std::result::Result<String, LogUnavailable>
where
    S: PhaseLogSource + ?Sized,
{
    let location = source
        .log_location(&outcome.run_id, &outcome.snapshot, phase)
        .await
        .map_err(|source| LogUnavailable {
            phase,
            stage: LogStage::Location,
            source,
        })?;
    debug!(%phase, %location, "Resolved log location");

    source
        .read_log(phase, &location)
        .await
        .map_err(|source| LogUnavailable {
            phase,
            stage: LogStage::Content,
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{CompletionKind, PhaseFlags};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct StubLogSource {
        location_calls: Mutex<HashMap<LogPhase, u32>>,
        read_calls: Mutex<HashMap<LogPhase, u32>>,
        fail_location: Option<LogPhase>,
        fail_read: Option<LogPhase>,
    }

    impl StubLogSource {
        fn location_calls(&self, phase: LogPhase) -> u32 {
            *self.location_calls.lock().unwrap().get(&phase).unwrap_or(&0)
        }

        fn read_calls(&self, phase: LogPhase) -> u32 {
            *self.read_calls.lock().unwrap().get(&phase).unwrap_or(&0)
        }
    }

    fn not_found(url: &str) -> ApiError {
        ApiError::Status {
            method: "GET".to_string(),
            url: url.to_string(),
            status: 404,
            body: "not found".to_string(),
        }
    }

    #[async_trait]
    impl PhaseLogSource for StubLogSource {
        async fn log_location(
            &self,
            _run_id: &str,
            _snapshot: &RunSnapshot,
            phase: LogPhase,
        ) -> std::result::Result<String, ApiError> {
            *self.location_calls.lock().unwrap().entry(phase).or_default() += 1;
            if self.fail_location == Some(phase) {
                return Err(not_found("location"));
            }
            Ok(format!("https://logs.example.com/{phase:?}"))
        }

        async fn read_log(
            &self,
            phase: LogPhase,
            location: &str,
        ) -> std::result::Result<String, ApiError> {
            *self.read_calls.lock().unwrap().entry(phase).or_default() += 1;
            if self.fail_read == Some(phase) {
                return Err(not_found(location));
            }
            Ok(format!("\x1b[1m{phase}\x1b[0m log"))
        }
    }

    fn outcome(mode: MonitoringMode, status: RunStatus, flags: PhaseFlags) -> TerminalOutcome {
        let completion = match status {
            RunStatus::Planned => CompletionKind::PlanOnly,
            RunStatus::PolicySoftFailed => CompletionKind::SoftFailure,
            _ => CompletionKind::Success,
        };
        TerminalOutcome {
            run_id: "run-123".to_string(),
            mode,
            completion,
            status,
            flags,
            snapshot: RunSnapshot::default(),
            polls: 1,
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn test_strip_ansi_color_codes() {
        assert_eq!(strip_ansi("\x1b[31mERROR\x1b[0m"), "ERROR");
        assert_eq!(
            strip_ansi("\x1b[1m\x1b[32mPlan:\x1b[0m 1 to add"),
            "Plan: 1 to add"
        );
        assert_eq!(strip_ansi("\x1b[2K\x1b[1;34mdone"), "done");
        assert_eq!(strip_ansi("no escapes here"), "no escapes here");
    }

    #[test]
    fn test_strip_ansi_two_byte_escapes() {
        // ESC M (reverse index) and ESC \ (string terminator)
        assert_eq!(strip_ansi("a\x1bMb\x1b\\c"), "abc");
    }

    #[tokio::test]
    async fn test_policy_check_log_skipped_without_flag() {
        let source = StubLogSource::default();
        let outcome = outcome(
            MonitoringMode::PlanLifecycle,
            RunStatus::CostEstimated,
            PhaseFlags::new(true, false),
        );

        let logs = collect(&source, &outcome).await;

        assert_eq!(source.location_calls(LogPhase::PolicyCheck), 0);
        assert_eq!(source.read_calls(LogPhase::PolicyCheck), 0);
        assert_eq!(source.location_calls(LogPhase::CostEstimate), 1);
        assert!(logs.policy_check.is_none());
        assert_eq!(logs.plan.as_deref(), Some("plan log"));
        assert_eq!(logs.cost_estimate.as_deref(), Some("cost estimate log"));
        assert!(logs.is_complete());
    }

    #[tokio::test]
    async fn test_apply_log_only_for_successful_apply() {
        let source = StubLogSource::default();
        let plan_outcome = outcome(
            MonitoringMode::PlanLifecycle,
            RunStatus::PolicyChecked,
            PhaseFlags::new(false, true),
        );
        let logs = collect(&source, &plan_outcome).await;
        assert!(logs.apply.is_none());
        assert_eq!(source.location_calls(LogPhase::Apply), 0);

        let apply_outcome = outcome(
            MonitoringMode::ApplyLifecycle,
            RunStatus::Applied,
            PhaseFlags::default(),
        );
        let logs = collect(&source, &apply_outcome).await;
        assert_eq!(logs.apply.as_deref(), Some("apply log"));
    }

    #[test]
    fn test_auto_applied_plan_includes_apply_log() {
        let auto_applied = outcome(
            MonitoringMode::PlanLifecycle,
            RunStatus::Applied,
            PhaseFlags::default(),
        );
        assert_eq!(
            phases_to_collect(&auto_applied),
            vec![LogPhase::Plan, LogPhase::Apply]
        );

        let soft_failed = outcome(
            MonitoringMode::PlanLifecycle,
            RunStatus::PolicySoftFailed,
            PhaseFlags::new(true, true),
        );
        assert_eq!(
            phases_to_collect(&soft_failed),
            vec![LogPhase::Plan, LogPhase::CostEstimate, LogPhase::PolicyCheck]
        );
    }

    #[tokio::test]
    async fn test_location_and_content_failures_are_distinct() {
        let source = StubLogSource {
            fail_location: Some(LogPhase::CostEstimate),
            fail_read: Some(LogPhase::PolicyCheck),
            ..StubLogSource::default()
        };
        let outcome = outcome(
            MonitoringMode::PlanLifecycle,
            RunStatus::PolicyChecked,
            PhaseFlags::new(true, true),
        );

        let logs = collect(&source, &outcome).await;

        assert_eq!(logs.plan.as_deref(), Some("plan log"));
        assert!(logs.cost_estimate.is_none());
        assert!(logs.policy_check.is_none());
        assert_eq!(logs.unavailable.len(), 2);
        assert_eq!(logs.unavailable[0].phase, LogPhase::CostEstimate);
        assert_eq!(logs.unavailable[0].stage, LogStage::Location);
        assert_eq!(logs.unavailable[1].phase, LogPhase::PolicyCheck);
        assert_eq!(logs.unavailable[1].stage, LogStage::Content);
        // A failed location lookup never proceeds to a read
        assert_eq!(source.read_calls(LogPhase::CostEstimate), 0);

        let error = logs.ensure_complete().unwrap_err();
        assert_eq!(error.phase, LogPhase::CostEstimate);
    }
}
