//! Markdown run summaries
//!
//! Builds the report attached to the pipeline run from the monitor's outcome
//! and the collected phase logs. Missing logs show up in a `Warnings`
//! section instead of silently disappearing.

use crate::logs::{LogPhase, PhaseLogs};
use crate::monitor::{Run, TerminalOutcome};
use std::fmt::Write as _;
use std::path::Path;
use tracing::info;

/// File name of the plan summary
pub const PLAN_SUMMARY_FILE: &str = "runsummary.md";

/// File name of the apply summary
pub const APPLY_SUMMARY_FILE: &str = "applysummary.md";

/// Report for one observed run
#[derive(Debug)]
pub struct RunSummary<'a> {
    run: &'a Run,
    outcome: &'a TerminalOutcome,
    logs: &'a PhaseLogs,
    run_url: Option<String>,
    build_link: Option<String>,
}

impl<'a> RunSummary<'a> {
    pub fn new(run: &'a Run, outcome: &'a TerminalOutcome, logs: &'a PhaseLogs) -> Self {
        Self {
            run,
            outcome,
            logs,
            run_url: None,
            build_link: None,
        }
    }

    pub fn with_run_url(mut self, url: Option<String>) -> Self {
        self.run_url = url;
        self
    }

    pub fn with_build_link(mut self, link: Option<String>) -> Self {
        self.build_link = link;
        self
    }

    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str("## Details\n\n");
        if self.run.is_speculative {
            out.push_str("_Speculative Plan_\n\n");
        }
        if self.run.is_destroy {
            out.push_str("_Destroy Plan_\n\n");
        }
        match &self.run_url {
            Some(url) => {
                let _ = writeln!(out, "Terraform Enterprise Run: <{url}>\n");
            }
            None => {
                let _ = writeln!(out, "Terraform Enterprise Run: `{}`\n", self.outcome.run_id);
            }
        }
        if let Some(link) = &self.build_link {
            let _ = writeln!(out, "Azure DevOps Build: <{link}>\n");
        }
        let _ = writeln!(
            out,
            "Status: `{}` ({})\n",
            self.outcome.status,
            self.outcome.terminal_class()
        );

        for phase in [
            LogPhase::CostEstimate,
            LogPhase::Plan,
            LogPhase::PolicyCheck,
            LogPhase::Apply,
        ] {
            if let Some(text) = self.logs.get(phase) {
                let _ = writeln!(out, "## {}\n", phase.title());
                out.push_str(&fenced(text));
                out.push('\n');
            }
        }

        if !self.logs.unavailable.is_empty() {
            out.push_str("## Warnings\n\n");
            for missing in &self.logs.unavailable {
                let _ = writeln!(out, "- {missing}: {}", missing.source);
            }
        }

        out
    }

    /// Render and write the summary to `path`
    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.render())?;
        info!("Wrote run summary to {}", path.display());
        Ok(())
    }
}

/// Wrap `text` in a code fence longer than any backtick run it contains
fn fenced(text: &str) -> String {
    let mut longest = 0;
    let mut current = 0;
    for c in text.chars() {
        if c == '`' {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    let fence = "`".repeat((longest + 1).max(3));
    let body = text.trim_end_matches('\n');
    format!("{fence}\n{body}\n{fence}\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ApiError, LogUnavailable};
    use crate::logs::LogStage;
    use crate::monitor::RunSnapshot;
    use crate::policy::{CompletionKind, MonitoringMode, PhaseFlags};
    use crate::status::RunStatus;
    use std::time::Duration;

    fn outcome(status: RunStatus, completion: CompletionKind) -> TerminalOutcome {
        TerminalOutcome {
            run_id: "run-123".to_string(),
            mode: MonitoringMode::PlanLifecycle,
            completion,
            status,
            flags: PhaseFlags::new(true, true),
            snapshot: RunSnapshot::default(),
            polls: 3,
            elapsed: Duration::from_secs(10),
        }
    }

    fn speculative_run() -> Run {
        Run {
            is_speculative: true,
            ..Run::from_id("run-123")
        }
    }

    #[test]
    fn test_render_full_plan_summary() {
        let run = speculative_run();
        let outcome = outcome(RunStatus::PolicyChecked, CompletionKind::Success);
        let logs = PhaseLogs {
            plan: Some("Plan: 1 to add, 0 to change, 0 to destroy.".to_string()),
            cost_estimate: Some("resources-count:            1\n".to_string()),
            policy_check: Some("Sentinel Result: true".to_string()),
            ..PhaseLogs::default()
        };

        let rendered = RunSummary::new(&run, &outcome, &logs)
            .with_run_url(Some("https://tfe.example.com/app/acme/workspaces/ws/runs/run-123".to_string()))
            .with_build_link(Some("https://dev.azure.com/acme/infra/_build/results?buildId=7".to_string()))
            .render();

        assert!(rendered.starts_with("## Details\n\n_Speculative Plan_\n\n"));
        assert!(rendered.contains(
            "Terraform Enterprise Run: <https://tfe.example.com/app/acme/workspaces/ws/runs/run-123>"
        ));
        assert!(rendered.contains("Azure DevOps Build: <https://dev.azure.com/acme/infra/_build/results?buildId=7>"));
        assert!(rendered.contains("Status: `policy_checked` (success)"));
        assert!(rendered.contains("## Plan\n\n```\nPlan: 1 to add, 0 to change, 0 to destroy.\n```\n"));
        assert!(rendered.contains("## Policy Check\n\n```\nSentinel Result: true\n```\n"));
        let cost = rendered.find("## Cost Estimate").unwrap();
        let plan = rendered.find("## Plan").unwrap();
        assert!(cost < plan);
        assert!(!rendered.contains("## Apply"));
        assert!(!rendered.contains("## Warnings"));
    }

    #[test]
    fn test_missing_logs_are_listed_as_warnings() {
        let run = Run::from_id("run-123");
        let outcome = outcome(RunStatus::PolicySoftFailed, CompletionKind::SoftFailure);
        let logs = PhaseLogs {
            plan: Some("plan".to_string()),
            unavailable: vec![LogUnavailable {
                phase: LogPhase::PolicyCheck,
                stage: LogStage::Content,
                source: ApiError::Status {
                    method: "GET".to_string(),
                    url: "https://tfe.example.com/out".to_string(),
                    status: 404,
                    body: "missing".to_string(),
                },
            }],
            ..PhaseLogs::default()
        };

        let rendered = RunSummary::new(&run, &outcome, &logs).render();

        assert!(rendered.contains("Terraform Enterprise Run: `run-123`"));
        assert!(rendered.contains(
            "## Warnings\n\n- policy check log unavailable (content read failed): \
             GET https://tfe.example.com/out returned HTTP 404: missing"
        ));
        assert!(!rendered.contains("_Speculative Plan_"));
    }

    #[test]
    fn test_fence_longer_than_embedded_backticks() {
        assert_eq!(fenced("a ```b``` c"), "````\na ```b``` c\n````\n");
        assert_eq!(fenced("plain\n"), "```\nplain\n```\n");
    }

    #[test]
    fn test_write_to_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let run = Run::from_id("run-123");
        let outcome = outcome(RunStatus::Planned, CompletionKind::PlanOnly);
        let logs = PhaseLogs {
            plan: Some("plan".to_string()),
            ..PhaseLogs::default()
        };
        let path = dir.path().join(PLAN_SUMMARY_FILE);

        RunSummary::new(&run, &outcome, &logs).write_to(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("Status: `planned` (soft stop)"));
    }
}
