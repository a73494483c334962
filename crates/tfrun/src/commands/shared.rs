//! Helpers shared by the run commands

use anyhow::{Context, Result};
use std::io::{self, Stdout};
use std::path::{Path, PathBuf};
use tfrun_core::api::TfeClient;
use tfrun_core::config::ConnectionSettings;
use tfrun_core::logs::{self, LogPhase, PhaseLogs};
use tfrun_core::monitor::{self, MonitorConfig, Run, TerminalOutcome};
use tfrun_core::pipeline::PipelineWriter;
use tfrun_core::policy::{MonitoringMode, TerminalClass};
use tfrun_core::redaction::{add_global_secret, RedactionConfig};
use tfrun_core::summary::RunSummary;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Width of the rule framing phase logs in the build output
const LOG_RULE_WIDTH: usize = 80;

/// State every command receives from the CLI layer
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub redaction: RedactionConfig,
    pub cancel: CancellationToken,
}

impl CommandContext {
    /// Pipeline commands on stdout
    pub fn pipeline(&self) -> PipelineWriter<Stdout> {
        PipelineWriter::stdout(self.redaction.clone())
    }
}

/// Register the token as a secret and build an API client
pub fn connect(settings: &ConnectionSettings, ctx: &CommandContext) -> Result<TfeClient> {
    add_global_secret(&settings.token);
    let client = TfeClient::new(settings)
        .context("Failed to create API client")?
        .with_redaction(ctx.redaction.clone());
    debug!("Connected to {}", client.base_url());
    Ok(client)
}

/// Make `path` absolute against the current directory
pub fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    Ok(cwd.join(path))
}

/// Create `dir` if needed and return it as an absolute path
pub fn output_dir(dir: &Path) -> Result<PathBuf> {
    let dir = absolute(dir)?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    Ok(dir)
}

/// Write `value` as pretty JSON to `dir/name` and publish it as an API-call artifact
pub fn save_api_response<T: serde::Serialize>(
    pipeline: &mut PipelineWriter<Stdout>,
    dir: &Path,
    name: &str,
    value: &T,
) -> Result<()> {
    let path = dir.join(name);
    let json = serde_json::to_string_pretty(value).context("Failed to serialize API response")?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    pipeline.upload_artifact("apicalls", name, &path)?;
    Ok(())
}

/// A monitored run and the logs of the phases it went through
#[derive(Debug)]
pub struct Observation {
    pub outcome: TerminalOutcome,
    pub logs: PhaseLogs,
}

/// Monitor `run` until it stops in `mode`, then collect and print its logs
pub async fn observe(
    client: &TfeClient,
    run: &Run,
    mode: MonitoringMode,
    config: &MonitorConfig,
    ctx: &CommandContext,
) -> Result<Observation> {
    let mut pipeline = ctx.pipeline();
    let outcome = {
        let mut group = pipeline.group(&format!("Monitor {} lifecycle of run {}", mode, run.id))?;
        group.command(&format!(
            "Polling every {}s for up to {}s",
            config.poll_interval.as_secs(),
            config.max_wait.as_secs()
        ))?;
        let result = monitor::await_terminal(client, run, mode, config, &ctx.cancel).await;
        match &result {
            Ok(outcome) => group.text(&format!(
                "Run {} stopped at '{}' after {} polls ({})",
                outcome.run_id,
                outcome.status,
                outcome.polls,
                outcome.terminal_class()
            ))?,
            Err(err) => group.error(&err.to_string())?,
        }
        result?
    };

    let logs = logs::collect(client, &outcome).await;
    print_logs(&mut pipeline, &logs)?;
    report_outcome(&mut pipeline, &outcome)?;

    Ok(Observation { outcome, logs })
}

fn print_logs(pipeline: &mut PipelineWriter<Stdout>, logs: &PhaseLogs) -> io::Result<()> {
    let rule = "#".repeat(LOG_RULE_WIDTH);
    for phase in [
        LogPhase::Plan,
        LogPhase::CostEstimate,
        LogPhase::PolicyCheck,
        LogPhase::Apply,
    ] {
        if let Some(text) = logs.get(phase) {
            let mut group = pipeline.group(&format!("{} Log", phase.title()))?;
            group.text(&rule)?;
            group.text(text)?;
            group.text(&rule)?;
        }
    }
    for missing in &logs.unavailable {
        pipeline.warning(&format!("{missing}: {}", missing.source))?;
    }
    Ok(())
}

fn report_outcome(pipeline: &mut PipelineWriter<Stdout>, outcome: &TerminalOutcome) -> io::Result<()> {
    match outcome.terminal_class() {
        TerminalClass::SoftFailure => {
            warn!("Run {} soft-failed a policy check", outcome.run_id);
            pipeline.warning(&format!(
                "Run {} soft-failed a policy check; an override is required before apply",
                outcome.run_id
            ))
        }
        TerminalClass::SoftStop => pipeline.text(&format!(
            "Run {} finished planning with status '{}'",
            outcome.run_id, outcome.status
        )),
        TerminalClass::Success | TerminalClass::Failure => Ok(()),
    }
}

/// Links shown in a run summary
#[derive(Debug, Clone, Default)]
pub struct SummaryLinks {
    pub run_url: Option<String>,
    pub build_link: Option<String>,
}

/// Write the summary of `observation` to `path` and attach it to the build
pub fn publish_summary(
    ctx: &CommandContext,
    run: &Run,
    observation: &Observation,
    links: SummaryLinks,
    path: &Path,
) -> Result<()> {
    RunSummary::new(run, &observation.outcome, &observation.logs)
        .with_run_url(links.run_url)
        .with_build_link(links.build_link)
        .write_to(path)
        .with_context(|| format!("Failed to write run summary {}", path.display()))?;
    ctx.pipeline().upload_summary(&absolute(path)?)?;
    Ok(())
}
