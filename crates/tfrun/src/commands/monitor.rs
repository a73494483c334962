//! Monitor command implementation
//!
//! Watches the plan phases of a run created elsewhere and publishes the plan
//! summary.

use super::shared::{connect, observe, output_dir, publish_summary, CommandContext, SummaryLinks};
use anyhow::Result;
use std::path::PathBuf;
use tfrun_core::config::{BuildContext, ConnectionSettings};
use tfrun_core::monitor::{MonitorConfig, Run, TerminalOutcome};
use tfrun_core::policy::MonitoringMode;
use tfrun_core::summary::PLAN_SUMMARY_FILE;
use tracing::{info, instrument};

/// Monitor command arguments
#[derive(Debug, Clone)]
pub struct MonitorArgs {
    pub connection: ConnectionSettings,
    pub run_id: String,
    /// Only used for the run link
    pub workspace_name: Option<String>,
    pub monitor: MonitorConfig,
    pub output_dir: PathBuf,
}

/// Execute the monitor command
#[instrument(skip(args, ctx), fields(run_id = %args.run_id))]
pub async fn execute_monitor(args: MonitorArgs, ctx: &CommandContext) -> Result<TerminalOutcome> {
    let client = connect(&args.connection, ctx)?;
    let mut run = Run::from_id(args.run_id.clone());

    let observation = observe(&client, &run, MonitoringMode::PlanLifecycle, &args.monitor, ctx).await?;
    run.is_destroy = observation.outcome.snapshot.is_destroy;

    let links = SummaryLinks {
        run_url: args
            .workspace_name
            .as_deref()
            .map(|ws| args.connection.run_url(ws, &run.id)),
        build_link: BuildContext::from_env().build_link(),
    };
    let path = output_dir(&args.output_dir)?.join(PLAN_SUMMARY_FILE);
    publish_summary(ctx, &run, &observation, links, &path)?;

    info!(
        "Run {} finished monitoring as {}",
        run.id,
        observation.outcome.terminal_class()
    );
    Ok(observation.outcome)
}
