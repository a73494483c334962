//! Apply command implementation
//!
//! Confirms the apply of a run that stopped after planning, then watches the
//! apply through to `applied` and publishes the apply summary.

use super::shared::{connect, observe, output_dir, publish_summary, CommandContext, SummaryLinks};
use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use tfrun_core::config::{BuildContext, ConnectionSettings};
use tfrun_core::monitor::{MonitorConfig, Run, TerminalOutcome};
use tfrun_core::policy::MonitoringMode;
use tfrun_core::status::RunStatus;
use tfrun_core::summary::APPLY_SUMMARY_FILE;
use tracing::{info, instrument};

/// Apply command arguments
#[derive(Debug, Clone)]
pub struct ApplyArgs {
    pub connection: ConnectionSettings,
    pub run_id: String,
    /// Only used for the run link
    pub workspace_name: Option<String>,
    pub monitor: MonitorConfig,
    pub output_dir: PathBuf,
}

/// Comment attached to the apply confirmation
pub fn approval_comment(build: &BuildContext) -> String {
    format!("Auto Approved from Azure DevOps (Build: {})", build.build_label())
}

/// Execute the apply command
#[instrument(skip(args, ctx), fields(run_id = %args.run_id))]
pub async fn execute_apply(args: ApplyArgs, ctx: &CommandContext) -> Result<TerminalOutcome> {
    let client = connect(&args.connection, ctx)?;
    let build = BuildContext::from_env();

    let snapshot = client
        .get_run(&args.run_id)
        .await
        .with_context(|| format!("Failed to read run {}", args.run_id))?;
    let run = Run {
        is_destroy: snapshot.is_destroy,
        ..Run::from_id(args.run_id.clone())
    };
    let applicable = snapshot
        .status
        .parse::<RunStatus>()
        .map(|status| status.is_applicable())
        .unwrap_or(false);
    if !applicable {
        bail!(
            "Run {} can not be applied from status '{}'",
            run.id,
            snapshot.status
        );
    }

    {
        let mut pipeline = ctx.pipeline();
        let mut group = pipeline.group("Apply Run")?;
        group.command(&format!("Confirming apply of run {}", run.id))?;
        client
            .apply_run(&run.id, &approval_comment(&build))
            .await
            .with_context(|| format!("Failed to confirm apply of run {}", run.id))?;
    }

    let observation = observe(&client, &run, MonitoringMode::ApplyLifecycle, &args.monitor, ctx).await?;

    let links = SummaryLinks {
        run_url: args
            .workspace_name
            .as_deref()
            .map(|ws| args.connection.run_url(ws, &run.id)),
        build_link: build.build_link(),
    };
    let path = output_dir(&args.output_dir)?.join(APPLY_SUMMARY_FILE);
    publish_summary(ctx, &run, &observation, links, &path)?;

    info!("Run {} applied", run.id);
    Ok(observation.outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approval_comment_names_the_build() {
        let build = BuildContext {
            build_id: Some("42".to_string()),
            ..BuildContext::default()
        };
        assert_eq!(
            approval_comment(&build),
            "Auto Approved from Azure DevOps (Build: 42)"
        );
        assert_eq!(
            approval_comment(&BuildContext::default()),
            "Auto Approved from Azure DevOps (Build: unknown)"
        );
    }
}
