//! Plan command implementation
//!
//! Archives the working directory, uploads it as a new configuration version,
//! queues a run and watches it until planning (plus any cost estimate and
//! policy check) is done.

use super::archive::{execute_archive, ArchiveArgs};
use super::shared::{
    connect, observe, output_dir, publish_summary, save_api_response, CommandContext, SummaryLinks,
};
use super::workspace_id::WORKSPACE_ID_VARIABLE;
use anyhow::{Context, Result};
use std::path::PathBuf;
use tfrun_core::api::CreateRun;
use tfrun_core::config::{env, BuildContext, ConnectionSettings};
use tfrun_core::errors::ConfigError;
use tfrun_core::monitor::{MonitorConfig, Run, TerminalOutcome};
use tfrun_core::policy::MonitoringMode;
use tfrun_core::summary::PLAN_SUMMARY_FILE;
use tracing::{info, instrument, warn};

/// Plan command arguments
#[derive(Debug, Clone)]
pub struct PlanArgs {
    pub connection: ConnectionSettings,
    pub workspace_name: Option<String>,
    /// Skips the name lookup when set
    pub workspace_id: Option<String>,
    pub working_directory: PathBuf,
    pub speculative: bool,
    pub destroy: bool,
    pub message: String,
    pub archive_name: String,
    pub monitor: MonitorConfig,
    pub output_dir: PathBuf,
}

/// Comment linking a run back to the build that created it
pub fn build_link_comment(link: &str) -> String {
    format!("ADO Build Link:<br />  {link}")
}

fn missing_workspace() -> ConfigError {
    ConfigError::MissingArguments {
        names: vec![
            format!("workspace name ({})", env::WORKSPACE_NAME),
            format!("workspace id ({})", env::WORKSPACE_ID),
        ],
    }
}

/// Execute the plan command
#[instrument(skip(args, ctx))]
pub async fn execute_plan(args: PlanArgs, ctx: &CommandContext) -> Result<TerminalOutcome> {
    if args.workspace_id.is_none() && args.workspace_name.is_none() {
        return Err(missing_workspace().into());
    }

    let out_dir = output_dir(&args.output_dir)?;
    let archive = execute_archive(
        ArchiveArgs {
            working_directory: args.working_directory.clone(),
            archive_name: args.archive_name.clone(),
            output_dir: out_dir.clone(),
        },
        ctx,
    )?;

    let client = connect(&args.connection, ctx)?;
    let build = BuildContext::from_env();
    let mut pipeline = ctx.pipeline();

    let workspace_id = match (&args.workspace_id, &args.workspace_name) {
        (Some(id), _) => id.clone(),
        (None, Some(name)) => client
            .workspace_id(&args.connection.organization, name)
            .await
            .with_context(|| format!("Failed to resolve workspace '{name}'"))?,
        (None, None) => return Err(missing_workspace().into()),
    };
    pipeline.set_variable(WORKSPACE_ID_VARIABLE, &workspace_id)?;

    let configuration = {
        let mut group = pipeline.group("Create Configuration Version")?;
        let configuration = client
            .create_configuration_version(&workspace_id, args.speculative)
            .await
            .context("Failed to create configuration version")?;
        group.text(&format!("Configuration version {}", configuration.id))?;

        let bytes = std::fs::read(&archive.path)
            .with_context(|| format!("Failed to read {}", archive.path.display()))?;
        group.command(&format!("Uploading {} bytes", bytes.len()))?;
        client
            .upload_configuration(&configuration.upload_url, bytes)
            .await
            .context("Failed to upload configuration archive")?;
        configuration
    };
    pipeline.set_variable("tfeConfigurationVersionId", &configuration.id)?;
    save_api_response(
        &mut pipeline,
        &out_dir,
        "postConfigurationVersion.json",
        &configuration,
    )?;

    let created = {
        let mut group = pipeline.group("Create Run")?;
        let request = CreateRun {
            workspace_id: workspace_id.clone(),
            configuration_version_id: configuration.id.clone(),
            is_destroy: args.destroy,
            is_speculative: args.speculative,
            message: args.message.clone(),
        };
        let created = client
            .create_run(&request)
            .await
            .context("Failed to create run")?;
        group.text(&format!("Run {} (plan {})", created.id, created.plan_id))?;
        created
    };
    save_api_response(&mut pipeline, &out_dir, "postCreateRun.json", &created)?;
    pipeline.set_variable("tfeRunId", &created.id)?;
    pipeline.set_variable("tfePlanId", &created.plan_id)?;

    if let Some(link) = build.build_link() {
        // The comment is a convenience; the run is already queued
        if let Err(err) = client
            .create_run_comment(&created.id, &build_link_comment(&link))
            .await
        {
            warn!("Failed to comment on run {}: {}", created.id, err);
            pipeline.warning(&format!("Could not add build link to run {}", created.id))?;
        }
    }

    let run = Run {
        id: created.id.clone(),
        workspace_id,
        configuration_version_id: Some(configuration.id),
        is_destroy: args.destroy,
        is_speculative: args.speculative,
    };
    let observation = observe(&client, &run, MonitoringMode::PlanLifecycle, &args.monitor, ctx).await?;

    let links = SummaryLinks {
        run_url: args
            .workspace_name
            .as_deref()
            .map(|ws| args.connection.run_url(ws, &run.id)),
        build_link: build.build_link(),
    };
    publish_summary(ctx, &run, &observation, links, &out_dir.join(PLAN_SUMMARY_FILE))?;

    info!(
        "Run {} planned ({})",
        run.id,
        observation.outcome.terminal_class()
    );
    Ok(observation.outcome)
}
