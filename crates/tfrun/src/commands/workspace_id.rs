//! Workspace-id command implementation

use super::shared::{connect, CommandContext};
use anyhow::{Context, Result};
use tfrun_core::config::ConnectionSettings;
use tracing::instrument;

/// Pipeline variable holding the resolved workspace id
pub const WORKSPACE_ID_VARIABLE: &str = "tfeWorkspaceId";

/// Workspace-id command arguments
#[derive(Debug, Clone)]
pub struct WorkspaceIdArgs {
    pub connection: ConnectionSettings,
    pub workspace_name: String,
}

/// Execute the workspace-id command
#[instrument(skip(args, ctx), fields(workspace = %args.workspace_name))]
pub async fn execute_workspace_id(args: WorkspaceIdArgs, ctx: &CommandContext) -> Result<String> {
    let client = connect(&args.connection, ctx)?;
    let id = client
        .workspace_id(&args.connection.organization, &args.workspace_name)
        .await
        .with_context(|| format!("Failed to resolve workspace '{}'", args.workspace_name))?;

    let mut pipeline = ctx.pipeline();
    pipeline.text(&format!("Workspace {} has id {}", args.workspace_name, id))?;
    pipeline.set_variable(WORKSPACE_ID_VARIABLE, &id)?;
    Ok(id)
}
