//! Archive command implementation
//!
//! Packs the Terraform working directory and publishes the archive as a
//! build artifact. `plan` runs the same steps before uploading.

use super::shared::{absolute, output_dir, CommandContext};
use anyhow::{Context, Result};
use std::path::PathBuf;
use tfrun_core::archive::{create_archive, ArchiveSummary};
use tracing::{debug, instrument};

/// Pipeline variable holding the archive file name
pub const ARCHIVE_VARIABLE: &str = "tfeArchiveFileName";

/// Archive command arguments
#[derive(Debug, Clone)]
pub struct ArchiveArgs {
    /// Directory containing the Terraform code
    pub working_directory: PathBuf,
    /// File name of the archive
    pub archive_name: String,
    /// Directory the archive is written to
    pub output_dir: PathBuf,
}

/// Execute the archive command
#[instrument(skip(args, ctx))]
pub fn execute_archive(args: ArchiveArgs, ctx: &CommandContext) -> Result<ArchiveSummary> {
    debug!("Archive args: {:?}", args);

    let source = absolute(&args.working_directory)?;
    let dest = output_dir(&args.output_dir)?.join(&args.archive_name);

    let mut pipeline = ctx.pipeline();
    let summary = {
        let mut group = pipeline.group("Create Configuration Archive")?;
        group.command(&format!("Packing {} into {}", source.display(), dest.display()))?;
        let summary = create_archive(&source, &dest)
            .with_context(|| format!("Failed to archive {}", source.display()))?;
        for file in &summary.files {
            group.debug(file)?;
        }
        group.text(&format!("Packed {} files", summary.files.len()))?;
        summary
    };

    pipeline.set_variable(ARCHIVE_VARIABLE, &args.archive_name)?;
    pipeline.upload_artifact("archive", "uploadedresult", &summary.path)?;
    Ok(summary)
}
