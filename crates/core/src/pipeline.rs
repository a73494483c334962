//! Azure DevOps logging commands
//!
//! The agent scans stdout for `##[...]` formatting commands and `##vso[...]`
//! task commands. All output goes through a [`RedactingWriter`] so secrets
//! never reach the build log.

use crate::redaction::{RedactingWriter, RedactionConfig};
use std::io::{self, Write};
use std::ops::{Deref, DerefMut};
use std::path::Path;

/// Writer of pipeline logging commands
#[derive(Debug)]
pub struct PipelineWriter<W: Write> {
    out: RedactingWriter<W>,
}

impl PipelineWriter<io::Stdout> {
    pub fn stdout(config: RedactionConfig) -> Self {
        Self::new(io::stdout(), config)
    }
}

impl<W: Write> PipelineWriter<W> {
    pub fn new(writer: W, config: RedactionConfig) -> Self {
        Self {
            out: RedactingWriter::new(writer, config),
        }
    }

    pub fn into_inner(self) -> io::Result<W> {
        self.out.into_inner()
    }

    /// Prefix every line of `message` with `prefix`
    fn prefixed(&mut self, prefix: &str, message: &str) -> io::Result<()> {
        if message.is_empty() {
            return self.out.write_line(prefix);
        }
        for line in message.lines() {
            self.out.write_line(&format!("{prefix}{line}"))?;
        }
        Ok(())
    }

    /// Open a collapsible group; it closes when the guard is dropped
    pub fn group(&mut self, name: &str) -> io::Result<Group<'_, W>> {
        self.prefixed("##[group]", name)?;
        Ok(Group { writer: self })
    }

    pub fn command(&mut self, message: &str) -> io::Result<()> {
        self.prefixed("##[command]", message)
    }

    pub fn debug(&mut self, message: &str) -> io::Result<()> {
        self.prefixed("##[debug]", message)
    }

    pub fn warning(&mut self, message: &str) -> io::Result<()> {
        self.prefixed("##[warning]", message)
    }

    pub fn error(&mut self, message: &str) -> io::Result<()> {
        self.prefixed("##[error]", message)
    }

    /// Plain text, written verbatim
    pub fn text(&mut self, message: &str) -> io::Result<()> {
        for line in message.lines() {
            self.out.write_line(line)?;
        }
        Ok(())
    }

    /// Set a pipeline variable visible to later steps
    pub fn set_variable(&mut self, name: &str, value: &str) -> io::Result<()> {
        self.out.write_line(&format!(
            "##vso[task.setvariable variable={};]{}",
            escape_property(name),
            escape_data(value)
        ))
    }

    /// Attach a markdown file to the build summary
    pub fn upload_summary(&mut self, path: &Path) -> io::Result<()> {
        self.out.write_line(&format!(
            "##vso[task.uploadsummary]{}",
            escape_data(&path.display().to_string())
        ))
    }

    /// Publish a file as a build artifact
    pub fn upload_artifact(
        &mut self,
        container_folder: &str,
        artifact_name: &str,
        path: &Path,
    ) -> io::Result<()> {
        self.out.write_line(&format!(
            "##vso[artifact.upload containerfolder={};artifactname={};]{}",
            escape_property(container_folder),
            escape_property(artifact_name),
            escape_data(&path.display().to_string())
        ))
    }
}

/// An open `##[group]`, closed with `##[endgroup]` on drop
#[derive(Debug)]
pub struct Group<'a, W: Write> {
    writer: &'a mut PipelineWriter<W>,
}

impl<W: Write> Deref for Group<'_, W> {
    type Target = PipelineWriter<W>;

    fn deref(&self) -> &Self::Target {
        self.writer
    }
}

impl<W: Write> DerefMut for Group<'_, W> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.writer
    }
}

impl<W: Write> Drop for Group<'_, W> {
    fn drop(&mut self) {
        let _ = self.writer.out.write_line("##[endgroup]");
    }
}

/// Escape a task-command data value
fn escape_data(value: &str) -> String {
    value
        .replace('%', "%AZP25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Escape a task-command property value
fn escape_property(value: &str) -> String {
    escape_data(value).replace(']', "%5D").replace(';', "%3B")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redaction::SecretRegistry;

    fn writer() -> PipelineWriter<Vec<u8>> {
        let registry = SecretRegistry::new();
        registry.add_secret("tfe-secret-token");
        PipelineWriter::new(Vec::new(), RedactionConfig::with_custom_registry(registry))
    }

    fn output(writer: PipelineWriter<Vec<u8>>) -> String {
        String::from_utf8(writer.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn test_group_closes_on_drop() {
        let mut w = writer();
        {
            let mut group = w.group("Create Run").unwrap();
            group.command("Creating run").unwrap();
            group.debug("response body").unwrap();
        }
        assert_eq!(
            output(w),
            "##[group]Create Run\n##[command]Creating run\n##[debug]response body\n##[endgroup]\n"
        );
    }

    #[test]
    fn test_multiline_messages_prefix_every_line() {
        let mut w = writer();
        w.error("first\nsecond").unwrap();
        assert_eq!(output(w), "##[error]first\n##[error]second\n");
    }

    #[test]
    fn test_task_commands() {
        let mut w = writer();
        w.set_variable("tfeRunId", "run-abc").unwrap();
        w.upload_summary(Path::new("/work/runsummary.md")).unwrap();
        w.upload_artifact("apicalls", "postCreateRun.json", Path::new("/work/postCreateRun.json"))
            .unwrap();
        assert_eq!(
            output(w),
            "##vso[task.setvariable variable=tfeRunId;]run-abc\n\
             ##vso[task.uploadsummary]/work/runsummary.md\n\
             ##vso[artifact.upload containerfolder=apicalls;artifactname=postCreateRun.json;]/work/postCreateRun.json\n"
        );
    }

    #[test]
    fn test_values_are_escaped() {
        let mut w = writer();
        w.set_variable("a;b", "50%\nnext").unwrap();
        assert_eq!(
            output(w),
            "##vso[task.setvariable variable=a%3Bb;]50%AZP25%0Anext\n"
        );
    }

    #[test]
    fn test_secrets_are_redacted() {
        let mut w = writer();
        w.debug("Authorization: Bearer tfe-secret-token").unwrap();
        assert_eq!(output(w), "##[debug]Authorization: Bearer ****\n");
    }
}
