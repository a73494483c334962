use crate::commands::CommandContext;
use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tfrun_core::archive::DEFAULT_ARCHIVE_NAME;
use tfrun_core::config::{self, env, ConnectionSettings, PollSettings};
use tfrun_core::errors::ConfigError;
use tfrun_core::monitor::MonitorConfig;
use tokio_util::sync::CancellationToken;

/// Log format options
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

/// Log level options
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

fn parse_bool_arg(value: &str) -> std::result::Result<bool, String> {
    config::parse_bool("flag", value).map_err(|e| e.to_string())
}

/// Service connection, from flags or the pipeline environment
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// API token used to authenticate
    #[arg(long, env = env::TOKEN, hide_env_values = true)]
    pub tfe_token: Option<String>,

    /// Service host name (e.g. terraform.company.com)
    #[arg(long, env = env::HOSTNAME)]
    pub tfe_hostname: Option<String>,

    /// Organization name
    #[arg(long, env = env::ORGANIZATION)]
    pub tfe_organization: Option<String>,
}

impl ConnectionArgs {
    pub fn settings(&self) -> std::result::Result<ConnectionSettings, ConfigError> {
        ConnectionSettings::from_inputs(
            self.tfe_hostname.clone(),
            self.tfe_token.clone(),
            self.tfe_organization.clone(),
        )
    }
}

/// Poll interval and deadline of the run monitor
#[derive(Args, Debug, Clone)]
pub struct PollArgs {
    /// Seconds between two status fetches
    #[arg(long, env = env::POLL_INTERVAL_SECS, default_value_t = PollSettings::default().interval_secs)]
    pub poll_interval_secs: u64,

    /// Give up after this many seconds
    #[arg(long, env = env::MAX_WAIT_SECS, default_value_t = PollSettings::default().max_wait_secs)]
    pub max_wait_secs: u64,
}

impl PollArgs {
    pub fn monitor_config(&self) -> std::result::Result<MonitorConfig, ConfigError> {
        PollSettings {
            interval_secs: self.poll_interval_secs,
            max_wait_secs: self.max_wait_secs,
        }
        .to_monitor_config()
    }
}

/// Where generated files (archive, summaries, API responses) are written
#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    #[arg(long, value_name = "PATH", default_value = ".")]
    pub output_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Archive the working directory, create a run and monitor its plan
    Plan {
        #[command(flatten)]
        connection: ConnectionArgs,
        /// Workspace name, used to resolve the workspace id and build links
        #[arg(long, env = env::WORKSPACE_NAME)]
        workspace_name: Option<String>,
        /// Workspace id; skips the name lookup when set
        #[arg(long, env = env::WORKSPACE_ID)]
        workspace_id: Option<String>,
        /// Directory containing the Terraform code
        #[arg(long, env = env::WORKING_DIRECTORY, default_value = ".")]
        working_directory: PathBuf,
        /// Trigger a speculative plan that can not be applied (True/False)
        #[arg(long, action = clap::ArgAction::Set, value_parser = parse_bool_arg, num_args = 0..=1, default_value = "false", default_missing_value = "true")]
        speculative: bool,
        /// Plan the destruction of all managed resources (True/False)
        #[arg(long, action = clap::ArgAction::Set, value_parser = parse_bool_arg, num_args = 0..=1, default_value = "false", default_missing_value = "true")]
        destroy: bool,
        /// Message attached to the run
        #[arg(long, default_value = "ADO Triggered Build")]
        message: String,
        /// Archive file name
        #[arg(long, default_value = DEFAULT_ARCHIVE_NAME)]
        archive_name: String,
        #[command(flatten)]
        poll: PollArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Monitor the plan phases of an existing run
    Monitor {
        #[command(flatten)]
        connection: ConnectionArgs,
        /// Run id
        #[arg(long, env = env::RUN_ID)]
        run_id: Option<String>,
        /// Workspace name, used for the run link in the summary
        #[arg(long, env = env::WORKSPACE_NAME)]
        workspace_name: Option<String>,
        #[command(flatten)]
        poll: PollArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Confirm and monitor the apply of a planned run
    Apply {
        #[command(flatten)]
        connection: ConnectionArgs,
        /// Run id
        #[arg(long, env = env::RUN_ID)]
        run_id: Option<String>,
        /// Workspace name, used for the run link in the summary
        #[arg(long, env = env::WORKSPACE_NAME)]
        workspace_name: Option<String>,
        #[command(flatten)]
        poll: PollArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Build the configuration archive only
    Archive {
        /// Directory containing the Terraform code
        #[arg(long, env = env::WORKING_DIRECTORY, default_value = ".")]
        working_directory: PathBuf,
        /// Archive file name
        #[arg(long, default_value = DEFAULT_ARCHIVE_NAME)]
        archive_name: String,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Resolve a workspace name to its id
    WorkspaceId {
        #[command(flatten)]
        connection: ConnectionArgs,
        /// Workspace name
        #[arg(long, env = env::WORKSPACE_NAME)]
        workspace_name: Option<String>,
    },
}

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version,
    about = "Terraform Enterprise run CLI for Azure DevOps pipelines",
    long_about = "Terraform Enterprise run CLI for Azure DevOps pipelines\n\n\
        Creates runs, waits for plan, cost estimation, policy checks and apply to finish, \
        and publishes the logs as a pipeline summary.",
    color = clap::ColorChoice::Auto
)]
pub struct Cli {
    /// Log format (text or json, defaults to text, can be set via TFRUN_LOG_FORMAT env var)
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Disable secret redaction in output (debugging only - WARNING: may expose secrets)
    #[arg(long, global = true)]
    pub no_redact: bool,

    #[command(subcommand)]
    pub command: Commands,
}

fn required(value: Option<String>, name: &str, env_var: &str) -> std::result::Result<String, ConfigError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingArguments {
            names: vec![format!("{name} ({env_var})")],
        })
}

impl Cli {
    pub async fn dispatch(self) -> Result<()> {
        let log_format = self.log_format.map(|f| match f {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
        });
        tfrun_core::logging::init(log_format, Some(self.log_level.as_str()))?;
        tracing::debug!("CLI initialized with log level: {}", self.log_level.as_str());

        if self.no_redact {
            tracing::warn!("Secret redaction is DISABLED via --no-redact flag. The API token may appear in pipeline output. Use only for debugging purposes!");
        }
        let redaction = if self.no_redact {
            tfrun_core::redaction::RedactionConfig::disabled()
        } else {
            tfrun_core::redaction::RedactionConfig::default()
        };

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, stopping");
                trigger.cancel();
            }
        });

        let ctx = CommandContext { redaction, cancel };

        match self.command {
            Commands::Plan {
                connection,
                workspace_name,
                workspace_id,
                working_directory,
                speculative,
                destroy,
                message,
                archive_name,
                poll,
                output,
            } => {
                use crate::commands::plan::{execute_plan, PlanArgs};

                let args = PlanArgs {
                    connection: connection.settings()?,
                    workspace_name,
                    workspace_id,
                    working_directory,
                    speculative,
                    destroy,
                    message,
                    archive_name,
                    monitor: poll.monitor_config()?,
                    output_dir: output.output_dir,
                };
                execute_plan(args, &ctx).await.map(|_| ())
            }
            Commands::Monitor {
                connection,
                run_id,
                workspace_name,
                poll,
                output,
            } => {
                use crate::commands::monitor::{execute_monitor, MonitorArgs};

                let args = MonitorArgs {
                    connection: connection.settings()?,
                    run_id: required(run_id, "run id", env::RUN_ID)?,
                    workspace_name,
                    monitor: poll.monitor_config()?,
                    output_dir: output.output_dir,
                };
                execute_monitor(args, &ctx).await.map(|_| ())
            }
            Commands::Apply {
                connection,
                run_id,
                workspace_name,
                poll,
                output,
            } => {
                use crate::commands::apply::{execute_apply, ApplyArgs};

                let args = ApplyArgs {
                    connection: connection.settings()?,
                    run_id: required(run_id, "run id", env::RUN_ID)?,
                    workspace_name,
                    monitor: poll.monitor_config()?,
                    output_dir: output.output_dir,
                };
                execute_apply(args, &ctx).await.map(|_| ())
            }
            Commands::Archive {
                working_directory,
                archive_name,
                output,
            } => {
                use crate::commands::archive::{execute_archive, ArchiveArgs};

                let args = ArchiveArgs {
                    working_directory,
                    archive_name,
                    output_dir: output.output_dir,
                };
                execute_archive(args, &ctx).map(|_| ())
            }
            Commands::WorkspaceId {
                connection,
                workspace_name,
            } => {
                use crate::commands::workspace_id::{execute_workspace_id, WorkspaceIdArgs};

                let args = WorkspaceIdArgs {
                    connection: connection.settings()?,
                    workspace_name: required(workspace_name, "workspace name", env::WORKSPACE_NAME)?,
                };
                execute_workspace_id(args, &ctx).await.map(|_| ())
            }
        }
    }
}
