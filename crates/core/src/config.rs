//! Connection, polling and build-context settings
//!
//! Values arrive from command-line flags or, when a flag is absent, from the
//! environment variables a pipeline sets. This module validates them and turns
//! them into the typed settings the client and monitor consume.

use crate::errors::ConfigError;
use crate::monitor::{MonitorConfig, DEFAULT_MAX_WAIT, DEFAULT_POLL_INTERVAL};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable names read by the tool
pub mod env {
    pub const TOKEN: &str = "TFETOKEN";
    pub const HOSTNAME: &str = "TFEHOSTNAME";
    pub const ORGANIZATION: &str = "TFEORGANIZATIONNAME";
    pub const WORKSPACE_NAME: &str = "TFEWORKSPACENAME";
    pub const WORKSPACE_ID: &str = "TFEWORKSPACEID";
    pub const RUN_ID: &str = "TFERUNID";
    pub const WORKING_DIRECTORY: &str = "TERRAFORMWORKINGDIRECTORY";
    pub const POLL_INTERVAL_SECS: &str = "TFRUN_POLL_INTERVAL_SECS";
    pub const MAX_WAIT_SECS: &str = "TFRUN_MAX_WAIT_SECS";
    pub const COLLECTION_URI: &str = "SYSTEM_TEAMFOUNDATIONSERVERURI";
    pub const TEAM_PROJECT: &str = "SYSTEM_TEAMPROJECT";
    pub const BUILD_ID: &str = "BUILD_BUILDID";
}

/// How to reach and authenticate against the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    pub hostname: String,
    #[serde(skip_serializing)]
    pub token: String,
    pub organization: String,
}

impl ConnectionSettings {
    /// Build settings from optional inputs, reporting every missing one at once
    pub fn from_inputs(
        hostname: Option<String>,
        token: Option<String>,
        organization: Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut missing = Vec::new();
        let hostname = require(hostname, "hostname", env::HOSTNAME, &mut missing);
        let token = require(token, "token", env::TOKEN, &mut missing);
        let organization = require(organization, "organization", env::ORGANIZATION, &mut missing);

        if !missing.is_empty() {
            return Err(ConfigError::MissingArguments { names: missing });
        }

        let settings = Self {
            hostname,
            token,
            organization,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let host = self
            .hostname
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');
        if host.is_empty() || host.contains(char::is_whitespace) || host.contains('/') {
            return Err(ConfigError::InvalidValue {
                name: "hostname".to_string(),
                value: self.hostname.clone(),
                reason: "expected a bare host name such as app.terraform.io".to_string(),
            });
        }
        if self.token.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "API token must not be empty".to_string(),
            });
        }
        if self.organization.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "Organization name must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// `https://{hostname}` unless the hostname already carries a scheme
    pub fn base_url(&self) -> String {
        let trimmed = self.hostname.trim_end_matches('/');
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        }
    }

    /// Browser link to a run
    pub fn run_url(&self, workspace_name: &str, run_id: &str) -> String {
        format!(
            "{}/app/{}/workspaces/{}/runs/{}",
            self.base_url(),
            self.organization,
            workspace_name,
            run_id
        )
    }
}

fn require(
    value: Option<String>,
    name: &str,
    env_var: &str,
    missing: &mut Vec<String>,
) -> String {
    match value.filter(|v| !v.trim().is_empty()) {
        Some(v) => v,
        None => {
            missing.push(format!("{name} ({env_var})"));
            String::new()
        }
    }
}

/// Longest accepted monitoring deadline (7 days)
pub const MAX_WAIT_CEILING_SECS: u64 = 7 * 24 * 60 * 60;

/// Poll interval and deadline, in whole seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSettings {
    pub interval_secs: u64,
    pub max_wait_secs: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            max_wait_secs: DEFAULT_MAX_WAIT.as_secs(),
        }
    }
}

impl PollSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                name: env::POLL_INTERVAL_SECS.to_string(),
                value: self.interval_secs.to_string(),
                reason: "poll interval must be at least one second".to_string(),
            });
        }
        if self.max_wait_secs > MAX_WAIT_CEILING_SECS {
            return Err(ConfigError::InvalidValue {
                name: env::MAX_WAIT_SECS.to_string(),
                value: self.max_wait_secs.to_string(),
                reason: format!("maximum wait must not exceed {MAX_WAIT_CEILING_SECS}s"),
            });
        }
        if self.max_wait_secs < self.interval_secs {
            return Err(ConfigError::InvalidValue {
                name: env::MAX_WAIT_SECS.to_string(),
                value: self.max_wait_secs.to_string(),
                reason: format!(
                    "maximum wait must be at least the poll interval ({}s)",
                    self.interval_secs
                ),
            });
        }
        Ok(())
    }

    pub fn to_monitor_config(&self) -> Result<MonitorConfig, ConfigError> {
        self.validate()?;
        Ok(MonitorConfig::new(
            Duration::from_secs(self.interval_secs),
            Duration::from_secs(self.max_wait_secs),
        ))
    }
}

/// Identity of the pipeline build that triggered the run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildContext {
    pub collection_uri: Option<String>,
    pub project: Option<String>,
    pub build_id: Option<String>,
}

impl BuildContext {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the build variables through `lookup`; blank values count as absent
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            collection_uri: get(env::COLLECTION_URI),
            project: get(env::TEAM_PROJECT),
            build_id: get(env::BUILD_ID),
        }
    }

    /// Link to the build results page, when all parts are known
    pub fn build_link(&self) -> Option<String> {
        match (&self.collection_uri, &self.project, &self.build_id) {
            (Some(uri), Some(project), Some(id)) => Some(format!(
                "{}/{}/_build/results?buildId={}",
                uri.trim_end_matches('/'),
                project,
                id
            )),
            _ => None,
        }
    }

    /// Build identifier for messages, `unknown` outside a pipeline
    pub fn build_label(&self) -> &str {
        self.build_id.as_deref().unwrap_or("unknown")
    }
}

/// Parse a `True`/`False` input in any letter case
pub fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
            reason: "expected True or False".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(hostname: &str) -> ConnectionSettings {
        ConnectionSettings {
            hostname: hostname.to_string(),
            token: "token-value".to_string(),
            organization: "acme".to_string(),
        }
    }

    #[test]
    fn test_missing_inputs_are_all_reported() {
        let err = ConnectionSettings::from_inputs(None, Some(" ".to_string()), None).unwrap_err();
        match err {
            ConfigError::MissingArguments { names } => {
                assert_eq!(names.len(), 3);
                assert!(names[0].contains("TFEHOSTNAME"));
                assert!(names[1].contains("TFETOKEN"));
                assert!(names[2].contains("TFEORGANIZATIONNAME"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_base_url_adds_https_scheme() {
        assert_eq!(settings("tfe.example.com").base_url(), "https://tfe.example.com");
        assert_eq!(
            settings("http://127.0.0.1:8080/").base_url(),
            "http://127.0.0.1:8080"
        );
    }

    #[test]
    fn test_hostname_with_path_is_rejected() {
        assert!(settings("tfe.example.com/api").validate().is_err());
        assert!(settings("tfe.example.com").validate().is_ok());
    }

    #[test]
    fn test_run_url() {
        assert_eq!(
            settings("tfe.example.com").run_url("app1-dev", "run-123"),
            "https://tfe.example.com/app/acme/workspaces/app1-dev/runs/run-123"
        );
    }

    #[test]
    fn test_poll_settings_validation() {
        let config = PollSettings::default().to_monitor_config().unwrap();
        assert_eq!(config, MonitorConfig::default());

        let zero = PollSettings {
            interval_secs: 0,
            max_wait_secs: 10,
        };
        assert!(zero.validate().is_err());

        let short = PollSettings {
            interval_secs: 10,
            max_wait_secs: 5,
        };
        assert!(short.validate().is_err());
    }

    #[test]
    fn test_poll_settings_reject_deadline_above_ceiling() {
        let huge = PollSettings {
            interval_secs: 5,
            max_wait_secs: u64::MAX,
        };
        assert!(matches!(
            huge.to_monitor_config(),
            Err(ConfigError::InvalidValue { ref name, .. }) if name == env::MAX_WAIT_SECS
        ));

        let ceiling = PollSettings {
            interval_secs: 5,
            max_wait_secs: MAX_WAIT_CEILING_SECS,
        };
        assert!(ceiling.to_monitor_config().is_ok());

        let interval_too_long = PollSettings {
            interval_secs: MAX_WAIT_CEILING_SECS + 1,
            max_wait_secs: MAX_WAIT_CEILING_SECS,
        };
        assert!(interval_too_long.validate().is_err());
    }

    #[test]
    fn test_build_link_requires_all_parts() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (env::COLLECTION_URI, "https://dev.azure.com/acme/"),
            (env::TEAM_PROJECT, "infra"),
            (env::BUILD_ID, "42"),
        ]);
        let context = BuildContext::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(
            context.build_link().as_deref(),
            Some("https://dev.azure.com/acme/infra/_build/results?buildId=42")
        );
        assert_eq!(context.build_label(), "42");

        let partial = BuildContext::from_lookup(|k| {
            (k == env::BUILD_ID).then(|| "42".to_string())
        });
        assert!(partial.build_link().is_none());
    }

    #[test]
    fn test_parse_bool_any_case() {
        assert!(parse_bool("speculative", "True").unwrap());
        assert!(parse_bool("speculative", "TRUE").unwrap());
        assert!(!parse_bool("speculative", "false").unwrap());
        assert!(parse_bool("speculative", "yes").is_err());
    }
}
