//! HTTP client implementation over reqwest

use super::types::{
    ConfigurationVersion, ConfigurationVersionAttributes, CostEstimateAttributes, CreateRun,
    CreatedRun, Document, LogAttributes, NoAttributes, Resource, RunResource,
};
use crate::config::ConnectionSettings;
use crate::errors::ApiError;
use crate::logs::{LogPhase, PhaseLogSource};
use crate::monitor::{RunSnapshot, RunStatusSource};
use crate::observability;
use crate::redaction::{redact_if_enabled, RedactionConfig};
use async_trait::async_trait;
use reqwest::{header, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, instrument, Instrument};

/// Content type of every API request
pub const JSON_API_CONTENT_TYPE: &str = "application/vnd.api+json";

/// Per-request timeout used by [`TfeClient::new`]
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const UPLOAD_CONTENT_TYPE: &str = "application/octet-stream";
const MAX_LOGGED_BODY_CHARS: usize = 2048;

/// Authenticated client for one service host
#[derive(Debug, Clone)]
pub struct TfeClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    redaction: RedactionConfig,
}

impl TfeClient {
    pub fn new(settings: &ConnectionSettings) -> Result<Self, ApiError> {
        Self::with_base_url(
            settings.base_url(),
            settings.token.clone(),
            Some(DEFAULT_REQUEST_TIMEOUT),
        )
    }

    /// Create a client for an explicit base URL (scheme included)
    ///
    /// # Arguments
    /// * `timeout` - Optional timeout for all requests. If None, no timeout is applied.
    pub fn with_base_url(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, ApiError> {
        let mut builder =
            reqwest::Client::builder().user_agent(concat!("tfrun/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
            debug!("Configured HTTP client with timeout: {:?}", timeout);
        }
        let http = builder.build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            redaction: RedactionConfig::default(),
        })
    }

    pub fn with_redaction(mut self, redaction: RedactionConfig) -> Self {
        self.redaction = redaction;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v2/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Turn a location returned by the service into an absolute URL
    ///
    /// Some links (policy check output) are host-relative paths.
    pub fn resolve(&self, location: &str) -> String {
        if location.starts_with("http://") || location.starts_with("https://") {
            location.to_string()
        } else {
            format!("{}/{}", self.base_url, location.trim_start_matches('/'))
        }
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.token)
            .header(header::CONTENT_TYPE, JSON_API_CONTENT_TYPE)
    }

    async fn send(&self, method: Method, url: &str, body: Option<&Value>) -> Result<String, ApiError> {
        let mut request = self.request(method.clone(), url);
        if let Some(body) = body {
            request = request.body(body.to_string());
        }
        let response = request.send().await?;
        self.read_body(&method, url, response).await
    }

    async fn read_body(
        &self,
        method: &Method,
        url: &str,
        response: Response,
    ) -> Result<String, ApiError> {
        let status = response.status();
        let text = response.text().await?;
        let redacted = redact_if_enabled(&text, &self.redaction);
        debug!(
            %method,
            url,
            status = status.as_u16(),
            body = %truncate(&redacted),
            "API response"
        );

        if !status.is_success() {
            return Err(ApiError::Status {
                method: method.to_string(),
                url: url.to_string(),
                status: status.as_u16(),
                body: redacted,
            });
        }
        Ok(text)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let text = self.send(Method::GET, url, None).await?;
        decode(url, &text)
    }

    async fn post_json<T: DeserializeOwned>(&self, url: &str, body: &Value) -> Result<T, ApiError> {
        let text = self.send(Method::POST, url, Some(body)).await?;
        decode(url, &text)
    }

    async fn get_text(&self, url: &str) -> Result<String, ApiError> {
        self.send(Method::GET, url, None).await
    }

    /// Resolve a workspace name to its id
    #[instrument(skip(self))]
    pub async fn workspace_id(
        &self,
        organization: &str,
        workspace_name: &str,
    ) -> Result<String, ApiError> {
        let url = self.api_url(&format!(
            "organizations/{organization}/workspaces/{workspace_name}"
        ));
        let doc: Document<Resource<NoAttributes>> = self.get_json(&url).await?;
        required(&url, "data.id", Some(doc.data.id))
    }

    /// Create a configuration version that waits for an upload
    #[instrument(skip(self))]
    pub async fn create_configuration_version(
        &self,
        workspace_id: &str,
        speculative: bool,
    ) -> Result<ConfigurationVersion, ApiError> {
        let url = self.api_url(&format!("workspaces/{workspace_id}/configuration-versions"));
        let body = json!({
            "data": {
                "type": "configuration-versions",
                "attributes": {
                    "auto-queue-runs": false,
                    "speculative": speculative
                }
            }
        });
        let doc: Document<Resource<ConfigurationVersionAttributes>> =
            self.post_json(&url, &body).await?;

        let id = required(&url, "data.id", Some(doc.data.id))?;
        let upload_url = required(&url, "data.attributes.upload-url", doc.data.attributes.upload_url)?;
        info!("Created configuration version {}", id);
        Ok(ConfigurationVersion { id, upload_url })
    }

    /// Upload a gzip-compressed tar archive to a configuration version
    #[instrument(skip(self, upload_url, archive), fields(bytes = archive.len()))]
    pub async fn upload_configuration(
        &self,
        upload_url: &str,
        archive: Vec<u8>,
    ) -> Result<(), ApiError> {
        let response = self
            .http
            .put(upload_url)
            .bearer_auth(&self.token)
            .header(header::CONTENT_TYPE, UPLOAD_CONTENT_TYPE)
            .body(archive)
            .send()
            .await?;
        self.read_body(&Method::PUT, upload_url, response).await?;
        info!("Uploaded configuration archive");
        Ok(())
    }

    /// Queue a new run against an uploaded configuration version
    pub async fn create_run(&self, run: &CreateRun) -> Result<CreatedRun, ApiError> {
        let span = observability::run_create_span(&run.workspace_id, run.is_destroy, run.is_speculative);
        async move {
            let url = self.api_url("runs");
            let body = json!({
                "data": {
                    "type": "runs",
                    "attributes": {
                        "is-destroy": run.is_destroy,
                        "message": run.message
                    },
                    "relationships": {
                        "workspace": {
                            "data": { "type": "workspaces", "id": run.workspace_id }
                        },
                        "configuration-version": {
                            "data": {
                                "type": "configuration-versions",
                                "id": run.configuration_version_id
                            }
                        }
                    }
                }
            });
            let doc: Document<RunResource> = self.post_json(&url, &body).await?;
            let snapshot = doc.data.snapshot();

            let id = required(&url, "data.id", Some(doc.data.id))?;
            let plan_id = required(&url, "data.relationships.plan.data.id", snapshot.plan_id)?;
            tracing::Span::current().record(observability::fields::RUN_ID, id.as_str());
            info!("Created run {} (plan {})", id, plan_id);
            Ok(CreatedRun { id, plan_id })
        }
        .instrument(span)
        .await
    }

    /// Attach a comment to a run
    #[instrument(skip(self, body))]
    pub async fn create_run_comment(&self, run_id: &str, body: &str) -> Result<(), ApiError> {
        let url = self.api_url(&format!("runs/{run_id}/comments"));
        let payload = json!({
            "data": {
                "type": "comments",
                "attributes": { "body": body },
                "relationships": {
                    "run": { "data": { "type": "runs", "id": run_id } }
                }
            }
        });
        self.send(Method::POST, &url, Some(&payload)).await?;
        Ok(())
    }

    /// Confirm the apply of a run that stopped after planning
    pub async fn apply_run(&self, run_id: &str, comment: &str) -> Result<(), ApiError> {
        let span = observability::run_apply_span(run_id);
        async move {
            let url = self.api_url(&format!("runs/{run_id}/actions/apply"));
            let payload = json!({ "comment": comment });
            self.send(Method::POST, &url, Some(&payload)).await?;
            info!("Apply confirmed for run {}", run_id);
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Current status and relationships of a run
    pub async fn get_run(&self, run_id: &str) -> Result<RunSnapshot, ApiError> {
        let url = self.api_url(&format!("runs/{run_id}"));
        let doc: Document<RunResource> = self.get_json(&url).await?;
        Ok(doc.data.snapshot())
    }

    async fn log_read_url(&self, url: &str) -> Result<String, ApiError> {
        let doc: Document<Resource<LogAttributes>> = self.get_json(url).await?;
        required(url, "data.attributes.log-read-url", doc.data.attributes.log_read_url)
    }
}

#[async_trait]
impl RunStatusSource for TfeClient {
    async fn fetch_status(&self, run_id: &str) -> Result<RunSnapshot, ApiError> {
        self.get_run(run_id).await
    }
}

#[async_trait]
impl PhaseLogSource for TfeClient {
    async fn log_location(
        &self,
        run_id: &str,
        snapshot: &RunSnapshot,
        phase: LogPhase,
    ) -> Result<String, ApiError> {
        match phase {
            LogPhase::Plan => {
                let run_url = self.api_url(&format!("runs/{run_id}"));
                let plan_id = required(
                    &run_url,
                    "data.relationships.plan.data.id",
                    snapshot.plan_id.clone(),
                )?;
                self.log_read_url(&self.api_url(&format!("plans/{plan_id}")))
                    .await
            }
            LogPhase::CostEstimate => {
                let run_url = self.api_url(&format!("runs/{run_id}"));
                let id = required(
                    &run_url,
                    "data.relationships.cost-estimate.data.id",
                    snapshot.cost_estimate_id.clone(),
                )?;
                let url = self.api_url(&format!("cost-estimates/{id}"));
                let doc: Document<Resource<NoAttributes>> = self.get_json(&url).await?;
                required(&url, "data.links.self", doc.data.links.self_link)
            }
            LogPhase::PolicyCheck => {
                let url = self.api_url(&format!("runs/{run_id}/policy-checks"));
                let doc: Document<Vec<Resource<NoAttributes>>> = self.get_json(&url).await?;
                let output = doc.data.into_iter().next().and_then(|r| r.links.output);
                required(&url, "data[0].links.output", output)
            }
            LogPhase::Apply => {
                let url = match &snapshot.apply_id {
                    Some(apply_id) => self.api_url(&format!("applies/{apply_id}")),
                    None => self.api_url(&format!("runs/{run_id}/apply")),
                };
                self.log_read_url(&url).await
            }
        }
    }

    async fn read_log(&self, phase: LogPhase, location: &str) -> Result<String, ApiError> {
        let url = self.resolve(location);
        match phase {
            LogPhase::CostEstimate => {
                let doc: Document<Resource<CostEstimateAttributes>> = self.get_json(&url).await?;
                Ok(doc.data.attributes.render())
            }
            _ => self.get_text(&url).await,
        }
    }
}

fn decode<T: DeserializeOwned>(url: &str, text: &str) -> Result<T, ApiError> {
    serde_json::from_str(text).map_err(|e| ApiError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}

fn required(url: &str, field: &str, value: Option<String>) -> Result<String, ApiError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ApiError::MissingField {
            url: url.to_string(),
            field: field.to_string(),
        }),
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_LOGGED_BODY_CHARS {
        text.to_string()
    } else {
        let head: String = text.chars().take(MAX_LOGGED_BODY_CHARS).collect();
        format!("{head}... (truncated)")
    }
}
