//! JSON:API documents exchanged with the run-orchestration service
//!
//! Only the fields the tool reads are modelled; everything else in a response
//! is ignored by serde.

use crate::monitor::RunSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level `{"data": ...}` wrapper
#[derive(Debug, Clone, Deserialize)]
pub struct Document<T> {
    pub data: T,
}

/// A resource object with typed attributes and relationships
#[derive(Debug, Clone, Deserialize)]
pub struct Resource<A, R = NoRelationships> {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub attributes: A,
    #[serde(default)]
    pub relationships: R,
    #[serde(default)]
    pub links: ResourceLinks,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoRelationships {}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoAttributes {}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceLinks {
    #[serde(rename = "self")]
    pub self_link: Option<String>,
    pub output: Option<String>,
}

/// `{"type": ..., "id": ...}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResourceIdentifier {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToOne {
    pub data: Option<ResourceIdentifier>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToMany {
    #[serde(default)]
    pub data: Vec<ResourceIdentifier>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunAttributes {
    pub status: String,
    #[serde(default)]
    pub is_destroy: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunRelationships {
    pub plan: Option<ToOne>,
    pub apply: Option<ToOne>,
    pub cost_estimate: Option<ToOne>,
    pub policy_checks: Option<ToMany>,
}

pub type RunResource = Resource<RunAttributes, RunRelationships>;

fn one_id(rel: &Option<ToOne>) -> Option<String> {
    rel.as_ref()
        .and_then(|r| r.data.as_ref())
        .map(|d| d.id.clone())
}

impl RunResource {
    /// Status and related references as seen by the monitor
    pub fn snapshot(&self) -> RunSnapshot {
        let rel = &self.relationships;
        let policy_check_id = rel
            .policy_checks
            .as_ref()
            .and_then(|r| r.data.first())
            .map(|d| d.id.clone());
        let cost_estimate_id = one_id(&rel.cost_estimate);

        RunSnapshot {
            status: self.attributes.status.clone(),
            has_cost_estimate: cost_estimate_id.is_some(),
            has_policy_check: policy_check_id.is_some(),
            cost_estimate_id,
            policy_check_id,
            plan_id: one_id(&rel.plan),
            apply_id: one_id(&rel.apply),
            is_destroy: self.attributes.is_destroy,
        }
    }
}

/// Attributes shared by plans and applies
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LogAttributes {
    pub status: Option<String>,
    pub log_read_url: Option<String>,
}

/// Cost figures are strings (dollars) or integers (counts) depending on the
/// field, so they are kept as raw JSON values.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CostEstimateAttributes {
    pub resources_count: Option<Value>,
    pub matched_resources_count: Option<Value>,
    pub unmatched_resources_count: Option<Value>,
    pub prior_monthly_cost: Option<Value>,
    pub proposed_monthly_cost: Option<Value>,
    pub delta_monthly_cost: Option<Value>,
}

const COST_LABEL_WIDTH: usize = 28;

fn plain(value: &Option<Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "n/a".to_string(),
        Some(other) => other.to_string(),
    }
}

fn monthly(value: &Option<Value>) -> String {
    match value {
        Some(Value::Null) | None => "n/a".to_string(),
        _ => format!("${}/month", plain(value)),
    }
}

impl CostEstimateAttributes {
    /// Render as the aligned `label: value` table shown in summaries
    pub fn render(&self) -> String {
        let rows = [
            ("resources-count", plain(&self.resources_count)),
            ("matched-resources-count", plain(&self.matched_resources_count)),
            (
                "unmatched-resources-count",
                plain(&self.unmatched_resources_count),
            ),
            ("prior-monthly-cost", monthly(&self.prior_monthly_cost)),
            ("proposed-monthly-cost", monthly(&self.proposed_monthly_cost)),
            ("delta-monthly-cost", monthly(&self.delta_monthly_cost)),
        ];
        rows.iter()
            .map(|(label, value)| {
                format!("{:<width$}{}\n", format!("{label}:"), value, width = COST_LABEL_WIDTH)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConfigurationVersionAttributes {
    pub upload_url: Option<String>,
    pub status: Option<String>,
}

/// A configuration version ready to receive an archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigurationVersion {
    pub id: String,
    pub upload_url: String,
}

/// Inputs of a new run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRun {
    pub workspace_id: String,
    pub configuration_version_id: String,
    pub is_destroy: bool,
    /// Carried by the configuration version; only recorded for tracing here
    pub is_speculative: bool,
    pub message: String,
}

/// A run as returned by creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedRun {
    pub id: String,
    pub plan_id: String,
}
