//! Client for the run-orchestration API (Terraform Enterprise / Cloud, v2)
//!
//! ## Endpoints used
//!
//! - Workspace lookup by organization and name
//! - Configuration version creation and archive upload
//! - Run creation, comments and apply confirmation
//! - Run status (backs the monitor's [`RunStatusSource`](crate::monitor::RunStatusSource))
//! - Plan, cost estimate, policy check and apply logs (backs
//!   [`PhaseLogSource`](crate::logs::PhaseLogSource))
//!
//! Every request carries the static bearer token and the JSON:API content
//! type. Non-success responses become [`ApiError::Status`](crate::errors::ApiError)
//! with the body redacted.

mod client;
mod types;

pub use client::{TfeClient, DEFAULT_REQUEST_TIMEOUT, JSON_API_CONTENT_TYPE};
pub use types::{
    ConfigurationVersion, CostEstimateAttributes, CreateRun, CreatedRun, Document,
    LogAttributes, ResourceIdentifier, RunResource,
};
