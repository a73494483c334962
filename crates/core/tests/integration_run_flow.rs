//! Monitor and log collection against a mock API server
//!
//! Walks a run through planning, cost estimation and a policy check, then
//! collects every phase log the way the plan command does.

use serde_json::{json, Value};
use std::time::Duration;
use tfrun_core::api::TfeClient;
use tfrun_core::logs::{self, LogPhase, LogStage};
use tfrun_core::monitor::{await_terminal, MonitorConfig, Run};
use tfrun_core::policy::{CompletionKind, MonitoringMode};
use tfrun_core::status::RunStatus;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn run_body(status: &str) -> Value {
    json!({
        "data": {
            "id": "run-1",
            "type": "runs",
            "attributes": { "status": status },
            "relationships": {
                "plan": { "data": { "id": "plan-1", "type": "plans" } },
                "cost-estimate": { "data": { "id": "ce-1", "type": "cost-estimates" } },
                "policy-checks": { "data": [ { "id": "polchk-1", "type": "policy-checks" } ] }
            }
        }
    })
}

/// Serve `statuses` in order, one response each, then keep serving the last
async fn mount_status_script(server: &MockServer, statuses: &[&str]) {
    let (last, head) = statuses.split_last().unwrap();
    for (i, status) in head.iter().enumerate() {
        Mock::given(method("GET"))
            .and(path("/api/v2/runs/run-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(run_body(status)))
            .up_to_n_times(1)
            .with_priority((i + 1) as u8)
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/api/v2/runs/run-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(run_body(last)))
        .with_priority(u8::MAX)
        .mount(server)
        .await;
}

async fn mount_plan_log(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v2/plans/plan-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "id": "plan-1",
                "type": "plans",
                "attributes": { "log-read-url": format!("{}/logs/plan-1", server.uri()) }
            }
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/logs/plan-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Plan: 2 to add, 0 to change, 0 to destroy."))
        .mount(server)
        .await;
}

async fn mount_cost_estimate(server: &MockServer) {
    let self_link = "/api/v2/cost-estimates/ce-1";
    Mock::given(method("GET"))
        .and(path(self_link))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "id": "ce-1",
                "type": "cost-estimates",
                "attributes": {
                    "resources-count": "2",
                    "matched-resources-count": "2",
                    "unmatched-resources-count": "0",
                    "prior-monthly-cost": "0.0",
                    "proposed-monthly-cost": "12.5",
                    "delta-monthly-cost": "12.5"
                },
                "links": { "self": self_link }
            }
        })))
        .mount(server)
        .await;
}

fn config() -> MonitorConfig {
    MonitorConfig::new(Duration::from_millis(10), Duration::from_secs(10))
}

#[tokio::test]
async fn test_plan_lifecycle_with_optional_phases() {
    let server = MockServer::start().await;
    mount_status_script(
        &server,
        &["planning", "cost_estimating", "policy_checking", "policy_checked"],
    )
    .await;
    mount_plan_log(&server).await;
    mount_cost_estimate(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v2/runs/run-1/policy-checks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [ {
                "id": "polchk-1",
                "type": "policy-checks",
                "attributes": {},
                "links": { "output": "/api/v2/policy-checks/polchk-1/output" }
            } ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/policy-checks/polchk-1/output"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Sentinel Result: true"))
        .mount(&server)
        .await;

    let client = TfeClient::with_base_url(server.uri(), "flow-token-12345", None).unwrap();
    let run = Run::from_id("run-1");

    let outcome = await_terminal(
        &client,
        &run,
        MonitoringMode::PlanLifecycle,
        &config(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.status, RunStatus::PolicyChecked);
    assert_eq!(outcome.completion, CompletionKind::Success);
    assert_eq!(outcome.polls, 4);
    assert!(outcome.flags.has_cost_estimate);
    assert!(outcome.flags.has_policy_check);

    let logs = logs::collect(&client, &outcome).await;
    assert!(logs.is_complete(), "missing: {:?}", logs.unavailable);
    assert_eq!(logs.plan.as_deref(), Some("Plan: 2 to add, 0 to change, 0 to destroy."));
    assert_eq!(logs.policy_check.as_deref(), Some("Sentinel Result: true"));
    let cost = logs.cost_estimate.as_deref().unwrap();
    assert!(cost.contains("$12.5/month"));
    assert!(logs.apply.is_none());
}

#[tokio::test]
async fn test_missing_policy_output_is_reported_not_fatal() {
    let server = MockServer::start().await;
    mount_status_script(&server, &["policy_soft_failed"]).await;
    mount_plan_log(&server).await;
    mount_cost_estimate(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v2/runs/run-1/policy-checks"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&server)
        .await;

    let client = TfeClient::with_base_url(server.uri(), "flow-token-12345", None).unwrap();

    let outcome = await_terminal(
        &client,
        &Run::from_id("run-1"),
        MonitoringMode::PlanLifecycle,
        &config(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(outcome.completion, CompletionKind::SoftFailure);

    let logs = logs::collect(&client, &outcome).await;
    assert!(logs.plan.is_some());
    assert!(logs.cost_estimate.is_some());
    assert!(logs.policy_check.is_none());
    assert_eq!(logs.unavailable.len(), 1);
    assert_eq!(logs.unavailable[0].phase, LogPhase::PolicyCheck);
    assert_eq!(logs.unavailable[0].stage, LogStage::Location);

    let err = logs.ensure_complete().unwrap_err();
    assert_eq!(err.phase, LogPhase::PolicyCheck);
}

#[tokio::test]
async fn test_apply_log_falls_back_to_run_apply_endpoint() {
    let server = MockServer::start().await;
    // No apply relationship on the run
    Mock::given(method("GET"))
        .and(path("/api/v2/runs/run-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "id": "run-1",
                "type": "runs",
                "attributes": { "status": "applied" },
                "relationships": { "plan": { "data": { "id": "plan-1", "type": "plans" } } }
            }
        })))
        .mount(&server)
        .await;
    mount_plan_log(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v2/runs/run-1/apply"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "id": "apply-1",
                "type": "applies",
                "attributes": { "log-read-url": format!("{}/logs/apply-1", server.uri()) }
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/logs/apply-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Apply complete!"))
        .mount(&server)
        .await;

    let client = TfeClient::with_base_url(server.uri(), "flow-token-12345", None).unwrap();

    let outcome = await_terminal(
        &client,
        &Run::from_id("run-1"),
        MonitoringMode::ApplyLifecycle,
        &config(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    let logs = logs::collect(&client, &outcome).await;
    assert_eq!(logs.apply.as_deref(), Some("Apply complete!"));
}
