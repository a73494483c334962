//! Observability utilities for standardized tracing spans and structured fields
//!
//! This module provides helper functions and constants for consistent tracing
//! across the run workflows, so log consumers can filter on stable span names
//! regardless of which command produced them.

use crate::policy::MonitoringMode;
use std::path::Path;
use tracing::{span, Span};

/// Canonical span names for core workflows
pub mod spans {
    pub const RUN_CREATE: &str = "run.create";
    pub const RUN_MONITOR: &str = "run.monitor";
    pub const RUN_COLLECT_LOGS: &str = "run.collect_logs";
    pub const RUN_APPLY: &str = "run.apply";
    pub const ARCHIVE_CREATE: &str = "archive.create";
}

/// Common field names for structured logging
pub mod fields {
    pub const RUN_ID: &str = "run_id";
    pub const POLLS: &str = "polls";
}

/// Start a span for run creation
pub fn run_create_span(workspace_id: &str, is_destroy: bool, is_speculative: bool) -> Span {
    span!(
        target: "tfrun_core::observability",
        tracing::Level::INFO,
        spans::RUN_CREATE,
        workspace_id = %workspace_id,
        is_destroy,
        is_speculative,
        run_id = tracing::field::Empty
    )
}

/// Start a span for the poll loop of one run
///
/// The `polls` field is recorded once the loop stops.
pub fn run_monitor_span(run_id: &str, mode: MonitoringMode) -> Span {
    span!(
        target: "tfrun_core::observability",
        tracing::Level::INFO,
        spans::RUN_MONITOR,
        run_id = %run_id,
        mode = %mode,
        polls = tracing::field::Empty
    )
}

/// Start a span for phase log collection
pub fn run_collect_logs_span(run_id: &str) -> Span {
    span!(
        target: "tfrun_core::observability",
        tracing::Level::INFO,
        spans::RUN_COLLECT_LOGS,
        run_id = %run_id
    )
}

/// Start a span for apply confirmation
pub fn run_apply_span(run_id: &str) -> Span {
    span!(
        target: "tfrun_core::observability",
        tracing::Level::INFO,
        spans::RUN_APPLY,
        run_id = %run_id
    )
}

/// Start a span for archive creation
pub fn archive_create_span(source_dir: &Path) -> Span {
    span!(
        target: "tfrun_core::observability",
        tracing::Level::INFO,
        spans::ARCHIVE_CREATE,
        source_dir = %source_dir.display(),
        files = tracing::field::Empty
    )
}
