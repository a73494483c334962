//! Logging setup
//!
//! Structured logging through `tracing`, formatted as text or JSON. All log
//! output goes to stderr: stdout carries the pipeline logging commands the
//! build agent parses, and the two must not interleave.

use anyhow::Result;
use std::{io, sync::Once};
use tracing_subscriber::{
    fmt, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Filter directive, takes precedence over `RUST_LOG`
pub const LOG_ENV: &str = "TFRUN_LOG";

/// `text` or `json`, used when no format is passed explicitly
pub const LOG_FORMAT_ENV: &str = "TFRUN_LOG_FORMAT";

/// Span lifecycle events to log (`new`, `close`, `full`, ...)
pub const LOG_SPAN_EVENTS_ENV: &str = "TFRUN_LOG_SPAN_EVENTS";

static INIT: Once = Once::new();

/// Initialize logging once per process; later calls are no-ops
///
/// * `format` - `"json"` for JSON lines, anything else for text. Falls back
///   to `TFRUN_LOG_FORMAT`, then text.
/// * `level` - default filter when neither `TFRUN_LOG` nor `RUST_LOG` is set.
pub fn init(format: Option<&str>, level: Option<&str>) -> Result<()> {
    INIT.call_once(|| {
        let filter = create_env_filter(level);

        let env_format = std::env::var(LOG_FORMAT_ENV).ok();
        let effective_format = format.or(env_format.as_deref()).unwrap_or("text");
        let span_events = span_events_for_format(effective_format);

        match effective_format {
            "json" => {
                tracing_subscriber::registry()
                    .with(
                        fmt::layer()
                            .json()
                            .with_target(true)
                            .with_span_events(span_events)
                            .with_writer(io::stderr),
                    )
                    .with(filter)
                    .init();
            }
            _ => {
                tracing_subscriber::registry()
                    .with(
                        fmt::layer()
                            .with_target(false)
                            .with_span_events(span_events)
                            .with_writer(io::stderr),
                    )
                    .with(filter)
                    .init();
            }
        }

        tracing::debug!("Logging initialized with format: {}", effective_format);
    });

    Ok(())
}

/// `TFRUN_LOG`, then `RUST_LOG`, then `default_level` (or `info`)
fn create_env_filter(default_level: Option<&str>) -> EnvFilter {
    let fallback = default_level.unwrap_or("info");
    let fallback_filter = || EnvFilter::try_new(fallback).unwrap_or_else(|_| EnvFilter::new("info"));

    if let Ok(spec) = std::env::var(LOG_ENV) {
        EnvFilter::try_new(&spec).unwrap_or_else(|_| {
            eprintln!("Invalid {LOG_ENV} specification '{spec}', using '{fallback}'");
            fallback_filter()
        })
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback_filter())
    }
}

fn span_events_for_format(format: &str) -> FmtSpan {
    if let Ok(raw) = std::env::var(LOG_SPAN_EVENTS_ENV) {
        return parse_span_events(&raw);
    }
    match format {
        "json" => FmtSpan::NEW | FmtSpan::CLOSE,
        _ => FmtSpan::NONE,
    }
}

fn parse_span_events(raw: &str) -> FmtSpan {
    let mut acc = FmtSpan::NONE;
    for token in raw.split(&[',', '|'][..]).map(|t| t.trim().to_lowercase()) {
        acc |= match token.as_str() {
            "new" => FmtSpan::NEW,
            "close" => FmtSpan::CLOSE,
            "enter" => FmtSpan::ENTER,
            "exit" => FmtSpan::EXIT,
            "active" => FmtSpan::ACTIVE,
            "full" => FmtSpan::FULL,
            _ => FmtSpan::NONE,
        };
    }
    acc
}

pub fn is_initialized() -> bool {
    INIT.is_completed()
}
