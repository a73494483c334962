//! Core library for the tfrun CLI
//!
//! This crate contains the run-lifecycle logic (status model, lifecycle
//! policy, run monitor, phase log collection) together with the API client,
//! archive builder, summary composer, pipeline annotations, logging and error
//! handling used by the binary.

pub mod api;
pub mod archive;
pub mod config;
pub mod errors;
pub mod logging;
pub mod logs;
pub mod monitor;
pub mod observability;
pub mod pipeline;
pub mod policy;
pub mod redaction;
pub mod status;
pub mod summary;

/// Get the version of the core library
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let version = version();
        assert!(!version.is_empty());
        assert!(version.contains('.'));
    }
}
