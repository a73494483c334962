//! Command implementations
//!
//! Each module implements one `tfrun` subcommand as an `execute_*` function
//! taking its argument struct and the shared [`CommandContext`].

pub mod apply;
pub mod archive;
pub mod monitor;
pub mod plan;
pub mod shared;
pub mod workspace_id;

pub use shared::CommandContext;
