//! CLI module for dsearch
//!
//! Provides the command-line interface with:
//!
//! - Search dispatch to platform apps or web pages
//! - Quota/entitlement status with human and JSON output
//! - Subscription flow against the stub store client
//! - Configuration file management
//!
//! ## Usage
//!
//! ```bash
//! # Search YouTube in the native app
//! dsearch search youtube "lofi beats"
//!
//! # Web search instead
//! dsearch search bilibili "rust async" --mode web
//!
//! # Quota status for scripting
//! dsearch status --json | jq '.remainingFreeSearches'
//!
//! # Configuration management
//! dsearch config --list
//! dsearch config --set quota.free_quota=20
//! ```
//!
//! ## Module Structure
//!
//! - `commands`: CLI command definitions using clap
//! - `output`: Human and JSON formatters

pub mod commands;
pub mod output;

// Re-exports for convenience
pub use commands::{Cli, CliPlatform, CliSearchMode, Commands};
pub use output::{write_outcome, write_products, write_status, OutputFormat};
