//! CLI command definitions for dsearch
//!
//! Defines all CLI commands and arguments using clap derive macros.
//!
//! ## Commands
//!
//! - `search` - Dispatch a search to a platform app or its web page
//! - `status` - Show quota and entitlement status
//! - `products` - List subscription offerings
//! - `purchase` / `restore` - Exercise the subscription flow (stub store)
//! - `validate-receipt` - Run a server-side receipt check
//! - `reset` - Clear the usage counter (diagnostics)
//! - `config` - Show or modify configuration

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::catalog::Platform;
use crate::dispatch::SearchMode;

// =============================================================================
// Main CLI
// =============================================================================

/// dsearch - distraction-free deep-link search with a quota-gated core
#[derive(Parser, Debug)]
#[command(name = "dsearch")]
#[command(about = "Dispatch searches straight to platform apps", long_about = None)]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

// =============================================================================
// Argument Enums
// =============================================================================

/// Search platform (CLI compatible)
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum CliPlatform {
    #[value(alias = "yt")]
    Youtube,
    #[value(alias = "xhs")]
    Xiaohongshu,
    #[value(alias = "bili")]
    Bilibili,
}

impl From<CliPlatform> for Platform {
    fn from(platform: CliPlatform) -> Self {
        match platform {
            CliPlatform::Youtube => Platform::Youtube,
            CliPlatform::Xiaohongshu => Platform::Xiaohongshu,
            CliPlatform::Bilibili => Platform::Bilibili,
        }
    }
}

/// Routing mode (CLI compatible)
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum CliSearchMode {
    /// Open the platform's native app; no web fallback
    #[default]
    App,
    /// Open the platform's web search page
    Web,
}

impl From<CliSearchMode> for SearchMode {
    fn from(mode: CliSearchMode) -> Self {
        match mode {
            CliSearchMode::App => SearchMode::AppOnly,
            CliSearchMode::Web => SearchMode::WebOnly,
        }
    }
}

// =============================================================================
// Commands
// =============================================================================

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Dispatch a search to a platform
    Search {
        /// Target platform
        #[arg(value_enum)]
        platform: CliPlatform,

        /// Search query
        query: String,

        /// Routing mode
        #[arg(short, long, value_enum, default_value_t)]
        mode: CliSearchMode,

        /// JSON output
        #[arg(long)]
        json: bool,
    },

    /// Show quota and entitlement status
    Status {
        /// JSON output
        #[arg(long)]
        json: bool,

        /// Include the full diagnostics report
        #[arg(long)]
        diagnostics: bool,
    },

    /// List subscription offerings
    Products {
        /// JSON output
        #[arg(long)]
        json: bool,
    },

    /// Purchase the subscription (stub store client)
    Purchase,

    /// Restore purchases from the store ledger
    Restore,

    /// Validate the local receipt against the verification endpoints
    ValidateReceipt,

    /// Clear the usage counter (diagnostics only)
    Reset,

    /// Show or modify configuration
    Config {
        /// List all configuration values
        #[arg(long)]
        list: bool,

        /// Set a value, e.g. --set quota.free_quota=20
        #[arg(long, value_name = "KEY=VALUE")]
        set: Option<String>,

        /// Print the config file path
        #[arg(long)]
        path: bool,
    },
}
