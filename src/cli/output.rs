//! Output formatters for the dsearch CLI
//!
//! Provides two output formats:
//!
//! - **Human**: readable terminal output, including the three-state status
//!   banner (entitled / quota remaining / quota exhausted)
//! - **JSON**: structured output for scripting and jq

use std::io::{self, Write};

use serde::Serialize;

use crate::dispatch::DispatchOutcome;
use crate::gate::EntitlementSnapshot;
use crate::store::ProductOffering;

// =============================================================================
// Output Format Enum
// =============================================================================

/// Available output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable output
    #[default]
    Human,
    /// JSON output for scripting
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Human => write!(f, "human"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

// =============================================================================
// Formatters
// =============================================================================

#[derive(Serialize)]
struct StatusReport<'a> {
    #[serde(flatten)]
    snapshot: &'a EntitlementSnapshot,
    banner: &'a str,
}

/// The status banner has exactly three mutually exclusive states.
fn banner_for(snapshot: &EntitlementSnapshot) -> &'static str {
    if snapshot.is_entitled_locally {
        "entitled"
    } else if snapshot.remaining_free_searches > 0 {
        "quota-remaining"
    } else {
        "quota-exhausted"
    }
}

/// Write the entitlement status.
pub fn write_status(
    out: &mut impl Write,
    snapshot: &EntitlementSnapshot,
    format: OutputFormat,
) -> io::Result<()> {
    match format {
        OutputFormat::Json => {
            let report = StatusReport {
                snapshot,
                banner: banner_for(snapshot),
            };
            writeln!(out, "{}", serde_json::to_string_pretty(&report)?)
        }
        OutputFormat::Human => {
            match banner_for(snapshot) {
                "entitled" => writeln!(out, "Subscribed: unlimited searches")?,
                "quota-remaining" => writeln!(
                    out,
                    "Free searches remaining: {}/{}",
                    snapshot.remaining_free_searches, snapshot.free_quota
                )?,
                _ => writeln!(
                    out,
                    "Free quota exhausted ({} searches used)",
                    snapshot.free_quota
                )?,
            }
            if snapshot.pending_server_confirmation {
                writeln!(out, "(server confirmation pending)")?;
            }
            Ok(())
        }
    }
}

/// Write the product catalog.
pub fn write_products(
    out: &mut impl Write,
    products: &[ProductOffering],
    format: OutputFormat,
) -> io::Result<()> {
    match format {
        OutputFormat::Json => {
            writeln!(out, "{}", serde_json::to_string_pretty(products)?)
        }
        OutputFormat::Human => {
            if products.is_empty() {
                writeln!(out, "No products available")?;
            }
            for product in products {
                writeln!(out, "{}  {}/month", product.id, product.display_price)?;
            }
            Ok(())
        }
    }
}

/// Write a dispatch outcome. Launched is silent in human mode, matching the
/// navigate-away behavior of a UI host.
pub fn write_outcome(
    out: &mut impl Write,
    outcome: &DispatchOutcome,
    format: OutputFormat,
) -> io::Result<()> {
    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(outcome)?),
        OutputFormat::Human => {
            if let Some(message) = outcome.user_message() {
                writeln!(out, "{}", message)?;
            }
            Ok(())
        }
    }
}
