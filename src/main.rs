//! dsearch CLI - dispatch searches straight to platform apps
//!
//! A command-line interface over the dsearch core:
//! - Deep-link dispatch with an explicit app/web routing mode
//! - Free-quota gating with a persisted usage counter
//! - Subscription flow against the built-in stub store client
//! - Server-side receipt validation

use std::io::stdout;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dsearch::app::{SearchApp, SearchRequestOutcome};
use dsearch::cli::{write_outcome, write_products, write_status, Cli, Commands, OutputFormat};
use dsearch::config::DsearchConfig;
use dsearch::dispatch::{DispatchResolver, SystemLauncher};
use dsearch::gate::{EntitlementGate, GateEvent};
use dsearch::receipt::{
    FileReceiptSource, HttpReceiptTransport, ReceiptOutcome, ReceiptValidator,
};
use dsearch::store::{ProductKind, ProductOffering, StoreAdapter, StubStoreClient};
use dsearch::usage::{FileUsageStore, UsageCounter};

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path_override = cli.config.clone();

    // Quiet (error-only) by default unless --verbose is specified
    let filter = if cli.verbose { "debug" } else { "error" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let config = match &cli.config {
        Some(path) => DsearchConfig::load_from(path.clone()),
        None => DsearchConfig::load(),
    };

    match cli.command {
        Commands::Search {
            platform,
            query,
            mode,
            json,
        } => {
            let format = output_format(json, &config);
            let core = build_core(&config).await?;
            let resolver = DispatchResolver::new(Arc::new(SystemLauncher));
            let app = SearchApp::new(core.gate.clone(), resolver);

            let mut rx = core.gate.subscribe();
            let outcome = app
                .perform_search(platform.into(), &query, mode.into())
                .await?;

            match outcome {
                SearchRequestOutcome::Dispatched(dispatch) => {
                    write_outcome(&mut stdout(), &dispatch, format)?;
                }
                SearchRequestOutcome::Blocked => {
                    print_alerts(&mut rx);
                    std::process::exit(2);
                }
            }
        }

        Commands::Status { json, diagnostics } => {
            let format = output_format(json, &config);
            let core = build_core(&config).await?;
            write_status(&mut stdout(), &core.gate.snapshot(), format)?;
            if diagnostics {
                println!("{}", core.gate.diagnostics());
            }
        }

        Commands::Products { json } => {
            let format = output_format(json, &config);
            let core = build_core(&config).await?;
            let products = core.store.load_catalog().await;
            write_products(&mut stdout(), &products, format)?;
        }

        Commands::Purchase => {
            let core = build_core(&config).await?;
            let mut rx = core.gate.subscribe();
            core.gate.purchase_subscription().await;
            print_alerts(&mut rx);
        }

        Commands::Restore => {
            let core = build_core(&config).await?;
            let mut rx = core.gate.subscribe();
            core.gate.restore_purchases().await;
            print_alerts(&mut rx);
        }

        Commands::ValidateReceipt => {
            let core = build_core(&config).await?;
            match core.receipt.validate().await {
                ReceiptOutcome::Valid => println!("Receipt is valid"),
                ReceiptOutcome::Invalid => {
                    println!("No valid receipt");
                    std::process::exit(1);
                }
                ReceiptOutcome::Error => {
                    println!("Receipt validation inconclusive (network error)");
                    std::process::exit(3);
                }
            }
        }

        Commands::Reset => {
            let core = build_core(&config).await?;
            core.gate.reset_for_diagnostics();
            println!("Usage counter reset");
            write_status(&mut stdout(), &core.gate.snapshot(), OutputFormat::Human)?;
        }

        Commands::Config { list, set, path } => {
            handle_config(config_path_override, config, list, set, path)?;
        }
    }

    Ok(())
}

// =============================================================================
// Core Assembly
// =============================================================================

struct Core {
    gate: Arc<EntitlementGate>,
    store: Arc<StoreAdapter>,
    receipt: Arc<ReceiptValidator>,
}

/// Build the gate and its collaborators from configuration.
///
/// The store client is the stub ledger (a real store bridge lives outside
/// this binary), so `refresh_entitlements` is a local file read and is
/// awaited here as the cold-start "last-known" load.
async fn build_core(config: &DsearchConfig) -> anyhow::Result<Core> {
    let state_dir = DsearchConfig::state_dir();
    std::fs::create_dir_all(&state_dir)?;

    let usage = UsageCounter::new(
        Box::new(FileUsageStore::at(state_dir.join("usage.json"))),
        config.quota.free_quota,
    )?;

    let offerings = config
        .store
        .product_ids
        .iter()
        .map(|id| ProductOffering {
            id: id.clone(),
            display_price: "$0.99".to_string(),
            kind: ProductKind::AutoRenewingSubscription,
        })
        .collect();
    let client = Arc::new(StubStoreClient::new(
        offerings,
        Some(state_dir.join("entitlements.json")),
    ));
    let store = Arc::new(StoreAdapter::new(client, config.store.product_ids.clone()));
    store.refresh_entitlements().await;

    let receipt_path = config
        .receipt
        .receipt_path
        .clone()
        .unwrap_or_else(|| state_dir.join("receipt.bin"));
    let receipt = Arc::new(ReceiptValidator::new(
        Arc::new(FileReceiptSource::new(receipt_path)),
        Arc::new(HttpReceiptTransport),
        config.receipt.primary_url.clone(),
        config.receipt.sandbox_url.clone(),
        config.receipt.shared_secret.clone(),
    ));

    let gate = Arc::new(EntitlementGate::new(usage, store.clone(), receipt.clone()));
    Ok(Core {
        gate,
        store,
        receipt,
    })
}

/// Print queued alert events (everything except snapshot updates).
fn print_alerts(rx: &mut tokio::sync::broadcast::Receiver<GateEvent>) {
    while let Ok(event) = rx.try_recv() {
        match event {
            GateEvent::SnapshotChanged { .. } => {}
            GateEvent::SubscriptionRequired { message }
            | GateEvent::PurchaseCompleted { message }
            | GateEvent::PurchaseFailed { message }
            | GateEvent::RestoreCompleted { message }
            | GateEvent::RestoreFailed { message }
            | GateEvent::ReceiptMismatch { message } => println!("{}", message),
        }
    }
}

fn output_format(json_flag: bool, config: &DsearchConfig) -> OutputFormat {
    if json_flag {
        return OutputFormat::Json;
    }
    config
        .output
        .default_format
        .parse()
        .unwrap_or(OutputFormat::Human)
}

fn handle_config(
    path_override: Option<std::path::PathBuf>,
    mut config: DsearchConfig,
    list: bool,
    set: Option<String>,
    path: bool,
) -> anyhow::Result<()> {
    let config_path = path_override.unwrap_or_else(DsearchConfig::default_path);

    if path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if let Some(assignment) = set {
        let (key, value) = assignment
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Expected KEY=VALUE, got '{}'", assignment))?;
        config.set_value(key.trim(), value.trim())?;
        config.save_to(&config_path)?;
        println!("Set {} = {}", key.trim(), value.trim());
        return Ok(());
    }

    // Default (and --list): print all values
    let _ = list;
    for (key, value) in config.list() {
        println!("{} = {}", key, value);
    }
    Ok(())
}
