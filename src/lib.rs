//! dsearch - distraction-free deep-link search dispatch
//!
//! Routes a single query to a third-party platform, either by launching the
//! platform's native app via a deep link or by opening its web search page,
//! and gates usage behind a free-quota-then-subscription model.
//!
//! ## Architecture
//!
//! - [`catalog`]: static platform table (deep-link + web URL templates)
//! - [`dispatch`]: resolves (platform, query, mode) to a destination and
//!   reports the launch outcome; no app-to-web fallback
//! - [`usage`]: persisted free-quota counter
//! - [`store`]: purchase lifecycle and locally-known entitlements
//! - [`receipt`]: server-side receipt validation (advisory)
//! - [`gate`]: the entitlement state machine combining the three signals
//! - [`app`]: the `perform_search` entry point for presentation layers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dsearch::app::SearchApp;
//! use dsearch::catalog::Platform;
//! use dsearch::dispatch::{DispatchResolver, SearchMode, SystemLauncher};
//!
//! # async fn run(gate: Arc<dsearch::gate::EntitlementGate>) {
//! let resolver = DispatchResolver::new(Arc::new(SystemLauncher));
//! let app = SearchApp::new(gate, resolver);
//! let outcome = app
//!     .perform_search(Platform::Youtube, "cats", SearchMode::AppOnly)
//!     .await;
//! # }
//! ```

pub mod app;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod gate;
pub mod query;
pub mod receipt;
pub mod store;
pub mod usage;

// Re-exports for convenience
pub use app::{SearchApp, SearchRequestOutcome};
pub use catalog::Platform;
pub use dispatch::{AppLauncher, DispatchOutcome, DispatchResolver, SearchMode, SystemLauncher};
pub use gate::{EntitlementGate, EntitlementSnapshot, GateEvent};
pub use receipt::{ReceiptOutcome, ReceiptValidator};
pub use store::{ProductOffering, PurchaseAttemptResult, StoreAdapter, StoreClient};
pub use usage::{UsageCounter, UsageState};
