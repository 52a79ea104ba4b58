//! Entitlement gate: the single owner of "may the user search?" state.
//!
//! Folds three independently-updating signals into one decision:
//!
//! - the persisted usage counter (free quota)
//! - the store adapter's locally-known entitlement set
//! - remote receipt validation (advisory)
//!
//! `can_use_app()` always answers synchronously from cached state; network
//! refreshes run in the background and only ever upgrade entitlement within
//! a session. Presentation layers subscribe to [`GateEvent`] broadcasts
//! instead of the gate depending on any UI framework.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::receipt::{ReceiptOutcome, ReceiptValidator};
use crate::store::{PurchaseAttemptResult, StoreAdapter, StoreError};
use crate::usage::{UsageCounter, UsageError};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Point-in-time view of the gate's published state. Recomputed, never
/// persisted; the store ledger and usage file are the durable truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementSnapshot {
    /// Derived from "entitled product-id set is non-empty".
    pub is_entitled_locally: bool,
    /// True while a receipt check is in flight.
    pub pending_server_confirmation: bool,
    pub remaining_free_searches: u32,
    pub free_quota: u32,
}

/// Notifications emitted to presentation collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum GateEvent {
    SnapshotChanged { snapshot: EntitlementSnapshot },
    /// The user is blocked and should be shown the paywall.
    SubscriptionRequired { message: String },
    PurchaseCompleted { message: String },
    PurchaseFailed { message: String },
    RestoreCompleted { message: String },
    RestoreFailed { message: String },
    /// Server-side receipt validation disagrees with local entitlement.
    /// Advisory: access is not revoked mid-session.
    ReceiptMismatch { message: String },
}

#[derive(Debug)]
struct GateState {
    is_entitled_locally: bool,
    pending_server_confirmation: bool,
}

/// The top-level entitlement state machine.
///
/// One instance per process; all mutations are serialized through its
/// interior locks, and every lock is released before any `.await`.
pub struct EntitlementGate {
    usage: Mutex<UsageCounter>,
    store: Arc<StoreAdapter>,
    receipt: Arc<ReceiptValidator>,
    state: Mutex<GateState>,
    events: broadcast::Sender<GateEvent>,
}

impl EntitlementGate {
    /// Build the gate from its collaborators.
    ///
    /// The initial entitlement comes from the adapter's last-known set; no
    /// network fetch is awaited. Call [`refresh`](Self::refresh) afterwards
    /// to kick off the background reconciliation.
    pub fn new(
        usage: UsageCounter,
        store: Arc<StoreAdapter>,
        receipt: Arc<ReceiptValidator>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let is_entitled_locally = store.is_entitled();
        Self {
            usage: Mutex::new(usage),
            store,
            receipt,
            state: Mutex::new(GateState {
                is_entitled_locally,
                pending_server_confirmation: false,
            }),
            events,
        }
    }

    /// Subscribe to gate notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<GateEvent> {
        self.events.subscribe()
    }

    /// Current published state.
    pub fn snapshot(&self) -> EntitlementSnapshot {
        let usage = self.usage.lock().read();
        let state = self.state.lock();
        EntitlementSnapshot {
            is_entitled_locally: state.is_entitled_locally,
            pending_server_confirmation: state.pending_server_confirmation,
            remaining_free_searches: usage.remaining,
            free_quota: usage.free_quota,
        }
    }

    /// Whether another search may be performed right now.
    ///
    /// Answers from cached state only; never blocks on the network.
    /// Entitlement, when present, supersedes quota unconditionally.
    pub fn can_use_app(&self) -> bool {
        if self.state.lock().is_entitled_locally {
            return true;
        }
        self.usage.lock().read().remaining > 0
    }

    /// Consume one search from the quota.
    ///
    /// A no-op while entitled: the persisted counter is not touched.
    pub fn record_usage(&self) {
        if self.state.lock().is_entitled_locally {
            tracing::trace!("Entitled: search not counted against quota");
            return;
        }
        let result: Result<_, UsageError> = self.usage.lock().increment();
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to persist usage count");
        }
        self.publish_snapshot();
    }

    /// Re-derive state and kick off background reconciliation.
    ///
    /// Called on app start, foreground, and after purchase/restore. The
    /// gating decision uses the adapter's last-known entitlements
    /// immediately; the ledger fetch and receipt check run without being
    /// awaited. Background results only ever upgrade entitlement.
    pub fn refresh(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if !state.is_entitled_locally && self.store.is_entitled() {
                state.is_entitled_locally = true;
            }
            state.pending_server_confirmation = true;
        }
        self.publish_snapshot();

        let gate = Arc::clone(self);
        tokio::spawn(async move {
            let entitled_set = gate.store.refresh_entitlements().await;
            if !entitled_set.is_empty() {
                let upgraded = {
                    let mut state = gate.state.lock();
                    let was = state.is_entitled_locally;
                    state.is_entitled_locally = true;
                    !was
                };
                if upgraded {
                    tracing::info!("Entitlement confirmed from store ledger");
                    gate.publish_snapshot();
                }
            }

            let outcome = gate.receipt.validate().await;
            let entitled_now = {
                let mut state = gate.state.lock();
                state.pending_server_confirmation = false;
                state.is_entitled_locally
            };
            match outcome {
                ReceiptOutcome::Valid => {
                    tracing::debug!("Server receipt validation confirmed entitlement");
                }
                ReceiptOutcome::Invalid if entitled_now => {
                    // Advisory only: the store ledger stays authoritative
                    // for this session, but the disagreement is surfaced.
                    tracing::warn!("Receipt validation failed while locally entitled");
                    gate.publish(GateEvent::ReceiptMismatch {
                        message: "Server receipt validation failed; access continues from the \
                                  local transaction ledger."
                            .to_string(),
                    });
                }
                ReceiptOutcome::Invalid => {
                    tracing::debug!("No valid receipt; user is not entitled");
                }
                ReceiptOutcome::Error => {
                    tracing::debug!("Receipt validation inconclusive (transport error)");
                }
            }
            gate.publish_snapshot();
        });
    }

    /// Purchase the subscription offering.
    ///
    /// Entitlement flips atomically on `Success` only; every other outcome
    /// leaves it untouched and emits a failure/cancellation alert.
    pub async fn purchase_subscription(&self) {
        let offering = match self.first_offering().await {
            Some(offering) => offering,
            None => {
                self.publish(GateEvent::PurchaseFailed {
                    message: "Subscription product not available. Please try again later."
                        .to_string(),
                });
                return;
            }
        };

        match self.store.purchase(&offering).await {
            Ok(PurchaseAttemptResult::Success { transaction_id }) => {
                tracing::info!(transaction = %transaction_id, "Subscription purchased");
                self.state.lock().is_entitled_locally = true;
                self.publish_snapshot();
                self.publish(GateEvent::PurchaseCompleted {
                    message: "Thank you for subscribing! You now have unlimited access."
                        .to_string(),
                });
            }
            Ok(result) => {
                let message = result
                    .failure_message()
                    .unwrap_or("Unknown purchase error occurred.")
                    .to_string();
                self.publish(GateEvent::PurchaseFailed { message });
            }
            Err(StoreError::Busy) => {
                self.publish(GateEvent::PurchaseFailed {
                    message: "Another purchase is already in progress.".to_string(),
                });
            }
            Err(e) => {
                self.publish(GateEvent::PurchaseFailed {
                    message: format!("Purchase failed: {}", e),
                });
            }
        }
    }

    /// Restore purchases and re-derive entitlement from the refreshed set.
    pub async fn restore_purchases(&self) {
        match self.store.restore().await {
            Ok(()) => {
                let entitled = self.store.is_entitled();
                self.state.lock().is_entitled_locally = entitled;
                self.publish_snapshot();
                self.publish(GateEvent::RestoreCompleted {
                    message: "Purchases restored successfully!".to_string(),
                });
            }
            Err(e) => {
                self.publish(GateEvent::RestoreFailed {
                    message: format!("Failed to restore purchases: {}", e),
                });
            }
        }
    }

    /// Emit the paywall prompt for a blocked user.
    pub fn notify_subscription_required(&self) {
        let quota = self.usage.lock().read().free_quota;
        let price = self
            .store
            .offerings()
            .into_iter()
            .next()
            .map(|o| o.display_price)
            .unwrap_or_else(|| "$0.99".to_string());
        self.publish(GateEvent::SubscriptionRequired {
            message: format!(
                "You have used all {} free searches. Subscribe for {}/month to continue.",
                quota, price
            ),
        });
    }

    /// Clear the usage counter and re-derive entitlement. Diagnostic only.
    pub fn reset_for_diagnostics(&self) {
        if let Err(e) = self.usage.lock().reset() {
            tracing::warn!(error = %e, "Failed to reset usage counter");
        }
        self.state.lock().is_entitled_locally = self.store.is_entitled();
        self.publish_snapshot();
    }

    /// Force the entitled state without a purchase. Diagnostic only.
    pub fn force_entitled_for_diagnostics(&self) {
        self.state.lock().is_entitled_locally = true;
        self.publish_snapshot();
    }

    /// Human-readable status report for the diagnostics surface.
    pub fn diagnostics(&self) -> String {
        let snapshot = self.snapshot();
        let usage = self.usage.lock().read();
        format!(
            "Status:\n\
             - Search Count: {}\n\
             - Free Searches Remaining: {}\n\
             - Entitled Locally: {}\n\
             - Pending Server Confirmation: {}\n\
             - Purchase In Flight: {}\n\
             - Last Store Error: {}",
            usage.count,
            snapshot.remaining_free_searches,
            snapshot.is_entitled_locally,
            snapshot.pending_server_confirmation,
            self.store.is_purchasing(),
            self.store.last_error().unwrap_or_else(|| "none".to_string()),
        )
    }

    async fn first_offering(&self) -> Option<crate::store::ProductOffering> {
        if let Some(offering) = self.store.offerings().into_iter().next() {
            return Some(offering);
        }
        // Catalog not loaded yet; try once before giving up.
        self.store.load_catalog().await.into_iter().next()
    }

    fn publish_snapshot(&self) {
        let snapshot = self.snapshot();
        self.publish(GateEvent::SnapshotChanged { snapshot });
    }

    fn publish(&self, event: GateEvent) {
        // No receivers is fine; the CLI polls snapshots instead.
        let _ = self.events.send(event);
    }
}
