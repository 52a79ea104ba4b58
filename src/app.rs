//! `perform_search` entry point: gate check, dispatch, usage accounting.
//!
//! The presentation layer calls this instead of touching the resolver and
//! gate separately, so the gating order is fixed: blocked users never reach
//! dispatch, and only a launched dispatch consumes quota.

use std::sync::Arc;

use crate::catalog::Platform;
use crate::dispatch::{DispatchOutcome, DispatchResolver, SearchMode};
use crate::gate::EntitlementGate;

/// Errors from the search entry point.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Callers are expected to disable the search affordance for blank
    /// queries; reaching here is a caller bug.
    #[error("Query is empty")]
    EmptyQuery,
}

/// What happened to one search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchRequestOutcome {
    /// The gate allowed the search; the dispatch outcome follows.
    Dispatched(DispatchOutcome),
    /// Quota exhausted and not entitled; the paywall prompt was emitted.
    Blocked,
}

/// Facade combining the entitlement gate and the dispatch resolver.
pub struct SearchApp {
    gate: Arc<EntitlementGate>,
    resolver: DispatchResolver,
}

impl SearchApp {
    pub fn new(gate: Arc<EntitlementGate>, resolver: DispatchResolver) -> Self {
        Self { gate, resolver }
    }

    pub fn gate(&self) -> &Arc<EntitlementGate> {
        &self.gate
    }

    /// Perform one search, gated by `can_use_app()`.
    ///
    /// Usage is recorded only when the dispatch actually launched a
    /// destination; a missing app or a catalog defect does not consume
    /// quota.
    pub async fn perform_search(
        &self,
        platform: Platform,
        raw_query: &str,
        mode: SearchMode,
    ) -> Result<SearchRequestOutcome, SearchError> {
        let query = raw_query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        if !self.gate.can_use_app() {
            tracing::info!(platform = %platform, "Search blocked: quota exhausted");
            self.gate.notify_subscription_required();
            return Ok(SearchRequestOutcome::Blocked);
        }

        let outcome = self.resolver.resolve(platform, query, mode).await;
        if outcome == DispatchOutcome::Launched {
            self.gate.record_usage();
        }
        Ok(SearchRequestOutcome::Dispatched(outcome))
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::dispatch::AppLauncher;
    use crate::gate::GateEvent;
    use crate::receipt::{ReceiptSource, ReceiptTransport, ReceiptValidator, TransportError};
    use crate::store::{StoreAdapter, StubStoreClient, DEFAULT_PRODUCT_ID};
    use crate::usage::{MemoryUsageStore, UsageCounter, DEFAULT_FREE_QUOTA};

    struct NoReceipt;

    impl ReceiptSource for NoReceipt {
        fn receipt_blob(&self) -> Option<Vec<u8>> {
            None
        }
    }

    struct NeverReached;

    #[async_trait]
    impl ReceiptTransport for NeverReached {
        async fn verify(
            &self,
            _url: &str,
            _payload: serde_json::Value,
        ) -> Result<i64, TransportError> {
            Err(TransportError::Http("unreachable".to_string()))
        }
    }

    struct CountingLauncher {
        installed: bool,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl AppLauncher for CountingLauncher {
        async fn open_app(&self, _url: &str) -> bool {
            self.calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.installed
        }

        async fn open_web(&self, _url: &str) -> bool {
            self.calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            true
        }
    }

    fn app_with_launcher(installed: bool) -> (SearchApp, Arc<CountingLauncher>) {
        let usage =
            UsageCounter::new(Box::new(MemoryUsageStore::new()), DEFAULT_FREE_QUOTA).unwrap();
        let store = Arc::new(StoreAdapter::new(
            Arc::new(StubStoreClient::in_memory()),
            vec![DEFAULT_PRODUCT_ID.to_string()],
        ));
        let receipt = Arc::new(ReceiptValidator::new(
            Arc::new(NoReceipt),
            Arc::new(NeverReached),
            "https://primary.example/verifyReceipt".to_string(),
            "https://sandbox.example/verifyReceipt".to_string(),
            String::new(),
        ));
        let gate = Arc::new(EntitlementGate::new(usage, store, receipt));
        let launcher = Arc::new(CountingLauncher {
            installed,
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let resolver = DispatchResolver::new(launcher.clone());
        (SearchApp::new(gate, resolver), launcher)
    }

    #[tokio::test]
    async fn test_blank_query_is_rejected_before_gating() {
        let (app, launcher) = app_with_launcher(true);
        let result = app
            .perform_search(Platform::Youtube, "   ", SearchMode::AppOnly)
            .await;
        assert!(matches!(result, Err(SearchError::EmptyQuery)));
        assert_eq!(
            launcher.calls.load(std::sync::atomic::Ordering::SeqCst),
            0
        );
    }

    #[tokio::test]
    async fn test_blocked_search_never_dispatches() {
        let (app, launcher) = app_with_launcher(true);
        for _ in 0..DEFAULT_FREE_QUOTA {
            app.perform_search(Platform::Youtube, "cats", SearchMode::AppOnly)
                .await
                .unwrap();
        }
        let calls_before = launcher.calls.load(std::sync::atomic::Ordering::SeqCst);

        let mut rx = app.gate().subscribe();
        let outcome = app
            .perform_search(Platform::Youtube, "cats", SearchMode::AppOnly)
            .await
            .unwrap();

        assert_eq!(outcome, SearchRequestOutcome::Blocked);
        assert_eq!(
            launcher.calls.load(std::sync::atomic::Ordering::SeqCst),
            calls_before
        );
        assert!(matches!(
            rx.try_recv().unwrap(),
            GateEvent::SubscriptionRequired { .. }
        ));
    }

    #[tokio::test]
    async fn test_failed_launch_does_not_consume_quota() {
        let (app, _launcher) = app_with_launcher(false);
        let outcome = app
            .perform_search(Platform::Youtube, "cats", SearchMode::AppOnly)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            SearchRequestOutcome::Dispatched(DispatchOutcome::AppUnavailable {
                platform: Platform::Youtube
            })
        );
        assert_eq!(
            app.gate().snapshot().remaining_free_searches,
            DEFAULT_FREE_QUOTA
        );
    }

    #[tokio::test]
    async fn test_launched_search_consumes_quota() {
        let (app, _launcher) = app_with_launcher(true);
        app.perform_search(Platform::Bilibili, "cats", SearchMode::AppOnly)
            .await
            .unwrap();
        assert_eq!(
            app.gate().snapshot().remaining_free_searches,
            DEFAULT_FREE_QUOTA - 1
        );
    }
}
