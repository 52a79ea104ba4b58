//! Search dispatch: routes a (platform, query, mode) triple to a destination.
//!
//! Dispatch is two-phase in app mode: attempt the deep link, then report the
//! host launcher's boolean outcome. There is deliberately no fallback from
//! app to web — the user's mode choice is a strict routing directive, and
//! web search is its own explicit mode.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::catalog::{Platform, PlatformSpec};

/// How a search should be routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchMode {
    /// Open the platform's native app via its deep link; never falls back.
    #[default]
    AppOnly,
    /// Open the platform's web search page in the browser.
    WebOnly,
}

impl std::str::FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "app" | "app-only" => Ok(SearchMode::AppOnly),
            "web" | "web-only" => Ok(SearchMode::WebOnly),
            _ => Err(format!("Unknown search mode: {}", s)),
        }
    }
}

/// Result of one dispatch attempt. Never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum DispatchOutcome {
    /// The destination was opened (app launched, or web URL handed to the
    /// browser best-effort).
    Launched,
    /// The platform's app is not installed on this device.
    AppUnavailable { platform: Platform },
    /// The catalog has no app URL scheme for this platform. A configuration
    /// defect, distinct from "not installed".
    NoAppUrlConfigured { platform: Platform },
}

impl DispatchOutcome {
    /// User-facing alert text, `None` when nothing needs to be shown.
    pub fn user_message(&self) -> Option<String> {
        match self {
            DispatchOutcome::Launched => None,
            DispatchOutcome::AppUnavailable { platform } => Some(format!(
                "{} app is not installed on your device. \
                 Please install it or switch to Web Search mode.",
                platform.display_name()
            )),
            DispatchOutcome::NoAppUrlConfigured { platform } => Some(format!(
                "App URL scheme not available for {}.",
                platform.display_name()
            )),
        }
    }
}

/// Host capability for opening URLs.
///
/// Injected so dispatch outcomes can be driven by fakes in tests; the
/// production impl hands URLs to the operating system.
#[async_trait]
pub trait AppLauncher: Send + Sync {
    /// Attempt to open a deep link. Returns whether the host accepted it
    /// (i.e. an app is registered for the scheme).
    async fn open_app(&self, url: &str) -> bool;

    /// Open a web URL in the default browser, best-effort.
    async fn open_web(&self, url: &str) -> bool;
}

/// Launcher backed by the host OS URL handler.
pub struct SystemLauncher;

#[async_trait]
impl AppLauncher for SystemLauncher {
    async fn open_app(&self, url: &str) -> bool {
        let url = url.to_string();
        tokio::task::spawn_blocking(move || open::that(&url).is_ok())
            .await
            .unwrap_or(false)
    }

    async fn open_web(&self, url: &str) -> bool {
        let url = url.to_string();
        tokio::task::spawn_blocking(move || open::that(&url).is_ok())
            .await
            .unwrap_or(false)
    }
}

/// Maps (platform, query, mode) to a concrete destination and attempts it.
///
/// The resolver mutates no state of its own; the only side effect is the
/// OS-level launch attempt. Callers must reject blank queries before
/// calling — the resolver does not re-validate.
pub struct DispatchResolver {
    launcher: Arc<dyn AppLauncher>,
}

impl DispatchResolver {
    pub fn new(launcher: Arc<dyn AppLauncher>) -> Self {
        Self { launcher }
    }

    /// Dispatch a search and report the outcome.
    pub async fn resolve(
        &self,
        platform: Platform,
        raw_query: &str,
        mode: SearchMode,
    ) -> DispatchOutcome {
        self.resolve_spec(platform.spec(), raw_query, mode).await
    }

    /// Dispatch against an explicit catalog entry.
    pub async fn resolve_spec(
        &self,
        spec: &PlatformSpec,
        raw_query: &str,
        mode: SearchMode,
    ) -> DispatchOutcome {
        match mode {
            SearchMode::WebOnly => {
                let web_url = spec.web_url(raw_query);
                tracing::debug!(platform = %spec.display_name, url = %web_url, "Opening web search");
                self.launcher.open_web(&web_url).await;
                DispatchOutcome::Launched
            }
            SearchMode::AppOnly => {
                let Some(app_url) = spec.app_url(raw_query) else {
                    tracing::warn!(
                        platform = %spec.display_name,
                        "No app URL scheme configured"
                    );
                    return DispatchOutcome::NoAppUrlConfigured {
                        platform: spec.platform,
                    };
                };

                tracing::debug!(platform = %spec.display_name, url = %app_url, "Opening app deep link");
                if self.launcher.open_app(&app_url).await {
                    DispatchOutcome::Launched
                } else {
                    DispatchOutcome::AppUnavailable {
                        platform: spec.platform,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Records every URL handed to it; app opens succeed or fail per config.
    struct RecordingLauncher {
        app_installed: bool,
        app_calls: AtomicUsize,
        web_calls: AtomicUsize,
        urls: parking_lot::Mutex<Vec<String>>,
    }

    impl RecordingLauncher {
        fn new(app_installed: bool) -> Self {
            Self {
                app_installed,
                app_calls: AtomicUsize::new(0),
                web_calls: AtomicUsize::new(0),
                urls: parking_lot::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl AppLauncher for RecordingLauncher {
        async fn open_app(&self, url: &str) -> bool {
            self.app_calls.fetch_add(1, Ordering::SeqCst);
            self.urls.lock().push(url.to_string());
            self.app_installed
        }

        async fn open_web(&self, url: &str) -> bool {
            self.web_calls.fetch_add(1, Ordering::SeqCst);
            self.urls.lock().push(url.to_string());
            true
        }
    }

    fn schemeless_spec() -> PlatformSpec {
        PlatformSpec {
            platform: Platform::Youtube,
            display_name: "YouTube",
            app_url_template: None,
            web_url_template: "https://www.youtube.com/results?search_query={query}",
        }
    }

    #[tokio::test]
    async fn test_missing_app_template_is_a_configuration_defect() {
        let launcher = Arc::new(RecordingLauncher::new(true));
        let resolver = DispatchResolver::new(launcher.clone());

        let outcome = resolver
            .resolve_spec(&schemeless_spec(), "cats", SearchMode::AppOnly)
            .await;

        assert_eq!(
            outcome,
            DispatchOutcome::NoAppUrlConfigured {
                platform: Platform::Youtube
            }
        );
        // No launch attempt of any kind.
        assert_eq!(launcher.app_calls.load(Ordering::SeqCst), 0);
        assert_eq!(launcher.web_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_app_not_installed_names_the_platform() {
        let launcher = Arc::new(RecordingLauncher::new(false));
        let resolver = DispatchResolver::new(launcher);

        let outcome = resolver
            .resolve(Platform::Youtube, "cats", SearchMode::AppOnly)
            .await;

        assert_eq!(
            outcome,
            DispatchOutcome::AppUnavailable {
                platform: Platform::Youtube
            }
        );
        let message = outcome.user_message().unwrap();
        assert!(message.contains("YouTube"), "{}", message);
    }

    #[tokio::test]
    async fn test_app_mode_never_opens_web() {
        for installed in [true, false] {
            let launcher = Arc::new(RecordingLauncher::new(installed));
            let resolver = DispatchResolver::new(launcher.clone());
            resolver
                .resolve(Platform::Bilibili, "cats", SearchMode::AppOnly)
                .await;
            assert_eq!(launcher.web_calls.load(Ordering::SeqCst), 0);
        }

        // Configuration-defect path too.
        let launcher = Arc::new(RecordingLauncher::new(true));
        let resolver = DispatchResolver::new(launcher.clone());
        resolver
            .resolve_spec(&schemeless_spec(), "cats", SearchMode::AppOnly)
            .await;
        assert_eq!(launcher.web_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_web_mode_opens_web_url_unconditionally() {
        let launcher = Arc::new(RecordingLauncher::new(false));
        let resolver = DispatchResolver::new(launcher.clone());

        let outcome = resolver
            .resolve(Platform::Xiaohongshu, "cats", SearchMode::WebOnly)
            .await;

        assert_eq!(outcome, DispatchOutcome::Launched);
        assert_eq!(launcher.web_calls.load(Ordering::SeqCst), 1);
        assert_eq!(launcher.app_calls.load(Ordering::SeqCst), 0);
        let urls = launcher.urls.lock();
        assert!(urls[0].starts_with("https://www.xiaohongshu.com/"));
    }

    #[tokio::test]
    async fn test_dispatched_urls_carry_encoded_query() {
        let launcher = Arc::new(RecordingLauncher::new(true));
        let resolver = DispatchResolver::new(launcher.clone());
        resolver
            .resolve(Platform::Youtube, "a b&c", SearchMode::AppOnly)
            .await;
        let urls = launcher.urls.lock();
        assert_eq!(urls[0], "youtube://results?search_query=a%20b%26c");
    }

    #[test]
    fn test_launched_has_no_alert() {
        assert!(DispatchOutcome::Launched.user_message().is_none());
    }
}
