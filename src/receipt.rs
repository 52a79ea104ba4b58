//! Remote receipt validation.
//!
//! Verifies the locally stored purchase receipt against a remote endpoint
//! and interprets the integer `status` field of the JSON response:
//!
//! - `0` — receipt is valid
//! - `21007` — sandbox receipt sent to production; retry the same payload
//!   against the sandbox endpoint
//! - anything else — authoritative rejection
//!
//! Transport failures are reported as [`ReceiptOutcome::Error`], never as
//! `Invalid`: a network failure is not a rejection.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// Default production verification endpoint.
pub const PRODUCTION_VERIFY_URL: &str = "https://buy.itunes.apple.com/verifyReceipt";
/// Default sandbox verification endpoint.
pub const SANDBOX_VERIFY_URL: &str = "https://sandbox.itunes.apple.com/verifyReceipt";

const STATUS_VALID: i64 = 0;
const STATUS_SANDBOX_RECEIPT: i64 = 21007;

/// Tri-state result of a validation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptOutcome {
    /// The server confirmed the receipt.
    Valid,
    /// Authoritative rejection (bad status code), or no local receipt.
    Invalid,
    /// Could not reach a verdict: transport failure or malformed response.
    Error,
}

/// Transport-level verification errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Response has no integer `status` field")]
    MalformedResponse,
}

/// Provides the locally stored receipt blob, if any.
pub trait ReceiptSource: Send + Sync {
    fn receipt_blob(&self) -> Option<Vec<u8>>;
}

/// Receipt blob read from a file path. Absent file means no receipt.
pub struct FileReceiptSource {
    path: PathBuf,
}

impl FileReceiptSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ReceiptSource for FileReceiptSource {
    fn receipt_blob(&self) -> Option<Vec<u8>> {
        std::fs::read(&self.path).ok()
    }
}

/// POSTs the verification payload and extracts the `status` field.
#[async_trait]
pub trait ReceiptTransport: Send + Sync {
    async fn verify(&self, url: &str, payload: serde_json::Value) -> Result<i64, TransportError>;
}

/// Production transport over `ureq`.
pub struct HttpReceiptTransport;

#[async_trait]
impl ReceiptTransport for HttpReceiptTransport {
    async fn verify(&self, url: &str, payload: serde_json::Value) -> Result<i64, TransportError> {
        let url = url.to_string();
        tokio::task::spawn_blocking(move || {
            let response: serde_json::Value = ureq::post(&url)
                .set("Content-Type", "application/json")
                .send_json(payload)
                .map_err(|e| TransportError::Http(e.to_string()))?
                .into_json()
                .map_err(|e| TransportError::Http(e.to_string()))?;

            response
                .get("status")
                .and_then(|s| s.as_i64())
                .ok_or(TransportError::MalformedResponse)
        })
        .await
        .map_err(|e| TransportError::Http(format!("verification task failed: {}", e)))?
    }
}

/// Validates the local receipt against primary-then-sandbox endpoints.
pub struct ReceiptValidator {
    source: Arc<dyn ReceiptSource>,
    transport: Arc<dyn ReceiptTransport>,
    primary_url: String,
    sandbox_url: String,
    shared_secret: String,
}

impl ReceiptValidator {
    pub fn new(
        source: Arc<dyn ReceiptSource>,
        transport: Arc<dyn ReceiptTransport>,
        primary_url: String,
        sandbox_url: String,
        shared_secret: String,
    ) -> Self {
        Self {
            source,
            transport,
            primary_url,
            sandbox_url,
            shared_secret,
        }
    }

    fn payload(&self, blob: &[u8]) -> serde_json::Value {
        serde_json::json!({
            "receipt-data": BASE64.encode(blob),
            "password": self.shared_secret,
            "exclude-old-transactions": true,
        })
    }

    /// Run one validation pass.
    pub async fn validate(&self) -> ReceiptOutcome {
        let Some(blob) = self.source.receipt_blob() else {
            tracing::debug!("No local receipt to validate");
            return ReceiptOutcome::Invalid;
        };

        let payload = self.payload(&blob);
        match self.transport.verify(&self.primary_url, payload.clone()).await {
            Ok(STATUS_VALID) => {
                tracing::debug!("Receipt validated against primary endpoint");
                ReceiptOutcome::Valid
            }
            Ok(STATUS_SANDBOX_RECEIPT) => {
                tracing::debug!("Sandbox receipt detected, retrying against sandbox endpoint");
                match self.transport.verify(&self.sandbox_url, payload).await {
                    Ok(STATUS_VALID) => ReceiptOutcome::Valid,
                    Ok(status) => {
                        tracing::warn!(status, "Sandbox endpoint rejected receipt");
                        ReceiptOutcome::Invalid
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Sandbox verification unreachable");
                        ReceiptOutcome::Error
                    }
                }
            }
            Ok(status) => {
                tracing::warn!(status, "Receipt rejected by primary endpoint");
                ReceiptOutcome::Invalid
            }
            Err(e) => {
                tracing::warn!(error = %e, "Receipt verification unreachable");
                ReceiptOutcome::Error
            }
        }
    }
}
