//! Resource-server payment gating
//!
//! Wraps route handlers with receipt verification. Requests without a
//! valid receipt get a fresh 402 with payment parameters; requests with
//! one reach the handler carrying a [`PaidRequest`] extension. Positive
//! verifications are cached briefly per token so hot resources do not
//! re-verify signatures on every hit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::protocol::{payment_required, PaymentRequired};
use crate::receipt::{extract_receipt_token, ReceiptVerifier};
use crate::types::{PublisherConfig, Receipt};
use crate::{Result, X402Error};

/// How long a positive verification may be served from cache
const VERIFICATION_CACHE_TTL_SECS: u64 = 60;
/// Entry count that triggers lazy eviction
const VERIFICATION_CACHE_MAX: usize = 1000;

/// Verified payment context handed to wrapped handlers
#[derive(Debug, Clone)]
pub struct PaidRequest {
    /// The verified receipt
    pub receipt: Receipt,
    /// Content id the receipt was checked against
    pub content_id: String,
    /// Raw token as presented by the client
    pub receipt_token: String,
}

#[derive(Debug, Clone)]
struct CachedVerification {
    receipt: Receipt,
    cached_at: u64,
}

struct GateInner {
    publisher: PublisherConfig,
    verifier: ReceiptVerifier,
    fixed_content_id: Option<String>,
    verified: Mutex<HashMap<String, CachedVerification>>,
}

/// Payment gate protecting one or more routes
#[derive(Clone)]
pub struct PaymentGate {
    inner: Arc<GateInner>,
}

impl std::fmt::Debug for PaymentGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentGate")
            .field("publisher", &self.inner.publisher)
            .field("verifier", &self.inner.verifier)
            .field("fixed_content_id", &self.inner.fixed_content_id)
            .finish()
    }
}

impl PaymentGate {
    /// Create a gate announcing `publisher` terms and verifying with `verifier`
    pub fn new(publisher: PublisherConfig, verifier: ReceiptVerifier) -> Self {
        Self {
            inner: Arc::new(GateInner {
                publisher,
                verifier,
                fixed_content_id: None,
                verified: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Gate every request under a fixed content id instead of the request path
    pub fn with_content_id(self, content_id: impl Into<String>) -> Self {
        let inner = GateInner {
            publisher: self.inner.publisher.clone(),
            verifier: self.inner.verifier.clone(),
            fixed_content_id: Some(content_id.into()),
            verified: Mutex::new(HashMap::new()),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// The content id a request resolves to
    pub fn content_id_for(&self, request_path: &str) -> String {
        self.inner
            .fixed_content_id
            .clone()
            .unwrap_or_else(|| request_path.to_string())
    }

    /// Verify the receipt on an inbound request against `content_id`
    pub fn verify_request(&self, content_id: &str, headers: &HeaderMap) -> Result<PaidRequest> {
        let token = extract_receipt_token(headers).ok_or(X402Error::ReceiptMissing)?;
        let now = chrono::Utc::now().timestamp() as u64;

        if let Some(receipt) = self.cached(&token, content_id, now) {
            return Ok(PaidRequest {
                receipt,
                content_id: content_id.to_string(),
                receipt_token: token,
            });
        }

        let receipt = self.inner.verifier.verify(&token, Some(content_id))?;
        self.remember(&token, &receipt, now);
        Ok(PaidRequest {
            receipt,
            content_id: content_id.to_string(),
            receipt_token: token,
        })
    }

    /// Assemble the 402 this gate answers unpaid requests with
    pub fn payment_required(&self, content_id: &str) -> Result<PaymentRequired> {
        payment_required(&self.inner.publisher, content_id)
    }

    fn cached(&self, token: &str, content_id: &str, now: u64) -> Option<Receipt> {
        let cache = self.inner.verified.lock().expect("verification cache poisoned");
        let entry = cache.get(token)?;
        let fresh = now.saturating_sub(entry.cached_at) <= VERIFICATION_CACHE_TTL_SECS
            && entry.receipt.expires_at > now;
        (fresh && entry.receipt.content_id == content_id).then(|| entry.receipt.clone())
    }

    fn remember(&self, token: &str, receipt: &Receipt, now: u64) {
        let mut cache = self.inner.verified.lock().expect("verification cache poisoned");
        if cache.len() >= VERIFICATION_CACHE_MAX {
            cache.retain(|_, entry| {
                now.saturating_sub(entry.cached_at) <= VERIFICATION_CACHE_TTL_SECS
                    && entry.receipt.expires_at > now
            });
        }
        cache.insert(
            token.to_string(),
            CachedVerification {
                receipt: receipt.clone(),
                cached_at: now,
            },
        );
    }

    #[cfg(test)]
    fn cached_len(&self) -> usize {
        self.inner.verified.lock().unwrap().len()
    }
}

/// Axum middleware enforcing payment on every request through it.
///
/// Install with `axum::middleware::from_fn_with_state(gate, payment_gate)`.
pub async fn payment_gate(
    State(gate): State<PaymentGate>,
    mut request: Request,
    next: Next,
) -> Response {
    let content_id = gate.content_id_for(request.uri().path());

    match gate.verify_request(&content_id, request.headers()) {
        Ok(paid) => {
            request.extensions_mut().insert(paid);
            next.run(request).await
        }
        Err(error) => {
            tracing::debug!(%error, %content_id, "receipt verification failed, issuing 402");
            match gate.payment_required(&content_id) {
                Ok(required) => into_402_response(required),
                Err(error) => {
                    tracing::error!(%error, "failed to assemble 402 response");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(serde_json::json!({"error": "failed to assemble payment request"})),
                    )
                        .into_response()
                }
            }
        }
    }
}

fn into_402_response(required: PaymentRequired) -> Response {
    let mut response = (StatusCode::PAYMENT_REQUIRED, Json(required.body)).into_response();
    for (name, value) in required.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            response.headers_mut().insert(name, value);
        }
    }
    response
}
