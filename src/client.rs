//! Agent client for 402-gated resources
//!
//! A headless consumer that fetches protected resources, signs payment
//! authorizations with its wallet, enforces a spending policy, caches
//! receipts per content id, and retries facilitator failures with
//! exponential backoff. Budget counters and the receipt cache sit behind
//! mutexes taken at discrete points; callers issuing parallel fetches
//! through one client get racy budget accounting, not corruption.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::{Method, Response, StatusCode};
use serde_json::Value;
use url::Url;

use crate::budget::{BudgetManager, SpendingPolicy};
use crate::cache::ReceiptCache;
use crate::price::{parse_price, smallest_cmp};
use crate::protocol::parse_payment_request;
use crate::receipt::{ReceiptVerifier, PAYMENT_HEADER, RECEIPT_HEADER};
use crate::types::{
    FacilitatorPayload, FacilitatorResponse, PaymentRequest, SCHEME_EXACT, X402_VERSION,
};
use crate::wallet::Wallet;
use crate::{ErrorResponse, Result, X402Error};

/// Fallback cache TTL when a receipt's expiry cannot be read
const FALLBACK_CACHE_TTL_MS: u64 = 3_600_000;

/// Retry policy for facilitator submissions
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Retries after the initial attempt
    pub max_retries: u32,
    /// Base backoff; attempt `n` sleeps `backoff_ms * 2^n`
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_ms: 1000,
        }
    }
}

/// Lifecycle events emitted around each payment
#[derive(Debug, Clone)]
pub enum PaymentEvent {
    /// A payment sub-flow began
    Started {
        content_id: String,
        price: String,
        domain: Option<String>,
    },
    /// Payment settled and the receipt was cached
    Success {
        content_id: String,
        amount: String,
        tx_hash: Option<String>,
        budget_remaining: Option<String>,
    },
    /// Payment failed; the error is rethrown to the caller
    Failed {
        content_id: String,
        code: &'static str,
        message: String,
    },
}

type Listener = Arc<dyn Fn(&PaymentEvent) + Send + Sync>;

/// Programmatic consumer of 402-gated resources
pub struct AgentClient {
    http: reqwest::Client,
    wallet: Wallet,
    facilitator_url: Option<String>,
    budget: Mutex<BudgetManager>,
    cache: Mutex<ReceiptCache>,
    retry: RetryConfig,
    listeners: Mutex<Vec<Listener>>,
}

impl std::fmt::Debug for AgentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentClient")
            .field("wallet", &self.wallet)
            .field("facilitator_url", &self.facilitator_url)
            .field("retry", &self.retry)
            .finish()
    }
}

impl AgentClient {
    /// Create a client signing with `wallet` under an unrestricted policy
    pub fn new(wallet: Wallet) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| X402Error::config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            wallet,
            facilitator_url: None,
            budget: Mutex::new(BudgetManager::new(SpendingPolicy::unrestricted())),
            cache: Mutex::new(ReceiptCache::new()),
            retry: RetryConfig::default(),
            listeners: Mutex::new(Vec::new()),
        })
    }

    /// Install a spending policy
    pub fn with_policy(mut self, policy: SpendingPolicy) -> Self {
        self.budget = Mutex::new(BudgetManager::new(policy));
        self
    }

    /// Replace the budget manager (for custom warning callbacks)
    pub fn with_budget(mut self, budget: BudgetManager) -> Self {
        self.budget = Mutex::new(budget);
        self
    }

    /// Always submit payments to this facilitator instead of the one
    /// announced in 402 responses
    pub fn with_facilitator_url(mut self, url: impl Into<String>) -> Self {
        self.facilitator_url = Some(url.into());
        self
    }

    /// Set the retry policy for facilitator submissions
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Register a payment event listener. Listeners run synchronously on
    /// the paying flow; panics are contained and logged.
    pub fn on_payment<F>(&self, listener: F)
    where
        F: Fn(&PaymentEvent) + Send + Sync + 'static,
    {
        self.listeners
            .lock()
            .expect("listener lock poisoned")
            .push(Arc::new(listener));
    }

    /// Total spent so far, smallest units
    pub fn total_spent(&self) -> String {
        self.budget.lock().expect("budget lock poisoned").total_spent()
    }

    /// GET a resource, paying for it if the server demands payment
    pub async fn fetch(&self, url: &str) -> Result<Response> {
        self.fetch_with_method(Method::GET, url).await
    }

    /// Fetch a resource with an explicit method, paying when required
    pub async fn fetch_with_method(&self, method: Method, url: &str) -> Result<Response> {
        let parsed = Url::parse(url).map_err(|e| X402Error::config(format!("bad URL: {e}")))?;
        let content_key = content_id_for(&parsed);
        let domain = parsed.host_str().map(|h| h.to_string());

        // 1-2: try a cached receipt first
        let cached = self
            .cache
            .lock()
            .expect("cache lock poisoned")
            .get(&content_key);
        if let Some(token) = cached {
            let response = self
                .send_with_receipt(method.clone(), url, Some(&token))
                .await?;
            if response.status() != StatusCode::PAYMENT_REQUIRED {
                return Ok(response);
            }
            tracing::debug!(content_id = %content_key, "cached receipt rejected, evicting");
            self.cache
                .lock()
                .expect("cache lock poisoned")
                .evict(&content_key);
        }

        // 3: bare request
        let response = self.send_with_receipt(method.clone(), url, None).await?;
        if response.status() != StatusCode::PAYMENT_REQUIRED {
            return Ok(response);
        }

        // 4: parse the 402
        let request = parse_402(response).await?;

        // 5: pay, cache, and replay the original request
        let token = self.pay(&content_key, &request, domain).await?;
        self.send_with_receipt(method, url, Some(&token)).await
    }

    /// Run the payment sub-flow for a parsed 402 and return the receipt token
    async fn pay(
        &self,
        content_key: &str,
        request: &PaymentRequest,
        domain: Option<String>,
    ) -> Result<String> {
        self.emit(&PaymentEvent::Started {
            content_id: request.content_id.clone(),
            price: request.price.clone(),
            domain: domain.clone(),
        });

        match self.pay_inner(content_key, request, domain.clone()).await {
            Ok((token, amount, tx_hash)) => {
                let budget_remaining = {
                    let budget = self.budget.lock().expect("budget lock poisoned");
                    budget.remaining().ok().flatten()
                };
                self.emit(&PaymentEvent::Success {
                    content_id: request.content_id.clone(),
                    amount,
                    tx_hash,
                    budget_remaining,
                });
                Ok(token)
            }
            Err(error) => {
                self.emit(&PaymentEvent::Failed {
                    content_id: request.content_id.clone(),
                    code: error.code(),
                    message: error.to_string(),
                });
                Err(error)
            }
        }
    }

    async fn pay_inner(
        &self,
        content_key: &str,
        request: &PaymentRequest,
        domain: Option<String>,
    ) -> Result<(String, String, Option<String>)> {
        self.budget
            .lock()
            .expect("budget lock poisoned")
            .assert_spend(&request.price, domain.as_deref())?;

        let network = request.resolved_network()?;
        let smallest = parse_price(&request.price)?;
        let now = chrono::Utc::now().timestamp() as u64;
        let signed = self
            .wallet
            .authorize_payment(&request.pay_to, &smallest, network, now)?;

        let payload = FacilitatorPayload {
            x402_version: X402_VERSION,
            scheme: SCHEME_EXACT.to_string(),
            network: network.caip2().to_string(),
            payload: signed,
            resource: request.content_id.clone(),
        };

        let facilitator_url = self
            .facilitator_url
            .as_deref()
            .unwrap_or(&request.facilitator_url);
        if facilitator_url.is_empty() {
            return Err(X402Error::invalid_402("no facilitator URL announced"));
        }
        let settled = submit_with_retry(&self.http, facilitator_url, &payload, self.retry).await?;

        let ttl_ms = receipt_ttl_ms(&settled.receipt, now);
        self.cache
            .lock()
            .expect("cache lock poisoned")
            .set(content_key, &settled.receipt, ttl_ms);
        self.budget
            .lock()
            .expect("budget lock poisoned")
            .record_spend(&smallest, request.content_id.clone(), domain)?;

        Ok((settled.receipt, smallest, settled.tx_hash))
    }

    async fn send_with_receipt(
        &self,
        method: Method,
        url: &str,
        token: Option<&str>,
    ) -> Result<Response> {
        let mut builder = self.http.request(method, url);
        if let Some(token) = token {
            builder = builder
                .header(RECEIPT_HEADER, token)
                .header(PAYMENT_HEADER, token);
        }
        builder.send().await.map_err(X402Error::from)
    }

    fn emit(&self, event: &PaymentEvent) {
        let listeners = self.listeners.lock().expect("listener lock poisoned").clone();
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::warn!("payment event listener panicked");
            }
        }
    }
}

/// One-shot stateless payment: fetch `url`, paying at most `max_price`
/// with the given key. No cache, no budget, no events.
pub async fn pay_once(
    url: &str,
    private_key: &str,
    max_price: &str,
    facilitator_url: Option<&str>,
) -> Result<Response> {
    let wallet = Wallet::new(private_key)?;
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| X402Error::config(format!("failed to create HTTP client: {e}")))?;

    let response = http.get(url).send().await?;
    if response.status() != StatusCode::PAYMENT_REQUIRED {
        return Ok(response);
    }

    let request = parse_402(response).await?;

    let max_smallest = parse_price(max_price)?;
    let smallest = parse_price(&request.price)?;
    if smallest_cmp(&smallest, &max_smallest)? == std::cmp::Ordering::Greater {
        return Err(X402Error::payment_failed(format!(
            "price {} exceeds maximum {}",
            request.price, max_price
        )));
    }

    let network = request.resolved_network()?;
    let now = chrono::Utc::now().timestamp() as u64;
    let signed = wallet.authorize_payment(&request.pay_to, &smallest, network, now)?;
    let payload = FacilitatorPayload {
        x402_version: X402_VERSION,
        scheme: SCHEME_EXACT.to_string(),
        network: network.caip2().to_string(),
        payload: signed,
        resource: request.content_id.clone(),
    };

    let target = facilitator_url.unwrap_or(&request.facilitator_url);
    let settled = submit_with_retry(&http, target, &payload, RetryConfig::default()).await?;

    http.get(url)
        .header(RECEIPT_HEADER, &settled.receipt)
        .header(PAYMENT_HEADER, &settled.receipt)
        .send()
        .await
        .map_err(X402Error::from)
}

/// Cache key for a resource URL: host plus path
fn content_id_for(url: &Url) -> String {
    format!("{}{}", url.host_str().unwrap_or_default(), url.path())
}

/// Read payment parameters out of a 402 response, body first
async fn parse_402(response: Response) -> Result<PaymentRequest> {
    let headers = response.headers().clone();
    let body: Option<Value> = response.json().await.ok();
    parse_payment_request(body.as_ref(), &headers)
        .ok_or_else(|| X402Error::invalid_402("invalid 402 response"))
}

/// Submit a payment to the facilitator, retrying only facilitator-side
/// failures with exponential backoff.
async fn submit_with_retry(
    http: &reqwest::Client,
    facilitator_url: &str,
    payload: &FacilitatorPayload,
    retry: RetryConfig,
) -> Result<FacilitatorResponse> {
    let mut attempt = 0u32;
    loop {
        match submit(http, facilitator_url, payload).await {
            Ok(settled) => return Ok(settled),
            Err(error) if error.is_retryable() && attempt < retry.max_retries => {
                let delay = retry.backoff_ms.saturating_mul(2u64.saturating_pow(attempt));
                tracing::debug!(attempt, delay_ms = delay, %error, "facilitator retry");
                tokio::time::sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

async fn submit(
    http: &reqwest::Client,
    facilitator_url: &str,
    payload: &FacilitatorPayload,
) -> Result<FacilitatorResponse> {
    let response = http
        .post(facilitator_url)
        .json(payload)
        .send()
        .await
        .map_err(|e| X402Error::facilitator(format!("facilitator unreachable: {e}")))?;

    let status = response.status();
    if status.is_success() {
        return response.json().await.map_err(X402Error::from);
    }

    let message = response
        .json::<ErrorResponse>()
        .await
        .map(|body| body.error)
        .unwrap_or_else(|_| format!("facilitator returned {status}"));
    if status.is_server_error() {
        Err(X402Error::facilitator(message))
    } else {
        Err(X402Error::payment_failed(message))
    }
}

/// Cache lifetime derived from the receipt's own expiry
fn receipt_ttl_ms(token: &str, now: u64) -> u64 {
    ReceiptVerifier::Unverified
        .verify(token, None)
        .ok()
        .and_then(|receipt| receipt.expires_at.checked_sub(now))
        .map(|secs| secs.saturating_mul(1000))
        .unwrap_or(FALLBACK_CACHE_TTL_MS)
}
