//! Facilitator service: validate, settle, and mint receipts
//!
//! A single POST endpoint accepts a signed EIP-3009 authorization, runs it
//! through the verification pipeline, executes the transfer through a
//! pluggable executor, and answers with a signed receipt. All client-input
//! faults map to 400; executor and signing failures map to 500.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ethereum_types::U256;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::crypto::{eip712, keccak256, signature};
use crate::receipt::sign_receipt;
use crate::types::{
    FacilitatorPayload, FacilitatorResponse, Network, Receipt, TransferAuthorization,
    SCHEME_EXACT, X402_VERSION,
};
use crate::{ErrorResponse, Result, X402Error};

/// Default TCP port
pub const DEFAULT_PORT: u16 = 4020;
/// Default facilitator fee, percent of each transfer
pub const DEFAULT_FEE_PERCENT: f64 = 2.0;
/// Default receipt lifetime in seconds
pub const DEFAULT_RECEIPT_TTL_SECS: u64 = 86_400;

/// Facilitator service configuration, loaded from the environment
#[derive(Clone)]
pub struct FacilitatorConfig {
    /// TCP listen port
    pub port: u16,
    /// HMAC secret for receipt signing
    pub jwt_secret: String,
    /// Fee percent in `[0, 50]`
    pub fee_percent: f64,
    /// External URL placed into minted receipts
    pub facilitator_url: String,
    /// When true, transfers run through the mock executor
    pub mock_transfers: bool,
    /// On-chain signer key, required when not mocking
    pub private_key: Option<String>,
    /// Upstream chain RPC, required when not mocking
    pub rpc_url: Option<String>,
    /// Receipt lifetime in seconds
    pub receipt_ttl_secs: u64,
}

impl std::fmt::Debug for FacilitatorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacilitatorConfig")
            .field("port", &self.port)
            .field("fee_percent", &self.fee_percent)
            .field("facilitator_url", &self.facilitator_url)
            .field("mock_transfers", &self.mock_transfers)
            .field("receipt_ttl_secs", &self.receipt_ttl_secs)
            .finish()
    }
}

impl FacilitatorConfig {
    /// Create a config with defaults and the given signing secret
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            port: DEFAULT_PORT,
            jwt_secret: jwt_secret.into(),
            fee_percent: DEFAULT_FEE_PERCENT,
            facilitator_url: format!("http://localhost:{DEFAULT_PORT}"),
            mock_transfers: true,
            private_key: None,
            rpc_url: None,
            receipt_ttl_secs: DEFAULT_RECEIPT_TTL_SECS,
        }
    }

    /// Set the fee percent
    pub fn with_fee_percent(mut self, fee_percent: f64) -> Self {
        self.fee_percent = fee_percent;
        self
    }

    /// Set the external facilitator URL
    pub fn with_facilitator_url(mut self, url: impl Into<String>) -> Self {
        self.facilitator_url = url.into();
        self
    }

    /// Set the receipt lifetime
    pub fn with_receipt_ttl_secs(mut self, ttl: u64) -> Self {
        self.receipt_ttl_secs = ttl;
        self
    }

    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        let port = match std::env::var("PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| X402Error::config(format!("PORT is not a port number: {raw}")))?,
            Err(_) => DEFAULT_PORT,
        };
        let jwt_secret = std::env::var("JWT_SECRET")
            .map_err(|_| X402Error::config("JWT_SECRET is required"))?;
        let fee_percent = match std::env::var("FEE_PERCENT") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| X402Error::config(format!("FEE_PERCENT is not a number: {raw}")))?,
            Err(_) => DEFAULT_FEE_PERCENT,
        };
        let facilitator_url = std::env::var("FACILITATOR_URL")
            .unwrap_or_else(|_| format!("http://localhost:{port}"));
        let mock_transfers = std::env::var("MOCK_TRANSFERS")
            .map(|v| v != "false")
            .unwrap_or(true);
        let receipt_ttl_secs = match std::env::var("RECEIPT_TTL_SECS") {
            Ok(raw) => raw.parse().map_err(|_| {
                X402Error::config(format!("RECEIPT_TTL_SECS is not a number: {raw}"))
            })?,
            Err(_) => DEFAULT_RECEIPT_TTL_SECS,
        };

        let config = Self {
            port,
            jwt_secret,
            fee_percent,
            facilitator_url,
            mock_transfers,
            private_key: std::env::var("FACILITATOR_PRIVATE_KEY").ok(),
            rpc_url: std::env::var("RPC_URL").ok(),
            receipt_ttl_secs,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check invariants on the assembled configuration
    pub fn validate(&self) -> Result<()> {
        if self.jwt_secret.is_empty() {
            return Err(X402Error::config("JWT_SECRET must not be empty"));
        }
        if !(0.0..=50.0).contains(&self.fee_percent) {
            return Err(X402Error::config(format!(
                "FEE_PERCENT must be between 0 and 50, got {}",
                self.fee_percent
            )));
        }
        if !self.mock_transfers && (self.private_key.is_none() || self.rpc_url.is_none()) {
            return Err(X402Error::config(
                "FACILITATOR_PRIVATE_KEY and RPC_URL are required when MOCK_TRANSFERS=false",
            ));
        }
        Ok(())
    }
}

/// Outcome of a transfer execution
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    /// Settlement transaction hash
    pub tx_hash: String,
    /// Whether the transfer went through
    pub success: bool,
}

/// Pluggable settlement backend invoked once per verified payment
#[async_trait]
pub trait TransferExecutor: Send + Sync {
    /// Execute (or simulate) the `transferWithAuthorization` call
    async fn execute(
        &self,
        authorization: &TransferAuthorization,
        signature: &str,
        chain_id: u64,
    ) -> Result<TransferOutcome>;
}

/// Executor that fabricates a deterministic transaction hash from the nonce
#[derive(Debug, Default, Clone)]
pub struct MockTransferExecutor;

#[async_trait]
impl TransferExecutor for MockTransferExecutor {
    async fn execute(
        &self,
        authorization: &TransferAuthorization,
        _signature: &str,
        _chain_id: u64,
    ) -> Result<TransferOutcome> {
        let tx_hash = format!("0x{}", hex::encode(keccak256(&authorization.nonce_bytes()?)));
        Ok(TransferOutcome {
            tx_hash,
            success: true,
        })
    }
}

/// Executor that broadcasts `transferWithAuthorization` through a chain RPC.
///
/// Submissions are serialized behind a mutex: the facilitator signs with a
/// single key, and concurrent broadcasts would race on the chain nonce.
pub struct OnChainTransferExecutor {
    #[allow(dead_code)]
    private_key: String,
    rpc_url: String,
    submit_lock: tokio::sync::Mutex<()>,
}

impl OnChainTransferExecutor {
    /// Create an executor for the given signer key and RPC endpoint
    pub fn new(private_key: impl Into<String>, rpc_url: impl Into<String>) -> Self {
        Self {
            private_key: private_key.into(),
            rpc_url: rpc_url.into(),
            submit_lock: tokio::sync::Mutex::new(()),
        }
    }
}

#[async_trait]
impl TransferExecutor for OnChainTransferExecutor {
    async fn execute(
        &self,
        _authorization: &TransferAuthorization,
        _signature: &str,
        chain_id: u64,
    ) -> Result<TransferOutcome> {
        let _guard = self.submit_lock.lock().await;
        // TODO: wire transferWithAuthorization broadcast through an EVM RPC
        // client; the signature is relayed as-is and gas is paid by this key.
        Err(X402Error::rpc(format!(
            "on-chain settlement to chain {chain_id} via {} is not available in this build",
            self.rpc_url
        )))
    }
}

/// Shared state of the facilitator service
#[derive(Clone)]
pub struct FacilitatorState {
    config: Arc<FacilitatorConfig>,
    executor: Arc<dyn TransferExecutor>,
}

impl FacilitatorState {
    /// Build state from configuration, choosing the executor by mock mode
    pub fn new(config: FacilitatorConfig) -> Result<Self> {
        config.validate()?;
        let executor: Arc<dyn TransferExecutor> = if config.mock_transfers {
            Arc::new(MockTransferExecutor)
        } else {
            let key = config
                .private_key
                .clone()
                .ok_or_else(|| X402Error::config("FACILITATOR_PRIVATE_KEY is required"))?;
            let rpc = config
                .rpc_url
                .clone()
                .ok_or_else(|| X402Error::config("RPC_URL is required"))?;
            Arc::new(OnChainTransferExecutor::new(key, rpc))
        };
        Ok(Self {
            config: Arc::new(config),
            executor,
        })
    }

    /// Replace the transfer executor
    pub fn with_executor(mut self, executor: Arc<dyn TransferExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Service configuration
    pub fn config(&self) -> &FacilitatorConfig {
        &self.config
    }
}

/// Split `value` into facilitator fee and publisher share.
///
/// `fee + publisher == value` holds for every input; integer division
/// truncates in the publisher's favor.
pub fn fee_split(value: U256, fee_percent: f64) -> (U256, U256) {
    let fee_bps = U256::from((fee_percent * 100.0).round() as u64);
    let denom = U256::from(10_000u64);
    // split the multiply so it cannot overflow on pathological values
    let fee = (value / denom) * fee_bps + (value % denom) * fee_bps / denom;
    (fee, value - fee)
}

/// Run the full payment pipeline on an already-parsed payload
pub async fn process_payment(
    state: &FacilitatorState,
    body: &Value,
) -> Result<FacilitatorResponse> {
    let payload = validate_shape(body)?;

    let network = Network::from_caip2(&payload.network)
        .or_else(|| Network::from_key(&payload.network))
        .ok_or_else(|| X402Error::NetworkNotSupported {
            network: payload.network.clone(),
        })?;

    let authorization = &payload.payload.authorization;
    let domain = eip712::stablecoin_domain(network)?;
    let digest = eip712::transfer_authorization_hash(&domain, authorization)?;
    let recovered = signature::recover_signer(digest, &payload.payload.signature)?;
    if !signature::format_address(recovered).eq_ignore_ascii_case(&authorization.from) {
        return Err(X402Error::SignatureMismatch {
            recovered: signature::format_address(recovered),
            expected: authorization.from.clone(),
        });
    }

    let now = chrono::Utc::now().timestamp() as u64;
    authorization.validate_window(now)?;

    let value = authorization.value_u256()?;
    if value < U256::one() {
        return Err(X402Error::invalid_authorization("value must be at least 1"));
    }
    let (fee, publisher_amount) = fee_split(value, state.config.fee_percent);

    let outcome = state
        .executor
        .execute(authorization, &payload.payload.signature, network.chain_id())
        .await
        .map_err(|e| match e {
            X402Error::Rpc { .. } | X402Error::TransferFailed { .. } => e,
            other => X402Error::transfer_failed(other.to_string()),
        })?;
    if !outcome.success {
        return Err(X402Error::transfer_failed("Transfer execution failed"));
    }

    let receipt = Receipt {
        id: Uuid::new_v4().to_string(),
        content_id: payload.resource.clone(),
        payer: authorization.from.to_lowercase(),
        payee: authorization.to.to_lowercase(),
        amount: publisher_amount.to_string(),
        currency: "USDC".to_string(),
        chain_id: network.chain_id(),
        tx_hash: outcome.tx_hash.clone(),
        paid_at: now,
        expires_at: now + state.config.receipt_ttl_secs,
        facilitator: state.config.facilitator_url.clone(),
    };
    let token = sign_receipt(&receipt, &state.config.jwt_secret)?;

    tracing::info!(
        content_id = %receipt.content_id,
        payer = %receipt.payer,
        amount = %receipt.amount,
        fee = %fee,
        tx_hash = %outcome.tx_hash,
        "payment settled, receipt minted"
    );

    Ok(FacilitatorResponse {
        receipt: token,
        tx_hash: Some(outcome.tx_hash),
    })
}

/// Enforce the wire shape of a facilitator request, naming the offending
/// field in the rejection.
fn validate_shape(body: &Value) -> Result<FacilitatorPayload> {
    let version = body
        .get("x402Version")
        .and_then(Value::as_u64)
        .ok_or_else(|| X402Error::invalid_payload("x402Version must be an integer"))?;
    if version != X402_VERSION as u64 {
        return Err(X402Error::invalid_payload(format!(
            "x402Version must be {X402_VERSION}, got {version}"
        )));
    }

    let scheme = require_str(body, "scheme")?;
    if scheme != SCHEME_EXACT {
        return Err(X402Error::invalid_payload(format!(
            "scheme must be '{SCHEME_EXACT}', got '{scheme}'"
        )));
    }
    require_str(body, "network")?;
    require_str(body, "resource")?;

    let payload = body
        .get("payload")
        .filter(|v| v.is_object())
        .ok_or_else(|| X402Error::invalid_payload("payload is required"))?;
    let signature = require_str(payload, "signature")?;
    if !signature.starts_with("0x") {
        return Err(X402Error::invalid_payload("payload.signature must be 0x-prefixed"));
    }

    let authorization = payload
        .get("authorization")
        .filter(|v| v.is_object())
        .ok_or_else(|| X402Error::invalid_payload("payload.authorization is required"))?;
    for field in ["from", "to", "nonce"] {
        let value = require_str(authorization, field)?;
        if !value.starts_with("0x") {
            return Err(X402Error::invalid_payload(format!(
                "authorization.{field} must be 0x-prefixed"
            )));
        }
    }
    require_str(authorization, "value")?;
    for field in ["validAfter", "validBefore"] {
        authorization
            .get(field)
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                X402Error::invalid_payload(format!(
                    "authorization.{field} must be a unix timestamp"
                ))
            })?;
    }

    Ok(serde_json::from_value(body.clone())?)
}

fn require_str<'a>(value: &'a Value, field: &str) -> Result<&'a str> {
    value
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| X402Error::invalid_payload(format!("{field} must be a string")))
}

/// Build the facilitator router with CORS and request tracing
pub fn router(state: FacilitatorState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::GET, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::HeaderName::from_static("x-402-receipt"),
            header::HeaderName::from_static("x-payment"),
        ])
        .max_age(std::time::Duration::from_secs(86_400));

    Router::new()
        .route("/", post(handle_payment).get(handle_health))
        .route("/facilitator", post(handle_payment))
        .route("/health", get(handle_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve the facilitator until the process exits
pub async fn serve(config: FacilitatorConfig) -> Result<()> {
    let port = config.port;
    let state = FacilitatorState::new(config)?;
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, mock = state.config.mock_transfers, "facilitator listening");
    axum::serve(listener, router(state))
        .await
        .map_err(X402Error::from)
}

async fn handle_payment(State(state): State<FacilitatorState>, Json(body): Json<Value>) -> Response {
    match process_payment(&state, &body).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(error) => {
            let status = StatusCode::from_u16(error.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            if status.is_server_error() {
                tracing::error!(%error, "payment pipeline failed");
            } else {
                tracing::warn!(%error, "payment rejected");
            }
            (status, Json(ErrorResponse::from(&error))).into_response()
        }
    }
}

async fn handle_health(State(state): State<FacilitatorState>) -> Response {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "mockMode": state.config.mock_transfers,
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receipt::ReceiptVerifier;
    use crate::wallet::Wallet;

    const TEST_KEY: &str =
        "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
    const PAYEE: &str = "0x209693Bc6afc0C5328bA36FaF03C514EF312287C";

    fn test_state() -> FacilitatorState {
        FacilitatorState::new(FacilitatorConfig::new("test-secret")).unwrap()
    }

    fn signed_request(mutate: impl FnOnce(&mut Value)) -> Value {
        let wallet = Wallet::new(TEST_KEY).unwrap();
        let authorization = TransferAuthorization {
            from: wallet.address(),
            to: PAYEE.to_string(),
            value: "100000".to_string(),
            valid_after: 0,
            valid_before: 9_999_999_999,
            nonce: format!("0x{}", "ab".repeat(32)),
        };
        let signed = wallet
            .sign_authorization(authorization, Network::BaseMainnet)
            .unwrap();
        let mut body = json!({
            "x402Version": 1,
            "scheme": "exact",
            "network": "eip155:8453",
            "resource": "article-1",
            "payload": {
                "signature": signed.signature,
                "authorization": signed.authorization,
            },
        });
        mutate(&mut body);
        body
    }

    #[test]
    fn test_fee_conservation() {
        for value in [0u64, 1, 99, 100_000, 1_000_000, u64::MAX] {
            for fee_percent in [0.0, 0.5, 2.0, 12.5, 50.0] {
                let value = U256::from(value);
                let (fee, publisher) = fee_split(value, fee_percent);
                assert_eq!(fee + publisher, value);
                assert!(fee <= value);
            }
        }
    }

    #[test]
    fn test_fee_split_two_percent() {
        let (fee, publisher) = fee_split(U256::from(100_000u64), 2.0);
        assert_eq!(fee, U256::from(2_000u64));
        assert_eq!(publisher, U256::from(98_000u64));
    }

    #[test]
    fn test_fee_split_truncates() {
        // 2% of 99 is 1.98; integer division keeps the remainder with the publisher
        let (fee, publisher) = fee_split(U256::from(99u64), 2.0);
        assert_eq!(fee, U256::from(1u64));
        assert_eq!(publisher, U256::from(98u64));
    }

    #[tokio::test]
    async fn test_happy_path_mints_receipt() {
        let state = test_state();
        let body = signed_request(|_| {});
        let wallet = Wallet::new(TEST_KEY).unwrap();

        let response = process_payment(&state, &body).await.unwrap();
        assert!(response.tx_hash.as_deref().unwrap().starts_with("0x"));

        let receipt = ReceiptVerifier::Hs256("test-secret".to_string())
            .verify(&response.receipt, Some("article-1"))
            .unwrap();
        assert_eq!(receipt.payer, wallet.address());
        assert_eq!(receipt.payee, PAYEE.to_lowercase());
        assert_eq!(receipt.amount, "98000");
        assert_eq!(receipt.chain_id, 8453);
        assert_eq!(receipt.currency, "USDC");
        assert!(receipt.expires_at > receipt.paid_at);
    }

    #[tokio::test]
    async fn test_tampered_recipient_rejected() {
        let state = test_state();
        let body = signed_request(|body| {
            body["payload"]["authorization"]["to"] =
                json!("0x0000000000000000000000000000000000000001");
        });

        let error = process_payment(&state, &body).await.unwrap_err();
        assert_eq!(error.status_code(), 400);
        assert!(error.to_string().contains("Signature mismatch"));
    }

    #[tokio::test]
    async fn test_expired_window_rejected() {
        let now = chrono::Utc::now().timestamp() as u64;
        let wallet = Wallet::new(TEST_KEY).unwrap();
        let authorization = TransferAuthorization {
            from: wallet.address(),
            to: PAYEE.to_string(),
            value: "100000".to_string(),
            valid_after: 0,
            valid_before: now - 100,
            nonce: format!("0x{}", "cd".repeat(32)),
        };
        let signed = wallet
            .sign_authorization(authorization, Network::BaseMainnet)
            .unwrap();
        let body = json!({
            "x402Version": 1,
            "scheme": "exact",
            "network": "eip155:8453",
            "resource": "article-1",
            "payload": {"signature": signed.signature, "authorization": signed.authorization},
        });

        let error = process_payment(&test_state(), &body).await.unwrap_err();
        assert_eq!(error.status_code(), 400);
        assert!(error.to_string().to_lowercase().contains("expired"));
    }

    #[tokio::test]
    async fn test_future_window_rejected() {
        let now = chrono::Utc::now().timestamp() as u64;
        let wallet = Wallet::new(TEST_KEY).unwrap();
        let authorization = TransferAuthorization {
            from: wallet.address(),
            to: PAYEE.to_string(),
            value: "100000".to_string(),
            valid_after: now + 1000,
            valid_before: now + 2000,
            nonce: format!("0x{}", "cd".repeat(32)),
        };
        let signed = wallet
            .sign_authorization(authorization, Network::BaseSepolia)
            .unwrap();
        let body = json!({
            "x402Version": 1,
            "scheme": "exact",
            "network": "eip155:84532",
            "resource": "article-1",
            "payload": {"signature": signed.signature, "authorization": signed.authorization},
        });

        let error = process_payment(&test_state(), &body).await.unwrap_err();
        assert!(error.to_string().contains("not yet valid"));
    }

    #[tokio::test]
    async fn test_unsupported_network_rejected() {
        let body = signed_request(|body| {
            body["network"] = json!("eip155:1");
        });
        let error = process_payment(&test_state(), &body).await.unwrap_err();
        assert_eq!(error.status_code(), 400);
        assert_eq!(error.to_string(), "Unsupported network: eip155:1");
    }

    #[tokio::test]
    async fn test_shape_validation_names_field() {
        let state = test_state();

        let error = process_payment(&state, &signed_request(|b| b["x402Version"] = json!(2)))
            .await
            .unwrap_err();
        assert!(error.to_string().contains("x402Version"));

        let error = process_payment(&state, &signed_request(|b| b["scheme"] = json!("stream")))
            .await
            .unwrap_err();
        assert!(error.to_string().contains("scheme"));

        let error = process_payment(
            &state,
            &signed_request(|b| {
                b["payload"]["signature"] = json!("deadbeef");
            }),
        )
        .await
        .unwrap_err();
        assert!(error.to_string().contains("signature"));

        let error = process_payment(
            &state,
            &signed_request(|b| {
                b["payload"]["authorization"]
                    .as_object_mut()
                    .unwrap()
                    .remove("nonce");
            }),
        )
        .await
        .unwrap_err();
        assert!(error.to_string().contains("nonce"));
    }

    #[tokio::test]
    async fn test_mock_executor_is_deterministic() {
        let authorization = TransferAuthorization {
            from: PAYEE.to_string(),
            to: PAYEE.to_string(),
            value: "1".to_string(),
            valid_after: 0,
            valid_before: 1,
            nonce: format!("0x{}", "ab".repeat(32)),
        };
        let a = MockTransferExecutor
            .execute(&authorization, "0x", 8453)
            .await
            .unwrap();
        let b = MockTransferExecutor
            .execute(&authorization, "0x", 8453)
            .await
            .unwrap();
        assert_eq!(a.tx_hash, b.tx_hash);
        assert!(a.success);
    }

    #[tokio::test]
    async fn test_failing_executor_maps_to_500() {
        struct FailingExecutor;
        #[async_trait]
        impl TransferExecutor for FailingExecutor {
            async fn execute(
                &self,
                _authorization: &TransferAuthorization,
                _signature: &str,
                _chain_id: u64,
            ) -> Result<TransferOutcome> {
                Err(X402Error::transfer_failed("Transfer execution failed"))
            }
        }

        let state = test_state().with_executor(Arc::new(FailingExecutor));
        let error = process_payment(&state, &signed_request(|_| {})).await.unwrap_err();
        assert_eq!(error.status_code(), 500);
        assert!(error.to_string().contains("Transfer execution failed"));
    }

    #[test]
    fn test_config_validation() {
        assert!(FacilitatorConfig::new("s").validate().is_ok());
        assert!(FacilitatorConfig::new("").validate().is_err());
        assert!(FacilitatorConfig::new("s")
            .with_fee_percent(51.0)
            .validate()
            .is_err());
        assert!(FacilitatorConfig::new("s")
            .with_fee_percent(-1.0)
            .validate()
            .is_err());

        let mut on_chain = FacilitatorConfig::new("s");
        on_chain.mock_transfers = false;
        assert!(on_chain.validate().is_err());
        on_chain.private_key = Some(TEST_KEY.to_string());
        on_chain.rpc_url = Some("https://mainnet.base.org".to_string());
        assert!(on_chain.validate().is_ok());
    }

    #[tokio::test]
    async fn test_router_settles_over_http() {
        use axum::body::Body;
        use tower::ServiceExt;

        let app = router(test_state());
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/facilitator")
            .header("content-type", "application/json")
            .body(Body::from(signed_request(|_| {}).to_string()))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["receipt"].as_str().unwrap().contains('.'));
        assert!(body["txHash"].as_str().unwrap().starts_with("0x"));
    }

    #[tokio::test]
    async fn test_router_maps_rejection_to_error_body() {
        use axum::body::Body;
        use tower::ServiceExt;

        let app = router(test_state());
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(
                signed_request(|b| b["network"] = json!("eip155:1")).to_string(),
            ))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Unsupported network: eip155:1");
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        use axum::body::Body;
        use tower::ServiceExt;

        let app = router(test_state());
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["mockMode"], true);
    }

    #[tokio::test]
    async fn test_on_chain_executor_is_stubbed() {
        let executor = OnChainTransferExecutor::new(TEST_KEY, "https://mainnet.base.org");
        let authorization = TransferAuthorization {
            from: PAYEE.to_string(),
            to: PAYEE.to_string(),
            value: "1".to_string(),
            valid_after: 0,
            valid_before: 1,
            nonce: format!("0x{}", "ab".repeat(32)),
        };
        let error = executor.execute(&authorization, "0x", 8453).await.unwrap_err();
        assert_eq!(error.code(), "RPC_ERROR");
    }
}
