//! Error types for the x402 gateway

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, X402Error>;

/// Main error type for gateway operations
#[derive(Error, Debug)]
pub enum X402Error {
    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Base64 encoding/decoding error
    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed facilitator payload
    #[error("Invalid payload: {message}")]
    InvalidPayload { message: String },

    /// Malformed authorization parameters
    #[error("Invalid authorization: {message}")]
    InvalidAuthorization { message: String },

    /// Recovered signer does not match the claimed payer
    #[error("Signature mismatch: recovered {recovered}, expected {expected}")]
    SignatureMismatch { recovered: String, expected: String },

    /// Network not in the registry
    #[error("Unsupported network: {network}")]
    NetworkNotSupported { network: String },

    /// Authorization window has closed
    #[error("Authorization expired")]
    AuthorizationExpired,

    /// Authorization window has not opened yet
    #[error("Authorization not yet valid")]
    AuthorizationNotYetValid,

    /// Transfer executor failure
    #[error("Transfer execution failed: {message}")]
    TransferFailed { message: String },

    /// Payment could not be completed
    #[error("Payment failed: {message}")]
    PaymentFailed { message: String },

    /// Facilitator returned an error or was unreachable
    #[error("Facilitator error: {message}")]
    Facilitator { message: String },

    /// Payer lacks funds for the transfer
    #[error("Insufficient funds")]
    InsufficientFunds,

    /// Local signing failure
    #[error("Signing failed: {message}")]
    SigningFailed { message: String },

    /// 402 response could not be parsed into payment parameters
    #[error("Invalid 402 response: {message}")]
    Invalid402 { message: String },

    /// Cumulative spending cap would be breached
    #[error("Budget exceeded: {message}")]
    BudgetExceeded { message: String },

    /// Single payment exceeds the per-request limit
    #[error("Per-request limit exceeded: {message}")]
    PerRequestLimit { message: String },

    /// Payment target domain is not on the allow-list
    #[error("Domain not allowed: {domain}")]
    DomainNotAllowed { domain: String },

    /// Receipt expired
    #[error("Receipt expired")]
    ReceiptExpired,

    /// Receipt failed verification
    #[error("Invalid receipt: {message}")]
    ReceiptInvalid { message: String },

    /// No receipt present in the request
    #[error("Receipt missing")]
    ReceiptMissing,

    /// Upstream RPC failure
    #[error("RPC error: {message}")]
    Rpc { message: String },

    /// Request timed out
    #[error("Request timeout")]
    Timeout,

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Price could not be parsed or is out of range
    #[error("Invalid price: {message}")]
    Price { message: String },
}

impl X402Error {
    /// Create an invalid payload error
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            message: message.into(),
        }
    }

    /// Create an invalid authorization error
    pub fn invalid_authorization(message: impl Into<String>) -> Self {
        Self::InvalidAuthorization {
            message: message.into(),
        }
    }

    /// Create a transfer execution error
    pub fn transfer_failed(message: impl Into<String>) -> Self {
        Self::TransferFailed {
            message: message.into(),
        }
    }

    /// Create a payment failure error
    pub fn payment_failed(message: impl Into<String>) -> Self {
        Self::PaymentFailed {
            message: message.into(),
        }
    }

    /// Create a facilitator error
    pub fn facilitator(message: impl Into<String>) -> Self {
        Self::Facilitator {
            message: message.into(),
        }
    }

    /// Create a signing error
    pub fn signing_failed(message: impl Into<String>) -> Self {
        Self::SigningFailed {
            message: message.into(),
        }
    }

    /// Create an invalid 402 response error
    pub fn invalid_402(message: impl Into<String>) -> Self {
        Self::Invalid402 {
            message: message.into(),
        }
    }

    /// Create a receipt verification error
    pub fn receipt_invalid(message: impl Into<String>) -> Self {
        Self::ReceiptInvalid {
            message: message.into(),
        }
    }

    /// Create an RPC error
    pub fn rpc(message: impl Into<String>) -> Self {
        Self::Rpc {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a price error
    pub fn price(message: impl Into<String>) -> Self {
        Self::Price {
            message: message.into(),
        }
    }

    /// Stable programmatic error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPayload { .. }
            | Self::InvalidAuthorization { .. }
            | Self::SignatureMismatch { .. }
            | Self::AuthorizationExpired
            | Self::AuthorizationNotYetValid
            | Self::TransferFailed { .. }
            | Self::PaymentFailed { .. } => "PAYMENT_FAILED",
            Self::Facilitator { .. } => "FACILITATOR_ERROR",
            Self::InsufficientFunds => "INSUFFICIENT_FUNDS",
            Self::SigningFailed { .. } => "SIGNING_FAILED",
            Self::Invalid402 { .. } => "INVALID_402_RESPONSE",
            Self::BudgetExceeded { .. } => "BUDGET_EXCEEDED",
            Self::PerRequestLimit { .. } => "PER_REQUEST_LIMIT",
            Self::DomainNotAllowed { .. } => "DOMAIN_NOT_ALLOWED",
            Self::ReceiptExpired => "RECEIPT_EXPIRED",
            Self::ReceiptInvalid { .. } => "RECEIPT_INVALID",
            Self::ReceiptMissing => "RECEIPT_MISSING",
            Self::NetworkNotSupported { .. } => "PAYMENT_FAILED",
            Self::Network(_) => "NETWORK_ERROR",
            Self::Rpc { .. } => "RPC_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Price { .. } => "PRICE_INVALID",
            Self::Json(_) | Self::Base64(_) => "PAYMENT_FAILED",
            Self::Io(_) => "NETWORK_ERROR",
        }
    }

    /// HTTP status the facilitator maps this error to
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidPayload { .. }
            | Self::InvalidAuthorization { .. }
            | Self::SignatureMismatch { .. }
            | Self::NetworkNotSupported { .. }
            | Self::AuthorizationExpired
            | Self::AuthorizationNotYetValid
            | Self::Json(_)
            | Self::Base64(_)
            | Self::Price { .. } => 400,
            Self::ReceiptExpired | Self::ReceiptInvalid { .. } | Self::ReceiptMissing => 402,
            Self::Timeout => 408,
            _ => 500,
        }
    }

    /// Whether the agent client may retry the operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Facilitator { .. })
    }
}

/// Wire-format error body (`{"error": "..."}`)
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub error: String,
}

impl From<&X402Error> for ErrorResponse {
    fn from(error: &X402Error) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}
