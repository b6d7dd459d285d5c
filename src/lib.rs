//! # x402-gateway - HTTP 402 micropayments
//!
//! A Rust implementation of the x402 micropayment protocol: a facilitator
//! service that settles signed EIP-3009 authorizations and mints signed
//! receipts, an agent client that consumes 402-gated resources under a
//! spending policy, and a resource-server adapter that gates routes on
//! receipt verification.

pub mod budget;
pub mod cache;
pub mod client;
pub mod crypto;
pub mod error;
pub mod facilitator;
pub mod middleware;
pub mod price;
pub mod protocol;
pub mod receipt;
pub mod types;
pub mod wallet;

// Re-exports for convenience
pub use budget::{BudgetManager, SpendingPolicy};
pub use client::{pay_once, AgentClient, PaymentEvent, RetryConfig};
pub use error::{ErrorResponse, Result, X402Error};
pub use facilitator::{FacilitatorConfig, FacilitatorState, TransferExecutor};
pub use middleware::{payment_gate, PaidRequest, PaymentGate};
pub use receipt::ReceiptVerifier;
pub use types::*;
pub use wallet::Wallet;

/// Current version of the gateway library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
