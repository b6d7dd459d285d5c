//! Facilitator HTTP entrypoint.
//!
//! Launches the axum-based facilitator server that validates signed
//! EIP-3009 authorizations, executes transfers, and mints signed receipts.
//!
//! Endpoints:
//! - `POST /` and `POST /facilitator` - settle a payment, answer with a receipt
//! - `GET /` and `GET /health` - liveness and mock-mode status
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `PORT`, `JWT_SECRET`, `FEE_PERCENT`, `FACILITATOR_URL`,
//!   `MOCK_TRANSFERS`, `FACILITATOR_PRIVATE_KEY`, `RPC_URL`,
//!   `RECEIPT_TTL_SECS`

use dotenvy::dotenv;
use tracing_subscriber::EnvFilter;

use x402_gateway::facilitator::{serve, FacilitatorConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = FacilitatorConfig::from_env()?;
    serve(config).await?;
    Ok(())
}
