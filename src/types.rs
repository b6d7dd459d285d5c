//! Core types for the x402 gateway protocol

use ethereum_types::U256;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Result, X402Error};

/// x402 protocol version
pub const X402_VERSION: u32 = 1;

/// Payment scheme identifier for EIP-3009 exact-amount transfers
pub const SCHEME_EXACT: &str = "exact";

/// Stablecoin decimals; amounts in smallest units are `price * 10^6`
pub const STABLECOIN_DECIMALS: u32 = 6;

/// Supported chains. Each entry carries its chain id, CAIP-2 identifier,
/// and the stablecoin contract deployed on that chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    BaseMainnet,
    BaseSepolia,
}

impl Network {
    /// Registry key used in configuration and `X-402-Network` headers
    pub fn key(&self) -> &'static str {
        match self {
            Network::BaseMainnet => "base-mainnet",
            Network::BaseSepolia => "base-sepolia",
        }
    }

    /// CAIP-2 identifier (`eip155:<chainId>`)
    pub fn caip2(&self) -> &'static str {
        match self {
            Network::BaseMainnet => "eip155:8453",
            Network::BaseSepolia => "eip155:84532",
        }
    }

    /// Numeric chain id
    pub fn chain_id(&self) -> u64 {
        match self {
            Network::BaseMainnet => 8453,
            Network::BaseSepolia => 84532,
        }
    }

    /// Stablecoin contract address on this chain
    pub fn usdc_address(&self) -> &'static str {
        match self {
            Network::BaseMainnet => "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
            Network::BaseSepolia => "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
        }
    }

    /// EIP-712 domain name of the stablecoin contract
    pub fn usdc_name(&self) -> &'static str {
        "USD Coin"
    }

    /// Look up a network by registry key (e.g. `base-mainnet`)
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "base-mainnet" => Some(Network::BaseMainnet),
            "base-sepolia" => Some(Network::BaseSepolia),
            _ => None,
        }
    }

    /// Look up a network by CAIP-2 identifier (e.g. `eip155:8453`)
    pub fn from_caip2(caip2: &str) -> Option<Self> {
        match caip2 {
            "eip155:8453" => Some(Network::BaseMainnet),
            "eip155:84532" => Some(Network::BaseSepolia),
            _ => None,
        }
    }

    /// All supported networks
    pub fn all() -> &'static [Network] {
        &[Network::BaseMainnet, Network::BaseSepolia]
    }
}

/// EIP-3009 `TransferWithAuthorization` parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferAuthorization {
    /// Payer's wallet address
    pub from: String,
    /// Recipient's wallet address
    pub to: String,
    /// Payment amount in smallest units, as a decimal string
    pub value: String,
    /// Unix timestamp when the authorization becomes valid
    #[serde(rename = "validAfter")]
    pub valid_after: u64,
    /// Unix timestamp when the authorization expires
    #[serde(rename = "validBefore")]
    pub valid_before: u64,
    /// 32 random bytes, hex-encoded with `0x` prefix
    pub nonce: String,
}

impl TransferAuthorization {
    /// Parse `value` as a 256-bit unsigned integer
    pub fn value_u256(&self) -> Result<U256> {
        U256::from_dec_str(&self.value)
            .map_err(|_| X402Error::invalid_authorization("value is not a valid uint256"))
    }

    /// Decode the nonce into its 32 raw bytes
    pub fn nonce_bytes(&self) -> Result<[u8; 32]> {
        let raw = hex::decode(self.nonce.trim_start_matches("0x"))
            .map_err(|_| X402Error::invalid_authorization("nonce is not valid hex"))?;
        raw.try_into()
            .map_err(|_| X402Error::invalid_authorization("nonce must be 32 bytes"))
    }

    /// Check the time window against `now` (unix seconds)
    pub fn validate_window(&self, now: u64) -> Result<()> {
        if self.valid_before <= now {
            return Err(X402Error::AuthorizationExpired);
        }
        if self.valid_after > now {
            return Err(X402Error::AuthorizationNotYetValid);
        }
        Ok(())
    }
}

/// Signature plus the authorization it covers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedAuthorization {
    /// 65-byte secp256k1 signature of the EIP-712 hash, hex with `0x` prefix
    pub signature: String,
    /// EIP-3009 authorization parameters
    pub authorization: TransferAuthorization,
}

/// Request body accepted by the facilitator endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilitatorPayload {
    /// Protocol version; must equal 1
    #[serde(rename = "x402Version")]
    pub x402_version: u32,
    /// Payment scheme; must equal `exact`
    pub scheme: String,
    /// CAIP-2 network identifier
    pub network: String,
    /// Signed authorization
    pub payload: SignedAuthorization,
    /// Opaque content identifier the payment is for
    pub resource: String,
}

/// Successful facilitator response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilitatorResponse {
    /// Signed receipt token
    pub receipt: String,
    /// Transaction hash realized by the transfer executor
    #[serde(rename = "txHash", skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

/// Proof of payment minted by the facilitator and presented to resource servers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Unique opaque identifier
    pub id: String,
    /// Content identifier the payment was for
    #[serde(rename = "contentId")]
    pub content_id: String,
    /// Payer address
    pub payer: String,
    /// Payee address
    pub payee: String,
    /// Publisher share after fee, in smallest units
    pub amount: String,
    /// Currency symbol (e.g. `USDC`)
    pub currency: String,
    /// Chain the transfer settled on
    #[serde(rename = "chainId")]
    pub chain_id: u64,
    /// Settlement transaction hash
    #[serde(rename = "txHash")]
    pub tx_hash: String,
    /// Unix timestamp of payment
    #[serde(rename = "paidAt")]
    pub paid_at: u64,
    /// Unix timestamp after which the receipt is no longer valid
    #[serde(rename = "expiresAt")]
    pub expires_at: u64,
    /// URL of the issuing facilitator
    pub facilitator: String,
}

/// Payment parameters announced by a resource server alongside a 402
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Recipient wallet address
    #[serde(rename = "payTo")]
    pub pay_to: String,
    /// Human-readable price (e.g. `0.01`)
    pub price: String,
    /// Currency symbol
    pub currency: String,
    /// Content identifier of the protected resource
    #[serde(rename = "contentId")]
    pub content_id: String,
    /// Network registry key (e.g. `base-mainnet`)
    pub network: String,
    /// Facilitator the client should submit payment to
    #[serde(rename = "facilitatorUrl")]
    pub facilitator_url: String,
    /// Optional human-readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PaymentRequest {
    /// Resolve the registry network for this request
    pub fn resolved_network(&self) -> Result<Network> {
        Network::from_key(&self.network)
            .or_else(|| Network::from_caip2(&self.network))
            .ok_or_else(|| X402Error::NetworkNotSupported {
                network: self.network.clone(),
            })
    }
}

/// One entry of a 402 response's `accepts` array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptEntry {
    /// Payment scheme identifier
    pub scheme: String,
    /// CAIP-2 network identifier
    pub network: String,
    /// Required amount in smallest units
    #[serde(rename = "maxAmountRequired")]
    pub max_amount_required: String,
    /// Content identifier of the resource
    pub resource: String,
    /// Human-readable description
    pub description: String,
    /// MIME type of the protected response
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    /// EIP-712 typed-data skeleton for the client to complete and sign
    pub payload: Value,
}

/// Publisher-side configuration used to assemble 402 responses
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Recipient wallet address
    pub pay_to: String,
    /// Human-readable price per request
    pub price: String,
    /// Currency symbol
    pub currency: String,
    /// Settlement network
    pub network: Network,
    /// Facilitator URL announced to clients
    pub facilitator_url: String,
    /// Optional description of the resource
    pub description: Option<String>,
}

impl PublisherConfig {
    /// Create a publisher config with the `USDC` currency default
    pub fn new(
        pay_to: impl Into<String>,
        price: impl Into<String>,
        network: Network,
        facilitator_url: impl Into<String>,
    ) -> Self {
        Self {
            pay_to: pay_to.into(),
            price: price.into(),
            currency: "USDC".to_string(),
            network,
            facilitator_url: facilitator_url.into(),
            description: None,
        }
    }

    /// Set the resource description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the currency symbol
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }
}

/// Client-side record of a completed payment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Content identifier paid for
    #[serde(rename = "contentId")]
    pub content_id: String,
    /// Amount spent in smallest units
    pub amount: String,
    /// Domain the payment was made to
    pub domain: Option<String>,
    /// Unix timestamp of the payment
    pub timestamp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_registry() {
        assert_eq!(Network::BaseMainnet.chain_id(), 8453);
        assert_eq!(Network::BaseSepolia.chain_id(), 84532);
        assert_eq!(Network::BaseMainnet.caip2(), "eip155:8453");
        assert_eq!(
            Network::BaseMainnet.usdc_address(),
            "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"
        );
        assert_eq!(
            Network::BaseSepolia.usdc_address(),
            "0x036CbD53842c5426634e7929541eC2318f3dCF7e"
        );

        assert_eq!(Network::from_key("base-mainnet"), Some(Network::BaseMainnet));
        assert_eq!(Network::from_caip2("eip155:84532"), Some(Network::BaseSepolia));
        assert_eq!(Network::from_key("solana-mainnet"), None);
        assert_eq!(Network::from_caip2("eip155:1"), None);
    }

    #[test]
    fn test_authorization_window() {
        let auth = TransferAuthorization {
            from: "0x857b06519E91e3A54538791bDbb0E22373e36b66".to_string(),
            to: "0x209693Bc6afc0C5328bA36FaF03C514EF312287C".to_string(),
            value: "1000000".to_string(),
            valid_after: 100,
            valid_before: 200,
            nonce: format!("0x{}", "ab".repeat(32)),
        };

        assert!(auth.validate_window(150).is_ok());
        assert!(matches!(
            auth.validate_window(200),
            Err(X402Error::AuthorizationExpired)
        ));
        assert!(matches!(
            auth.validate_window(50),
            Err(X402Error::AuthorizationNotYetValid)
        ));
    }

    #[test]
    fn test_authorization_value_and_nonce() {
        let auth = TransferAuthorization {
            from: "0x857b06519E91e3A54538791bDbb0E22373e36b66".to_string(),
            to: "0x209693Bc6afc0C5328bA36FaF03C514EF312287C".to_string(),
            value: "100000".to_string(),
            valid_after: 0,
            valid_before: 9_999_999_999,
            nonce: format!("0x{}", "ab".repeat(32)),
        };

        assert_eq!(auth.value_u256().unwrap(), U256::from(100_000u64));
        assert_eq!(auth.nonce_bytes().unwrap(), [0xabu8; 32]);

        let bad = TransferAuthorization {
            nonce: "0x1234".to_string(),
            ..auth
        };
        assert!(bad.nonce_bytes().is_err());
    }

    #[test]
    fn test_facilitator_payload_wire_format() {
        let json = serde_json::json!({
            "x402Version": 1,
            "scheme": "exact",
            "network": "eip155:8453",
            "resource": "article-1",
            "payload": {
                "signature": format!("0x{}", "11".repeat(65)),
                "authorization": {
                    "from": "0x857b06519E91e3A54538791bDbb0E22373e36b66",
                    "to": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
                    "value": "100000",
                    "validAfter": 0,
                    "validBefore": 9_999_999_999u64,
                    "nonce": format!("0x{}", "ab".repeat(32)),
                }
            }
        });

        let payload: FacilitatorPayload = serde_json::from_value(json).unwrap();
        assert_eq!(payload.x402_version, X402_VERSION);
        assert_eq!(payload.scheme, SCHEME_EXACT);
        assert_eq!(payload.payload.authorization.value, "100000");
        assert_eq!(payload.resource, "article-1");

        let round = serde_json::to_value(&payload).unwrap();
        assert_eq!(round["payload"]["authorization"]["validAfter"], 0);
        assert_eq!(round["x402Version"], 1);
    }

    #[test]
    fn test_receipt_wire_format() {
        let receipt = Receipt {
            id: "r-1".to_string(),
            content_id: "article-1".to_string(),
            payer: "0x857b06519E91e3A54538791bDbb0E22373e36b66".to_string(),
            payee: "0x209693Bc6afc0C5328bA36FaF03C514EF312287C".to_string(),
            amount: "98000".to_string(),
            currency: "USDC".to_string(),
            chain_id: 8453,
            tx_hash: format!("0x{}", "cd".repeat(32)),
            paid_at: 1_700_000_000,
            expires_at: 1_700_086_400,
            facilitator: "https://facilitator.example".to_string(),
        };

        let json = serde_json::to_value(&receipt).unwrap();
        assert_eq!(json["contentId"], "article-1");
        assert_eq!(json["chainId"], 8453);
        assert_eq!(json["txHash"], receipt.tx_hash);
        assert_eq!(json["paidAt"], 1_700_000_000u64);
    }
}
