//! 402 wire protocol: header names, response assembly, response parsing

use http::HeaderMap;
use serde_json::{json, Value};

use crate::price::parse_price;
use crate::types::{PaymentRequest, PublisherConfig, SCHEME_EXACT};
use crate::Result;

/// Recipient wallet address header
pub const HEADER_PAY_TO: &str = "X-402-PayTo";
/// Human-readable price header
pub const HEADER_PRICE: &str = "X-402-Price";
/// Currency symbol header
pub const HEADER_CURRENCY: &str = "X-402-Currency";
/// Network registry key header
pub const HEADER_NETWORK: &str = "X-402-Network";
/// Facilitator URL header
pub const HEADER_FACILITATOR: &str = "X-402-Facilitator";
/// Content identifier header
pub const HEADER_CONTENT_ID: &str = "X-402-Content-Id";
/// Optional resource description header
pub const HEADER_DESCRIPTION: &str = "X-402-Description";
/// Facilitator-originated data on protected responses
pub const HEADER_PAYMENT_RESPONSE: &str = "X-PAYMENT-RESPONSE";

/// A fully-assembled 402 response: status, ordered headers, JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequired {
    /// Always 402
    pub status: u16,
    /// Headers in emission order
    pub headers: Vec<(&'static str, String)>,
    /// JSON body duplicating the headers plus the `accepts` array
    pub body: Value,
}

/// Assemble the 402 response a resource server returns for `content_id`
pub fn payment_required(config: &PublisherConfig, content_id: &str) -> Result<PaymentRequired> {
    let smallest = parse_price(&config.price)?;
    let description = config
        .description
        .clone()
        .unwrap_or_else(|| "Payment required".to_string());

    let mut headers = vec![
        (HEADER_PAY_TO, config.pay_to.clone()),
        (HEADER_PRICE, config.price.clone()),
        (HEADER_CURRENCY, config.currency.clone()),
        (HEADER_NETWORK, config.network.key().to_string()),
        (HEADER_FACILITATOR, config.facilitator_url.clone()),
        (HEADER_CONTENT_ID, content_id.to_string()),
    ];
    if let Some(description) = &config.description {
        headers.push((HEADER_DESCRIPTION, description.clone()));
    }

    let body = json!({
        "payTo": config.pay_to,
        "price": config.price,
        "currency": config.currency,
        "contentId": content_id,
        "network": config.network.key(),
        "facilitatorUrl": config.facilitator_url,
        "description": description,
        "accepts": [{
            "scheme": SCHEME_EXACT,
            "network": config.network.caip2(),
            "maxAmountRequired": smallest,
            "resource": content_id,
            "description": description,
            "mimeType": "application/json",
            "payload": typed_data_skeleton(config, &smallest),
        }],
    });

    Ok(PaymentRequired {
        status: 402,
        headers,
        body,
    })
}

/// EIP-712 typed-data skeleton the client completes and signs.
/// `from`, `validAfter`, `validBefore`, and `nonce` stay unfilled.
fn typed_data_skeleton(config: &PublisherConfig, smallest: &str) -> Value {
    json!({
        "types": {
            "EIP712Domain": [
                {"name": "name", "type": "string"},
                {"name": "version", "type": "string"},
                {"name": "chainId", "type": "uint256"},
                {"name": "verifyingContract", "type": "address"},
            ],
            "TransferWithAuthorization": [
                {"name": "from", "type": "address"},
                {"name": "to", "type": "address"},
                {"name": "value", "type": "uint256"},
                {"name": "validAfter", "type": "uint256"},
                {"name": "validBefore", "type": "uint256"},
                {"name": "nonce", "type": "bytes32"},
            ],
        },
        "primaryType": "TransferWithAuthorization",
        "domain": {
            "name": config.network.usdc_name(),
            "version": "2",
            "chainId": config.network.chain_id(),
            "verifyingContract": config.network.usdc_address(),
        },
        "message": {
            "from": Value::Null,
            "to": config.pay_to,
            "value": smallest,
            "validAfter": Value::Null,
            "validBefore": Value::Null,
            "nonce": Value::Null,
        },
    })
}

/// Parse a 402 response into payment parameters.
///
/// Each field is read from the JSON body first, falling back to the
/// `X-402-*` headers. Returns `None` when any of `payTo`, `price`,
/// `contentId`, or `network` cannot be found.
pub fn parse_payment_request(body: Option<&Value>, headers: &HeaderMap) -> Option<PaymentRequest> {
    let field = |key: &str, header: &str| -> Option<String> {
        body.and_then(|b| b.get(key))
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                headers
                    .get(header)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.to_string())
            })
    };

    Some(PaymentRequest {
        pay_to: field("payTo", HEADER_PAY_TO)?,
        price: field("price", HEADER_PRICE)?,
        currency: field("currency", HEADER_CURRENCY).unwrap_or_else(|| "USDC".to_string()),
        content_id: field("contentId", HEADER_CONTENT_ID)?,
        network: field("network", HEADER_NETWORK)?,
        facilitator_url: field("facilitatorUrl", HEADER_FACILITATOR).unwrap_or_default(),
        description: field("description", HEADER_DESCRIPTION),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Network;
    use http::HeaderValue;

    fn publisher() -> PublisherConfig {
        PublisherConfig::new(
            "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
            "0.01",
            Network::BaseMainnet,
            "http://localhost:4020",
        )
    }

    #[test]
    fn test_assembled_headers_and_body() {
        let response = payment_required(&publisher(), "article-1").unwrap();
        assert_eq!(response.status, 402);

        let headers: std::collections::HashMap<_, _> =
            response.headers.iter().cloned().collect();
        assert_eq!(headers[HEADER_PRICE], "0.01");
        assert_eq!(headers[HEADER_NETWORK], "base-mainnet");
        assert_eq!(headers[HEADER_CONTENT_ID], "article-1");
        assert!(!headers.contains_key(HEADER_DESCRIPTION));

        assert_eq!(response.body["payTo"], "0x209693Bc6afc0C5328bA36FaF03C514EF312287C");
        let accepts = &response.body["accepts"][0];
        assert_eq!(accepts["scheme"], "exact");
        assert_eq!(accepts["network"], "eip155:8453");
        assert_eq!(accepts["maxAmountRequired"], "10000");
        assert_eq!(accepts["mimeType"], "application/json");
    }

    #[test]
    fn test_description_header_when_configured() {
        let config = publisher().with_description("Premium article");
        let response = payment_required(&config, "article-1").unwrap();
        let headers: std::collections::HashMap<_, _> =
            response.headers.iter().cloned().collect();
        assert_eq!(headers[HEADER_DESCRIPTION], "Premium article");
        assert_eq!(response.body["description"], "Premium article");
    }

    #[test]
    fn test_skeleton_leaves_client_fields_unfilled() {
        let response = payment_required(&publisher(), "article-1").unwrap();
        let message = &response.body["accepts"][0]["payload"]["message"];
        assert!(message["from"].is_null());
        assert!(message["validAfter"].is_null());
        assert!(message["validBefore"].is_null());
        assert!(message["nonce"].is_null());
        assert_eq!(message["to"], "0x209693Bc6afc0C5328bA36FaF03C514EF312287C");
        assert_eq!(message["value"], "10000");

        let domain = &response.body["accepts"][0]["payload"]["domain"];
        assert_eq!(domain["name"], "USD Coin");
        assert_eq!(domain["chainId"], 8453);
    }

    #[test]
    fn test_assembly_is_idempotent() {
        let a = payment_required(&publisher(), "article-1").unwrap();
        let b = payment_required(&publisher(), "article-1").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_prefers_body() {
        let body = json!({
            "payTo": "0xaa",
            "price": "0.05",
            "currency": "USDC",
            "contentId": "from-body",
            "network": "base-mainnet",
            "facilitatorUrl": "http://fac.example",
        });
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_CONTENT_ID, HeaderValue::from_static("from-header"));

        let parsed = parse_payment_request(Some(&body), &headers).unwrap();
        assert_eq!(parsed.content_id, "from-body");
        assert_eq!(parsed.price, "0.05");
    }

    #[test]
    fn test_parse_falls_back_to_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_PAY_TO, HeaderValue::from_static("0xaa"));
        headers.insert(HEADER_PRICE, HeaderValue::from_static("0.01"));
        headers.insert(HEADER_CURRENCY, HeaderValue::from_static("USDC"));
        headers.insert(HEADER_NETWORK, HeaderValue::from_static("base-sepolia"));
        headers.insert(HEADER_CONTENT_ID, HeaderValue::from_static("article-1"));
        headers.insert(
            HEADER_FACILITATOR,
            HeaderValue::from_static("http://fac.example"),
        );

        let parsed = parse_payment_request(None, &headers).unwrap();
        assert_eq!(parsed.pay_to, "0xaa");
        assert_eq!(parsed.network, "base-sepolia");
        assert_eq!(parsed.facilitator_url, "http://fac.example");
    }

    #[test]
    fn test_parse_rejects_incomplete_responses() {
        // price present, payTo missing
        let body = json!({"price": "0.01", "contentId": "x", "network": "base-mainnet"});
        assert!(parse_payment_request(Some(&body), &HeaderMap::new()).is_none());

        let empty = json!({});
        assert!(parse_payment_request(Some(&empty), &HeaderMap::new()).is_none());
    }

    #[test]
    fn test_round_trip_through_parser() {
        let config = publisher().with_description("Premium");
        let assembled = payment_required(&config, "article-1").unwrap();
        let parsed =
            parse_payment_request(Some(&assembled.body), &HeaderMap::new()).unwrap();
        assert_eq!(parsed.pay_to, config.pay_to);
        assert_eq!(parsed.price, config.price);
        assert_eq!(parsed.content_id, "article-1");
        assert_eq!(parsed.network, "base-mainnet");
        assert_eq!(parsed.facilitator_url, config.facilitator_url);
    }
}
