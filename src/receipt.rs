//! Signed payment receipts
//!
//! Receipts travel as compact JWTs: the receipt fields as claims plus
//! standard `sub`/`iat`/`exp`, HMAC-SHA256 signed with the facilitator
//! secret. Resource servers holding only the facilitator's public key can
//! verify ECDSA P-256 tokens instead; decoding without verification is
//! supported for display purposes only.

use base64::{engine::general_purpose, Engine as _};
use http::HeaderMap;
use jsonwebtoken::{
    decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::DecodePublicKey;
use serde::{Deserialize, Serialize};

use crate::types::Receipt;
use crate::{Result, X402Error};

/// Header carrying a receipt on paid requests
pub const RECEIPT_HEADER: &str = "X-402-Receipt";
/// Legacy x402 payment header, also accepted for receipts
pub const PAYMENT_HEADER: &str = "X-PAYMENT";
/// `Authorization` scheme prefix for receipt bearer tokens
pub const AUTHORIZATION_SCHEME: &str = "X402 ";

/// JWT claims wrapping a receipt
#[derive(Debug, Serialize, Deserialize)]
struct ReceiptClaims {
    #[serde(flatten)]
    receipt: Receipt,
    sub: String,
    iat: u64,
    exp: u64,
}

/// Sign a receipt with the facilitator's HMAC secret
pub fn sign_receipt(receipt: &Receipt, secret: &str) -> Result<String> {
    let claims = ReceiptClaims {
        sub: receipt.payer.clone(),
        iat: receipt.paid_at,
        exp: receipt.expires_at,
        receipt: receipt.clone(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| X402Error::receipt_invalid(format!("receipt signing failed: {e}")))
}

/// Verification modes for inbound receipt tokens
#[derive(Clone)]
pub enum ReceiptVerifier {
    /// HMAC-SHA256 with a shared secret
    Hs256(String),
    /// ECDSA P-256 against a base64-encoded SPKI public key
    Es256Spki(String),
    /// Decode without signature verification; display-only, never use the
    /// result for authorization decisions
    Unverified,
}

impl std::fmt::Debug for ReceiptVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hs256(_) => f.write_str("ReceiptVerifier::Hs256(<secret>)"),
            Self::Es256Spki(_) => f.write_str("ReceiptVerifier::Es256Spki(..)"),
            Self::Unverified => f.write_str("ReceiptVerifier::Unverified"),
        }
    }
}

impl ReceiptVerifier {
    /// Verify a receipt token, enforcing expiry and (if given) the content id
    /// the caller expects the receipt to cover.
    pub fn verify(&self, token: &str, expected_content_id: Option<&str>) -> Result<Receipt> {
        let claims = match self {
            Self::Hs256(secret) => decode_claims(
                token,
                &DecodingKey::from_secret(secret.as_bytes()),
                validation(Algorithm::HS256),
            )?,
            Self::Es256Spki(spki_b64) => {
                let der = general_purpose::STANDARD
                    .decode(spki_b64)
                    .map_err(|_| X402Error::receipt_invalid("public key is not valid base64"))?;
                // the verifier takes the raw uncompressed point, not the SPKI envelope
                let public_key = p256::PublicKey::from_public_key_der(&der).map_err(|_| {
                    X402Error::receipt_invalid("public key is not SPKI-encoded P-256")
                })?;
                let point = public_key.to_encoded_point(false);
                decode_claims(
                    token,
                    &DecodingKey::from_ec_der(point.as_bytes()),
                    validation(Algorithm::ES256),
                )?
            }
            Self::Unverified => {
                let mut validation = validation(Algorithm::HS256);
                validation.insecure_disable_signature_validation();
                decode_claims(token, &DecodingKey::from_secret(&[]), validation)?
            }
        };

        let now = chrono::Utc::now().timestamp() as u64;
        if claims.exp <= now {
            return Err(X402Error::ReceiptExpired);
        }

        if let Some(expected) = expected_content_id {
            if claims.receipt.content_id != expected {
                return Err(X402Error::receipt_invalid(format!(
                    "receipt covers content '{}', expected '{}'",
                    claims.receipt.content_id, expected
                )));
            }
        }

        Ok(claims.receipt)
    }
}

fn validation(algorithm: Algorithm) -> Validation {
    let mut validation = Validation::new(algorithm);
    validation.leeway = 0;
    validation
}

fn decode_claims(
    token: &str,
    key: &DecodingKey,
    validation: Validation,
) -> Result<ReceiptClaims> {
    decode::<ReceiptClaims>(token, key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => X402Error::ReceiptExpired,
            jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                X402Error::receipt_invalid("signature mismatch")
            }
            _ => X402Error::receipt_invalid(e.to_string()),
        })
}

/// Extract a receipt token from inbound headers.
///
/// Checked in order: `X-402-Receipt`, `X-PAYMENT`, then `Authorization`
/// when it carries the `X402` scheme.
pub fn extract_receipt_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(RECEIPT_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(value.to_string());
    }
    if let Some(value) = headers.get(PAYMENT_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(value.to_string());
    }
    headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix(AUTHORIZATION_SCHEME))
        .map(|v| v.to_string())
}
