//! Cryptographic utilities: EIP-712 hashing and secp256k1 signatures

use sha3::{Digest, Keccak256};

use crate::{Result, X402Error};

/// Keccak-256 hash function
pub(crate) fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// EIP-712 typed-data hashing for EIP-3009 transfers
pub mod eip712 {
    use super::*;
    use crate::types::{Network, TransferAuthorization};
    use ethereum_types::{Address, H256, U256};
    use std::str::FromStr;

    /// Primary type encoding for `TransferWithAuthorization`
    pub const TRANSFER_WITH_AUTHORIZATION_TYPE: &str =
        "TransferWithAuthorization(address from,address to,uint256 value,uint256 validAfter,uint256 validBefore,bytes32 nonce)";

    const DOMAIN_TYPE: &str =
        "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

    /// EIP-712 domain separator parameters
    #[derive(Debug, Clone)]
    pub struct Domain {
        pub name: String,
        pub version: String,
        pub chain_id: u64,
        pub verifying_contract: Address,
    }

    /// Domain of the stablecoin contract on the given network
    pub fn stablecoin_domain(network: Network) -> Result<Domain> {
        let verifying_contract = Address::from_str(network.usdc_address())
            .map_err(|_| X402Error::config("registry holds an invalid token address"))?;
        Ok(Domain {
            name: network.usdc_name().to_string(),
            version: "2".to_string(),
            chain_id: network.chain_id(),
            verifying_contract,
        })
    }

    /// Signing digest for a `TransferWithAuthorization` under the given domain
    pub fn transfer_authorization_hash(
        domain: &Domain,
        authorization: &TransferAuthorization,
    ) -> Result<H256> {
        let from = parse_address(&authorization.from)?;
        let to = parse_address(&authorization.to)?;
        let value = authorization.value_u256()?;
        let nonce = authorization.nonce_bytes()?;

        let mut encoded = Vec::with_capacity(32 * 7);
        encoded.extend_from_slice(&keccak256(
            TRANSFER_WITH_AUTHORIZATION_TYPE.as_bytes(),
        ));
        encoded.extend_from_slice(&encode_address(from));
        encoded.extend_from_slice(&encode_address(to));
        encoded.extend_from_slice(&encode_uint(value));
        encoded.extend_from_slice(&encode_uint(U256::from(authorization.valid_after)));
        encoded.extend_from_slice(&encode_uint(U256::from(authorization.valid_before)));
        encoded.extend_from_slice(&nonce);
        let struct_hash = keccak256(&encoded);

        // hash(0x1901 || domainSeparator || structHash)
        let mut data = Vec::with_capacity(2 + 32 + 32);
        data.extend_from_slice(&[0x19, 0x01]);
        data.extend_from_slice(&domain_separator(domain));
        data.extend_from_slice(&struct_hash);
        Ok(H256::from_slice(&keccak256(&data)))
    }

    fn domain_separator(domain: &Domain) -> [u8; 32] {
        let mut data = Vec::with_capacity(32 * 5);
        data.extend_from_slice(&keccak256(DOMAIN_TYPE.as_bytes()));
        data.extend_from_slice(&keccak256(domain.name.as_bytes()));
        data.extend_from_slice(&keccak256(domain.version.as_bytes()));
        data.extend_from_slice(&encode_uint(U256::from(domain.chain_id)));
        data.extend_from_slice(&encode_address(domain.verifying_contract));
        keccak256(&data)
    }

    /// Left-pad an address to a 32-byte word
    fn encode_address(address: Address) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(address.as_bytes());
        word
    }

    /// Big-endian 32-byte word of a uint256
    fn encode_uint(value: U256) -> [u8; 32] {
        let mut word = [0u8; 32];
        value.to_big_endian(&mut word);
        word
    }

    /// Parse a `0x`-prefixed 20-byte address
    pub fn parse_address(address: &str) -> Result<Address> {
        Address::from_str(address)
            .map_err(|_| X402Error::invalid_authorization(format!("invalid address: {address}")))
    }
}

/// Signing, recovery, and nonce generation
pub mod signature {
    use super::*;
    use ethereum_types::{Address, H256};
    use k256::ecdsa::{RecoveryId, Signature as K256Signature, VerifyingKey};
    use k256::elliptic_curve::sec1::ToEncodedPoint;
    use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

    /// Generate a fresh EIP-3009 nonce: 32 CSPRNG bytes, `0x`-prefixed hex
    pub fn generate_nonce() -> String {
        use rand::RngCore;
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        format!("0x{}", hex::encode(bytes))
    }

    /// Sign a 32-byte digest, returning the 65-byte `r || s || v` signature
    /// with `v` in Ethereum convention (27/28)
    pub fn sign_digest(digest: H256, private_key: &str) -> Result<String> {
        let secret = parse_private_key(private_key)?;
        let message = Message::from_digest_slice(digest.as_bytes())
            .map_err(|_| X402Error::signing_failed("digest must be 32 bytes"))?;

        let secp = Secp256k1::new();
        let recoverable = secp.sign_ecdsa_recoverable(&message, &secret);
        let (recovery_id, compact) = recoverable.serialize_compact();

        let mut signature = [0u8; 65];
        signature[..64].copy_from_slice(&compact);
        signature[64] = 27 + recovery_id.to_i32() as u8;
        Ok(format!("0x{}", hex::encode(signature)))
    }

    /// Recover the signer address of a 65-byte signature over `digest`
    pub fn recover_signer(digest: H256, signature: &str) -> Result<Address> {
        let bytes = hex::decode(signature.trim_start_matches("0x"))
            .map_err(|_| X402Error::invalid_payload("signature is not valid hex"))?;
        if bytes.len() != 65 {
            return Err(X402Error::invalid_payload(format!(
                "signature must be 65 bytes, got {}",
                bytes.len()
            )));
        }

        let v = bytes[64];
        let recovery_byte = if v >= 27 { v - 27 } else { v };
        let recovery_id = RecoveryId::try_from(recovery_byte)
            .map_err(|_| X402Error::invalid_payload(format!("invalid recovery id: {v}")))?;
        let parsed = K256Signature::try_from(&bytes[..64])
            .map_err(|_| X402Error::invalid_payload("malformed signature"))?;

        let verifying_key =
            VerifyingKey::recover_from_prehash(digest.as_bytes(), &parsed, recovery_id)
                .map_err(|_| X402Error::invalid_payload("signature recovery failed"))?;
        address_from_uncompressed(verifying_key.to_encoded_point(false).as_bytes())
    }

    /// Derive the Ethereum address controlled by a private key
    pub fn address_from_private_key(private_key: &str) -> Result<Address> {
        let secret = parse_private_key(private_key)?;
        let secp = Secp256k1::new();
        let public = PublicKey::from_secret_key(&secp, &secret);
        address_from_uncompressed(&public.serialize_uncompressed())
    }

    /// Render an address as `0x`-prefixed lowercase hex
    pub fn format_address(address: Address) -> String {
        format!("0x{}", hex::encode(address.as_bytes()))
    }

    fn parse_private_key(private_key: &str) -> Result<SecretKey> {
        let raw = hex::decode(private_key.trim_start_matches("0x"))
            .map_err(|_| X402Error::signing_failed("private key is not valid hex"))?;
        SecretKey::from_slice(&raw)
            .map_err(|_| X402Error::signing_failed("invalid private key"))
    }

    fn address_from_uncompressed(public_key: &[u8]) -> Result<Address> {
        if public_key.len() != 65 {
            return Err(X402Error::signing_failed("invalid public key length"));
        }
        // Drop the 0x04 tag, hash the remaining 64 bytes, keep the last 20
        let hash = keccak256(&public_key[1..]);
        Ok(Address::from_slice(&hash[12..]))
    }
}

#[cfg(test)]
mod tests {
    use super::eip712::{stablecoin_domain, transfer_authorization_hash};
    use super::signature::*;
    use crate::types::{Network, TransferAuthorization};
    use ethereum_types::H256;

    const TEST_KEY: &str =
        "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn test_authorization() -> TransferAuthorization {
        TransferAuthorization {
            from: "0x857b06519E91e3A54538791bDbb0E22373e36b66".to_string(),
            to: "0x209693Bc6afc0C5328bA36FaF03C514EF312287C".to_string(),
            value: "100000".to_string(),
            valid_after: 0,
            valid_before: 9_999_999_999,
            nonce: format!("0x{}", "ab".repeat(32)),
        }
    }

    #[test]
    fn test_nonce_generation() {
        let a = generate_nonce();
        let b = generate_nonce();
        assert_ne!(a, b);
        assert!(a.starts_with("0x"));
        assert_eq!(a.len(), 2 + 64);
        assert!(hex::decode(&a[2..]).is_ok());
    }

    #[test]
    fn test_known_address_derivation() {
        // secret key 1 controls a well-known address
        let key = format!("0x{}{}", "00".repeat(31), "01");
        let address = address_from_private_key(&key).unwrap();
        assert_eq!(
            format_address(address),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn test_sign_recover_round_trip() {
        let signer = address_from_private_key(TEST_KEY).unwrap();
        let domain = stablecoin_domain(Network::BaseMainnet).unwrap();
        let digest = transfer_authorization_hash(&domain, &test_authorization()).unwrap();

        let signature = sign_digest(digest, TEST_KEY).unwrap();
        assert_eq!(signature.len(), 2 + 130);

        let recovered = recover_signer(digest, &signature).unwrap();
        assert_eq!(recovered, signer);
    }

    #[test]
    fn test_recovery_accepts_raw_recovery_id() {
        let domain = stablecoin_domain(Network::BaseSepolia).unwrap();
        let digest = transfer_authorization_hash(&domain, &test_authorization()).unwrap();
        let signature = sign_digest(digest, TEST_KEY).unwrap();

        // rewrite v from 27/28 to 0/1
        let mut bytes = hex::decode(&signature[2..]).unwrap();
        bytes[64] -= 27;
        let raw_v = format!("0x{}", hex::encode(&bytes));

        assert_eq!(
            recover_signer(digest, &raw_v).unwrap(),
            recover_signer(digest, &signature).unwrap()
        );
    }

    #[test]
    fn test_tampered_authorization_changes_signer() {
        let signer = address_from_private_key(TEST_KEY).unwrap();
        let domain = stablecoin_domain(Network::BaseMainnet).unwrap();
        let digest = transfer_authorization_hash(&domain, &test_authorization()).unwrap();
        let signature = sign_digest(digest, TEST_KEY).unwrap();

        let mut tampered = test_authorization();
        tampered.to = "0x0000000000000000000000000000000000000001".to_string();
        let tampered_digest = transfer_authorization_hash(&domain, &tampered).unwrap();

        let recovered = recover_signer(tampered_digest, &signature).unwrap();
        assert_ne!(recovered, signer);
    }

    #[test]
    fn test_domain_binds_chain() {
        let auth = test_authorization();
        let mainnet = stablecoin_domain(Network::BaseMainnet).unwrap();
        let sepolia = stablecoin_domain(Network::BaseSepolia).unwrap();
        assert_ne!(
            transfer_authorization_hash(&mainnet, &auth).unwrap(),
            transfer_authorization_hash(&sepolia, &auth).unwrap()
        );
    }

    #[test]
    fn test_recover_rejects_malformed_signatures() {
        let digest = H256::from_slice(&[7u8; 32]);
        assert!(recover_signer(digest, "0x1234").is_err());
        assert!(recover_signer(digest, "not-hex").is_err());
        let wrong_v = format!("0x{}63", "11".repeat(64));
        assert!(recover_signer(digest, &wrong_v).is_err());
    }
}
