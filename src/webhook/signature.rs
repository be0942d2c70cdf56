//! # Delivery Signature Verification
//!
//! The platform signs each POST body with HMAC-SHA256 keyed by the app secret
//! and sends it as `X-Hub-Signature-256: sha256=<hex>`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Missing required signature header: X-Hub-Signature-256")]
    Missing,

    #[error("Invalid signature format: {0}")]
    InvalidFormat(&'static str),

    #[error("Signature verification failed")]
    Mismatch,
}

/// Checks `signature_header` against the HMAC of `body`.
pub fn verify_signature(body: &[u8], signature_header: &str, secret: &str) -> Result<(), SignatureError> {
    if signature_header.is_empty() {
        return Err(SignatureError::Missing);
    }

    let provided_hex = signature_header
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or(SignatureError::InvalidFormat("must start with 'sha256='"))?;

    let provided = hex::decode(provided_hex)
        .map_err(|_| SignatureError::InvalidFormat("contains invalid hex"))?;

    let expected = digest(body, secret)?;

    if expected.as_slice().ct_eq(&provided).into() {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

fn digest(body: &[u8], secret: &str) -> Result<Vec<u8>, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Mismatch)?;
    mac.update(body);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Produces the header value the platform would send for `body`.
pub fn sign(body: &[u8], secret: &str) -> Result<String, SignatureError> {
    Ok(format!("{}{}", SIGNATURE_PREFIX, hex::encode(digest(body, secret)?)))
}
