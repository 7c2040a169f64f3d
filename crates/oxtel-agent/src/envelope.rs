//! Request envelope: gzip body plus an optional HMAC-SHA256 signature of the
//! uncompressed payload.

use base64::Engine;
use flate2::write::GzEncoder;
use flate2::Compression;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::io::Write;

use crate::error::DeliveryError;

type HmacSha256 = Hmac<Sha256>;

pub const CONTENT_TYPE: &str = "application/json";
pub const CONTENT_ENCODING: &str = "gzip";
pub const ACCEPT_ENCODING: &str = "gzip";
/// Header carrying the base64 HMAC of the uncompressed body.
pub const HASH_HEADER: &str = "HashSHA256";

/// A batch ready for the network: compressed body and its signature.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub body: Vec<u8>,
    pub signature: Option<String>,
}

impl Envelope {
    /// Headers every delivery request must carry. The signature header is
    /// present only when signing is configured.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("Content-Type", CONTENT_TYPE.to_string()),
            ("Content-Encoding", CONTENT_ENCODING.to_string()),
            ("Accept-Encoding", ACCEPT_ENCODING.to_string()),
        ];
        if let Some(signature) = &self.signature {
            headers.push((HASH_HEADER, signature.clone()));
        }
        headers
    }
}

#[derive(Clone, Default)]
pub struct EnvelopeBuilder {
    key: Option<Vec<u8>>,
}

impl std::fmt::Debug for EnvelopeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeBuilder")
            .field("signing", &self.key.is_some())
            .finish()
    }
}

impl EnvelopeBuilder {
    /// An empty key is treated as no key.
    pub fn new(key: Option<&[u8]>) -> Self {
        Self {
            key: key.filter(|k| !k.is_empty()).map(<[u8]>::to_vec),
        }
    }

    /// Signs `payload` as-is, then compresses it.
    pub fn build(&self, payload: &[u8]) -> Result<Envelope, DeliveryError> {
        let signature = match &self.key {
            Some(key) => Some(sign(key, payload)?),
            None => None,
        };
        let body = compress(payload)?;
        Ok(Envelope { body, signature })
    }
}

pub fn compress(payload: &[u8]) -> Result<Vec<u8>, DeliveryError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(payload.len() / 2), Compression::default());
    encoder.write_all(payload).map_err(DeliveryError::Compress)?;
    encoder.finish().map_err(DeliveryError::Compress)
}

pub fn sign(key: &[u8], payload: &[u8]) -> Result<String, DeliveryError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| DeliveryError::Signing(e.to_string()))?;
    mac.update(payload);
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// Receiver-side check of a [`HASH_HEADER`] value against the decompressed
/// body. Without a key every payload is accepted.
pub fn verify_signature(key: Option<&[u8]>, payload: &[u8], signature: &str) -> bool {
    let Some(key) = key.filter(|k| !k.is_empty()) else {
        return true;
    };
    let Ok(expected) = base64::engine::general_purpose::STANDARD.decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}
