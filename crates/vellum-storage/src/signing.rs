//! HMAC-signed URLs for backends without native presigning.
//!
//! Signature = base64url(HMAC-SHA256(secret, "{METHOD}\n{key}\n{expires}\n{content_type}")).
//! The method and expiry are bound into the signature, so a GET URL cannot be
//! replayed as a PUT and the expiry cannot be extended.

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::traits::{StorageError, StorageResult};

type HmacSha256 = Hmac<Sha256>;

pub const MIN_SECRET_LEN: usize = 32;

/// A request to check against a signature.
#[derive(Debug, Clone)]
pub struct SignedRequest<'a> {
    pub method: &'a str,
    pub storage_key: &'a str,
    pub expires: u64,
    pub content_type: Option<&'a str>,
    pub signature: &'a str,
}

#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner").finish_non_exhaustive()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl UrlSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> StorageResult<Self> {
        let secret = secret.into();
        if secret.len() < MIN_SECRET_LEN {
            return Err(StorageError::ConfigError(format!(
                "URL signing secret must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }
        Ok(Self { secret })
    }

    fn mac(&self) -> StorageResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| StorageError::ConfigError(format!("Invalid signing key: {}", e)))
    }

    fn payload(method: &str, storage_key: &str, expires: u64, content_type: Option<&str>) -> String {
        format!(
            "{}\n{}\n{}\n{}",
            method.to_ascii_uppercase(),
            storage_key,
            expires,
            content_type.unwrap_or_default()
        )
    }

    /// Sign and return `(expires, signature)` for a request valid for `expires_in`.
    pub fn sign(
        &self,
        method: &str,
        storage_key: &str,
        content_type: Option<&str>,
        expires_in: Duration,
    ) -> StorageResult<(u64, String)> {
        let expires = unix_now().saturating_add(expires_in.as_secs());
        let signature = self.sign_at(method, storage_key, content_type, expires)?;
        Ok((expires, signature))
    }

    fn sign_at(
        &self,
        method: &str,
        storage_key: &str,
        content_type: Option<&str>,
        expires: u64,
    ) -> StorageResult<String> {
        let mut mac = self.mac()?;
        mac.update(Self::payload(method, storage_key, expires, content_type).as_bytes());
        let tag = mac.finalize().into_bytes();
        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(tag))
    }

    /// Verify a signed request against the current time.
    pub fn verify(&self, request: &SignedRequest<'_>) -> StorageResult<()> {
        self.verify_at(request, unix_now())
    }

    pub fn verify_at(&self, request: &SignedRequest<'_>, now: u64) -> StorageResult<()> {
        let tag = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(request.signature)
            .map_err(|_| StorageError::InvalidSignature("Malformed signature".to_string()))?;

        let mut mac = self.mac()?;
        mac.update(
            Self::payload(
                request.method,
                request.storage_key,
                request.expires,
                request.content_type,
            )
            .as_bytes(),
        );
        mac.verify_slice(&tag)
            .map_err(|_| StorageError::InvalidSignature("Signature mismatch".to_string()))?;

        if now > request.expires {
            return Err(StorageError::InvalidSignature(
                "Signed URL has expired".to_string(),
            ));
        }
        Ok(())
    }
}
