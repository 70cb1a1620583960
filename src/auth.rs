//! Signed session tokens.
//!
//! A token is `base64url(claims_json) + "." + hex(hmac_sha256(secret, claims_b64))`.
//! Claims carry the account id, its role, and an expiry in Unix seconds.
//! Tokens travel either as `Authorization: Bearer <token>` or in a `token`
//! cookie; [`token_from_headers`] accepts both, header first.

use anyhow::{anyhow, Result};
use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use estate_harness_core::Role;

type HmacSha256 = Hmac<Sha256>;

/// Name of the cookie set by `POST /auth/login`.
pub const TOKEN_COOKIE: &str = "token";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub uid: i64,
    pub role: Role,
    /// Expiry, Unix seconds.
    pub exp: i64,
}

#[derive(Debug, Error, PartialEq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("invalid token signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
}

/// Issues and verifies tokens under one secret.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
    ttl_secs: i64,
}

impl TokenSigner {
    pub fn new(secret: &str, ttl_hours: u64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl_secs: (ttl_hours as i64).saturating_mul(3600),
        }
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret).map_err(|e| anyhow!("invalid HMAC key: {}", e))
    }

    pub fn issue(&self, uid: i64, role: Role) -> Result<String> {
        self.issue_at(uid, role, chrono::Utc::now().timestamp())
    }

    pub fn issue_at(&self, uid: i64, role: Role, now: i64) -> Result<String> {
        let claims = Claims {
            uid,
            role,
            exp: now + self.ttl_secs,
        };
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        Ok(format!("{}.{}", payload, signature))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, chrono::Utc::now().timestamp())
    }

    pub fn verify_at(&self, token: &str, now: i64) -> Result<Claims, TokenError> {
        let (payload, signature) = token.trim().split_once('.').ok_or(TokenError::Malformed)?;
        let signature = hex::decode(signature).map_err(|_| TokenError::Malformed)?;

        let mut mac = self.mac().map_err(|_| TokenError::BadSignature)?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::Malformed)?;
        let claims: Claims = serde_json::from_slice(&json).map_err(|_| TokenError::Malformed)?;
        if claims.exp <= now {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }
}

/// Bearer token from `Authorization`, else the `token` cookie.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == TOKEN_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_issue_then_verify() {
        let signer = TokenSigner::new("secret", 24);
        let token = signer.issue_at(42, Role::Master, NOW).unwrap();
        let claims = signer.verify_at(&token, NOW + 10).unwrap();
        assert_eq!(claims.uid, 42);
        assert_eq!(claims.role, Role::Master);
        assert_eq!(claims.exp, NOW + 24 * 3600);
    }

    #[test]
    fn test_expired_token() {
        let signer = TokenSigner::new("secret", 1);
        let token = signer.issue_at(1, Role::Client, NOW).unwrap();
        assert_eq!(signer.verify_at(&token, NOW + 3600), Err(TokenError::Expired));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = TokenSigner::new("one", 24).issue_at(1, Role::Master, NOW).unwrap();
        let other = TokenSigner::new("two", 24);
        assert_eq!(other.verify_at(&token, NOW), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let signer = TokenSigner::new("secret", 24);
        let token = signer.issue_at(1, Role::Client, NOW).unwrap();
        let (_, sig) = token.split_once('.').unwrap();
        let forged_claims = Claims {
            uid: 1,
            role: Role::Master,
            exp: NOW + 3600,
        };
        let forged = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_claims).unwrap()),
            sig
        );
        assert_eq!(signer.verify_at(&forged, NOW), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let signer = TokenSigner::new("secret", 24);
        assert_eq!(signer.verify_at("nodot", NOW), Err(TokenError::Malformed));
        assert_eq!(signer.verify_at("abc.zz", NOW), Err(TokenError::Malformed));
    }

    #[test]
    fn test_token_from_bearer_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        headers.insert(header::COOKIE, HeaderValue::from_static("token=cookie.val"));
        assert_eq!(token_from_headers(&headers).as_deref(), Some("abc.def"));
    }

    #[test]
    fn test_token_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; token=abc.def; other=1"),
        );
        assert_eq!(token_from_headers(&headers).as_deref(), Some("abc.def"));
        assert_eq!(token_from_headers(&HeaderMap::new()), None);
    }
}
