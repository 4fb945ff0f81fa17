//! WebSocket admission tokens.
//!
//! Short-lived HS256 tokens with a `desktop` or `mobile` scope. Mobile
//! tokens are minted against a pair code and carry the channel they are
//! allowed to join. The token travels in the `Sec-WebSocket-Protocol`
//! header as `Bearer.<token>`; verification happens before the upgrade.

use crate::error::{GatewayError, Result};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Subprotocol prefix carrying the token.
pub const BEARER_PREFIX: &str = "Bearer.";

/// What a token allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenScope {
    /// Full control plane.
    Desktop,
    /// Only `mobile_init` and `audio_chunk`, pinned to one channel.
    Mobile,
}

/// Claims carried by an admission token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub scope: TokenScope,
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

/// An issued token with its lifetime.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_in: u64,
}

/// Issues and verifies admission tokens.
pub struct TokenAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenAuthority {
    pub fn new(signing_key: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(signing_key.as_bytes()),
            decoding: DecodingKey::from_secret(signing_key.as_bytes()),
            ttl,
        }
    }

    /// Issue a token for a subject.
    ///
    /// # Errors
    ///
    /// Returns an internal error when signing fails.
    pub fn issue(
        &self,
        subject: &str,
        scope: TokenScope,
        channel: Option<String>,
    ) -> Result<IssuedToken> {
        let exp = chrono::Utc::now()
            + chrono::Duration::from_std(self.ttl)
                .map_err(|e| GatewayError::Internal(format!("token ttl: {e}")))?;
        let claims = TokenClaims {
            sub: subject.to_string(),
            scope,
            exp: exp.timestamp(),
            channel,
        };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| GatewayError::Internal(format!("token encode: {e}")))?;
        Ok(IssuedToken {
            token,
            expires_in: self.ttl.as_secs(),
        })
    }

    /// Verify signature and expiry, returning the claims.
    pub fn verify(&self, token: &str) -> Result<TokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        jsonwebtoken::decode::<TokenClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => GatewayError::TokenExpired,
                _ => GatewayError::InvalidToken(e.to_string()),
            })
    }

    /// Pull the token out of a `Sec-WebSocket-Protocol` header value and
    /// verify it. Returns the claims and the matched protocol entry (to be
    /// echoed in the upgrade response).
    pub fn verify_subprotocol(&self, header: &str) -> Result<(TokenClaims, String)> {
        let entry = header
            .split(',')
            .map(str::trim)
            .find(|p| p.starts_with(BEARER_PREFIX))
            .ok_or_else(|| GatewayError::InvalidToken("no bearer subprotocol".to_string()))?;
        let claims = self.verify(&entry[BEARER_PREFIX.len()..])?;
        Ok((claims, entry.to_string()))
    }
}
