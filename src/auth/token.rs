//! Access/refresh token pair and the `exp` claim decoding used to
//! decide when a new token is needed.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: String,
    /// Epoch seconds from the access token's `exp` claim. `None` when
    /// the access token could not be decoded.
    pub expires_at: Option<i64>,
}

impl Token {
    pub fn new(access_token: &str, refresh_token: &str) -> Self {
        Self {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            expires_at: decode_exp(access_token),
        }
    }

    /// Undecodable tokens count as expired so the next call fetches a
    /// new one.
    pub fn is_expired_at(&self, now: i64) -> bool {
        match self.expires_at {
            Some(exp) => exp <= now,
            None => true,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(chrono::Utc::now().timestamp())
    }
}

/// Decode the claims segment of a JWT style token.
pub fn decode_claims(token: &str) -> Option<Value> {
    let segment = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| tracing::debug!("Token claims are not base64url: {}", e))
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn decode_exp(token: &str) -> Option<i64> {
    let claims = decode_claims(token)?;
    let exp = &claims["exp"];
    // Some issuers send fractional seconds
    exp.as_i64().or_else(|| exp.as_f64().map(|f| f as i64))
}
