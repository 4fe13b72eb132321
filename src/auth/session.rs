//! Holds the current token pair and talks to the token endpoint.
//!
//! The same endpoint serves both operations: a `GET` issues a fresh
//! access/refresh pair and a `POST` with `action: "refresh"` trades
//! the refresh token for a new access token. Neither call is ever
//! retried; a failure here ends the turn.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::token::Token;
use crate::chat::ChatError;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    // Some deployments rotate the refresh token as well
    refresh_token: Option<String>,
}

pub struct TokenManager {
    client: Client,
    token_url: String,
    token: Option<Token>,
}

impl TokenManager {
    pub fn new(client: Client, token_url: &str) -> Self {
        Self {
            client,
            token_url: token_url.to_string(),
            token: None,
        }
    }

    /// The currently held token, if any.
    pub fn token(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    /// Resume with a previously issued token instead of starting
    /// empty.
    pub fn restore(&mut self, token: Token) {
        self.token = Some(token);
    }

    /// Discard the held token. The next call to `get_valid_token`
    /// fetches a new pair.
    pub fn clear(&mut self) {
        self.token = None;
    }

    /// Returns a non-expired access token, fetching a new pair only
    /// when nothing is held or the held token has expired.
    pub async fn get_valid_token(&mut self) -> Result<String, ChatError> {
        if let Some(token) = &self.token
            && !token.is_expired()
        {
            return Ok(token.access_token.clone());
        }

        tracing::debug!("No valid access token held, fetching a new one");
        let token = self.fetch().await?;
        let access_token = token.access_token.clone();
        self.token = Some(token);
        Ok(access_token)
    }

    /// Exchange the held refresh token for a new access token and
    /// replace the held token.
    pub async fn refresh(&mut self) -> Result<String, ChatError> {
        let refresh_token = self
            .token
            .as_ref()
            .map(|t| t.refresh_token.clone())
            .ok_or_else(|| ChatError::Auth("No refresh token held".to_string()))?;

        let res = self
            .client
            .post(&self.token_url)
            .header("Content-Type", "application/json")
            .json(&json!({
                "action": "refresh",
                "refresh_token": refresh_token,
            }))
            .send()
            .await
            .map_err(|e| ChatError::Auth(format!("Token refresh failed: {}", e)))?;

        let status = res.status();
        if !status.is_success() {
            return Err(ChatError::Auth(format!(
                "Failed to refresh access token: {}",
                status
            )));
        }

        let body: RefreshResponse = res
            .json()
            .await
            .map_err(|e| ChatError::Auth(format!("Malformed refresh response: {}", e)))?;

        let token = Token::new(
            &body.access_token,
            body.refresh_token.as_deref().unwrap_or(&refresh_token),
        );
        tracing::debug!("Refreshed access token, expires at {:?}", token.expires_at);
        self.token = Some(token);

        Ok(body.access_token)
    }

    async fn fetch(&self) -> Result<Token, ChatError> {
        let res = self
            .client
            .get(&self.token_url)
            .send()
            .await
            .map_err(|e| ChatError::Auth(format!("Token fetch failed: {}", e)))?;

        let status = res.status();
        if !status.is_success() {
            return Err(ChatError::Auth(format!(
                "Failed to get access token: {}",
                status
            )));
        }

        let body: TokenResponse = res
            .json()
            .await
            .map_err(|e| ChatError::Auth(format!("Malformed token response: {}", e)))?;

        let token = Token::new(&body.access_token, &body.refresh_token);
        tracing::debug!("Fetched access token, expires at {:?}", token.expires_at);

        Ok(token)
    }
}
