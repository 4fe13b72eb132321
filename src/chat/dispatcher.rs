//! Sends one question to the backend and classifies the answer.
//!
//! A turn moves through `TokenCheck -> Sending` and, when the backend
//! answers 401, through `Retrying -> Sending` exactly once more. The
//! retry only ever applies to the question call; token endpoint
//! failures end the turn immediately.

use std::fmt;

use anyhow::Result;
use futures::future::{AbortRegistration, Abortable, Aborted};
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;

use super::error::ChatError;
use super::models::ResponseMode;
use super::render::{Reply, parse_reply};
use crate::auth::TokenManager;
use crate::core::ChatConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    TokenCheck,
    Sending,
    Retrying,
    Success,
    Fail,
    Cancelled,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnState::Idle => "idle",
            TurnState::TokenCheck => "token_check",
            TurnState::Sending => "sending",
            TurnState::Retrying => "retrying",
            TurnState::Success => "success",
            TurnState::Fail => "fail",
            TurnState::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}

#[derive(Serialize)]
struct QuestionRequest<'a> {
    r#type: &'a str,
    question: &'a str,
    #[serde(rename = "conversationId")]
    conversation_id: &'a str,
}

pub struct Dispatcher {
    client: Client,
    endpoint_url: String,
    tokens: TokenManager,
}

impl Dispatcher {
    pub fn new(client: Client, endpoint_url: &str, tokens: TokenManager) -> Self {
        Self {
            client,
            endpoint_url: endpoint_url.to_string(),
            tokens,
        }
    }

    pub fn from_config(config: &ChatConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        let tokens = TokenManager::new(client.clone(), &config.token_endpoint_url);
        Ok(Self::new(client, &config.endpoint_url, tokens))
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn tokens_mut(&mut self) -> &mut TokenManager {
        &mut self.tokens
    }

    /// Ask `question` and classify the answer for `mode`.
    pub async fn ask(
        &mut self,
        question: &str,
        mode: ResponseMode,
        conversation_id: &str,
    ) -> Result<Reply, ChatError> {
        let result = self.run(question, mode, conversation_id).await;
        match &result {
            Ok(_) => tracing::debug!(state = %TurnState::Success, "Turn finished"),
            Err(e) => tracing::debug!(state = %TurnState::Fail, "Turn failed: {}", e),
        }
        result
    }

    /// Same as `ask` but aborts every outstanding call, including a
    /// token fetch or refresh, once the registration's handle fires.
    pub async fn ask_cancellable(
        &mut self,
        question: &str,
        mode: ResponseMode,
        conversation_id: &str,
        registration: AbortRegistration,
    ) -> Result<Reply, ChatError> {
        match Abortable::new(self.ask(question, mode, conversation_id), registration).await {
            Ok(result) => result,
            Err(Aborted) => {
                tracing::debug!(state = %TurnState::Cancelled, "Turn aborted");
                Err(ChatError::Cancelled)
            }
        }
    }

    async fn run(
        &mut self,
        question: &str,
        mode: ResponseMode,
        conversation_id: &str,
    ) -> Result<Reply, ChatError> {
        tracing::debug!(state = %TurnState::TokenCheck, "Checking access token");
        let access_token = self.tokens.get_valid_token().await?;

        let mut res = self
            .send(&access_token, question, mode, conversation_id)
            .await?;

        if res.status() == StatusCode::UNAUTHORIZED {
            tracing::debug!(state = %TurnState::Retrying, "Access token rejected, refreshing");
            let access_token = self.tokens.refresh().await?;
            res = self
                .send(&access_token, question, mode, conversation_id)
                .await?;

            if res.status() == StatusCode::UNAUTHORIZED {
                return Err(ChatError::Auth(
                    "Backend rejected the refreshed access token".to_string(),
                ));
            }
        }

        let status = res.status();
        if !status.is_success() {
            return Err(ChatError::Request {
                status: status.as_u16(),
            });
        }

        let text = res.text().await?;
        if text.trim().is_empty() {
            return Ok(Reply::Empty);
        }
        let body: Value = serde_json::from_str(&text)
            .map_err(|e| ChatError::MalformedResponse(format!("Body is not JSON: {}", e)))?;

        parse_reply(mode, &body)
    }

    async fn send(
        &self,
        access_token: &str,
        question: &str,
        mode: ResponseMode,
        conversation_id: &str,
    ) -> Result<Response, ChatError> {
        tracing::debug!(
            state = %TurnState::Sending,
            "Sending {} question for conversation {}",
            mode,
            conversation_id
        );
        let payload = QuestionRequest {
            r#type: mode.label(),
            question,
            conversation_id,
        };
        let res = self
            .client
            .post(&self.endpoint_url)
            .bearer_auth(access_token)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        Ok(res)
    }
}
