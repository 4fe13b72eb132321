//! Test utilities for integration tests
#![allow(dead_code)]

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use reqwest::Client;
use serde_json::json;

use septa::auth::{Token, TokenManager};
use septa::chat::{ChartFragment, Dispatcher, Surface, Table};

/// Builds an unsigned JWT style token expiring at `exp`.
pub fn jwt(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(json!({"sub": "widget", "exp": exp}).to_string());
    format!("{}.{}.sig", header, payload)
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn expired_token(refresh_token: &str) -> Token {
    Token::new(&jwt(now() - 1), refresh_token)
}

pub fn fresh_token(refresh_token: &str) -> Token {
    Token::new(&jwt(now() + 3600), refresh_token)
}

/// Dispatcher pointed at a mock server serving `/token` and `/ask`.
pub fn test_dispatcher(server_url: &str) -> Dispatcher {
    test_dispatcher_with_endpoint(server_url, &format!("{}/ask", server_url))
}

pub fn test_dispatcher_with_endpoint(server_url: &str, endpoint_url: &str) -> Dispatcher {
    test_dispatcher_with_urls(&format!("{}/token", server_url), endpoint_url)
}

pub fn test_dispatcher_with_urls(token_url: &str, endpoint_url: &str) -> Dispatcher {
    let client = Client::new();
    let tokens = TokenManager::new(client.clone(), token_url);
    Dispatcher::new(client, endpoint_url, tokens)
}

/// Accepts connections and never answers them. Returns the base URL
/// of the listener.
pub async fn hanging_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    format!("http://{}", addr)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    Text(String),
    Table(Table),
    Chart(ChartFragment),
    Empty(String),
    Failure(String),
}

/// Surface that remembers everything written to it
#[derive(Default)]
pub struct RecordingSurface {
    pub rendered: Vec<Rendered>,
    pub busy: Vec<bool>,
}

impl Surface for RecordingSurface {
    fn text(&mut self, text: &str) {
        self.rendered.push(Rendered::Text(text.to_string()));
    }

    fn table(&mut self, table: &Table) {
        self.rendered.push(Rendered::Table(table.clone()));
    }

    fn chart(&mut self, chart: &ChartFragment) {
        self.rendered.push(Rendered::Chart(chart.clone()));
    }

    fn empty(&mut self, message: &str) {
        self.rendered.push(Rendered::Empty(message.to_string()));
    }

    fn failure(&mut self, message: &str) {
        self.rendered.push(Rendered::Failure(message.to_string()));
    }

    fn busy(&mut self, busy: bool) {
        self.busy.push(busy);
    }
}
