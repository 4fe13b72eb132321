use std::env;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

use crate::chat::ResponseMode;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Clone, Debug)]
pub struct ChatConfig {
    pub client_id: String,
    pub client_name: String,
    pub access_level: u8,
    /// Question endpoint
    pub endpoint_url: String,
    pub token_endpoint_url: String,
    pub default_mode: ResponseMode,
    /// Appended to the question when asking for a chart
    pub chart_instructions: Option<String>,
    pub request_timeout: Duration,
}

impl ChatConfig {
    pub fn from_env() -> Result<Self> {
        let client_id = required("SEPTA_CLIENT_ID")?;
        let client_name = required("SEPTA_CLIENT_NAME")?;
        let access_level = required("SEPTA_ACCESS_LEVEL")?
            .trim()
            .parse::<u8>()
            .context("SEPTA_ACCESS_LEVEL must be a small integer")?;
        let url = optional("SEPTA_URL");
        let endpoint_url = resolve_endpoint(access_level, url.as_deref(), &client_name)?;
        let token_endpoint_url = required("SEPTA_ACCESS_TOKEN_URL")?;
        let default_mode = match optional("SEPTA_DEFAULT_MODE") {
            Some(mode) => mode.parse().context("Invalid SEPTA_DEFAULT_MODE")?,
            None => ResponseMode::default(),
        };
        let chart_instructions = optional("SEPTA_CHART_INSTRUCTIONS");
        let request_timeout = match optional("SEPTA_REQUEST_TIMEOUT_SECS") {
            Some(secs) => Duration::from_secs(
                secs.trim()
                    .parse()
                    .context("SEPTA_REQUEST_TIMEOUT_SECS must be a number of seconds")?,
            ),
            None => Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        };

        Ok(Self {
            client_id,
            client_name,
            access_level,
            endpoint_url,
            token_endpoint_url,
            default_mode,
            chart_instructions,
            request_timeout,
        })
    }
}

/// Access level 1 talks to a self hosted backend and must name it.
/// Everything else uses the client's hosted endpoint.
pub fn resolve_endpoint(access_level: u8, url: Option<&str>, client_name: &str) -> Result<String> {
    match (access_level, url) {
        (1, Some(url)) => Ok(url.to_string()),
        (1, None) => Err(anyhow!(
            "SEPTA_URL is required when SEPTA_ACCESS_LEVEL is set to 1"
        )),
        _ => Ok(format!("https://{}.septa.com", client_name)),
    }
}

fn required(key: &str) -> Result<String> {
    optional(key).ok_or_else(|| anyhow!("Missing env var {}", key))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_endpoint() {
        assert_eq!(
            resolve_endpoint(1, Some("http://localhost:8000/ask"), "acme").unwrap(),
            "http://localhost:8000/ask"
        );
        assert!(resolve_endpoint(1, None, "acme").is_err());
        assert_eq!(
            resolve_endpoint(0, None, "acme").unwrap(),
            "https://acme.septa.com"
        );
        // The hosted endpoint wins unless the access level is 1
        assert_eq!(
            resolve_endpoint(2, Some("http://ignored"), "acme").unwrap(),
            "https://acme.septa.com"
        );
    }
}
