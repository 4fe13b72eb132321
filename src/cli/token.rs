use anyhow::{Result, anyhow};
use chrono::DateTime;

use crate::auth::decode_claims;
use crate::chat::Dispatcher;
use crate::core::ChatConfig;

pub async fn run(config: &ChatConfig) -> Result<()> {
    let mut dispatcher = Dispatcher::from_config(config)?;
    let access_token = dispatcher.tokens_mut().get_valid_token().await?;

    let claims = decode_claims(&access_token)
        .ok_or_else(|| anyhow!("Access token does not carry decodable claims"))?;
    println!("{}", serde_json::to_string_pretty(&claims)?);

    match dispatcher
        .tokens()
        .token()
        .and_then(|t| t.expires_at)
        .and_then(|exp| DateTime::from_timestamp(exp, 0))
    {
        Some(expires) => println!("Expires at {}", expires.to_rfc3339()),
        None => println!("Expiry unknown"),
    }

    Ok(())
}
