use anyhow::Result;
use septa::cli;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run().await
}
