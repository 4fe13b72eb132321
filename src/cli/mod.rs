use std::env;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod ask;
pub mod chat;
pub mod terminal;
pub mod token;

use crate::chat::ResponseMode;
use crate::core::ChatConfig;

#[derive(Subcommand)]
enum Command {
    /// Start an interactive chat session
    Chat {
        /// Response mode to start in, defaults to SEPTA_DEFAULT_MODE
        #[arg(long, value_enum)]
        mode: Option<ResponseMode>,
        /// Where chart answers are saved as HTML files
        #[arg(long)]
        chart_dir: Option<PathBuf>,
    },
    /// Ask a single question and print the answer
    Ask {
        #[arg(long, value_enum)]
        mode: Option<ResponseMode>,
        #[arg(long)]
        chart_dir: Option<PathBuf>,
        question: String,
    },
    /// Fetch an access token and print its claims
    Token {},
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn chart_dir_or_default(chart_dir: Option<PathBuf>) -> PathBuf {
    chart_dir.unwrap_or_else(|| env::temp_dir().join("septa-charts"))
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();
    init_tracing();

    // Handle each sub command
    match args.command {
        Some(Command::Chat { mode, chart_dir }) => {
            let config = ChatConfig::from_env()?;
            chat::run(&config, mode, &chart_dir_or_default(chart_dir)).await?;
        }
        Some(Command::Ask {
            mode,
            chart_dir,
            question,
        }) => {
            let config = ChatConfig::from_env()?;
            ask::run(&config, mode, &chart_dir_or_default(chart_dir), &question).await?;
        }
        Some(Command::Token {}) => {
            let config = ChatConfig::from_env()?;
            token::run(&config).await?;
        }
        None => {}
    }

    Ok(())
}
