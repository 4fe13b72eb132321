use std::path::Path;

use anyhow::{Result, bail};

use super::terminal::TerminalSurface;
use crate::chat::{ChatSession, ResponseMode, TurnOutcome};
use crate::core::ChatConfig;

pub async fn run(
    config: &ChatConfig,
    mode: Option<ResponseMode>,
    chart_dir: &Path,
    question: &str,
) -> Result<()> {
    let mut session = ChatSession::from_config(config, TerminalSurface::stdout(chart_dir))?;
    if let Some(mode) = mode {
        session.set_mode(mode);
    }

    match session.send(question).await {
        TurnOutcome::Skipped => bail!("Nothing to ask"),
        TurnOutcome::Failed => bail!("The question could not be answered"),
        _ => Ok(()),
    }
}
