use std::path::Path;

use anyhow::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;

use super::terminal::TerminalSurface;
use crate::chat::{ChatSession, ResponseMode};
use crate::core::ChatConfig;

/// Commands typed at the prompt instead of a question
#[derive(Debug, PartialEq)]
enum Input<'a> {
    Mode(&'a str),
    Clear,
    Quit,
    Question(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    match line.split_once(' ') {
        Some(("/mode", mode)) => Input::Mode(mode.trim()),
        _ => match line {
            "/clear" => Input::Clear,
            "/quit" | "/exit" => Input::Quit,
            _ => Input::Question(line),
        },
    }
}

/// Calls `on_interrupt` for every Ctrl-C until the returned task is
/// aborted. The handler is installed before this returns.
fn watch_interrupts<F>(on_interrupt: F) -> Result<JoinHandle<()>>
where
    F: Fn() + Send + 'static,
{
    let mut interrupts = signal(SignalKind::interrupt())?;
    Ok(tokio::spawn(async move {
        while interrupts.recv().await.is_some() {
            on_interrupt();
        }
    }))
}

pub async fn run(config: &ChatConfig, mode: Option<ResponseMode>, chart_dir: &Path) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    let mut session = ChatSession::from_config(config, TerminalSurface::stdout(chart_dir))?;
    if let Some(mode) = mode {
        session.set_mode(mode);
    }

    println!(
        "Asking {} in {} mode. /mode <text|table|chart>, /clear, /quit",
        config.client_name,
        session.mode()
    );

    // Ctrl-C while waiting on an answer aborts the turn instead of
    // exiting. At the prompt rustyline reads it as a key press.
    let canceller = session.canceller();
    let watcher = watch_interrupts(move || {
        canceller.cancel();
    })?;

    loop {
        let prompt = format!("{} >>> ", session.mode());
        match rl.readline(&prompt) {
            Ok(line) => {
                let _ = rl.add_history_entry(line.as_str());
                match parse_input(&line) {
                    Input::Mode(mode) => match mode.parse::<ResponseMode>() {
                        Ok(mode) => session.set_mode(mode),
                        Err(e) => println!("{}", e),
                    },
                    Input::Clear => {
                        session.clear();
                        println!("Conversation cleared");
                    }
                    Input::Quit => break,
                    Input::Question(question) => {
                        let outcome = session.send(question).await;
                        tracing::debug!("Turn finished: {:?}", outcome);
                    }
                }
            }
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }
    watcher.abort();

    Ok(())
}
