use std::fmt;
use std::str::FromStr;

use anyhow::{Error, anyhow};

/// How a successful answer should be interpreted for the current turn.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResponseMode {
    #[default]
    Text,
    Table,
    Chart,
}

impl ResponseMode {
    /// The `type` value the question endpoint expects.
    pub fn label(&self) -> &'static str {
        match self {
            ResponseMode::Text => "English",
            ResponseMode::Table => "Table",
            ResponseMode::Chart => "Chart",
        }
    }
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResponseMode::Text => "text",
            ResponseMode::Table => "table",
            ResponseMode::Chart => "chart",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for ResponseMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "english" => Ok(ResponseMode::Text),
            "table" => Ok(ResponseMode::Table),
            "chart" => Ok(ResponseMode::Chart),
            other => Err(anyhow!("Unknown response mode: {}", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Role {
    User,
    Assistant,
    // Placeholder shown while a turn is in flight
    Pending,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

impl Message {
    pub fn new(role: Role, text: &str) -> Self {
        Message {
            role,
            text: text.to_string(),
        }
    }
}

/// A single conversation with the backend. The id is sent with every
/// question so the backend can thread answers together.
#[derive(Clone, Debug)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: format!("conv_{}", chrono::Utc::now().timestamp_millis()),
            messages: Vec::new(),
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Drops any pending placeholders left behind by a turn.
    pub fn remove_pending(&mut self) {
        self.messages.retain(|m| m.role != Role::Pending);
    }

    pub fn has_pending(&self) -> bool {
        self.messages.iter().any(|m| m.role == Role::Pending)
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
