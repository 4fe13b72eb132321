//! A chat session owns the conversation and runs one turn at a time
//! against the dispatcher, writing whatever comes back to a surface.

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use futures::future::{AbortHandle, AbortRegistration};

use super::dispatcher::{Dispatcher, TurnState};
use super::error::ChatError;
use super::models::{Conversation, Message, ResponseMode, Role};
use super::render::{Reply, Table};
use super::surface::{FAILURE_MESSAGE, NO_DATA_MESSAGE, PENDING_MESSAGE, Surface};
use crate::core::ChatConfig;

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Nothing to ask, no request was made
    Skipped,
    Answered(Reply),
    /// The empty state message was shown
    Empty,
    /// The generic failure message was shown
    Failed,
    /// Aborted before finishing, nothing was shown
    Cancelled,
}

#[derive(Default)]
struct TurnSlot {
    abort: Option<AbortHandle>,
    busy: bool,
}

/// Handle for cancelling the in-flight turn from elsewhere, e.g. when
/// the chat panel is closed while waiting on an answer.
#[derive(Clone, Default)]
pub struct Canceller {
    slot: Arc<Mutex<TurnSlot>>,
}

impl Canceller {
    /// Abort the in-flight turn. Returns false when nothing was in
    /// flight.
    pub fn cancel(&self) -> bool {
        match self.lock().abort.take() {
            Some(handle) => {
                tracing::debug!("Cancelling in-flight turn");
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Whether a turn is in flight. The send control stays disabled
    /// while this is true.
    pub fn is_busy(&self) -> bool {
        self.lock().busy
    }

    fn begin(&self) -> (AbortHandle, AbortRegistration) {
        let (handle, registration) = AbortHandle::new_pair();
        let mut slot = self.lock();
        slot.abort = Some(handle.clone());
        slot.busy = true;
        (handle, registration)
    }

    fn finish(&self) {
        let mut slot = self.lock();
        slot.abort = None;
        slot.busy = false;
    }

    fn lock(&self) -> MutexGuard<'_, TurnSlot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// Clears the busy flag even if the turn future is dropped mid-flight
struct TurnGuard(Canceller);

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.0.finish();
    }
}

pub struct ChatSession<S: Surface> {
    dispatcher: Dispatcher,
    surface: S,
    conversation: Conversation,
    mode: ResponseMode,
    chart_instructions: Option<String>,
    canceller: Canceller,
    last_state: TurnState,
}

impl<S: Surface> ChatSession<S> {
    pub fn new(dispatcher: Dispatcher, surface: S, mode: ResponseMode) -> Self {
        Self {
            dispatcher,
            surface,
            conversation: Conversation::new(),
            mode,
            chart_instructions: None,
            canceller: Canceller::default(),
            last_state: TurnState::Idle,
        }
    }

    pub fn from_config(config: &ChatConfig, surface: S) -> Result<Self> {
        let dispatcher = Dispatcher::from_config(config)?;
        Ok(Self::new(dispatcher, surface, config.default_mode)
            .with_chart_instructions(config.chart_instructions.clone()))
    }

    pub fn with_chart_instructions(mut self, instructions: Option<String>) -> Self {
        self.chart_instructions = instructions;
        self
    }

    pub fn mode(&self) -> ResponseMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ResponseMode) {
        self.mode = mode;
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn canceller(&self) -> Canceller {
        self.canceller.clone()
    }

    /// How the most recent turn ended
    pub fn last_state(&self) -> TurnState {
        self.last_state
    }

    /// Run one turn for `input`.
    pub async fn send(&mut self, input: &str) -> TurnOutcome {
        let input = input.trim();
        if input.is_empty() {
            return TurnOutcome::Skipped;
        }

        // The extra instructions go to the backend only, the user
        // message keeps what was typed
        let question = match (self.mode, &self.chart_instructions) {
            (ResponseMode::Chart, Some(instructions)) => format!("{}{}", input, instructions),
            _ => input.to_string(),
        };

        self.conversation.push(Message::new(Role::User, input));
        self.conversation
            .push(Message::new(Role::Pending, PENDING_MESSAGE));
        self.surface.busy(true);

        let (handle, registration) = self.canceller.begin();
        let guard = TurnGuard(self.canceller.clone());
        let conversation_id = self.conversation.id.clone();
        let result = self
            .dispatcher
            .ask_cancellable(&question, self.mode, &conversation_id, registration)
            .await;
        drop(guard);
        let result = honour_abort(result, &handle);

        self.conversation.remove_pending();
        let outcome = self.apply(result);
        self.surface.busy(false);

        outcome
    }

    fn apply(&mut self, result: Result<Reply, ChatError>) -> TurnOutcome {
        match result {
            Ok(reply) => {
                self.last_state = TurnState::Success;
                self.render(reply)
            }
            Err(e) if e.is_user_visible() => {
                tracing::error!("Turn failed: {}", e);
                self.last_state = TurnState::Fail;
                self.conversation
                    .push(Message::new(Role::Assistant, FAILURE_MESSAGE));
                self.surface.failure(FAILURE_MESSAGE);
                TurnOutcome::Failed
            }
            Err(ChatError::MalformedResponse(reason)) => {
                tracing::warn!("Showing empty state for malformed {} reply: {}", self.mode, reason);
                self.last_state = TurnState::Fail;
                self.show_empty()
            }
            Err(e) => {
                tracing::debug!("Turn ended without output: {}", e);
                self.last_state = TurnState::Cancelled;
                TurnOutcome::Cancelled
            }
        }
    }

    fn render(&mut self, reply: Reply) -> TurnOutcome {
        match &reply {
            Reply::Empty => return self.show_empty(),
            Reply::Table(table) if table.is_empty() => return self.show_empty(),
            Reply::Text(text) => {
                self.conversation.push(Message::new(Role::Assistant, text));
                self.surface.text(text);
            }
            Reply::Table(table) => {
                self.conversation
                    .push(Message::new(Role::Assistant, &table_summary(table)));
                self.surface.table(table);
            }
            Reply::Chart(chart) => {
                self.conversation
                    .push(Message::new(Role::Assistant, &chart.markup));
                self.surface.chart(chart);
            }
        }
        TurnOutcome::Answered(reply)
    }

    fn show_empty(&mut self) -> TurnOutcome {
        self.conversation
            .push(Message::new(Role::Assistant, NO_DATA_MESSAGE));
        self.surface.empty(NO_DATA_MESSAGE);
        TurnOutcome::Empty
    }

    /// Start over: abort anything in flight, begin a new conversation
    /// and forget the held token.
    pub fn clear(&mut self) {
        self.canceller.cancel();
        self.conversation = Conversation::new();
        self.dispatcher.tokens_mut().clear();
        self.last_state = TurnState::Idle;
        tracing::debug!("Cleared conversation, new id {}", self.conversation.id);
    }
}

// A cancel that lands after the answer arrived still discards it
fn honour_abort(result: Result<Reply, ChatError>, handle: &AbortHandle) -> Result<Reply, ChatError> {
    if handle.is_aborted() {
        return Err(ChatError::Cancelled);
    }
    result
}

fn table_summary(table: &Table) -> String {
    let mut lines = vec![table.headers.join(" | ")];
    lines.extend(table.rows.iter().map(|row| row.join(" | ")));
    lines.join("\n")
}
