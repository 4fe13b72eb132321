use thiserror::Error;

/// Errors a single turn can end with.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Token fetch or refresh failed, or the backend rejected a
    /// freshly refreshed token.
    #[error("Authorization failed: {0}")]
    Auth(String),

    /// Any non-success status other than 401
    #[error("Request failed with status {status}")]
    Request { status: u16 },

    /// The turn was aborted by the user
    #[error("Request was cancelled")]
    Cancelled,

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Request could not be sent: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ChatError {
    /// Whether the user should see the generic failure message for
    /// this error.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            ChatError::Auth(_) | ChatError::Request { .. } | ChatError::Transport(_)
        )
    }
}
