//! Errors surfaced by session operations that touch the outside world

use shared::{JoinRejection, ValidationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("client is not configured: {0}")]
    Config(String),

    #[error("relay at {addr} did not answer within {timeout_ms}ms")]
    Unreachable { addr: String, timeout_ms: u64 },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("join rejected: {0}")]
    JoinRejected(#[from] JoinRejection),

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("packet codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("question bank error: {0}")]
    QuestionBank(String),
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::QuestionBank(err.to_string())
    }
}
