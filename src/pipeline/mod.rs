//! The streaming-reply pipeline: reads fragments from a completion source,
//! forwards them to the client, and persists paragraph-sized snapshots of
//! the response as they accumulate.

mod coordinator;
mod forwarder;
mod ordering;
mod segmenter;
mod writer;

pub use coordinator::Turn;
pub use forwarder::ClientForwarder;
pub use ordering::OrderingBasis;
pub use segmenter::{FinishEvent, Flush, ParagraphSegmenter, PARAGRAPH_CHAR_LIMIT};
pub use writer::TurnWriter;

use crate::llm::LlmError;
use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("chat not found")]
    NotFound,
    #[error("chat is read-only")]
    Permission,
    #[error("a reply is already streaming for this chat")]
    Conflict,
    #[error("completion source failed: {0}")]
    Upstream(#[from] LlmError),
    #[error("storage write failed: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("client disconnected")]
    Disconnected,
}

/// Chats with a reply currently streaming. A second turn against the same
/// chat is rejected instead of racing the first one's writes.
#[derive(Debug, Default)]
pub struct ActiveTurns {
    chats: Mutex<HashSet<String>>,
}

impl ActiveTurns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, chat_id: &str) -> Result<TurnGuard<'_>, TurnError> {
        let mut chats = self.chats.lock().unwrap();
        if !chats.insert(chat_id.to_string()) {
            return Err(TurnError::Conflict);
        }
        Ok(TurnGuard {
            turns: self,
            chat_id: chat_id.to_string(),
        })
    }
}

/// Releases the chat's turn slot on drop, including on failure paths.
pub struct TurnGuard<'a> {
    turns: &'a ActiveTurns,
    chat_id: String,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.turns.chats.lock().unwrap().remove(&self.chat_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_on_same_chat_conflicts() {
        let turns = ActiveTurns::new();
        let guard = turns.acquire("chat-1").unwrap();
        assert!(matches!(
            turns.acquire("chat-1"),
            Err(TurnError::Conflict)
        ));
        drop(guard);
        assert!(turns.acquire("chat-1").is_ok());
    }

    #[test]
    fn different_chats_are_independent() {
        let turns = ActiveTurns::new();
        let _a = turns.acquire("chat-1").unwrap();
        assert!(turns.acquire("chat-2").is_ok());
    }
}
