use crate::db::models::{Chat, Message, ShareMode};
use crate::db::Database;
use crate::llm::{ChatMessage, ChatRequest, Provider};
use crate::pipeline::{ActiveTurns, Turn, TurnError};
use futures::channel::mpsc;
use log::debug;

/// Placeholder every chat starts with; replaced once a title can be derived.
pub const DEFAULT_CHAT_TITLE: &str = "new chat";

/// First word of the first user message.
pub fn derive_title(first_user_message: &str) -> String {
    first_user_message
        .split_whitespace()
        .next()
        .unwrap_or(DEFAULT_CHAT_TITLE)
        .to_string()
}

/// Chat CRUD plus the streaming-reply entry point. Owns the database handle
/// and the registry of in-flight turns.
pub struct ChatService {
    db: Database,
    turns: ActiveTurns,
}

impl ChatService {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            turns: ActiveTurns::new(),
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    // ── Chats ──

    pub fn create_chat(&self, user_id: &str) -> Result<Chat, rusqlite::Error> {
        self.db.create_chat(user_id, DEFAULT_CHAT_TITLE)
    }

    pub fn chat(&self, id: &str) -> Result<Option<Chat>, rusqlite::Error> {
        self.db.get_chat(id)
    }

    pub fn chat_by_share_id(&self, share_id: &str) -> Result<Option<Chat>, rusqlite::Error> {
        self.db.get_chat_by_share_id(share_id)
    }

    pub fn chats(&self, user_id: &str) -> Result<Vec<Chat>, rusqlite::Error> {
        self.db.list_chats(user_id)
    }

    pub fn search_chats(&self, user_id: &str, query: &str) -> Result<Vec<Chat>, rusqlite::Error> {
        if query.is_empty() {
            return self.db.list_chats(user_id);
        }
        self.db.search_chats(user_id, query)
    }

    pub fn rename_chat(&self, id: &str, title: &str) -> Result<(), rusqlite::Error> {
        self.db.update_chat_title(id, title)
    }

    pub fn delete_chat(&self, id: &str) -> Result<(), rusqlite::Error> {
        self.db.delete_chat(id)
    }

    /// Returns the share id when sharing was enabled.
    pub fn set_sharing(
        &self,
        id: &str,
        is_shared: bool,
        share_mode: Option<ShareMode>,
    ) -> Result<Option<String>, rusqlite::Error> {
        self.db.update_chat_sharing(id, is_shared, share_mode)
    }

    // ── Messages ──

    pub fn messages(&self, chat_id: &str) -> Result<Vec<Message>, rusqlite::Error> {
        self.db.get_messages(chat_id)
    }

    /// Persists a user prompt ahead of a streaming turn. Read-only shared
    /// chats reject it the same way they reject the turn itself.
    pub fn post_user_message(&self, chat_id: &str, content: &str) -> Result<Message, TurnError> {
        let chat = self.db.get_chat(chat_id)?.ok_or(TurnError::NotFound)?;
        if chat.is_shared && chat.share_mode == Some(ShareMode::Read) {
            return Err(TurnError::Permission);
        }
        Ok(self.db.add_message(chat_id, &chat.user_id, "user", content)?)
    }

    // ── Streaming reply ──

    /// Runs one full turn: validate, load history, open the provider
    /// stream, then forward-and-persist until it ends. Fragments go out on
    /// `out` verbatim; the persisted assistant message comes back, or
    /// `None` when the model produced no text.
    pub async fn stream_reply(
        &self,
        provider: &Provider,
        model: &str,
        chat_id: &str,
        out: mpsc::Sender<String>,
    ) -> Result<Option<Message>, TurnError> {
        let turn = Turn::begin(&self.db, &self.turns, chat_id)?;

        let history: Vec<ChatMessage> = self
            .db
            .get_messages(chat_id)?
            .into_iter()
            .map(|m| ChatMessage {
                role: m.role,
                content: m.content,
            })
            .collect();
        debug!("chat {chat_id}: starting turn with {} prior messages", history.len());

        let request = ChatRequest {
            messages: history,
            model: model.to_string(),
        };
        let source = provider.completion_stream(&request).await?;
        turn.run(source, out).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_is_first_word() {
        assert_eq!(derive_title("how do lifetimes work?"), "how");
        assert_eq!(derive_title("  leading   spaces"), "leading");
        assert_eq!(derive_title(""), DEFAULT_CHAT_TITLE);
    }

    #[test]
    fn new_chats_start_with_placeholder_title() {
        let service = ChatService::new(Database::in_memory().unwrap());
        let chat = service.create_chat("alice").unwrap();
        assert_eq!(chat.title, DEFAULT_CHAT_TITLE);
    }

    #[test]
    fn post_user_message_rejects_read_only_share() {
        let service = ChatService::new(Database::in_memory().unwrap());
        let chat = service.create_chat("alice").unwrap();
        service
            .set_sharing(&chat.id, true, Some(ShareMode::Read))
            .unwrap();
        assert!(matches!(
            service.post_user_message(&chat.id, "hi"),
            Err(TurnError::Permission)
        ));
    }

    #[test]
    fn post_user_message_persists_complete_row() {
        let service = ChatService::new(Database::in_memory().unwrap());
        let chat = service.create_chat("alice").unwrap();
        let msg = service.post_user_message(&chat.id, "hello there").unwrap();
        assert_eq!(msg.role, "user");
        assert!(msg.is_complete);

        let listed = service.messages(&chat.id).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].content, "hello there");
    }

    #[test]
    fn search_falls_back_to_full_listing() {
        let service = ChatService::new(Database::in_memory().unwrap());
        let chat = service.create_chat("alice").unwrap();
        service.rename_chat(&chat.id, "Rust lifetimes").unwrap();
        service.create_chat("bob").unwrap();

        let all = service.search_chats("alice", "").unwrap();
        assert_eq!(all.len(), 1);
        let hits = service.search_chats("alice", "rust").unwrap();
        assert_eq!(hits.len(), 1);
        let misses = service.search_chats("alice", "python").unwrap();
        assert!(misses.is_empty());
    }
}
