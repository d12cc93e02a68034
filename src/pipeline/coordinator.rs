use super::forwarder::ClientForwarder;
use super::ordering::OrderingBasis;
use super::segmenter::{FinishEvent, ParagraphSegmenter};
use super::writer::TurnWriter;
use super::{ActiveTurns, TurnError, TurnGuard};
use crate::chat::{derive_title, DEFAULT_CHAT_TITLE};
use crate::db::models::{Chat, Message, ShareMode};
use crate::db::Database;
use crate::llm::LlmError;
use futures::channel::mpsc;
use futures::{Stream, StreamExt};
use log::{debug, warn};

/// One assistant reply, from validation through finalize or failure.
///
/// `begin` validates and prepares the turn without opening a stream;
/// `run` drives the fragment loop and issues every persistence write.
pub struct Turn<'a> {
    db: &'a Database,
    chat: Chat,
    writer: TurnWriter<'a>,
    _guard: TurnGuard<'a>,
}

impl<'a> Turn<'a> {
    /// Validates the request and prepares turn state. Rejects missing chats,
    /// read-only shares, and chats that already have a reply in flight;
    /// none of these leave any partial state behind. Derives the chat title
    /// from the first user message while it still carries the placeholder,
    /// and bumps the chat's updated_at either way.
    pub fn begin(
        db: &'a Database,
        turns: &'a ActiveTurns,
        chat_id: &str,
    ) -> Result<Self, TurnError> {
        let chat = db.get_chat(chat_id)?.ok_or(TurnError::NotFound)?;
        if chat.is_shared && chat.share_mode == Some(ShareMode::Read) {
            return Err(TurnError::Permission);
        }
        let guard = turns.acquire(chat_id)?;

        if chat.title == DEFAULT_CHAT_TITLE {
            match db.first_user_message(chat_id)? {
                Some(first) => {
                    let title = derive_title(&first);
                    debug!("chat {chat_id}: deriving title {title:?}");
                    db.update_chat_title(chat_id, &title)?;
                }
                None => db.touch_chat(chat_id)?,
            }
        } else {
            db.touch_chat(chat_id)?;
        }

        let basis = OrderingBasis::resolve(db, chat_id)?;
        let writer = TurnWriter::new(db, chat_id, &chat.user_id, basis);
        Ok(Self {
            db,
            chat,
            writer,
            _guard: guard,
        })
    }

    /// Id of the message row this turn writes to.
    pub fn turn_id(&self) -> &str {
        self.writer.turn_id()
    }

    pub fn chat(&self) -> &Chat {
        &self.chat
    }

    /// Drives the turn: each fragment goes to the client first, then into
    /// the segmenter, whose flushes become sequential storage writes. On
    /// exhaustion the finish event is routed to the terminal write and the
    /// chat is touched once more.
    ///
    /// Upstream or storage failure aborts mid-loop; rows already written
    /// stay persisted and non-final. An observed client disconnect stops
    /// the loop before any further write is issued. Returns the persisted
    /// message, or `None` when the source produced no text.
    pub async fn run<S>(
        mut self,
        mut source: S,
        out: mpsc::Sender<String>,
    ) -> Result<Option<Message>, TurnError>
    where
        S: Stream<Item = Result<String, LlmError>> + Unpin,
    {
        let mut forwarder = ClientForwarder::new(out);
        let mut segmenter = ParagraphSegmenter::new();

        while let Some(next) = source.next().await {
            let fragment = next?;
            if !forwarder.forward(&fragment).await {
                return Err(TurnError::Disconnected);
            }
            if let Some(flush) = segmenter.feed(&fragment) {
                self.writer.flush(&flush)?;
            }
        }

        match segmenter.finish() {
            FinishEvent::Flush(event) => self.writer.finish(&event)?,
            FinishEvent::NoContent => {
                debug!("chat {}: completion produced no content", self.chat.id);
            }
        }

        // The message row is the primary durable artifact; a failed bump of
        // the parent chat's timestamp is not worth failing the turn over.
        if let Err(e) = self.writer.touch_chat() {
            warn!("chat {}: failed to bump updated_at: {e}", self.chat.id);
        }

        Ok(self.db.get_message(self.writer.turn_id())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_rejects_missing_chat() {
        let db = Database::in_memory().unwrap();
        let turns = ActiveTurns::new();
        assert!(matches!(
            Turn::begin(&db, &turns, "no-such-chat"),
            Err(TurnError::NotFound)
        ));
    }

    #[test]
    fn begin_rejects_read_only_share() {
        let db = Database::in_memory().unwrap();
        let turns = ActiveTurns::new();
        let chat = db.create_chat("alice", "new chat").unwrap();
        db.update_chat_sharing(&chat.id, true, Some(ShareMode::Read))
            .unwrap();
        assert!(matches!(
            Turn::begin(&db, &turns, &chat.id),
            Err(TurnError::Permission)
        ));
    }

    #[test]
    fn begin_allows_writable_share() {
        let db = Database::in_memory().unwrap();
        let turns = ActiveTurns::new();
        let chat = db.create_chat("alice", "new chat").unwrap();
        db.update_chat_sharing(&chat.id, true, Some(ShareMode::Write))
            .unwrap();
        assert!(Turn::begin(&db, &turns, &chat.id).is_ok());
    }

    #[test]
    fn begin_rejects_second_turn_on_same_chat() {
        let db = Database::in_memory().unwrap();
        let turns = ActiveTurns::new();
        let chat = db.create_chat("alice", "new chat").unwrap();
        let first = Turn::begin(&db, &turns, &chat.id).unwrap();
        assert!(matches!(
            Turn::begin(&db, &turns, &chat.id),
            Err(TurnError::Conflict)
        ));
        drop(first);
        assert!(Turn::begin(&db, &turns, &chat.id).is_ok());
    }

    #[test]
    fn begin_derives_title_from_first_user_message() {
        let db = Database::in_memory().unwrap();
        let turns = ActiveTurns::new();
        let chat = db.create_chat("alice", DEFAULT_CHAT_TITLE).unwrap();
        db.add_message(&chat.id, "alice", "user", "borrowck question")
            .unwrap();

        let _turn = Turn::begin(&db, &turns, &chat.id).unwrap();
        let renamed = db.get_chat(&chat.id).unwrap().unwrap();
        assert_eq!(renamed.title, "borrowck");
    }

    #[test]
    fn begin_keeps_custom_title() {
        let db = Database::in_memory().unwrap();
        let turns = ActiveTurns::new();
        let chat = db.create_chat("alice", "my notes").unwrap();
        db.add_message(&chat.id, "alice", "user", "hello").unwrap();

        let _turn = Turn::begin(&db, &turns, &chat.id).unwrap();
        let fetched = db.get_chat(&chat.id).unwrap().unwrap();
        assert_eq!(fetched.title, "my notes");
    }
}
