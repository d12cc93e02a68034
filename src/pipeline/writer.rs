use super::ordering::OrderingBasis;
use super::segmenter::Flush;
use crate::db::Database;
use rusqlite::Result;

/// Persists one streaming turn under a single message id: insert on the
/// first flush, content overwrite on each later one, finalize at the end.
/// Calls are strictly sequential; every write targets the same row.
pub struct TurnWriter<'a> {
    db: &'a Database,
    turn_id: String,
    chat_id: String,
    owner_id: String,
    basis: OrderingBasis,
    inserted: bool,
}

impl<'a> TurnWriter<'a> {
    pub fn new(db: &'a Database, chat_id: &str, owner_id: &str, basis: OrderingBasis) -> Self {
        Self {
            db,
            turn_id: uuid::Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            owner_id: owner_id.to_string(),
            basis,
            inserted: false,
        }
    }

    pub fn turn_id(&self) -> &str {
        &self.turn_id
    }

    /// A mid-stream flush: first one inserts the row (created_at from the
    /// ordering basis), later ones overwrite its content.
    pub fn flush(&mut self, event: &Flush) -> Result<()> {
        if self.inserted {
            self.db.update_message_content(&self.turn_id, &event.content)
        } else {
            self.db.insert_assistant_message(
                &self.turn_id,
                &self.chat_id,
                &self.owner_id,
                &event.content,
                false,
                self.basis.created_at(),
            )?;
            self.inserted = true;
            Ok(())
        }
    }

    /// The terminal write. When nothing was inserted yet the whole response
    /// fit under one boundary, so a single combined write records the
    /// already-finished message directly.
    pub fn finish(&mut self, event: &Flush) -> Result<()> {
        if self.inserted {
            self.db.finalize_message(&self.turn_id, &event.content)
        } else {
            self.db.insert_assistant_message(
                &self.turn_id,
                &self.chat_id,
                &self.owner_id,
                &event.content,
                true,
                self.basis.created_at(),
            )?;
            self.inserted = true;
            Ok(())
        }
    }

    pub fn touch_chat(&self) -> Result<()> {
        self.db.touch_chat(&self.chat_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flush(content: &str, paragraph: usize, is_final: bool) -> Flush {
        Flush {
            content: content.to_string(),
            paragraph,
            is_final,
        }
    }

    #[test]
    fn insert_then_update_then_finalize_targets_one_row() {
        let db = Database::in_memory().unwrap();
        let chat = db.create_chat("alice", "new chat").unwrap();
        let mut writer = TurnWriter::new(&db, &chat.id, "alice", OrderingBasis::Now);

        writer.flush(&flush("para one\n\n", 1, false)).unwrap();
        writer
            .flush(&flush("para one\n\npara two\n\n", 2, false))
            .unwrap();
        writer
            .finish(&flush("para one\n\npara two\n\ntail", 2, true))
            .unwrap();

        let messages = db.get_messages(&chat.id).unwrap();
        assert_eq!(messages.len(), 1);
        let msg = &messages[0];
        assert_eq!(msg.id, writer.turn_id());
        assert_eq!(msg.content, "para one\n\npara two\n\ntail");
        assert!(msg.is_complete);
        assert_eq!(msg.role, "assistant");
    }

    #[test]
    fn row_is_in_progress_until_finished() {
        let db = Database::in_memory().unwrap();
        let chat = db.create_chat("alice", "new chat").unwrap();
        let mut writer = TurnWriter::new(&db, &chat.id, "alice", OrderingBasis::Now);

        writer.flush(&flush("para one\n\n", 1, false)).unwrap();
        let msg = db.get_message(writer.turn_id()).unwrap().unwrap();
        assert!(!msg.is_complete);
        assert_eq!(msg.content, "para one\n\n");
    }

    #[test]
    fn short_turn_is_one_combined_complete_insert() {
        let db = Database::in_memory().unwrap();
        let chat = db.create_chat("alice", "new chat").unwrap();
        let mut writer = TurnWriter::new(&db, &chat.id, "alice", OrderingBasis::Now);

        writer.finish(&flush("short reply", 0, true)).unwrap();

        let messages = db.get_messages(&chat.id).unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_complete);
        assert_eq!(messages[0].content, "short reply");
    }

    #[test]
    fn first_insert_uses_ordering_basis() {
        let db = Database::in_memory().unwrap();
        let chat = db.create_chat("alice", "new chat").unwrap();
        let prompt = db.add_message(&chat.id, "alice", "user", "hello").unwrap();

        let basis = OrderingBasis::resolve(&db, &chat.id).unwrap();
        let mut writer = TurnWriter::new(&db, &chat.id, "alice", basis);
        writer.flush(&flush("reply\n\n", 1, false)).unwrap();

        let msg = db.get_message(writer.turn_id()).unwrap().unwrap();
        assert!(msg.created_at > prompt.created_at);
    }
}
