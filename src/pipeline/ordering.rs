use crate::db::Database;
use rusqlite::Result;

/// Creation-time basis for the assistant message of one turn, resolved once
/// before the first write.
///
/// `After` is the latest user-message timestamp plus one second, which keeps
/// the reply sorting strictly after its prompt even when wall-clock writes
/// from different processes interleave. `Now` falls back to write-time "now"
/// for chats with no user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderingBasis {
    After(String),
    Now,
}

impl OrderingBasis {
    pub fn resolve(db: &Database, chat_id: &str) -> Result<Self> {
        Ok(match db.latest_user_message_basis(chat_id)? {
            Some(ts) => OrderingBasis::After(ts),
            None => OrderingBasis::Now,
        })
    }

    /// Explicit created_at for the first insert; `None` lets storage use
    /// its own "now".
    pub fn created_at(&self) -> Option<&str> {
        match self {
            OrderingBasis::After(ts) => Some(ts),
            OrderingBasis::Now => None,
        }
    }
}
