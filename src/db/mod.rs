pub mod models;

use models::{Chat, Message, ShareMode};
use rusqlite::{params, Connection, Result, Row};
use std::sync::Mutex;

pub struct Database {
    pub conn: Mutex<Connection>,
}

impl Database {
    pub fn new(app_dir: &std::path::Path) -> Result<Self> {
        std::fs::create_dir_all(app_dir).ok();
        let db_path = app_dir.join("chatflow.db");
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn)
    }

    /// In-memory database, used as the storage double in tests.
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA foreign_keys=ON;

            CREATE TABLE IF NOT EXISTS chats (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                is_shared INTEGER NOT NULL DEFAULT 0,
                share_mode TEXT CHECK (share_mode IN ('read', 'write')),
                share_id TEXT UNIQUE,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                chat_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                role TEXT NOT NULL CHECK (role IN ('user', 'assistant', 'system')),
                content TEXT NOT NULL,
                is_complete INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_messages_chat_created
                ON messages(chat_id, created_at);
            ",
        )?;
        Ok(())
    }

    // ── Chats ──

    pub fn create_chat(&self, user_id: &str, title: &str) -> Result<Chat> {
        let conn = self.conn.lock().unwrap();
        let id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO chats (id, user_id, title) VALUES (?1, ?2, ?3)",
            params![id, user_id, title],
        )?;
        conn.query_row(
            "SELECT id, user_id, title, is_shared, share_mode, share_id, created_at, updated_at
             FROM chats WHERE id = ?1",
            params![id],
            chat_from_row,
        )
    }

    pub fn get_chat(&self, id: &str) -> Result<Option<Chat>> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            "SELECT id, user_id, title, is_shared, share_mode, share_id, created_at, updated_at
             FROM chats WHERE id = ?1",
            params![id],
            chat_from_row,
        );
        match result {
            Ok(chat) => Ok(Some(chat)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn get_chat_by_share_id(&self, share_id: &str) -> Result<Option<Chat>> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            "SELECT id, user_id, title, is_shared, share_mode, share_id, created_at, updated_at
             FROM chats WHERE share_id = ?1",
            params![share_id],
            chat_from_row,
        );
        match result {
            Ok(chat) => Ok(Some(chat)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn list_chats(&self, user_id: &str) -> Result<Vec<Chat>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, title, is_shared, share_mode, share_id, created_at, updated_at
             FROM chats WHERE user_id = ?1 ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map(params![user_id], chat_from_row)?;
        rows.collect()
    }

    pub fn search_chats(&self, user_id: &str, query: &str) -> Result<Vec<Chat>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, title, is_shared, share_mode, share_id, created_at, updated_at
             FROM chats
             WHERE user_id = ?1 AND LOWER(title) LIKE '%' || LOWER(?2) || '%'
             ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map(params![user_id, query], chat_from_row)?;
        rows.collect()
    }

    pub fn delete_chat(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM chats WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn update_chat_title(&self, id: &str, title: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE chats SET title = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![title, id],
        )?;
        Ok(())
    }

    /// Enables or disables sharing. Enabling without an existing share id
    /// generates one; disabling clears both mode and share id.
    pub fn update_chat_sharing(
        &self,
        id: &str,
        is_shared: bool,
        share_mode: Option<ShareMode>,
    ) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let share_id = if is_shared {
            let existing: Option<String> = conn.query_row(
                "SELECT share_id FROM chats WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )?;
            Some(existing.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()))
        } else {
            None
        };
        conn.execute(
            "UPDATE chats SET is_shared = ?1, share_mode = ?2, share_id = ?3,
                    updated_at = datetime('now')
             WHERE id = ?4",
            params![
                is_shared,
                if is_shared {
                    share_mode.map(|m| m.as_str())
                } else {
                    None
                },
                share_id,
                id
            ],
        )?;
        Ok(share_id)
    }

    pub fn touch_chat(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE chats SET updated_at = datetime('now') WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    // ── Messages ──

    pub fn add_message(
        &self,
        chat_id: &str,
        user_id: &str,
        role: &str,
        content: &str,
    ) -> Result<Message> {
        let conn = self.conn.lock().unwrap();
        let id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO messages (id, chat_id, user_id, role, content, is_complete)
             VALUES (?1, ?2, ?3, ?4, ?5, 1)",
            params![id, chat_id, user_id, role, content],
        )?;
        // Touch chat updated_at
        conn.execute(
            "UPDATE chats SET updated_at = datetime('now') WHERE id = ?1",
            params![chat_id],
        )?;
        conn.query_row(
            "SELECT id, chat_id, user_id, role, content, is_complete, created_at, updated_at
             FROM messages WHERE id = ?1",
            params![id],
            message_from_row,
        )
    }

    pub fn get_messages(&self, chat_id: &str) -> Result<Vec<Message>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, chat_id, user_id, role, content, is_complete, created_at, updated_at
             FROM messages WHERE chat_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![chat_id], message_from_row)?;
        rows.collect()
    }

    pub fn get_message(&self, id: &str) -> Result<Option<Message>> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            "SELECT id, chat_id, user_id, role, content, is_complete, created_at, updated_at
             FROM messages WHERE id = ?1",
            params![id],
            message_from_row,
        );
        match result {
            Ok(msg) => Ok(Some(msg)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Content of the oldest user message in a chat, used to derive a title.
    pub fn first_user_message(&self, chat_id: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            "SELECT content FROM messages
             WHERE chat_id = ?1 AND role = 'user'
             ORDER BY created_at ASC LIMIT 1",
            params![chat_id],
            |row| row.get(0),
        );
        match result {
            Ok(content) => Ok(Some(content)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Latest user-message timestamp plus one second, the creation-time basis
    /// that keeps an assistant reply sorting strictly after its prompt.
    pub fn latest_user_message_basis(&self, chat_id: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            "SELECT datetime(created_at, '+1 second') FROM messages
             WHERE chat_id = ?1 AND role = 'user'
             ORDER BY created_at DESC LIMIT 1",
            params![chat_id],
            |row| row.get(0),
        );
        match result {
            Ok(ts) => Ok(Some(ts)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    // ── Streaming writes ──

    /// First write of a streaming turn. `created_at` falls back to write-time
    /// "now" when no ordering basis exists.
    pub fn insert_assistant_message(
        &self,
        id: &str,
        chat_id: &str,
        user_id: &str,
        content: &str,
        is_complete: bool,
        created_at: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO messages (id, chat_id, user_id, role, content, is_complete, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'assistant', ?4, ?5, COALESCE(?6, datetime('now')), datetime('now'))",
            params![id, chat_id, user_id, content, is_complete, created_at],
        )?;
        Ok(())
    }

    /// Overwrites content with the cumulative text so far. Leaves the
    /// completion flag and created_at untouched.
    pub fn update_message_content(&self, id: &str, content: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE messages SET content = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![content, id],
        )?;
        Ok(())
    }

    /// Terminal write for a message row: sets the final content and marks it
    /// complete. The flag is never unset afterwards.
    pub fn finalize_message(&self, id: &str, content: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE messages SET content = ?1, is_complete = 1, updated_at = datetime('now')
             WHERE id = ?2",
            params![content, id],
        )?;
        Ok(())
    }
}

fn chat_from_row(row: &Row) -> Result<Chat> {
    let share_mode: Option<String> = row.get(4)?;
    Ok(Chat {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        is_shared: row.get(3)?,
        share_mode: share_mode.as_deref().and_then(ShareMode::from_str),
        share_id: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn message_from_row(row: &Row) -> Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        user_id: row.get(2)?,
        role: row.get(3)?,
        content: row.get(4)?,
        is_complete: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}
