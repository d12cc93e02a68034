use serde::{Deserialize, Serialize};

/// Visibility granted by a chat's share link.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ShareMode {
    Read,
    Write,
}

impl ShareMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShareMode::Read => "read",
            ShareMode::Write => "write",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "read" => Some(ShareMode::Read),
            "write" => Some(ShareMode::Write),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Chat {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub is_shared: bool,
    /// Only meaningful while `is_shared` is set.
    pub share_mode: Option<ShareMode>,
    /// Only meaningful while `is_shared` is set.
    pub share_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub user_id: String,
    pub role: String,
    pub content: String,
    pub is_complete: bool,
    pub created_at: String,
    pub updated_at: String,
}
