//! Chat backend with streaming LLM replies.
//!
//! A reply streams to the client fragment by fragment while being persisted
//! incrementally: the first paragraph inserts the message row, each later
//! paragraph overwrites it with the content so far, and stream end finalizes
//! it. Creation timestamps are based on the triggering user message so
//! replies always sort after their prompt.

pub mod chat;
pub mod db;
pub mod llm;
pub mod pipeline;

pub use chat::ChatService;
pub use db::Database;
pub use llm::Provider;
pub use pipeline::TurnError;
