//! Conversation history storage: an append-only message log per conversation
//! plus one rolling summary record.

pub mod sqlite_store;
pub mod store;

pub use sqlite_store::SqliteHistoryStore;
pub use store::{HistoryStore, InMemoryHistoryStore};
