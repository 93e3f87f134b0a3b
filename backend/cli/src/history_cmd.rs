//! CLI History Command
//!
//! Prints a stored conversation, or lists known conversations.

use anyhow::Result;

use chatrelay_config::{RelayConfig, StorageBackend};
use chatrelay_memory::HistoryStore;

use crate::runtime;
use crate::terminal_output::{note_info, note_warn, render_history, render_table, supports_color};

pub async fn run(config: &RelayConfig, conversation: Option<&str>, limit: usize) -> Result<()> {
    if config.storage.backend == StorageBackend::Memory {
        note_warn("storage.backend is 'memory'; no history outlives the server process");
        return Ok(());
    }
    let store = runtime::open_sqlite(config)?;

    let Some(conversation) = conversation else {
        let ids = store.list_conversations().await?;
        if ids.is_empty() {
            note_info("No conversations stored yet");
            return Ok(());
        }
        let rows: Vec<Vec<String>> = ids.into_iter().map(|id| vec![id]).collect();
        print!("{}", render_table(&["CONVERSATION"], &rows));
        return Ok(());
    };

    let messages = store.fetch_recent(conversation, limit).await?;
    let summary = store.get_summary(conversation).await?;
    print!(
        "{}",
        render_history(&messages, summary.as_ref(), supports_color())
    );
    Ok(())
}
