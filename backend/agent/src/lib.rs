//! ChatRelay conversation engine
//!
//! Window management and summarization, prompt building, the per-turn
//! orchestrator, and the per-conversation mailbox that serializes turns.

pub mod context_window;
pub mod mailbox;
pub mod orchestrator;
pub mod system_prompt;

pub use context_window::{WindowManager, WindowPolicy, SUMMARY_LABEL};
pub use mailbox::ConversationMailbox;
pub use orchestrator::{ConversationOrchestrator, TurnSettings, DEFAULT_FALLBACK_REPLY};
pub use system_prompt::PromptBuilder;
