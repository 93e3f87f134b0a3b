pub mod error;
pub mod event;
pub mod message;
pub mod tokens;
pub mod traits;

pub use error::RelayError;
pub use event::{TurnOutcome, TurnStage};
pub use message::{ChatMessage, ConversationWindow, MessageHandle, Role, SummaryRecord};
pub use tokens::{CharRatioEstimator, TokenEstimator};
pub use traits::{ChatTurn, LlmProvider, LlmRequest, LlmResponse};
