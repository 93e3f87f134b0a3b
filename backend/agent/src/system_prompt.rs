//! Prompt assembly for the main reply.

use chatrelay_core::{ChatTurn, ConversationWindow, LlmRequest, Role};

use crate::orchestrator::TurnSettings;

pub struct PromptBuilder;

impl PromptBuilder {
    /// `[system prompt] + window as role-tagged turns + [user: current text]`.
    pub fn build(settings: &TurnSettings, window: &ConversationWindow, current_text: &str) -> LlmRequest {
        let mut turns: Vec<ChatTurn> = window
            .messages
            .iter()
            .filter(|m| !m.text.trim().is_empty())
            .map(ChatTurn::from)
            .collect();
        turns.push(ChatTurn::new(Role::User, current_text));

        LlmRequest {
            model: settings.model.clone(),
            system_prompt: settings.system_prompt.clone(),
            turns,
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatrelay_core::ChatMessage;

    #[test]
    fn test_empty_window_is_system_plus_user() {
        let settings = TurnSettings::default();
        let request = PromptBuilder::build(&settings, &ConversationWindow::default(), "Hello");
        assert_eq!(request.system_prompt, settings.system_prompt);
        assert_eq!(request.turns, vec![ChatTurn::new(Role::User, "Hello")]);
        assert_eq!(request.max_tokens, settings.max_tokens);
    }

    #[test]
    fn test_window_turns_keep_roles_and_order() {
        let window = ConversationWindow {
            messages: vec![
                ChatMessage::system("Summary: they ordered pizza"),
                ChatMessage::user("is it ready?"),
                ChatMessage::assistant("almost"),
            ],
            summarized: true,
        };
        let request = PromptBuilder::build(&TurnSettings::default(), &window, "thanks");
        let roles: Vec<_> = request.turns.iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
        assert_eq!(request.turns[0].content, "Summary: they ordered pizza");
        assert_eq!(request.turns[3].content, "thanks");
    }

    #[test]
    fn test_blank_history_entries_are_skipped() {
        let window = ConversationWindow::raw(vec![ChatMessage::user("  "), ChatMessage::user("hi")]);
        let request = PromptBuilder::build(&TurnSettings::default(), &window, "again");
        assert_eq!(request.turns.len(), 2);
    }
}
