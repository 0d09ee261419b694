use std::collections::VecDeque;

use crate::llm::prompt;
use crate::llm::types::ChatMessage;

struct Turn {
    image_png: Vec<u8>,
    decision: String,
}

/// System prompt plus a bounded deque of (screenshot, decision) turns.
///
/// The system prompt is never evicted. Only the newest `history_images`
/// turns are replayed with their screenshot.
pub struct ConversationWindow {
    system: ChatMessage,
    turns: VecDeque<Turn>,
    max_turns: usize,
    history_images: usize,
}

impl ConversationWindow {
    pub fn new(system_prompt: String, max_turns: usize, history_images: usize) -> Self {
        Self {
            system: ChatMessage::system(system_prompt),
            turns: VecDeque::with_capacity(max_turns),
            max_turns,
            history_images,
        }
    }

    /// Context for the next request, oldest first. The current screenshot
    /// is appended by the decision service.
    pub fn messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(1 + self.turns.len() * 2);
        messages.push(self.system.clone());
        let first_with_image = self.turns.len().saturating_sub(self.history_images);
        for (i, turn) in self.turns.iter().enumerate() {
            if i >= first_with_image {
                messages.push(prompt::user_turn(&turn.image_png));
            } else {
                messages.push(prompt::placeholder_turn());
            }
            messages.push(ChatMessage::assistant(turn.decision.clone()));
        }
        messages
    }

    pub fn record(&mut self, image_png: Vec<u8>, decision: String) {
        if self.max_turns == 0 {
            return;
        }
        while self.turns.len() >= self.max_turns {
            self.turns.pop_front();
        }
        self.turns.push_back(Turn {
            image_png,
            decision,
        });
    }

    /// Drop every turn, keeping the system prompt.
    pub fn reset(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oldest_turns_are_evicted_instruction_kept() {
        let mut window = ConversationWindow::new("goal".into(), 3, 2);
        for i in 0..5u8 {
            window.record(vec![i], format!("decision {i}"));
        }
        assert_eq!(window.len(), 3);

        let messages = window.messages();
        assert_eq!(messages.len(), 7);
        assert_eq!(messages[0].role, "system");
        let json = serde_json::to_value(&messages[2]).unwrap();
        assert_eq!(json["content"], "decision 2");
        let json = serde_json::to_value(&messages[6]).unwrap();
        assert_eq!(json["content"], "decision 4");
    }

    #[test]
    fn only_recent_turns_keep_screenshots() {
        let mut window = ConversationWindow::new("goal".into(), 10, 2);
        for i in 0..4u8 {
            window.record(vec![i], "{}".into());
        }
        let with_image: Vec<bool> = window
            .messages()
            .iter()
            .filter(|m| m.role == "user")
            .map(ChatMessage::has_image)
            .collect();
        assert_eq!(with_image, vec![false, false, true, true]);
    }

    #[test]
    fn reset_keeps_system_prompt() {
        let mut window = ConversationWindow::new("goal".into(), 10, 2);
        window.record(vec![1], "{}".into());
        window.reset();
        assert!(window.is_empty());
        assert_eq!(window.messages().len(), 1);
    }
}
