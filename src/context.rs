//! Conversation Context
//!
//! Append-only log of question/answer turns, scoped to one session. Prompt
//! conditioning reads a bounded window of recent turns; export always returns
//! the full untruncated log.

use crate::router::QuestionCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One completed question/answer exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub question: String,
    pub category: QuestionCategory,
    pub answer: String,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ConversationContext {
    turns: Vec<ConversationTurn>,
    /// Upper bound on how many recent turns conditioning may see.
    window: usize,
}

impl ConversationContext {
    pub fn new(window: usize) -> Self {
        Self {
            turns: Vec::new(),
            window,
        }
    }

    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    /// The last `n` turns in chronological order, additionally capped by the
    /// conditioning window so prompt size stays bounded.
    pub fn recent_turns(&self, n: usize) -> &[ConversationTurn] {
        let take = n.min(self.window).min(self.turns.len());
        &self.turns[self.turns.len() - take..]
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Serialize the full ordered log, ignoring the conditioning window.
    pub fn export(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.turns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(question: &str) -> ConversationTurn {
        ConversationTurn {
            question: question.to_string(),
            category: QuestionCategory::Overview,
            answer: format!("answer to {}", question),
            confidence: 0.8,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn recent_turns_are_chronological_and_bounded() {
        let mut context = ConversationContext::new(3);
        for i in 0..5 {
            context.append(turn(&format!("q{}", i)));
        }
        let recent = context.recent_turns(10);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].question, "q2");
        assert_eq!(recent[2].question, "q4");
    }

    #[test]
    fn export_returns_full_log_despite_window() {
        let mut context = ConversationContext::new(2);
        for i in 0..6 {
            context.append(turn(&format!("q{}", i)));
        }
        let exported = context.export().unwrap();
        let parsed: Vec<ConversationTurn> = serde_json::from_str(&exported).unwrap();
        assert_eq!(parsed.len(), 6);
        assert_eq!(parsed[0].question, "q0");
    }

    #[test]
    fn clear_resets_the_log() {
        let mut context = ConversationContext::new(2);
        context.append(turn("q"));
        context.clear();
        assert!(context.is_empty());
    }
}
