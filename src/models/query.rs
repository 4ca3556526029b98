//! Caller-side question model.

use crate::models::conversation::ConversationId;

/// Instructional preamble prepended to every question before transmission.
///
/// Shapes the helper's answers into the voice of an R&D accounting and tax
/// consultant. Overridable through [`BridgeConfig::persona`](crate::config::BridgeConfig::persona).
pub const DEFAULT_PERSONA: &str = "\
Answer as a professional consultant on R&D accounting and taxation.
Your tone: practical, expert, focused on solving the problem.
Use a clear structure: headings (###), lists and paragraphs.
IMPORTANT:
1. Do not put reference markers such as [1], [2] in the text itself.
2. Give practical advice (\"What to do\").
3. If the question concerns taxes, mention the risks or the available incentives.
4. If the user asks a follow-up question, answer in the context of the previous dialogue.

User request:
";

/// A single natural-language question, optionally continuing a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    text: String,
    conversation_id: Option<ConversationId>,
}

impl Query {
    /// Start a fresh conversation with `text`.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            conversation_id: None,
        }
    }

    /// Continue the conversation identified by `conversation_id`.
    #[must_use]
    pub fn with_conversation(mut self, conversation_id: Option<ConversationId>) -> Self {
        self.conversation_id = conversation_id;
        self
    }

    /// The question exactly as asked.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Conversation to continue, if any.
    #[must_use]
    pub fn conversation_id(&self) -> Option<&ConversationId> {
        self.conversation_id.as_ref()
    }

    /// Question text with `persona` prepended, as sent to the helper.
    #[must_use]
    pub fn wrapped_text(&self, persona: &str) -> String {
        let mut wrapped = String::with_capacity(persona.len() + self.text.len());
        wrapped.push_str(persona);
        wrapped.push_str(&self.text);
        wrapped
    }
}
