//! Answer returned to the caller and its JSON-line rendering.

use serde::Serialize;

use crate::models::conversation::ConversationId;
use crate::AppError;

/// Cleaned answer text plus the conversation id to use on the next turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    /// Normalised answer text.
    pub text: String,
    /// Identifier assigned by the helper for the next turn, if any.
    pub conversation_id: Option<ConversationId>,
}

/// One line of JSON printed by the CLI: either an answer or an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum BridgeReply {
    /// Successful query.
    Answer {
        /// Normalised answer text.
        answer: String,
        /// Next-turn conversation id; serialised as `null` when absent.
        conversation_id: Option<ConversationId>,
    },
    /// Failed query or invocation.
    Error {
        /// Human-readable failure description.
        error: String,
    },
}

impl BridgeReply {
    /// Reply printed when no question was supplied.
    #[must_use]
    pub fn missing_query() -> Self {
        Self::Error {
            error: "No query provided".into(),
        }
    }

    /// Render as a single JSON line (no trailing newline).
    ///
    /// Non-ASCII text is emitted as-is rather than `\u` escaped.
    #[must_use]
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|err| {
            let detail = err.to_string().replace('"', "'");
            format!("{{\"error\":\"failed to render reply: {detail}\"}}")
        })
    }
}

impl From<Answer> for BridgeReply {
    fn from(answer: Answer) -> Self {
        Self::Answer {
            answer: answer.text,
            conversation_id: answer.conversation_id,
        }
    }
}

impl From<AppError> for BridgeReply {
    fn from(err: AppError) -> Self {
        Self::Error {
            error: err.to_string(),
        }
    }
}
