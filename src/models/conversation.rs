//! Conversation continuity token.
//!
//! The helper keeps multi-turn context keyed by an opaque identifier. The
//! bridge never interprets it: the caller passes the previous turn's id in,
//! the bridge forwards it verbatim, and the id assigned by the helper for the
//! new turn is handed back in the [`Answer`](crate::models::answer::Answer).

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Opaque conversation identifier owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Wrap a raw identifier.
    ///
    /// Returns `None` for empty or whitespace-only input, which callers use to
    /// mean "start a fresh conversation".
    #[must_use]
    pub fn parse(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// Borrow the identifier exactly as supplied.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ConversationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
