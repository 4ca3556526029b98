//! JSON-RPC message shapes exchanged with the helper.
//!
//! | Direction | Method                      | id | Params                                  |
//! |-----------|-----------------------------|----|-----------------------------------------|
//! | out       | `initialize`                | 1  | protocol version, capabilities, client  |
//! | out       | `notifications/initialized` | –  | `{}`                                    |
//! | out       | `tools/call`                | 2  | `{ name, arguments }`                   |
//! | in        | response                    | 1  | handshake acknowledgment                |
//! | in        | response                    | 2  | `{ result: { content, … } }` or `error` |

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::conversation::ConversationId;
use crate::{AppError, Result};

/// Protocol version tag carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Request id of `initialize`.
pub const INITIALIZE_ID: u64 = 1;

/// Request id of the single `tools/call`.
pub const TOOL_CALL_ID: u64 = 2;

// ── Outbound ──────────────────────────────────────────────────────────────────

/// Request expecting a response with the same `id`.
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest<P> {
    /// Always [`JSONRPC_VERSION`].
    pub jsonrpc: &'static str,
    /// Correlation id, unique within one helper process.
    pub id: u64,
    /// Method name.
    pub method: &'static str,
    /// Method parameters.
    pub params: P,
}

impl<P: Serialize> RpcRequest<P> {
    /// Build a request for `method` with correlation `id`.
    #[must_use]
    pub fn new(id: u64, method: &'static str, params: P) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        }
    }
}

/// One-way message; the helper sends nothing back.
#[derive(Debug, Clone, Serialize)]
pub struct RpcNotification<P> {
    /// Always [`JSONRPC_VERSION`].
    pub jsonrpc: &'static str,
    /// Method name.
    pub method: &'static str,
    /// Method parameters.
    pub params: P,
}

impl<P: Serialize> RpcNotification<P> {
    /// Build a notification for `method`.
    #[must_use]
    pub fn new(method: &'static str, params: P) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
        }
    }
}

/// `initialize` parameters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams<'a> {
    /// Protocol revision the bridge speaks.
    pub protocol_version: &'a str,
    /// Always an empty object: the bridge offers no client capabilities.
    pub capabilities: serde_json::Map<String, Value>,
    /// Bridge identity.
    pub client_info: ClientInfo<'a>,
}

/// Client identity announced during the handshake.
#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo<'a> {
    /// Client name.
    pub name: &'a str,
    /// Client version.
    pub version: &'a str,
}

/// `tools/call` parameters.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallParams<'a> {
    /// Tool to run.
    pub name: &'a str,
    /// Tool arguments.
    pub arguments: NotebookQueryArgs<'a>,
}

/// Arguments of the notebook query tool.
#[derive(Debug, Clone, Serialize)]
pub struct NotebookQueryArgs<'a> {
    /// Notebook to query.
    pub notebook_id: &'a str,
    /// Persona-wrapped question.
    pub query: &'a str,
    /// Conversation to continue; omitted entirely for a fresh conversation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<&'a ConversationId>,
}

// ── Inbound ───────────────────────────────────────────────────────────────────

/// Parsed response line from the helper.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    /// Correlation id of the request being answered.
    pub id: u64,
    /// Result payload or error payload.
    pub outcome: RpcOutcome,
}

/// Success or failure half of a response.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcOutcome {
    /// `result` member.
    Result(Value),
    /// `error` member.
    Error(Value),
}

/// Wire shape before the `result`/`error` split is enforced. A JSON `null`
/// member deserialises as `None`.
#[derive(Debug, Deserialize)]
struct RawResponse {
    id: Option<Value>,
    result: Option<Value>,
    error: Option<Value>,
}

/// Text-bearing payload of a successful tool call.
///
/// Content blocks stay raw JSON: a block of unexpected shape is skipped on
/// its own and never affects the other blocks or the conversation id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolResult {
    content: Vec<Value>,
    conversation_id: Option<Value>,
}

impl ToolResult {
    /// Split a `tools/call` result into content blocks and conversation id.
    ///
    /// A missing or non-array `content` yields no blocks.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Rpc`] when `result` is not a JSON object.
    pub fn from_result(result: Value) -> Result<Self> {
        let mut fields = match result {
            Value::Object(fields) => fields,
            other => {
                return Err(AppError::Rpc(format!(
                    "tool result is not an object: {other}"
                )))
            }
        };

        let content = match fields.remove("content") {
            Some(Value::Array(blocks)) => blocks,
            _ => Vec::new(),
        };

        Ok(Self {
            content,
            conversation_id: fields.remove("conversation_id"),
        })
    }

    /// Concatenate the string `text` of every `"text"` block, in order.
    #[must_use]
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect()
    }

    /// Next-turn conversation id, if the helper assigned one.
    #[must_use]
    pub fn conversation_id(&self) -> Option<ConversationId> {
        match self.conversation_id.as_ref()? {
            Value::String(id) => ConversationId::parse(id.as_str()),
            Value::Number(id) => ConversationId::parse(id.to_string()),
            _ => None,
        }
    }
}

/// Parse one line of helper stdout.
///
/// # Return value
///
/// - `Ok(Some(response))`: a response carrying a numeric `id` and exactly
///   one of `result` / `error`.
/// - `Ok(None)`: a blank line, or well-formed JSON without an `id` (helper
///   notifications such as log messages).
/// - `Err(AppError::MalformedLine(…))`: anything else. The helper shares
///   stdout between protocol traffic and incidental output, so callers treat
///   this as noise to skip, not as a protocol failure.
///
/// # Errors
///
/// See above; the only error variant is [`AppError::MalformedLine`].
pub fn parse_response_line(line: &str) -> Result<Option<RpcResponse>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(trimmed)
        .map_err(|e| AppError::MalformedLine(format!("not json: {e}")))?;
    if !value.is_object() {
        return Err(AppError::MalformedLine("not a json object".into()));
    }
    let raw: RawResponse = serde_json::from_value(value)
        .map_err(|e| AppError::MalformedLine(format!("unexpected response shape: {e}")))?;

    let Some(id) = raw.id else {
        return Ok(None);
    };
    let id = id
        .as_u64()
        .ok_or_else(|| AppError::MalformedLine(format!("non-numeric id: {id}")))?;

    let outcome = match (raw.result, raw.error) {
        (_, Some(error)) => RpcOutcome::Error(error),
        (Some(result), None) => RpcOutcome::Result(result),
        (None, None) => {
            return Err(AppError::MalformedLine(format!(
                "response {id} has neither result nor error"
            )))
        }
    };

    Ok(Some(RpcResponse { id, outcome }))
}
