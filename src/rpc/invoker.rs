//! Single `tools/call` exchange.
//!
//! Sends the notebook query tool call (id 2) and reads until its response:
//!
//! - `error` → [`AppError::ToolError`] with the payload as JSON text.
//! - `result` → the text of every `"text"` content block, concatenated in
//!   order, plus the conversation id the helper assigned for the next turn.
//!
//! End of stream first is [`AppError::StreamClosedDuringCall`]; no partial
//! answer is produced.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::models::conversation::ConversationId;
use crate::models::query::Query;
use crate::rpc::channel::{within, RpcChannel};
use crate::rpc::envelope::{
    NotebookQueryArgs, RpcOutcome, RpcRequest, ToolCallParams, ToolResult, TOOL_CALL_ID,
};
use crate::{AppError, Result};

/// Method name of a tool invocation.
pub const TOOL_CALL_METHOD: &str = "tools/call";

/// Everything needed to build the tool-call request.
#[derive(Debug, Clone)]
pub struct ToolCall<'a> {
    /// Tool to invoke.
    pub tool_name: &'a str,
    /// Notebook to query.
    pub notebook_id: &'a str,
    /// Persona-wrapped question text.
    pub query: String,
    /// Conversation to continue, forwarded unmodified.
    pub conversation_id: Option<&'a ConversationId>,
}

impl<'a> ToolCall<'a> {
    /// Build the call for `query` using the configured tool, notebook and
    /// persona.
    #[must_use]
    pub fn for_query(config: &'a BridgeConfig, query: &'a Query) -> Self {
        Self {
            tool_name: &config.tool_name,
            notebook_id: &config.notebook_id,
            query: query.wrapped_text(&config.persona),
            conversation_id: query.conversation_id(),
        }
    }

    fn request(&self) -> RpcRequest<ToolCallParams<'_>> {
        RpcRequest::new(
            TOOL_CALL_ID,
            TOOL_CALL_METHOD,
            ToolCallParams {
                name: self.tool_name,
                arguments: NotebookQueryArgs {
                    notebook_id: self.notebook_id,
                    query: &self.query,
                    conversation_id: self.conversation_id,
                },
            },
        )
    }
}

/// Raw tool output before normalisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Concatenated text blocks.
    pub text: String,
    /// Conversation id assigned by the helper, if any.
    pub conversation_id: Option<ConversationId>,
}

/// Send `call` on a handshaken `channel` and wait for its response.
///
/// # Errors
///
/// - [`AppError::ToolError`]: the helper answered with an `error` member.
/// - [`AppError::Rpc`]: the `result` member is not a JSON object.
/// - [`AppError::StreamClosedDuringCall`]: stdout closed first. The
///   `stderr` field is left empty for the caller to fill.
/// - [`AppError::Timeout`]: `timeout` elapsed.
/// - [`AppError::Io`] / [`AppError::Rpc`]: writing to the helper failed.
pub async fn invoke<W, R>(
    channel: &mut RpcChannel<W, R>,
    call: &ToolCall<'_>,
    timeout: Option<Duration>,
) -> Result<ToolOutput>
where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    within(timeout, "tool call", exchange(channel, call)).await
}

async fn exchange<W, R>(channel: &mut RpcChannel<W, R>, call: &ToolCall<'_>) -> Result<ToolOutput>
where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    channel.send(&call.request()).await?;
    debug!(
        tool = call.tool_name,
        continuing = call.conversation_id.is_some(),
        "invoker: tool call sent"
    );

    let Some(response) = channel.wait_for_response(TOOL_CALL_ID).await? else {
        return Err(AppError::StreamClosedDuringCall {
            stderr: String::new(),
        });
    };

    match response.outcome {
        RpcOutcome::Error(error) => {
            warn!(%error, "invoker: tool reported an error");
            Err(AppError::ToolError(error.to_string()))
        }
        RpcOutcome::Result(result) => {
            let result = ToolResult::from_result(result).inspect_err(|err| {
                warn!(error = %err, "invoker: unusable tool result");
            })?;
            let output = ToolOutput {
                text: result.joined_text(),
                conversation_id: result.conversation_id(),
            };
            info!(
                chars = output.text.chars().count(),
                conversation_assigned = output.conversation_id.is_some(),
                "invoker: tool result received"
            );
            Ok(output)
        }
    }
}
