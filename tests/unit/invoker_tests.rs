//! Unit tests for the single `tools/call` exchange.

use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

use notebook_bridge::models::conversation::ConversationId;
use notebook_bridge::models::query::Query;
use notebook_bridge::rpc::channel::RpcChannel;
use notebook_bridge::rpc::invoker::{invoke, ToolCall, TOOL_CALL_METHOD};
use notebook_bridge::{AppError, BridgeConfig};

fn channel_pair() -> (RpcChannel<DuplexStream, DuplexStream>, DuplexStream, DuplexStream) {
    let (bridge_stdin, helper_stdin) = tokio::io::duplex(64 * 1024);
    let (helper_stdout, bridge_stdout) = tokio::io::duplex(64 * 1024);
    (
        RpcChannel::new(bridge_stdin, bridge_stdout),
        helper_stdin,
        helper_stdout,
    )
}

async fn first_sent(helper_stdin: DuplexStream) -> Value {
    let mut lines = BufReader::new(helper_stdin).lines();
    let line = lines
        .next_line()
        .await
        .expect("read sent line")
        .expect("a line must have been sent");
    serde_json::from_str(&line).expect("sent line must be JSON")
}

fn config() -> BridgeConfig {
    BridgeConfig {
        notebook_id: "nb-test".into(),
        persona: "PERSONA: ".into(),
        ..BridgeConfig::default()
    }
}

// ── Request ──────────────────────────────────────────────────────────────────

/// The request carries id 2, the tool name, the notebook id, the
/// persona-wrapped question and the caller's conversation id verbatim.
#[tokio::test]
async fn request_carries_wrapped_query_and_conversation_id() {
    let (mut channel, helper_stdin, mut helper_stdout) = channel_pair();
    let config = config();
    let query = Query::new("What changed in 2024?")
        .with_conversation(ConversationId::parse("abc123"));
    let call = ToolCall::for_query(&config, &query);

    helper_stdout
        .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{\"content\":[]}}\n")
        .await
        .expect("helper write");

    invoke(&mut channel, &call, None)
        .await
        .expect("call must succeed");
    drop(channel);

    let sent = first_sent(helper_stdin).await;
    assert_eq!(sent["id"], 2);
    assert_eq!(sent["method"], TOOL_CALL_METHOD);
    assert_eq!(sent["params"]["name"], "notebook_query");
    assert_eq!(sent["params"]["arguments"]["notebook_id"], "nb-test");
    assert_eq!(
        sent["params"]["arguments"]["query"],
        "PERSONA: What changed in 2024?"
    );
    assert_eq!(sent["params"]["arguments"]["conversation_id"], "abc123");
}

#[test]
fn fresh_query_has_no_conversation_id() {
    let config = config();
    let query = Query::new("hello");
    let call = ToolCall::for_query(&config, &query);

    assert!(call.conversation_id.is_none());
    assert_eq!(call.query, "PERSONA: hello");
}

// ── Response ─────────────────────────────────────────────────────────────────

/// Text blocks are concatenated in order and the assigned conversation id is
/// returned.
#[tokio::test]
async fn result_text_and_conversation_id_are_extracted() {
    let (mut channel, _helper_stdin, mut helper_stdout) = channel_pair();
    let config = config();
    let query = Query::new("q");
    let call = ToolCall::for_query(&config, &query);

    helper_stdout
        .write_all(
            concat!(
                "{\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{",
                "\"content\":[{\"type\":\"text\",\"text\":\"Hello \"},",
                "{\"type\":\"image\",\"data\":\"x\"},",
                "{\"type\":\"text\",\"text\":\"world\"}],",
                "\"conversation_id\":\"conv-1\"}}\n",
            )
            .as_bytes(),
        )
        .await
        .expect("helper write");

    let output = invoke(&mut channel, &call, None)
        .await
        .expect("call must succeed");

    assert_eq!(output.text, "Hello world");
    assert_eq!(output.conversation_id, ConversationId::parse("conv-1"));
}

/// Stray responses with other ids and log lines are skipped.
#[tokio::test]
async fn unrelated_lines_before_result_are_skipped() {
    let (mut channel, _helper_stdin, mut helper_stdout) = channel_pair();
    let config = config();
    let query = Query::new("q");
    let call = ToolCall::for_query(&config, &query);

    helper_stdout
        .write_all(
            concat!(
                "{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n",
                "querying notebook...\n",
                "{\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\",\"params\":{}}\n",
                "{\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{\"content\":[{\"type\":\"text\",\"text\":\"done\"}]}}\n",
            )
            .as_bytes(),
        )
        .await
        .expect("helper write");

    let output = invoke(&mut channel, &call, None)
        .await
        .expect("call must succeed");
    assert_eq!(output.text, "done");
    assert!(output.conversation_id.is_none());
}

/// A result that is not an object is a protocol error, not an empty answer.
#[tokio::test]
async fn non_object_result_is_rpc_error() {
    let (mut channel, _helper_stdin, mut helper_stdout) = channel_pair();
    let config = config();
    let query = Query::new("q");
    let call = ToolCall::for_query(&config, &query);

    helper_stdout
        .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"result\":\"plain string\"}\n")
        .await
        .expect("helper write");

    let result = invoke(&mut channel, &call, None).await;
    assert!(
        matches!(result, Err(AppError::Rpc(ref msg)) if msg.contains("not an object")),
        "expected AppError::Rpc, got: {result:?}"
    );
}

/// A malformed non-text block does not discard the text blocks or the
/// conversation id.
#[tokio::test]
async fn mixed_blocks_keep_text_and_conversation_id() {
    let (mut channel, _helper_stdin, mut helper_stdout) = channel_pair();
    let config = config();
    let query = Query::new("q");
    let call = ToolCall::for_query(&config, &query);

    helper_stdout
        .write_all(
            concat!(
                "{\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{",
                "\"content\":[{\"type\":\"text\",\"text\":\"Real answer\"},",
                "{\"type\":\"image\",\"text\":7}],",
                "\"conversation_id\":\"c9\"}}\n",
            )
            .as_bytes(),
        )
        .await
        .expect("helper write");

    let output = invoke(&mut channel, &call, None)
        .await
        .expect("call must succeed");
    assert_eq!(output.text, "Real answer");
    assert_eq!(output.conversation_id, ConversationId::parse("c9"));
}

#[tokio::test]
async fn error_response_is_tool_error() {
    let (mut channel, _helper_stdin, mut helper_stdout) = channel_pair();
    let config = config();
    let query = Query::new("q");
    let call = ToolCall::for_query(&config, &query);

    helper_stdout
        .write_all(
            b"{\"jsonrpc\":\"2.0\",\"id\":2,\"error\":{\"code\":-32000,\"message\":\"notebook not found\"}}\n",
        )
        .await
        .expect("helper write");

    let result = invoke(&mut channel, &call, None).await;
    match result {
        Err(AppError::ToolError(msg)) => {
            assert!(msg.contains("notebook not found"), "got: {msg}");
            assert!(msg.contains("-32000"), "error payload must be kept: {msg}");
        }
        other => panic!("expected ToolError, got: {other:?}"),
    }
}

/// End of stream before the id-2 response yields no partial answer.
#[tokio::test]
async fn eof_before_result_is_stream_closed() {
    let (mut channel, _helper_stdin, mut helper_stdout) = channel_pair();
    let config = config();
    let query = Query::new("q");
    let call = ToolCall::for_query(&config, &query);

    helper_stdout
        .write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\",\"params\":{}}\n")
        .await
        .expect("helper write");
    drop(helper_stdout);

    let result = invoke(&mut channel, &call, None).await;
    assert!(
        matches!(result, Err(AppError::StreamClosedDuringCall { .. })),
        "expected StreamClosedDuringCall, got: {result:?}"
    );
}

#[tokio::test]
async fn silent_helper_hits_call_deadline() {
    let (mut channel, _helper_stdin, _helper_stdout) = channel_pair();
    let config = config();
    let query = Query::new("q");
    let call = ToolCall::for_query(&config, &query);

    let result = invoke(&mut channel, &call, Some(Duration::from_millis(50))).await;
    assert!(
        matches!(result, Err(AppError::Timeout(ref msg)) if msg.contains("tool call")),
        "expected tool call timeout, got: {result:?}"
    );
}
