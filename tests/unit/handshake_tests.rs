//! Unit tests for the `initialize` / `notifications/initialized` handshake,
//! driven over in-memory pipes.

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

use notebook_bridge::rpc::channel::RpcChannel;
use notebook_bridge::rpc::handshake::{perform, INITIALIZED_NOTIFICATION, INITIALIZE_METHOD};
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

/// Everything the bridge wrote to the helper's stdin, one JSON value per line.
async fn sent_messages(helper_stdin: DuplexStream) -> Vec<Value> {
    let mut lines = BufReader::new(helper_stdin).lines();
    let mut messages = Vec::new();
    while let Some(line) = lines.next_line().await.expect("read sent line") {
        messages.push(serde_json::from_str(&line).expect("sent line must be JSON"));
    }
    messages
}

/// A successful handshake sends `initialize` with id 1 and the configured
/// client identity, then the `initialized` notification without an id.
#[tokio::test]
async fn handshake_sends_initialize_then_notification() {
    let (mut channel, helper_stdin, mut helper_stdout) = channel_pair();
    let config = BridgeConfig::default();

    helper_stdout
        .write_all(
            b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"serverInfo\":{\"name\":\"fake\"}}}\n",
        )
        .await
        .expect("helper write");

    perform(&mut channel, &config)
        .await
        .expect("handshake must succeed");
    drop(channel);

    let sent = sent_messages(helper_stdin).await;
    assert_eq!(sent.len(), 2, "exactly two messages expected: {sent:?}");

    let initialize = &sent[0];
    assert_eq!(initialize["jsonrpc"], "2.0");
    assert_eq!(initialize["id"], 1);
    assert_eq!(initialize["method"], INITIALIZE_METHOD);
    assert_eq!(initialize["params"]["protocolVersion"], "2024-11-05");
    assert_eq!(initialize["params"]["capabilities"], serde_json::json!({}));
    assert_eq!(initialize["params"]["clientInfo"]["name"], "notebook-bridge");
    assert_eq!(
        initialize["params"]["clientInfo"]["version"],
        env!("CARGO_PKG_VERSION")
    );

    let notification = &sent[1];
    assert_eq!(notification["method"], INITIALIZED_NOTIFICATION);
    assert!(notification.get("id").is_none(), "notification must not carry an id");
    assert_eq!(notification["params"], serde_json::json!({}));
}

/// Banner lines and unrelated notifications before the acknowledgment are
/// ignored.
#[tokio::test]
async fn handshake_skips_noise_before_acknowledgment() {
    let (mut channel, _helper_stdin, mut helper_stdout) = channel_pair();

    helper_stdout
        .write_all(
            concat!(
                "notebook helper starting...\n",
                "{\"jsonrpc\":\"2.0\",\"method\":\"notifications/message\",\"params\":{\"level\":\"info\"}}\n",
                "{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n",
            )
            .as_bytes(),
        )
        .await
        .expect("helper write");

    perform(&mut channel, &BridgeConfig::default())
        .await
        .expect("handshake must succeed despite noise");
}

/// An error response to `initialize` still completes the handshake.
#[tokio::test]
async fn error_acknowledgment_completes_handshake() {
    let (mut channel, _helper_stdin, mut helper_stdout) = channel_pair();

    helper_stdout
        .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"error\":{\"code\":-32601}}\n")
        .await
        .expect("helper write");

    perform(&mut channel, &BridgeConfig::default())
        .await
        .expect("any id-1 response completes the handshake");
}

/// Closing stdout before answering is `EofBeforeHandshake`.
#[tokio::test]
async fn eof_before_acknowledgment_fails() {
    let (mut channel, _helper_stdin, mut helper_stdout) = channel_pair();

    helper_stdout
        .write_all(b"fatal: not logged in\n")
        .await
        .expect("helper write");
    drop(helper_stdout);

    let result = perform(&mut channel, &BridgeConfig::default()).await;
    assert!(
        matches!(result, Err(AppError::EofBeforeHandshake { .. })),
        "expected EofBeforeHandshake, got: {result:?}"
    );
}

/// A helper that never answers hits the handshake deadline.
#[tokio::test]
async fn silent_helper_times_out() {
    let (mut channel, _helper_stdin, _helper_stdout) = channel_pair();
    let config = BridgeConfig {
        handshake_timeout_seconds: 1,
        ..BridgeConfig::default()
    };

    let result = perform(&mut channel, &config).await;
    assert!(
        matches!(result, Err(AppError::Timeout(ref msg)) if msg.contains("handshake")),
        "expected handshake timeout, got: {result:?}"
    );
}
