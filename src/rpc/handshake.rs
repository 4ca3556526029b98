//! Protocol handshake.
//!
//! Before the helper accepts a tool call it must be initialised:
//!
//! 1. `initialize` request (id 1) carrying the protocol version, an empty
//!    capability set and the bridge's `clientInfo`.
//! 2. Lines are read until the response with id 1 arrives. Anything else
//!    the helper prints first is skipped.
//! 3. `notifications/initialized` with empty params, no id, no response.
//!
//! The helper closing stdout before step 2 completes is
//! [`AppError::EofBeforeHandshake`].

use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use crate::config::BridgeConfig;
use crate::rpc::channel::{within, RpcChannel};
use crate::rpc::envelope::{
    ClientInfo, InitializeParams, RpcNotification, RpcOutcome, RpcRequest, INITIALIZE_ID,
};
use crate::{AppError, Result};

/// Method name of the handshake request.
pub const INITIALIZE_METHOD: &str = "initialize";

/// Method name of the post-handshake notification.
pub const INITIALIZED_NOTIFICATION: &str = "notifications/initialized";

/// Run the full handshake on `channel` under the configured deadline.
///
/// # Errors
///
/// - [`AppError::EofBeforeHandshake`]: stdout closed before the id-1
///   response. The `stderr` field is left empty for the caller to fill.
/// - [`AppError::Timeout`]: `handshake_timeout_seconds` elapsed.
/// - [`AppError::Io`] / [`AppError::Rpc`]: writing to the helper failed.
pub async fn perform<W, R>(channel: &mut RpcChannel<W, R>, config: &BridgeConfig) -> Result<()>
where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    within(config.handshake_timeout(), "handshake", exchange(channel, config)).await
}

async fn exchange<W, R>(channel: &mut RpcChannel<W, R>, config: &BridgeConfig) -> Result<()>
where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    let request = RpcRequest::new(
        INITIALIZE_ID,
        INITIALIZE_METHOD,
        InitializeParams {
            protocol_version: &config.protocol_version,
            capabilities: Map::new(),
            client_info: ClientInfo {
                name: &config.client_name,
                version: &config.client_version,
            },
        },
    );
    channel.send(&request).await?;
    debug!(
        protocol_version = config.protocol_version.as_str(),
        "handshake: initialize sent"
    );

    let Some(response) = channel.wait_for_response(INITIALIZE_ID).await? else {
        return Err(AppError::EofBeforeHandshake {
            stderr: String::new(),
        });
    };

    if let RpcOutcome::Result(result) = &response.outcome {
        let server = result
            .pointer("/serverInfo/name")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        info!(server, "handshake: initialize acknowledged");
    } else {
        // Any id-1 response completes the handshake.
        debug!(outcome = ?response.outcome, "handshake: initialize answered with an error");
    }

    channel
        .send(&RpcNotification::new(INITIALIZED_NOTIFICATION, Map::new()))
        .await?;
    debug!("handshake: initialized notification sent");
    Ok(())
}
