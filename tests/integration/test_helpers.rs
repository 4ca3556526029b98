//! Shared fixtures for integration tests.
//!
//! Fake helpers are small `sh` scripts that speak just enough of the
//! line-delimited JSON-RPC protocol to exercise one scenario each.

use std::path::{Path, PathBuf};

use notebook_bridge::config::LaunchStrategy;
use notebook_bridge::BridgeConfig;

/// Answers the handshake after a banner line, then answers the tool call
/// with two text blocks and a conversation id derived from the one it was
/// sent (`fresh` when none).
pub const ANSWERING_HELPER: &str = r#"
read -r init
echo 'notebook helper v0 starting'
printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"serverInfo":{"name":"fake-notebook"}}}'
read -r initialized
read -r call
conv=$(printf '%s' "$call" | sed -n 's/.*"conversation_id":"\([^"]*\)".*/\1/p')
[ -n "$conv" ] || conv=fresh
printf '%s\n' '{"jsonrpc":"2.0","method":"notifications/progress","params":{}}'
printf '{"jsonrpc":"2.0","id":2,"result":{"content":[{"type":"text","text":"Claim the credit [1]. "},{"type":"text","text":"File form 6765."}],"conversation_id":"%s-next"}}\n' "$conv"
"#;

/// Exits with code 3 before the startup grace period ends.
pub const CRASHING_HELPER: &str = r"
echo 'auth token expired' >&2
exit 3
";

/// Reads `initialize`, then quits without answering.
pub const SILENT_QUITTER_HELPER: &str = r"
read -r init
echo 'fatal: login required' >&2
exit 0
";

/// Completes the handshake, reads the tool call, then crashes.
pub const CRASH_DURING_CALL_HELPER: &str = r#"
read -r init
printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{}}'
read -r initialized
read -r call
echo 'Traceback: browser session lost' >&2
exit 1
"#;

/// Completes the handshake and answers the tool call with an error.
pub const TOOL_ERROR_HELPER: &str = r#"
read -r init
printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{}}'
read -r initialized
read -r call
printf '%s\n' '{"jsonrpc":"2.0","id":2,"error":{"code":-32000,"message":"notebook not found"}}'
"#;

/// Completes the handshake, reads the tool call, then never answers.
pub const HANGING_HELPER: &str = r#"
read -r init
printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{}}'
read -r initialized
read -r call
exec sleep 30
"#;

/// Launch strategy running `script` through `sh -c`.
pub fn sh_strategy(script: &str) -> LaunchStrategy {
    LaunchStrategy::Command {
        program: "sh".into(),
        args: vec!["-c".into(), script.into()],
    }
}

/// Configuration launching `script` with short deadlines.
pub fn script_config(script: &str) -> BridgeConfig {
    BridgeConfig {
        notebook_id: "nb-test".into(),
        startup_grace_ms: 200,
        handshake_timeout_seconds: 10,
        call_timeout_seconds: 10,
        launch: vec![sh_strategy(script)],
        ..BridgeConfig::default()
    }
}

/// Write `body` to `name` under `dir` and return its path.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).expect("write helper script");
    path
}
