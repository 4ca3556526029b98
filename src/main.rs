#![forbid(unsafe_code)]

//! `notebook-bridge`: ask the notebook knowledge base one question.
//!
//! ```text
//! notebook-bridge [--config PATH] [--log-format text|json] <QUESTION> [CONVERSATION_ID]
//! ```
//!
//! Prints exactly one JSON line on stdout, `{"answer": …, "conversation_id": …}`
//! or `{"error": …}`. Logs go to stderr so stdout stays machine-readable.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use notebook_bridge::driver::reply_for;
use notebook_bridge::models::answer::BridgeReply;
use notebook_bridge::models::conversation::ConversationId;
use notebook_bridge::models::query::Query;
use notebook_bridge::{AppError, BridgeConfig, NotebookDriver, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "notebook-bridge",
    about = "Ask the notebook knowledge base a question",
    version,
    long_about = None
)]
struct Cli {
    /// Question to ask.
    question: Option<String>,

    /// Conversation id returned by the previous turn.
    conversation_id: Option<String>,

    /// Path to a TOML configuration file. Built-in defaults apply otherwise.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json), written to stderr.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> ExitCode {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("{err}");
    }

    let Some(question) = args.question.filter(|q| !q.trim().is_empty()) else {
        emit(&BridgeReply::missing_query());
        return ExitCode::FAILURE;
    };

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "configuration rejected");
            emit(&BridgeReply::from(err));
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            emit(&BridgeReply::from(AppError::Io(format!(
                "failed to build tokio runtime: {err}"
            ))));
            return ExitCode::FAILURE;
        }
    };

    let query =
        Query::new(question).with_conversation(args.conversation_id.and_then(ConversationId::parse));
    let driver = NotebookDriver::new(config);

    let reply = runtime.block_on(async {
        let cancel = CancellationToken::new();
        let watcher = tokio::spawn(cancel_on_signal(cancel.clone()));
        let reply = reply_for(&driver, &query, &cancel).await;
        watcher.abort();
        reply
    });

    emit(&reply);
    ExitCode::SUCCESS
}

fn emit(reply: &BridgeReply) {
    println!("{}", reply.to_json_line());
}

fn load_config(path: Option<&Path>) -> Result<BridgeConfig> {
    let mut config = match path {
        Some(path) => BridgeConfig::load_from_path(path)?,
        None => BridgeConfig::default(),
    };
    config.apply_env_overrides()?;
    info!(
        notebook_id = config.notebook_id.as_str(),
        strategies = config.launch.len(),
        "configuration loaded"
    );
    Ok(config)
}

/// Cancel the in-flight query on Ctrl-C or SIGTERM so the helper is
/// terminated rather than orphaned.
async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
            return;
        }
    }

    info!("signal received, cancelling query");
    cancel.cancel();
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
