//! Helper-process implementation of [`KnowledgeBase`].
//!
//! Each query runs one strictly sequential pipeline:
//!
//! ```text
//! launch ─▶ initialize ─▶ tools/call ─▶ normalize
//!    └───────────── terminate (always) ─────────────┘
//! ```
//!
//! Nothing outlives the query except the conversation id returned in the
//! [`Answer`]. Concurrent queries each get their own helper and share no
//! mutable state.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::config::BridgeConfig;
use crate::driver::KnowledgeBase;
use crate::models::answer::Answer;
use crate::models::query::Query;
use crate::normalize::normalize_answer;
use crate::rpc::invoker::{ToolCall, ToolOutput};
use crate::rpc::launcher;
use crate::rpc::process::HelperProcess;
use crate::{AppError, Result};

/// Answers questions by driving a freshly spawned helper per query.
#[derive(Debug, Clone)]
pub struct NotebookDriver {
    config: Arc<BridgeConfig>,
}

impl NotebookDriver {
    /// Create a driver using `config` for every query.
    #[must_use]
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Configuration shared by every query.
    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Answer `query`.
    ///
    /// # Errors
    ///
    /// See [`Self::ask_with_cancel`].
    pub async fn ask(&self, query: &Query) -> Result<Answer> {
        self.ask_with_cancel(query, &CancellationToken::new()).await
    }

    /// Answer `query`, abandoning it if `cancel` fires first.
    ///
    /// The helper is terminated before this returns on every path.
    ///
    /// # Errors
    ///
    /// - [`AppError::ProcessSpawnFailure`] / [`AppError::ProcessExitedImmediately`]
    ///   from the launcher.
    /// - [`AppError::EofBeforeHandshake`] from the handshake.
    /// - [`AppError::ToolError`] / [`AppError::StreamClosedDuringCall`] from
    ///   the tool call.
    /// - [`AppError::Timeout`] when a configured deadline elapses.
    /// - [`AppError::Cancelled`] when `cancel` fires.
    pub async fn ask_with_cancel(
        &self,
        query: &Query,
        cancel: &CancellationToken,
    ) -> Result<Answer> {
        let span = info_span!(
            "notebook_query",
            continuing = query.conversation_id().is_some()
        );
        self.run(query, cancel).instrument(span).await
    }

    async fn run(&self, query: &Query, cancel: &CancellationToken) -> Result<Answer> {
        let mut process = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(AppError::Cancelled),
            launched = launcher::launch(&self.config) => launched?,
        };

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(AppError::Cancelled),
            exchanged = exchange(&mut process, &self.config, query) => exchanged,
        };

        process.terminate().await;

        match outcome {
            Ok(output) => {
                let answer = Answer {
                    text: normalize_answer(&output.text),
                    conversation_id: output.conversation_id,
                };
                info!(
                    chars = answer.text.chars().count(),
                    program = process.program(),
                    "notebook query answered"
                );
                Ok(answer)
            }
            Err(err) => {
                warn!(
                    error = %err,
                    program = process.program(),
                    "notebook query failed"
                );
                Err(err)
            }
        }
    }
}

async fn exchange(
    process: &mut HelperProcess,
    config: &BridgeConfig,
    query: &Query,
) -> Result<ToolOutput> {
    process.initialize(config).await?;
    let call = ToolCall::for_query(config, query);
    process.call_tool(&call, config.call_timeout()).await
}

impl KnowledgeBase for NotebookDriver {
    fn ask<'a>(
        &'a self,
        query: &'a Query,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<Answer>> + Send + 'a>> {
        Box::pin(self.ask_with_cancel(query, cancel))
    }
}
