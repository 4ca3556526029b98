//! Question-answering driver abstraction.
//!
//! The [`KnowledgeBase`] trait decouples callers (the CLI, an HTTP chat
//! endpoint) from how an answer is produced. [`NotebookDriver`] is the
//! production implementation: one helper process per query, spoken to over
//! line-delimited JSON-RPC.

pub mod notebook_driver;

use std::future::Future;
use std::pin::Pin;

pub use notebook_driver::NotebookDriver;

use tokio_util::sync::CancellationToken;

use crate::models::answer::{Answer, BridgeReply};
use crate::models::query::Query;
use crate::Result;

/// Something that can answer a [`Query`].
pub trait KnowledgeBase: Send + Sync {
    /// Answer `query`, continuing its conversation if it carries an id, and
    /// give up with [`AppError::Cancelled`](crate::AppError::Cancelled) once
    /// `cancel` fires.
    ///
    /// # Errors
    ///
    /// Any [`AppError`](crate::AppError) describing why no answer could be
    /// produced. Implementations never panic on helper misbehaviour.
    fn ask<'a>(
        &'a self,
        query: &'a Query,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<Answer>> + Send + 'a>>;
}

/// Ask `knowledge_base` and fold the outcome into the JSON-line reply shape.
pub async fn reply_for(
    knowledge_base: &dyn KnowledgeBase,
    query: &Query,
    cancel: &CancellationToken,
) -> BridgeReply {
    match knowledge_base.ask(query, cancel).await {
        Ok(answer) => BridgeReply::from(answer),
        Err(err) => BridgeReply::from(err),
    }
}
