#![forbid(unsafe_code)]

//! Driver for a notebook knowledge-base helper spoken to over line-delimited
//! JSON-RPC on its standard streams.

pub mod config;
pub mod driver;
pub mod errors;
pub mod models;
pub mod normalize;
pub mod rpc;

pub use config::BridgeConfig;
pub use driver::{KnowledgeBase, NotebookDriver};
pub use errors::{AppError, Result};
