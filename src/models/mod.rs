//! Domain model module declarations.

pub mod answer;
pub mod conversation;
pub mod query;
