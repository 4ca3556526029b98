//! Line-delimited JSON-RPC over a helper process's standard streams.
//!
//! One query drives one helper process through a fixed sequence:
//!
//! - `launcher`: resolves an ordered list of launch strategies, spawns the
//!   first that resolves and verifies it survives a short grace period.
//! - `handshake`: `initialize` (id 1) / `notifications/initialized`.
//! - `invoker`: one `tools/call` (id 2) and recovery of its text content.
//! - `process`: the owned [`HelperProcess`](process::HelperProcess) handle,
//!   its lifecycle state and the guaranteed terminate path.
//!
//! Framing and message shapes live in `codec`, `envelope` and `channel`.

pub mod channel;
pub mod codec;
pub mod envelope;
pub mod handshake;
pub mod invoker;
pub mod launcher;
pub mod process;
