//! Notification sink implementations for Chime.
//!
//! Two reference sinks conform to the engine's `emit` contract:
//! - [`EchoSink`] writes to a local output stream under a write lock
//! - [`PushSink`] pushes to a chat provider with chunking and retry
//!
//! Plus [`MessageDeduplicator`] for deduplicating *inbound* provider events
//! by message id with a TTL.

mod chunk;
mod dedup;
mod echo;
mod push;

pub use chunk::{split_semantic_messages, split_text_chunks};
pub use dedup::MessageDeduplicator;
pub use echo::EchoSink;
pub use push::{PushSink, PushTransport};
