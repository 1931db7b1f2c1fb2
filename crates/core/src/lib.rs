//! # Chatweave Core
//!
//! Domain types, traits, and error definitions for the Chatweave chat
//! orchestration layer. This crate has **no transport dependencies**: it
//! defines the model that the provider adapters, the telemetry scope tree,
//! and the chat loops are written against.
//!
//! ## Seams
//!
//! - [`Provider`] normalizes every LLM backend into one `complete` / `stream`
//!   contract, so provider-specific chunk shapes never leak into the loops.
//! - [`Toolset`] is what the loops invoke tools through; [`ToolRegistry`] is
//!   the stock implementation backed by [`Tool`] objects.
//! - [`Progress`] is the synchronous sink for transient status events.

pub mod error;
pub mod message;
pub mod progress;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use message::{Conversation, ConversationId, Message, Role, ToolCall};
pub use progress::Progress;
pub use provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, ResponseFormat, StreamChunk,
    ToolCallDelta, Usage,
};
pub use tool::{Tool, ToolRegistry, ToolResult, Toolset};
