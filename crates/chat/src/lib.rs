//! # Chatweave Chat
//!
//! The recursive chat-completion loops.
//!
//! [`ChatLoop`] drives a conversation through `Provider::complete`;
//! [`ChatStreamLoop`] does the same over `Provider::stream`, reassembling
//! streamed tool calls with the [`ToolCallAccumulator`]. Both hand tool calls
//! to [`execute_tool_calls`] and keep going until the model answers with
//! content. Every turn is traced as a nested [`Scope`](chatweave_telemetry::Scope).

pub mod accumulator;
pub mod executor;
pub mod response;
pub mod stream;
pub mod stream_event;

#[cfg(test)]
mod test_helpers;

pub use accumulator::{FlushedToolCalls, ToolCallAccumulator};
pub use executor::{TOOL_FAILURE_CONTENT, execute_tool_calls};
pub use response::ChatLoop;
pub use stream::ChatStreamLoop;
pub use stream_event::{ChatStreamPart, ToolCallStatus, ToolStatus};

use chatweave_core::message::Conversation;

/// Snapshot of the outbound transcript, recorded at the start of a turn.
fn arguments_trace(conversation: &Conversation) -> chatweave_core::Result<serde_json::Value> {
    Ok(serde_json::json!({
        "messages": serde_json::to_value(&conversation.messages)?,
    }))
}
