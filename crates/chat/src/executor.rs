//! Concurrent execution of a batch of tool calls.

use std::panic::AssertUnwindSafe;
use std::time::Instant;

use chatweave_core::message::{Message, ToolCall};
use chatweave_core::progress::Progress;
use chatweave_core::tool::Toolset;
use futures::FutureExt;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::stream_event::ToolStatus;

/// Content of the tool message sent back to the model when a call fails.
pub const TOOL_FAILURE_CONTENT: &str = "Error";

/// Run every call concurrently and build the transcript entries for them.
///
/// The first message is the assistant turn requesting `calls`; it is followed
/// by one tool message per call, in the order of `calls` regardless of which
/// call finished first. A failing or panicking tool never fails the batch.
pub async fn execute_tool_calls(
    calls: Vec<ToolCall>,
    toolset: &dyn Toolset,
    progress: &Progress<ToolStatus>,
) -> Vec<Message> {
    debug!(tool_count = calls.len(), "Executing tool calls");

    let results = join_all(
        calls
            .iter()
            .map(|call| execute_tool_call(call, toolset, progress)),
    )
    .await;

    let mut messages = Vec::with_capacity(results.len() + 1);
    messages.push(Message::tool_calls(calls));
    messages.extend(results);
    messages
}

async fn execute_tool_call(
    call: &ToolCall,
    toolset: &dyn Toolset,
    progress: &Progress<ToolStatus>,
) -> Message {
    progress.emit(ToolStatus::started(&call.id, &call.name));

    let nested = {
        let id = call.id.clone();
        let name = call.name.clone();
        progress.map(move |data| ToolStatus::progress(&id, &name, data))
    };

    let start = Instant::now();
    let outcome = AssertUnwindSafe(toolset.call_tool(&call.name, &call.id, &call.arguments, nested))
        .catch_unwind()
        .await;
    let duration_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(Ok(result)) => {
            debug!(tool = %call.name, call_id = %call.id, duration_ms, "Tool call finished");
            progress.emit(ToolStatus::finished(&call.id, &call.name));
            Message::tool_result(&call.id, &call.name, result.to_string())
        }
        Ok(Err(e)) => {
            warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool execution failed");
            progress.emit(ToolStatus::failed(&call.id, &call.name));
            Message::tool_result(&call.id, &call.name, TOOL_FAILURE_CONTENT)
        }
        Err(_) => {
            warn!(tool = %call.name, call_id = %call.id, "Tool panicked");
            progress.emit(ToolStatus::failed(&call.id, &call.name));
            Message::tool_result(&call.id, &call.name, TOOL_FAILURE_CONTENT)
        }
    }
}
