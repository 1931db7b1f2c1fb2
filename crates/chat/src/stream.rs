//! The streaming chat loop.
//!
//! A turn pulls chunks until one of them shows what the model is doing:
//! tool-call fragments (drain the rest through the accumulator, run the
//! tools, go around again) or content (forward it fragment by fragment and
//! return the concatenation). Chunks that carry neither are skipped.

use std::sync::Arc;

use chatweave_config::ChatConfig;
use chatweave_core::error::{Error, Result};
use chatweave_core::message::Conversation;
use chatweave_core::progress::Progress;
use chatweave_core::provider::{ChunkReceiver, Provider, StreamChunk, ToolCallDelta};
use chatweave_core::tool::Toolset;
use chatweave_telemetry::{Scope, TokenUsage};
use tracing::{debug, info, trace};

use crate::accumulator::ToolCallAccumulator;
use crate::executor::execute_tool_calls;
use crate::stream_event::ChatStreamPart;

/// What the first decisive chunk of a turn carried.
enum Head {
    ToolCalls(Vec<ToolCallDelta>),
    Content(String),
}

/// Drives a conversation with `Provider::stream` until the model answers.
pub struct ChatStreamLoop {
    provider: Arc<dyn Provider>,
    config: ChatConfig,
    toolset: Option<Arc<dyn Toolset>>,
    progress: Progress<ChatStreamPart>,
}

impl ChatStreamLoop {
    pub fn new(provider: Arc<dyn Provider>, config: ChatConfig) -> Self {
        Self {
            provider,
            config,
            toolset: None,
            progress: Progress::noop(),
        }
    }

    /// Let the model call tools from `toolset`.
    pub fn with_toolset(mut self, toolset: Arc<dyn Toolset>) -> Self {
        self.toolset = Some(toolset);
        self
    }

    /// Receive content fragments and tool status updates.
    pub fn with_progress(mut self, progress: Progress<ChatStreamPart>) -> Self {
        self.progress = progress;
        self
    }

    /// Run turns until the model streams content, and return all of it.
    ///
    /// Tool turns append to `conversation` exactly as in
    /// [`ChatLoop::run`](crate::ChatLoop::run).
    pub async fn run(&self, conversation: &mut Conversation, scope: &Scope) -> Result<String> {
        info!(
            conversation_id = %conversation.id,
            messages = conversation.len(),
            provider = %self.provider.name(),
            "Starting streaming chat"
        );

        let tools = self
            .toolset
            .as_ref()
            .map(|toolset| toolset.available_tools())
            .unwrap_or_default();
        let mut tool_turns = 0u32;

        loop {
            let turn = scope.nested("chat_stream");
            turn.record_arguments(crate::arguments_trace(conversation)?);

            debug!(
                conversation_id = %conversation.id,
                turn = tool_turns + 1,
                "Requesting completion stream"
            );
            let request = self
                .config
                .to_request(conversation.messages.clone(), tools.clone(), true);
            let mut stream = self.provider.stream(request).await?;

            match self.read_head(&mut stream, &turn).await? {
                Head::ToolCalls(deltas) => {
                    let Some(toolset) = &self.toolset else {
                        return Err(Error::Internal("tool calls decided without a toolset".into()));
                    };
                    let flushed = ToolCallAccumulator::seeded(deltas)
                        .flush(&mut stream)
                        .await?;
                    if let Some(usage) = flushed.usage {
                        turn.record(TokenUsage::from(usage));
                    }

                    if tool_turns >= self.config.recursion_limit {
                        return Err(Error::RecursionLimit {
                            limit: self.config.recursion_limit,
                        });
                    }
                    let trace = serde_json::to_value(&flushed.tool_calls)?;

                    let progress = self.progress.map(ChatStreamPart::Tool);
                    let messages =
                        execute_tool_calls(flushed.tool_calls, toolset.as_ref(), &progress).await;
                    conversation.extend(messages);
                    turn.record_result(trace);
                    tool_turns += 1;
                    // close this turn before the next one opens
                    turn.exit();
                }
                Head::Content(head) => {
                    let content = self.drain_content(head, &mut stream, &turn).await?;
                    turn.record_result(serde_json::Value::String(content.clone()));
                    info!(
                        conversation_id = %conversation.id,
                        tool_turns,
                        "Streaming chat finished"
                    );
                    return Ok(content);
                }
            }
        }
    }

    /// Pull chunks until one decides the turn.
    async fn read_head(&self, stream: &mut ChunkReceiver, turn: &Scope) -> Result<Head> {
        while let Some(chunk) = stream.recv().await {
            let chunk = chunk?;
            record_usage(&chunk, turn);

            let Some(choice) = chunk.choices.first() else {
                return Err(Error::invalid_completion("missing deltas", &chunk));
            };

            if self.toolset.is_some() {
                if let Some(deltas) = choice.delta.tool_calls.as_ref().filter(|d| !d.is_empty()) {
                    debug!(fragments = deltas.len(), "Stream carries tool calls");
                    return Ok(Head::ToolCalls(deltas.clone()));
                }
            }

            if let Some(content) = &choice.delta.content {
                debug!("Stream carries content");
                return Ok(Head::Content(content.clone()));
            }

            trace!("Undecided chunk, waiting for more");
        }

        Err(Error::InvalidCompletionStream(
            "stream ended before any content or tool calls".into(),
        ))
    }

    /// Forward every non-empty fragment and return their concatenation.
    async fn drain_content(
        &self,
        head: String,
        stream: &mut ChunkReceiver,
        turn: &Scope,
    ) -> Result<String> {
        let mut content = head;
        if !content.is_empty() {
            self.progress.emit(ChatStreamPart::Message {
                content: content.clone(),
            });
        }

        while let Some(chunk) = stream.recv().await {
            let chunk = chunk?;
            record_usage(&chunk, turn);

            // usage trailers carry no choices
            let Some(part) = chunk.first_delta().and_then(|d| d.content.as_deref()) else {
                continue;
            };
            if part.is_empty() {
                continue;
            }
            self.progress.emit(ChatStreamPart::Message {
                content: part.to_string(),
            });
            content.push_str(part);
        }

        Ok(content)
    }
}

fn record_usage(chunk: &StreamChunk, turn: &Scope) {
    if let Some(usage) = chunk.usage {
        turn.record(TokenUsage::from(usage));
    }
}
