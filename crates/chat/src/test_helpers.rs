//! Scripted collaborators for the unit tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chatweave_core::error::{ProviderError, ToolError};
use chatweave_core::message::ToolCall;
use chatweave_core::progress::Progress;
use chatweave_core::provider::{
    Choice, ChunkReceiver, CompletionMessage, MessageContent, Provider, ProviderRequest,
    ProviderResponse, StreamChunk, ToolDefinition, Usage,
};
use chatweave_core::tool::{ToolResult, Toolset};

/// A progress sink that keeps every update.
pub(crate) fn collecting<T: Send + 'static>() -> (Progress<T>, Arc<Mutex<Vec<T>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (Progress::new(move |update| sink.lock().unwrap().push(update)), seen)
}

enum Behavior {
    Respond {
        delay: Duration,
        updates: Vec<serde_json::Value>,
        output: String,
    },
    Fail,
    Panic,
}

/// Toolset whose tools answer from a script.
#[derive(Default)]
pub(crate) struct ScriptedToolset {
    tools: BTreeMap<String, Behavior>,
    calls: Mutex<Vec<ToolCall>>,
}

impl ScriptedToolset {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(self, name: &str, output: &str) -> Self {
        self.respond_after(name, Duration::ZERO, output)
    }

    pub(crate) fn respond_after(mut self, name: &str, delay: Duration, output: &str) -> Self {
        self.tools.insert(
            name.into(),
            Behavior::Respond {
                delay,
                updates: Vec::new(),
                output: output.into(),
            },
        );
        self
    }

    pub(crate) fn respond_with_progress(
        mut self,
        name: &str,
        updates: Vec<serde_json::Value>,
        output: &str,
    ) -> Self {
        self.tools.insert(
            name.into(),
            Behavior::Respond {
                delay: Duration::ZERO,
                updates,
                output: output.into(),
            },
        );
        self
    }

    pub(crate) fn fail(mut self, name: &str) -> Self {
        self.tools.insert(name.into(), Behavior::Fail);
        self
    }

    pub(crate) fn panic(mut self, name: &str) -> Self {
        self.tools.insert(name.into(), Behavior::Panic);
        self
    }

    /// Every call received, in invocation order.
    pub(crate) fn calls(&self) -> Vec<ToolCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Toolset for ScriptedToolset {
    fn available_tools(&self) -> Vec<ToolDefinition> {
        self.tools
            .keys()
            .map(|name| ToolDefinition {
                name: name.clone(),
                description: format!("Scripted {name}"),
                parameters: serde_json::json!({"type": "object"}),
            })
            .collect()
    }

    async fn call_tool(
        &self,
        name: &str,
        call_id: &str,
        arguments: &str,
        progress: Progress<serde_json::Value>,
    ) -> Result<ToolResult, ToolError> {
        self.calls
            .lock()
            .unwrap()
            .push(ToolCall::new(call_id, name, arguments));

        match self.tools.get(name) {
            None => Err(ToolError::NotFound(name.into())),
            Some(Behavior::Fail) => Err(ToolError::ExecutionFailed {
                tool_name: name.into(),
                reason: "scripted failure".into(),
            }),
            Some(Behavior::Panic) => panic!("scripted panic in {name}"),
            Some(Behavior::Respond {
                delay,
                updates,
                output,
            }) => {
                for update in updates {
                    progress.emit(update.clone());
                }
                if !delay.is_zero() {
                    tokio::time::sleep(*delay).await;
                }
                Ok(ToolResult::text(output.clone()))
            }
        }
    }
}

/// One scripted provider turn.
pub(crate) enum Turn {
    Complete(ProviderResponse),
    Stream(Vec<Result<StreamChunk, ProviderError>>),
    Fail(ProviderError),
}

/// Provider that replays turns in order and records every request.
pub(crate) struct ScriptedProvider {
    turns: Mutex<VecDeque<Turn>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub(crate) fn new(turns: Vec<Turn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_turn(&self, request: ProviderRequest) -> Turn {
        self.requests.lock().unwrap().push(request);
        self.turns
            .lock()
            .unwrap()
            .pop_front()
            .expect("scripted provider exhausted")
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        match self.next_turn(request) {
            Turn::Complete(response) => Ok(response),
            Turn::Fail(error) => Err(error),
            Turn::Stream(_) => panic!("expected a complete() turn"),
        }
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        match self.next_turn(request) {
            Turn::Stream(chunks) => {
                let (tx, rx) = tokio::sync::mpsc::channel(chunks.len().max(1));
                for chunk in chunks {
                    tx.try_send(chunk).unwrap();
                }
                Ok(rx)
            }
            Turn::Fail(error) => Err(error),
            Turn::Complete(_) => panic!("expected a stream() turn"),
        }
    }
}

pub(crate) fn text_response(text: &str, usage: Option<Usage>) -> ProviderResponse {
    ProviderResponse {
        choices: vec![Choice {
            message: CompletionMessage {
                content: Some(MessageContent::from(text)),
                tool_calls: Vec::new(),
            },
            finish_reason: Some("stop".into()),
        }],
        usage,
        model: "scripted-model".into(),
    }
}

pub(crate) fn tool_response(calls: Vec<ToolCall>, usage: Option<Usage>) -> ProviderResponse {
    ProviderResponse {
        choices: vec![Choice {
            message: CompletionMessage {
                content: None,
                tool_calls: calls,
            },
            finish_reason: Some("tool_calls".into()),
        }],
        usage,
        model: "scripted-model".into(),
    }
}
