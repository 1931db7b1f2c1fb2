//! OpenAI-style `/chat/completions` wire types, shared by every adapter.
//!
//! Each [`Dialect`] differs only in a handful of request fields and in how
//! streamed tool-call fragments are keyed.

use chatweave_core::message::{Message, Role, ToolCall};
use chatweave_core::provider::{
    Choice, ChunkChoice, CompletionMessage, Delta, FunctionDelta, MessageContent,
    ProviderRequest, ProviderResponse, StreamChunk, ToolCallDelta, ToolDefinition, Usage,
    UNSET_TOOL_CALL_ID,
};
use serde::{Deserialize, Serialize};

/// Provider-specific flavour of the OpenAI wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dialect {
    /// Positional tool-call streaming (`index` on every fragment),
    /// usage trailer via `stream_options`.
    OpenAi,
    /// Tool calls streamed whole, keyed by id; `random_seed` instead of `seed`.
    Mistral,
}

impl Dialect {
    /// JSON body for a chat completion request.
    pub(crate) fn request_body(self, request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": stream,
        });

        if stream && self == Self::OpenAi {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }

        if let Some(top_p) = request.top_p {
            body["top_p"] = serde_json::json!(top_p);
        }

        if let Some(penalty) = request.frequency_penalty {
            body["frequency_penalty"] = serde_json::json!(penalty);
        }

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if let Some(seed) = request.seed {
            let field = match self {
                Self::OpenAi => "seed",
                Self::Mistral => "random_seed",
            };
            body[field] = serde_json::json!(seed);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(to_api_tools(&request.tools));
        }

        if !request.stop.is_empty() {
            body["stop"] = serde_json::json!(request.stop);
        }

        if let Some(format) = request.response_format {
            body["response_format"] = serde_json::json!(format);
        }

        body
    }

    fn normalize_delta(self, delta: StreamToolCallDelta) -> ToolCallDelta {
        let function = delta.function.map(|f| FunctionDelta {
            name: f.name,
            arguments: f.arguments,
        });
        match self {
            Self::OpenAi => ToolCallDelta {
                index: delta.index,
                id: delta.id,
                function,
            },
            // Mistral repeats index 0 for parallel calls; only the id is a usable key
            Self::Mistral => ToolCallDelta {
                index: None,
                id: Some(
                    delta
                        .id
                        .filter(|id| !id.is_empty())
                        .unwrap_or_else(|| UNSET_TOOL_CALL_ID.to_string()),
                ),
                function,
            },
        }
    }

    /// Normalize one parsed SSE payload.
    pub(crate) fn chunk(self, response: StreamResponse) -> StreamChunk {
        StreamChunk {
            choices: response
                .choices
                .into_iter()
                .map(|choice| ChunkChoice {
                    delta: Delta {
                        content: choice.delta.content,
                        tool_calls: choice.delta.tool_calls.map(|deltas| {
                            deltas
                                .into_iter()
                                .map(|delta| self.normalize_delta(delta))
                                .collect()
                        }),
                    },
                    finish_reason: choice.finish_reason,
                })
                .collect(),
            usage: response.usage.map(ApiUsage::into_usage),
        }
    }
}

/// Convert our Message types to API format.
pub(crate) fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
    messages
        .iter()
        .map(|m| ApiMessage {
            role: m.role.as_str().into(),
            // assistant tool-call turns carry no text
            content: if m.role == Role::Assistant
                && m.content.is_empty()
                && !m.tool_calls.is_empty()
            {
                None
            } else {
                Some(m.content.clone())
            },
            name: m.name.clone(),
            tool_calls: if m.tool_calls.is_empty() {
                None
            } else {
                Some(
                    m.tool_calls
                        .iter()
                        .map(|tc| ApiToolCall {
                            id: tc.id.clone(),
                            r#type: "function".into(),
                            function: ApiFunction {
                                name: tc.name.clone(),
                                arguments: tc.arguments.clone(),
                            },
                        })
                        .collect(),
                )
            },
            tool_call_id: m.tool_call_id.clone(),
        })
        .collect()
}

/// Convert tool definitions to API format.
pub(crate) fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
    tools
        .iter()
        .map(|t| ApiToolDefinition {
            r#type: "function".into(),
            function: ApiToolFunction {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            },
        })
        .collect()
}

// --- Request types ---

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ApiMessage {
    pub(crate) role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ApiToolCall {
    #[serde(default)]
    pub(crate) id: String,
    #[serde(default = "function_type")]
    pub(crate) r#type: String,
    pub(crate) function: ApiFunction,
}

fn function_type() -> String {
    "function".into()
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ApiFunction {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ApiToolDefinition {
    pub(crate) r#type: String,
    pub(crate) function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ApiToolFunction {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) parameters: serde_json::Value,
}

// --- Response types ---

#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse {
    #[serde(default)]
    pub(crate) model: String,
    #[serde(default)]
    pub(crate) choices: Vec<ApiChoice>,
    #[serde(default)]
    pub(crate) usage: Option<ApiUsage>,
}

impl ApiResponse {
    pub(crate) fn into_response(self) -> ProviderResponse {
        ProviderResponse {
            choices: self
                .choices
                .into_iter()
                .map(|choice| Choice {
                    message: CompletionMessage {
                        content: choice.message.content,
                        tool_calls: choice
                            .message
                            .tool_calls
                            .unwrap_or_default()
                            .into_iter()
                            .map(|tc| ToolCall::new(tc.id, tc.function.name, tc.function.arguments))
                            .collect(),
                    },
                    finish_reason: choice.finish_reason,
                })
                .collect(),
            usage: self.usage.map(ApiUsage::into_usage),
            model: self.model,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiChoice {
    pub(crate) message: ApiResponseMessage,
    #[serde(default)]
    pub(crate) finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponseMessage {
    #[serde(default)]
    pub(crate) content: Option<MessageContent>,
    #[serde(default)]
    pub(crate) tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiUsage {
    pub(crate) prompt_tokens: u32,
    #[serde(default)]
    pub(crate) completion_tokens: u32,
    #[serde(default)]
    pub(crate) total_tokens: u32,
}

impl ApiUsage {
    fn into_usage(self) -> Usage {
        Usage {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens: self.total_tokens,
        }
    }
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` payload.
#[derive(Debug, Deserialize)]
pub(crate) struct StreamResponse {
    #[serde(default)]
    pub(crate) choices: Vec<StreamChoice>,
    #[serde(default)]
    pub(crate) usage: Option<ApiUsage>,
    /// Some gateways report failures in-band
    #[serde(default)]
    pub(crate) error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StreamError {
    #[serde(default)]
    pub(crate) message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StreamChoice {
    #[serde(default)]
    pub(crate) delta: StreamDelta,
    #[serde(default)]
    pub(crate) finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StreamDelta {
    #[serde(default)]
    pub(crate) content: Option<String>,
    #[serde(default)]
    pub(crate) tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call fragment as sent on the wire.
#[derive(Debug, Deserialize)]
pub(crate) struct StreamToolCallDelta {
    #[serde(default)]
    pub(crate) index: Option<u32>,
    #[serde(default)]
    pub(crate) id: Option<String>,
    #[serde(default)]
    pub(crate) function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StreamFunctionDelta {
    #[serde(default)]
    pub(crate) name: Option<String>,
    #[serde(default)]
    pub(crate) arguments: Option<String>,
}
