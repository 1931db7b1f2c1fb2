//! The non-streaming chat loop.
//!
//! Each turn runs inside its own `chat_response` scope: call the provider,
//! record usage, then either execute the requested tools and go around
//! again, or return the final content. The scope of a tool turn is closed
//! before the next turn opens, so turns appear as siblings in the report.

use std::sync::Arc;

use chatweave_config::ChatConfig;
use chatweave_core::error::{Error, Result};
use chatweave_core::message::Conversation;
use chatweave_core::progress::Progress;
use chatweave_core::provider::{CompletionMessage, Provider};
use chatweave_core::tool::Toolset;
use chatweave_telemetry::{Scope, TokenUsage};
use tracing::{debug, info};

use crate::executor::execute_tool_calls;
use crate::stream_event::ToolStatus;

/// Drives a conversation with `Provider::complete` until the model answers.
pub struct ChatLoop {
    provider: Arc<dyn Provider>,
    config: ChatConfig,
    toolset: Option<Arc<dyn Toolset>>,
    progress: Progress<ToolStatus>,
}

impl ChatLoop {
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

    /// Receive tool status updates.
    pub fn with_progress(mut self, progress: Progress<ToolStatus>) -> Self {
        self.progress = progress;
        self
    }

    /// Run turns until the model produces content.
    ///
    /// Tool turns append the assistant request and one result per call to
    /// `conversation`. The final answer is returned, not appended.
    pub async fn run(&self, conversation: &mut Conversation, scope: &Scope) -> Result<String> {
        info!(
            conversation_id = %conversation.id,
            messages = conversation.len(),
            provider = %self.provider.name(),
            "Starting chat"
        );

        let tools = self
            .toolset
            .as_ref()
            .map(|toolset| toolset.available_tools())
            .unwrap_or_default();
        let mut tool_turns = 0u32;

        loop {
            let turn = scope.nested("chat_response");
            turn.record_arguments(crate::arguments_trace(conversation)?);

            debug!(
                conversation_id = %conversation.id,
                turn = tool_turns + 1,
                "Requesting completion"
            );
            let request = self
                .config
                .to_request(conversation.messages.clone(), tools.clone(), false);
            let response = self.provider.complete(request).await?;

            if let Some(usage) = response.usage {
                turn.record(TokenUsage::from(usage));
            }

            let Some(choice) = response.choices.first() else {
                return Err(Error::invalid_completion(
                    "missing choices",
                    &response,
                ));
            };
            let CompletionMessage {
                content,
                tool_calls,
            } = choice.message.clone();

            match &self.toolset {
                Some(toolset) if !tool_calls.is_empty() => {
                    if tool_turns >= self.config.recursion_limit {
                        return Err(Error::RecursionLimit {
                            limit: self.config.recursion_limit,
                        });
                    }
                    let trace = serde_json::to_value(&tool_calls)?;
                    let messages =
                        execute_tool_calls(tool_calls, toolset.as_ref(), &self.progress).await;
                    conversation.extend(messages);
                    turn.record_result(trace);
                    tool_turns += 1;
                    // close this turn before the next one opens
                    turn.exit();
                }
                _ => match content {
                    Some(content) if !content.is_empty() => {
                        let text = content.into_text();
                        turn.record_result(serde_json::Value::String(text.clone()));
                        info!(
                            conversation_id = %conversation.id,
                            tool_turns,
                            "Chat finished"
                        );
                        return Ok(text);
                    }
                    _ => {
                        return Err(Error::invalid_completion("missing content", &response));
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream_event::{ToolCallStatus, ToolStatus};
    use std::sync::Mutex;
    use crate::test_helpers::{
        ScriptedProvider, ScriptedToolset, Turn, collecting, text_response, tool_response,
    };
    use chatweave_core::error::ProviderError;
    use chatweave_core::message::{Message, Role, ToolCall};
    use chatweave_core::provider::{Choice, MessageContent, ProviderResponse, Usage};

    fn conversation() -> Conversation {
        Conversation::from(vec![Message::system("Be brief"), Message::user("What time is it?")])
    }

    #[tokio::test]
    async fn content_is_returned_unchanged() {
        let provider = Arc::new(ScriptedProvider::new(vec![Turn::Complete(text_response(
            "  Noon, probably.  ",
            Some(Usage::new(12, 4)),
        ))]));
        let chat = ChatLoop::new(provider.clone(), ChatConfig::default());

        let root = Scope::root("test");
        let mut conv = conversation();
        let answer = chat.run(&mut conv, &root).await.unwrap();

        assert_eq!(answer, "  Noon, probably.  ");
        assert_eq!(conv.len(), 2);
        assert_eq!(root.metric::<TokenUsage>(), Some(TokenUsage::new(12, 4)));

        let request = &provider.requests()[0];
        assert!(!request.stream);
        assert!(request.tools.is_empty());
        assert_eq!(request.model, ChatConfig::default().model);
    }

    #[tokio::test]
    async fn tool_trace_is_recorded_once_tools_have_run() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Turn::Complete(tool_response(vec![ToolCall::new("call_1", "clock", "{}")], None)),
            Turn::Complete(text_response("Noon", None)),
        ]));
        let root = Arc::new(Scope::root("test"));
        let during = Arc::new(Mutex::new(Vec::new()));
        let progress = {
            let root = Arc::clone(&root);
            let during = Arc::clone(&during);
            Progress::new(move |status: ToolStatus| {
                if status.status == ToolCallStatus::Started {
                    let result = root.report().children[0].result.clone();
                    during.lock().unwrap().push(result);
                }
            })
        };
        let chat = ChatLoop::new(provider, ChatConfig::default())
            .with_toolset(Arc::new(ScriptedToolset::new().respond("clock", "12:00")))
            .with_progress(progress);

        chat.run(&mut conversation(), &root).await.unwrap();

        assert_eq!(*during.lock().unwrap(), vec![None]);
        let trace = root.report().children[0].result.clone().unwrap();
        assert_eq!(trace[0]["name"], "clock");
    }

    #[tokio::test]
    async fn empty_choices_are_invalid() {
        let provider = Arc::new(ScriptedProvider::new(vec![Turn::Complete(ProviderResponse {
            choices: vec![],
            usage: None,
            model: "m".into(),
        })]));
        let chat = ChatLoop::new(provider, ChatConfig::default());

        let err = chat
            .run(&mut conversation(), &Scope::root("test"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCompletion { ref reason, .. } if reason == "missing choices"));
    }

    #[tokio::test]
    async fn empty_content_is_invalid() {
        let provider = Arc::new(ScriptedProvider::new(vec![Turn::Complete(text_response(
            "", None,
        ))]));
        let chat = ChatLoop::new(provider, ChatConfig::default());

        let err = chat
            .run(&mut conversation(), &Scope::root("test"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCompletion { ref reason, .. } if reason == "missing content"));
    }

    #[tokio::test]
    async fn parts_content_is_coerced_to_text() {
        let mut response = text_response("", None);
        response.choices = vec![Choice {
            message: CompletionMessage {
                content: Some(MessageContent::Parts(vec![
                    serde_json::json!({"type": "text", "text": "It is "}),
                    serde_json::json!({"type": "text", "text": "noon"}),
                ])),
                tool_calls: vec![],
            },
            finish_reason: None,
        }];
        let provider = Arc::new(ScriptedProvider::new(vec![Turn::Complete(response)]));
        let chat = ChatLoop::new(provider, ChatConfig::default());

        let answer = chat
            .run(&mut conversation(), &Scope::root("test"))
            .await
            .unwrap();
        assert_eq!(answer, "It is noon");
    }

    #[tokio::test]
    async fn tool_turn_grows_transcript_and_recurses() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Turn::Complete(tool_response(
                vec![
                    ToolCall::new("call_1", "clock", "{}"),
                    ToolCall::new("call_2", "weather", "{\"city\":\"Oslo\"}"),
                ],
                Some(Usage::new(10, 5)),
            )),
            Turn::Complete(text_response("Noon and sunny.", Some(Usage::new(20, 15)))),
        ]));
        let toolset = Arc::new(
            ScriptedToolset::new()
                .respond("clock", "12:00")
                .respond("weather", "sunny"),
        );
        let (progress, events) = collecting::<ToolStatus>();
        let chat = ChatLoop::new(provider.clone(), ChatConfig::default())
            .with_toolset(toolset.clone())
            .with_progress(progress);

        let root = Scope::root("test");
        let mut conv = conversation();
        let answer = chat.run(&mut conv, &root).await.unwrap();

        assert_eq!(answer, "Noon and sunny.");
        // assistant request + one result per call
        assert_eq!(conv.len(), 2 + 1 + 2);
        assert_eq!(conv.messages[2].role, Role::Assistant);
        assert_eq!(conv.messages[3].content, "12:00");
        assert_eq!(conv.messages[4].content, "sunny");

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].messages.len(), 2);
        assert_eq!(requests[1].messages.len(), 5);
        assert_eq!(requests[0].tools.len(), 2);

        assert_eq!(toolset.calls()[1].arguments, "{\"city\":\"Oslo\"}");
        assert_eq!(
            events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.status == ToolCallStatus::Finished)
                .count(),
            2
        );

        // sibling turns sum into the caller's scope
        assert_eq!(root.metric::<TokenUsage>(), Some(TokenUsage::new(30, 20)));
        let report = root.report();
        assert_eq!(report.children.len(), 2);
        assert!(report.children.iter().all(|c| c.label == "chat_response"));
        assert!(report.children.iter().all(|c| c.duration_ms.is_some()));
        assert_eq!(
            report.children[1].result,
            Some(serde_json::json!("Noon and sunny."))
        );
    }

    #[tokio::test]
    async fn tool_calls_without_toolset_fall_back_to_content() {
        let mut response = tool_response(vec![ToolCall::new("call_1", "clock", "{}")], None);
        response.choices[0].message.content = Some(MessageContent::from("I cannot check."));
        let provider = Arc::new(ScriptedProvider::new(vec![Turn::Complete(response)]));
        let chat = ChatLoop::new(provider, ChatConfig::default());

        let mut conv = conversation();
        let answer = chat.run(&mut conv, &Scope::root("test")).await.unwrap();
        assert_eq!(answer, "I cannot check.");
        assert_eq!(conv.len(), 2);
    }

    #[tokio::test]
    async fn recursion_limit_stops_endless_tool_turns() {
        let turn = || {
            Turn::Complete(tool_response(
                vec![ToolCall::new("call_1", "clock", "{}")],
                None,
            ))
        };
        let provider = Arc::new(ScriptedProvider::new(vec![turn(), turn(), turn()]));
        let config = ChatConfig {
            recursion_limit: 2,
            ..ChatConfig::default()
        };
        let chat = ChatLoop::new(provider.clone(), config)
            .with_toolset(Arc::new(ScriptedToolset::new().respond("clock", "12:00")));

        let mut conv = conversation();
        let err = chat.run(&mut conv, &Scope::root("test")).await.unwrap_err();
        assert!(matches!(err, Error::RecursionLimit { limit: 2 }));
        assert_eq!(provider.requests().len(), 3);
        assert_eq!(conv.len(), 2 + 2 * 2);
    }

    #[tokio::test]
    async fn provider_errors_propagate() {
        let provider = Arc::new(ScriptedProvider::new(vec![Turn::Fail(
            ProviderError::RateLimited {
                retry_after_secs: 3,
            },
        )]));
        let chat = ChatLoop::new(provider, ChatConfig::default());

        let err = chat
            .run(&mut conversation(), &Scope::root("test"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Provider(ProviderError::RateLimited {
                retry_after_secs: 3
            })
        ));
    }
}
