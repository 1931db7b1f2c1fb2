//! Reassembly of streamed tool calls.
//!
//! Providers stream a tool call as a series of fragments. OpenAI tags every
//! fragment with the call's position (`index`); Mistral sends calls whole and
//! keys them by `id`. A slot is found by whichever key the fragment carries,
//! and each non-empty fragment field is appended to it.

use chatweave_core::error::ProviderError;
use chatweave_core::message::ToolCall;
use chatweave_core::provider::{ChunkReceiver, StreamChunk, ToolCallDelta, UNSET_TOOL_CALL_ID, Usage};
use tracing::trace;

fn is_unset_id(id: &str) -> bool {
    id.is_empty() || id == UNSET_TOOL_CALL_ID
}

#[derive(Debug, Default)]
struct SlotFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Default)]
struct Slot {
    index: Option<u32>,
    id: String,
    function: Option<SlotFunction>,
}

impl Slot {
    fn id_is_unset(&self) -> bool {
        is_unset_id(&self.id)
    }

    fn matches(&self, delta: &ToolCallDelta) -> bool {
        match delta.index {
            Some(index) => self.index == Some(index),
            // calls without an id arrive whole and never continue a slot
            None => match delta.id.as_deref() {
                Some(id) if !is_unset_id(id) => self.index.is_none() && self.id == id,
                _ => false,
            },
        }
    }

    fn merge(&mut self, delta: ToolCallDelta) {
        // id-keyed slots already hold the fragment's id
        if delta.index.is_some() {
            if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
                if self.id_is_unset() {
                    self.id = id;
                } else {
                    self.id.push_str(&id);
                }
            }
        }

        let Some(fragment) = delta.function else {
            return;
        };
        let function = self.function.get_or_insert_with(SlotFunction::default);
        if let Some(name) = fragment.name {
            function.name.push_str(&name);
        }
        if let Some(arguments) = fragment.arguments {
            function.arguments.push_str(&arguments);
        }
    }

    fn into_tool_call(self) -> ToolCall {
        let function = self.function.unwrap_or_default();
        ToolCall::new(self.id, function.name, function.arguments)
    }
}

impl From<ToolCallDelta> for Slot {
    fn from(delta: ToolCallDelta) -> Self {
        Self {
            index: delta.index,
            id: delta.id.unwrap_or_default(),
            function: delta.function.map(|f| SlotFunction {
                name: f.name.unwrap_or_default(),
                arguments: f.arguments.unwrap_or_default(),
            }),
        }
    }
}

/// Merges tool-call fragments into complete calls, in first-seen order.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    slots: Vec<Slot>,
    usage: Option<Usage>,
}

/// Everything gathered once the stream is exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushedToolCalls {
    pub tool_calls: Vec<ToolCall>,

    /// Usage reported by any chunk seen while flushing, summed
    pub usage: Option<Usage>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the fragments of the chunk that decided the turn.
    ///
    /// Each of them opens its own slot; only later chunks are merged.
    pub fn seeded(deltas: impl IntoIterator<Item = ToolCallDelta>) -> Self {
        Self {
            slots: deltas.into_iter().map(Slot::from).collect(),
            usage: None,
        }
    }

    fn slot_mut(&mut self, delta: &ToolCallDelta) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|slot| slot.matches(delta))
    }

    /// Merge one fragment into its slot, or open a new slot for it.
    pub fn absorb(&mut self, delta: ToolCallDelta) {
        match self.slot_mut(&delta) {
            Some(slot) => slot.merge(delta),
            None => self.slots.push(Slot::from(delta)),
        }
    }

    /// Merge the tool-call fragments of a chunk's first choice and keep any
    /// usage it reports.
    pub fn absorb_chunk(&mut self, chunk: StreamChunk) {
        if let Some(usage) = chunk.usage {
            self.usage = Some(match self.usage {
                Some(seen) => Usage {
                    prompt_tokens: seen.prompt_tokens + usage.prompt_tokens,
                    completion_tokens: seen.completion_tokens + usage.completion_tokens,
                    total_tokens: seen.total_tokens + usage.total_tokens,
                },
                None => usage,
            });
        }

        // we always request a single result
        let Some(choice) = chunk.choices.into_iter().next() else {
            return;
        };
        for delta in choice.delta.tool_calls.unwrap_or_default() {
            self.absorb(delta);
        }
    }

    /// Number of distinct calls seen so far.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drain `stream` to its end and return the assembled calls.
    ///
    /// A chunk error aborts the flush and is returned unchanged.
    pub async fn flush(
        mut self,
        stream: &mut ChunkReceiver,
    ) -> Result<FlushedToolCalls, ProviderError> {
        while let Some(chunk) = stream.recv().await {
            let chunk = chunk?;
            trace!(slots = self.slots.len(), "Absorbing tool call chunk");
            self.absorb_chunk(chunk);
        }
        Ok(self.finish())
    }

    /// The calls assembled so far.
    pub fn finish(self) -> FlushedToolCalls {
        FlushedToolCalls {
            tool_calls: self.slots.into_iter().map(Slot::into_tool_call).collect(),
            usage: self.usage,
        }
    }
}
