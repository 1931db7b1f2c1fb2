//! Server-sent events reader for streaming completions.

use chatweave_core::error::ProviderError;
use chatweave_core::provider::{ChunkReceiver, StreamChunk};
use futures::StreamExt;
use tracing::{debug, trace};

use crate::wire::{Dialect, StreamResponse};

/// One decoded SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SseEvent {
    /// A `data:` payload.
    Data(String),
    /// The `[DONE]` terminator.
    Done,
}

/// Line-buffering decoder. Bytes may split lines (and UTF-8 sequences)
/// arbitrarily, so incomplete tails are held until the next push.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning every event completed by them.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(line_end) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = Self::parse_line(line.trim_end_matches(['\n', '\r'])) {
                events.push(event);
            }
        }
        events
    }

    /// Whatever remains once the body ends without a trailing newline.
    pub(crate) fn finish(&mut self) -> Option<SseEvent> {
        let rest = std::mem::take(&mut self.pending);
        let rest = String::from_utf8_lossy(&rest);
        Self::parse_line(rest.trim_end_matches('\r'))
    }

    fn parse_line(line: &str) -> Option<SseEvent> {
        // Skip empty lines, SSE comments and non-data fields
        let data = line.strip_prefix("data:")?.trim();
        if data.is_empty() {
            return None;
        }
        if data == "[DONE]" {
            return Some(SseEvent::Done);
        }
        Some(SseEvent::Data(data.to_string()))
    }
}

/// What to do with one event.
enum Step {
    Send(Result<StreamChunk, ProviderError>),
    Skip,
    Stop,
}

fn step(event: SseEvent, dialect: Dialect, provider: &str) -> Step {
    let data = match event {
        SseEvent::Done => return Step::Stop,
        SseEvent::Data(data) => data,
    };

    match serde_json::from_str::<StreamResponse>(&data) {
        Ok(mut response) => match response.error.take() {
            Some(error) => Step::Send(Err(ProviderError::ApiError {
                status_code: 200,
                message: error.message,
            })),
            None => Step::Send(Ok(dialect.chunk(response))),
        },
        Err(e) => {
            trace!(
                provider = %provider,
                data = %data,
                error = %e,
                "Ignoring unparseable SSE chunk"
            );
            Step::Skip
        }
    }
}

/// Spawn a task that reads the SSE body and forwards normalized chunks.
///
/// The receiver sees the channel close after `[DONE]`, at end of body, or
/// right after a transport error has been delivered.
pub(crate) fn spawn_reader(
    response: reqwest::Response,
    dialect: Dialect,
    provider: String,
) -> ChunkReceiver {
    let (tx, rx) = tokio::sync::mpsc::channel(64);

    tokio::spawn(async move {
        let mut byte_stream = response.bytes_stream();
        let mut decoder = SseDecoder::new();

        while let Some(chunk_result) = byte_stream.next().await {
            let bytes = match chunk_result {
                Ok(b) => b,
                Err(e) => {
                    let _ = tx
                        .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                        .await;
                    return;
                }
            };

            for event in decoder.push(&bytes) {
                match step(event, dialect, &provider) {
                    Step::Send(item) => {
                        if tx.send(item).await.is_err() {
                            debug!(provider = %provider, "Stream receiver dropped");
                            return;
                        }
                    }
                    Step::Skip => {}
                    Step::Stop => return,
                }
            }
        }

        if let Some(event) = decoder.finish() {
            if let Step::Send(item) = step(event, dialect, &provider) {
                let _ = tx.send(item).await;
            }
        }
    });

    rx
}
