//! LLM provider adapters for Chatweave.
//!
//! All adapters implement the `chatweave_core::Provider` trait and normalize
//! their wire format (including tool-call delta keying) before a chunk ever
//! reaches the chat loops. The router selects an adapter from configuration.

pub mod mistral;
pub mod openai_compat;
pub mod router;
mod sse;
mod wire;

pub use mistral::MistralProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::ProviderRouter;
