//! Responder trait: the abstraction over language models.
//!
//! A responder turns an ordered list of messages into text. StepForge never
//! talks to a model directly: tools that need to reason over content, the
//! planner, and the synthesizer all receive an `Arc<dyn Responder>` and stay
//! agnostic of which backend sits behind it.

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::message::Message;

/// The core Responder trait.
#[async_trait]
pub trait Responder: Send + Sync {
    /// A human-readable name for this responder (e.g., "openrouter", "mock").
    fn name(&self) -> &str;

    /// Send the messages and return the generated text.
    async fn respond(&self, messages: &[Message]) -> std::result::Result<String, ProviderError>;
}
