//! Shared mocks for tool tests.

use std::sync::Mutex;

use async_trait::async_trait;
use stepforge_core::error::ProviderError;
use stepforge_core::message::Message;
use stepforge_core::responder::Responder;

/// A responder that returns a fixed reply and remembers the last request.
pub struct CapturingResponder {
    reply: Option<String>,
    seen: Mutex<Vec<Message>>,
}

impl CapturingResponder {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// A responder whose every call fails with a network error.
    pub fn failing() -> Self {
        Self {
            reply: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn last_messages(&self) -> Vec<Message> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Responder for CapturingResponder {
    fn name(&self) -> &str {
        "capturing"
    }

    async fn respond(&self, messages: &[Message]) -> Result<String, ProviderError> {
        *self.seen.lock().unwrap() = messages.to_vec();
        self.reply
            .clone()
            .ok_or_else(|| ProviderError::Network("connection refused".into()))
    }
}
