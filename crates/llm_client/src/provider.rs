use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::Result;
use crate::types::{LlmChunk, Message};

pub type LlmStream = Pin<Box<dyn Stream<Item = Result<LlmChunk>> + Send>>;

/// Abstracts the model provider. Callers are expected to serialize access
/// per upstream session themselves (see SPEC_FULL.md §4.3, "Concurrency") —
/// this trait does not take a lock.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat_stream(&self, messages: &[Message], model: Option<&str>) -> Result<LlmStream>;
}
