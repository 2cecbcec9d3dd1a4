//! LLM provider abstraction: message-list in, text deltas + optional usage
//! out. Streaming preferred via SSE, buffered 80-char chunking fallback on
//! pre-first-event failure. See SPEC_FULL.md §4.3.

mod buffered;
mod error;
mod generic_provider;
mod prompt;
mod provider;
mod sse;
mod types;

pub use buffered::buffered_stream;
pub use error::{LlmError, Result};
pub use generic_provider::GenericHttpProvider;
pub use prompt::escape_dollar_quote;
pub use provider::{LlmProvider, LlmStream};
pub use sse::llm_stream_from_sse;
pub use types::{LlmChunk, Message, Role, Usage};
