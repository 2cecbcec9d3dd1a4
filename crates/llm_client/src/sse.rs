use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Response;

use crate::error::{LlmError, Result};
use crate::provider::LlmStream;
use crate::types::LlmChunk;

/// Wrap a streaming HTTP response in an SSE parser, running each event's
/// raw JSON payload through `handler` to pull out a delta or usage chunk.
/// `[DONE]` (and any handler returning `Ok(None)`) is swallowed rather than
/// surfaced as a chunk.
pub fn llm_stream_from_sse<H>(response: Response, mut handler: H) -> LlmStream
where
    H: FnMut(&str) -> Result<Option<LlmChunk>> + Send + 'static,
{
    let stream = response.bytes_stream().eventsource().filter_map(move |event| {
        let result = match event {
            Ok(event) => {
                if event.data == "[DONE]" {
                    Ok(None)
                } else {
                    handler(&event.data)
                }
            }
            Err(e) => Err(LlmError::Stream(e.to_string())),
        };
        futures::future::ready(match result {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        })
    });

    Box::pin(stream)
}
