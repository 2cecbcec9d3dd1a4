use futures::stream;

use crate::provider::LlmStream;
use crate::types::LlmChunk;

const CHUNK_SIZE: usize = 80;

/// Chunk a fully-buffered completion into fixed-width deltas, for when
/// streaming fails before the first event (SPEC_FULL.md §4.3).
pub fn buffered_stream(text: String) -> LlmStream {
    let chunks: Vec<String> = text
        .chars()
        .collect::<Vec<char>>()
        .chunks(CHUNK_SIZE)
        .map(|c| c.iter().collect())
        .collect();

    Box::pin(stream::iter(chunks.into_iter().map(|chunk| Ok(LlmChunk::Delta(chunk)))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn chunks_text_into_eighty_character_windows() {
        let text = "a".repeat(170);
        let mut stream = buffered_stream(text);
        let mut deltas = Vec::new();
        while let Some(chunk) = stream.next().await {
            if let LlmChunk::Delta(delta) = chunk.unwrap() {
                deltas.push(delta);
            }
        }
        assert_eq!(deltas.len(), 3);
        assert_eq!(deltas[0].len(), 80);
        assert_eq!(deltas[1].len(), 80);
        assert_eq!(deltas[2].len(), 10);
    }

    #[tokio::test]
    async fn empty_text_yields_no_deltas() {
        let mut stream = buffered_stream(String::new());
        assert!(stream.next().await.is_none());
    }
}
