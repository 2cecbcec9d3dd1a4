use std::time::Duration;

use actix_web::HttpResponse;
use bytes::Bytes;
use futures::Stream;
use tokio::sync::mpsc;

use crate::event::StreamEvent;

/// Framed as `data: <json>\n\n`, the envelope every SSE consumer (Vercel AI
/// SDK's `useChat`, our own terminal/workflow panels) expects.
pub fn format_event(event: &StreamEvent) -> Bytes {
    let json = serde_json::to_string(event).expect("StreamEvent serialization is infallible");
    Bytes::from(format!("data: {json}\n\n"))
}

pub fn done_frame() -> Bytes {
    Bytes::from_static(b"data: [DONE]\n\n")
}

pub fn heartbeat_frame() -> Bytes {
    Bytes::from_static(b": ping\n\n")
}

/// Sets the headers the Vercel AI SDK's data-stream protocol and nginx/proxy
/// layers need to not buffer or reinterpret the stream, then attaches `body`.
pub fn sse_response<S>(body: S) -> HttpResponse
where
    S: Stream<Item = Result<Bytes, actix_web::Error>> + 'static,
{
    HttpResponse::Ok()
        .content_type("text/event-stream")
        .append_header(("Cache-Control", "no-cache, no-transform"))
        .append_header(("X-Accel-Buffering", "no"))
        .append_header(("x-vercel-ai-ui-message-stream", "v1"))
        .append_header(("x-vercel-ai-protocol", "data"))
        .streaming(body)
}

/// Wraps an event channel into a framed byte stream, interleaving a
/// `: ping\n\n` comment line on the given interval so proxies and browsers
/// don't time the connection out during long LLM turns or SQL executions.
/// Terminates (after emitting the `[DONE]` trailer) once `rx` is closed.
pub fn with_heartbeat(
    mut rx: mpsc::Receiver<StreamEvent>,
    ping_interval: Duration,
) -> impl Stream<Item = Result<Bytes, actix_web::Error>> {
    async_stream::stream! {
        loop {
            tokio::select! {
                maybe_event = rx.recv() => {
                    match maybe_event {
                        Some(event) => yield Ok(format_event(&event)),
                        None => {
                            yield Ok(done_frame());
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep(ping_interval) => {
                    yield Ok(heartbeat_frame());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::StreamEvent;

    #[test]
    fn format_event_wraps_json_in_data_frame() {
        let event = StreamEvent::Start { message_id: "abc".to_string() };
        let frame = format_event(&event);
        let text = std::str::from_utf8(&frame).unwrap();
        assert!(text.starts_with("data: "));
        assert!(text.ends_with("\n\n"));
        assert!(text.contains("\"type\":\"start\""));
    }

    #[test]
    fn done_and_heartbeat_frames_are_literal() {
        assert_eq!(&done_frame()[..], b"data: [DONE]\n\n");
        assert_eq!(&heartbeat_frame()[..], b": ping\n\n");
    }

    #[tokio::test]
    async fn with_heartbeat_emits_done_after_channel_closes() {
        use futures::StreamExt;

        let (tx, rx) = mpsc::channel(4);
        tx.send(StreamEvent::Finish { message_metadata: None })
            .await
            .unwrap();
        drop(tx);

        let stream = with_heartbeat(rx, Duration::from_secs(30));
        tokio::pin!(stream);

        let first = stream.next().await.unwrap().unwrap();
        assert!(std::str::from_utf8(&first).unwrap().contains("\"type\":\"finish\""));

        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(&second[..], b"data: [DONE]\n\n");

        assert!(stream.next().await.is_none());
    }
}
