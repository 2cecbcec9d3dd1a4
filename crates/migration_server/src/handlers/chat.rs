use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use chat_loop::{run_chat_loop, ChatEvent};
use event_stream::{sse_response, with_heartbeat, StreamEvent};
use llm_client::{Message, Role};

use crate::cookies::read_session_id;
use crate::error::{ApiError, Result};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    id: Option<String>,
    messages: Vec<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    protocol: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    source_language: Option<String>,
}

fn to_internal_role(role: &str) -> Role {
    match role {
        "system" => Role::System,
        "assistant" => Role::Assistant,
        _ => Role::User,
    }
}

/// Maps the chat loop's internal events onto the typed SSE union,
/// generating fresh per-turn ids for the text/reasoning block framing the
/// Vercel AI SDK's `useChat` expects.
fn to_stream_events(event: ChatEvent, text_id: &str, reasoning_id: &str) -> Vec<StreamEvent> {
    match event {
        ChatEvent::Delta(delta) => vec![StreamEvent::TextDelta {
            id: text_id.to_string(),
            delta,
        }],
        ChatEvent::Reasoning(delta) => vec![StreamEvent::ReasoningDelta {
            id: reasoning_id.to_string(),
            delta,
        }],
        ChatEvent::CommandStart(command) => vec![StreamEvent::ToolInputAvailable {
            id: text_id.to_string(),
            input: serde_json::json!({ "command": command }),
        }],
        ChatEvent::CommandOutput(output) => vec![StreamEvent::ToolOutputAvailable {
            id: text_id.to_string(),
            output: serde_json::json!({ "output": output }),
        }],
        ChatEvent::Finish(summary) => vec![
            StreamEvent::TextDelta {
                id: text_id.to_string(),
                delta: summary,
            },
            StreamEvent::TextEnd {
                id: text_id.to_string(),
            },
            StreamEvent::Finish { message_metadata: None },
        ],
        ChatEvent::Pause(guidance) => vec![StreamEvent::DataHumanReviewRequired {
            data: serde_json::json!({ "reason": guidance }),
        }],
        ChatEvent::Warning(message) => vec![StreamEvent::DataWorkflowStatus {
            data: serde_json::json!({ "warning": message }),
        }],
        ChatEvent::Error(message) => vec![StreamEvent::Error { error_text: message }],
    }
}

pub async fn start(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<ChatQuery>,
    body: web::Json<ChatRequest>,
) -> Result<HttpResponse> {
    let session_id = read_session_id(&req, &state.config).ok_or(ApiError::NoSession)?;
    let pty = state
        .pty_registry
        .get(&session_id)
        .ok_or(ApiError::NoSession)?;
    let context = state
        .snowflake
        .get(&session_id)
        .await
        .ok_or(ApiError::NoSession)?;

    let chat_id = body
        .id
        .clone()
        .or_else(|| query.id.clone())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut messages: Vec<Message> = {
        let mut history = state
            .chat_histories
            .entry(chat_id.clone())
            .or_insert_with(Vec::new)
            .clone();
        for incoming in body.messages.iter() {
            history.push(Message {
                role: to_internal_role(&incoming.role),
                content: incoming.content.clone(),
            });
        }
        history
    };

    let llm = context.llm.clone();
    let model = Some(context.model_config.model.clone());
    let query_lock = context.query_lock.clone();
    let (chat_tx, mut chat_rx) = mpsc::channel::<ChatEvent>(64);
    let (stream_tx, stream_rx) = mpsc::channel::<StreamEvent>(64);
    let cancel_token = CancellationToken::new();
    let message_id = Uuid::new_v4().to_string();

    state.stream_registry.register(&chat_id);

    let histories = state.chat_histories.clone();
    let chat_id_for_task = chat_id.clone();
    let stream_registry = state.stream_registry.clone();
    tokio::spawn(async move {
        let result = run_chat_loop(
            &mut messages,
            pty,
            llm,
            model.as_deref(),
            query_lock,
            chat_tx,
            cancel_token,
        )
        .await;
        if let Err(e) = result {
            log::error!("chat loop for {chat_id_for_task} failed: {e}");
        }
        histories.insert(chat_id_for_task.clone(), messages);
        stream_registry.unregister(&chat_id_for_task);
    });

    let text_id = Uuid::new_v4().to_string();
    let reasoning_id = Uuid::new_v4().to_string();
    tokio::spawn(async move {
        let _ = stream_tx
            .send(StreamEvent::Start {
                message_id: message_id.clone(),
            })
            .await;
        let _ = stream_tx
            .send(StreamEvent::TextStart { id: text_id.clone() })
            .await;

        while let Some(event) = chat_rx.recv().await {
            for mapped in to_stream_events(event, &text_id, &reasoning_id) {
                if stream_tx.send(mapped).await.is_err() {
                    return;
                }
            }
        }
    });

    let ping_interval = std::time::Duration::from_secs(state.config.sse_ping_interval_seconds);
    Ok(sse_response(with_heartbeat(stream_rx, ping_interval)))
}

/// Reconnect probe: tells a client whether the stream it lost is still
/// live. The original always answers 204 either way — the presence check
/// exists for the registry's own bookkeeping and future richer responses,
/// not to change this status code.
pub async fn stream_reconnect(path: web::Path<String>, state: web::Data<AppState>) -> HttpResponse {
    let chat_id = path.into_inner();
    let _ = state.stream_registry.has_active_stream(&chat_id);
    HttpResponse::NoContent().finish()
}
