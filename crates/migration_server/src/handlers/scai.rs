use std::path::PathBuf;

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use event_stream::{sse_response, with_heartbeat, StreamEvent};
use migration_context::{MigrationContext, RunStatus, WorkflowRun};
use migration_workflow::{resume as resume_run, run as run_workflow, RunnerEvent};

use crate::cookies::read_session_id;
use crate::error::{ApiError, Result};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    project_name: String,
    source_language: String,
    #[serde(default)]
    source_dir: Option<String>,
    #[serde(default)]
    crosswalk_path: Option<String>,
}

pub async fn start(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<StartRequest>,
) -> Result<HttpResponse> {
    let session_id = read_session_id(&req, &state.config).ok_or(ApiError::NoSession)?;

    let source_dir = body
        .source_dir
        .clone()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("uploads").join(&body.project_name));

    let mut context = MigrationContext::new(body.project_name.clone(), source_dir);
    context.source_language = body.source_language.clone();
    context.session_id = Some(session_id);
    context.crosswalk_path = body.crosswalk_path.clone().map(PathBuf::from);

    let run_id = context.run_id;
    let workflow_run = WorkflowRun::new(context);
    state.register_run(workflow_run).await;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "run_id": run_id,
        "status": "pending",
    })))
}

fn to_stream_event(event: RunnerEvent) -> StreamEvent {
    match event {
        RunnerEvent::Activity(entry) => StreamEvent::DataWorkflowStatus {
            data: serde_json::to_value(entry).unwrap_or(serde_json::Value::Null),
        },
        RunnerEvent::Decision {
            after_stage,
            decision,
            reasoning,
        } => StreamEvent::DataSupervisorReasoning {
            data: serde_json::json!({
                "afterStage": after_stage,
                "decision": decision,
                "reasoning": reasoning,
            }),
        },
        RunnerEvent::Status(snapshot) => StreamEvent::DataWorkflowStatus {
            data: serde_json::to_value(snapshot).unwrap_or(serde_json::Value::Null),
        },
        RunnerEvent::HumanReviewRequired {
            reason,
            missing_objects,
        } => StreamEvent::DataHumanReviewRequired {
            data: serde_json::json!({ "reason": reason, "missingObjects": missing_objects }),
        },
        RunnerEvent::Completed(report) => StreamEvent::Finish {
            message_metadata: serde_json::to_value(report).ok(),
        },
        RunnerEvent::Failed(message) => StreamEvent::Error { error_text: message },
        RunnerEvent::Aborted => StreamEvent::Abort {
            reason: "run cancelled".to_string(),
        },
    }
}

/// Looks up the run's upstream session via its recorded session id. A run
/// created without a live Snowflake session (or whose session has since
/// expired) cannot progress past `init_project`/`add_source_code`, but
/// those stages don't need the session — only `execute_sql` and the
/// supervisor's LLM calls do, and they'll fail their own missing-session
/// fallback if this ever returns `None` for a run that reaches that far.
async fn session_for(
    state: &AppState,
    ctx_session_id: &Option<String>,
) -> Option<std::sync::Arc<snowflake_session::SnowflakeContext>> {
    let session_id = ctx_session_id.as_ref()?;
    state.snowflake.get(session_id).await
}

async fn stream_events(
    state: web::Data<AppState>,
    mut rx: mpsc::Receiver<RunnerEvent>,
) -> impl futures::Stream<Item = std::result::Result<bytes::Bytes, actix_web::Error>> {
    let ping_interval = std::time::Duration::from_secs(state.config.sse_ping_interval_seconds);
    let (stream_tx, stream_rx) = mpsc::channel::<StreamEvent>(64);
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if stream_tx.send(to_stream_event(event)).await.is_err() {
                break;
            }
        }
    });
    with_heartbeat(stream_rx, ping_interval)
}

pub async fn stream_run(path: web::Path<Uuid>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let run_id = path.into_inner();
    let run = state.get_run(run_id).await.ok_or(ApiError::RunNotFound(run_id))?;

    let (event_tx, event_rx) = mpsc::channel::<RunnerEvent>(256);
    let body = stream_events(state.clone(), event_rx).await;

    state.stream_registry.register(&run_id.to_string());

    let stream_registry = state.stream_registry.clone();
    tokio::spawn(async move {
        let mut guard = run.lock().await;
        if guard.status != RunStatus::Pending {
            stream_registry.unregister(&run_id.to_string());
            return;
        }
        let session = session_for(&state, &guard.context.session_id.clone()).await;
        let Some(session) = session else {
            guard.context.record_fatal_error("no upstream Snowflake session for this run");
            guard.status = RunStatus::Failed;
            let _ = event_tx.send(RunnerEvent::Failed(
                "no upstream Snowflake session for this run".to_string(),
            )).await;
            stream_registry.unregister(&run_id.to_string());
            return;
        };
        run_workflow(
            &mut guard,
            session.executor.as_ref(),
            None,
            session.llm.as_ref(),
            Some(&session.model_config.model),
            &session.query_lock,
            event_tx,
        )
        .await;
        stream_registry.unregister(&run_id.to_string());
    });

    Ok(sse_response(body))
}

pub async fn status(path: web::Path<Uuid>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let run_id = path.into_inner();
    let run = state.get_run(run_id).await.ok_or(ApiError::RunNotFound(run_id))?;
    let guard = run.lock().await;
    Ok(HttpResponse::Ok().json(guard.context.snapshot()))
}

pub async fn resume(path: web::Path<Uuid>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let run_id = path.into_inner();
    let run = state.get_run(run_id).await.ok_or(ApiError::RunNotFound(run_id))?;

    {
        let guard = run.lock().await;
        if guard.status != RunStatus::Paused {
            return Err(ApiError::BadRequest("run is not paused".to_string()));
        }
    }

    let (event_tx, event_rx) = mpsc::channel::<RunnerEvent>(256);
    let body = stream_events(state.clone(), event_rx).await;

    state.stream_registry.register(&run_id.to_string());

    let stream_registry = state.stream_registry.clone();
    tokio::spawn(async move {
        let mut guard = run.lock().await;
        let session = session_for(&state, &guard.context.session_id.clone()).await;
        let Some(session) = session else {
            guard.context.record_fatal_error("no upstream Snowflake session for this run");
            guard.status = RunStatus::Failed;
            let _ = event_tx.send(RunnerEvent::Failed(
                "no upstream Snowflake session for this run".to_string(),
            )).await;
            stream_registry.unregister(&run_id.to_string());
            return;
        };
        let _ = resume_run(
            &mut guard,
            session.executor.as_ref(),
            None,
            session.llm.as_ref(),
            Some(&session.model_config.model),
            &session.query_lock,
            event_tx,
        )
        .await;
        stream_registry.unregister(&run_id.to_string());
    });

    Ok(sse_response(body))
}
