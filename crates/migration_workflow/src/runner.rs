use llm_client::LlmProvider;
use migration_context::{
    ActivityLogEntry, MigrationContext, MigrationStage, RunStatus, SummaryReport,
    SupervisorDecision, WorkflowRun, WorkflowStatusSnapshot,
};
use pty_session::PtySession;
use snowflake_session::SnowflakeExecutor;
use tokio::sync::{mpsc, Mutex};

use crate::error::{Result, WorkflowError};
use crate::stages::{
    add_source_code, apply_schema_mapping, convert_code, execute_sql, finalize, human_review,
    init_project, self_heal, validate,
};
use crate::supervisor::{invoke_supervisor, natural_proceed_target};

/// Everything the runner can emit while driving a run. The HTTP layer
/// turns these into SSE frames; this module knows nothing about framing.
#[derive(Debug, Clone)]
pub enum RunnerEvent {
    Activity(ActivityLogEntry),
    Decision {
        after_stage: MigrationStage,
        decision: SupervisorDecision,
        reasoning: String,
    },
    Status(WorkflowStatusSnapshot),
    HumanReviewRequired {
        reason: String,
        missing_objects: Vec<String>,
    },
    Completed(SummaryReport),
    Failed(String),
    Aborted,
}

#[allow(clippy::too_many_arguments)]
async fn run_stage_node(
    ctx: &mut MigrationContext,
    stage: MigrationStage,
    executor: &dyn SnowflakeExecutor,
    pty: Option<&PtySession>,
    llm: &dyn LlmProvider,
    model: Option<&str>,
    query_lock: &Mutex<()>,
) {
    match stage {
        MigrationStage::InitProject => init_project::init_project(ctx, pty).await,
        MigrationStage::AddSourceCode => add_source_code::add_source_code(ctx, pty).await,
        MigrationStage::ApplySchemaMapping => apply_schema_mapping::apply_schema_mapping(ctx, pty).await,
        MigrationStage::ConvertCode => convert_code::convert_code(ctx, pty).await,
        MigrationStage::ExecuteSql => execute_sql::execute_sql(ctx, executor, pty, query_lock).await,
        MigrationStage::SelfHeal => self_heal::self_heal(ctx, llm, model, pty, query_lock).await,
        MigrationStage::Validate => validate::validate(ctx, pty).await,
        MigrationStage::HumanReview => human_review::human_review(ctx, pty).await,
        MigrationStage::Finalize => finalize::finalize(ctx, pty).await,
        MigrationStage::Idle | MigrationStage::Error | MigrationStage::Completed => {}
    }
}

/// Drive `workflow_run`'s migration context through the nine-stage
/// graph: run a stage node, emit its status snapshot, then (unless it
/// just paused or completed) call the supervisor and route on its
/// decision. Stops on cancellation, a fatal stage error, human review,
/// or `finalize` completing. Grounded on `graph/scai_workflow.py`'s
/// compiled-graph topology and `graph/nodes/supervisor.py`'s
/// edge-selection logic.
pub async fn run(
    workflow_run: &mut WorkflowRun,
    executor: &dyn SnowflakeExecutor,
    pty: Option<&PtySession>,
    llm: &dyn LlmProvider,
    model: Option<&str>,
    query_lock: &Mutex<()>,
    event_tx: mpsc::Sender<RunnerEvent>,
) {
    workflow_run.status = RunStatus::Running;
    workflow_run.paused = false;

    let (activity_tx, mut activity_rx) = mpsc::channel(256);
    workflow_run.context.event_sink = Some(activity_tx);
    let relay_tx = event_tx.clone();
    let relay = tokio::spawn(async move {
        while let Some(entry) = activity_rx.recv().await {
            if relay_tx.send(RunnerEvent::Activity(entry)).await.is_err() {
                break;
            }
        }
    });

    let mut stage = if workflow_run.context.current_stage == MigrationStage::Idle {
        MigrationStage::InitProject
    } else {
        workflow_run.context.current_stage
    };

    loop {
        if workflow_run.is_cancelled() {
            workflow_run.context.errors.push("run cancelled".to_string());
            workflow_run.context.transition(MigrationStage::Error);
            workflow_run.status = RunStatus::Failed;
            let _ = event_tx.send(RunnerEvent::Aborted).await;
            break;
        }

        run_stage_node(&mut workflow_run.context, stage, executor, pty, llm, model, query_lock).await;
        let _ = event_tx
            .send(RunnerEvent::Status(workflow_run.context.snapshot()))
            .await;

        if workflow_run.context.is_errored() {
            workflow_run.status = RunStatus::Failed;
            let message = workflow_run.context.errors.last().cloned().unwrap_or_default();
            let _ = event_tx.send(RunnerEvent::Failed(message)).await;
            break;
        }

        if stage == MigrationStage::HumanReview && workflow_run.context.requires_human_intervention {
            workflow_run.status = RunStatus::Paused;
            workflow_run.paused = true;
            let _ = event_tx
                .send(RunnerEvent::HumanReviewRequired {
                    reason: workflow_run.context.human_review_reason.clone().unwrap_or_default(),
                    missing_objects: workflow_run.context.missing_objects.clone(),
                })
                .await;
            break;
        }

        if stage == MigrationStage::Finalize {
            workflow_run.status = RunStatus::Completed;
            if let Some(report) = workflow_run.context.summary_report.clone() {
                let _ = event_tx.send(RunnerEvent::Completed(report)).await;
            }
            break;
        }

        let mut decision =
            invoke_supervisor(&mut workflow_run.context, stage, llm, model, query_lock).await;
        if decision == SupervisorDecision::SelfHeal && !workflow_run.context.self_heal_budget_remaining() {
            decision = SupervisorDecision::Finalize;
        }
        let _ = event_tx
            .send(RunnerEvent::Decision {
                after_stage: stage,
                decision,
                reasoning: workflow_run.context.supervisor_reasoning.clone().unwrap_or_default(),
            })
            .await;

        stage = match decision {
            SupervisorDecision::Proceed => natural_proceed_target(stage),
            SupervisorDecision::SelfHeal => MigrationStage::SelfHeal,
            SupervisorDecision::HumanReview => MigrationStage::HumanReview,
            SupervisorDecision::Finalize => MigrationStage::Finalize,
            SupervisorDecision::Abort => {
                workflow_run.context.record_fatal_error("Run aborted by supervisor decision.");
                workflow_run.status = RunStatus::Failed;
                let _ = event_tx.send(RunnerEvent::Aborted).await;
                break;
            }
        };
    }

    workflow_run.context.event_sink = None;
    drop(event_tx);
    let _ = relay.await;
}

/// Resume a paused run: clear the intervention flag and re-enter the
/// graph at `execute_sql`, the only stage `human_review` ever routes
/// back to — `last_executed_file_index` ensures only unexecuted files
/// are re-run. Grounded on SPEC_FULL.md §4.7 "Resume".
pub async fn resume(
    workflow_run: &mut WorkflowRun,
    executor: &dyn SnowflakeExecutor,
    pty: Option<&PtySession>,
    llm: &dyn LlmProvider,
    model: Option<&str>,
    query_lock: &Mutex<()>,
    event_tx: mpsc::Sender<RunnerEvent>,
) -> Result<()> {
    if workflow_run.status != RunStatus::Paused {
        return Err(WorkflowError::NotPaused);
    }
    workflow_run.context.requires_human_intervention = false;
    workflow_run.context.transition(MigrationStage::ExecuteSql);
    workflow_run.paused = false;
    run(workflow_run, executor, pty, llm, model, query_lock, event_tx).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use llm_client::{LlmChunk, LlmStream, Message};
    use snowflake_session::{Result as SfResult, StatementResult};
    use std::path::PathBuf;

    struct NoopExecutor;

    #[async_trait]
    impl SnowflakeExecutor for NoopExecutor {
        async fn execute_statement(&self, _statement: &str) -> SfResult<StatementResult> {
            Ok(StatementResult {
                statement_index: 0,
                row_count: 0,
                output_preview: vec![],
            })
        }
        async fn ping(&self) -> SfResult<()> {
            Ok(())
        }
        async fn close(&self) {}
    }

    struct ProceedProvider;

    #[async_trait]
    impl LlmProvider for ProceedProvider {
        async fn chat_stream(&self, _messages: &[Message], _model: Option<&str>) -> llm_client::Result<LlmStream> {
            Ok(Box::pin(futures::stream::once(async move {
                Ok(LlmChunk::Delta(
                    "{\"decision\": \"proceed\", \"reasoning\": \"looks fine\"}".to_string(),
                )
            })))
        }
    }

    #[tokio::test]
    async fn cancelled_run_emits_aborted_and_marks_failed() {
        let ctx = MigrationContext::new("demo", PathBuf::from("/tmp/src"));
        let mut workflow_run = WorkflowRun::new(ctx);
        workflow_run.cancel();

        let (tx, mut rx) = mpsc::channel(16);
        run(
            &mut workflow_run,
            &NoopExecutor,
            None,
            &ProceedProvider,
            None,
            &Mutex::new(()),
            tx,
        )
        .await;

        assert_eq!(workflow_run.status, RunStatus::Failed);
        let mut saw_aborted = false;
        while let Some(event) = rx.recv().await {
            if matches!(event, RunnerEvent::Aborted) {
                saw_aborted = true;
            }
        }
        assert!(saw_aborted);
    }

    #[tokio::test]
    async fn resume_requires_paused_status() {
        let ctx = MigrationContext::new("demo", PathBuf::from("/tmp/src"));
        let mut workflow_run = WorkflowRun::new(ctx);
        let (tx, _rx) = mpsc::channel(16);
        let result = resume(
            &mut workflow_run,
            &NoopExecutor,
            None,
            &ProceedProvider,
            None,
            &Mutex::new(()),
            tx,
        )
        .await;
        assert!(matches!(result, Err(WorkflowError::NotPaused)));
    }
}
