use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::mpsc;

use crate::records::{
    ActivityLogEntry, DecisionHistoryEntry, ExecutionError, FileExecutionLogEntry, LogLevel,
    ReportScanSummary, SelfHealAttempt, SummaryReport, ValidationIssue, WorkflowStatusSnapshot,
};
use crate::stage::{MigrationStage, SupervisorDecision};

pub const DEFAULT_MAX_SELF_HEAL_ITERATIONS: u32 = 5;

/// The statement type tag attached to a converted codebase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementType {
    Ddl,
    Dml,
    Procedure,
    Function,
    Mixed,
}

/// The single mutable state object passed through all nine stages plus the
/// supervisor. See SPEC_FULL.md §3.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationContext {
    // Identity & config
    pub run_id: uuid::Uuid,
    pub project_name: String,
    pub project_path: Option<PathBuf>,
    pub source_language: String,
    pub target_platform: String,
    pub session_id: Option<String>,

    // Inputs
    pub source_dir: PathBuf,
    pub crosswalk_path: Option<PathBuf>,
    pub input_files: Vec<PathBuf>,

    // Artifacts
    pub original_code: String,
    pub schema_mapped_code: String,
    pub converted_code: String,
    pub final_code: Option<String>,
    pub statement_type: Option<StatementType>,
    pub converted_files: Vec<PathBuf>,

    // Stage flags
    pub scai_project_initialized: bool,
    pub scai_source_added: bool,
    pub scai_converted: bool,

    // Self-heal state
    pub self_heal_iteration: u32,
    pub max_self_heal_iterations: u32,
    pub self_heal_log: Vec<SelfHealAttempt>,

    // Execution state
    pub executed: bool,
    pub execution_passed: bool,
    pub execution_errors: Vec<ExecutionError>,
    pub file_execution_log: Vec<FileExecutionLogEntry>,
    pub last_executed_file_index: i64,
    pub missing_objects: Vec<String>,
    pub requires_ddl_upload: bool,
    pub ddl_upload_path: Option<PathBuf>,

    // Validation state
    pub validation_passed: bool,
    pub validation_issues: Vec<ValidationIssue>,
    pub validation_result: std::collections::HashMap<String, i64>,

    // Human-review state
    pub requires_human_intervention: bool,
    pub human_review_reason: Option<String>,
    pub resume_from_stage: Option<MigrationStage>,

    // Supervisor state
    pub supervisor_decision: Option<SupervisorDecision>,
    pub supervisor_reasoning: Option<String>,
    pub decision_history: Vec<DecisionHistoryEntry>,

    // Report memory
    pub report_scan_summary: Option<ReportScanSummary>,
    pub ignored_codes: Vec<String>,

    // Observability
    pub activity_log: Vec<ActivityLogEntry>,
    #[serde(skip)]
    pub event_sink: Option<mpsc::Sender<ActivityLogEntry>>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    // Output
    pub output_path: Option<PathBuf>,
    pub output_files: Vec<PathBuf>,
    pub summary_report: Option<SummaryReport>,

    // Current position
    pub current_stage: MigrationStage,
}

impl MigrationContext {
    pub fn new(project_name: impl Into<String>, source_dir: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            run_id: uuid::Uuid::new_v4(),
            project_name: project_name.into(),
            project_path: None,
            source_language: String::new(),
            target_platform: "snowflake".to_string(),
            session_id: None,
            source_dir,
            crosswalk_path: None,
            input_files: Vec::new(),
            original_code: String::new(),
            schema_mapped_code: String::new(),
            converted_code: String::new(),
            final_code: None,
            statement_type: None,
            converted_files: Vec::new(),
            scai_project_initialized: false,
            scai_source_added: false,
            scai_converted: false,
            self_heal_iteration: 0,
            max_self_heal_iterations: DEFAULT_MAX_SELF_HEAL_ITERATIONS,
            self_heal_log: Vec::new(),
            executed: false,
            execution_passed: false,
            execution_errors: Vec::new(),
            file_execution_log: Vec::new(),
            last_executed_file_index: -1,
            missing_objects: Vec::new(),
            requires_ddl_upload: false,
            ddl_upload_path: None,
            validation_passed: false,
            validation_issues: Vec::new(),
            validation_result: std::collections::HashMap::new(),
            requires_human_intervention: false,
            human_review_reason: None,
            resume_from_stage: None,
            supervisor_decision: None,
            supervisor_reasoning: None,
            decision_history: Vec::new(),
            report_scan_summary: None,
            ignored_codes: Vec::new(),
            activity_log: Vec::new(),
            event_sink: None,
            warnings: Vec::new(),
            errors: Vec::new(),
            created_at: now,
            updated_at: now,
            output_path: None,
            output_files: Vec::new(),
            summary_report: None,
            current_stage: MigrationStage::Idle,
        }
    }

    pub fn is_errored(&self) -> bool {
        self.current_stage == MigrationStage::Error
    }

    pub fn is_completed(&self) -> bool {
        self.current_stage == MigrationStage::Completed
    }

    pub fn transition(&mut self, stage: MigrationStage) {
        self.current_stage = stage;
        self.updated_at = Utc::now();
    }

    /// Record an unrecoverable stage failure: append to `errors`, log it,
    /// and transition to `error`. Stages call this from their catch-all
    /// branch (§4.5).
    pub fn record_fatal_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.errors.push(message.clone());
        self.log_event(LogLevel::Error, format!("[Error] {message}"));
        self.transition(MigrationStage::Error);
    }

    /// Append an activity-log entry and forward it to the event sink, if
    /// wired. The sink is a plain channel `Sender` clone, not a
    /// back-pointer into the runner — see SPEC_FULL.md §9.
    pub fn log_event(&mut self, level: LogLevel, message: impl Into<String>) {
        let entry = ActivityLogEntry::new(level, message);
        self.activity_log.push(entry.clone());
        if let Some(sink) = &self.event_sink {
            let _ = sink.try_send(entry);
        }
    }

    pub fn log_event_with_detail(
        &mut self,
        level: LogLevel,
        message: impl Into<String>,
        detail: serde_json::Value,
    ) {
        let entry = ActivityLogEntry::new(level, message).with_detail(detail);
        self.activity_log.push(entry.clone());
        if let Some(sink) = &self.event_sink {
            let _ = sink.try_send(entry);
        }
    }

    pub fn record_decision(
        &mut self,
        after_stage: MigrationStage,
        decision: SupervisorDecision,
        reasoning: impl Into<String>,
    ) {
        let reasoning = reasoning.into();
        self.supervisor_decision = Some(decision);
        self.supervisor_reasoning = Some(reasoning.clone());
        self.updated_at = Utc::now();
        self.decision_history.push(DecisionHistoryEntry {
            timestamp: Utc::now(),
            after_stage,
            decision,
            reasoning,
        });
    }

    pub fn self_heal_budget_remaining(&self) -> bool {
        self.self_heal_iteration < self.max_self_heal_iterations
    }

    /// A cheap, cloneable snapshot of the fields an HTTP/WS client needs
    /// to render run progress, without the full activity log or code
    /// bodies.
    pub fn snapshot(&self) -> WorkflowStatusSnapshot {
        WorkflowStatusSnapshot {
            run_id: self.run_id,
            current_stage: self.current_stage,
            scai_project_initialized: self.scai_project_initialized,
            scai_source_added: self.scai_source_added,
            scai_converted: self.scai_converted,
            executed: self.executed,
            execution_passed: self.execution_passed,
            self_heal_iteration: self.self_heal_iteration,
            max_self_heal_iterations: self.max_self_heal_iterations,
            validation_passed: self.validation_passed,
            requires_human_intervention: self.requires_human_intervention,
            missing_objects: self.missing_objects.clone(),
            last_decision: self.supervisor_decision,
            last_reasoning: self.supervisor_reasoning.clone(),
            updated_at: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_context_starts_idle_with_empty_budget_state() {
        let ctx = MigrationContext::new("demo", PathBuf::from("/tmp/demo"));
        assert_eq!(ctx.current_stage, MigrationStage::Idle);
        assert_eq!(ctx.self_heal_iteration, 0);
        assert_eq!(ctx.max_self_heal_iterations, DEFAULT_MAX_SELF_HEAL_ITERATIONS);
        assert!(ctx.self_heal_budget_remaining());
        assert_eq!(ctx.last_executed_file_index, -1);
    }

    #[test]
    fn record_fatal_error_transitions_to_error_and_logs() {
        let mut ctx = MigrationContext::new("demo", PathBuf::from("/tmp/demo"));
        ctx.transition(MigrationStage::ExecuteSql);
        ctx.record_fatal_error("boom");
        assert!(ctx.is_errored());
        assert_eq!(ctx.errors, vec!["boom".to_string()]);
        assert_eq!(ctx.activity_log.len(), 1);
    }

    #[test]
    fn self_heal_budget_exhausts_at_max() {
        let mut ctx = MigrationContext::new("demo", PathBuf::from("/tmp/demo"));
        ctx.max_self_heal_iterations = 2;
        ctx.self_heal_iteration = 2;
        assert!(!ctx.self_heal_budget_remaining());
    }
}
