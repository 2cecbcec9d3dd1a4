use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stage::{MigrationStage, SupervisorDecision};

/// A single failed (or succeeded) SQL statement execution, recorded on the
/// context so the supervisor and self-heal prompt can reference it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    pub statement: Option<String>,
    pub file: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Per-file execution bookkeeping, keyed by position in `converted_files`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileExecutionLogEntry {
    pub file: String,
    pub statements_total: usize,
    pub statements_succeeded: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    pub message: String,
    pub code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfHealAttempt {
    pub iteration: u32,
    pub success: bool,
    pub notes: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionHistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub after_stage: MigrationStage,
    pub decision: SupervisorDecision,
    pub reasoning: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl ActivityLogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            detail: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// A SnowConvert report record whose code is not in the ignored-codes
/// configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionableIssue {
    pub code: String,
    pub message: String,
    pub file: Option<String>,
}

/// The parsed summary of CSV issues and JSON assessment, narrowed to
/// actionable codes and paired with runtime execution errors. Supplied to
/// every self-heal iteration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportScanSummary {
    pub actionable_issues: Vec<ActionableIssue>,
    pub actionable_count: usize,
    pub ignored_count: usize,
    pub last_execution_errors: Vec<ExecutionError>,
    pub last_failed_statements: Vec<String>,
    /// Always a plain (possibly empty) list, never omitted — see
    /// DESIGN.md's Open Question decision on this field's shape.
    pub self_heal_attempts: Vec<SelfHealAttempt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryReport {
    pub status: String,
    pub output_file_count: usize,
    pub validation_passed: bool,
}

/// A point-in-time view of a run's progress, emitted after every stage
/// node and every supervisor decision so HTTP/WS clients can render a
/// live status panel without replaying the full activity log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStatusSnapshot {
    pub run_id: uuid::Uuid,
    pub current_stage: MigrationStage,
    pub scai_project_initialized: bool,
    pub scai_source_added: bool,
    pub scai_converted: bool,
    pub executed: bool,
    pub execution_passed: bool,
    pub self_heal_iteration: u32,
    pub max_self_heal_iterations: u32,
    pub validation_passed: bool,
    pub requires_human_intervention: bool,
    pub missing_objects: Vec<String>,
    pub last_decision: Option<SupervisorDecision>,
    pub last_reasoning: Option<String>,
    pub updated_at: DateTime<Utc>,
}
