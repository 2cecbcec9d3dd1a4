//! Shared data model for the migration workflow engine.
//!
//! Every other crate in this workspace (pty_session excepted) depends on
//! the types defined here: the stage enumeration, the migration context
//! that flows through all nine stage nodes, and the workflow-run wrapper
//! the runner and HTTP layer key off of.

mod context;
mod records;
mod run;
mod stage;

pub use context::{MigrationContext, StatementType, DEFAULT_MAX_SELF_HEAL_ITERATIONS};
pub use records::{
    ActionableIssue, ActivityLogEntry, DecisionHistoryEntry, ExecutionError,
    FileExecutionLogEntry, IssueSeverity, LogLevel, ReportScanSummary, SelfHealAttempt,
    SummaryReport, ValidationIssue, WorkflowStatusSnapshot,
};
pub use run::{RunStatus, WorkflowRun};
pub use stage::{MigrationStage, SupervisorDecision};
