use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the eleven named phases a run inhabits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStage {
    Idle,
    InitProject,
    AddSourceCode,
    ApplySchemaMapping,
    ConvertCode,
    ExecuteSql,
    SelfHeal,
    Validate,
    HumanReview,
    Finalize,
    Error,
    Completed,
}

impl MigrationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationStage::Idle => "idle",
            MigrationStage::InitProject => "init_project",
            MigrationStage::AddSourceCode => "add_source_code",
            MigrationStage::ApplySchemaMapping => "apply_schema_mapping",
            MigrationStage::ConvertCode => "convert_code",
            MigrationStage::ExecuteSql => "execute_sql",
            MigrationStage::SelfHeal => "self_heal",
            MigrationStage::Validate => "validate",
            MigrationStage::HumanReview => "human_review",
            MigrationStage::Finalize => "finalize",
            MigrationStage::Error => "error",
            MigrationStage::Completed => "completed",
        }
    }
}

impl fmt::Display for MigrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The supervisor's routing decision. A closed set validated per-stage by
/// the caller (see `migration_workflow::supervisor`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorDecision {
    Proceed,
    SelfHeal,
    HumanReview,
    Finalize,
    Abort,
}

impl SupervisorDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupervisorDecision::Proceed => "proceed",
            SupervisorDecision::SelfHeal => "self_heal",
            SupervisorDecision::HumanReview => "human_review",
            SupervisorDecision::Finalize => "finalize",
            SupervisorDecision::Abort => "abort",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "proceed" => Some(Self::Proceed),
            "self_heal" => Some(Self::SelfHeal),
            "human_review" => Some(Self::HumanReview),
            "finalize" => Some(Self::Finalize),
            "abort" => Some(Self::Abort),
            _ => None,
        }
    }
}

impl fmt::Display for SupervisorDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
