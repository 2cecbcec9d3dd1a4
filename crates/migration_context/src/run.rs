use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::MigrationContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
}

/// A registered workflow run. Owns the migration context and tracks
/// run-scoped lifecycle state; the runner and the stream registry both key
/// off `run_id`.
pub struct WorkflowRun {
    pub run_id: uuid::Uuid,
    pub context: MigrationContext,
    pub status: RunStatus,
    pub paused: bool,
    pub created_at: DateTime<Utc>,
    pub cancel_token: tokio_util::sync::CancellationToken,
}

impl WorkflowRun {
    pub fn new(context: MigrationContext) -> Self {
        Self {
            run_id: context.run_id,
            context,
            status: RunStatus::Pending,
            paused: false,
            created_at: Utc::now(),
            cancel_token: tokio_util::sync::CancellationToken::new(),
        }
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}
