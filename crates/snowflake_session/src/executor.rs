use std::sync::Arc;

use async_trait::async_trait;
use llm_client::LlmProvider;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single executed statement's result, trimmed to a short preview —
/// mirrors `execute_sql_with_chat_runtime`'s per-statement dict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementResult {
    pub statement_index: usize,
    pub row_count: usize,
    pub output_preview: Vec<String>,
}

/// Abstracts the upstream (Snowflake) connection used for both SQL
/// execution and a trivial liveness probe. The concrete connector (a real
/// driver) is supplied by the binary; this crate only depends on the
/// contract so the workflow and session-lifecycle logic can be exercised
/// without a live upstream. See SPEC_FULL.md §9 "upstream connection is an
/// external collaborator".
#[async_trait]
pub trait SnowflakeExecutor: Send + Sync {
    /// Run one SQL statement and return its result, or an error whose
    /// `Display` text is inspected by `classify_snowflake_error` in
    /// `migration_workflow`.
    async fn execute_statement(&self, statement: &str) -> Result<StatementResult>;

    /// `SELECT 1`-equivalent liveness probe used by `validate_connection`.
    async fn ping(&self) -> Result<()>;

    async fn close(&self);
}

/// What a successful `connect()` hands back: the SQL executor and the
/// session-scoped LLM provider, both built from the same resolved
/// credential (the one upstream account issues a single bearer token that
/// is valid against both the SQL statements API and the Cortex inference
/// endpoint). See SPEC_FULL.md §3 "Session" — one upstream connection
/// handle paired with one model configuration.
pub struct ConnectedUpstream {
    pub executor: Arc<dyn SnowflakeExecutor>,
    pub llm: Arc<dyn LlmProvider>,
}

/// Builds a session's executor and LLM provider from resolved auth +
/// password + the session's chosen model. Implemented by the binary crate
/// against a real driver; kept separate from `SnowflakeSessionManager` so
/// the manager's TTL/locking logic has nothing upstream-specific to mock
/// out in tests.
#[async_trait]
pub trait SnowflakeConnector: Send + Sync {
    async fn connect(
        &self,
        config: &crate::auth::SnowflakeAuthConfig,
        password: Option<&str>,
        model: &str,
    ) -> Result<ConnectedUpstream>;
}
