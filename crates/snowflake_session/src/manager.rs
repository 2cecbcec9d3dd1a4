use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use llm_client::LlmProvider;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::auth::SnowflakeAuthConfig;
use crate::error::{Result, SnowflakeSessionError};
use crate::executor::{SnowflakeConnector, SnowflakeExecutor};

#[derive(Debug, Clone, Serialize)]
pub struct SnowflakeModelConfig {
    pub model: String,
    pub cortex_function: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: Option<u32>,
}

/// A live upstream connection, its session-scoped LLM provider, and its
/// Cortex-equivalent model defaults. Both the executor and the LLM
/// provider share one `query_lock`: a single upstream connection is not
/// safe for concurrent queries, and that includes concurrent model calls
/// on the same connection (SPEC_FULL.md §3 "Session", §5). Callers must
/// hold `query_lock` for the duration of any `executor` or `llm` call.
pub struct SnowflakeContext {
    pub session_id: String,
    pub executor: Arc<dyn SnowflakeExecutor>,
    pub llm: Arc<dyn LlmProvider>,
    pub model_config: SnowflakeModelConfig,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub query_lock: Arc<Mutex<()>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnowflakeModelDefaults {
    pub model: String,
    #[serde(rename = "cortexFunction")]
    pub cortex_function: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnowflakeStatus {
    pub connected: bool,
    #[serde(rename = "expiresAt", skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(rename = "modelDefaults", skip_serializing_if = "Option::is_none")]
    pub model_defaults: Option<SnowflakeModelDefaults>,
}

impl SnowflakeStatus {
    fn disconnected() -> Self {
        Self {
            connected: false,
            expires_at: None,
            session_id: None,
            model_defaults: None,
        }
    }
}

/// Maps session-id → upstream session context with TTL (default 30 days).
/// Grounded on `services/snowflake_session.py`'s `SnowflakeSessionManager`
/// and this workspace's `session_manager::manager::SessionManager` for the
/// `RwLock`-guarded-map-plus-clone-on-read idiom.
pub struct SnowflakeSessionManager {
    connector: Arc<dyn SnowflakeConnector>,
    sessions: RwLock<HashMap<String, Arc<SnowflakeContext>>>,
    session_ttl: Duration,
    default_model: String,
    default_cortex_function: String,
}

impl SnowflakeSessionManager {
    pub fn new(
        connector: Arc<dyn SnowflakeConnector>,
        session_ttl_days: i64,
        default_model: impl Into<String>,
        default_cortex_function: impl Into<String>,
    ) -> Self {
        Self {
            connector,
            sessions: RwLock::new(HashMap::new()),
            session_ttl: Duration::days(session_ttl_days),
            default_model: default_model.into(),
            default_cortex_function: default_cortex_function.into(),
        }
    }

    /// Close any prior session for `session_id`, open a fresh one, and set
    /// its expiry. Replacing a session always closes the one it displaces.
    pub async fn create_or_replace(
        &self,
        session_id: &str,
        config: &SnowflakeAuthConfig,
        password: Option<&str>,
        model: Option<String>,
        cortex_function: Option<String>,
    ) -> Result<Arc<SnowflakeContext>> {
        self.disconnect(session_id).await;

        let resolved_model = model.unwrap_or_else(|| self.default_model.clone());
        let resolved_cortex_function =
            cortex_function.unwrap_or_else(|| self.default_cortex_function.clone());

        let connected = self.connector.connect(config, password, &resolved_model).await?;
        let now = Utc::now();
        let context = Arc::new(SnowflakeContext {
            session_id: session_id.to_string(),
            executor: connected.executor,
            llm: connected.llm,
            model_config: SnowflakeModelConfig {
                model: resolved_model,
                cortex_function: resolved_cortex_function,
                temperature: 0.0,
                top_p: 0.0,
                max_tokens: None,
            },
            created_at: now,
            last_used_at: now,
            expires_at: now + self.session_ttl,
            query_lock: Arc::new(Mutex::new(())),
        });

        self.sessions
            .write()
            .await
            .insert(session_id.to_string(), context.clone());
        Ok(context)
    }

    /// Returns `None` on missing or expired; an expired entry is evicted.
    pub async fn get(&self, session_id: &str) -> Option<Arc<SnowflakeContext>> {
        let context = self.sessions.read().await.get(session_id).cloned()?;
        if Utc::now() >= context.expires_at {
            self.disconnect(session_id).await;
            return None;
        }
        Some(context)
    }

    /// Extend expiry and bump `last_used_at`. Callers hold the returned
    /// `Arc` so this mutates a fresh context and re-inserts it.
    pub async fn touch(&self, session_id: &str) -> Option<Arc<SnowflakeContext>> {
        let mut sessions = self.sessions.write().await;
        let context = sessions.get(session_id)?;
        let now = Utc::now();
        let touched = Arc::new(SnowflakeContext {
            session_id: context.session_id.clone(),
            executor: context.executor.clone(),
            llm: context.llm.clone(),
            model_config: context.model_config.clone(),
            created_at: context.created_at,
            last_used_at: now,
            expires_at: now + self.session_ttl,
            query_lock: context.query_lock.clone(),
        });
        sessions.insert(session_id.to_string(), touched.clone());
        Some(touched)
    }

    /// Issue a trivial upstream query; evict and return an error on
    /// failure so callers know to prompt the user to reconnect.
    pub async fn validate(&self, session_id: &str) -> Result<()> {
        let context = self.get(session_id).await.ok_or(SnowflakeSessionError::NotConnected)?;
        let _guard = context.query_lock.lock().await;
        if let Err(e) = context.executor.ping().await {
            self.disconnect(session_id).await;
            return Err(SnowflakeSessionError::Invalid(e.to_string()));
        }
        Ok(())
    }

    pub async fn disconnect(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id);
        if let Some(context) = removed {
            context.executor.close().await;
            true
        } else {
            false
        }
    }

    pub async fn build_status(&self, session_id: Option<&str>) -> SnowflakeStatus {
        let Some(session_id) = session_id else {
            return SnowflakeStatus::disconnected();
        };
        let Some(context) = self.get(session_id).await else {
            return SnowflakeStatus::disconnected();
        };
        self.touch(session_id).await;
        SnowflakeStatus {
            connected: true,
            expires_at: Some(context.expires_at),
            session_id: Some(context.session_id.clone()),
            model_defaults: Some(SnowflakeModelDefaults {
                model: context.model_config.model.clone(),
                cortex_function: context.model_config.cortex_function.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ConnectedUpstream, StatementResult};
    use async_trait::async_trait;
    use futures::stream;
    use llm_client::{LlmChunk, LlmStream, Message};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeExecutor {
        closed: Arc<AtomicBool>,
    }

    struct FakeLlm;

    #[async_trait]
    impl LlmProvider for FakeLlm {
        async fn chat_stream(&self, _messages: &[Message], _model: Option<&str>) -> llm_client::Result<LlmStream> {
            Ok(Box::pin(stream::once(async { Ok(LlmChunk::Delta("ok".to_string())) })))
        }
    }

    #[async_trait]
    impl SnowflakeExecutor for FakeExecutor {
        async fn execute_statement(&self, _statement: &str) -> Result<StatementResult> {
            Ok(StatementResult {
                statement_index: 0,
                row_count: 1,
                output_preview: vec![],
            })
        }
        async fn ping(&self) -> Result<()> {
            Ok(())
        }
        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct FakeConnector {
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl SnowflakeConnector for FakeConnector {
        async fn connect(
            &self,
            _config: &SnowflakeAuthConfig,
            _password: Option<&str>,
            _model: &str,
        ) -> Result<ConnectedUpstream> {
            Ok(ConnectedUpstream {
                executor: Arc::new(FakeExecutor {
                    closed: self.closed.clone(),
                }),
                llm: Arc::new(FakeLlm),
            })
        }
    }

    fn manager() -> (SnowflakeSessionManager, Arc<AtomicBool>) {
        let closed = Arc::new(AtomicBool::new(false));
        let connector = Arc::new(FakeConnector {
            closed: closed.clone(),
        });
        (
            SnowflakeSessionManager::new(connector, 30, "claude-4-sonnet", "complete"),
            closed,
        )
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let (manager, _closed) = manager();
        let config = SnowflakeAuthConfig::new("acct", "bob");
        manager
            .create_or_replace("s1", &config, None, None, None)
            .await
            .unwrap();
        assert!(manager.get("s1").await.is_some());
    }

    #[tokio::test]
    async fn replace_closes_prior_session() {
        let (manager, closed) = manager();
        let config = SnowflakeAuthConfig::new("acct", "bob");
        manager
            .create_or_replace("s1", &config, None, None, None)
            .await
            .unwrap();
        manager
            .create_or_replace("s1", &config, None, None, None)
            .await
            .unwrap();
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn disconnect_then_get_returns_none() {
        let (manager, _closed) = manager();
        let config = SnowflakeAuthConfig::new("acct", "bob");
        manager
            .create_or_replace("s1", &config, None, None, None)
            .await
            .unwrap();
        manager.disconnect("s1").await;
        assert!(manager.get("s1").await.is_none());
    }

    #[tokio::test]
    async fn expired_session_is_evicted_on_get() {
        let (manager, _closed) = manager();
        let config = SnowflakeAuthConfig::new("acct", "bob");
        manager
            .create_or_replace("s1", &config, None, None, None)
            .await
            .unwrap();
        {
            let mut sessions = manager.sessions.write().await;
            let context = sessions.get("s1").unwrap();
            let expired = Arc::new(SnowflakeContext {
                session_id: context.session_id.clone(),
                executor: context.executor.clone(),
                llm: context.llm.clone(),
                model_config: context.model_config.clone(),
                created_at: context.created_at,
                last_used_at: context.last_used_at,
                expires_at: Utc::now() - Duration::seconds(1),
                query_lock: context.query_lock.clone(),
            });
            sessions.insert("s1".to_string(), expired);
        }
        assert!(manager.get("s1").await.is_none());
    }

    #[tokio::test]
    async fn build_status_without_session_id_is_disconnected() {
        let (manager, _closed) = manager();
        let status = manager.build_status(None).await;
        assert!(!status.connected);
    }
}
