use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use llm_client::Message;
use pty_session::PtyRegistry;
use snowflake_session::SnowflakeSessionManager;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use migration_context::WorkflowRun;

use crate::config::AppConfig;
use crate::snowflake_http::HttpSnowflakeConnector;
use crate::stream_registry::StreamRegistry;

/// Composition root handed to every handler via `web::Data`. Grounded on
/// `agent-server/src/state.rs`'s `AppState`, generalized from a single LLM
/// session map to the three subsystems this server fronts: upstream
/// Snowflake sessions, PTY terminals, and migration workflow runs.
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub snowflake: Arc<SnowflakeSessionManager>,
    pub pty_registry: Arc<PtyRegistry>,
    pub runs: Arc<RwLock<HashMap<Uuid, Arc<Mutex<WorkflowRun>>>>>,
    /// Per-chat message history, keyed by the client-supplied chat id, so a
    /// `/api/chat` POST can continue a conversation across turns.
    pub chat_histories: Arc<DashMap<String, Vec<Message>>>,
    /// Reconnect-probe registry for chat and workflow-run streams, keyed
    /// by chat id / run id string.
    pub stream_registry: Arc<StreamRegistry>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let connector = Arc::new(HttpSnowflakeConnector::new());
        let snowflake = Arc::new(SnowflakeSessionManager::new(
            connector,
            config.session_ttl_days,
            config.cortex_model.clone(),
            config.cortex_function.clone(),
        ));

        Self {
            config: Arc::new(config),
            snowflake,
            pty_registry: Arc::new(PtyRegistry::new()),
            runs: Arc::new(RwLock::new(HashMap::new())),
            chat_histories: Arc::new(DashMap::new()),
            stream_registry: Arc::new(StreamRegistry::new()),
        }
    }

    pub async fn register_run(&self, run: WorkflowRun) -> Uuid {
        let run_id = run.run_id;
        self.runs
            .write()
            .await
            .insert(run_id, Arc::new(Mutex::new(run)));
        run_id
    }

    pub async fn get_run(&self, run_id: Uuid) -> Option<Arc<Mutex<WorkflowRun>>> {
        self.runs.read().await.get(&run_id).cloned()
    }
}
