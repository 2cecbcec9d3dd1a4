//! Real upstream connector: talks to Snowflake's SQL API (the `statements`
//! REST resource) over `reqwest`, the same HTTP client the LLM provider
//! uses. `snowflake_session` only depends on the `SnowflakeConnector` /
//! `SnowflakeExecutor` traits; this is the concrete driver the binary
//! supplies, kept out of that crate so its TTL/locking logic stays
//! testable against a fake. See SPEC_FULL.md §4.9 and §9.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use llm_client::GenericHttpProvider;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use snowflake_session::{
    ConnectedUpstream, Result, SnowflakeAuthConfig, SnowflakeConnector, SnowflakeExecutor,
    SnowflakeSessionError, StatementResult,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const PREVIEW_ROW_LIMIT: usize = 20;

pub struct HttpSnowflakeConnector {
    client: Client,
}

impl HttpSnowflakeConnector {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for HttpSnowflakeConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnowflakeConnector for HttpSnowflakeConnector {
    async fn connect(
        &self,
        config: &SnowflakeAuthConfig,
        password: Option<&str>,
        model: &str,
    ) -> Result<ConnectedUpstream> {
        if config.account.is_empty() || config.user.is_empty() {
            return Err(SnowflakeSessionError::Invalid(
                "account and user are required".to_string(),
            ));
        }

        let token = password
            .map(str::to_string)
            .ok_or(SnowflakeSessionError::PasswordRequired)?;

        let base_url = format!(
            "https://{}.snowflakecomputing.com/api/v2/statements",
            config.account
        );

        let executor = HttpSnowflakeExecutor {
            client: self.client.clone(),
            base_url,
            token: token.clone(),
            warehouse: config.warehouse.clone(),
            database: config.database.clone(),
            schema: config.schema.clone(),
            role: config.role.clone(),
        };

        // Fail fast on bad credentials rather than handing back a context
        // that will error on its first real query.
        executor
            .ping()
            .await
            .map_err(|e| SnowflakeSessionError::Connect(e.to_string()))?;

        // Cortex inference sits under the same account host and accepts the
        // same bearer token issued for the SQL statements API.
        let cortex_base_url = format!(
            "https://{}.snowflakecomputing.com/api/v2/cortex/inference",
            config.account
        );
        let llm = GenericHttpProvider::new(token, cortex_base_url, model.to_string());

        Ok(ConnectedUpstream {
            executor: Arc::new(executor),
            llm: Arc::new(llm),
        })
    }
}

struct HttpSnowflakeExecutor {
    client: Client,
    base_url: String,
    token: String,
    warehouse: String,
    database: String,
    schema: String,
    role: String,
}

#[derive(Debug, Deserialize)]
struct StatementsResponse {
    #[serde(default)]
    #[serde(rename = "resultSetMetaData")]
    result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    data: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct ResultSetMetaData {
    #[serde(rename = "numRows", default)]
    num_rows: usize,
}

#[async_trait]
impl SnowflakeExecutor for HttpSnowflakeExecutor {
    async fn execute_statement(&self, statement: &str) -> Result<StatementResult> {
        let body = json!({
            "statement": statement,
            "timeout": 300,
            "warehouse": self.warehouse,
            "database": self.database,
            "schema": self.schema,
            "role": self.role,
        });

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.token)
            .header("X-Snowflake-Authorization-Token-Type", "OAUTH")
            .json(&body)
            .send()
            .await
            .map_err(|e| SnowflakeSessionError::Invalid(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(SnowflakeSessionError::Invalid(format!(
                "HTTP {status}: {text}"
            )));
        }

        let parsed: StatementsResponse = response
            .json()
            .await
            .map_err(|e| SnowflakeSessionError::Invalid(e.to_string()))?;

        let row_count = parsed
            .result_set_meta_data
            .map(|m| m.num_rows)
            .unwrap_or(parsed.data.len());

        let output_preview = parsed
            .data
            .iter()
            .take(PREVIEW_ROW_LIMIT)
            .map(|row| {
                row.iter()
                    .map(|cell| cell.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .collect();

        Ok(StatementResult {
            statement_index: 0,
            row_count,
            output_preview,
        })
    }

    async fn ping(&self) -> Result<()> {
        self.execute_statement("SELECT 1").await.map(|_| ())
    }

    async fn close(&self) {}
}
