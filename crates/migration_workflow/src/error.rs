use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("subprocess command failed: {0}")]
    Subprocess(String),

    #[error("upstream (Snowflake) error: {0}")]
    Snowflake(#[from] snowflake_session::SnowflakeSessionError),

    #[error("LLM error: {0}")]
    Llm(#[from] llm_client::LlmError),

    #[error("run not found")]
    RunNotFound,

    #[error("run is not paused")]
    NotPaused,

    #[error("run was cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
