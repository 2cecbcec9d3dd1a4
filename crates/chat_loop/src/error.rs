use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatLoopError {
    #[error("LLM error: {0}")]
    Llm(#[from] llm_client::LlmError),

    #[error("PTY error: {0}")]
    Pty(#[from] pty_session::PtyError),
}
