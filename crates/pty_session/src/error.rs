use thiserror::Error;

#[derive(Debug, Error)]
pub enum PtyError {
    #[error("failed to spawn PTY: {0}")]
    Spawn(String),
    #[error("PTY not spawned")]
    NotSpawned,
    #[error("PTY process is not alive")]
    Dead,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
