use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnowflakeSessionError {
    #[error("no session registered for this id")]
    NotConnected,

    #[error("session expired")]
    Expired,

    #[error("unable to connect to upstream: {0}")]
    Connect(String),

    #[error("session is no longer valid: {0}")]
    Invalid(String),

    #[error("password is required for the \"snowflake\" authenticator")]
    PasswordRequired,
}

pub type Result<T> = std::result::Result<T, SnowflakeSessionError>;
