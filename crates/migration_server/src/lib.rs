//! HTTP/WebSocket front door for the migration workflow engine, the chat
//! loop, and the PTY tap layer. See SPEC_FULL.md §6 for the full route
//! table and §6's env-var table for `AppConfig`.

pub mod config;
pub mod cookies;
pub mod error;
pub mod handlers;
pub mod server;
pub mod snowflake_http;
pub mod state;
pub mod stream_registry;

pub use config::AppConfig;
pub use error::ApiError;
pub use state::AppState;
