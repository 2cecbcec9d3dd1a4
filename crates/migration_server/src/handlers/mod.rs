pub mod chat;
pub mod scai;
pub mod snowflake;
pub mod upload;
pub mod ws;
