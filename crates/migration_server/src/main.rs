use clap::Parser;
use std::io;

use migration_server::config::AppConfig;
use migration_server::server;

/// Port override. Every other setting (session TTL, cookie flags, Cortex
/// model, upstream credentials, upload directory, …) is read straight from
/// the environment by `AppConfig::from_env` per SPEC_FULL.md §6 — this
/// flag exists only because a port is the one thing worth overriding
/// without exporting a variable first.
#[derive(Parser, Debug, Clone)]
#[command(name = "migration-server")]
#[command(about = "Autonomous database-migration orchestrator: workflow engine, chat loop, PTY tap")]
#[command(version)]
struct Cli {
    /// Server port (overrides PORT)
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Log level, passed straight to env_logger (RUST_LOG semantics)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log_level: String,
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    let cli = Cli::parse();

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", &cli.log_level);
    }
    env_logger::init();

    let mut config = AppConfig::from_env();
    if let Some(port) = cli.port {
        config.port = port;
    }

    log::info!("migration-server starting: port={} cortex_model={}", config.port, config.cortex_model);

    server::run(config).await
}
