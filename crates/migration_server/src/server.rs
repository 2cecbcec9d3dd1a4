use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use std::io;

use crate::config::AppConfig;
use crate::handlers;
use crate::state::AppState;

pub async fn run(config: AppConfig) -> io::Result<()> {
    let port = config.port;
    let origins = config.frontend_origins.clone();
    let state = web::Data::new(AppState::new(config));

    log::info!("Starting migration server on 0.0.0.0:{port}");

    HttpServer::new(move || {
        let mut cors = Cors::default()
            .allowed_methods(vec!["GET", "POST", "DELETE"])
            .supports_credentials()
            .max_age(3600);
        for origin in &origins {
            cors = cors.allowed_origin(origin);
        }

        App::new()
            .app_data(state.clone())
            .wrap(cors)
            .service(
                web::scope("/api")
                    .service(
                        web::scope("/snowflake")
                            .route("/connect", web::post().to(handlers::snowflake::connect))
                            .route("/status", web::get().to(handlers::snowflake::status))
                            .route("/disconnect", web::post().to(handlers::snowflake::disconnect)),
                    )
                    .route("/upload/{chat_id}", web::post().to(handlers::upload::upload_chat_files))
                    .route("/chat", web::post().to(handlers::chat::start))
                    .route("/chat/{chat_id}/stream", web::get().to(handlers::chat::stream_reconnect))
                    .service(
                        web::scope("/scai")
                            .route("/start", web::post().to(handlers::scai::start))
                            .route("/run/{run_id}", web::get().to(handlers::scai::stream_run))
                            .route("/status/{run_id}", web::get().to(handlers::scai::status))
                            .route("/upload-ddl/{run_id}", web::post().to(handlers::upload::upload_ddl))
                            .route("/resume/{run_id}", web::post().to(handlers::scai::resume)),
                    ),
            )
            .route("/ws/terminal", web::get().to(handlers::ws::terminal))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
