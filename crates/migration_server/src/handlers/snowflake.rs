use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use snowflake_session::{resolve_password_from_sources, SnowflakeAuthConfig};

use crate::cookies::{build_session_cookie, expire_session_cookie, read_session_id};
use crate::error::{ApiError, Result};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    #[serde(default)]
    account: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    warehouse: Option<String>,
    #[serde(default)]
    database: Option<String>,
    #[serde(default)]
    schema: Option<String>,
    #[serde(default)]
    authenticator: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

pub async fn connect(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<ConnectRequest>,
) -> Result<HttpResponse> {
    let config = &state.config;
    let mut auth = SnowflakeAuthConfig::new(
        body.account.clone().unwrap_or_else(|| config.sf_account.clone()),
        body.user.clone().unwrap_or_else(|| config.sf_user.clone()),
    );
    auth.role = body.role.clone().unwrap_or_else(|| config.sf_role.clone());
    auth.warehouse = body.warehouse.clone().unwrap_or_else(|| config.sf_warehouse.clone());
    auth.database = body.database.clone().unwrap_or_else(|| config.sf_database.clone());
    auth.schema = body.schema.clone().unwrap_or_else(|| config.sf_schema.clone());
    auth.authenticator = body
        .authenticator
        .clone()
        .unwrap_or_else(|| config.sf_authenticator.clone());

    let password = resolve_password_from_sources(
        &auth.authenticator,
        body.password.as_deref(),
        None,
        None,
    )
    .map_err(ApiError::from)?;

    let session_id = read_session_id(&req, config).unwrap_or_else(|| Uuid::new_v4().to_string());

    let context = state
        .snowflake
        .create_or_replace(
            &session_id,
            &auth,
            password.as_deref(),
            Some(config.cortex_model.clone()),
            Some(config.cortex_function.clone()),
        )
        .await
        .map_err(ApiError::from)?;

    let response = serde_json::json!({
        "connected": true,
        "expiresAt": context.expires_at,
        "sessionId": session_id,
    });

    Ok(HttpResponse::Ok()
        .cookie(build_session_cookie(config, session_id))
        .json(response))
}

pub async fn status(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let session_id = read_session_id(&req, &state.config);
    let status = state.snowflake.build_status(session_id.as_deref()).await;
    HttpResponse::Ok().json(status)
}

pub async fn disconnect(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    if let Some(session_id) = read_session_id(&req, &state.config) {
        state.snowflake.disconnect(&session_id).await;
        state.pty_registry.unregister(&session_id);
    }
    HttpResponse::Ok()
        .cookie(expire_session_cookie(&state.config))
        .json(serde_json::json!({ "connected": false }))
}
