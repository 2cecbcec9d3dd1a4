//! Session-cookie helpers shared by the handlers. The cookie's value is an
//! opaque session id keyed into `SnowflakeSessionManager` and, separately,
//! `PtyRegistry` — the upstream session and the terminal are independent
//! lifetimes that happen to share the same identifier.

use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::HttpRequest;

use crate::config::AppConfig;

pub fn read_session_id(req: &HttpRequest, config: &AppConfig) -> Option<String> {
    req.cookie(&config.session_cookie_name)
        .map(|c| c.value().to_string())
}

fn parse_samesite(value: &str) -> SameSite {
    match value.to_lowercase().as_str() {
        "strict" => SameSite::Strict,
        "none" => SameSite::None,
        _ => SameSite::Lax,
    }
}

pub fn build_session_cookie<'a>(config: &AppConfig, session_id: String) -> Cookie<'a> {
    Cookie::build(config.session_cookie_name.clone(), session_id)
        .path("/")
        .http_only(true)
        .secure(config.cookie_secure)
        .same_site(parse_samesite(&config.cookie_samesite))
        .max_age(CookieDuration::days(config.session_ttl_days))
        .finish()
}

pub fn expire_session_cookie<'a>(config: &AppConfig) -> Cookie<'a> {
    Cookie::build(config.session_cookie_name.clone(), "")
        .path("/")
        .http_only(true)
        .secure(config.cookie_secure)
        .same_site(parse_samesite(&config.cookie_samesite))
        .max_age(CookieDuration::seconds(0))
        .finish()
}
