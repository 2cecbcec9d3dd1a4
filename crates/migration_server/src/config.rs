//! Server configuration loaded from environment variables with fallback to
//! defaults. See SPEC_FULL.md §6 for the full variable list.

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub frontend_origins: Vec<String>,
    pub session_cookie_name: String,
    pub session_ttl_days: i64,
    pub cookie_secure: bool,
    pub cookie_samesite: String,
    pub sse_ping_interval_seconds: u64,
    pub cortex_model: String,
    pub cortex_function: String,
    pub sf_account: String,
    pub sf_user: String,
    pub sf_role: String,
    pub sf_warehouse: String,
    pub sf_database: String,
    pub sf_schema: String,
    pub sf_authenticator: String,
    pub upload_dir: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env_parsed("PORT", 8081),
            frontend_origins: env_or(
                "FRONTEND_ORIGINS",
                "http://localhost:5173,http://localhost:3000",
            )
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
            session_cookie_name: env_or("SESSION_COOKIE_NAME", "snowflake_session_id"),
            session_ttl_days: env_parsed("SESSION_TTL_DAYS", 30),
            cookie_secure: env_bool("COOKIE_SECURE", false),
            cookie_samesite: env_or("COOKIE_SAMESITE", "lax"),
            sse_ping_interval_seconds: env_parsed("SSE_PING_INTERVAL_SECONDS", 12),
            cortex_model: env_or("CORTEX_MODEL", "claude-4-sonnet"),
            cortex_function: env_or("CORTEX_FUNCTION", "complete"),
            sf_account: env_or("SF_ACCOUNT", ""),
            sf_user: env_or("SF_USER", ""),
            sf_role: env_or("SF_ROLE", ""),
            sf_warehouse: env_or("SF_WAREHOUSE", ""),
            sf_database: env_or("SF_DATABASE", ""),
            sf_schema: env_or("SF_SCHEMA", ""),
            sf_authenticator: env_or("SF_AUTHENTICATOR", "externalbrowser"),
            upload_dir: env_or("UPLOAD_DIR", "./uploads"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontend_origins_default_splits_into_two_entries() {
        std::env::remove_var("FRONTEND_ORIGINS");
        let config = AppConfig::from_env();
        assert_eq!(
            config.frontend_origins,
            vec!["http://localhost:5173", "http://localhost:3000"]
        );
    }

    #[test]
    fn cookie_secure_defaults_to_false() {
        std::env::remove_var("COOKIE_SECURE");
        assert!(!AppConfig::from_env().cookie_secure);
    }
}
