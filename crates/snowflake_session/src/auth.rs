use std::collections::HashMap;

use crate::error::{Result, SnowflakeSessionError};

/// Immutable upstream connection configuration. Never logged or persisted
/// as-is; the password, when required, is resolved separately and held
/// only for the duration of a connect call. Grounded on
/// `core/snowflake_auth.py`'s `SnowflakeAuthConfig`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnowflakeAuthConfig {
    pub account: String,
    pub user: String,
    pub role: String,
    pub warehouse: String,
    pub database: String,
    pub schema: String,
    pub authenticator: String,
}

impl SnowflakeAuthConfig {
    pub fn new(account: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            user: user.into(),
            role: String::new(),
            warehouse: String::new(),
            database: String::new(),
            schema: String::new(),
            authenticator: "externalbrowser".to_string(),
        }
    }

    /// Build the connection parameter map the connector hands to the
    /// upstream driver. Optional fields are omitted when empty, matching
    /// `to_connection_parameters`.
    pub fn connection_parameters(&self) -> HashMap<String, String> {
        let mut params = HashMap::new();
        params.insert("account".to_string(), self.account.clone());
        params.insert("user".to_string(), self.user.clone());
        params.insert("authenticator".to_string(), self.authenticator.clone());
        if !self.role.is_empty() {
            params.insert("role".to_string(), self.role.clone());
        }
        if !self.warehouse.is_empty() {
            params.insert("warehouse".to_string(), self.warehouse.clone());
        }
        if !self.database.is_empty() {
            params.insert("database".to_string(), self.database.clone());
        }
        if !self.schema.is_empty() {
            params.insert("schema".to_string(), self.schema.clone());
        }
        params
    }
}

/// Resolve the connection password in priority order: an explicit value
/// (e.g. UI input held only in memory), a secrets map, then the
/// environment. Returns `Ok(None)` when the authenticator doesn't need a
/// password at all (anything other than `"snowflake"`, e.g.
/// `externalbrowser`). Grounded on `resolve_password_from_sources`.
pub fn resolve_password_from_sources(
    authenticator: &str,
    explicit_password: Option<&str>,
    secrets: Option<&HashMap<String, String>>,
    env: Option<&HashMap<String, String>>,
) -> Result<Option<String>> {
    if authenticator != "snowflake" {
        return Ok(None);
    }

    if let Some(password) = explicit_password {
        if !password.is_empty() {
            return Ok(Some(password.to_string()));
        }
    }

    if let Some(secrets) = secrets {
        if let Some(password) = secrets.get("SNOWFLAKE_PASSWORD") {
            return Ok(Some(password.clone()));
        }
    }

    for key in ["SNOWFLAKE_PASSWORD", "SNOWFLAKE_PWD"] {
        let value = match env {
            Some(map) => map.get(key).cloned(),
            None => std::env::var(key).ok(),
        };
        if let Some(value) = value {
            if !value.is_empty() {
                return Ok(Some(value));
            }
        }
    }

    Err(SnowflakeSessionError::PasswordRequired)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_parameters_omit_empty_optional_fields() {
        let config = SnowflakeAuthConfig::new("acct", "bob");
        let params = config.connection_parameters();
        assert_eq!(params.get("account").map(String::as_str), Some("acct"));
        assert!(!params.contains_key("role"));
    }

    #[test]
    fn password_not_required_for_externalbrowser() {
        let resolved = resolve_password_from_sources("externalbrowser", None, None, None).unwrap();
        assert_eq!(resolved, None);
    }

    #[test]
    fn explicit_password_wins_over_secrets_and_env() {
        let mut secrets = HashMap::new();
        secrets.insert("SNOWFLAKE_PASSWORD".to_string(), "from-secrets".to_string());
        let resolved = resolve_password_from_sources(
            "snowflake",
            Some("from-explicit"),
            Some(&secrets),
            None,
        )
        .unwrap();
        assert_eq!(resolved.as_deref(), Some("from-explicit"));
    }

    #[test]
    fn falls_back_to_env_when_nothing_else_given() {
        let mut env = HashMap::new();
        env.insert("SNOWFLAKE_PWD".to_string(), "from-env".to_string());
        let resolved = resolve_password_from_sources("snowflake", None, None, Some(&env)).unwrap();
        assert_eq!(resolved.as_deref(), Some("from-env"));
    }

    #[test]
    fn missing_password_for_snowflake_authenticator_errors() {
        let result = resolve_password_from_sources("snowflake", None, None, Some(&HashMap::new()));
        assert!(matches!(result, Err(SnowflakeSessionError::PasswordRequired)));
    }
}
