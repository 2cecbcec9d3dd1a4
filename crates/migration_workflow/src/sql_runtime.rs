use snowflake_session::SnowflakeExecutor;
use tokio::sync::Mutex;

use migration_context::ExecutionError;

/// Split SQL text into statements on top-level `;` characters, respecting
/// single-quoted, double-quoted, and `$$…$$` dollar-quoted spans so
/// semicolons inside literals are never treated as separators. Grounded
/// on `core/snowflake_runtime.py`'s `split_sql_statements`.
pub fn split_sql_statements(sql_text: &str) -> Vec<String> {
    let chars: Vec<char> = sql_text.chars().collect();
    let mut statements = Vec::new();
    let mut buf = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut in_dollar = false;
    let mut prev: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        let next = chars.get(i + 1).copied();

        if !in_single && !in_double && ch == '$' && next == Some('$') {
            in_dollar = !in_dollar;
            buf.push(ch);
            buf.push(next.unwrap());
            i += 2;
            prev = None;
            continue;
        }

        if ch == '\'' && !in_double && prev != Some('\\') {
            if !in_dollar {
                in_single = !in_single;
            }
        } else if ch == '"' && !in_single && prev != Some('\\') {
            if !in_dollar {
                in_double = !in_double;
            }
        }

        if ch == ';' && !in_single && !in_double && !in_dollar {
            let trimmed = buf.trim();
            if !trimmed.is_empty() {
                statements.push(trimmed.to_string());
            }
            buf.clear();
            i += 1;
            prev = None;
            continue;
        }

        buf.push(ch);
        prev = Some(ch);
        i += 1;
    }

    let tail = buf.trim();
    if !tail.is_empty() {
        statements.push(tail.to_string());
    }
    statements
}

/// Classify an upstream error message as a missing-object gap (a human
/// must supply DDL) or a generic execution error, extracting the
/// candidate object name between quotes when present. Grounded on
/// `classify_snowflake_error`.
pub fn classify_snowflake_error(error_message: &str) -> (&'static str, Option<String>) {
    const MISSING_PATTERNS: [&str; 5] = [
        "does not exist or not authorized",
        "does not exist",
        "object does not exist",
        "table does not exist",
        "schema does not exist",
    ];

    let lowered = error_message.to_lowercase();
    if !MISSING_PATTERNS.iter().any(|p| lowered.contains(p)) {
        return ("execution_error", None);
    }

    for token in ["Object '", "object '", "Table '", "table '", "\""] {
        if let Some(start) = error_message.find(token) {
            let after = start + token.len();
            if let Some(end_offset) = error_message[after..].find(['\'', '"']) {
                let name = &error_message[after..after + end_offset];
                if !name.is_empty() {
                    return ("missing_object", Some(name.to_string()));
                }
            }
        }
    }
    ("missing_object", None)
}

pub struct SqlExecutionError {
    pub message: String,
    pub statement: String,
    pub statement_index: usize,
}

/// Execute `sql_text` statement-by-statement, stopping at the first
/// failure. Holds `query_lock` for the whole statement sequence: the
/// upstream connection isn't safe for interleaved queries from another
/// session's SQL or LLM call. Grounded on `execute_sql_with_chat_runtime`.
pub async fn execute_sql_statements(
    executor: &dyn SnowflakeExecutor,
    sql_text: &str,
    query_lock: &Mutex<()>,
) -> Result<Vec<snowflake_session::StatementResult>, SqlExecutionError> {
    let _guard = query_lock.lock().await;
    let statements = split_sql_statements(sql_text);
    let mut results = Vec::with_capacity(statements.len());

    for (index, statement) in statements.iter().enumerate() {
        match executor.execute_statement(statement).await {
            Ok(result) => results.push(result),
            Err(e) => {
                return Err(SqlExecutionError {
                    message: e.to_string(),
                    statement: statement.clone(),
                    statement_index: index,
                })
            }
        }
    }
    Ok(results)
}

pub fn execution_error_from_message(
    message: String,
    statement: Option<String>,
    file: Option<String>,
) -> ExecutionError {
    let (error_type, _object_name) = classify_snowflake_error(&message);
    ExecutionError {
        error_type: error_type.to_string(),
        message,
        statement,
        file,
        timestamp: chrono::Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_top_level_semicolons() {
        let stmts = split_sql_statements("SELECT 1; SELECT 2;");
        assert_eq!(stmts, vec!["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn preserves_semicolons_inside_single_quotes() {
        let stmts = split_sql_statements("INSERT INTO t VALUES ('a;b');");
        assert_eq!(stmts, vec!["INSERT INTO t VALUES ('a;b')"]);
    }

    #[test]
    fn preserves_semicolons_inside_dollar_quotes() {
        let stmts = split_sql_statements(
            "CREATE PROCEDURE p() AS $$ BEGIN SELECT 1; END $$;",
        );
        assert_eq!(
            stmts,
            vec!["CREATE PROCEDURE p() AS $$ BEGIN SELECT 1; END $$"]
        );
    }

    #[test]
    fn tolerates_missing_trailing_semicolon() {
        let stmts = split_sql_statements("SELECT 1; SELECT 2");
        assert_eq!(stmts, vec!["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn round_trips_via_join_modulo_trimming() {
        let text = "SELECT 1; SELECT 2; SELECT 3;";
        let stmts = split_sql_statements(text);
        assert_eq!(stmts.join("; ") + ";", text);
    }

    #[test]
    fn classifies_missing_object_and_extracts_name() {
        let (kind, name) =
            classify_snowflake_error("Object 'MISSING_TABLE' does not exist or not authorized.");
        assert_eq!(kind, "missing_object");
        assert_eq!(name.as_deref(), Some("MISSING_TABLE"));
    }

    #[test]
    fn classifies_generic_execution_errors() {
        let (kind, name) = classify_snowflake_error("syntax error near SELECT");
        assert_eq!(kind, "execution_error");
        assert!(name.is_none());
    }
}
