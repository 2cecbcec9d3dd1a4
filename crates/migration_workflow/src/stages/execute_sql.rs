use migration_context::{
    ExecutionError, FileExecutionLogEntry, IssueSeverity, LogLevel, MigrationContext,
    MigrationStage, ValidationIssue,
};
use pty_session::PtySession;
use snowflake_session::SnowflakeExecutor;
use tokio::sync::Mutex;

use crate::files::list_sql_files;
use crate::process::pty_echo;
use crate::sql_runtime::{classify_snowflake_error, execute_sql_statements, split_sql_statements};

/// Apply an uploaded DDL script and clear the resume flag. Left in
/// `requires_ddl_upload = true` (and the run paused in human_review) on
/// any failure so the runner stays parked until a fresh upload arrives.
/// Grounded on `graph/nodes/execute_sql.py`'s `_apply_uploaded_ddl`.
async fn apply_uploaded_ddl(
    ctx: &mut MigrationContext,
    executor: &dyn SnowflakeExecutor,
    pty: Option<&PtySession>,
    query_lock: &Mutex<()>,
) {
    let Some(ddl_path) = ctx.ddl_upload_path.clone().filter(|p| p.exists()) else {
        ctx.transition(MigrationStage::HumanReview);
        ctx.requires_human_intervention = true;
        ctx.human_review_reason = Some("DDL upload is required to resolve missing objects.".to_string());
        ctx.log_event(LogLevel::Warning, "DDL upload path missing for resume");
        return;
    };

    let ddl_sql = match std::fs::read_to_string(&ddl_path) {
        Ok(content) => content,
        Err(e) => {
            ctx.errors.push(format!("Failed to execute uploaded DDL: {e}"));
            ctx.transition(MigrationStage::HumanReview);
            ctx.requires_human_intervention = true;
            ctx.requires_ddl_upload = true;
            ctx.human_review_reason = Some(format!("Failed to execute uploaded DDL: {e}"));
            ctx.log_event(LogLevel::Error, format!("Failed to execute uploaded DDL: {e}"));
            return;
        }
    };

    if ddl_sql.trim().is_empty() {
        ctx.transition(MigrationStage::HumanReview);
        ctx.requires_human_intervention = true;
        ctx.human_review_reason = Some("Uploaded DDL file is empty.".to_string());
        ctx.log_event(LogLevel::Warning, "Uploaded DDL file is empty");
        return;
    }

    pty_echo(pty, "$ Executing uploaded DDL script...");

    match execute_sql_statements(executor, &ddl_sql, query_lock).await {
        Ok(_) => {
            ctx.requires_ddl_upload = false;
            ctx.ddl_upload_path = None;
            ctx.resume_from_stage = Some(MigrationStage::ExecuteSql);
            ctx.requires_human_intervention = false;
            ctx.human_review_reason = None;
            ctx.log_event(
                LogLevel::Info,
                "Uploaded DDL executed successfully, resuming SQL execution",
            );
            pty_echo(pty, "[OK] DDL executed, resuming SQL execution");
        }
        Err(e) => {
            let message = format!("Failed to execute uploaded DDL: {}", e.message);
            ctx.errors.push(message.clone());
            ctx.transition(MigrationStage::HumanReview);
            ctx.requires_human_intervention = true;
            ctx.requires_ddl_upload = true;
            ctx.human_review_reason = Some(message.clone());
            ctx.log_event(LogLevel::Error, message);
        }
    }
}

/// Execute every converted SQL file statement-by-statement on the
/// upstream connection, resuming from `last_executed_file_index + 1`.
/// Missing-object failures pause for human review; other failures route
/// to self-heal. Grounded on `graph/nodes/execute_sql.py`'s
/// `execute_sql_node`.
pub async fn execute_sql(
    ctx: &mut MigrationContext,
    executor: &dyn SnowflakeExecutor,
    pty: Option<&PtySession>,
    query_lock: &Mutex<()>,
) {
    if ctx.is_errored() {
        return;
    }

    ctx.transition(MigrationStage::ExecuteSql);
    ctx.log_event(LogLevel::Info, "Executing converted SQL");
    pty_echo(pty, "$ Executing converted SQL in Snowflake...");

    if ctx.requires_ddl_upload {
        apply_uploaded_ddl(ctx, executor, pty, query_lock).await;
        if ctx.requires_ddl_upload {
            return;
        }
    }

    let Some(project_path) = ctx.project_path.clone() else {
        ctx.record_fatal_error("No project_path set; init_project must run first");
        return;
    };
    let converted_dir = project_path.join("converted");
    let sql_files = list_sql_files(&converted_dir);

    if !sql_files.is_empty() {
        let start_index = (ctx.last_executed_file_index + 1).max(0) as usize;
        for index in start_index..sql_files.len() {
            let file = &sql_files[index];
            let file_label = file.to_string_lossy().into_owned();
            pty_echo(
                pty,
                &format!(
                    "  Executing: {}",
                    file.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
                ),
            );

            let sql_text = match std::fs::read_to_string(file) {
                Ok(text) => text,
                Err(e) => {
                    fail_execution(
                        ctx,
                        pty,
                        format!("Failed to read {file_label}: {e}"),
                        None,
                        Some(file_label.clone()),
                        0,
                        0,
                    );
                    return;
                }
            };

            if sql_text.trim().is_empty() {
                ctx.file_execution_log.push(FileExecutionLogEntry {
                    file: file_label,
                    statements_total: 0,
                    statements_succeeded: 0,
                    error: None,
                });
                ctx.last_executed_file_index = index as i64;
                continue;
            }

            match execute_sql_statements(executor, &sql_text, query_lock).await {
                Ok(results) => {
                    ctx.file_execution_log.push(FileExecutionLogEntry {
                        file: file_label,
                        statements_total: results.len(),
                        statements_succeeded: results.len(),
                        error: None,
                    });
                    ctx.last_executed_file_index = index as i64;
                }
                Err(sql_err) => {
                    let total = split_sql_statements(&sql_text).len();
                    fail_execution(
                        ctx,
                        pty,
                        sql_err.message,
                        Some(sql_err.statement),
                        Some(file_label),
                        total,
                        sql_err.statement_index,
                    );
                    return;
                }
            }
        }
    } else if !ctx.converted_code.trim().is_empty() {
        match execute_sql_statements(executor, &ctx.converted_code.clone(), query_lock).await {
            Ok(results) => {
                ctx.file_execution_log.push(FileExecutionLogEntry {
                    file: "in_memory_converted_code".to_string(),
                    statements_total: results.len(),
                    statements_succeeded: results.len(),
                    error: None,
                });
                ctx.last_executed_file_index = 0;
            }
            Err(sql_err) => {
                let total = split_sql_statements(&ctx.converted_code).len();
                fail_execution(
                    ctx,
                    pty,
                    sql_err.message,
                    Some(sql_err.statement),
                    Some("in_memory_converted_code".to_string()),
                    total,
                    sql_err.statement_index,
                );
                return;
            }
        }
    } else {
        ctx.record_fatal_error("No converted SQL files or converted_code found for execution.");
        return;
    }

    ctx.execution_passed = true;
    ctx.execution_errors.clear();
    ctx.missing_objects.clear();
    ctx.validation_issues.clear();
    ctx.log_event(LogLevel::Info, "Converted SQL execution completed successfully");
    pty_echo(pty, "[OK] SQL execution completed successfully");
}

#[allow(clippy::too_many_arguments)]
fn fail_execution(
    ctx: &mut MigrationContext,
    pty: Option<&PtySession>,
    message: String,
    statement: Option<String>,
    file: Option<String>,
    statements_total: usize,
    statements_succeeded: usize,
) {
    let (error_type, object_name) = classify_snowflake_error(&message);

    ctx.execution_passed = false;
    ctx.execution_errors.push(ExecutionError {
        error_type: error_type.to_string(),
        message: message.clone(),
        statement,
        file: file.clone(),
        timestamp: chrono::Utc::now(),
    });
    ctx.file_execution_log.push(FileExecutionLogEntry {
        file: file.unwrap_or_else(|| "unknown".to_string()),
        statements_total,
        statements_succeeded,
        error: Some(message.clone()),
    });

    pty_echo(pty, &format!("[ERROR] SQL execution failed: {error_type}"));

    if error_type == "missing_object" {
        if let Some(name) = object_name {
            let normalized = name.trim().to_string();
            if !normalized.is_empty() && !ctx.missing_objects.contains(&normalized) {
                ctx.missing_objects.push(normalized);
            }
        }
        ctx.requires_ddl_upload = true;
        ctx.requires_human_intervention = true;
        ctx.resume_from_stage = Some(MigrationStage::ExecuteSql);
        ctx.transition(MigrationStage::HumanReview);
        let missing_detail = if ctx.missing_objects.is_empty() {
            "unresolved object".to_string()
        } else {
            ctx.missing_objects.join(", ")
        };
        let reason = format!(
            "Missing object detected: {missing_detail}. Upload DDL script to create required objects, then resume."
        );
        ctx.human_review_reason = Some(reason.clone());
        ctx.log_event(LogLevel::Warning, reason);
        pty_echo(pty, &format!("[PAUSED] Missing object: {missing_detail}"));
        return;
    }

    ctx.validation_issues.push(ValidationIssue {
        severity: IssueSeverity::Error,
        message: message.clone(),
        code: Some("execution_error".to_string()),
    });
    ctx.log_event(
        LogLevel::Error,
        format!("Execution failed, routing to self-heal: {message}"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use snowflake_session::StatementResult;
    use std::path::PathBuf;

    struct FailingExecutor;

    #[async_trait]
    impl SnowflakeExecutor for FailingExecutor {
        async fn execute_statement(
            &self,
            _statement: &str,
        ) -> snowflake_session::Result<StatementResult> {
            Err(snowflake_session::SnowflakeSessionError::Connect(
                "Object 'MISSING_TABLE' does not exist or not authorized.".to_string(),
            ))
        }

        async fn ping(&self) -> snowflake_session::Result<()> {
            Ok(())
        }

        async fn close(&self) {}
    }

    #[tokio::test]
    async fn missing_object_failure_routes_to_human_review() {
        let mut ctx = MigrationContext::new("demo", PathBuf::from("/tmp/src"));
        ctx.converted_code = "SELECT * FROM MISSING_TABLE;".to_string();

        execute_sql(&mut ctx, &FailingExecutor, None, &Mutex::new(())).await;

        assert_eq!(ctx.current_stage, MigrationStage::HumanReview);
        assert!(ctx.requires_ddl_upload);
        assert_eq!(ctx.missing_objects, vec!["MISSING_TABLE".to_string()]);
    }
}
