use migration_context::{LogLevel, MigrationContext, MigrationStage};
use pty_session::PtySession;

use crate::files::{list_sql_files, read_sql_files};
use crate::process::run_subprocess_with_echo;
use crate::report_memory::build_report_context_memory;

/// 1-hour timeout for the migration CLI's convert command, large
/// codebases can take a long time. Grounded on `convert_code.py`'s
/// `timeout=3600.0`.
const CONVERT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(3600);

/// Run the migration CLI's convert command, then read the produced files
/// and build the report memory self-heal will consume. Grounded on
/// `graph/nodes/convert_code.py`'s `convert_code_node`.
pub async fn convert_code(ctx: &mut MigrationContext, pty: Option<&PtySession>) {
    if ctx.is_errored() {
        return;
    }

    ctx.log_event(
        LogLevel::Info,
        format!("Converting code for project: {}", ctx.project_name),
    );

    let Some(project_path) = ctx.project_path.clone() else {
        ctx.record_fatal_error("No project_path set; init_project must run first");
        return;
    };

    let cmd = vec![
        "scai".to_string(),
        "code".to_string(),
        "convert".to_string(),
    ];

    let result = run_subprocess_with_echo(&cmd, &project_path, pty, CONVERT_TIMEOUT).await;

    match result {
        Ok(output) if output.status == 0 => {
            ctx.scai_converted = true;
            ctx.transition(MigrationStage::ConvertCode);
            ctx.log_event(LogLevel::Info, "Code conversion completed successfully");

            let converted_dir = project_path.join("converted");
            ctx.converted_files = list_sql_files(&converted_dir);
            ctx.converted_code = read_sql_files(&converted_dir);

            if ctx.converted_code.is_empty() {
                let fallback = if !ctx.schema_mapped_code.is_empty() {
                    ctx.schema_mapped_code.clone()
                } else {
                    ctx.original_code.clone()
                };
                if !fallback.is_empty() {
                    ctx.warnings
                        .push("Converted output files not found; using in-memory SQL content.".to_string());
                    ctx.log_event(
                        LogLevel::Warning,
                        "Converted output files not found; using in-memory SQL content.",
                    );
                    ctx.converted_code = fallback;
                }
            }

            build_report_context_memory(ctx);
        }
        Ok(output) => {
            ctx.scai_converted = false;
            let detail = if !output.stderr.trim().is_empty() {
                output.stderr.trim().to_string()
            } else if !output.stdout.trim().is_empty() {
                output.stdout.trim().to_string()
            } else {
                "unknown error".to_string()
            };
            ctx.record_fatal_error(format!("Failed to convert code: {detail}"));
        }
        Err(e) => {
            ctx.scai_converted = false;
            ctx.record_fatal_error(format!("Exception during code conversion: {e}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn requires_project_path_first() {
        let mut ctx = MigrationContext::new("demo", PathBuf::from("/tmp/src"));
        convert_code(&mut ctx, None).await;
        assert!(ctx.is_errored());
    }
}
