use std::path::PathBuf;

use migration_context::{LogLevel, MigrationContext, MigrationStage, SummaryReport};
use pty_session::PtySession;

use crate::files::list_sql_files;
use crate::process::pty_echo;

/// Copy the converted project output to `outputs/<project>/converted/`,
/// build the summary report, and transition to `completed`. Re-running
/// this on an already-completed context re-copies the same files and
/// rebuilds the same report: a no-op beyond timestamps. Grounded on
/// `graph/nodes/finalize.py`'s `finalize_node`.
pub async fn finalize(ctx: &mut MigrationContext, pty: Option<&PtySession>) {
    if ctx.is_errored() {
        return;
    }

    ctx.transition(MigrationStage::Finalize);
    ctx.log_event(LogLevel::Info, "Finalizing migration output");
    pty_echo(pty, "$ Finalizing output...");

    let Some(project_path) = ctx.project_path.clone() else {
        ctx.record_fatal_error("No project_path set; init_project must run first");
        return;
    };

    let converted_dir = project_path.join("converted");
    let output_dir = PathBuf::from("outputs").join(&ctx.project_name).join("converted");

    if let Err(e) = std::fs::create_dir_all(&output_dir) {
        ctx.record_fatal_error(format!("Failed to create output directory: {e}"));
        return;
    }

    let mut output_files = Vec::new();
    for file in list_sql_files(&converted_dir) {
        let Ok(relative) = file.strip_prefix(&converted_dir) else {
            continue;
        };
        let dest = output_dir.join(relative);
        if let Some(parent) = dest.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match std::fs::copy(&file, &dest) {
            Ok(_) => output_files.push(dest),
            Err(e) => {
                let warning = format!("Failed to copy {} to output: {e}", file.display());
                ctx.warnings.push(warning.clone());
                ctx.log_event(LogLevel::Warning, warning);
            }
        }
    }

    ctx.output_path = Some(output_dir);
    ctx.output_files = output_files.clone();
    ctx.summary_report = Some(SummaryReport {
        status: "completed".to_string(),
        output_file_count: output_files.len(),
        validation_passed: ctx.validation_passed,
    });

    ctx.transition(MigrationStage::Completed);
    ctx.log_event(LogLevel::Info, "Migration completed successfully");
    pty_echo(pty, "[OK] Migration completed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn copies_converted_files_and_builds_summary() {
        let project_dir = tempdir().unwrap();
        let converted_dir = project_dir.path().join("converted");
        std::fs::create_dir_all(&converted_dir).unwrap();
        std::fs::write(converted_dir.join("out.sql"), "SELECT 1;").unwrap();

        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(project_dir.path()).unwrap();

        let mut ctx = MigrationContext::new("demo", PathBuf::from("/tmp/src"));
        ctx.project_path = Some(project_dir.path().to_path_buf());
        ctx.validation_passed = true;

        finalize(&mut ctx, None).await;

        std::env::set_current_dir(original_dir).unwrap();

        assert_eq!(ctx.current_stage, MigrationStage::Completed);
        assert_eq!(ctx.output_files.len(), 1);
        let report = ctx.summary_report.unwrap();
        assert_eq!(report.output_file_count, 1);
        assert!(report.validation_passed);
    }

    #[tokio::test]
    async fn missing_project_path_is_fatal() {
        let mut ctx = MigrationContext::new("demo", PathBuf::from("/tmp/src"));
        finalize(&mut ctx, None).await;
        assert!(ctx.is_errored());
    }
}
