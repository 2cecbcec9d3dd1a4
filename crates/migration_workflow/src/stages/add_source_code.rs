use migration_context::{LogLevel, MigrationContext, MigrationStage};
use pty_session::PtySession;

use crate::files::read_sql_files;
use crate::process::run_subprocess_with_echo;

/// Clean the scai project's `source/` directory, ingest `ctx.source_dir`
/// via the CLI's add command, and concatenate the ingested SQL-like files
/// into `original_code`. Grounded on
/// `graph/nodes/add_source_code.py`'s `add_source_code_node`.
pub async fn add_source_code(ctx: &mut MigrationContext, pty: Option<&PtySession>) {
    if ctx.is_errored() {
        return;
    }

    ctx.log_event(
        LogLevel::Info,
        format!("Adding source code for project: {}", ctx.project_name),
    );

    let Some(project_path) = ctx.project_path.clone() else {
        ctx.record_fatal_error("No project_path set; init_project must run first");
        return;
    };

    let source_dir = project_path.join("source");

    let mut source_input = ctx.source_dir.clone();
    if !source_input.is_dir() {
        if let Err(e) = std::fs::create_dir_all(&source_dir) {
            ctx.record_fatal_error(format!("Failed to create fallback source directory: {e}"));
            return;
        }
        let warning = format!(
            "Source directory does not exist: {}. Using fallback directory: {}",
            source_input.display(),
            source_dir.display()
        );
        ctx.warnings.push(warning.clone());
        ctx.log_event(LogLevel::Warning, warning);
        source_input = source_dir.clone();
    }

    if source_dir.is_dir() {
        let _ = std::fs::remove_dir_all(&source_dir);
    }

    let cmd = vec![
        "scai".to_string(),
        "code".to_string(),
        "add".to_string(),
        "-i".to_string(),
        source_input.to_string_lossy().into_owned(),
    ];

    let result = run_subprocess_with_echo(
        &cmd,
        &project_path,
        pty,
        std::time::Duration::from_secs(600),
    )
    .await;

    match result {
        Ok(output) if output.status == 0 => {
            ctx.scai_source_added = true;
            ctx.transition(MigrationStage::AddSourceCode);
            ctx.log_event(LogLevel::Info, "Source code added successfully");
            if ctx.original_code.is_empty() {
                ctx.original_code = read_sql_files(&source_dir);
            }
        }
        Ok(output) => {
            ctx.scai_source_added = false;
            let detail = if !output.stderr.trim().is_empty() {
                output.stderr.trim().to_string()
            } else if !output.stdout.trim().is_empty() {
                output.stdout.trim().to_string()
            } else {
                "unknown error".to_string()
            };
            ctx.record_fatal_error(format!("Failed to add source code: {detail}"));
        }
        Err(e) => {
            ctx.scai_source_added = false;
            ctx.record_fatal_error(format!("Exception during source code addition: {e}"));
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
        add_source_code(&mut ctx, None).await;
        assert!(ctx.is_errored());
    }
}
