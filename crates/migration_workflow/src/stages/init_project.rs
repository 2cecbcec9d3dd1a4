use std::path::PathBuf;

use migration_context::{LogLevel, MigrationContext, MigrationStage};
use pty_session::PtySession;

use crate::process::run_subprocess_with_echo;

const IGNORED_RESET_ENTRIES: [&str; 3] = [".DS_Store", "Thumbs.db", "desktop.ini"];

/// Create `projects/<name>`, resetting it first if it holds anything but
/// OS metadata cruft, then run the migration CLI's init command. Grounded
/// on `graph/nodes/init_project.py`'s `init_project_node`.
pub async fn init_project(ctx: &mut MigrationContext, pty: Option<&PtySession>) {
    if ctx.is_errored() {
        return;
    }

    ctx.log_event(
        LogLevel::Info,
        format!("Initializing project: {}", ctx.project_name),
    );

    let project_path = PathBuf::from("projects").join(&ctx.project_name);

    if project_path.is_dir() {
        let has_real_entries = std::fs::read_dir(&project_path)
            .map(|entries| {
                entries.flatten().any(|e| {
                    !IGNORED_RESET_ENTRIES.contains(&e.file_name().to_string_lossy().as_ref())
                })
            })
            .unwrap_or(false);
        if has_real_entries {
            let warning = format!(
                "Project directory already exists and is not empty. Resetting before init: {}",
                project_path.display()
            );
            ctx.warnings.push(warning.clone());
            ctx.log_event(LogLevel::Warning, warning);
            let _ = std::fs::remove_dir_all(&project_path);
        }
    }

    if let Err(e) = std::fs::create_dir_all(&project_path) {
        ctx.scai_project_initialized = false;
        ctx.record_fatal_error(format!("Failed to create project directory: {e}"));
        return;
    }

    let cmd = vec![
        "scai".to_string(),
        "init".to_string(),
        "-l".to_string(),
        ctx.source_language.clone(),
        "-n".to_string(),
        ctx.project_name.clone(),
        "-s".to_string(),
    ];

    let result = run_subprocess_with_echo(
        &cmd,
        &project_path,
        pty,
        std::time::Duration::from_secs(300),
    )
    .await;

    match result {
        Ok(output) if output.status == 0 => {
            ctx.project_path = Some(project_path.clone());
            ctx.scai_project_initialized = true;
            ctx.transition(MigrationStage::InitProject);
            ctx.log_event(
                LogLevel::Info,
                format!("Project initialized at: {}", project_path.display()),
            );
        }
        Ok(output) => {
            ctx.scai_project_initialized = false;
            let detail = if !output.stderr.trim().is_empty() {
                output.stderr.trim().to_string()
            } else if !output.stdout.trim().is_empty() {
                output.stdout.trim().to_string()
            } else {
                format!("exit code {}", output.status)
            };
            ctx.record_fatal_error(format!("Failed to initialize project: {detail}"));
        }
        Err(e) => {
            ctx.scai_project_initialized = false;
            ctx.record_fatal_error(format!("Exception during project initialization: {e}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn short_circuits_when_already_errored() {
        let mut ctx = MigrationContext::new("demo", PathBuf::from("/tmp/src"));
        ctx.transition(MigrationStage::Error);
        init_project(&mut ctx, None).await;
        assert!(ctx.project_path.is_none());
    }
}
