use migration_context::{LogLevel, MigrationContext, MigrationStage};
use pty_session::PtySession;

use crate::crosswalk::{apply_crosswalk, load_crosswalk};
use crate::files::{list_sql_files, read_sql_files};
use crate::process::pty_echo;

/// Rewrite every SQL-like file under `source/` through the crosswalk and
/// swap the result in as the new `source/` directory. Grounded on
/// `graph/nodes/apply_schema_mapping.py`'s `apply_schema_mapping_node`.
pub async fn apply_schema_mapping(ctx: &mut MigrationContext, pty: Option<&PtySession>) {
    if ctx.is_errored() {
        return;
    }

    ctx.log_event(
        LogLevel::Info,
        format!("Applying schema mapping for project: {}", ctx.project_name),
    );

    let Some(project_path) = ctx.project_path.clone() else {
        ctx.record_fatal_error("No project_path set; init_project must run first");
        return;
    };

    let source_dir = project_path.join("source");
    let mapped_dir = project_path.join("source_mapped");

    if let Err(e) = std::fs::create_dir_all(&mapped_dir) {
        ctx.record_fatal_error(format!("Failed to create mapped output directory: {e}"));
        return;
    }

    let mappings = match ctx.crosswalk_path.as_deref() {
        Some(path) => match load_crosswalk(path) {
            Ok(mappings) => mappings,
            Err(e) => {
                ctx.record_fatal_error(format!("Failed to read crosswalk CSV: {e}"));
                return;
            }
        },
        None => Vec::new(),
    };

    for file in list_sql_files(&source_dir) {
        let Ok(content) = std::fs::read_to_string(&file) else {
            continue;
        };
        let rewritten = apply_crosswalk(&content, &mappings);
        let Ok(relative) = file.strip_prefix(&source_dir) else {
            continue;
        };
        let dest = mapped_dir.join(relative);
        if let Some(parent) = dest.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(&dest, rewritten) {
            let warning = format!("Failed to write mapped file {}: {e}", dest.display());
            ctx.warnings.push(warning.clone());
            ctx.log_event(LogLevel::Warning, warning);
        }
    }

    if source_dir.is_dir() {
        let _ = std::fs::remove_dir_all(&source_dir);
    }
    if mapped_dir.is_dir() {
        if let Err(e) = std::fs::rename(&mapped_dir, &source_dir) {
            let warning = format!("Failed to swap in mapped source directory: {e}");
            ctx.warnings.push(warning.clone());
            ctx.log_event(LogLevel::Warning, warning);
        }
    } else {
        let _ = std::fs::create_dir_all(&source_dir);
        let warning = format!("Mapped output directory not found: {}", mapped_dir.display());
        ctx.warnings.push(warning.clone());
        ctx.log_event(LogLevel::Warning, warning);
    }

    ctx.transition(MigrationStage::ApplySchemaMapping);
    ctx.log_event(LogLevel::Info, "Schema mapping applied successfully");
    pty_echo(pty, "[OK] Schema mapping applied successfully");

    ctx.schema_mapped_code = read_sql_files(&source_dir);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[tokio::test]
    async fn rewrites_sql_files_through_crosswalk() {
        let project_dir = tempdir().unwrap();
        let source_dir = project_dir.path().join("source");
        std::fs::create_dir_all(&source_dir).unwrap();
        std::fs::write(
            source_dir.join("t.sql"),
            "SELECT * FROM LEGACY_DB.CUSTOMERS;",
        )
        .unwrap();

        let crosswalk_dir = tempdir().unwrap();
        let crosswalk_path = crosswalk_dir.path().join("crosswalk.csv");
        std::fs::write(
            &crosswalk_path,
            "SOURCE_SCHEMA,TARGET_DB_SCHEMA\nLEGACY_DB,PROD\n",
        )
        .unwrap();

        let mut ctx = MigrationContext::new("demo", PathBuf::from("/tmp/src"));
        ctx.project_path = Some(project_dir.path().to_path_buf());
        ctx.crosswalk_path = Some(crosswalk_path);

        apply_schema_mapping(&mut ctx, None).await;

        assert!(!ctx.is_errored());
        assert!(ctx.schema_mapped_code.contains("PROD.CUSTOMERS"));
    }
}
