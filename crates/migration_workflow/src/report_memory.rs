use std::path::{Path, PathBuf};

use migration_context::{ActionableIssue, MigrationContext, ReportScanSummary};

const DEFAULT_IGNORED_CODES_PATH: &str = "config/ignored_report_codes.json";

/// Load, uppercase, and de-duplicate the ignored-codes configuration.
/// Missing or malformed file ⇒ empty set. Grounded on
/// `core/report_memory.py`'s `load_ignored_report_codes`.
pub fn load_ignored_report_codes(path: Option<&Path>) -> Vec<String> {
    let path = path
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_IGNORED_CODES_PATH));
    let Ok(content) = std::fs::read_to_string(&path) else {
        return Vec::new();
    };
    let Ok(value) = serde_json::from_str::<serde_json::Value>(&content) else {
        return Vec::new();
    };
    let Some(codes) = value.get("ignored_codes").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    let mut normalized: Vec<String> = codes
        .iter()
        .filter_map(|c| c.as_str())
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized
}

fn find_latest(dir: &Path, prefix: &str, suffix: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    entries
        .flatten()
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|name| name.starts_with(prefix) && name.ends_with(suffix))
                .unwrap_or(false)
        })
        .max_by_key(|e| {
            e.metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        })
        .map(|e| e.path())
}

/// A single row from the Issues CSV, pre-normalization. Fields mirror the
/// SnowConvert report's header columns.
struct IssueRow {
    code: String,
    message: String,
    file: String,
}

fn parse_issues_csv(path: &Path) -> Vec<IssueRow> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    let mut lines = content.lines();
    let Some(header_line) = lines.next() else {
        return Vec::new();
    };
    let headers: Vec<String> = header_line.split(',').map(|h| h.trim().to_string()).collect();
    let code_idx = headers.iter().position(|h| h.eq_ignore_ascii_case("Code"));
    let desc_idx = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case("Description"));
    let file_idx = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case("ParentFile"));

    lines
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let fields: Vec<&str> = line.split(',').collect();
            let get = |idx: Option<usize>| -> String {
                idx.and_then(|i| fields.get(i))
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default()
            };
            IssueRow {
                code: get(code_idx).to_uppercase(),
                message: get(desc_idx),
                file: get(file_idx),
            }
        })
        .collect()
}

/// Refresh `ctx.report_scan_summary` and `ctx.ignored_codes` from the
/// SnowConvert reports on disk plus the context's own runtime history.
/// Grounded on `core/report_memory.py`'s `build_report_context_memory`.
pub fn build_report_context_memory(ctx: &mut MigrationContext) {
    let ignored_codes = load_ignored_report_codes(None);

    let reports_dir = ctx
        .project_path
        .as_ref()
        .map(|p| p.join("converted").join("Reports").join("SnowConvert"));

    let all_issues = reports_dir
        .as_deref()
        .and_then(|dir| find_latest(dir, "Issues.", ".csv"))
        .map(|path| parse_issues_csv(&path))
        .unwrap_or_default();

    let ignored_set: std::collections::HashSet<&str> =
        ignored_codes.iter().map(String::as_str).collect();

    let mut actionable_issues: Vec<ActionableIssue> = all_issues
        .iter()
        .filter(|issue| issue.code.is_empty() || !ignored_set.contains(issue.code.as_str()))
        .map(|issue| ActionableIssue {
            code: issue.code.clone(),
            message: issue.message.clone(),
            file: if issue.file.is_empty() {
                None
            } else {
                Some(issue.file.clone())
            },
        })
        .collect();
    let ignored_count = all_issues.len() - actionable_issues.len();
    actionable_issues.truncate(25);

    let last_execution_errors: Vec<_> = ctx
        .execution_errors
        .iter()
        .rev()
        .take(5)
        .rev()
        .cloned()
        .collect();

    let last_failed_statements: Vec<String> = ctx
        .execution_errors
        .iter()
        .rev()
        .filter_map(|e| e.statement.clone())
        .take(3)
        .collect();

    let self_heal_attempts: Vec<_> = ctx.self_heal_log.iter().rev().take(5).rev().cloned().collect();

    ctx.ignored_codes = ignored_codes;
    ctx.report_scan_summary = Some(ReportScanSummary {
        actionable_count: actionable_issues.len(),
        ignored_count,
        actionable_issues,
        last_execution_errors,
        last_failed_statements,
        self_heal_attempts,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn missing_ignored_codes_file_yields_empty_set() {
        let codes = load_ignored_report_codes(Some(Path::new("/does/not/exist.json")));
        assert!(codes.is_empty());
    }

    #[test]
    fn ignored_codes_are_uppercased_and_deduped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ignored.json");
        std::fs::write(&path, r#"{"ignored_codes": ["ssc-001", "SSC-001", "ssc-002"]}"#).unwrap();
        let codes = load_ignored_report_codes(Some(&path));
        assert_eq!(codes, vec!["SSC-001".to_string(), "SSC-002".to_string()]);
    }

    #[test]
    fn build_report_context_memory_filters_ignored_codes() {
        let dir = tempdir().unwrap();
        let reports_dir = dir.path().join("converted").join("Reports").join("SnowConvert");
        std::fs::create_dir_all(&reports_dir).unwrap();
        std::fs::write(
            reports_dir.join("Issues.1.csv"),
            "Code,Severity,Name,Description,ParentFile,Line,Column,MigrationID\n\
             SSC-001,Warning,Deprecated,Deprecated syntax,a.sql,1,1,m1\n\
             SSC-042,Error,Unsupported,Unsupported function,b.sql,2,1,m2\n",
        )
        .unwrap();

        let mut ctx = MigrationContext::new("demo", PathBuf::from("/tmp/demo"));
        ctx.project_path = Some(dir.path().to_path_buf());

        build_report_context_memory(&mut ctx);
        let summary = ctx.report_scan_summary.unwrap();
        assert_eq!(summary.actionable_count, 2);
        assert_eq!(summary.ignored_count, 0);
    }

    #[test]
    fn missing_reports_directory_yields_empty_summary() {
        let mut ctx = MigrationContext::new("demo", PathBuf::from("/tmp/demo"));
        ctx.project_path = Some(PathBuf::from("/does/not/exist"));
        build_report_context_memory(&mut ctx);
        let summary = ctx.report_scan_summary.unwrap();
        assert_eq!(summary.actionable_count, 0);
    }
}
