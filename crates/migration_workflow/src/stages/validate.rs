use migration_context::{IssueSeverity, LogLevel, MigrationContext, MigrationStage, ValidationIssue};
use pty_session::PtySession;

use crate::process::pty_echo;

fn count_non_empty_lines(text: &str) -> i64 {
    text.lines().filter(|l| !l.trim().is_empty()).count() as i64
}

/// Line-count regression check: passes iff the converted (or final)
/// code's non-empty line count is at least the original source's.
/// Grounded on `graph/nodes/validate.py`'s `validate_node`.
pub async fn validate(ctx: &mut MigrationContext, pty: Option<&PtySession>) {
    if ctx.is_errored() {
        return;
    }

    ctx.transition(MigrationStage::Validate);
    ctx.log_event(LogLevel::Info, "Validating converted output");
    pty_echo(pty, "$ Validating converted output...");

    let output_source = if let Some(final_code) = &ctx.final_code {
        final_code.clone()
    } else if !ctx.converted_code.trim().is_empty() {
        ctx.converted_code.clone()
    } else {
        ctx.schema_mapped_code.clone()
    };

    let input_lines = count_non_empty_lines(&ctx.original_code);
    let output_lines = count_non_empty_lines(&output_source);

    ctx.validation_result.insert("input_lines".to_string(), input_lines);
    ctx.validation_result.insert("output_lines".to_string(), output_lines);

    if output_lines >= input_lines {
        ctx.validation_passed = true;
        if ctx.final_code.is_none() {
            ctx.final_code = Some(output_source);
        }
        ctx.log_event(
            LogLevel::Info,
            format!("Validation passed: {output_lines} output lines >= {input_lines} input lines"),
        );
        pty_echo(pty, "[OK] Validation passed");
    } else {
        ctx.validation_passed = false;
        ctx.validation_issues.push(ValidationIssue {
            severity: IssueSeverity::Error,
            message: format!(
                "Line count regression: {output_lines} output lines < {input_lines} input lines"
            ),
            code: Some("line_count_regression".to_string()),
        });
        ctx.log_event(
            LogLevel::Warning,
            format!("Validation failed: line count regression ({output_lines} < {input_lines})"),
        );
        pty_echo(pty, "[WARN] Validation failed: line count regression");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn empty_input_and_output_passes() {
        let mut ctx = MigrationContext::new("demo", PathBuf::from("/tmp/src"));
        validate(&mut ctx, None).await;
        assert!(ctx.validation_passed);
        assert_eq!(ctx.current_stage, MigrationStage::Validate);
    }

    #[tokio::test]
    async fn shrinking_output_fails_and_records_issue() {
        let mut ctx = MigrationContext::new("demo", PathBuf::from("/tmp/src"));
        ctx.original_code = "line one\nline two\nline three\n".to_string();
        ctx.converted_code = "line one\n".to_string();

        validate(&mut ctx, None).await;

        assert!(!ctx.validation_passed);
        assert_eq!(ctx.validation_issues.len(), 1);
        assert_eq!(
            ctx.validation_issues[0].code.as_deref(),
            Some("line_count_regression")
        );
    }

    #[tokio::test]
    async fn growing_output_passes_and_sets_final_code() {
        let mut ctx = MigrationContext::new("demo", PathBuf::from("/tmp/src"));
        ctx.original_code = "line one\n".to_string();
        ctx.converted_code = "line one\nline two\n".to_string();

        validate(&mut ctx, None).await;

        assert!(ctx.validation_passed);
        assert_eq!(ctx.final_code.as_deref(), Some("line one\nline two\n"));
    }
}
