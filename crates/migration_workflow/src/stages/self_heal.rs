use futures::StreamExt;
use migration_context::{LogLevel, MigrationContext, MigrationStage, SelfHealAttempt};
use llm_client::{escape_dollar_quote, LlmChunk, LlmProvider, Message};
use pty_session::PtySession;
use tokio::sync::Mutex;

use crate::process::pty_echo;
use crate::report_memory::build_report_context_memory;

/// Strip a leading/trailing ``` fence (with optional language tag) from an
/// LLM repair response. Grounded on the markdown-fence stripping the
/// original orchestrator applies before persisting repaired code.
fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let body = body.strip_suffix("```").unwrap_or(body);
    match body.split_once('\n') {
        Some((first_line, rest)) if first_line.trim().chars().all(|c| c.is_alphanumeric()) => {
            rest.trim().to_string()
        }
        _ => body.trim().to_string(),
    }
}

fn build_repair_prompt(ctx: &MigrationContext) -> String {
    let mut sections = vec![format!(
        "You are repairing SQL converted from {} to {}. This is self-heal iteration {} of {}.",
        ctx.source_language, ctx.target_platform, ctx.self_heal_iteration, ctx.max_self_heal_iterations
    )];

    if let Some(statement_type) = ctx.statement_type {
        sections.push(format!("Statement type: {statement_type:?}"));
    }

    if let Some(summary) = &ctx.report_scan_summary {
        if !summary.actionable_issues.is_empty() {
            let issues: Vec<String> = summary
                .actionable_issues
                .iter()
                .map(|issue| format!("- [{}] {}", issue.code, issue.message))
                .collect();
            sections.push(format!("Actionable report issues:\n{}", issues.join("\n")));
        }
        if !ctx.ignored_codes.is_empty() {
            sections.push(format!("Ignored codes (do not flag these): {}", ctx.ignored_codes.join(", ")));
        }
        if !summary.last_failed_statements.is_empty() {
            sections.push(format!(
                "Recently failed statements:\n{}",
                summary.last_failed_statements.join("\n---\n")
            ));
        }
        if !summary.last_execution_errors.is_empty() {
            let errors: Vec<String> = summary
                .last_execution_errors
                .iter()
                .map(|e| format!("- [{}] {}", e.error_type, e.message))
                .collect();
            sections.push(format!("Latest execution errors:\n{}", errors.join("\n")));
        }
    }

    if !ctx.validation_issues.is_empty() {
        let issues: Vec<String> = ctx
            .validation_issues
            .iter()
            .map(|i| format!("- {:?}: {}", i.severity, i.message))
            .collect();
        sections.push(format!("Validation issues:\n{}", issues.join("\n")));
    }

    sections.push(format!(
        "Converted code to repair:\n```sql\n{}\n```",
        escape_dollar_quote(&ctx.converted_code)
    ));
    sections.push(
        "Return ONLY the fully repaired SQL, with no explanation and no markdown fence."
            .to_string(),
    );

    sections.join("\n\n")
}

async fn collect_llm_text(
    llm: &dyn LlmProvider,
    messages: &[Message],
    model: Option<&str>,
) -> Result<String, llm_client::LlmError> {
    let mut stream = llm.chat_stream(messages, model).await?;
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        if let LlmChunk::Delta(delta) = chunk? {
            text.push_str(&delta);
        }
    }
    Ok(text)
}

/// Ask the LLM to repair `converted_code` given the current report memory
/// and validation/execution issues, then persist the result to disk.
/// Budget is `max_self_heal_iterations` (default 5). Grounded on
/// `graph/nodes/self_heal.py`'s `self_heal_node`; `apply_self_healing`
/// itself is synthesized from SPEC_FULL.md §4.5 since `core/integrations.py`
/// is a stub in the retrieved source.
pub async fn self_heal(
    ctx: &mut MigrationContext,
    llm: &dyn LlmProvider,
    model: Option<&str>,
    pty: Option<&PtySession>,
    query_lock: &Mutex<()>,
) {
    if ctx.is_errored() {
        return;
    }

    ctx.self_heal_iteration += 1;
    ctx.transition(MigrationStage::SelfHeal);
    ctx.log_event(
        LogLevel::Info,
        format!("Self-healing iteration {}", ctx.self_heal_iteration),
    );
    pty_echo(
        pty,
        &format!("$ Self-healing iteration {}...", ctx.self_heal_iteration),
    );

    build_report_context_memory(ctx);

    if ctx.converted_code.is_empty() {
        ctx.warnings.push("No code available for self-healing".to_string());
        ctx.log_event(LogLevel::Warning, "No code available for self-healing");
        return;
    }

    let prompt = build_repair_prompt(ctx);
    let messages = vec![Message::user(prompt)];

    let response = {
        let _guard = query_lock.lock().await;
        collect_llm_text(llm, &messages, model).await
    };

    match response {
        Ok(raw) => {
            let fixed_code = strip_code_fence(&raw);
            if fixed_code.is_empty() {
                let error_msg = "Self-healing returned empty output".to_string();
                ctx.errors
                    .push(format!("[Self-Heal Iter {}] {error_msg}", ctx.self_heal_iteration));
                ctx.log_event(LogLevel::Error, format!("Self-heal failed: {error_msg}"));
                ctx.self_heal_log.push(SelfHealAttempt {
                    iteration: ctx.self_heal_iteration,
                    success: false,
                    notes: Some(error_msg),
                    timestamp: chrono::Utc::now(),
                });
                return;
            }

            ctx.converted_code = fixed_code.clone();
            for file_path in ctx.converted_files.clone() {
                if let Some(parent) = file_path.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }
                if let Err(e) = std::fs::write(&file_path, &fixed_code) {
                    let msg = format!("Failed to persist healed code to {}: {e}", file_path.display());
                    ctx.warnings.push(msg.clone());
                    ctx.log_event(LogLevel::Warning, msg);
                }
            }

            let budget_exhausted = ctx.self_heal_iteration >= ctx.max_self_heal_iterations;
            let no_actionable_issues = ctx
                .report_scan_summary
                .as_ref()
                .map(|s| s.actionable_count == 0)
                .unwrap_or(true);
            if budget_exhausted || no_actionable_issues {
                ctx.final_code = Some(fixed_code);
            }

            ctx.self_heal_log.push(SelfHealAttempt {
                iteration: ctx.self_heal_iteration,
                success: true,
                notes: None,
                timestamp: chrono::Utc::now(),
            });

            ctx.log_event(
                LogLevel::Info,
                format!("Self-healing iteration {} completed successfully", ctx.self_heal_iteration),
            );
            pty_echo(
                pty,
                &format!("[OK] Self-healing iteration {} done", ctx.self_heal_iteration),
            );
        }
        Err(e) => {
            let error_msg = e.to_string();
            ctx.errors
                .push(format!("[Self-Heal Iter {}] {error_msg}", ctx.self_heal_iteration));
            ctx.log_event(LogLevel::Error, format!("Self-heal failed: {error_msg}"));
            pty_echo(pty, &format!("[WARN] Self-healing failed: {error_msg}"));

            ctx.self_heal_log.push(SelfHealAttempt {
                iteration: ctx.self_heal_iteration,
                success: false,
                notes: Some(error_msg),
                timestamp: chrono::Utc::now(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use llm_client::LlmStream;
    use std::path::PathBuf;

    struct StaticProvider(&'static str);

    #[async_trait]
    impl LlmProvider for StaticProvider {
        async fn chat_stream(
            &self,
            _messages: &[Message],
            _model: Option<&str>,
        ) -> llm_client::Result<LlmStream> {
            let text = self.0.to_string();
            Ok(Box::pin(futures::stream::once(async move {
                Ok(LlmChunk::Delta(text))
            })))
        }
    }

    #[test]
    fn strip_code_fence_removes_sql_language_tag() {
        let input = "```sql\nSELECT 1;\n```";
        assert_eq!(strip_code_fence(input), "SELECT 1;");
    }

    #[tokio::test]
    async fn heals_code_and_logs_success() {
        let mut ctx = MigrationContext::new("demo", PathBuf::from("/tmp/src"));
        ctx.converted_code = "SELECT 1 FROM BAD;".to_string();
        ctx.max_self_heal_iterations = 1;

        let provider = StaticProvider("```sql\nSELECT 1 FROM GOOD;\n```");
        self_heal(&mut ctx, &provider, None, None, &Mutex::new(())).await;

        assert_eq!(ctx.self_heal_iteration, 1);
        assert_eq!(ctx.converted_code, "SELECT 1 FROM GOOD;");
        assert_eq!(ctx.self_heal_log.len(), 1);
        assert!(ctx.self_heal_log[0].success);
        assert_eq!(ctx.final_code.as_deref(), Some("SELECT 1 FROM GOOD;"));
    }
}
