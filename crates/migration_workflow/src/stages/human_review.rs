use migration_context::{LogLevel, MigrationContext, MigrationStage};
use pty_session::PtySession;

use crate::process::pty_echo;

/// Freeze the run for a human to resolve a missing-object gap. The
/// transition and reason are usually already set by whichever stage
/// detected the gap (see `execute_sql::fail_execution`); this node just
/// confirms the flag and emits the blocking activity-log entry the
/// runner watches for. Grounded on `graph/nodes/human_review.py`'s
/// `human_review_node`.
pub async fn human_review(ctx: &mut MigrationContext, pty: Option<&PtySession>) {
    if ctx.is_errored() {
        return;
    }

    ctx.transition(MigrationStage::HumanReview);
    ctx.requires_human_intervention = true;
    let reason = ctx
        .human_review_reason
        .clone()
        .unwrap_or_else(|| "Human review required.".to_string());
    ctx.log_event_with_detail(
        LogLevel::Warning,
        format!("Paused for human review: {reason}"),
        serde_json::json!({ "missing_objects": ctx.missing_objects }),
    );
    pty_echo(pty, &format!("[PAUSED] {reason}"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn sets_intervention_flag_and_logs_reason() {
        let mut ctx = MigrationContext::new("demo", PathBuf::from("/tmp/src"));
        ctx.human_review_reason = Some("Missing object: CUSTOMERS".to_string());
        ctx.missing_objects.push("CUSTOMERS".to_string());

        human_review(&mut ctx, None).await;

        assert_eq!(ctx.current_stage, MigrationStage::HumanReview);
        assert!(ctx.requires_human_intervention);
        assert!(ctx
            .activity_log
            .last()
            .unwrap()
            .message
            .contains("Missing object: CUSTOMERS"));
    }
}
