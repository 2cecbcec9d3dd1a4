use futures::StreamExt;
use llm_client::{escape_dollar_quote, LlmChunk, LlmProvider, Message};
use migration_context::{MigrationContext, MigrationStage, SupervisorDecision};
use tokio::sync::Mutex;

/// The decision set the supervisor may pick from after a given stage just
/// ran. `error`/`completed` never reach here: the runner routes those
/// directly. Grounded on SPEC_FULL.md §4.6's allowed-decisions table.
pub fn allowed_decisions(stage: MigrationStage) -> &'static [SupervisorDecision] {
    use SupervisorDecision::*;
    match stage {
        MigrationStage::Idle
        | MigrationStage::InitProject
        | MigrationStage::AddSourceCode
        | MigrationStage::ApplySchemaMapping
        | MigrationStage::ConvertCode => &[Proceed, Abort],
        MigrationStage::ExecuteSql => &[Proceed, SelfHeal, HumanReview, Finalize, Abort],
        MigrationStage::SelfHeal | MigrationStage::Validate => &[Proceed, SelfHeal, Finalize, Abort],
        MigrationStage::HumanReview => &[Proceed, Abort],
        MigrationStage::Finalize => &[Proceed],
        MigrationStage::Error | MigrationStage::Completed => &[],
    }
}

/// The stage the graph proceeds to from `stage` on a `proceed` decision.
pub fn natural_proceed_target(stage: MigrationStage) -> MigrationStage {
    match stage {
        MigrationStage::Idle => MigrationStage::InitProject,
        MigrationStage::InitProject => MigrationStage::AddSourceCode,
        MigrationStage::AddSourceCode => MigrationStage::ApplySchemaMapping,
        MigrationStage::ApplySchemaMapping => MigrationStage::ConvertCode,
        MigrationStage::ConvertCode => MigrationStage::ExecuteSql,
        MigrationStage::ExecuteSql => MigrationStage::Validate,
        MigrationStage::SelfHeal => MigrationStage::Validate,
        MigrationStage::Validate => MigrationStage::Finalize,
        MigrationStage::HumanReview => MigrationStage::ExecuteSql,
        MigrationStage::Finalize => MigrationStage::Completed,
        other => other,
    }
}

/// Used when the LLM is unreachable or returns an invalid/disallowed
/// decision. Mirrors the same flag-driven routing the supervisor prompt
/// asks the model to reason about. Grounded on `graph/nodes/supervisor.py`'s
/// `_deterministic_fallback`.
pub fn deterministic_fallback(ctx: &MigrationContext, stage: MigrationStage) -> (SupervisorDecision, String) {
    match stage {
        MigrationStage::ExecuteSql => {
            if ctx.requires_human_intervention || !ctx.missing_objects.is_empty() {
                (
                    SupervisorDecision::HumanReview,
                    "Missing object(s) detected; human review required.".to_string(),
                )
            } else if ctx.execution_passed {
                (SupervisorDecision::Proceed, "SQL execution succeeded.".to_string())
            } else {
                (
                    SupervisorDecision::SelfHeal,
                    "SQL execution failed; routing to self-heal.".to_string(),
                )
            }
        }
        MigrationStage::SelfHeal | MigrationStage::Validate => {
            if ctx.validation_passed {
                (SupervisorDecision::Proceed, "Validation passed.".to_string())
            } else if ctx.self_heal_budget_remaining() {
                (
                    SupervisorDecision::SelfHeal,
                    "Validation failed; self-heal budget remains.".to_string(),
                )
            } else {
                (
                    SupervisorDecision::Finalize,
                    "Validation failed and self-heal budget exhausted; finalizing as-is.".to_string(),
                )
            }
        }
        MigrationStage::HumanReview => {
            if ctx.requires_human_intervention {
                (SupervisorDecision::HumanReview, "Still awaiting human input.".to_string())
            } else {
                (SupervisorDecision::Proceed, "Human review resolved; resuming.".to_string())
            }
        }
        MigrationStage::Finalize => (SupervisorDecision::Proceed, "Finalize has no further routing.".to_string()),
        _ => (SupervisorDecision::Proceed, "Stage completed without error.".to_string()),
    }
}

fn build_supervisor_prompt(ctx: &MigrationContext, stage: MigrationStage) -> String {
    let allowed = allowed_decisions(stage);
    let allowed_str = allowed.iter().map(|d| d.as_str()).collect::<Vec<_>>().join(", ");

    let mut sections = vec![format!(
        "You are the supervisor for a database migration pipeline. The stage \"{stage}\" just completed."
    )];

    sections.push(format!(
        "Flags: initialized={}, source_added={}, converted={}, execution_passed={}, validation_passed={}, requires_human_intervention={}",
        ctx.scai_project_initialized,
        ctx.scai_source_added,
        ctx.scai_converted,
        ctx.execution_passed,
        ctx.validation_passed,
        ctx.requires_human_intervention,
    ));
    sections.push(format!(
        "Self-heal iteration {} of {}.",
        ctx.self_heal_iteration, ctx.max_self_heal_iterations
    ));

    if !ctx.missing_objects.is_empty() {
        sections.push(format!(
            "Missing objects: {}",
            escape_dollar_quote(&ctx.missing_objects.join(", "))
        ));
    }
    if let Some(err) = ctx.execution_errors.last() {
        sections.push(format!(
            "Last execution error: [{}] {}",
            err.error_type,
            escape_dollar_quote(&err.message)
        ));
    }
    if let Some(summary) = &ctx.report_scan_summary {
        sections.push(format!(
            "Report scan: {} actionable issues, {} ignored.",
            summary.actionable_count, summary.ignored_count
        ));
    }
    let recent_errors: Vec<_> = ctx.errors.iter().rev().take(3).cloned().collect();
    if !recent_errors.is_empty() {
        sections.push(format!(
            "Recent errors: {}",
            escape_dollar_quote(&recent_errors.join(" | "))
        ));
    }

    sections.push(format!("Allowed decisions: {allowed_str}."));
    sections.push(
        "Respond with a single JSON object: {\"decision\": \"<one of the allowed decisions>\", \"reasoning\": \"<why>\"}."
            .to_string(),
    );
    sections.join("\n")
}

#[derive(serde::Deserialize)]
struct RawDecision {
    decision: String,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Balanced-brace scan for the first top-level JSON object in free-form
/// text, respecting string/escape state. Kept local rather than pulled
/// from `chat_loop` to avoid a dependency edge for a two-function helper.
fn extract_json_object(text: &str) -> Option<String> {
    let chars: Vec<char> = text.chars().collect();
    for i in 0..chars.len() {
        if chars[i] == '{' {
            if let Some(end) = find_matching_brace(&chars, i) {
                return Some(chars[i..=end].iter().collect());
            }
        }
    }
    None
}

fn find_matching_brace(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &ch) in chars[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_supervisor_response(
    text: &str,
    allowed: &[SupervisorDecision],
) -> Option<(SupervisorDecision, String)> {
    let candidate = extract_json_object(text)?;
    let raw: RawDecision = serde_json::from_str(&candidate).ok()?;
    let decision = SupervisorDecision::parse(&raw.decision)?;
    if !allowed.contains(&decision) {
        return None;
    }
    Some((decision, raw.reasoning.unwrap_or_default()))
}

async fn collect_llm_text(
    llm: &dyn LlmProvider,
    messages: &[Message],
    model: Option<&str>,
) -> llm_client::Result<String> {
    let mut stream = llm.chat_stream(messages, model).await?;
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        if let LlmChunk::Delta(delta) = chunk? {
            text.push_str(&delta);
        }
    }
    Ok(text)
}

/// Ask the LLM which way to route after `stage`, recording the decision
/// on the context either way. Falls back to the deterministic table on
/// any LLM error or an invalid/disallowed response. Grounded on
/// `graph/nodes/supervisor.py`'s `supervisor_node`.
pub async fn invoke_supervisor(
    ctx: &mut MigrationContext,
    stage: MigrationStage,
    llm: &dyn LlmProvider,
    model: Option<&str>,
    query_lock: &Mutex<()>,
) -> SupervisorDecision {
    let allowed = allowed_decisions(stage);
    let prompt = build_supervisor_prompt(ctx, stage);
    let messages = vec![Message::user(prompt)];

    let response = {
        let _guard = query_lock.lock().await;
        collect_llm_text(llm, &messages, model).await
    };

    let (decision, reasoning) = match response {
        Ok(text) => match parse_supervisor_response(&text, allowed) {
            Some(parsed) => parsed,
            None => {
                let (decision, reasoning) = deterministic_fallback(ctx, stage);
                (decision, format!("(fallback: invalid or disallowed LLM decision) {reasoning}"))
            }
        },
        Err(e) => {
            let (decision, reasoning) = deterministic_fallback(ctx, stage);
            (decision, format!("(fallback: LLM error: {e}) {reasoning}"))
        }
    };

    ctx.record_decision(stage, decision, reasoning);
    decision
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
        async fn chat_stream(&self, _messages: &[Message], _model: Option<&str>) -> llm_client::Result<LlmStream> {
            let text = self.0.to_string();
            Ok(Box::pin(futures::stream::once(async move { Ok(LlmChunk::Delta(text)) })))
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl LlmProvider for FailingProvider {
        async fn chat_stream(&self, _messages: &[Message], _model: Option<&str>) -> llm_client::Result<LlmStream> {
            Err(llm_client::LlmError::Api("upstream unreachable".to_string()))
        }
    }

    #[test]
    fn execute_sql_allows_human_review() {
        let allowed = allowed_decisions(MigrationStage::ExecuteSql);
        assert!(allowed.contains(&SupervisorDecision::HumanReview));
    }

    #[test]
    fn finalize_only_allows_proceed() {
        assert_eq!(allowed_decisions(MigrationStage::Finalize), &[SupervisorDecision::Proceed]);
    }

    #[test]
    fn deterministic_fallback_routes_to_human_review_on_missing_objects() {
        let mut ctx = MigrationContext::new("demo", PathBuf::from("/tmp/src"));
        ctx.missing_objects.push("CUSTOMERS".to_string());
        let (decision, _) = deterministic_fallback(&ctx, MigrationStage::ExecuteSql);
        assert_eq!(decision, SupervisorDecision::HumanReview);
    }

    #[test]
    fn deterministic_fallback_exhausted_budget_finalizes() {
        let mut ctx = MigrationContext::new("demo", PathBuf::from("/tmp/src"));
        ctx.max_self_heal_iterations = 1;
        ctx.self_heal_iteration = 1;
        let (decision, _) = deterministic_fallback(&ctx, MigrationStage::Validate);
        assert_eq!(decision, SupervisorDecision::Finalize);
    }

    #[tokio::test]
    async fn invoke_supervisor_parses_fenced_json_response() {
        let mut ctx = MigrationContext::new("demo", PathBuf::from("/tmp/src"));
        ctx.execution_passed = true;
        let provider = StaticProvider("Looks good.\n```json\n{\"decision\": \"proceed\", \"reasoning\": \"all good\"}\n```");
        let decision = invoke_supervisor(&mut ctx, MigrationStage::ExecuteSql, &provider, None, &Mutex::new(())).await;
        assert_eq!(decision, SupervisorDecision::Proceed);
        assert_eq!(ctx.supervisor_reasoning.as_deref(), Some("all good"));
    }

    #[tokio::test]
    async fn invoke_supervisor_falls_back_on_llm_error() {
        let mut ctx = MigrationContext::new("demo", PathBuf::from("/tmp/src"));
        ctx.execution_passed = true;
        let decision = invoke_supervisor(&mut ctx, MigrationStage::ExecuteSql, &FailingProvider, None, &Mutex::new(())).await;
        assert_eq!(decision, SupervisorDecision::Proceed);
        assert!(ctx.supervisor_reasoning.as_deref().unwrap().contains("fallback"));
    }

    #[tokio::test]
    async fn invoke_supervisor_falls_back_on_disallowed_decision() {
        let mut ctx = MigrationContext::new("demo", PathBuf::from("/tmp/src"));
        ctx.validation_passed = false;
        ctx.max_self_heal_iterations = 1;
        ctx.self_heal_iteration = 1;
        let provider = StaticProvider("{\"decision\": \"self_heal\", \"reasoning\": \"try again\"}");
        let decision = invoke_supervisor(&mut ctx, MigrationStage::Validate, &provider, None, &Mutex::new(())).await;
        assert_eq!(decision, SupervisorDecision::Finalize);
    }
}
