/// Live per-turn delta truncation: keep-head 1500 + marker + keep-tail 750,
/// triggered past 3000 characters (SPEC_FULL.md §4.4).
pub fn truncate_terminal_output(text: &str) -> String {
    truncate_keep_head_tail(text, 3000, 1500, 750)
}

/// Coarser truncation applied when replaying tool traces into the next LLM
/// call's message list, grounded in the original orchestrator's
/// `_build_agent_messages`.
pub fn truncate_stdout_for_replay(text: &str) -> String {
    truncate_keep_head_tail(text, 2000, 1000, 500)
}

fn truncate_keep_head_tail(text: &str, limit: usize, head: usize, tail: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= limit {
        return text.to_string();
    }

    let head_str: String = chars[..head].iter().collect();
    let tail_str: String = chars[chars.len() - tail..].iter().collect();
    format!("{head_str}\n...(truncated)...\n{tail_str}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_short_output_untouched() {
        assert_eq!(truncate_terminal_output("short"), "short");
    }

    #[test]
    fn truncates_long_terminal_output_with_head_and_tail() {
        let text = "a".repeat(4000);
        let truncated = truncate_terminal_output(&text);
        assert!(truncated.contains("...(truncated)..."));
        assert!(truncated.starts_with(&"a".repeat(1500)));
        assert!(truncated.ends_with(&"a".repeat(750)));
    }

    #[test]
    fn replay_truncation_uses_coarser_windows() {
        let stdout = "b".repeat(2500);
        let truncated = truncate_stdout_for_replay(&stdout);
        assert!(truncated.starts_with(&"b".repeat(1000)));
        assert!(truncated.ends_with(&"b".repeat(500)));
    }
}
