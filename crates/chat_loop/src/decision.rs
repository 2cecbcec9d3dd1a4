use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    RunCommand,
    RunTool,
    Finish,
    Pause,
}

impl Action {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "run_command" => Some(Self::RunCommand),
            "run_tool" => Some(Self::RunTool),
            "finish" => Some(Self::Finish),
            "pause" => Some(Self::Pause),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Decision {
    pub action: Action,
    pub reasoning: Option<String>,
    pub command: Option<String>,
    pub tool: Option<String>,
    pub args: Option<Value>,
    pub summary: Option<String>,
    pub guidance: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDecision {
    action: String,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    args: Option<Value>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    guidance: Option<String>,
}

/// Scan `text` for the first balanced `{ ... }` object, respecting string
/// and escape state, and try to parse it as a decision. Tolerates leading
/// or trailing narration and markdown code fences around the JSON.
pub fn parse_decision(text: &str) -> Option<Decision> {
    for candidate in candidate_objects(text) {
        if let Ok(raw) = serde_json::from_str::<RawDecision>(&candidate) {
            if let Some(action) = Action::parse(&raw.action) {
                return Some(Decision {
                    action,
                    reasoning: raw.reasoning,
                    command: raw.command,
                    tool: raw.tool,
                    args: raw.args,
                    summary: raw.summary,
                    guidance: raw.guidance,
                });
            }
        }
    }
    None
}

/// Yield every balanced-brace `{...}` substring of `text`, in order of
/// appearance, ignoring braces inside string literals.
fn candidate_objects(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut objects = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '{' {
            if let Some(end) = find_matching_brace(&chars, i) {
                let candidate: String = chars[i..=end].iter().collect();
                objects.push(candidate);
                i = end + 1;
                continue;
            }
        }
        i += 1;
    }

    objects
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_decision() {
        let decision = parse_decision(r#"{"action": "finish", "summary": "done"}"#).unwrap();
        assert_eq!(decision.action, Action::Finish);
        assert_eq!(decision.summary.as_deref(), Some("done"));
    }

    #[test]
    fn tolerates_narration_and_code_fences() {
        let text = "Let me think.\n```json\n{\"action\": \"run_command\", \"command\": \"ls\"}\n```\nDone.";
        let decision = parse_decision(text).unwrap();
        assert_eq!(decision.action, Action::RunCommand);
        assert_eq!(decision.command.as_deref(), Some("ls"));
    }

    #[test]
    fn ignores_braces_inside_string_values() {
        let text = r#"{"action": "pause", "guidance": "say { not json }"}"#;
        let decision = parse_decision(text).unwrap();
        assert_eq!(decision.action, Action::Pause);
        assert_eq!(decision.guidance.as_deref(), Some("say { not json }"));
    }

    #[test]
    fn skips_non_decision_objects_before_the_real_one() {
        let text = r#"{"note": "just context"} then {"action": "finish", "summary": "ok"}"#;
        let decision = parse_decision(text).unwrap();
        assert_eq!(decision.action, Action::Finish);
    }

    #[test]
    fn returns_none_when_no_decision_present() {
        assert!(parse_decision("just plain prose, no JSON here").is_none());
    }
}
