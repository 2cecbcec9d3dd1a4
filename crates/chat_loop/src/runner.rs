use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use llm_client::{escape_dollar_quote, LlmChunk, LlmProvider, Message, Role};
use pty_session::PtySession;

use crate::decision::{parse_decision, Action};
use crate::error::ChatLoopError;
use crate::events::ChatEvent;
use crate::truncate::{truncate_stdout_for_replay, truncate_terminal_output};

/// Safety cap on decide/run rounds per turn (SPEC_FULL.md §4.4), mirroring
/// the orchestrator's `max_iterations = 50` but scaled down for an
/// interactive single-PTY session where each round is a full command.
pub const MAX_ITERATIONS: usize = 15;

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are an AI agent that orchestrates database migration tasks using a terminal.

## Instructions
- Analyze the user's request and decide what to run next.
- You MUST respond with a JSON object in one of these formats:

### To run a shell command:
{\"action\": \"run_command\", \"command\": \"<shell command>\", \"reasoning\": \"why\"}

### To pause and ask for user guidance:
{\"action\": \"pause\", \"guidance\": \"what you need from the user\"}

### To finish the turn:
{\"action\": \"finish\", \"summary\": \"what was accomplished\"}

## Context
- After each command, you will receive its captured output.
- If a command fails, analyze the error and decide whether to retry, run a
  different command, or pause for guidance.
- Be concise in your reasoning.
";

/// Drive one LLM turn to completion: call the model, parse its decision,
/// run commands against `pty` as directed, and feed results back until the
/// model finishes, pauses, or the iteration cap is hit. See SPEC_FULL.md
/// §4.4 for the full state machine (grounded on
/// `agent_orchestrator.run_agent_orchestrator`).
pub async fn run_chat_loop(
    messages: &mut Vec<Message>,
    pty: Arc<PtySession>,
    llm: Arc<dyn LlmProvider>,
    model: Option<&str>,
    query_lock: Arc<Mutex<()>>,
    event_tx: mpsc::Sender<ChatEvent>,
    cancel_token: CancellationToken,
) -> Result<(), ChatLoopError> {
    if !messages.iter().any(|m| matches!(m.role, Role::System)) {
        messages.insert(0, Message::system(DEFAULT_SYSTEM_PROMPT));
    }

    for _ in 0..MAX_ITERATIONS {
        if cancel_token.is_cancelled() {
            let _ = event_tx
                .send(ChatEvent::Warning("run cancelled".to_string()))
                .await;
            return Ok(());
        }

        let text = {
            let _guard = query_lock.lock().await;
            collect_stream_text(&*llm, messages, model, &event_tx).await?
        };

        let decision = match parse_decision(&text) {
            None => {
                messages.push(Message::assistant(text.clone()));
                let _ = event_tx.send(ChatEvent::Finish(text)).await;
                return Ok(());
            }
            Some(decision) => decision,
        };

        match decision.action {
            Action::Finish => {
                let summary = decision.summary.unwrap_or_else(|| "Done.".to_string());
                messages.push(Message::assistant(text));
                let _ = event_tx.send(ChatEvent::Finish(summary)).await;
                return Ok(());
            }
            Action::Pause => {
                let guidance = decision
                    .guidance
                    .unwrap_or_else(|| "Waiting for user input.".to_string());
                messages.push(Message::assistant(text));
                let _ = event_tx.send(ChatEvent::Pause(guidance)).await;
                return Ok(());
            }
            Action::RunCommand | Action::RunTool => {
                let Some(command) = decision.command.clone() else {
                    messages.push(Message::assistant(text));
                    messages.push(Message::user(
                        "No command was given for a run_command decision.".to_string(),
                    ));
                    continue;
                };

                if let Some(reasoning) = &decision.reasoning {
                    let _ = event_tx
                        .send(ChatEvent::Reasoning(reasoning.clone()))
                        .await;
                }
                let _ = event_tx.send(ChatEvent::CommandStart(command.clone())).await;

                let output = pty.execute_command(&command, None).await?;
                let _ = event_tx
                    .send(ChatEvent::CommandOutput(truncate_terminal_output(&output)))
                    .await;

                messages.push(Message::assistant(text));
                messages.push(Message::user(format!(
                    "Command: {command}\nOutput:\n{}",
                    escape_dollar_quote(&truncate_stdout_for_replay(&output))
                )));
            }
        }
    }

    let _ = event_tx
        .send(ChatEvent::Warning(
            "Maximum iterations reached for this turn.".to_string(),
        ))
        .await;
    Ok(())
}

async fn collect_stream_text(
    llm: &dyn LlmProvider,
    messages: &[Message],
    model: Option<&str>,
    event_tx: &mpsc::Sender<ChatEvent>,
) -> Result<String, ChatLoopError> {
    let mut stream = llm.chat_stream(messages, model).await?;
    let mut text = String::new();

    while let Some(chunk) = stream.next().await {
        match chunk? {
            LlmChunk::Delta(delta) => {
                let _ = event_tx.send(ChatEvent::Delta(delta.clone())).await;
                text.push_str(&delta);
            }
            LlmChunk::Usage(_) => {}
        }
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use llm_client::{LlmStream, Result as LlmResult};
    use std::sync::Mutex as StdMutex;

    struct ScriptedProvider {
        responses: StdMutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn chat_stream(
            &self,
            _messages: &[Message],
            _model: Option<&str>,
        ) -> LlmResult<LlmStream> {
            let next = self.responses.lock().unwrap().remove(0);
            let chunks = vec![Ok(LlmChunk::Delta(next.to_string()))];
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    #[tokio::test]
    async fn finishes_on_finish_decision_without_touching_pty() {
        let provider = ScriptedProvider {
            responses: StdMutex::new(vec![r#"{"action": "finish", "summary": "all done"}"#]),
        };
        let pty = Arc::new(PtySession::spawn(80, 24, Some("/bin/sh".to_string())).unwrap());
        let (tx, mut rx) = mpsc::channel(16);
        let mut messages = vec![Message::user("do the thing".to_string())];

        run_chat_loop(
            &mut messages,
            pty.clone(),
            Arc::new(provider),
            None,
            Arc::new(Mutex::new(())),
            tx,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        let mut saw_finish = false;
        while let Ok(event) = rx.try_recv() {
            if let ChatEvent::Finish(summary) = event {
                assert_eq!(summary, "all done");
                saw_finish = true;
            }
        }
        assert!(saw_finish);
        pty.close();
    }

    #[tokio::test]
    async fn runs_command_then_finishes() {
        let provider = ScriptedProvider {
            responses: StdMutex::new(vec![
                r#"{"action": "run_command", "command": "echo hi", "reasoning": "checking"}"#,
                r#"{"action": "finish", "summary": "ran it"}"#,
            ]),
        };
        let pty = Arc::new(PtySession::spawn(80, 24, Some("/bin/sh".to_string())).unwrap());
        let (tx, mut rx) = mpsc::channel(32);
        let mut messages = vec![Message::user("run echo".to_string())];

        run_chat_loop(
            &mut messages,
            pty.clone(),
            Arc::new(provider),
            None,
            Arc::new(Mutex::new(())),
            tx,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        let mut saw_command_start = false;
        let mut saw_finish = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                ChatEvent::CommandStart(cmd) => {
                    assert_eq!(cmd, "echo hi");
                    saw_command_start = true;
                }
                ChatEvent::Finish(_) => saw_finish = true,
                _ => {}
            }
        }
        assert!(saw_command_start);
        assert!(saw_finish);
        assert!(messages.len() >= 4);
        pty.close();
    }
}
