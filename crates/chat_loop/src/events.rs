/// Events streamed to the client as the loop progresses. `event_stream`
/// maps these onto the SSE protocol's `text-delta` frames.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// Plain text delta — either the model's final answer (no decision
    /// found) or a fragment appended during a tool/command round.
    Delta(String),
    Reasoning(String),
    CommandStart(String),
    CommandOutput(String),
    Finish(String),
    Pause(String),
    Warning(String),
    Error(String),
}
