//! LLM-driven terminal agent loop: decide, run a command against a
//! `pty_session::PtySession`, feed the output back, repeat. See
//! SPEC_FULL.md §4.4.

mod decision;
mod error;
mod events;
mod runner;
mod truncate;

pub use decision::{parse_decision, Action, Decision};
pub use error::ChatLoopError;
pub use events::ChatEvent;
pub use runner::{run_chat_loop, DEFAULT_SYSTEM_PROMPT, MAX_ITERATIONS};
pub use truncate::{truncate_stdout_for_replay, truncate_terminal_output};
