//! Typed SSE event union shared by the chat and workflow HTTP endpoints.
//! See SPEC_FULL.md §4.8 and §6.

mod event;
mod formatter;

pub use event::StreamEvent;
pub use formatter::{done_frame, format_event, heartbeat_frame, sse_response, with_heartbeat};
