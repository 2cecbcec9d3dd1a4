use regex::Regex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

static INSTANCE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Monotonically increasing id used in the marker so concurrent PTY
/// sessions never collide even if the millisecond clock does.
pub fn next_instance_id() -> u64 {
    INSTANCE_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A per-command random-enough token. Format mirrors the original
/// implementation's `__AGENT_DONE_<id(self)>_<monotonic_ms % 999999>__`.
pub fn generate_marker(instance_id: u64, epoch: Instant) -> String {
    let ms = epoch.elapsed().as_millis() % 999_999;
    format!("__AGENT_DONE_{instance_id}_{ms}__")
}

fn ansi_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]|\x1b\][^\x07]*\x07").expect("valid ansi regex")
    })
}

/// Remove ANSI escape sequences (CSI + OSC) so marker detection operates on
/// clean text, matching the original's `_strip_ansi`.
pub fn strip_ansi(text: &str) -> String {
    ansi_regex().replace_all(text, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_csi_sequences() {
        let input = "\x1b[31mhello\x1b[0m world";
        assert_eq!(strip_ansi(input), "hello world");
    }

    #[test]
    fn strips_osc_sequences() {
        let input = "\x1b]0;title\x07hello";
        assert_eq!(strip_ansi(input), "hello");
    }

    #[test]
    fn leaves_plain_text_untouched() {
        assert_eq!(strip_ansi("plain text"), "plain text");
    }

    #[test]
    fn markers_from_distinct_instances_never_collide() {
        let a = next_instance_id();
        let b = next_instance_id();
        assert_ne!(a, b);
    }
}
