use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tokio::sync::{mpsc, Notify};
use tokio::time::timeout as tokio_timeout;

use crate::error::PtyError;
use crate::marker::{generate_marker, next_instance_id, strip_ansi};

const IDLE_FALLBACK: Duration = Duration::from_secs(30);
const DEFAULT_TOTAL_TIMEOUT: Duration = Duration::from_secs(1800);
const SETTLE_DELAY: Duration = Duration::from_millis(300);
const POLL_INTERVAL: Duration = Duration::from_secs(2);

fn default_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string())
}

/// A shell subprocess wrapped in a PTY, read by exactly one reader.
///
/// The WebSocket handler is expected to call `read()` in a loop. When
/// `execute_command` needs to run something programmatically it never
/// reads directly — it installs a tap that the same reader thread also
/// writes into, and waits on a `Notify` that the reader signals. See
/// SPEC_FULL.md §4.1.
pub struct PtySession {
    instance_id: u64,
    epoch: Instant,
    cols: Mutex<u16>,
    rows: Mutex<u16>,
    master: Mutex<Box<dyn MasterPty + Send>>,
    writer: Mutex<Box<dyn Write + Send>>,
    child: Mutex<Box<dyn Child + Send + Sync>>,
    closed: AtomicBool,

    // The single reader thread forwards cleaned chunks here; `read()`
    // drains this receiver. Wrapped in a Mutex purely so `read` can take
    // `&self` (only one logical consumer ever calls it).
    output_rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,

    // Tap / capture state, observed by `execute_command` without a second
    // read of the underlying PTY. Shared (via Arc) with the reader thread
    // spawned in `spawn()`, which is the only writer of `capture_buffer`.
    capturing: Arc<AtomicBool>,
    capture_buffer: Arc<Mutex<Vec<u8>>>,
    capture_notify: Arc<Notify>,
    current_marker: Arc<Mutex<Option<String>>>,
}

impl PtySession {
    /// Spawn `shell` (or `$SHELL`) inside a new PTY of the given size.
    pub fn spawn(cols: u16, rows: u16, shell: Option<String>) -> Result<Self, PtyError> {
        let shell = shell.unwrap_or_else(default_shell);
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::Spawn(e.to_string()))?;

        let mut builder = CommandBuilder::new(&shell);
        builder.env("TERM", std::env::var("TERM").unwrap_or_else(|_| "xterm-256color".to_string()));
        for key in ["PATH", "HOME", "USER", "LANG", "LC_ALL"] {
            if let Ok(value) = std::env::var(key) {
                builder.env(key, value);
            }
        }

        let child = pair
            .slave
            .spawn_command(builder)
            .map_err(|e| PtyError::Spawn(e.to_string()))?;
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::Spawn(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::Spawn(e.to_string()))?;

        let (output_tx, output_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let capture_buffer: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
        let capture_notify = Arc::new(Notify::new());
        let capturing = Arc::new(AtomicBool::new(false));
        let current_marker: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        spawn_reader_thread(
            reader,
            output_tx,
            capture_buffer.clone(),
            capture_notify.clone(),
            capturing.clone(),
            current_marker.clone(),
        );

        Ok(Self {
            instance_id: next_instance_id(),
            epoch: Instant::now(),
            cols: Mutex::new(cols),
            rows: Mutex::new(rows),
            master: Mutex::new(pair.master),
            writer: Mutex::new(writer),
            child: Mutex::new(child),
            closed: AtomicBool::new(false),
            output_rx: Mutex::new(output_rx),
            capturing,
            capture_buffer,
            capture_notify,
            current_marker,
        })
    }

    pub fn is_alive(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        match self.child.lock().unwrap().try_wait() {
            Ok(None) => true,
            _ => false,
        }
    }

    /// The single reader. Awaits the next chunk of cleaned output (marker
    /// artifacts already stripped if a command is in flight).
    pub async fn read(&self) -> Vec<u8> {
        let mut rx = self.output_rx.lock().unwrap_or_else(|p| p.into_inner());
        match rx.recv().await {
            Some(chunk) => chunk,
            None => Vec::new(),
        }
    }

    pub fn write(&self, data: &str) -> Result<(), PtyError> {
        let mut writer = self.writer.lock().unwrap();
        writer.write_all(data.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    pub fn resize(&self, cols: u16, rows: u16) {
        *self.cols.lock().unwrap() = cols;
        *self.rows.lock().unwrap() = rows;
        let _ = self.master.lock().unwrap().resize(PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        });
    }

    /// Run `command` in the PTY and return its captured, ANSI-stripped
    /// output. See SPEC_FULL.md §4.1 for the full completion-detection
    /// algorithm.
    pub async fn execute_command(&self, command: &str, timeout: Option<Duration>) -> Result<String, PtyError> {
        if !self.is_alive() {
            return Err(PtyError::Dead);
        }

        let total_timeout = timeout.unwrap_or(DEFAULT_TOTAL_TIMEOUT);
        let marker = generate_marker(self.instance_id, self.epoch);
        let full_command = format!("{command} ; echo {marker}");

        *self.current_marker.lock().unwrap() = Some(marker.clone());
        self.capture_buffer.lock().unwrap().clear();
        self.capturing.store(true, Ordering::SeqCst);

        let result = self.run_capture_loop(&marker, &full_command, total_timeout).await;

        self.capturing.store(false, Ordering::SeqCst);
        self.capture_buffer.lock().unwrap().clear();
        *self.current_marker.lock().unwrap() = None;

        result
    }

    async fn run_capture_loop(
        &self,
        marker: &str,
        full_command: &str,
        total_timeout: Duration,
    ) -> Result<String, PtyError> {
        tokio::time::sleep(SETTLE_DELAY).await;
        self.write(&format!("{full_command}\r"))?;

        let start = Instant::now();
        let mut last_data_time = Instant::now();
        let mut last_seen_len = 0usize;

        loop {
            let elapsed = start.elapsed();
            if elapsed >= total_timeout {
                log::warn!("[execute_command] TIMEOUT after {:?}", elapsed);
                let captured = strip_ansi(&buffer_as_string(&self.capture_buffer));
                return Ok(trim_after_first_line(&captured));
            }

            let captured_raw = buffer_as_string(&self.capture_buffer);
            let captured_clean = strip_ansi(&captured_raw);

            if let Some(marker_idx) = captured_clean.find(marker) {
                let output = &captured_clean[..marker_idx];
                return Ok(trim_after_first_line(output));
            }

            let current_len = self.capture_buffer.lock().unwrap().len();
            if current_len > last_seen_len {
                last_data_time = Instant::now();
                last_seen_len = current_len;
            }

            let idle = last_data_time.elapsed();
            if idle >= IDLE_FALLBACK && current_len > 0 {
                log::warn!("[execute_command] IDLE FALLBACK after {:?}", idle);
                return Ok(trim_after_first_line(&captured_clean));
            }

            let _ = tokio_timeout(POLL_INTERVAL, self.capture_notify.notified()).await;
        }
    }

    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut child = self.child.lock().unwrap();
        let _ = child.kill();
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        self.close();
    }
}

fn buffer_as_string(buffer: &Mutex<Vec<u8>>) -> String {
    String::from_utf8_lossy(&buffer.lock().unwrap()).into_owned()
}

/// Strip the echoed command line (first line) and trim, matching the
/// original's handling of both the marker-found and idle-fallback paths.
fn trim_after_first_line(output: &str) -> String {
    match output.find('\n') {
        Some(idx) => output[idx + 1..].trim().to_string(),
        None => output.trim().to_string(),
    }
}

#[allow(clippy::too_many_arguments)]
fn spawn_reader_thread(
    mut reader: Box<dyn Read + Send>,
    output_tx: mpsc::UnboundedSender<Vec<u8>>,
    capture_buffer: Arc<Mutex<Vec<u8>>>,
    capture_notify: Arc<Notify>,
    capturing: Arc<AtomicBool>,
    current_marker: Arc<Mutex<Option<String>>>,
) {
    std::thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(_) => break,
            };
            let chunk = buf[..n].to_vec();

            if capturing.load(Ordering::SeqCst) {
                capture_buffer.lock().unwrap().extend_from_slice(&chunk);
                capture_notify.notify_waiters();
            }

            let cleaned = match current_marker.lock().unwrap().clone() {
                Some(marker) => strip_marker_artifacts(&chunk, &marker),
                None => chunk,
            };

            if output_tx.send(cleaned).is_err() {
                break;
            }
        }
    });
}

/// Strip the marker and its `; echo <marker>` preamble from a raw chunk
/// before it reaches the browser terminal, so the sentinel is never
/// visible to the user.
fn strip_marker_artifacts(chunk: &[u8], marker: &str) -> Vec<u8> {
    let text = String::from_utf8_lossy(chunk);
    let echo_preamble = format!(" ; echo {marker}");
    let cleaned = text.replace(&echo_preamble, "").replace(marker, "");
    cleaned.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_echoed_command_line() {
        assert_eq!(trim_after_first_line("ls -la\nhello\n"), "hello");
    }

    #[test]
    fn trims_without_newline() {
        assert_eq!(trim_after_first_line("hello"), "hello");
    }

    #[test]
    fn strips_marker_and_echo_preamble() {
        let marker = "__AGENT_DONE_1_42__";
        let chunk = format!("hello ; echo {marker}\n{marker}\n").into_bytes();
        let cleaned = strip_marker_artifacts(&chunk, marker);
        assert_eq!(String::from_utf8(cleaned).unwrap(), "hello\n\n");
    }

    // Seed scenario 5 (SPEC_FULL.md §8): over a running PTY,
    // execute_command("echo hello") returns "hello" with no marker leak.
    #[tokio::test]
    async fn execute_command_captures_echo_output() {
        let session = PtySession::spawn(80, 24, Some("/bin/sh".to_string()))
            .expect("spawn a shell for the test");

        let output = tokio::time::timeout(
            Duration::from_secs(10),
            session.execute_command("echo hello", Some(Duration::from_secs(5))),
        )
        .await
        .expect("execute_command should not hang")
        .expect("command should succeed");

        assert_eq!(output, "hello");
        assert!(!output.contains("__AGENT_DONE_"));
        session.close();
    }
}
