use std::path::Path;
use std::time::Duration;

use pty_session::PtySession;
use tokio::process::Command;
use tokio::time::timeout as tokio_timeout;

use crate::error::{Result, WorkflowError};

pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
}

/// Echo `text` to the PTY terminal so the user sees what's running; a
/// no-op when no terminal is attached to this session. Grounded on
/// `graph/nodes/helpers.py`'s `pty_echo`.
pub fn pty_echo(pty: Option<&PtySession>, text: &str) {
    if let Some(pty) = pty {
        let _ = pty.write(&format!("{text}\r\n"));
    }
}

/// Run `cmd` under `cwd`, echoing the command line and its captured
/// stdout/stderr to the PTY as it completes. Grounded on
/// `run_subprocess_with_echo`.
pub async fn run_subprocess_with_echo(
    cmd: &[String],
    cwd: &Path,
    pty: Option<&PtySession>,
    timeout: Duration,
) -> Result<CommandOutput> {
    let cmd_str = cmd.join(" ");
    pty_echo(pty, &format!("$ {cmd_str}"));

    let Some((program, args)) = cmd.split_first() else {
        return Err(WorkflowError::Subprocess("empty command".to_string()));
    };

    let run = Command::new(program).args(args).current_dir(cwd).output();

    let output = match tokio_timeout(timeout, run).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            pty_echo(pty, &format!("[ERROR] Failed to run command: {e}"));
            return Err(WorkflowError::Io(e));
        }
        Err(_) => {
            pty_echo(
                pty,
                &format!("[TIMEOUT] Command timed out after {:?}: {cmd_str}", timeout),
            );
            return Err(WorkflowError::Subprocess(format!(
                "command timed out after {timeout:?}: {cmd_str}"
            )));
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    for line in stdout.trim().lines() {
        pty_echo(pty, line);
    }
    for line in stderr.trim().lines() {
        pty_echo(pty, &format!("[stderr] {line}"));
    }

    Ok(CommandOutput {
        stdout,
        stderr,
        status: output.status.code().unwrap_or(-1),
    })
}
