use crate::collectors::CollectError;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::runtime::{Builder, Handle};
use tokio::time;
use tracing::debug;

/// Runs an external utility and returns its stdout.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<String, CollectError>;
}

/// Blocking facade over `tokio::process`. Must be called from a blocking
/// context (e.g. inside `spawn_blocking`), never from an async task.
#[derive(Debug, Clone)]
pub struct SystemCommandRunner {
    timeout: Duration,
}

impl SystemCommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<String, CollectError> {
        let task = run_with_timeout(program, args, self.timeout);
        match Handle::try_current() {
            Ok(handle) => handle.block_on(task),
            Err(_) => Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|source| CollectError::Spawn {
                    program: program.to_string(),
                    source,
                })?
                .block_on(task),
        }
    }
}

async fn run_with_timeout(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<String, CollectError> {
    let started = Instant::now();
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| CollectError::Spawn {
            program: program.to_string(),
            source,
        })?;

    // Dropping the pending future on timeout kills the child.
    let output = match time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => {
            return Err(CollectError::Spawn {
                program: program.to_string(),
                source,
            })
        }
        Err(_elapsed) => {
            return Err(CollectError::Timeout {
                program: program.to_string(),
                timeout_ms: timeout.as_millis(),
            })
        }
    };

    if !output.status.success() {
        return Err(CollectError::CommandStatus {
            program: program.to_string(),
            status: output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string()),
        });
    }

    debug!(
        program,
        bytes = output.stdout.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "команда выполнена"
    );
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
