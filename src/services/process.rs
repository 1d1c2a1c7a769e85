use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;

/// How an external command ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Exit code, -1 when the process was killed by a signal
    Exited(i32),
    TimedOut(Duration),
}

impl ProcessOutcome {
    pub fn success(self) -> bool {
        self == ProcessOutcome::Exited(0)
    }
}

/// Run a command to completion, killing it if `limit` elapses first.
///
/// Standard input is closed so that a prompting subprocess (git asking for
/// credentials, a script waiting on `read`) fails instead of hanging.
pub async fn run_process(
    mut command: Command,
    label: &str,
    limit: Option<Duration>,
) -> std::io::Result<ProcessOutcome> {
    tracing::debug!("Executing {}: {:?}", label, command.as_std());

    let start = Instant::now();
    let mut child = command.stdin(Stdio::null()).kill_on_drop(true).spawn()?;

    let status = match limit {
        Some(limit) => match timeout(limit, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                tracing::warn!("{} timed out after {:?}", label, limit);
                child.kill().await?;
                return Ok(ProcessOutcome::TimedOut(limit));
            }
        },
        None => child.wait().await?,
    };

    let exit_code = status.code().unwrap_or(-1);
    tracing::debug!(
        "{} completed in {:.2}s with exit code {}",
        label,
        start.elapsed().as_secs_f32(),
        exit_code
    );

    Ok(ProcessOutcome::Exited(exit_code))
}
