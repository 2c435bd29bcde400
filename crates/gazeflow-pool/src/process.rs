use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::job::{JobId, JobState, WorkOrder};

/// Keep only the tail of a worker's stderr for failure reports.
const STDERR_TAIL_BYTES: usize = 4096;

// ─── Worker process ───────────────────────────────────────────────────────

/// Run one [`WorkOrder`] as a child process until it exits or `cancel` fires.
///
/// Every failure mode is folded into the returned [`JobState`]; nothing
/// here can fail the pool itself. If the child has already exited when the
/// cancellation arrives, its real exit status wins.
pub(crate) async fn run_worker(
    id: JobId,
    order: &WorkOrder,
    cancel: &CancellationToken,
) -> JobState {
    let mut child = match build_command(order).spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(job = id, program = %order.display_name(), "failed to spawn worker: {e}");
            return JobState::Failed;
        }
    };
    debug!(job = id, pid = ?child.id(), "worker started");

    feed_stdin(id, &mut child, order.stdin.clone());
    let stderr_tail = drain_stderr(&mut child);

    let state = tokio::select! {
        biased;
        status = child.wait() => match status {
            Ok(status) => judge_exit(id, status, &stderr_tail),
            Err(e) => {
                warn!(job = id, "failed to wait for worker: {e}");
                JobState::Failed
            }
        },
        _ = cancel.cancelled() => {
            // Best effort: the child may ignore or outlive the signal briefly.
            if let Err(e) = child.start_kill() {
                debug!(job = id, "kill after cancellation failed: {e}");
            }
            match child.wait().await {
                Ok(status) if status.success() => JobState::Completed,
                _ => JobState::Canceled,
            }
        }
    };
    debug!(job = id, %state, "worker finished");
    state
}

fn build_command(order: &WorkOrder) -> Command {
    let mut cmd = Command::new(&order.program);
    cmd.args(&order.args);
    if let Some(dir) = &order.current_dir {
        cmd.current_dir(dir);
    }
    for (k, v) in &order.env {
        cmd.env(k, v);
    }
    if order.stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Write the request on a separate task so a child that never reads stdin
/// cannot stall the wait/cancel select.
fn feed_stdin(id: JobId, child: &mut Child, data: Option<Vec<u8>>) {
    let (Some(mut stdin), Some(data)) = (child.stdin.take(), data) else {
        return;
    };
    tokio::spawn(async move {
        if let Err(e) = stdin.write_all(&data).await {
            // A worker that exits without reading its request is not an error here.
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                warn!(job = id, "failed to write worker stdin: {e}");
            }
        }
    });
}

fn drain_stderr(child: &mut Child) -> Arc<Mutex<String>> {
    let buf = Arc::new(Mutex::new(String::new()));
    if let Some(stderr) = child.stderr.take() {
        let buf = Arc::clone(&buf);
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                if let Ok(mut b) = buf.lock() {
                    if !b.is_empty() {
                        b.push('\n');
                    }
                    b.push_str(&line);
                    if b.len() > STDERR_TAIL_BYTES {
                        let cut = b.len() - STDERR_TAIL_BYTES;
                        let cut = (cut..b.len()).find(|i| b.is_char_boundary(*i)).unwrap_or(0);
                        b.replace_range(..cut, "");
                    }
                }
            }
        });
    }
    buf
}

fn judge_exit(id: JobId, status: ExitStatus, stderr_tail: &Mutex<String>) -> JobState {
    if status.success() {
        return JobState::Completed;
    }
    let stderr = stderr_tail.lock().map(|b| b.clone()).unwrap_or_default();
    match status.code() {
        Some(code) => warn!(job = id, code, stderr = %stderr, "worker exited with failure"),
        None => warn!(job = id, stderr = %stderr, "worker terminated by signal"),
    }
    JobState::Failed
}
