use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;

/// Identifier handed out by [`JobPool::submit`](crate::JobPool::submit).
///
/// Ids increase monotonically within one pool lifetime and restart at 1
/// after the pool has been torn down.
pub type JobId = u64;

// ─── JobState ─────────────────────────────────────────────────────────────

/// Observable state of a job.
///
/// `Completed`, `Canceled` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    /// Submitted, waiting for a free worker slot.
    Pending,
    /// The worker process has been started.
    Running,
    /// The worker process exited with status 0.
    Completed,
    /// Canceled before it started, or killed while running.
    Canceled,
    /// Spawn failure, non-zero exit, or termination by signal.
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Canceled | JobState::Failed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Canceled => "canceled",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── WorkOrder ────────────────────────────────────────────────────────────

/// The unit of work executed by one worker process.
///
/// The pool never looks inside: it spawns `program` with `args`, feeds
/// `stdin` (if any), and judges the outcome by the exit status alone.
#[derive(Debug, Clone, Default)]
pub struct WorkOrder {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub current_dir: Option<PathBuf>,
    pub env: Vec<(OsString, OsString)>,
    /// Bytes written to the child's stdin, which is then closed.
    pub stdin: Option<Vec<u8>>,
}

impl WorkOrder {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    /// Human-readable program name for log lines.
    pub fn display_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Canceled.is_terminal());
        assert!(JobState::Failed.is_terminal());
    }

    #[test]
    fn work_order_builder_accumulates() {
        let order = WorkOrder::new("sh")
            .arg("-c")
            .args(["exit 0", "detect_markers"])
            .env("GAZEFLOW_UNIT", "rec1")
            .stdin(b"{}".to_vec());
        assert_eq!(order.display_name(), "sh");
        assert_eq!(order.args.len(), 3);
        assert_eq!(order.env.len(), 1);
        assert_eq!(order.stdin.as_deref(), Some(&b"{}"[..]));
        assert!(order.current_dir.is_none());
    }
}
