use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::job::{JobId, JobState, WorkOrder};
use crate::process::run_worker;
use crate::{PoolError, Result};

/// How long a blocking teardown waits for runtime threads to exit.
const TEARDOWN_GRACE: Duration = Duration::from_secs(10);

/// Pool-wide notification: fired once when a job's worker starts
/// ([`JobState::Running`]) and once with its terminal state.
pub type JobCallback<P> = Arc<dyn Fn(JobId, &P, JobState) + Send + Sync>;

/// One-shot observer attached to a single job; receives the terminal state.
pub type DoneCallback<P> = Box<dyn FnOnce(JobId, &P, JobState) + Send>;

// ─── PoolSettings ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Maximum number of worker processes alive at once.
    pub workers: usize,
    /// Tear the pool down whenever the last outstanding job finishes.
    pub auto_cleanup: bool,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            auto_cleanup: true,
        }
    }
}

// ─── Bookkeeping ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Pending,
    Running,
    /// Running, with a kill requested; reported as canceled from now on.
    Canceling,
    /// Canceled before a worker picked it up; the driver task still has to
    /// deliver the outcome.
    Canceled,
}

struct JobRecord<P> {
    payload: Arc<P>,
    slot: Slot,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    observers: Vec<DoneCallback<P>>,
}

/// The lazily created execution resources: a runtime that drives the job
/// tasks and a fair semaphore bounding the number of live worker processes.
struct Workers {
    runtime: Runtime,
    permits: Arc<Semaphore>,
}

impl Workers {
    fn start(settings: &PoolSettings) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("gazeflow-pool")
            .enable_all()
            .build()
            .map_err(|e| PoolError::Runtime(format!("failed to start worker runtime: {e}")))?;
        info!(workers = settings.workers, "worker pool started");
        Ok(Self {
            runtime,
            permits: Arc::new(Semaphore::new(settings.workers.max(1))),
        })
    }

    /// Stop the runtime. Blocks for the worker threads unless we are inside
    /// an async context, where blocking is not allowed.
    fn shutdown(self) {
        if Handle::try_current().is_ok() {
            self.runtime.shutdown_background();
        } else {
            self.runtime.shutdown_timeout(TEARDOWN_GRACE);
        }
        info!("worker pool stopped");
    }
}

struct Inner<P> {
    workers: Option<Workers>,
    next_id: JobId,
    jobs: BTreeMap<JobId, JobRecord<P>>,
}

impl<P> Inner<P> {
    fn cancel(&mut self, id: JobId) -> bool {
        let Some(record) = self.jobs.get_mut(&id) else {
            return false;
        };
        match record.slot {
            Slot::Pending => {
                record.slot = Slot::Canceled;
                record.cancel.cancel();
                debug!(job = id, "canceled pending job");
                true
            }
            Slot::Running => {
                record.slot = Slot::Canceling;
                record.cancel.cancel();
                debug!(job = id, "requested cancellation of running job");
                true
            }
            Slot::Canceling | Slot::Canceled => false,
        }
    }

    /// Take the execution resources if nothing is outstanding.
    fn take_if_idle(&mut self) -> Option<Option<Workers>> {
        if !self.jobs.is_empty() {
            return None;
        }
        self.next_id = 1;
        Some(self.workers.take())
    }
}

struct Shared<P> {
    settings: PoolSettings,
    callback: Option<JobCallback<P>>,
    inner: Mutex<Inner<P>>,
}

impl<P> Shared<P> {
    fn lock(&self) -> MutexGuard<'_, Inner<P>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ─── JobPool ──────────────────────────────────────────────────────────────

/// A bounded pool of worker processes with cancellable, observable jobs.
///
/// Every public method only touches in-memory bookkeeping under a single
/// mutex and never waits for a job; only teardown blocks. Callbacks run on
/// pool threads, outside the mutex, so they may call back into the pool.
pub struct JobPool<P> {
    shared: Arc<Shared<P>>,
}

impl<P: Send + Sync + 'static> JobPool<P> {
    pub fn new(settings: PoolSettings) -> Self {
        Self::build(settings, None)
    }

    pub fn with_callback(settings: PoolSettings, callback: JobCallback<P>) -> Self {
        Self::build(settings, Some(callback))
    }

    fn build(settings: PoolSettings, callback: Option<JobCallback<P>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                settings,
                callback,
                inner: Mutex::new(Inner {
                    workers: None,
                    next_id: 1,
                    jobs: BTreeMap::new(),
                }),
            }),
        }
    }

    /// Queue `order` and return its id immediately.
    ///
    /// The worker runtime is created on the first submission after
    /// construction or teardown.
    pub fn submit(&self, order: WorkOrder, payload: P) -> Result<JobId> {
        self.enqueue(order, payload, Vec::new())
    }

    /// Like [`JobPool::submit`], with `observer` attached before the job can
    /// start, so even a job that finishes immediately is observed.
    pub fn submit_observed(
        &self,
        order: WorkOrder,
        payload: P,
        observer: DoneCallback<P>,
    ) -> Result<JobId> {
        self.enqueue(order, payload, vec![observer])
    }

    fn enqueue(
        &self,
        order: WorkOrder,
        payload: P,
        observers: Vec<DoneCallback<P>>,
    ) -> Result<JobId> {
        let mut inner = self.shared.lock();
        if inner.workers.is_none() {
            inner.workers = Some(Workers::start(&self.shared.settings)?);
        }
        let (spawner, permits) = match inner.workers.as_ref() {
            Some(w) => (w.runtime.handle().clone(), Arc::clone(&w.permits)),
            None => return Err(PoolError::Runtime("worker runtime unavailable".into())),
        };

        let id = inner.next_id;
        inner.next_id += 1;
        let cancel = CancellationToken::new();
        // The driver needs the lock before doing anything, so it cannot
        // observe the job before the record below is inserted.
        let handle = spawner.spawn(drive(
            Arc::clone(&self.shared),
            id,
            order,
            cancel.clone(),
            permits,
        ));
        inner.jobs.insert(
            id,
            JobRecord {
                payload: Arc::new(payload),
                slot: Slot::Pending,
                cancel,
                handle,
                observers,
            },
        );
        debug!(job = id, "job submitted");
        Ok(id)
    }

    /// Current state of a job, or `None` once it has been delivered and
    /// forgotten (or never existed). A job whose cancellation was accepted
    /// reads as canceled even while its worker is still being stopped.
    pub fn job_state(&self, id: JobId) -> Option<JobState> {
        let inner = self.shared.lock();
        inner.jobs.get(&id).map(|r| match r.slot {
            Slot::Pending => JobState::Pending,
            Slot::Running => JobState::Running,
            Slot::Canceling | Slot::Canceled => JobState::Canceled,
        })
    }

    /// The payload a job was submitted with, while it is still tracked.
    pub fn payload(&self, id: JobId) -> Option<Arc<P>> {
        let inner = self.shared.lock();
        inner.jobs.get(&id).map(|r| Arc::clone(&r.payload))
    }

    /// Ids of all jobs not yet delivered, in submission order.
    pub fn outstanding(&self) -> Vec<JobId> {
        self.shared.lock().jobs.keys().copied().collect()
    }

    pub fn is_idle(&self) -> bool {
        self.shared.lock().jobs.is_empty()
    }

    /// Attach a one-shot observer for the job's terminal state.
    ///
    /// Returns `false` if the job is unknown (already delivered).
    pub fn add_done_callback(&self, id: JobId, observer: DoneCallback<P>) -> bool {
        let mut inner = self.shared.lock();
        match inner.jobs.get_mut(&id) {
            Some(record) => {
                record.observers.push(observer);
                true
            }
            None => false,
        }
    }

    /// Request cancellation of one job.
    ///
    /// A pending job will never reach a worker. A running job's process is
    /// killed, best effort; its callback may still report `Completed` or
    /// `Failed` if it finished first. Returns `false` for unknown jobs and
    /// for jobs whose cancellation was already accepted.
    pub fn cancel_job(&self, id: JobId) -> bool {
        self.shared.lock().cancel(id)
    }

    /// Cancel every outstanding job, newest first, and return the ids whose
    /// cancellation was accepted in the order it was requested.
    ///
    /// Newest-first matters: canceling a running job frees its worker slot,
    /// and an older pending job would otherwise grab it before being reached.
    pub fn cancel_all_jobs(&self) -> Vec<JobId> {
        let mut inner = self.shared.lock();
        let ids: Vec<JobId> = inner.jobs.keys().rev().copied().collect();
        let canceled: Vec<JobId> = ids.into_iter().filter(|id| inner.cancel(*id)).collect();
        if !canceled.is_empty() {
            info!(count = canceled.len(), "canceled all outstanding jobs");
        }
        canceled
    }

    /// Tear the worker runtime down if no job is outstanding.
    ///
    /// Returns `true` if the pool was idle. Job ids restart at 1 afterwards.
    pub fn cleanup_if_idle(&self) -> bool {
        let taken = self.shared.lock().take_if_idle();
        match taken {
            Some(workers) => {
                if let Some(workers) = workers {
                    workers.shutdown();
                }
                true
            }
            None => false,
        }
    }
}

impl<P> Drop for JobPool<P> {
    fn drop(&mut self) {
        let workers = {
            let mut inner = self.shared.lock();
            for record in inner.jobs.values() {
                record.handle.abort();
            }
            inner.workers.take()
        };
        if let Some(workers) = workers {
            // Children are spawned with kill_on_drop, so dropping their
            // tasks with the runtime also stops the processes.
            workers.runtime.shutdown_background();
        }
    }
}

// ─── Driver task ──────────────────────────────────────────────────────────

async fn drive<P: Send + Sync + 'static>(
    shared: Arc<Shared<P>>,
    id: JobId,
    order: WorkOrder,
    cancel: CancellationToken,
    permits: Arc<Semaphore>,
) {
    let permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        permit = permits.acquire_owned() => permit.ok(),
    };

    // Pending -> Running happens under the lock, so a cancellation that
    // raced the permit acquisition is still honoured.
    let started = permit.and_then(|permit| {
        let mut inner = shared.lock();
        let record = inner.jobs.get_mut(&id)?;
        if record.slot != Slot::Pending {
            return None;
        }
        record.slot = Slot::Running;
        Some((permit, Arc::clone(&record.payload)))
    });

    let state = match started {
        Some((permit, payload)) => {
            if let Some(callback) = &shared.callback {
                callback(id, &payload, JobState::Running);
            }
            let state = run_worker(id, &order, &cancel).await;
            drop(permit);
            state
        }
        None => JobState::Canceled,
    };

    deliver(&shared, id, state);
}

fn deliver<P: Send + Sync + 'static>(shared: &Arc<Shared<P>>, id: JobId, state: JobState) {
    let Some(record) = shared.lock().jobs.remove(&id) else {
        warn!(job = id, "finished job has no bookkeeping entry");
        return;
    };
    info!(job = id, %state, "job finished");

    if let Some(callback) = &shared.callback {
        callback(id, &record.payload, state);
    }
    for observer in record.observers {
        observer(id, &record.payload, state);
    }

    if shared.settings.auto_cleanup {
        if let Some(Some(workers)) = shared.lock().take_if_idle() {
            // Still on one of the runtime's own threads, so this takes the
            // non-blocking path.
            workers.shutdown();
        }
    }
}
