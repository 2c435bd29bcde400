/// End-to-end tests driving real `sh` worker processes through the pool.
#[cfg(test)]
mod pool {
    use std::sync::mpsc::{self, Receiver};
    use std::sync::Arc;
    use std::time::Duration;

    use crate::{JobId, JobPool, JobState, PoolSettings, WorkOrder};

    const WAIT: Duration = Duration::from_secs(10);

    fn settings(workers: usize) -> PoolSettings {
        PoolSettings {
            workers,
            auto_cleanup: false,
        }
    }

    fn sh(script: &str) -> WorkOrder {
        WorkOrder::new("sh").arg("-c").arg(script)
    }

    /// A pool whose callback forwards every terminal event to a channel.
    fn recording_pool(
        settings: PoolSettings,
    ) -> (JobPool<String>, Receiver<(JobId, String, JobState)>) {
        let (tx, rx) = mpsc::channel();
        let tx = std::sync::Mutex::new(tx);
        let pool = JobPool::with_callback(
            settings,
            Arc::new(move |id: JobId, payload: &String, state: JobState| {
                if state.is_terminal() {
                    if let Ok(tx) = tx.lock() {
                        let _ = tx.send((id, payload.clone(), state));
                    }
                }
            }),
        );
        (pool, rx)
    }

    fn collect(
        rx: &Receiver<(JobId, String, JobState)>,
        n: usize,
    ) -> Vec<(JobId, String, JobState)> {
        let mut events: Vec<_> = (0..n)
            .map(|_| rx.recv_timeout(WAIT).expect("timed out waiting for job"))
            .collect();
        events.sort_by_key(|e| e.0);
        events
    }

    fn wait_until_running(pool: &JobPool<String>, id: JobId) {
        let deadline = std::time::Instant::now() + WAIT;
        while pool.job_state(id) != Some(JobState::Running) {
            assert!(std::time::Instant::now() < deadline, "job {id} never started");
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn ids_are_monotonic_and_outcomes_follow_exit_status() {
        let (pool, rx) = recording_pool(settings(2));
        let ok = pool.submit(sh("exit 0"), "ok".into()).unwrap();
        let bad = pool.submit(sh("exit 3"), "bad".into()).unwrap();
        assert_eq!((ok, bad), (1, 2));

        let events = collect(&rx, 2);
        assert_eq!(events[0], (1, "ok".to_string(), JobState::Completed));
        assert_eq!(events[1], (2, "bad".to_string(), JobState::Failed));
        // Delivered jobs are forgotten.
        assert_eq!(pool.job_state(ok), None);
        assert!(pool.is_idle());
    }

    #[test]
    fn spawn_failure_reports_failed() {
        let (pool, rx) = recording_pool(settings(1));
        pool.submit(
            WorkOrder::new("__gazeflow_no_such_program__"),
            "missing".into(),
        )
        .unwrap();
        let events = collect(&rx, 1);
        assert_eq!(events[0].2, JobState::Failed);
    }

    #[test]
    fn stdin_is_delivered_to_the_worker() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("request.json");
        let (pool, rx) = recording_pool(settings(1));
        let script = format!("cat > '{}'", out.display());
        pool.submit(sh(&script).stdin(b"{\"action\":\"import\"}".to_vec()), "cat".into())
            .unwrap();
        assert_eq!(collect(&rx, 1)[0].2, JobState::Completed);
        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            "{\"action\":\"import\"}"
        );
    }

    #[test]
    fn worker_count_bounds_concurrency() {
        let (pool, rx) = recording_pool(settings(1));
        let first = pool.submit(sh("sleep 0.5"), "first".into()).unwrap();
        let second = pool.submit(sh("exit 0"), "second".into()).unwrap();
        wait_until_running(&pool, first);
        assert_eq!(pool.job_state(second), Some(JobState::Pending));
        let events = collect(&rx, 2);
        assert!(events.iter().all(|e| e.2 == JobState::Completed));
    }

    #[test]
    fn cancel_pending_job_never_runs_it() {
        let dir = tempfile::TempDir::new().unwrap();
        let marker = dir.path().join("ran");
        let (pool, rx) = recording_pool(settings(1));
        let blocker = pool.submit(sh("sleep 0.3"), "blocker".into()).unwrap();
        let victim = pool
            .submit(sh(&format!("touch '{}'", marker.display())), "victim".into())
            .unwrap();
        wait_until_running(&pool, blocker);

        assert!(pool.cancel_job(victim));
        assert!(matches!(pool.job_state(victim), None | Some(JobState::Canceled)));
        // A second request is refused.
        assert!(!pool.cancel_job(victim));

        let events = collect(&rx, 2);
        assert_eq!(events[0].2, JobState::Completed);
        assert_eq!(events[1], (victim, "victim".to_string(), JobState::Canceled));
        assert!(!marker.exists());
    }

    #[test]
    fn cancel_running_job_kills_the_process() {
        let (pool, rx) = recording_pool(settings(1));
        let id = pool.submit(sh("sleep 30"), "sleeper".into()).unwrap();
        wait_until_running(&pool, id);
        assert!(pool.cancel_job(id));
        assert!(matches!(pool.job_state(id), None | Some(JobState::Canceled)));
        assert!(!pool.cancel_job(id));
        let events = collect(&rx, 1);
        assert_eq!(events[0].2, JobState::Canceled);
    }

    #[test]
    fn cancel_unknown_job_is_refused() {
        let pool: JobPool<String> = JobPool::new(settings(1));
        assert!(!pool.cancel_job(42));
        assert_eq!(pool.job_state(42), None);
    }

    #[test]
    fn cancel_all_goes_newest_first() {
        let (pool, rx) = recording_pool(settings(1));
        let ids: Vec<JobId> = ["one", "two", "three"]
            .iter()
            .map(|label| pool.submit(sh("sleep 30"), label.to_string()).unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let canceled = pool.cancel_all_jobs();
        assert_eq!(canceled, vec![3, 2, 1]);
        for id in &ids {
            assert!(matches!(
                pool.job_state(*id),
                None | Some(JobState::Canceled)
            ));
        }
        assert!(pool.cancel_all_jobs().is_empty());

        let events = collect(&rx, 3);
        assert!(events.iter().all(|e| e.2 == JobState::Canceled), "{events:?}");
        assert!(pool.is_idle());
    }

    #[test]
    fn cancel_all_on_pending_jobs_leaves_them_canceled_or_gone() {
        let (pool, rx) = recording_pool(settings(1));
        let blocker = pool.submit(sh("sleep 30"), "blocker".into()).unwrap();
        wait_until_running(&pool, blocker);
        let pending: Vec<JobId> = (0..3)
            .map(|n| pool.submit(sh("exit 0"), format!("pending-{n}")).unwrap())
            .collect();

        assert_eq!(pool.cancel_all_jobs(), vec![4, 3, 2, 1]);
        for id in &pending {
            assert!(matches!(pool.job_state(*id), None | Some(JobState::Canceled)));
        }
        let events = collect(&rx, 4);
        assert!(events.iter().all(|e| e.2 == JobState::Canceled), "{events:?}");
    }

    #[test]
    fn done_callbacks_see_payload_and_outcome() {
        let (pool, rx) = recording_pool(settings(1));
        let (done_tx, done_rx) = mpsc::channel();
        let id = pool.submit(sh("sleep 0.2"), "observed".into()).unwrap();
        assert!(pool.add_done_callback(
            id,
            Box::new(move |id: JobId, payload: &String, state: JobState| {
                let _ = done_tx.send((id, payload.clone(), state));
            })
        ));
        assert_eq!(pool.payload(id).as_deref(), Some(&"observed".to_string()));

        let (got_id, payload, state) = done_rx.recv_timeout(WAIT).unwrap();
        assert_eq!((got_id, payload.as_str(), state), (id, "observed", JobState::Completed));
        collect(&rx, 1);
        assert!(!pool.add_done_callback(id, Box::new(|_: JobId, _: &String, _: JobState| {})));
    }

    #[test]
    fn observer_attached_at_submit_sees_instant_jobs() {
        let (pool, rx) = recording_pool(settings(1));
        let (done_tx, done_rx) = mpsc::channel();
        let id = pool
            .submit_observed(
                sh("exit 0"),
                "instant".into(),
                Box::new(move |id: JobId, _: &String, state: JobState| {
                    let _ = done_tx.send((id, state));
                }),
            )
            .unwrap();
        assert_eq!(done_rx.recv_timeout(WAIT).unwrap(), (id, JobState::Completed));
        collect(&rx, 1);
    }

    #[test]
    fn running_transition_is_reported_before_outcome() {
        let (tx, rx) = mpsc::channel();
        let tx = std::sync::Mutex::new(tx);
        let pool = JobPool::with_callback(
            settings(1),
            Arc::new(move |id: JobId, _: &(), state: JobState| {
                if let Ok(tx) = tx.lock() {
                    let _ = tx.send((id, state));
                }
            }),
        );
        let id = pool.submit(sh("exit 0"), ()).unwrap();
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), (id, JobState::Running));
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), (id, JobState::Completed));
    }

    #[test]
    fn cleanup_only_when_idle_and_ids_restart() {
        let (pool, rx) = recording_pool(settings(1));
        let id = pool.submit(sh("sleep 0.3"), "busy".into()).unwrap();
        assert!(!pool.cleanup_if_idle());
        collect(&rx, 1);
        assert!(pool.cleanup_if_idle());

        // The pool comes back on the next submission with fresh ids.
        let again = pool.submit(sh("exit 0"), "again".into()).unwrap();
        assert_eq!(again, id);
        assert_eq!(collect(&rx, 1)[0].2, JobState::Completed);
    }

    #[test]
    fn auto_cleanup_recreates_pool_on_demand() {
        let (pool, rx) = recording_pool(PoolSettings {
            workers: 2,
            auto_cleanup: true,
        });
        pool.submit(sh("exit 0"), "a".into()).unwrap();
        collect(&rx, 1);
        // Wait for the teardown that follows delivery to settle.
        std::thread::sleep(Duration::from_millis(100));
        pool.submit(sh("exit 0"), "b".into()).unwrap();
        assert_eq!(collect(&rx, 1)[0].1, "b");
    }
}
