use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};

use gazeflow_pool::{DoneCallback, JobId, JobPool, JobState, PoolError, PoolSettings, WorkOrder};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::action::{Action, ActionState};
use crate::config::StudyConfig;
use crate::error::{GazeflowError, Result};
use crate::orchestrator::request::{JobTicket, WorkRequest};
use crate::possibility::Possibility;
use crate::session::{list_sessions, session_units, Session, Unit};
use crate::store::{IfMissing, StateStore};
use crate::table::RuleTable;
use crate::update::{update_action_state, StateUpdate};

/// Environment variable naming the action, for workers that dispatch on it
/// before reading stdin.
const ACTION_ENV: &str = "GAZEFLOW_ACTION";

/// One state rewritten by [`Orchestrator::recover_interrupted`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveredAction {
    pub unit: Unit,
    pub action: Action,
    pub state: ActionState,
}

/// Everything the pool callback needs, shared with it.
struct Core {
    store: StateStore,
    rules: RuleTable,
    config: StudyConfig,
}

impl Core {
    fn on_job_event(&self, id: JobId, ticket: &JobTicket, state: JobState) {
        let state = ActionState::from(state);
        let update = StateUpdate::new(ticket.unit.clone(), ticket.action, state)
            .cascade(state.is_completed())
            .if_missing(IfMissing::Create);
        match update_action_state(&self.store, &self.rules, &self.config, &update) {
            Ok(_) => debug!(job = id, unit = %ticket.unit, action = %ticket.action, %state, "recorded job state"),
            Err(e) => warn!(
                job = id,
                unit = %ticket.unit,
                action = %ticket.action,
                %state,
                "failed to record job state: {e}"
            ),
        }
    }
}

pub struct Orchestrator {
    core: Arc<Core>,
    pool: JobPool<JobTicket>,
}

impl Orchestrator {
    pub fn new(root: impl Into<PathBuf>, config: StudyConfig, settings: PoolSettings) -> Result<Self> {
        let core = Arc::new(Core {
            store: StateStore::new(root),
            rules: RuleTable::standard()?,
            config,
        });
        let for_callback = Arc::clone(&core);
        let pool = JobPool::with_callback(
            settings,
            Arc::new(move |id: JobId, ticket: &JobTicket, state: JobState| {
                for_callback.on_job_event(id, ticket, state)
            }),
        );
        Ok(Self { core, pool })
    }

    /// Load `<root>/study.yaml` and size the pool from its worker section.
    pub fn open(root: &Path) -> Result<Self> {
        let config = StudyConfig::load(root)?;
        let settings = config.worker.pool_settings();
        Self::new(root, config, settings)
    }

    pub fn root(&self) -> &Path {
        self.core.store.root()
    }

    pub fn config(&self) -> &StudyConfig {
        &self.core.config
    }

    pub fn store(&self) -> &StateStore {
        &self.core.store
    }

    pub fn rules(&self) -> &RuleTable {
        &self.core.rules
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn sessions(&self) -> Result<Vec<String>> {
        list_sessions(self.root())
    }

    pub fn load_session(&self, name: &str) -> Result<Session> {
        Session::load(&self.core.store, &self.core.config, name)
    }

    /// Evaluate `actions` (the whole catalog when `None`) for one session.
    pub fn possible_actions(
        &self,
        session: &str,
        actions: Option<&[Action]>,
    ) -> Result<BTreeMap<Action, Possibility>> {
        let session = self.load_session(session)?;
        let actions = actions.unwrap_or(Action::all());
        Ok(self
            .core
            .rules
            .possible_actions(&session, actions, &self.core.config))
    }

    // ---------------------------------------------------------------------
    // Jobs
    // ---------------------------------------------------------------------

    /// Mark `action` pending on `unit` and queue a worker for it.
    ///
    /// The unit's state file is created if needed. Fails with
    /// [`GazeflowError::AlreadyInFlight`] while the action is pending or
    /// running there. If the pool refuses the job, the previous state is put
    /// back.
    pub fn submit(&self, action: Action, unit: Unit) -> Result<JobId> {
        self.enqueue(action, unit, None)
    }

    /// Submit and block until the outcome is recorded. Must not be called
    /// from inside an async runtime.
    pub fn run(&self, action: Action, unit: Unit) -> Result<ActionState> {
        let (tx, rx) = mpsc::channel();
        let id = self.submit_observed(action, unit, move |_, _, state| {
            let _ = tx.send(state);
        })?;
        rx.recv().map_err(|_| {
            GazeflowError::Pool(PoolError::Runtime(format!(
                "job {id} was dropped before reporting an outcome"
            )))
        })
    }

    /// Like [`Orchestrator::submit`], with `observer` attached before the
    /// job can start. It runs once the terminal state has been recorded.
    pub fn submit_observed<F>(&self, action: Action, unit: Unit, observer: F) -> Result<JobId>
    where
        F: FnOnce(JobId, &JobTicket, ActionState) + Send + 'static,
    {
        let observer: DoneCallback<JobTicket> =
            Box::new(move |id: JobId, ticket: &JobTicket, state: JobState| {
                observer(id, ticket, ActionState::from(state))
            });
        self.enqueue(action, unit, Some(observer))
    }

    fn enqueue(
        &self,
        action: Action,
        unit: Unit,
        observer: Option<DoneCallback<JobTicket>>,
    ) -> Result<JobId> {
        unit.validate()?;
        if action.scope() != unit.scope() {
            return Err(GazeflowError::ScopeMismatch {
                action,
                action_scope: action.scope(),
                unit_scope: unit.scope(),
            });
        }
        if let Some(recording) = unit.recording_name() {
            if self.core.config.recording(recording).is_none() {
                return Err(GazeflowError::RecordingNotFound(recording.to_string()));
            }
        }

        // Checked and claimed under one file lock.
        let mut previous = ActionState::NotRun;
        self.core.store.modify(&unit, IfMissing::Create, |states| {
            previous = states.get(&action).copied().unwrap_or_default();
            if !previous.is_in_flight() {
                states.insert(action, ActionState::Pending);
            }
        })?;
        if previous.is_in_flight() {
            return Err(GazeflowError::AlreadyInFlight {
                action,
                unit,
                state: previous,
            });
        }

        let ticket = JobTicket::new(action, unit);
        let request = WorkRequest::new(&ticket, self.root(), &self.core.config);
        let worker = &self.core.config.worker;
        let order = WorkOrder::new(&worker.program)
            .args(&worker.args)
            .current_dir(ticket.unit.dir(self.root()))
            .env(ACTION_ENV, action.as_str())
            .stdin(request.to_json()?);

        let unit = ticket.unit.clone();
        let submitted = match observer {
            Some(observer) => self.pool.submit_observed(order, ticket, observer),
            None => self.pool.submit(order, ticket),
        };
        match submitted {
            Ok(id) => {
                info!(job = id, unit = %unit, %action, "submitted action");
                Ok(id)
            }
            Err(e) => {
                let restore = StateUpdate::new(unit.clone(), action, previous).cascade(false);
                if let Err(restore_err) = self.update_action_state(&restore) {
                    warn!(unit = %unit, %action, "failed to restore state after rejected submit: {restore_err}");
                }
                Err(e.into())
            }
        }
    }

    pub fn job_state(&self, id: JobId) -> Option<ActionState> {
        self.pool.job_state(id).map(ActionState::from)
    }

    /// The action and unit a tracked job runs.
    pub fn job_ticket(&self, id: JobId) -> Option<JobTicket> {
        self.pool.payload(id).map(|t| (*t).clone())
    }

    pub fn outstanding_jobs(&self) -> Vec<JobId> {
        self.pool.outstanding()
    }

    /// Run `observer` once the job's terminal state has been recorded.
    /// Returns `false` if the job is unknown.
    pub fn on_job_done<F>(&self, id: JobId, observer: F) -> bool
    where
        F: FnOnce(JobId, &JobTicket, ActionState) + Send + 'static,
    {
        self.pool.add_done_callback(
            id,
            Box::new(move |id: JobId, ticket: &JobTicket, state: JobState| {
                observer(id, ticket, ActionState::from(state))
            }),
        )
    }

    /// Block until an already submitted job finishes and its state is
    /// recorded.
    ///
    /// Returns `None` if the job is unknown, including when it finished
    /// before this call; use [`Orchestrator::run`] to avoid that race. Must
    /// not be called from inside an async runtime.
    pub fn wait(&self, id: JobId) -> Option<ActionState> {
        let (tx, rx) = mpsc::channel();
        let registered = self.on_job_done(id, move |_, _, state| {
            let _ = tx.send(state);
        });
        if !registered {
            return None;
        }
        rx.recv().ok()
    }

    pub fn cancel_job(&self, id: JobId) -> bool {
        self.pool.cancel_job(id)
    }

    /// Cancel every outstanding job, newest first.
    pub fn cancel_all_jobs(&self) -> Vec<JobId> {
        self.pool.cancel_all_jobs()
    }

    pub fn cleanup_if_idle(&self) -> bool {
        self.pool.cleanup_if_idle()
    }

    // ---------------------------------------------------------------------
    // State
    // ---------------------------------------------------------------------

    pub fn update_action_state(&self, update: &StateUpdate) -> Result<Vec<Unit>> {
        update_action_state(&self.core.store, &self.core.rules, &self.core.config, update)
    }

    /// Force `action` back to `not_run` on `unit`, resetting everything
    /// that depended on it.
    pub fn reset_action(&self, unit: Unit, action: Action) -> Result<Vec<Unit>> {
        let update = StateUpdate::new(unit, action, ActionState::NotRun);
        let touched = self.update_action_state(&update)?;
        info!(unit = %update.unit, %action, "reset action");
        Ok(touched)
    }

    /// Settle states left behind by a previous run that died with jobs in
    /// flight. Call before submitting anything: it cannot tell those jobs
    /// apart from this orchestrator's own.
    pub fn recover_interrupted(&self) -> Result<Vec<RecoveredAction>> {
        let mut recovered = Vec::new();
        for name in self.sessions()? {
            for unit in session_units(&self.core.config, &name) {
                for (action, state) in self.core.store.recover_interrupted(&unit)? {
                    recovered.push(RecoveredAction {
                        unit: unit.clone(),
                        action,
                        state,
                    });
                }
            }
        }
        if !recovered.is_empty() {
            info!(count = recovered.len(), "recovered interrupted actions");
        }
        Ok(recovered)
    }

    /// Rewrite every state file that predates the current catalog. Returns
    /// the units whose file changed.
    pub fn upgrade_all(&self) -> Result<Vec<Unit>> {
        let mut upgraded = Vec::new();
        for name in self.sessions()? {
            for unit in session_units(&self.core.config, &name) {
                if self.core.store.upgrade(&unit)? {
                    upgraded.push(unit);
                }
            }
        }
        Ok(upgraded)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
