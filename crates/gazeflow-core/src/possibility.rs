//! Which actions can run right now, and what blocks the rest.
//!
//! Unmet preconditions are data, never errors: a recording action reports
//! the unmet actions in catalog order, a session action reports for each
//! unmet action the recordings holding it back (`None` when the blocker is
//! the session itself).

use serde::Serialize;
use std::collections::BTreeMap;

use crate::action::{Action, ActionStateMap, Scope};
use crate::config::StudyConfig;
use crate::session::{Recording, Session};
use crate::table::{Requirement, RuleTable};

/// Per unmet precondition: the recordings responsible, or `None` when the
/// requirement is not recording-specific.
pub type SessionBlockers = BTreeMap<Action, Option<Vec<String>>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordingPossibility {
    /// Recordings the action can run on now.
    pub runnable: Vec<String>,
    /// Recording -> unmet preconditions, in catalog order.
    pub blocked: BTreeMap<String, Vec<Action>>,
    /// Recordings where a job for the action is already queued or running.
    pub in_flight: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionPossibility {
    pub runnable: bool,
    pub blocked: SessionBlockers,
    pub in_flight: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum Possibility {
    Recording(RecordingPossibility),
    Session(SessionPossibility),
}

impl Possibility {
    pub fn is_runnable(&self) -> bool {
        match self {
            Possibility::Recording(p) => !p.runnable.is_empty(),
            Possibility::Session(p) => p.runnable,
        }
    }
}

impl RuleTable {
    /// Unmet preconditions of recording action `action` on `recording`.
    ///
    /// Preconditions ruled out by the config gate, or by the recording gate
    /// for this recording, are dropped. Session-scoped preconditions are
    /// read from `session_states`.
    pub fn unmet_for_recording(
        &self,
        action: Action,
        recording: &Recording,
        session_states: &ActionStateMap,
        config: &StudyConfig,
    ) -> Vec<Action> {
        let applies = |p: Action| match p.scope() {
            Scope::Recording => self.is_possible_for_recording(&recording.def, p, config),
            Scope::Session => self.is_possible_given_config(p, config),
        };
        let done = |p: Action| match p.scope() {
            Scope::Recording => recording.state(p).is_completed(),
            Scope::Session => session_states
                .get(&p)
                .copied()
                .unwrap_or_default()
                .is_completed(),
        };

        let mut unmet = Vec::new();
        for req in (self.rule(action).preconditions)(config) {
            let candidates: Vec<Action> = req
                .actions()
                .iter()
                .copied()
                .filter(|p| applies(*p))
                .collect();
            if candidates.is_empty() {
                continue;
            }
            let met = match req {
                Requirement::Completed(_) => candidates.iter().all(|p| done(*p)),
                Requirement::AnyCompleted(_) => candidates.iter().any(|p| done(*p)),
            };
            if !met {
                unmet.extend(candidates.into_iter().filter(|p| !done(*p)));
            }
        }
        unmet.sort();
        unmet.dedup();
        unmet
    }

    /// Unmet preconditions of session action `action` on `session`.
    ///
    /// A recording-scoped precondition is tested over the recordings it
    /// applies to: all of them for [`Requirement::Completed`], any of them
    /// for [`Requirement::AnyCompleted`]. Recordings the gates rule out are
    /// left out of the tally instead of counting as blockers, so an "all"
    /// over no applicable recording holds. An "any" that no recording of the
    /// session can satisfy is unmet, reported as `None`.
    pub fn unmet_for_session(
        &self,
        action: Action,
        session: &Session,
        config: &StudyConfig,
    ) -> SessionBlockers {
        let applicable = |p: Action| {
            session
                .recordings
                .iter()
                .filter(|r| self.is_possible_for_recording(&r.def, p, config))
                .collect::<Vec<_>>()
        };
        let names = |recs: Vec<&Recording>| -> Vec<String> {
            recs.into_iter().map(|r| r.name().to_string()).collect()
        };

        let mut blocked = SessionBlockers::new();
        for req in (self.rule(action).preconditions)(config) {
            let candidates: Vec<Action> = req
                .actions()
                .iter()
                .copied()
                .filter(|p| self.is_possible_given_config(*p, config))
                .collect();
            if candidates.is_empty() {
                continue;
            }

            match req {
                Requirement::Completed(_) => {
                    for p in candidates {
                        match p.scope() {
                            Scope::Session => {
                                if !session.state(p).is_completed() {
                                    blocked.insert(p, None);
                                }
                            }
                            Scope::Recording => {
                                let pending: Vec<&Recording> = applicable(p)
                                    .into_iter()
                                    .filter(|r| !r.state(p).is_completed())
                                    .collect();
                                if !pending.is_empty() {
                                    blocked.insert(p, Some(names(pending)));
                                }
                            }
                        }
                    }
                }
                Requirement::AnyCompleted(_) => {
                    let satisfied = candidates.iter().any(|p| match p.scope() {
                        Scope::Session => session.state(*p).is_completed(),
                        Scope::Recording => applicable(*p)
                            .iter()
                            .any(|r| r.state(*p).is_completed()),
                    });
                    if satisfied {
                        continue;
                    }
                    let mut reported = false;
                    for p in &candidates {
                        match p.scope() {
                            Scope::Session => {
                                blocked.insert(*p, None);
                                reported = true;
                            }
                            Scope::Recording => {
                                let recs = applicable(*p);
                                if !recs.is_empty() {
                                    blocked.insert(*p, Some(names(recs)));
                                    reported = true;
                                }
                            }
                        }
                    }
                    if !reported {
                        blocked.insert(candidates[0], None);
                    }
                }
            }
        }
        blocked
    }

    /// Evaluate `actions` against one session.
    ///
    /// Actions the config gate rules out are dropped outright. A unit where
    /// the action is already pending or running is never runnable. A
    /// recording action with nothing to report on any recording is omitted.
    pub fn possible_actions(
        &self,
        session: &Session,
        actions: &[Action],
        config: &StudyConfig,
    ) -> BTreeMap<Action, Possibility> {
        let mut result = BTreeMap::new();
        for &action in actions {
            if !self.is_possible_given_config(action, config) {
                continue;
            }
            match action.scope() {
                Scope::Recording => {
                    let mut runnable = Vec::new();
                    let mut blocked = BTreeMap::new();
                    let mut in_flight = Vec::new();
                    for rec in &session.recordings {
                        if !self.is_possible_for_recording(&rec.def, action, config) {
                            continue;
                        }
                        if rec.state(action).is_in_flight() {
                            in_flight.push(rec.name().to_string());
                            continue;
                        }
                        let unmet = self.unmet_for_recording(action, rec, &session.states, config);
                        if unmet.is_empty() {
                            runnable.push(rec.name().to_string());
                        } else {
                            blocked.insert(rec.name().to_string(), unmet);
                        }
                    }
                    if runnable.is_empty() && blocked.is_empty() && in_flight.is_empty() {
                        continue;
                    }
                    result.insert(
                        action,
                        Possibility::Recording(RecordingPossibility {
                            runnable,
                            blocked,
                            in_flight,
                        }),
                    );
                }
                Scope::Session => {
                    let blocked = self.unmet_for_session(action, session, config);
                    let in_flight = session.state(action).is_in_flight();
                    result.insert(
                        action,
                        Possibility::Session(SessionPossibility {
                            runnable: blocked.is_empty() && !in_flight,
                            blocked,
                            in_flight,
                        }),
                    );
                }
            }
        }
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
