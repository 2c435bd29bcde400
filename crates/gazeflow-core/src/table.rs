use crate::action::Action;
use crate::config::{RecordingDef, StudyConfig};
use crate::error::{GazeflowError, Result};

// ---------------------------------------------------------------------------
// Requirement
// ---------------------------------------------------------------------------

/// One precondition of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// The action must be completed. Checked on the acting unit itself, on
    /// the owning session for session-scoped actions, and on every
    /// applicable recording when a session action waits on a recording
    /// action.
    Completed(Action),
    /// At least one applicable recording has completed at least one of the
    /// listed actions.
    AnyCompleted(&'static [Action]),
}

impl Requirement {
    pub fn actions(&self) -> &[Action] {
        match self {
            Requirement::Completed(a) => std::slice::from_ref(a),
            Requirement::AnyCompleted(alternatives) => alternatives,
        }
    }
}

// ---------------------------------------------------------------------------
// Invalidation
// ---------------------------------------------------------------------------

/// What completing an action does to the results of later actions.
#[derive(Clone, Copy)]
pub enum Invalidation {
    /// Terminal stage: nothing depends on its output.
    Nothing,
    /// Every later action is reset, except those `except` returns.
    Later {
        except: fn(&StudyConfig) -> Vec<Action>,
    },
}

// ---------------------------------------------------------------------------
// ActionRule
// ---------------------------------------------------------------------------

pub type ConfigGate = fn(&StudyConfig) -> bool;
pub type RecordingGate = fn(&RecordingDef, &StudyConfig) -> bool;
pub type PreconditionBuilder = fn(&StudyConfig) -> Vec<Requirement>;

/// Everything the engine knows about one action, as plain fn pointers.
pub struct ActionRule {
    pub action: Action,
    pub config_gate: ConfigGate,
    /// Only consulted for recording-scoped actions, after the config gate.
    pub recording_gate: RecordingGate,
    pub preconditions: PreconditionBuilder,
    pub invalidation: Invalidation,
}

// ---------------------------------------------------------------------------
// RuleTable
// ---------------------------------------------------------------------------

/// The rule set, validated to hold exactly one rule per catalog action.
pub struct RuleTable {
    /// Indexed by [`Action::index`].
    rules: Vec<ActionRule>,
}

impl RuleTable {
    /// Validate `rules` and build the table. A missing or repeated action is
    /// reported here, at start-up, and never at first use.
    pub fn new(rules: Vec<ActionRule>) -> Result<Self> {
        let mut slots: Vec<Option<ActionRule>> = Action::all().iter().map(|_| None).collect();
        for rule in rules {
            let slot = &mut slots[rule.action.index()];
            if slot.is_some() {
                return Err(GazeflowError::DuplicateRule(rule.action));
            }
            *slot = Some(rule);
        }
        let rules = slots
            .into_iter()
            .zip(Action::all())
            .map(|(slot, action)| slot.ok_or(GazeflowError::MissingRule(*action)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// The table built from [`crate::rules::default_rules`].
    pub fn standard() -> Result<Self> {
        Self::new(crate::rules::default_rules())
    }

    pub fn rule(&self, action: Action) -> &ActionRule {
        &self.rules[action.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActionRule> {
        self.rules.iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
