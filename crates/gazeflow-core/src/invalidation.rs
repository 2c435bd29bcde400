use std::collections::BTreeSet;

use crate::action::Action;
use crate::config::StudyConfig;
use crate::table::{Invalidation, RuleTable};

impl RuleTable {
    /// Actions whose results are stale once `action` completes.
    ///
    /// Always a subset of the actions after `action`, so an action never
    /// invalidates itself or anything it depends on.
    pub fn invalidation_set(&self, action: Action, config: &StudyConfig) -> BTreeSet<Action> {
        match self.rule(action).invalidation {
            Invalidation::Nothing => BTreeSet::new(),
            Invalidation::Later { except } => {
                let spared = except(config);
                action
                    .later()
                    .iter()
                    .copied()
                    .filter(|a| !spared.contains(a))
                    .collect()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
