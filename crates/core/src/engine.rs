use crate::models::{Evaluation, VisitRequest};
use crate::rules::{Rule, RuleTable};

/// First-match-wins evaluation over an immutable [`RuleTable`].
///
/// Total: the table always ends in a catch-all, so every valid request
/// receives exactly one outcome. Safe to share across threads.
#[derive(Debug, Clone, Default)]
pub struct DecisionEngine {
    table: RuleTable,
}

impl DecisionEngine {
    pub fn new(table: RuleTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    pub fn evaluate(&self, request: &VisitRequest) -> Evaluation {
        let rule = self
            .table
            .rules()
            .iter()
            .find(|rule| rule.matches(request))
            // Unreachable while the table ends in a catch-all.
            .unwrap_or_else(|| self.table.catch_all());

        outcome_of(rule)
    }
}

fn outcome_of(rule: &Rule) -> Evaluation {
    Evaluation {
        decision: rule.decision,
        route: rule.route,
        explanation: rule.explanation.to_string(),
        policy_id: rule.id.to_string(),
    }
}
