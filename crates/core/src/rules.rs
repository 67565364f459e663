use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::models::{Decision, Purpose, Route, VisitRequest};

pub const INTERVIEW_BUSINESS_HOURS: &str = "interview_business_hours_v1";
pub const CONTRACTOR_AFTER_HOURS: &str = "contractor_after_hours_v1";
pub const DELIVERY_NO_BADGE: &str = "delivery_no_badge_v1";
pub const DEFAULT_UNKNOWN: &str = "default_unknown_v1";

#[derive(Clone, Copy)]
pub enum Predicate {
    /// Matches every request. Only valid as the final rule of a table.
    Always,
    When(fn(&VisitRequest) -> bool),
}

impl Predicate {
    pub fn matches(&self, request: &VisitRequest) -> bool {
        match self {
            Self::Always => true,
            Self::When(check) => check(request),
        }
    }

    pub fn is_catch_all(&self) -> bool {
        matches!(self, Self::Always)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("Always"),
            Self::When(_) => f.write_str("When(..)"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub id: &'static str,
    pub name: &'static str,
    pub predicate: Predicate,
    pub decision: Decision,
    pub route: Route,
    pub explanation: &'static str,
}

impl Rule {
    pub fn matches(&self, request: &VisitRequest) -> bool {
        self.predicate.matches(request)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleTableError {
    #[error("rule table is empty")]
    Empty,
    #[error("duplicate rule id {0}")]
    DuplicateId(&'static str),
    #[error("last rule {0} is not a catch-all")]
    MissingCatchAll(&'static str),
    #[error("catch-all rule {0} shadows the rules after it")]
    EarlyCatchAll(&'static str),
}

/// Row of the table as reported to operators.
#[derive(Debug, Clone, Serialize)]
pub struct RuleSummary {
    pub order: usize,
    pub id: &'static str,
    pub name: &'static str,
    pub decision: Decision,
    pub route: Route,
    pub explanation: &'static str,
    pub catch_all: bool,
}

/// Ordered, immutable rule set. Order is the only tie-break.
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<Rule>,
}

impl RuleTable {
    pub fn new(rules: Vec<Rule>) -> Result<Self, RuleTableError> {
        let Some(last) = rules.last() else {
            return Err(RuleTableError::Empty);
        };
        if !last.predicate.is_catch_all() {
            return Err(RuleTableError::MissingCatchAll(last.id));
        }

        let mut seen = HashSet::new();
        for (index, rule) in rules.iter().enumerate() {
            if !seen.insert(rule.id) {
                return Err(RuleTableError::DuplicateId(rule.id));
            }
            if rule.predicate.is_catch_all() && index + 1 != rules.len() {
                return Err(RuleTableError::EarlyCatchAll(rule.id));
            }
        }

        Ok(Self { rules })
    }

    pub fn standard() -> Self {
        Self {
            rules: STANDARD_RULES.to_vec(),
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn catch_all(&self) -> &Rule {
        // Non-empty by construction.
        &self.rules[self.rules.len() - 1]
    }

    pub fn summaries(&self) -> Vec<RuleSummary> {
        self.rules
            .iter()
            .enumerate()
            .map(|(index, rule)| RuleSummary {
                order: index + 1,
                id: rule.id,
                name: rule.name,
                decision: rule.decision,
                route: rule.route,
                explanation: rule.explanation,
                catch_all: rule.predicate.is_catch_all(),
            })
            .collect()
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::standard()
    }
}

const STANDARD_RULES: [Rule; 4] = [
    Rule {
        id: INTERVIEW_BUSINESS_HOURS,
        name: "Interview during business hours",
        predicate: Predicate::When(interview_in_business_hours),
        decision: Decision::Approve,
        route: Route::FrontDesk,
        explanation: "Interview scheduled during business hours with pre-registration confirmed.",
    },
    Rule {
        id: CONTRACTOR_AFTER_HOURS,
        name: "Contractor after business hours",
        predicate: Predicate::When(contractor_after_hours),
        decision: Decision::Review,
        route: Route::Security,
        explanation: "Contractor visit outside business hours requires security review.",
    },
    Rule {
        id: DELIVERY_NO_BADGE,
        name: "Delivery without badge requirement",
        predicate: Predicate::When(delivery_without_badge),
        decision: Decision::Approve,
        route: Route::FrontDesk,
        explanation: "Delivery visit approved with no badge requirement.",
    },
    Rule {
        id: DEFAULT_UNKNOWN,
        name: "Default unknown case",
        predicate: Predicate::Always,
        decision: Decision::Review,
        route: Route::Security,
        explanation: "Visit does not match any known policy pattern. Requires manual review.",
    },
];

fn interview_in_business_hours(request: &VisitRequest) -> bool {
    request.purpose == Purpose::Interview
        && request.time.is_business_hours()
        && request.pre_registered
}

fn contractor_after_hours(request: &VisitRequest) -> bool {
    request.purpose == Purpose::Contractor && !request.time.is_business_hours()
}

fn delivery_without_badge(request: &VisitRequest) -> bool {
    request.purpose == Purpose::Delivery && !request.badge_required
}
