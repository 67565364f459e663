pub mod engine;
pub mod models;
pub mod rules;
pub mod samples;

pub use engine::DecisionEngine;
pub use models::*;
pub use rules::{Predicate, Rule, RuleSummary, RuleTable, RuleTableError};
pub use samples::{sample_visits, SampleVisit};
