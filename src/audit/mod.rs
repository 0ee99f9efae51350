//! Audit rule engine: rule catalog, problems and policy settings.
//!
//! Producers throughout the crate raise [`Problem`]s from the [`RuleId`]
//! catalog, or ad-hoc problems for policy-driven checks.

mod problem;
mod rules;
mod settings;
mod severity;

pub use problem::Problem;
pub use rules::{Rule, RuleId};
pub use settings::{parse_properties, AuditSettings};
pub use severity::{ProblemType, Severity};
