//! Audit problems.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use super::rules::RuleId;
use super::severity::{ProblemType, Severity};

/// A configuration problem found by an audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    /// Catalog rule that raised the problem, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<RuleId>,

    #[serde(rename = "type")]
    pub problem_type: ProblemType,

    pub severity: Severity,

    pub message: String,

    /// Permalink or key of the object the problem is about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concerned_object: Option<String>,
}

impl Problem {
    /// Create a problem that is not backed by a catalog rule.
    pub fn new(problem_type: ProblemType, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            rule: None,
            problem_type,
            severity,
            message: message.into(),
            concerned_object: None,
        }
    }

    /// Create a problem from a catalog rule, filling its message template.
    pub fn from_rule(id: RuleId, args: &[&dyn Display]) -> Self {
        let rule = id.rule();
        Self {
            rule: Some(id),
            problem_type: rule.problem_type,
            severity: rule.severity,
            message: rule.format(args),
            concerned_object: None,
        }
    }

    /// Attach the object the problem is about.
    #[must_use]
    pub fn with_object(mut self, object: impl Into<String>) -> Self {
        self.concerned_object = Some(object.into());
        self
    }

    /// Override the rule default severity.
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

impl Display for Problem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.severity, self.problem_type, self.message)
    }
}
