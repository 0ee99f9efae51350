//! Output formatting for CLI display.
//!
//! Provides the [`PrettyPrint`] trait for human-readable output
//! as an alternative to JSON serialization.

use serde_json::Value;
use tabled::{Table, Tabled};

use crate::audit::Problem;

/// Trait for human-readable output.
pub trait PrettyPrint {
    /// Returns a formatted string for terminal display.
    fn pretty_print(&self) -> String;
}

#[derive(Tabled)]
struct ProblemRow {
    severity: String,
    #[tabled(rename = "type")]
    problem_type: String,
    message: String,
    object: String,
}

impl From<&Problem> for ProblemRow {
    fn from(p: &Problem) -> Self {
        Self {
            severity: p.severity.to_string(),
            problem_type: p.problem_type.to_string(),
            message: p.message.clone(),
            object: p.concerned_object.clone().unwrap_or_default(),
        }
    }
}

impl PrettyPrint for [Problem] {
    fn pretty_print(&self) -> String {
        if self.is_empty() {
            return "No problems found".to_string();
        }
        let mut sorted: Vec<&Problem> = self.iter().collect();
        sorted.sort_by(|a, b| b.severity.cmp(&a.severity));
        let rows: Vec<ProblemRow> = sorted.into_iter().map(ProblemRow::from).collect();
        format!("{}\n\n{} problems", Table::new(rows), self.len())
    }
}

#[derive(Tabled)]
struct ZipExportRow {
    key: String,
    status: String,
    file: String,
}

/// Report of a batch zip export, as produced by
/// [`crate::export_projects_zip`].
pub struct ZipReport<'a>(pub &'a Value);

impl PrettyPrint for ZipReport<'_> {
    fn pretty_print(&self) -> String {
        let field = |entry: &Value, key: &str| entry.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
        let rows: Vec<ZipExportRow> = self
            .0
            .get("project_exports")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .map(|e| ZipExportRow {
                key: field(e, "key"),
                status: field(e, "status"),
                file: field(e, "path"),
            })
            .collect();
        let version = self.0.pointer("/platform/version").and_then(Value::as_str).unwrap_or("?");
        format!("SonarQube {}\n{}", version, Table::new(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{ProblemType, Severity};
    use serde_json::json;

    #[test]
    fn test_problems_sorted_by_severity() {
        let problems = vec![
            Problem::new(ProblemType::Configuration, Severity::Low, "low one"),
            Problem::new(ProblemType::Security, Severity::Critical, "critical one").with_object("http://x/p"),
        ];
        let output = problems.pretty_print();
        let critical = output.find("critical one").unwrap();
        let low = output.find("low one").unwrap();
        assert!(critical < low);
        assert!(output.ends_with("2 problems"));
    }

    #[test]
    fn test_no_problems() {
        let problems: Vec<Problem> = Vec::new();
        assert_eq!(problems.pretty_print(), "No problems found");
    }

    #[test]
    fn test_zip_report_rows() {
        let report = json!({
            "platform": {"version": "9.9", "plugins": []},
            "project_exports": [{"key": "p1", "status": "SUCCESS", "file": "p1.zip", "path": "/dumps/p1.zip"}]
        });
        let output = ZipReport(&report).pretty_print();
        assert!(output.starts_with("SonarQube 9.9"));
        assert!(output.contains("/dumps/p1.zip"));
    }
}
