//! Severity and category of audit problems.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How serious a configuration problem is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "LOW" => Ok(Severity::Low),
            "MEDIUM" => Ok(Severity::Medium),
            "HIGH" => Ok(Severity::High),
            "CRITICAL" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// Category a configuration problem belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProblemType {
    BadPractice,
    Configuration,
    Security,
    Performance,
    Operations,
}

impl ProblemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProblemType::BadPractice => "BAD_PRACTICE",
            ProblemType::Configuration => "CONFIGURATION",
            ProblemType::Security => "SECURITY",
            ProblemType::Performance => "PERFORMANCE",
            ProblemType::Operations => "OPERATIONS",
        }
    }
}

impl std::fmt::Display for ProblemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProblemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace(' ', "_").as_str() {
            "BAD_PRACTICE" => Ok(ProblemType::BadPractice),
            "CONFIGURATION" => Ok(ProblemType::Configuration),
            "SECURITY" => Ok(ProblemType::Security),
            "PERFORMANCE" => Ok(ProblemType::Performance),
            "OPERATIONS" => Ok(ProblemType::Operations),
            other => Err(format!("unknown problem type '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_parse_is_case_insensitive() {
        assert_eq!("high".parse::<Severity>().unwrap(), Severity::High);
        assert_eq!(" Medium ".parse::<Severity>().unwrap(), Severity::Medium);
        assert!("urgent".parse::<Severity>().is_err());
    }

    #[test]
    fn test_problem_type_round_trips_through_display() {
        for t in [
            ProblemType::BadPractice,
            ProblemType::Configuration,
            ProblemType::Security,
            ProblemType::Performance,
            ProblemType::Operations,
        ] {
            assert_eq!(t.to_string().parse::<ProblemType>().unwrap(), t);
        }
    }
}
