//! Audit policy settings.
//!
//! The policy is a flat `key = value` map read from Java properties text and
//! layered over built-in defaults.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;

const DEFAULTS: &str = r"
# Global audit
threads = 8
audit.globalSettings = true
checkDefaultProjectVisibility = true

audit.globalSettings.range.1 = sonar.dbcleaner.daysBeforeDeletingClosedIssues, 10, 60, MEDIUM, PERFORMANCE
audit.globalSettings.range.2 = sonar.dbcleaner.hoursBeforeKeepingOnlyOneSnapshotByDay, 12, 240, MEDIUM, PERFORMANCE
audit.globalSettings.range.3 = sonar.dbcleaner.weeksBeforeKeepingOnlyOneSnapshotByWeek, 2, 12, MEDIUM, PERFORMANCE
audit.globalSettings.range.4 = sonar.dbcleaner.weeksBeforeKeepingOnlyOneSnapshotByMonth, 26, 104, MEDIUM, PERFORMANCE
audit.globalSettings.range.5 = sonar.dbcleaner.weeksBeforeDeletingAllSnapshots, 104, 520, MEDIUM, PERFORMANCE
audit.globalSettings.range.6 = sonar.dbcleaner.daysBeforeDeletingInactiveBranchesAndPRs, 10, 60, MEDIUM, PERFORMANCE
audit.globalSettings.value.1 = sonar.forceAuthentication, true, HIGH, SECURITY
audit.globalSettings.value.2 = sonar.cpd.cross_project, false, HIGH, PERFORMANCE
audit.globalSettings.isSet.1 = sonar.core.serverBaseURL, HIGH, OPERATIONS

audit.globalSettings.maintainabilityRating.A.range.1 = 0.03, 0.05, MEDIUM, CONFIGURATION
audit.globalSettings.maintainabilityRating.B.range.1 = 0.07, 0.10, MEDIUM, CONFIGURATION
audit.globalSettings.maintainabilityRating.C.range.1 = 0.15, 0.20, MEDIUM, CONFIGURATION
audit.globalSettings.maintainabilityRating.D.range.1 = 0.40, 0.50, MEDIUM, CONFIGURATION

# Projects audit
audit.projects = true
audit.projects.neverAnalyzed = true
audit.projects.maxLastAnalysisAge = 180
audit.projects.branches = true
audit.projects.branches.maxLastAnalysisAge = 30
audit.projects.pullRequests.maxLastAnalysisAge = 30
audit.projects.visibility = true
audit.projects.utilityLocs = false
audit.projects.bindings = true
audit.projects.bindings.validation = true
audit.projects.duplicates = false
audit.projects.permissions = true
audit.projects.permissions.maxUsers = 5
audit.projects.permissions.maxAdminUsers = 2
audit.projects.permissions.maxGroups = 5
audit.projects.analysisWarnings = true

# Portfolios audit
audit.portfolios = true
audit.portfolios.empty = true
audit.portfolios.singleton = true
";

/// Audit policy: which checks run and with which thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditSettings {
    values: BTreeMap<String, String>,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            values: parse_properties(DEFAULTS),
        }
    }
}

impl AuditSettings {
    /// Settings with no entry at all, not even the defaults.
    pub fn empty() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Built-in defaults overridden by the given properties text.
    pub fn from_properties(text: &str) -> Self {
        let mut settings = Self::default();
        settings.values.extend(parse_properties(text));
        settings
    }

    /// Built-in defaults overridden by a properties file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        tracing::info!("Loaded audit settings from {}", path.as_ref().display());
        Ok(Self::from_properties(&text))
    }

    /// Builder style setter.
    #[must_use]
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Boolean value of a key, `default` when absent or not a boolean.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key).map(|v| v.trim().to_lowercase()) {
            Some(v) if v == "true" || v == "yes" || v == "on" => true,
            Some(v) if v == "false" || v == "no" || v == "off" => false,
            _ => default,
        }
    }

    /// Numeric value of a key, `default` when absent or not a number.
    pub fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Number of parallel workers for batch operations.
    pub fn threads(&self) -> usize {
        self.get_u64("threads", 8).max(1) as usize
    }

    /// Entries whose key starts with `prefix`, in key order.
    pub fn iter_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.values
            .range(prefix.to_string()..)
            .take_while(move |(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Parse Java properties text into a map.
///
/// Supports `=` and `:` separators, `#` and `!` comments and trailing
/// backslash line continuations.
pub fn parse_properties(text: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    let mut pending = String::new();

    for raw in text.lines() {
        let line = raw.trim();
        if pending.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!')) {
            continue;
        }
        if let Some(stripped) = line.strip_suffix('\\') {
            pending.push_str(stripped);
            continue;
        }
        pending.push_str(line);
        let entry = std::mem::take(&mut pending);

        let split = entry.find(['=', ':']);
        let (key, value) = match split {
            Some(pos) => (&entry[..pos], &entry[pos + 1..]),
            None => (entry.as_str(), ""),
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        map.insert(key.to_string(), value.trim().to_string());
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_loaded() {
        let settings = AuditSettings::default();
        assert_eq!(settings.threads(), 8);
        assert!(settings.get_bool("audit.projects.neverAnalyzed", false));
        assert_eq!(settings.get_u64("audit.projects.maxLastAnalysisAge", 0), 180);
        assert!(!settings.get_bool("audit.projects.duplicates", true));
    }

    #[test]
    fn test_properties_override_defaults() {
        let settings = AuditSettings::from_properties(
            "# comment\n! other comment\naudit.projects.neverAnalyzed = false\nthreads: 2\n",
        );
        assert!(!settings.get_bool("audit.projects.neverAnalyzed", true));
        assert_eq!(settings.threads(), 2);
    }

    #[test]
    fn test_line_continuation() {
        let map = parse_properties("audit.globalSettings.range.9 = sonar.x, \\\n   1, 5\n");
        assert_eq!(map["audit.globalSettings.range.9"], "sonar.x, 1, 5");
    }

    #[test]
    fn test_iter_prefix_only_returns_matching_keys() {
        let settings = AuditSettings::empty()
            .with("audit.globalSettings.value.1", "a, b")
            .with("audit.globalSettings.value.2", "c, d")
            .with("audit.projects", "true");
        let keys: Vec<&str> = settings
            .iter_prefix("audit.globalSettings.value")
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["audit.globalSettings.value.1", "audit.globalSettings.value.2"]);
    }

    #[test]
    fn test_bad_values_fall_back_to_default() {
        let settings = AuditSettings::empty().with("threads", "many").with("flag", "maybe");
        assert_eq!(settings.threads(), 8);
        assert!(settings.get_bool("flag", true));
    }
}
