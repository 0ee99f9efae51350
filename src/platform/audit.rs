//! Global settings and platform audit.

use std::collections::BTreeMap;

use serde_json::Value;

use super::{Platform, Version, VersionBand};
use crate::audit::{AuditSettings, Problem, ProblemType, RuleId, Severity};
use crate::error::Result;
use crate::util::csv_to_list;

const RATING_GRID: &str = "sonar.technicalDebt.ratingGrid";
const DEPRECATED_DBCLEANER: &str = "sonar.dbcleaner.daysBeforeDeletingInactiveShortLivingBranches";

/// A parsed policy line: leading values, then severity and problem type.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyLine {
    pub values: Vec<String>,
    pub severity: Severity,
    pub problem_type: ProblemType,
}

/// Parse a CSV policy line of `n` fields, the last two being the severity
/// and problem type.
///
/// Returns `None` with fewer than `n - 2` fields, more than `n` fields, or an
/// unknown severity or type. Missing trailing fields take the defaults.
pub fn get_multiple_values(
    n: usize,
    line: &str,
    default_severity: Severity,
    default_type: ProblemType,
) -> Option<PolicyLine> {
    let mut values = csv_to_list(line);
    if n < 2 || values.len() < n - 2 || values.len() > n {
        return None;
    }
    let problem_type = if values.len() == n {
        values.pop()?.parse().ok()?
    } else {
        default_type
    };
    let severity = if values.len() == n - 1 {
        values.pop()?.parse().ok()?
    } else {
        default_severity
    };
    Some(PolicyLine {
        values,
        severity,
        problem_type,
    })
}

/// Settings flattened to strings, multiple values joined with commas.
type FlatSettings = BTreeMap<String, String>;

fn audit_setting_in_range(key: &str, line: &str, settings: &FlatSettings, version: Version) -> Vec<Problem> {
    let Some(v) = get_multiple_values(5, line, Severity::Medium, ProblemType::Configuration) else {
        tracing::error!("Incorrect audit configuration setting {} = {}, skipped", key, line);
        return Vec::new();
    };
    let setting = &v.values[0];
    let Some(current) = settings.get(setting) else {
        warn_unknown(setting);
        return Vec::new();
    };
    if setting == DEPRECATED_DBCLEANER && version >= Version::new(8, 0, 0) {
        tracing::error!("Setting {} is ineffective on SonarQube 8.0+, skipping audit", setting);
        return Vec::new();
    }
    let parsed = (
        current.parse::<f64>(),
        v.values[1].parse::<f64>(),
        v.values[2].parse::<f64>(),
    );
    let (Ok(value), Ok(min), Ok(max)) = parsed else {
        tracing::error!("Non numeric range audit for {} = {}, skipped", key, line);
        return Vec::new();
    };
    tracing::info!("Auditing that setting {} is within recommended range [{}-{}]", setting, min, max);
    if (min..=max).contains(&value) {
        return Vec::new();
    }
    vec![Problem::new(
        v.problem_type,
        v.severity,
        format!(
            "Setting '{}' value {} is outside recommended range [{}-{}]",
            setting, current, v.values[1], v.values[2]
        ),
    )]
}

fn audit_setting_value(key: &str, line: &str, settings: &FlatSettings) -> Vec<Problem> {
    let Some(v) = get_multiple_values(4, line, Severity::Medium, ProblemType::Configuration) else {
        tracing::error!("Incorrect audit configuration setting {} = {}, skipped", key, line);
        return Vec::new();
    };
    let setting = &v.values[0];
    let Some(current) = settings.get(setting) else {
        warn_unknown(setting);
        return Vec::new();
    };
    tracing::info!("Auditing that setting {} has common/recommended value '{}'", setting, v.values[1]);
    if current == &v.values[1] {
        return Vec::new();
    }
    vec![Problem::new(
        v.problem_type,
        v.severity,
        format!("Setting {setting} has potentially incorrect or unsafe value '{current}'"),
    )]
}

fn audit_setting_set(key: &str, line: &str, check_is_set: bool, settings: &FlatSettings) -> Vec<Problem> {
    let Some(v) = get_multiple_values(3, line, Severity::Medium, ProblemType::Configuration) else {
        tracing::error!("Incorrect audit configuration setting {} = {}, skipped", key, line);
        return Vec::new();
    };
    let setting = &v.values[0];
    let Some(current) = settings.get(setting) else {
        warn_unknown(setting);
        return Vec::new();
    };
    tracing::info!("Auditing whether setting {} is set or not", setting);
    match (current.is_empty(), check_is_set) {
        (true, true) => vec![Problem::from_rule(RuleId::SettingNotSet, &[setting])],
        (false, false) => vec![Problem::new(
            v.problem_type,
            v.severity,
            format!("Setting {setting} is set, although it should probably not"),
        )],
        _ => Vec::new(),
    }
}

fn audit_rating_range(value: f64, min: f64, max: f64, letter: char, line: &PolicyLine) -> Vec<Problem> {
    tracing::debug!(
        "Checking that maintainability rating threshold {}% for '{}' is within [{}%-{}%]",
        value * 100.0,
        letter,
        min * 100.0,
        max * 100.0
    );
    if (min..=max).contains(&value) {
        return Vec::new();
    }
    vec![Problem::new(
        line.problem_type,
        line.severity,
        format!(
            "Maintainability rating threshold {}% for {} is NOT within recommended range [{}%-{}%]",
            value * 100.0,
            letter,
            min * 100.0,
            max * 100.0
        ),
    )]
}

/// Check each rating letter threshold of the grid against its policy range.
pub fn audit_maintainability_rating_grid(settings: &FlatSettings, audit: &AuditSettings) -> Vec<Problem> {
    const PREFIX: &str = "audit.globalSettings.maintainabilityRating";
    let Some(grid) = settings.get(RATING_GRID) else {
        warn_unknown(RATING_GRID);
        return Vec::new();
    };
    let thresholds = csv_to_list(grid);
    tracing::debug!("Auditing maintainability rating grid");
    let mut problems = Vec::new();
    for (key, line) in audit.iter_prefix(PREFIX) {
        let letter = key[PREFIX.len()..]
            .split('.')
            .filter_map(|seg| {
                let mut chars = seg.chars();
                match (chars.next(), chars.next()) {
                    (Some(c @ 'A'..='D'), None) => Some(c),
                    _ => None,
                }
            })
            .next();
        let Some(letter) = letter else {
            tracing::error!("Incorrect audit configuration setting {}, skipping audit", key);
            continue;
        };
        let index = (letter as u8 - b'A') as usize;
        let Some(value) = thresholds.get(index).and_then(|t| t.parse::<f64>().ok()) else {
            tracing::error!("Rating grid '{}' has no threshold for {}", grid, letter);
            continue;
        };
        let Some(v) = get_multiple_values(4, line, Severity::Medium, ProblemType::Configuration) else {
            tracing::error!("Incorrect audit configuration setting {} = {}, skipped", key, line);
            continue;
        };
        let (Ok(min), Ok(max)) = (v.values[0].parse::<f64>(), v.values[1].parse::<f64>()) else {
            tracing::error!("Non numeric range audit for {} = {}, skipped", key, line);
            continue;
        };
        problems.extend(audit_rating_range(value, min, max, letter, &v));
    }
    problems
}

/// Run the `range`, `value`, `isSet` and `isNotSet` policy families.
pub fn audit_settings_policy(settings: &FlatSettings, audit: &AuditSettings, version: Version) -> Vec<Problem> {
    let mut problems = Vec::new();
    for (key, line) in audit.iter_prefix("audit.globalSettings.") {
        let family = key["audit.globalSettings.".len()..].split('.').next().unwrap_or_default();
        match family {
            "range" => problems.extend(audit_setting_in_range(key, line, settings, version)),
            "value" => problems.extend(audit_setting_value(key, line, settings)),
            "isSet" => problems.extend(audit_setting_set(key, line, true, settings)),
            "isNotSet" => problems.extend(audit_setting_set(key, line, false, settings)),
            _ => {}
        }
    }
    problems
}

/// Upgrade recommendation for a version.
pub fn audit_version(version: Version, platform: &str) -> Vec<Problem> {
    let rule = match VersionBand::of(version) {
        VersionBand::BelowLts => RuleId::BelowLts,
        VersionBand::BelowLatest => RuleId::BelowLatest,
        VersionBand::Current => return Vec::new(),
    };
    vec![Problem::from_rule(rule, &[&platform]).with_object(platform)]
}

fn warn_unknown(setting: &str) {
    tracing::warn!("Setting {} does not exist, audit skipped", setting);
}

impl Platform {
    /// Audit global settings and the platform itself.
    #[tracing::instrument(skip(self, audit))]
    pub async fn audit(&self, audit: &AuditSettings) -> Result<Vec<Problem>> {
        if !audit.get_bool("audit.globalSettings", true) {
            tracing::info!("Global settings audit is disabled, skipping...");
            return Ok(Vec::new());
        }
        tracing::info!("--- Auditing global settings ---");
        let version = self.version().await?;
        let flat: FlatSettings = self
            .settings(None, true)
            .await?
            .into_values()
            .map(|s| {
                let v = s.value_string();
                (s.key, v)
            })
            .collect();

        let mut problems = audit_settings_policy(&flat, audit, version);
        problems.extend(audit_maintainability_rating_grid(&flat, audit));
        problems.extend(self.audit_project_default_visibility(audit, version).await?);
        problems.extend(self.audit_admin_password().await?);
        tracing::info!("--- Auditing global permissions ---");
        problems.extend(self.global_permissions().await?.audit_global());
        problems.extend(audit_version(version, &self.to_string()));
        Ok(problems)
    }

    async fn audit_project_default_visibility(&self, audit: &AuditSettings, version: Version) -> Result<Vec<Problem>> {
        if !audit.get_bool("checkDefaultProjectVisibility", true) {
            return Ok(Vec::new());
        }
        tracing::info!("Auditing project default visibility");
        let visibility = if version < Version::new(8, 7, 0) {
            let resp: Value = self
                .client()
                .get_json(
                    "navigation/organization",
                    &[("organization", "default-organization")],
                )
                .await?;
            resp.pointer("/organization/projectVisibility")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        } else {
            self.get_setting("projects.default.visibility")
                .await?
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_default()
        };
        tracing::info!("Project default visibility is '{}'", visibility);
        if visibility == "private" {
            return Ok(Vec::new());
        }
        Ok(vec![Problem::from_rule(
            RuleId::SettingProjDefaultVisibility,
            &[&visibility],
        )])
    }

    async fn audit_admin_password(&self) -> Result<Vec<Problem>> {
        tracing::info!("Auditing admin password");
        if self.client().validate_credentials("admin", "admin").await? {
            return Ok(vec![Problem::from_rule(RuleId::DefaultAdminPassword, &[])]);
        }
        tracing::info!("User 'admin' default password has been changed");
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(pairs: &[(&str, &str)]) -> FlatSettings {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_multiple_values_arity() {
        let d = (Severity::Medium, ProblemType::Configuration);
        assert!(get_multiple_values(5, "a, 1", d.0, d.1).is_none());
        assert!(get_multiple_values(5, "a, 1, 2, HIGH, SECURITY, x", d.0, d.1).is_none());

        let v = get_multiple_values(5, "a, 1, 2", d.0, d.1).unwrap();
        assert_eq!((v.severity, v.problem_type), (Severity::Medium, ProblemType::Configuration));

        let v = get_multiple_values(5, "a, 1, 2, HIGH", d.0, d.1).unwrap();
        assert_eq!((v.severity, v.problem_type), (Severity::High, ProblemType::Configuration));

        let v = get_multiple_values(5, "a, 1, 2, HIGH, SECURITY", d.0, d.1).unwrap();
        assert_eq!((v.severity, v.problem_type), (Severity::High, ProblemType::Security));
        assert_eq!(v.values, vec!["a", "1", "2"]);
    }

    #[test]
    fn test_multiple_values_rejects_unknown_severity() {
        assert!(get_multiple_values(4, "a, b, SEVERE", Severity::Low, ProblemType::Security).is_none());
    }

    #[test]
    fn test_rating_grid_within_range() {
        let settings = flat(&[(RATING_GRID, "0.05,0.10,0.20,0.50")]);
        let audit = AuditSettings::empty().with(
            "audit.globalSettings.maintainabilityRating.A.range.1",
            "0.00,0.05",
        );
        assert!(audit_maintainability_rating_grid(&settings, &audit).is_empty());
    }

    #[test]
    fn test_rating_grid_outside_range() {
        let settings = flat(&[(RATING_GRID, "0.05,0.10,0.20,0.50")]);
        let audit = AuditSettings::empty().with(
            "audit.globalSettings.maintainabilityRating.A.range.1",
            "0.00,0.04",
        );
        let problems = audit_maintainability_rating_grid(&settings, &audit);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].message.contains(" for A "));
    }

    #[test]
    fn test_policy_families() {
        let settings = flat(&[
            ("sonar.forceAuthentication", "false"),
            ("sonar.dbcleaner.weeksBeforeDeletingAllSnapshots", "1000"),
            ("sonar.core.serverBaseURL", ""),
        ]);
        let audit = AuditSettings::empty()
            .with("audit.globalSettings.value.1", "sonar.forceAuthentication, true, HIGH, SECURITY")
            .with(
                "audit.globalSettings.range.1",
                "sonar.dbcleaner.weeksBeforeDeletingAllSnapshots, 104, 520",
            )
            .with("audit.globalSettings.isSet.1", "sonar.core.serverBaseURL")
            .with("audit.globalSettings.isNotSet.1", "sonar.unknown.setting")
            .with("audit.globalSettings.range.2", "malformed");
        let problems = audit_settings_policy(&settings, &audit, Version::new(9, 9, 0));
        assert_eq!(problems.len(), 3);
        assert!(problems.iter().any(|p| p.rule == Some(RuleId::SettingNotSet)));
        assert!(problems
            .iter()
            .any(|p| p.severity == Severity::High && p.problem_type == ProblemType::Security));
    }

    #[test]
    fn test_version_audit_bands() {
        assert_eq!(audit_version(Version::new(8, 2, 0), "p")[0].rule, Some(RuleId::BelowLts));
        assert_eq!(audit_version(Version::new(9, 1, 0), "p")[0].rule, Some(RuleId::BelowLatest));
        assert!(audit_version(Version::new(9, 9, 0), "p").is_empty());
    }
}
