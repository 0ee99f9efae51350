//! Project audit checks.

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::Project;
use crate::audit::{AuditSettings, Problem, RuleId, Severity};
use crate::error::Result;
use crate::models::{measures, task};
use crate::platform::Edition;
use crate::traits::Audit;
use crate::util::age_in_days;

/// Projects this big or bigger are checked for utility language LoCs.
const UTILITY_LOCS_MIN_TOTAL: u64 = 100_000;
const UTILITY_LANGUAGES: [&str; 2] = ["xml", "json"];

/// Utility language LoCs of a language distribution, when they are more
/// than half of a large project.
fn excessive_utility_locs(distribution: &BTreeMap<String, u64>) -> Option<u64> {
    let total: u64 = distribution.values().sum();
    let utility: u64 = UTILITY_LANGUAGES
        .iter()
        .filter_map(|lang| distribution.get(*lang))
        .sum();
    (total > UTILITY_LOCS_MIN_TOTAL && utility * 2 > total).then_some(utility)
}

impl Project {
    fn problem(&self, id: RuleId, args: &[&dyn std::fmt::Display]) -> Problem {
        Problem::from_rule(id, args).with_object(self.url())
    }

    /// Never analyzed, or not analyzed for too long.
    pub async fn audit_last_analysis(&self, settings: &AuditSettings) -> Result<Vec<Problem>> {
        let Some(date) = self.last_analysis_with_branches().await? else {
            if settings.get_bool("audit.projects.neverAnalyzed", true) {
                return Ok(vec![self.problem(RuleId::ProjNotAnalyzed, &[&self])]);
            }
            tracing::debug!("Auditing of never analyzed projects is disabled, skipping...");
            return Ok(Vec::new());
        };
        let max_age = settings.get_u64("audit.projects.maxLastAnalysisAge", 180);
        if max_age == 0 {
            tracing::debug!("Auditing of projects last analysis date is disabled, skipping...");
            return Ok(Vec::new());
        }
        let age = age_in_days(date);
        if age <= max_age as i64 {
            tracing::debug!("{} last analysis is {} days old, audit OK", self, age);
            return Ok(Vec::new());
        }
        let ncloc = self.ncloc().await?;
        let mut problem = self.problem(RuleId::ProjLastAnalysis, &[&self, &ncloc, &age]);
        if age > 365 {
            problem = problem.with_severity(Severity::High);
        }
        Ok(vec![problem])
    }

    /// Branch audits, plus the `main` and `master` coexistence check.
    pub async fn audit_branches(&self, settings: &AuditSettings) -> Result<Vec<Problem>> {
        let platform = self.platform()?;
        if !settings.get_bool("audit.projects.branches", true) || platform.edition().await? == Edition::Community {
            tracing::debug!("Auditing of branches is disabled or not applicable, skipping...");
            return Ok(Vec::new());
        }
        let branches = self.branches().await?;
        let mut problems = Vec::new();
        let has = |name: &str| branches.iter().any(|b| b.name == name);
        if has("main") && has("master") {
            problems.push(self.problem(RuleId::ProjMainAndMaster, &[&self]));
        }
        for branch in branches.iter() {
            problems.extend(branch.audit(&platform, settings).await?);
        }
        Ok(problems)
    }

    pub async fn audit_pull_requests(&self, settings: &AuditSettings) -> Result<Vec<Problem>> {
        Ok(self
            .pull_requests()
            .await?
            .iter()
            .flat_map(|pr| pr.audit(settings))
            .collect())
    }

    pub fn audit_visibility(&self, settings: &AuditSettings) -> Vec<Problem> {
        if !settings.get_bool("audit.projects.visibility", true) {
            tracing::debug!("Project visibility audit is disabled, skipping...");
            return Vec::new();
        }
        let visibility = self.visibility();
        if visibility == "private" {
            return Vec::new();
        }
        vec![self.problem(RuleId::ProjVisibility, &[&self, &visibility])]
    }

    /// Large projects where XML and JSON make up most of the code.
    pub async fn audit_utility_locs(&self, settings: &AuditSettings) -> Result<Vec<Problem>> {
        if !settings.get_bool("audit.projects.utilityLocs", false) {
            return Ok(Vec::new());
        }
        let platform = self.platform()?;
        let values = measures::get(&platform, &self.key, &["ncloc_language_distribution"], None, None).await?;
        let distribution = values
            .get("ncloc_language_distribution")
            .map(|v| measures::parse_distribution(v))
            .unwrap_or_default();
        match excessive_utility_locs(&distribution) {
            Some(utility) => Ok(vec![self.problem(RuleId::ProjUtilityLocs, &[&self, &utility])]),
            None => Ok(Vec::new()),
        }
    }

    pub async fn audit_permissions(&self, settings: &AuditSettings) -> Result<Vec<Problem>> {
        let object = self.to_string();
        Ok(self
            .permissions()
            .await?
            .audit_project(settings, &object)
            .into_iter()
            .map(|p| p.with_object(self.url()))
            .collect())
    }

    pub async fn audit_background_tasks(&self, settings: &AuditSettings) -> Result<Vec<Problem>> {
        let object = self.to_string();
        let problems = task::audit_last_task(&self.platform()?, &self.key, &object, settings).await?;
        Ok(problems.into_iter().map(|p| p.with_object(self.url())).collect())
    }

    /// Binding validation, skipped on community edition and for unbound projects.
    pub async fn audit_binding_valid(&self, settings: &AuditSettings) -> Result<Vec<Problem>> {
        if !settings.get_bool("audit.projects.bindings.validation", true)
            || self.platform()?.edition().await? == Edition::Community
            || !self.has_binding().await?
        {
            return Ok(Vec::new());
        }
        if self.validate_binding().await? {
            return Ok(Vec::new());
        }
        Ok(vec![self.problem(RuleId::ProjInvalidBinding, &[&self])])
    }

    /// Analyzed projects with no code.
    ///
    /// Branch audits already cover this unless they are off, or on community
    /// edition where there are no branches.
    pub async fn audit_zero_loc(&self, settings: &AuditSettings) -> Result<Vec<Problem>> {
        let branches_audited = settings.get_bool("audit.projects.branches", true)
            && self.platform()?.edition().await? != Edition::Community;
        if branches_audited || self.last_analysis().await?.is_none() {
            return Ok(Vec::new());
        }
        if self.ncloc().await? == 0 {
            return Ok(vec![self.problem(RuleId::ProjZeroLoc, &[&self])]);
        }
        Ok(Vec::new())
    }
}

#[async_trait]
impl Audit for Project {
    #[tracing::instrument(skip(self, settings), fields(project = %self.key))]
    async fn audit(&self, settings: &AuditSettings) -> Result<Vec<Problem>> {
        tracing::debug!("Auditing {}", self);
        let mut problems = self.audit_last_analysis(settings).await?;
        problems.extend(self.audit_branches(settings).await?);
        problems.extend(self.audit_pull_requests(settings).await?);
        problems.extend(self.audit_visibility(settings));
        problems.extend(self.audit_utility_locs(settings).await?);
        problems.extend(self.audit_permissions(settings).await?);
        problems.extend(self.audit_background_tasks(settings).await?);
        problems.extend(self.audit_binding_valid(settings).await?);
        problems.extend(self.audit_zero_loc(settings).await?);
        Ok(problems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::measures::parse_distribution;

    #[test]
    fn test_utility_locs_over_half_of_a_large_project() {
        let distribution = parse_distribution("xml=80000;json=10000;java=20000");
        assert_eq!(excessive_utility_locs(&distribution), Some(90_000));
    }

    #[test]
    fn test_utility_locs_ignored_below_half() {
        let distribution = parse_distribution("xml=50000;java=70000");
        assert_eq!(excessive_utility_locs(&distribution), None);
    }

    #[test]
    fn test_utility_locs_ignored_on_small_projects() {
        let distribution = parse_distribution("xml=90000;java=5000");
        assert_eq!(excessive_utility_locs(&distribution), None);
        assert_eq!(excessive_utility_locs(&BTreeMap::new()), None);
    }
}
