//! Project branches and pull requests.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::audit::{AuditSettings, Problem, RuleId};
use crate::error::{Result, SonarError};
use crate::models::measures;
use crate::platform::Platform;
use crate::util::{age_in_days, parse_date};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBranch {
    name: String,
    #[serde(default)]
    is_main: bool,
    #[serde(default)]
    analysis_date: Option<String>,
    #[serde(default)]
    excluded_from_purge: bool,
}

#[derive(Debug, Deserialize)]
struct BranchList {
    #[serde(default)]
    branches: Vec<RawBranch>,
}

/// A branch of a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub project: String,
    pub name: String,
    pub is_main: bool,
    pub last_analysis: Option<DateTime<Utc>>,
    pub keep_when_inactive: bool,
}

impl Branch {
    fn from_raw(project: &str, raw: RawBranch) -> Self {
        Self {
            project: project.to_string(),
            name: raw.name,
            is_main: raw.is_main,
            last_analysis: raw.analysis_date.as_deref().and_then(parse_date),
            keep_when_inactive: raw.excluded_from_purge,
        }
    }

    /// Minimal export: `isMain` for the main branch, `keepWhenInactive` for
    /// other branches kept when inactive.
    pub fn export(&self) -> Map<String, Value> {
        let mut json = Map::new();
        if self.is_main {
            json.insert("isMain".to_string(), Value::Bool(true));
        } else if self.keep_when_inactive {
            json.insert("keepWhenInactive".to_string(), Value::Bool(true));
        }
        json
    }

    pub async fn ncloc(&self, platform: &Platform) -> Result<u64> {
        measures::get_count(platform, &self.project, "ncloc", Some(&self.name)).await
    }

    pub async fn rename(&self, platform: &Platform, new_name: &str) -> Result<()> {
        if !self.is_main {
            return Err(SonarError::UnsupportedOperation(format!(
                "only the main branch of project '{}' can be renamed",
                self.project
            )));
        }
        if self.name == new_name {
            return Ok(());
        }
        tracing::info!("Renaming {} to '{}'", self, new_name);
        platform
            .client()
            .post(
                "project_branches/rename",
                &[("project", self.project.as_str()), ("name", new_name)],
            )
            .await?;
        Ok(())
    }

    pub async fn audit(&self, platform: &Platform, settings: &AuditSettings) -> Result<Vec<Problem>> {
        let mut problems = Vec::new();
        let object = self.to_string();
        let max_age = settings.get_u64("audit.projects.branches.maxLastAnalysisAge", 30);
        match self.last_analysis {
            Some(date) if !self.is_main && !self.keep_when_inactive && max_age > 0 => {
                let age = age_in_days(date);
                if age > max_age as i64 {
                    problems.push(
                        Problem::from_rule(RuleId::BranchLastAnalysis, &[&object, &age])
                            .with_object(object.clone()),
                    );
                }
            }
            _ => {}
        }
        if self.last_analysis.is_some() && self.ncloc(platform).await? == 0 {
            problems.push(Problem::from_rule(RuleId::BranchZeroLoc, &[&object]).with_object(object));
        }
        Ok(problems)
    }
}

impl std::fmt::Display for Branch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "branch '{}' of project '{}'", self.name, self.project)
    }
}

pub async fn list(platform: &Platform, project: &str) -> Result<Vec<Branch>> {
    let resp: BranchList = platform
        .client()
        .get_json("project_branches/list", &[("project", project)])
        .await?;
    Ok(resp
        .branches
        .into_iter()
        .map(|b| Branch::from_raw(project, b))
        .collect())
}

/// Branch exports keyed by name, `None` when there is nothing beyond a lone
/// main branch.
pub fn export_all(branches: &[Branch]) -> Option<Value> {
    let mut out = Map::new();
    for branch in branches {
        let exp = branch.export();
        if branches.len() == 1 && branch.is_main && exp.len() <= 1 {
            continue;
        }
        out.insert(branch.name.clone(), Value::Object(exp));
    }
    let trivial = out.len() == 1 && out.values().all(|v| v.as_object().is_some_and(|m| m.len() <= 1));
    if out.is_empty() || trivial {
        None
    } else {
        Some(Value::Object(out))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPullRequest {
    key: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    analysis_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestList {
    #[serde(default)]
    pull_requests: Vec<RawPullRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub project: String,
    pub key: String,
    pub title: Option<String>,
    pub last_analysis: Option<DateTime<Utc>>,
}

impl PullRequest {
    pub fn audit(&self, settings: &AuditSettings) -> Vec<Problem> {
        let max_age = settings.get_u64("audit.projects.pullRequests.maxLastAnalysisAge", 30);
        let Some(date) = self.last_analysis else {
            return Vec::new();
        };
        let age = age_in_days(date);
        if max_age == 0 || age <= max_age as i64 {
            return Vec::new();
        }
        let object = self.to_string();
        vec![Problem::from_rule(RuleId::PullRequestLastAnalysis, &[&object, &age]).with_object(object)]
    }
}

impl std::fmt::Display for PullRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pull request {} of project '{}'", self.key, self.project)
    }
}

/// Pull requests of a project; empty when the edition has none.
pub async fn pull_requests(platform: &Platform, project: &str) -> Result<Vec<PullRequest>> {
    let resp = platform
        .client()
        .get_soft("project_pull_requests/list", &[("project", project)])
        .await?;
    if !resp.status().is_success() {
        tracing::debug!("No pull requests for project '{}' ({})", project, resp.status());
        return Ok(Vec::new());
    }
    let list: PullRequestList = resp.json().await?;
    Ok(list
        .pull_requests
        .into_iter()
        .map(|pr| PullRequest {
            project: project.to_string(),
            key: pr.key,
            title: pr.title,
            last_analysis: pr.analysis_date.as_deref().and_then(parse_date),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn branch(name: &str, is_main: bool, keep: bool) -> Branch {
        Branch {
            project: "p".to_string(),
            name: name.to_string(),
            is_main,
            last_analysis: None,
            keep_when_inactive: keep,
        }
    }

    #[test]
    fn test_lone_main_branch_is_not_exported() {
        assert_eq!(export_all(&[branch("main", true, false)]), None);
    }

    #[test]
    fn test_export_keeps_main_among_others() {
        let exp = export_all(&[branch("main", true, false), branch("release", false, true)]).unwrap();
        assert_eq!(
            exp,
            json!({"main": {"isMain": true}, "release": {"keepWhenInactive": true}})
        );
    }

    #[test]
    fn test_stale_pull_request() {
        let pr = PullRequest {
            project: "p".to_string(),
            key: "12".to_string(),
            title: None,
            last_analysis: Some(Utc::now() - Duration::days(45)),
        };
        let problems = pr.audit(&AuditSettings::default());
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].rule, Some(RuleId::PullRequestLastAnalysis));
        let disabled = AuditSettings::default().with("audit.projects.pullRequests.maxLastAnalysisAge", "0");
        assert!(pr.audit(&disabled).is_empty());
    }
}
