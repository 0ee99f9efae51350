//! DevOps platform binding of a project.

use std::sync::Arc;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use super::Project;
use crate::client::{ParamsBuf, SonarClient};
use crate::error::{Result, SonarError};
use crate::models::devops::{self, AlmType};
use crate::util::str_field;

/// Binding of a project to a DevOps platform definition.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    /// Key of the DevOps platform definition.
    pub key: String,
    pub alm: AlmType,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub monorepo: bool,
    #[serde(default)]
    pub summary_comment_enabled: Option<bool>,
}

impl Binding {
    /// Identity of the bound repository, used to spot projects sharing one.
    ///
    /// Azure DevOps and Bitbucket Server repositories are only unique within
    /// their project, so the slug is part of the key.
    pub fn binding_key(&self) -> String {
        let repo = self.repository.as_deref().unwrap_or_default();
        match self.alm {
            AlmType::Azure | AlmType::Bitbucket => format!(
                "{}:::{}:::{}",
                self.key,
                repo,
                self.slug.as_deref().unwrap_or_default()
            ),
            _ => format!("{}:::{}", self.key, repo),
        }
    }
}

impl Project {
    /// Current binding, `None` when the project is not bound.
    pub async fn binding(&self) -> Result<Option<Arc<Binding>>> {
        self.binding
            .get_or_load(|| async {
                let platform = self.platform()?;
                let resp = platform
                    .client()
                    .get_soft("alm_settings/get_binding", &[("project", self.key.as_str())])
                    .await?;
                match resp.status() {
                    StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => Ok(None),
                    s if s.is_success() => Ok(Some(Arc::new(resp.json::<Binding>().await?))),
                    _ => {
                        SonarClient::check_response(resp).await?;
                        Ok(None)
                    }
                }
            })
            .await
    }

    pub async fn has_binding(&self) -> Result<bool> {
        Ok(self.binding().await?.is_some())
    }

    pub async fn is_part_of_monorepo(&self) -> Result<bool> {
        Ok(self.binding().await?.is_some_and(|b| b.monorepo))
    }

    /// Binding identity, see [`Binding::binding_key`].
    pub async fn binding_key(&self) -> Result<Option<String>> {
        Ok(self.binding().await?.map(|b| b.binding_key()))
    }

    /// Whether the platform reports the binding as working.
    pub async fn validate_binding(&self) -> Result<bool> {
        let resp = self
            .platform()?
            .client()
            .get_soft("alm_settings/validate_binding", &[("project", self.key.as_str())])
            .await?;
        Ok(resp.status().is_success())
    }

    /// Bind the project as described by an exported binding document.
    ///
    /// Returns `false` without changing anything when the referenced DevOps
    /// platform is not defined.
    #[tracing::instrument(skip(self, data), fields(project = %self.key))]
    pub async fn set_devops_binding(&self, data: &Value) -> Result<bool> {
        let platform = self.platform()?;
        let Some(alm_key) = str_field(data, "key") else {
            return Err(SonarError::InvalidData(format!("{self} binding has no DevOps platform key")));
        };
        let Some(alm) = devops::platform_type(&platform, alm_key).await? else {
            tracing::warn!("DevOps platform '{}' does not exist, can't set binding of {}", alm_key, self);
            return Ok(false);
        };
        let repository = str_field(data, "repository").unwrap_or_default();
        let monorepo = data.get("monorepo").and_then(Value::as_bool).unwrap_or(false);
        let mut params = ParamsBuf::new()
            .with("almSetting", alm_key)
            .with("project", self.key.as_str())
            .with("monorepo", monorepo.to_string());
        match alm {
            AlmType::Github => {
                let summary = data
                    .get("summaryCommentEnabled")
                    .or_else(|| data.get("summaryComment"))
                    .and_then(Value::as_bool)
                    .unwrap_or(true);
                params.push("repository", repository);
                params.push("summaryCommentEnabled", summary.to_string());
            }
            AlmType::Gitlab | AlmType::BitbucketCloud => params.push("repository", repository),
            AlmType::Bitbucket => {
                params.push("repository", repository);
                params.push("slug", str_field(data, "slug").unwrap_or_default());
            }
            AlmType::Azure => {
                params.push("projectName", str_field(data, "slug").unwrap_or_default());
                params.push("repositoryName", repository);
            }
        }
        tracing::info!("Binding {} to {} platform '{}'", self, alm, alm_key);
        platform
            .client()
            .post(&format!("alm_settings/set_{alm}_binding"), &params.as_params())
            .await?;
        self.binding.clear();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn binding(value: Value) -> Binding {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_binding_key_includes_slug_where_repos_are_scoped() {
        let gh = binding(json!({"key": "gh", "alm": "github", "repository": "org/repo"}));
        assert_eq!(gh.binding_key(), "gh:::org/repo");
        let bb = binding(json!({"key": "bbs", "alm": "bitbucket", "repository": "PRJ", "slug": "repo"}));
        assert_eq!(bb.binding_key(), "bbs:::PRJ:::repo");
        let az = binding(json!({"key": "ado", "alm": "azure", "repository": "repo", "slug": "proj"}));
        assert_eq!(az.binding_key(), "ado:::repo:::proj");
    }

    #[test]
    fn test_binding_defaults() {
        let b = binding(json!({"key": "gl", "alm": "gitlab"}));
        assert!(!b.monorepo);
        assert_eq!(b.summary_comment_enabled, None);
        assert_eq!(b.repository, None);
    }
}
