//! Quality gate and quality profile lookups, referenced by name.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::client::ParamsBuf;
use crate::error::Result;
use crate::platform::Platform;

/// Quality gate associated with a project.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GateAssociation {
    pub name: String,
    #[serde(default)]
    pub default: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GateByProject {
    quality_gate: GateAssociation,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GateSummary {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GateList {
    #[serde(default)]
    qualitygates: Vec<GateSummary>,
}

pub async fn project_gate(platform: &Platform, project: &str) -> Result<GateAssociation> {
    let resp: GateByProject = platform
        .client()
        .get_json("qualitygates/get_by_project", &[("project", project)])
        .await?;
    Ok(resp.quality_gate)
}

pub async fn gate_exists(platform: &Platform, name: &str) -> Result<bool> {
    let resp: GateList = platform.client().get_json("qualitygates/list", &[]).await?;
    Ok(resp.qualitygates.iter().any(|g| g.name == name))
}

/// Associate a project with a gate; returns `false` if the gate doesn't exist.
pub async fn select_gate(platform: &Platform, project: &str, gate: &str) -> Result<bool> {
    if !gate_exists(platform, gate).await? {
        tracing::warn!("Quality gate '{}' not found, can't set it on {}", gate, project);
        return Ok(false);
    }
    platform
        .client()
        .post("qualitygates/select", &[("gateName", gate), ("projectKey", project)])
        .await?;
    Ok(true)
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityProfile {
    pub key: String,
    pub name: String,
    pub language: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Deserialize)]
struct ProfileList {
    #[serde(default)]
    profiles: Vec<QualityProfile>,
}

pub async fn profiles(platform: &Platform, project: Option<&str>) -> Result<Vec<QualityProfile>> {
    let params = ParamsBuf::new().with_opt("project", project);
    let resp: ProfileList = platform
        .client()
        .get_json("qualityprofiles/search", &params.as_params())
        .await?;
    Ok(resp.profiles)
}

/// Non default profiles used by a project, by language.
pub async fn project_profiles(platform: &Platform, project: &str) -> Result<BTreeMap<String, String>> {
    Ok(profiles(platform, Some(project))
        .await?
        .into_iter()
        .filter(|p| !p.is_default)
        .map(|p| (p.language, p.name))
        .collect())
}

pub async fn profile_exists(platform: &Platform, language: &str, name: &str) -> Result<bool> {
    Ok(profiles(platform, None)
        .await?
        .iter()
        .any(|p| p.language == language && p.name == name))
}

/// Associate a project with a profile; returns `false` if the profile doesn't exist.
pub async fn add_project(platform: &Platform, project: &str, language: &str, profile: &str) -> Result<bool> {
    if !profile_exists(platform, language, profile).await? {
        tracing::warn!(
            "Quality profile '{}' of language '{}' not found, can't set it on {}",
            profile,
            language,
            project
        );
        return Ok(false);
    }
    let params = [
        ("language", language),
        ("qualityProfile", profile),
        ("project", project),
    ];
    platform.client().post("qualityprofiles/add_project", &params).await?;
    Ok(true)
}
