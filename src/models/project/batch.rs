//! Operations over many projects at once.
//!
//! Each project is handled by its own future, with at most `threads` of them
//! in flight. One project failing is logged and does not stop the batch.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde_json::{json, Map, Value};

use super::{ExportStatus, Project};
use crate::audit::{AuditSettings, Problem, RuleId};
use crate::error::Result;
use crate::platform::{Edition, Platform};
use crate::traits::Audit;

/// Audit the given projects, or all projects, including the cross project
/// duplicate checks.
#[tracing::instrument(skip_all)]
pub async fn audit_projects(
    platform: &Platform,
    settings: &AuditSettings,
    keys: Option<&[String]>,
) -> Result<Vec<Problem>> {
    if !settings.get_bool("audit.projects", true) {
        tracing::info!("Auditing projects is disabled, skipping...");
        return Ok(Vec::new());
    }
    let projects = Project::get_list(platform, keys).await?;
    tracing::info!("Auditing {} projects with {} threads", projects.len(), settings.threads());
    let results: Vec<(String, Result<Vec<Problem>>)> = stream::iter(projects.iter().cloned())
        .map(|project| async move {
            let problems = project.audit(settings).await;
            (project.key().to_string(), problems)
        })
        .buffer_unordered(settings.threads())
        .collect()
        .await;

    let mut problems = Vec::new();
    for (key, result) in results {
        match result {
            Ok(found) => problems.extend(found),
            Err(e) => tracing::error!("Audit of project '{}' failed: {}", key, e),
        }
    }
    problems.extend(audit_bindings(platform, settings, &projects).await?);
    problems.extend(audit_duplicates(settings, &projects));
    Ok(problems)
}

/// Projects bound to the same repository.
async fn audit_bindings(
    platform: &Platform,
    settings: &AuditSettings,
    projects: &[Arc<Project>],
) -> Result<Vec<Problem>> {
    if !settings.get_bool("audit.projects.bindings", true) || platform.edition().await? == Edition::Community {
        tracing::info!("Auditing of projects bindings is disabled or not applicable, skipping...");
        return Ok(Vec::new());
    }
    let mut bound = Vec::new();
    for project in projects {
        match project.is_part_of_monorepo().await {
            Ok(false) => {}
            Ok(true) => continue,
            Err(e) => {
                tracing::error!("Binding of project '{}' could not be read, skipped: {}", project.key(), e);
                continue;
            }
        }
        if let Ok(Some(binding_key)) = project.binding_key().await {
            bound.push((project.key().to_string(), binding_key));
        }
    }
    let by_key = index_by_key(projects);
    Ok(shared_binding_pairs(&bound)
        .into_iter()
        .filter_map(|(first, other)| {
            let first = by_key.get(first.as_str())?;
            let other = by_key.get(other.as_str())?;
            Some(Problem::from_rule(RuleId::ProjDuplicateBinding, &[first, other]).with_object(first.url()))
        })
        .collect())
}

/// Project key pairs sharing the same binding key, from `(project, binding)`
/// tuples. Pairs are ordered by project key.
fn shared_binding_pairs(bound: &[(String, String)]) -> Vec<(String, String)> {
    let mut by_binding: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (project, binding) in bound {
        by_binding.entry(binding.as_str()).or_default().push(project.as_str());
    }
    let mut pairs = Vec::new();
    for keys in by_binding.values_mut() {
        keys.sort_unstable();
        for (i, first) in keys.iter().enumerate() {
            for other in &keys[i + 1..] {
                pairs.push((first.to_string(), other.to_string()));
            }
        }
    }
    pairs
}

/// Project keys that extend another project key, a hint of duplicated
/// analyses.
fn audit_duplicates(settings: &AuditSettings, projects: &[Arc<Project>]) -> Vec<Problem> {
    if !settings.get_bool("audit.projects.duplicates", false) {
        return Vec::new();
    }
    let keys: Vec<&str> = projects.iter().map(|p| p.key()).collect();
    let by_key = index_by_key(projects);
    extended_key_pairs(&keys)
        .into_iter()
        .filter_map(|(prefix, extended)| {
            let project = by_key.get(extended.as_str())?;
            Some(Problem::from_rule(RuleId::ProjDuplicate, &[project, &prefix]).with_object(project.url()))
        })
        .collect()
}

/// `(prefix, extended)` pairs where a key starts with another key.
fn extended_key_pairs(keys: &[&str]) -> Vec<(String, String)> {
    let mut sorted = keys.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    let mut pairs = Vec::new();
    for (i, prefix) in sorted.iter().enumerate() {
        for other in &sorted[i + 1..] {
            if other.starts_with(prefix) {
                pairs.push((prefix.to_string(), other.to_string()));
            }
        }
    }
    pairs
}

fn index_by_key(projects: &[Arc<Project>]) -> HashMap<&str, &Arc<Project>> {
    projects.iter().map(|p| (p.key(), p)).collect()
}

/// Export projects as `key -> configuration`, without the redundant key.
#[tracing::instrument(skip_all)]
pub async fn export_projects(
    platform: &Platform,
    keys: Option<&[String]>,
    full: bool,
    threads: usize,
) -> Result<Map<String, Value>> {
    let projects = Project::get_list(platform, keys).await?;
    let total = projects.len();
    tracing::info!("Exporting {} projects with {} threads", total, threads);
    let mut exports = stream::iter(projects)
        .map(|project| async move {
            let exported = project.export(None, false, full).await;
            (project.key().to_string(), exported)
        })
        .buffer_unordered(threads.max(1));

    let mut out = Map::new();
    let mut done = 0;
    while let Some((key, result)) = exports.next().await {
        match result {
            Ok(Value::Object(mut json)) => {
                json.remove("key");
                out.insert(key, Value::Object(json));
            }
            Ok(other) => tracing::warn!("Unexpected export of project '{}': {}", key, other),
            Err(e) => tracing::error!("Export of project '{}' failed, skipped: {}", key, e),
        }
        done += 1;
        if done % 50 == 0 || done == total {
            tracing::info!("{}/{} projects exported", done, total);
        }
    }
    Ok(out)
}

/// Zip export the given projects, or all projects, and report the outcome of
/// each.
#[tracing::instrument(skip_all)]
pub async fn export_projects_zip(
    platform: &Platform,
    keys: Option<&[String]>,
    timeout: Duration,
    threads: usize,
) -> Result<Value> {
    let projects = Project::get_list(platform, keys).await?;
    let total = projects.len();
    tracing::info!("Zip exporting {} projects with {} threads", total, threads);
    let mut exports = stream::iter(projects)
        .map(|project| async move {
            let outcome = project.export_zip(timeout).await;
            (project.key().to_string(), outcome)
        })
        .buffer_unordered(threads.max(1));

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut entries = Vec::with_capacity(total);
    while let Some((key, outcome)) = exports.next().await {
        let entry = match outcome {
            Ok(export) => {
                let mut entry = json!({"key": key, "status": export.status.to_string()});
                if let Some(file) = &export.file {
                    let name = file.rsplit('/').next().unwrap_or(file);
                    entry["file"] = Value::String(name.to_string());
                    entry["path"] = Value::String(file.clone());
                }
                entry
            }
            Err(e) => {
                tracing::error!("Zip export of project '{}' failed: {}", key, e);
                let status = match e.status_code() {
                    Some(code) => ExportStatus::HttpError(code).to_string(),
                    None => "ERROR".to_string(),
                };
                json!({"key": key, "status": status})
            }
        };
        let status = entry["status"].as_str().unwrap_or_default().to_string();
        *counts.entry(status).or_default() += 1;
        entries.push(entry);
        let summary: Vec<String> = counts.iter().map(|(s, n)| format!("{s}:{n}")).collect();
        tracing::info!("{}/{} exports ({})", entries.len(), total, summary.join(", "));
    }
    entries.sort_by(|a, b| a["key"].as_str().cmp(&b["key"].as_str()));

    Ok(json!({
        "platform": {
            "version": platform.version_string(2).await?,
            "plugins": platform.plugins().await?,
        },
        "project_exports": entries,
    }))
}

/// Create or update every project of a `projects` section.
#[tracing::instrument(skip_all)]
pub async fn import_projects(platform: &Platform, config: &Value, keys: Option<&[String]>) -> Result<()> {
    let Some(section) = config.as_object() else {
        tracing::info!("No projects to import");
        return Ok(());
    };
    let selected: Vec<(&String, &Value)> = section
        .iter()
        .filter(|(key, _)| keys.map_or(true, |k| k.contains(*key)))
        .collect();
    let total = selected.len();
    tracing::info!("Importing {} projects", total);
    for (i, (key, data)) in selected.into_iter().enumerate() {
        if let Err(e) = Project::create_or_update(platform, key, data).await {
            tracing::error!("Import of project '{}' failed, skipped: {}", key, e);
        }
        if (i + 1) % 20 == 0 || i + 1 == total {
            tracing::info!("{}/{} projects imported", i + 1, total);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bound(project: &str, binding: &str) -> (String, String) {
        (project.to_string(), binding.to_string())
    }

    fn pair(a: &str, b: &str) -> (String, String) {
        (a.to_string(), b.to_string())
    }

    #[test]
    fn test_shared_binding_pairs() {
        let pairs = shared_binding_pairs(&[
            bound("web-2", "gh:::acme/web"),
            bound("api", "gh:::acme/api"),
            bound("web-1", "gh:::acme/web"),
        ]);
        assert_eq!(pairs, vec![pair("web-1", "web-2")]);
    }

    #[test]
    fn test_three_projects_on_one_repository_give_every_pair() {
        let pairs = shared_binding_pairs(&[
            bound("c", "gl:::mono"),
            bound("a", "gl:::mono"),
            bound("b", "gl:::mono"),
        ]);
        assert_eq!(pairs, vec![pair("a", "b"), pair("a", "c"), pair("b", "c")]);
    }

    #[test]
    fn test_extended_key_pairs() {
        let pairs = extended_key_pairs(&["acme-web-v2", "acme-api", "acme-web", "billing"]);
        assert_eq!(pairs, vec![pair("acme-web", "acme-web-v2")]);
        assert!(extended_key_pairs(&["acme-web", "acme-web"]).is_empty());
    }
}
