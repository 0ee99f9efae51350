//! Projects: lookup, export and update.

mod audit;
mod batch;
mod binding;
mod dump;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use batch::{audit_projects, export_projects, export_projects_zip, import_projects};
pub use binding::Binding;
pub use dump::{ExportStatus, ZipExport};

use crate::client::ParamsBuf;
use crate::error::{Result, SonarError};
use crate::models::branch::{self, Branch, PullRequest};
use crate::models::permissions::{PermissionScope, PermissionSet};
use crate::models::settings::{self, NEW_CODE_PERIOD};
use crate::models::{measures, quality, webhook};
use crate::pagination::{Page, Paging, MAX_PAGE_SIZE};
use crate::platform::{Edition, Platform, PlatformRef, Version};
use crate::registry::Cached;
use crate::traits::{Get, List, Update};
use crate::util::{filter_export, list_to_csv, parse_date, remove_nones, str_field, value_to_list};

const SEARCH_API: &str = "projects/search";
const QUALIFIER: &str = "TRK";

/// Keys kept in a project export; others are dropped, or prefixed with `_`
/// on a full export.
pub const IMPORTABLE: [&str; 12] = [
    "key",
    "name",
    "binding",
    NEW_CODE_PERIOD,
    "qualityProfiles",
    "links",
    "permissions",
    "branches",
    "tags",
    "visibility",
    "qualityGate",
    "webhooks",
];

/// Keys applied by dedicated steps of [`Project::update`], not as settings.
const NOT_SETTINGS: [&str; 9] = [
    "key",
    "name",
    "permissions",
    "tags",
    "links",
    "qualityGate",
    "qualityProfiles",
    "binding",
    "branches",
];

/// Last analysis date, distinguishing "not loaded yet" from "never analyzed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnalysisDate {
    #[default]
    Undefined,
    Never,
    At(DateTime<Utc>),
}

impl AnalysisDate {
    fn from_raw(date: Option<&str>) -> Self {
        match date.and_then(parse_date) {
            Some(d) => AnalysisDate::At(d),
            None => AnalysisDate::Never,
        }
    }
}

/// A project as returned by `projects/search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectData {
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub visibility: String,
    #[serde(default)]
    pub last_analysis_date: Option<String>,
    #[serde(default)]
    pub revision: Option<String>,
    #[serde(default)]
    pub qualifier: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    components: Vec<ProjectData>,
    #[serde(default)]
    paging: Paging,
}

#[derive(Debug)]
struct ProjectState {
    name: String,
    visibility: String,
    last_analysis: AnalysisDate,
    revision: Option<String>,
    json: Map<String, Value>,
}

/// A project link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    #[serde(rename = "type", default = "custom_link_type")]
    pub link_type: String,
    #[serde(default)]
    pub name: Option<String>,
    pub url: String,
}

fn custom_link_type() -> String {
    "custom".to_string()
}

#[derive(Debug, Deserialize)]
struct LinksResponse {
    #[serde(default)]
    links: Vec<Link>,
}

/// A SonarQube project.
///
/// Instances are shared through the platform identity cache: looking up the
/// same key twice returns the same `Arc<Project>`.
#[derive(Debug)]
pub struct Project {
    key: String,
    permalink: String,
    platform: PlatformRef,
    state: RwLock<ProjectState>,
    branches: Cached<Arc<Vec<Branch>>>,
    pull_requests: Cached<Arc<Vec<PullRequest>>>,
    binding: Cached<Option<Arc<Binding>>>,
    ncloc: Cached<u64>,
    new_code: Cached<String>,
}

impl std::fmt::Display for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "project '{}'", self.key)
    }
}

impl Project {
    fn build(platform: &Platform, data: ProjectData) -> Self {
        let json = match serde_json::to_value(&data) {
            Ok(Value::Object(m)) => m,
            _ => Map::new(),
        };
        Self {
            permalink: format!("{}/dashboard?id={}", platform.url(), data.key),
            platform: platform.downgrade(),
            state: RwLock::new(ProjectState {
                name: data.name,
                visibility: data.visibility,
                last_analysis: AnalysisDate::from_raw(data.last_analysis_date.as_deref()),
                revision: data.revision,
                json: remove_nones(json),
            }),
            key: data.key,
            branches: Cached::new(),
            pull_requests: Cached::new(),
            binding: Cached::new(),
            ncloc: Cached::new(),
            new_code: Cached::new(),
        }
    }

    /// Cached instance for `data.key`, created from `data` if absent.
    fn from_data(platform: &Platform, data: ProjectData) -> Arc<Self> {
        let key = data.key.clone();
        platform.projects().get_or_insert_with(&key, || Self::build(platform, data))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn name(&self) -> String {
        self.state.read().name.clone()
    }

    pub fn visibility(&self) -> String {
        self.state.read().visibility.clone()
    }

    pub fn revision(&self) -> Option<String> {
        self.state.read().revision.clone()
    }

    /// Permalink to the project dashboard.
    pub fn url(&self) -> &str {
        &self.permalink
    }

    pub(crate) fn platform(&self) -> Result<Platform> {
        self.platform.upgrade()
    }

    async fn fetch(platform: &Platform, key: &str) -> Result<ProjectData> {
        let resp: SearchResponse = platform
            .client()
            .get_json(SEARCH_API, &[("projects", key), ("qualifiers", QUALIFIER)])
            .await?;
        resp.components
            .into_iter()
            .find(|c| c.key == key)
            .ok_or_else(|| SonarError::not_found("Project", key))
    }

    /// Re-read the project from the platform and drop the lazy caches.
    pub async fn refresh(&self) -> Result<()> {
        let platform = self.platform()?;
        let data = Self::fetch(&platform, &self.key).await?;
        let fresh = Self::build(&platform, data);
        *self.state.write() = fresh.state.into_inner();
        self.branches.clear();
        self.pull_requests.clear();
        self.binding.clear();
        self.ncloc.clear();
        self.new_code.clear();
        Ok(())
    }

    /// Raw snapshot of the last `projects/search` read.
    pub fn json(&self) -> Map<String, Value> {
        self.state.read().json.clone()
    }

    /// Search projects with extra `projects/search` parameters.
    pub async fn search(platform: &Platform, params: &[(&str, &str)]) -> Result<Vec<Arc<Project>>> {
        let mut out = Vec::new();
        let mut page = 1;
        loop {
            let result = Self::search_page(platform, params, page, MAX_PAGE_SIZE).await?;
            let has_more = result.has_more && !result.is_empty();
            out.extend(result);
            if !has_more {
                break;
            }
            page += 1;
        }
        Ok(out)
    }

    async fn search_page(
        platform: &Platform,
        params: &[(&str, &str)],
        page: u32,
        page_size: u32,
    ) -> Result<Page<Arc<Project>>> {
        let mut query = ParamsBuf::new()
            .with("qualifiers", QUALIFIER)
            .with("ps", page_size.to_string())
            .with("p", page.to_string());
        for (k, v) in params {
            query.push(k, *v);
        }
        let resp: SearchResponse = platform.client().get_json(SEARCH_API, &query.as_params()).await?;
        let items = resp
            .components
            .into_iter()
            .map(|data| Self::from_data(platform, data))
            .collect();
        Ok(resp.paging.into_page(items, page, page_size))
    }

    /// All projects, or the projects with the given keys.
    ///
    /// # Errors
    ///
    /// [`SonarError::NotFound`] if one of the keys does not exist.
    pub async fn get_list(platform: &Platform, keys: Option<&[String]>) -> Result<Vec<Arc<Project>>> {
        match keys {
            Some(keys) if !keys.is_empty() => {
                let mut out = Vec::with_capacity(keys.len());
                for key in keys {
                    out.push(Self::get(platform, key.clone()).await?);
                }
                Ok(out)
            }
            _ => {
                tracing::info!("Listing projects");
                Self::search(platform, &[]).await
            }
        }
    }

    pub async fn count(platform: &Platform) -> Result<u64> {
        let resp: SearchResponse = platform
            .client()
            .get_json(SEARCH_API, &[("qualifiers", QUALIFIER), ("ps", "1")])
            .await?;
        Ok(resp.paging.total)
    }

    pub async fn exists(platform: &Platform, key: &str) -> Result<bool> {
        match Self::get(platform, key.to_string()).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create a project, or return the existing one.
    ///
    /// `data` may carry `name` and `visibility`.
    #[tracing::instrument(skip(platform, data))]
    pub async fn create(platform: &Platform, key: &str, data: &Value) -> Result<Arc<Project>> {
        if Self::exists(platform, key).await? {
            tracing::info!("Project '{}' already exists, creation skipped", key);
            return Self::get(platform, key.to_string()).await;
        }
        tracing::info!("Creating project '{}'", key);
        let params = ParamsBuf::new()
            .with("project", key)
            .with("name", str_field(data, "name").unwrap_or(key))
            .with_opt("visibility", str_field(data, "visibility"));
        platform.client().post("projects/create", &params.as_params()).await?;
        let fetched = Self::fetch(platform, key).await?;
        Ok(Self::from_data(platform, fetched))
    }

    /// Create the project if needed, then apply `data` to it.
    pub async fn create_or_update(platform: &Platform, key: &str, data: &Value) -> Result<Arc<Project>> {
        let project = match Self::get(platform, key.to_string()).await {
            Ok(p) => p,
            Err(e) if e.is_not_found() => {
                tracing::debug!("Project key '{}' does not exist, creating...", key);
                Self::create(platform, key, data).await?
            }
            Err(e) => return Err(e),
        };
        project.update(data).await?;
        Ok(project)
    }

    /// Delete the project and evict it from the cache.
    pub async fn delete(&self) -> Result<()> {
        let platform = self.platform()?;
        tracing::info!("Deleting {}", self);
        platform
            .client()
            .post("projects/delete", &[("project", self.key.as_str())])
            .await?;
        platform.projects().remove(&self.key);
        Ok(())
    }

    /// Last analysis date of the project itself, reloading it if undefined.
    pub async fn last_analysis(&self) -> Result<Option<DateTime<Utc>>> {
        let current = self.state.read().last_analysis;
        let date = match current {
            AnalysisDate::Undefined => {
                self.refresh().await?;
                self.state.read().last_analysis
            }
            other => other,
        };
        Ok(match date {
            AnalysisDate::At(d) => Some(d),
            _ => None,
        })
    }

    /// Last analysis date over the project, its branches and pull requests.
    ///
    /// From 9.2 the project date already accounts for branches.
    pub async fn last_analysis_with_branches(&self) -> Result<Option<DateTime<Utc>>> {
        let own = self.last_analysis().await?;
        if self.platform()?.version().await? >= Version::new(9, 2, 0) {
            return Ok(own);
        }
        let branch_dates = self.branches().await?.iter().filter_map(|b| b.last_analysis).collect::<Vec<_>>();
        let pr_dates = self.pull_requests().await?.iter().filter_map(|p| p.last_analysis).collect::<Vec<_>>();
        Ok(own.into_iter().chain(branch_dates).chain(pr_dates).max())
    }

    pub async fn branches(&self) -> Result<Arc<Vec<Branch>>> {
        self.branches
            .get_or_load(|| async {
                let platform = self.platform()?;
                Ok(Arc::new(branch::list(&platform, &self.key).await?))
            })
            .await
    }

    pub async fn main_branch(&self) -> Result<Option<Branch>> {
        Ok(self.branches().await?.iter().find(|b| b.is_main).cloned())
    }

    pub async fn pull_requests(&self) -> Result<Arc<Vec<PullRequest>>> {
        self.pull_requests
            .get_or_load(|| async {
                let platform = self.platform()?;
                Ok(Arc::new(branch::pull_requests(&platform, &self.key).await?))
            })
            .await
    }

    /// Lines of code, the largest of the main branch, branches and pull
    /// requests on editions that have them.
    pub async fn ncloc(&self) -> Result<u64> {
        self.ncloc
            .get_or_load(|| async {
                let platform = self.platform()?;
                let mut ncloc = measures::get_count(&platform, &self.key, "ncloc", None).await?;
                if platform.edition().await? != Edition::Community {
                    for b in self.branches().await?.iter() {
                        ncloc = ncloc.max(b.ncloc(&platform).await?);
                    }
                    for pr in self.pull_requests().await?.iter() {
                        let values =
                            measures::get(&platform, &self.key, &["ncloc"], None, Some(&pr.key)).await?;
                        let pr_loc = values.get("ncloc").and_then(|v| v.parse().ok()).unwrap_or(0);
                        ncloc = ncloc.max(pr_loc);
                    }
                }
                Ok(ncloc)
            })
            .await
    }

    pub async fn tags(&self) -> Result<Vec<String>> {
        let platform = self.platform()?;
        let resp: Value = platform
            .client()
            .get_json("components/show", &[("component", self.key.as_str())])
            .await?;
        Ok(resp
            .pointer("/component/tags")
            .map(value_to_list)
            .unwrap_or_default())
    }

    /// Quality gate name and whether it is the platform default.
    pub async fn quality_gate(&self) -> Result<(String, bool)> {
        let gate = quality::project_gate(&self.platform()?, &self.key).await?;
        Ok((gate.name, gate.default))
    }

    /// Non default quality profiles, by language.
    pub async fn quality_profiles(&self) -> Result<BTreeMap<String, String>> {
        quality::project_profiles(&self.platform()?, &self.key).await
    }

    pub async fn links(&self) -> Result<Vec<Link>> {
        let platform = self.platform()?;
        let resp: LinksResponse = platform
            .client()
            .get_json("project_links/search", &[("projectKey", self.key.as_str())])
            .await?;
        Ok(resp.links)
    }

    pub async fn webhooks(&self) -> Result<Vec<webhook::Webhook>> {
        webhook::list(&self.platform()?, Some(&self.key)).await
    }

    pub async fn permissions(&self) -> Result<PermissionSet> {
        PermissionSet::fetch(&self.platform()?, PermissionScope::Project(&self.key)).await
    }

    /// Project specific new code period, empty when inherited.
    pub async fn new_code(&self) -> Result<String> {
        self.new_code
            .get_or_load(|| async { settings::get_new_code_period(&self.platform()?, Some(&self.key)).await })
            .await
    }

    fn export_binding(binding: &Binding) -> Value {
        let mut json = Map::new();
        json.insert("key".to_string(), Value::String(binding.key.clone()));
        if let Some(repo) = &binding.repository {
            json.insert("repository".to_string(), Value::String(repo.clone()));
        }
        if let Some(slug) = &binding.slug {
            json.insert("slug".to_string(), Value::String(slug.clone()));
        }
        if let Some(summary) = binding.summary_comment_enabled {
            json.insert("summaryCommentEnabled".to_string(), Value::Bool(summary));
        }
        if binding.monorepo {
            json.insert("monorepo".to_string(), Value::Bool(true));
        }
        Value::Object(json)
    }

    /// Export the project configuration, keeping only deviations from the
    /// platform defaults.
    ///
    /// `keys` restricts the exported settings; inherited settings are only
    /// exported with `include_inherited`.
    #[tracing::instrument(skip(self), fields(project = %self.key))]
    pub async fn export(&self, keys: Option<&[String]>, include_inherited: bool, full: bool) -> Result<Value> {
        tracing::info!("Exporting {}", self);
        let platform = self.platform()?;
        let mut json = self.json();
        json.insert("key".to_string(), Value::String(self.key.clone()));
        json.insert("name".to_string(), Value::String(self.name()));

        let binding = self.binding().await?;
        json.insert(
            "binding".to_string(),
            binding.as_deref().map_or(Value::Null, Self::export_binding),
        );
        let new_code = self.new_code().await?;
        if !new_code.is_empty() {
            json.insert(NEW_CODE_PERIOD.to_string(), Value::String(new_code));
        }
        let profiles = self.quality_profiles().await?;
        if !profiles.is_empty() {
            let profiles: Map<String, Value> = profiles.into_iter().map(|(l, n)| (l, Value::String(n))).collect();
            json.insert("qualityProfiles".to_string(), Value::Object(profiles));
        }
        let links = self.links().await?;
        if !links.is_empty() {
            json.insert("links".to_string(), serde_json::to_value(&links)?);
        }
        let perms = self.permissions().await?;
        if !perms.is_empty() {
            json.insert("permissions".to_string(), perms.to_json());
        }
        if let Some(branches) = branch::export_all(&self.branches().await?) {
            json.insert("branches".to_string(), branches);
        }
        let tags = self.tags().await?;
        if !tags.is_empty() {
            json.insert("tags".to_string(), Value::String(list_to_csv(&tags, ", ")));
        }
        json.insert("visibility".to_string(), Value::String(self.visibility()));
        let (gate, is_default) = self.quality_gate().await?;
        if !is_default {
            json.insert("qualityGate".to_string(), Value::String(gate));
        }
        if let Some(hooks) = webhook::export(&platform, Some(&self.key)).await? {
            json.insert("webhooks".to_string(), hooks);
        }

        let mut json = filter_export(json, &IMPORTABLE, full);
        let project_settings = settings::get_bulk(&platform, Some(&self.key), keys, false).await?;
        for setting in project_settings.into_values() {
            if include_inherited || !setting.inherited {
                json.insert(setting.key, setting.value);
            }
        }
        Ok(Value::Object(remove_nones(json)))
    }

    pub async fn set_permissions(&self, desired: &Value) -> Result<()> {
        PermissionSet::from_json(desired)
            .apply(&self.platform()?, PermissionScope::Project(&self.key))
            .await
    }

    /// Create the custom links of `desired` that don't exist yet.
    pub async fn set_links(&self, desired: &[Link]) -> Result<()> {
        let platform = self.platform()?;
        let current = self.links().await?;
        for link in desired.iter().filter(|l| l.link_type == "custom") {
            if current.iter().any(|c| c.name == link.name && c.url == link.url) {
                continue;
            }
            let params = ParamsBuf::new()
                .with("projectKey", self.key.as_str())
                .with("url", link.url.as_str())
                .with("name", link.name.clone().unwrap_or_else(|| link.url.clone()));
            platform.client().post("project_links/create", &params.as_params()).await?;
        }
        Ok(())
    }

    pub async fn set_tags(&self, tags: &[String]) -> Result<()> {
        if tags.is_empty() {
            return Ok(());
        }
        let csv = list_to_csv(tags, ",");
        self.platform()?
            .client()
            .post("project_tags/set", &[("project", self.key.as_str()), ("tags", csv.as_str())])
            .await?;
        Ok(())
    }

    pub async fn set_quality_gate(&self, gate: &str) -> Result<bool> {
        quality::select_gate(&self.platform()?, &self.key, gate).await
    }

    pub async fn set_quality_profile(&self, language: &str, profile: &str) -> Result<bool> {
        quality::add_project(&self.platform()?, &self.key, language, profile).await
    }

    pub async fn set_visibility(&self, visibility: &str) -> Result<()> {
        if self.visibility() == visibility {
            return Ok(());
        }
        self.platform()?
            .client()
            .post(
                "projects/update_visibility",
                &[("project", self.key.as_str()), ("visibility", visibility)],
            )
            .await?;
        self.state.write().visibility = visibility.to_string();
        Ok(())
    }

    /// Rename the main branch; returns `false` if there is none.
    pub async fn rename_main_branch(&self, new_name: &str) -> Result<bool> {
        let Some(main) = self.main_branch().await? else {
            tracing::warn!("No main branch to rename found for {}", self);
            return Ok(false);
        };
        main.rename(&self.platform()?, new_name).await?;
        self.branches.clear();
        Ok(true)
    }

    pub async fn set_webhooks(&self, desired: &Value) -> Result<()> {
        webhook::reconcile(&self.platform()?, desired, Some(&self.key)).await
    }

    /// Apply the generic part of a project document: settings, visibility,
    /// webhooks and new code period.
    pub async fn set_settings(&self, data: &Map<String, Value>) -> Result<()> {
        let platform = self.platform()?;
        for (key, value) in data {
            match key.as_str() {
                NEW_CODE_PERIOD => {}
                "webhooks" => self.set_webhooks(value).await?,
                "visibility" => {
                    if let Some(v) = value.as_str() {
                        self.set_visibility(v).await?;
                    }
                }
                _ => match settings::set_setting(&platform, key, value, Some(&self.key)).await {
                    Err(SonarError::ApiError { message, .. }) => {
                        tracing::warn!("Setting {} of {} could not be set, skipped: {}", key, self, message);
                    }
                    other => other?,
                },
            }
        }
        if let Some(new_code) = data.get(NEW_CODE_PERIOD).and_then(Value::as_str) {
            let (period_type, value) = settings::decode_new_code_period(new_code)?;
            settings::set_new_code_period(&platform, &period_type, value.as_deref(), Some(&self.key)).await?;
            self.new_code.clear();
        }
        Ok(())
    }
}

#[async_trait]
impl Get for Project {
    type Id = String;

    /// Cached project, read from the platform on first access.
    async fn get(platform: &Platform, key: String) -> Result<Arc<Self>> {
        if let Some(project) = platform.projects().get(&key) {
            return Ok(project);
        }
        let data = Self::fetch(platform, &key).await?;
        Ok(Self::from_data(platform, data))
    }
}

/// Filter for [`Project`] listing.
#[derive(Debug, Clone, Default)]
pub struct ProjectQuery {
    /// Free text search on key and name.
    pub q: Option<String>,
    /// Only projects analyzed before this date (`YYYY-MM-DD`).
    pub analyzed_before: Option<String>,
}

#[async_trait]
impl List for Project {
    type Query = ProjectQuery;

    async fn list_page(
        platform: &Platform,
        query: &Self::Query,
        page: u32,
        count: u32,
    ) -> Result<Page<Arc<Self>>> {
        let mut params: Vec<(&str, &str)> = Vec::new();
        if let Some(q) = &query.q {
            params.push(("q", q.as_str()));
        }
        if let Some(d) = &query.analyzed_before {
            params.push(("analyzedBefore", d.as_str()));
        }
        Self::search_page(platform, &params, page, count.min(MAX_PAGE_SIZE)).await
    }
}

#[async_trait]
impl Update for Project {
    type Params = Value;

    /// Apply a project document.
    ///
    /// Order: permissions, links, tags, quality gate, quality profiles, main
    /// branch rename, DevOps binding, then every other key as a setting.
    /// Keys starting with `_` are informational and skipped.
    async fn update(&self, data: &Value) -> Result<()> {
        let Some(doc) = data.as_object() else {
            return Err(SonarError::InvalidData(format!("{self} configuration is not an object")));
        };
        tracing::debug!("Updating {}", self);
        if let Some(perms) = doc.get("permissions") {
            self.set_permissions(perms).await?;
        }
        if let Some(links) = doc.get("links") {
            let links: Vec<Link> = serde_json::from_value(links.clone())?;
            self.set_links(&links).await?;
        }
        if let Some(tags) = doc.get("tags") {
            self.set_tags(&value_to_list(tags)).await?;
        }
        if let Some(gate) = doc.get("qualityGate").and_then(Value::as_str) {
            self.set_quality_gate(gate).await?;
        }
        if let Some(profiles) = doc.get("qualityProfiles").and_then(Value::as_object) {
            for (language, name) in profiles {
                if let Some(name) = name.as_str() {
                    self.set_quality_profile(language, name).await?;
                }
            }
        }
        if let Some(branches) = doc.get("branches").and_then(Value::as_object) {
            let main = branches
                .iter()
                .find(|(_, b)| b.get("isMain").and_then(Value::as_bool).unwrap_or(false));
            if let Some((name, _)) = main {
                self.rename_main_branch(name).await?;
            }
        }
        match doc.get("binding") {
            Some(binding) if !binding.is_null() => {
                self.set_devops_binding(binding).await?;
            }
            _ => tracing::debug!("{} has no devops binding, skipped", self),
        }
        let remaining: Map<String, Value> = doc
            .iter()
            .filter(|(k, _)| !k.starts_with('_') && !NOT_SETTINGS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.set_settings(&remaining).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_analysis_date_tri_state() {
        assert_eq!(AnalysisDate::default(), AnalysisDate::Undefined);
        assert_eq!(AnalysisDate::from_raw(None), AnalysisDate::Never);
        assert!(matches!(
            AnalysisDate::from_raw(Some("2022-03-18T15:01:47+0100")),
            AnalysisDate::At(_)
        ));
    }

    #[test]
    fn test_binding_export_strips_platform_fields() {
        let binding: Binding = serde_json::from_value(json!({
            "key": "gh", "alm": "github", "url": "https://api.github.com",
            "repository": "org/repo", "monorepo": false, "summaryCommentEnabled": true
        }))
        .unwrap();
        assert_eq!(
            Project::export_binding(&binding),
            json!({"key": "gh", "repository": "org/repo", "summaryCommentEnabled": true})
        );
    }

    #[test]
    fn test_link_type_defaults_to_custom() {
        let link: Link = serde_json::from_value(json!({"name": "ci", "url": "https://ci"})).unwrap();
        assert_eq!(link.link_type, "custom");
    }

    #[test]
    fn test_importable_covers_update_keys() {
        for key in NOT_SETTINGS {
            assert!(IMPORTABLE.contains(&key), "{key}");
        }
    }
}
