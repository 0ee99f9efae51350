//! Portfolios: hierarchies of sub-portfolios aggregating projects.
//!
//! Top-level portfolios (qualifier `VW`) exist on their own. Sub-portfolios
//! (qualifier `SVW`) only exist inside one hierarchy and never carry
//! permissions. A portfolio may also include another top-level portfolio
//! *by reference*; the referenced portfolio stays independent and is never
//! reconfigured through the portfolio that references it.

mod batch;
mod selection;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};

pub use batch::{audit_portfolios, export_portfolios, import_portfolios, recompute_all};
pub use selection::{Selection, SelectionMode};

use crate::audit::{AuditSettings, Problem, RuleId};
use crate::client::ParamsBuf;
use crate::error::{Result, SonarError};
use crate::models::permissions::{PermissionScope, PermissionSet};
use crate::models::{measures, task, KeyRef};
use crate::pagination::{Page, Paging, MAX_PAGE_SIZE};
use crate::platform::{Platform, PlatformRef, Version};
use crate::traits::{Audit, Get, List, Update};
use crate::util::{csv_to_list, filter_export, remove_nones, str_field, DEFAULT_BRANCH};

const SEARCH_API: &str = "views/search";
const SHOW_API: &str = "views/show";
const PORTFOLIO_QUALIFIER: &str = "VW";
const SUBPORTFOLIO_QUALIFIER: &str = "SVW";

/// Remote indexing lag after creating or attaching a sub-portfolio.
const COOLDOWN: Duration = Duration::from_millis(500);

pub const IMPORTABLE: [&str; 11] = [
    "key",
    "name",
    "description",
    selection::SELECTION_MODE,
    "visibility",
    selection::SELECTION_REGEXP,
    selection::SELECTION_BRANCH,
    selection::SELECTION_TAGS,
    "permissions",
    "subPortfolios",
    selection::PROJECTS,
];

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    components: Vec<Map<String, Value>>,
    #[serde(default)]
    paging: Paging,
}

/// A sub-portfolio link of a portfolio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubPortfolio {
    pub key: String,
    /// Whether this is another top-level portfolio included by reference.
    pub by_reference: bool,
}

#[derive(Debug, Default)]
struct PortfolioState {
    name: String,
    description: Option<String>,
    visibility: Option<String>,
    is_sub_portfolio: bool,
    selection: Selection,
    parent: Option<String>,
    sub_portfolios: BTreeMap<String, SubPortfolio>,
    json: Map<String, Value>,
}

/// A portfolio or sub-portfolio.
#[derive(Debug)]
pub struct Portfolio {
    key: String,
    permalink: String,
    platform: PlatformRef,
    state: RwLock<PortfolioState>,
}

impl std::fmt::Display for Portfolio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_sub_portfolio() {
            write!(f, "subportfolio '{}'", self.key)
        } else {
            write!(f, "portfolio '{}'", self.key)
        }
    }
}

fn is_sub_qualifier(data: &Map<String, Value>) -> bool {
    data.get("qualifier").and_then(Value::as_str) == Some(SUBPORTFOLIO_QUALIFIER)
}

impl Portfolio {
    fn build(platform: &Platform, key: &str, name: &str) -> Self {
        Self {
            key: key.to_string(),
            permalink: format!("{}/portfolio?id={}", platform.url(), key),
            platform: platform.downgrade(),
            state: RwLock::new(PortfolioState {
                name: name.to_string(),
                ..Default::default()
            }),
        }
    }

    /// Cached instance for `key`, registered from `data` if absent.
    fn from_data(platform: &Platform, data: &Map<String, Value>, version: Version) -> Option<Arc<Self>> {
        let key = data.get("key").and_then(Value::as_str)?;
        let name = data.get("name").and_then(Value::as_str).unwrap_or(key);
        let portfolio = platform.portfolios().get_or_insert_with(key, || Self::build(platform, key, name));
        portfolio.reload(data, version);
        Some(portfolio)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn name(&self) -> String {
        self.state.read().name.clone()
    }

    pub fn description(&self) -> Option<String> {
        self.state.read().description.clone()
    }

    pub fn visibility(&self) -> Option<String> {
        self.state.read().visibility.clone()
    }

    pub fn is_sub_portfolio(&self) -> bool {
        self.state.read().is_sub_portfolio
    }

    pub fn parent_key(&self) -> Option<String> {
        self.state.read().parent.clone()
    }

    pub fn url(&self) -> &str {
        &self.permalink
    }

    pub(crate) fn platform(&self) -> Result<Platform> {
        self.platform.upgrade()
    }

    /// Refresh the local state from a search or `views/show` entry.
    fn reload(&self, data: &Map<String, Value>, version: Version) {
        let mut state = self.state.write();
        if let Some(name) = data.get("name").and_then(Value::as_str) {
            state.name = name.to_string();
        }
        if let Some(desc) = data.get("desc").or_else(|| data.get("description")).and_then(Value::as_str) {
            state.description = (!desc.is_empty()).then(|| desc.to_string());
        }
        if let Some(visibility) = data.get("visibility").and_then(Value::as_str) {
            state.visibility = Some(visibility.to_string());
        }
        if data.contains_key("qualifier") {
            state.is_sub_portfolio = is_sub_qualifier(data);
        }
        if data.contains_key("selectionMode") {
            state.selection = Selection::from_snapshot(data, version);
        }
        if let Some(parent) = data.get("parentKey").or_else(|| data.get("parent")).and_then(Value::as_str) {
            state.parent = Some(parent.to_string());
        }
        let mut json = data.clone();
        json.remove("subViews");
        state.json = json;
    }

    /// Raw snapshot of the last read, without sub-portfolios.
    pub fn json(&self) -> Map<String, Value> {
        self.state.read().json.clone()
    }

    pub fn set_parent(&self, parent: &str) {
        let mut state = self.state.write();
        if parent != self.key {
            state.parent = Some(parent.to_string());
            state.is_sub_portfolio = true;
        }
    }

    /// Shared handle of this portfolio.
    fn shared(&self, platform: &Platform) -> Result<Arc<Portfolio>> {
        platform
            .portfolios()
            .get(&self.key)
            .ok_or_else(|| SonarError::not_found("Portfolio", self.key.clone()))
    }

    /// Top of the hierarchy, following parent links.
    ///
    /// # Errors
    ///
    /// [`SonarError::CyclicHierarchy`] if the parent chain loops.
    pub fn root_portfolio(&self) -> Result<Arc<Portfolio>> {
        let platform = self.platform()?;
        let mut visited = HashSet::new();
        let mut current = self.shared(&platform)?;
        loop {
            if !visited.insert(current.key.clone()) {
                return Err(SonarError::CyclicHierarchy(current.key.clone()));
            }
            let Some(parent_key) = current.parent_key() else {
                return Ok(current);
            };
            if parent_key == current.key {
                return Ok(current);
            }
            match platform.portfolios().get(&parent_key) {
                Some(parent) => current = parent,
                None => {
                    tracing::debug!("Parent '{}' of {} is not loaded, using it as root", parent_key, current);
                    return Ok(current);
                }
            }
        }
    }

    /// Search top-level portfolios and sub-portfolios, `params` are passed to
    /// `views/search`.
    pub async fn search(platform: &Platform, params: &[(&str, &str)]) -> Result<Vec<Arc<Portfolio>>> {
        if !platform.edition().await?.is_enterprise_or_above() {
            tracing::warn!("No portfolios in {} edition", platform.edition().await?);
            return Ok(Vec::new());
        }
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
    ) -> Result<Page<Arc<Portfolio>>> {
        let mut query = ParamsBuf::new()
            .with("ps", page_size.to_string())
            .with("p", page.to_string());
        for (k, v) in params {
            query.push(k, *v);
        }
        let version = platform.version().await?;
        let resp: SearchResponse = platform.client().get_json(SEARCH_API, &query.as_params()).await?;
        let items = resp
            .components
            .iter()
            .filter_map(|data| Self::from_data(platform, data, version))
            .collect();
        Ok(resp.paging.into_page(items, page, page_size))
    }

    async fn search_one(platform: &Platform, text: &str, field: &str) -> Result<Option<Map<String, Value>>> {
        let resp: SearchResponse = platform
            .client()
            .get_json(SEARCH_API, &[("q", text), ("ps", "500")])
            .await?;
        Ok(resp
            .components
            .into_iter()
            .find(|c| c.get(field).and_then(Value::as_str) == Some(text)))
    }

    /// Raw search entry of the portfolio with this exact key.
    pub async fn search_by_key(platform: &Platform, key: &str) -> Result<Option<Map<String, Value>>> {
        Self::search_one(platform, key, "key").await
    }

    /// Raw search entry of the portfolio with this exact name.
    pub async fn search_by_name(platform: &Platform, name: &str) -> Result<Option<Map<String, Value>>> {
        Self::search_one(platform, name, "name").await
    }

    /// Cached portfolio, or registered from a key search without reading its
    /// hierarchy.
    async fn lookup(platform: &Platform, key: &str) -> Result<Arc<Portfolio>> {
        if let Some(p) = platform.portfolios().get(key) {
            return Ok(p);
        }
        let data = Self::search_by_key(platform, key)
            .await?
            .ok_or_else(|| SonarError::not_found("Portfolio", key))?;
        let version = platform.version().await?;
        Self::from_data(platform, &data, version).ok_or_else(|| SonarError::not_found("Portfolio", key))
    }

    /// All portfolios, or the portfolios with the given keys.
    pub async fn get_list(platform: &Platform, keys: Option<&[String]>) -> Result<Vec<Arc<Portfolio>>> {
        match keys {
            Some(keys) if !keys.is_empty() => {
                let mut out = Vec::with_capacity(keys.len());
                for key in keys {
                    out.push(Self::get(platform, key.clone()).await?);
                }
                Ok(out)
            }
            _ => {
                tracing::info!("Listing portfolios");
                Self::search(platform, &[]).await
            }
        }
    }

    pub async fn count(platform: &Platform) -> Result<u64> {
        let resp: SearchResponse = platform.client().get_json(SEARCH_API, &[("ps", "1")]).await?;
        Ok(resp.paging.total)
    }

    pub async fn exists(platform: &Platform, key: &str) -> Result<bool> {
        match Self::lookup(platform, key).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create a portfolio, or a sub-portfolio when `parent` is given.
    #[tracing::instrument(skip(platform, data))]
    pub async fn create(
        platform: &Platform,
        key: &str,
        name: &str,
        parent: Option<&str>,
        data: &Value,
    ) -> Result<Arc<Portfolio>> {
        tracing::debug!("Creating portfolio name '{}', key '{}', parent {:?}", name, key, parent);
        let params = ParamsBuf::new()
            .with("key", key)
            .with("name", name)
            .with_opt("description", str_field(data, "description"))
            .with_opt("visibility", str_field(data, "visibility"))
            .with_opt("parent", parent);
        platform.client().post("views/create", &params.as_params()).await?;
        let portfolio = platform.portfolios().get_or_insert_with(key, || Self::build(platform, key, name));
        {
            let mut state = portfolio.state.write();
            state.description = str_field(data, "description").map(String::from);
            state.visibility = str_field(data, "visibility").map(String::from);
        }
        if let Some(parent) = parent {
            portfolio.set_parent(parent);
        }
        Ok(portfolio)
    }

    /// Re-read the whole hierarchy this portfolio belongs to.
    pub async fn refresh(&self) -> Result<()> {
        let platform = self.platform()?;
        let root = self.root_portfolio()?;
        tracing::debug!("Refreshing {} from root {}", self, root);
        let data: Map<String, Value> = platform.client().get_json(SHOW_API, &[("key", root.key())]).await?;
        let version = platform.version().await?;
        root.reload(&data, version);
        root.create_sub_portfolios(&platform, &data, version);
        Ok(())
    }

    /// Register the sub-portfolios of a `views/show` snapshot, recursively.
    ///
    /// `VW` entries are references to other top-level portfolios and are only
    /// linked; `SVW` entries are owned and get this portfolio as parent.
    fn create_sub_portfolios(&self, platform: &Platform, data: &Map<String, Value>, version: Version) {
        let subs = data
            .get("subViews")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let mut links = BTreeMap::new();
        for sub in subs.iter().filter_map(Value::as_object) {
            let Some(raw_key) = sub.get("key").and_then(Value::as_str) else {
                continue;
            };
            let by_reference = sub.get("qualifier").and_then(Value::as_str) == Some(PORTFOLIO_QUALIFIER);
            if by_reference {
                let key = sub
                    .get("originalKey")
                    .and_then(Value::as_str)
                    .or_else(|| raw_key.rsplit(':').next())
                    .unwrap_or(raw_key);
                links.insert(
                    key.to_string(),
                    SubPortfolio {
                        key: key.to_string(),
                        by_reference: true,
                    },
                );
                continue;
            }
            let Some(child) = Self::from_data(platform, sub, version) else {
                continue;
            };
            child.set_parent(&self.key);
            child.create_sub_portfolios(platform, sub, version);
            links.insert(
                raw_key.to_string(),
                SubPortfolio {
                    key: raw_key.to_string(),
                    by_reference: false,
                },
            );
        }
        self.state.write().sub_portfolios = links;
    }

    /// Sub-portfolio links, as last read or changed.
    pub fn sub_portfolios(&self) -> Vec<SubPortfolio> {
        self.state.read().sub_portfolios.values().cloned().collect()
    }

    pub fn selection(&self) -> Selection {
        self.state.read().selection.clone()
    }

    pub fn selection_mode(&self) -> SelectionMode {
        self.state.read().selection.mode()
    }

    /// Selected projects and branches, only in manual mode.
    pub fn projects(&self) -> Option<BTreeMap<String, String>> {
        match &self.state.read().selection {
            Selection::Manual(projects) => Some(projects.clone()),
            _ => None,
        }
    }

    pub fn regexp(&self) -> Option<String> {
        match &self.state.read().selection {
            Selection::Regexp { regexp, .. } => Some(regexp.clone()),
            _ => None,
        }
    }

    pub fn tags(&self) -> Option<Vec<String>> {
        match &self.state.read().selection {
            Selection::Tags { tags, .. } => Some(tags.clone()),
            _ => None,
        }
    }

    fn set_selection_state(&self, selection: Selection) {
        self.state.write().selection = selection;
    }

    pub async fn set_manual_mode(&self) -> Result<()> {
        self.platform()?
            .client()
            .post("views/set_manual_mode", &[("portfolio", self.key.as_str())])
            .await?;
        self.set_selection_state(Selection::Manual(BTreeMap::new()));
        Ok(())
    }

    pub async fn set_tags_mode(&self, tags: &[String], branch: Option<&str>) -> Result<()> {
        let params = ParamsBuf::new()
            .with("portfolio", self.key.as_str())
            .with("tags", tags.join(","))
            .with_opt("branch", branch);
        self.platform()?
            .client()
            .post("views/set_tags_mode", &params.as_params())
            .await?;
        self.set_selection_state(Selection::Tags {
            tags: tags.to_vec(),
            branch: branch.map(String::from),
        });
        Ok(())
    }

    pub async fn set_regexp_mode(&self, regexp: &str, branch: Option<&str>) -> Result<()> {
        let params = ParamsBuf::new()
            .with("portfolio", self.key.as_str())
            .with("regexp", regexp)
            .with_opt("branch", branch);
        self.platform()?
            .client()
            .post("views/set_regexp_mode", &params.as_params())
            .await?;
        self.set_selection_state(Selection::Regexp {
            regexp: regexp.to_string(),
            branch: branch.map(String::from),
        });
        Ok(())
    }

    pub async fn set_remaining_projects_mode(&self, branch: Option<&str>) -> Result<()> {
        let params = ParamsBuf::new()
            .with("portfolio", self.key.as_str())
            .with_opt("branch", branch);
        self.platform()?
            .client()
            .post("views/set_remaining_projects_mode", &params.as_params())
            .await?;
        self.set_selection_state(Selection::Rest {
            branch: branch.map(String::from),
        });
        Ok(())
    }

    /// The none mode API changed in 9.1.
    pub async fn set_none_mode(&self) -> Result<()> {
        let platform = self.platform()?;
        if platform.version().await? < Version::new(9, 1, 0) {
            platform
                .client()
                .post("views/mode", &[("key", self.key.as_str()), ("selectionMode", "NONE")])
                .await?;
        } else {
            platform
                .client()
                .post("views/set_none_mode", &[("portfolio", self.key.as_str())])
                .await?;
        }
        self.set_selection_state(Selection::None);
        Ok(())
    }

    /// Switch to `selection`, adding the projects of a manual selection.
    pub async fn set_selection(&self, selection: &Selection) -> Result<()> {
        tracing::debug!("Setting selection mode {} for {}", selection.mode(), self);
        match selection {
            Selection::Manual(projects) => {
                self.set_manual_mode().await?;
                self.add_project_branches(projects).await
            }
            Selection::Tags { tags, branch } => self.set_tags_mode(tags, branch.as_deref()).await,
            Selection::Regexp { regexp, branch } => self.set_regexp_mode(regexp, branch.as_deref()).await,
            Selection::Rest { branch } => self.set_remaining_projects_mode(branch.as_deref()).await,
            Selection::None => self.set_none_mode().await,
        }
    }

    /// Add projects with their main branch.
    pub async fn add_projects(&self, projects: &[KeyRef<'_>]) -> Result<()> {
        let branches: BTreeMap<String, String> = projects
            .iter()
            .map(|p| (p.key().to_string(), DEFAULT_BRANCH.to_string()))
            .collect();
        self.add_project_branches(&branches).await
    }

    /// Add project branches, `project -> branches` where branches is a comma
    /// separated list or [`DEFAULT_BRANCH`].
    ///
    /// # Errors
    ///
    /// [`SonarError::NotFound`] if a project or branch does not exist.
    pub async fn add_project_branches(&self, branches: &BTreeMap<String, String>) -> Result<()> {
        let platform = self.platform()?;
        for (project, branch_list) in branches {
            let named: Vec<String> = csv_to_list(branch_list)
                .into_iter()
                .filter(|b| b != DEFAULT_BRANCH)
                .collect();
            let calls: Vec<(&str, ParamsBuf)> = if named.is_empty() {
                vec![(
                    "views/add_project",
                    ParamsBuf::new().with("key", self.key.as_str()).with("project", project.as_str()),
                )]
            } else {
                named
                    .iter()
                    .map(|b| {
                        (
                            "views/add_project_branch",
                            ParamsBuf::new()
                                .with("key", self.key.as_str())
                                .with("project", project.as_str())
                                .with("branch", b.as_str()),
                        )
                    })
                    .collect()
            };
            for (api, params) in calls {
                let resp = platform.client().post_soft(api, &params.as_params()).await?;
                if resp.status() == StatusCode::NOT_FOUND {
                    return Err(SonarError::not_found("Project or branch", format!("{project} ({branch_list})")));
                }
                crate::client::SonarClient::check_response(resp).await?;
            }
            let mut state = self.state.write();
            if let Selection::Manual(selected) = &mut state.selection {
                selected.insert(project.clone(), branch_list.clone());
            }
        }
        Ok(())
    }

    /// Attach a sub-portfolio, creating it first unless `by_reference`.
    #[tracing::instrument(skip(self), fields(portfolio = %self.key))]
    pub async fn add_subportfolio(&self, key: &str, name: &str, by_reference: bool) -> Result<()> {
        let platform = self.platform()?;
        tracing::debug!("Adding sub-portfolio '{}' to {}", key, self);
        if platform.version().await? >= Version::new(9, 3, 0) {
            if !by_reference && platform.portfolios().get(key).is_none() {
                Self::create(&platform, key, name, Some(&self.key), &Value::Null).await?;
            }
            if by_reference {
                platform
                    .client()
                    .post("views/add_portfolio", &[("portfolio", self.key.as_str()), ("reference", key)])
                    .await?;
            }
        } else if by_reference {
            platform
                .client()
                .post("views/add_local_view", &[("key", self.key.as_str()), ("ref_key", key)])
                .await?;
        } else {
            platform
                .client()
                .post("views/add_sub_view", &[("key", self.key.as_str()), ("name", name), ("subKey", key)])
                .await?;
            let child = platform.portfolios().get_or_insert_with(key, || Self::build(&platform, key, name));
            child.set_parent(&self.key);
        }
        self.state.write().sub_portfolios.insert(
            key.to_string(),
            SubPortfolio {
                key: key.to_string(),
                by_reference,
            },
        );
        if !by_reference {
            self.recompute().await?;
            tokio::time::sleep(COOLDOWN).await;
        }
        Ok(())
    }

    /// Ask the platform to recompute the hierarchy of this portfolio.
    pub async fn recompute(&self) -> Result<()> {
        let platform = self.platform()?;
        let key = self.root_portfolio()?.key.clone();
        tracing::debug!("Recomputing portfolio '{}'", key);
        platform.client().post("views/refresh", &[("key", key.as_str())]).await?;
        Ok(())
    }

    pub async fn delete(&self) -> Result<()> {
        let platform = self.platform()?;
        tracing::info!("Deleting {}", self);
        platform.client().post("views/delete", &[("key", self.key.as_str())]).await?;
        platform.portfolios().remove(&self.key);
        Ok(())
    }

    /// Permissions of a top-level portfolio, `None` for a sub-portfolio.
    pub async fn permissions(&self) -> Result<Option<PermissionSet>> {
        if self.is_sub_portfolio() {
            return Ok(None);
        }
        let perms = PermissionSet::fetch(&self.platform()?, PermissionScope::Portfolio(&self.key)).await?;
        Ok(Some(perms))
    }

    pub async fn set_permissions(&self, desired: &Value) -> Result<()> {
        if self.is_sub_portfolio() {
            return Ok(());
        }
        PermissionSet::from_json(desired)
            .apply(&self.platform()?, PermissionScope::Portfolio(&self.key))
            .await
    }

    /// Nested export of a sub-portfolio tree, as found under `subPortfolios`.
    pub fn to_json(&self, platform: &Platform) -> Value {
        let state = self.state.read();
        let mut json = Map::new();
        json.insert("name".to_string(), Value::String(state.name.clone()));
        if let Some(desc) = &state.description {
            json.insert("description".to_string(), Value::String(desc.clone()));
        }
        json.extend(state.selection.to_export());
        let subs = Self::sub_portfolios_json(platform, &state.sub_portfolios);
        if !subs.is_empty() {
            json.insert("subPortfolios".to_string(), Value::Object(subs));
        }
        Value::Object(json)
    }

    fn sub_portfolios_json(platform: &Platform, subs: &BTreeMap<String, SubPortfolio>) -> Map<String, Value> {
        subs.values()
            .filter_map(|sub| {
                let child = platform.portfolios().get(&sub.key);
                let json = if sub.by_reference {
                    let mut json = Map::new();
                    if let Some(child) = &child {
                        json.insert("name".to_string(), Value::String(child.name()));
                    }
                    json.insert("byReference".to_string(), Value::Bool(true));
                    Value::Object(json)
                } else {
                    child?.to_json(platform)
                };
                Some((sub.key.clone(), json))
            })
            .collect()
    }

    /// Export the portfolio configuration.
    ///
    /// # Errors
    ///
    /// [`SonarError::UnsupportedOperation`] on editions without portfolios.
    #[tracing::instrument(skip(self), fields(portfolio = %self.key))]
    pub async fn export(&self, full: bool) -> Result<Value> {
        let platform = self.platform()?;
        check_portfolios_supported(&platform).await?;
        tracing::info!("Exporting {}", self);
        self.refresh().await?;
        let mut json = self.json();
        json.insert("key".to_string(), Value::String(self.key.clone()));
        json.insert("name".to_string(), Value::String(self.name()));
        json.insert(
            "description".to_string(),
            self.description().map_or(Value::Null, Value::String),
        );
        json.insert("visibility".to_string(), self.visibility().map_or(Value::Null, Value::String));
        json.extend(self.selection().to_export());
        if let Some(perms) = self.permissions().await? {
            if !perms.is_empty() {
                json.insert("permissions".to_string(), perms.to_json());
            }
        }
        let subs = Self::sub_portfolios_json(&platform, &self.state.read().sub_portfolios);
        if !subs.is_empty() {
            json.insert("subPortfolios".to_string(), Value::Object(subs));
        }
        Ok(Value::Object(remove_nones(filter_export(json, &IMPORTABLE, full))))
    }

    /// Apply a portfolio document, recursing into `subPortfolios`.
    ///
    /// A node marked `byReference` keeps its own configuration; only the
    /// link to the parent is created.
    fn update_tree<'a>(&'a self, data: &'a Value) -> BoxFuture<'a, Result<()>> {
        async move {
            let platform = self.platform()?;
            if data.get("byReference").and_then(Value::as_bool).unwrap_or(false) {
                tracing::debug!("Skipping setting {} details, it's a reference", self);
            } else {
                if let Some(perms) = data.get("permissions") {
                    self.set_permissions(perms).await?;
                }
                let selection = Selection::from_doc(data)?;
                // fails early on a cyclic hierarchy
                self.root_portfolio()?;
                self.set_selection(&selection).await?;
            }

            let Some(subs) = data.get("subPortfolios").and_then(Value::as_object) else {
                return Ok(());
            };
            for (key, sub) in subs {
                let linked = self.state.read().sub_portfolios.contains_key(key);
                let name = str_field(sub, "name").unwrap_or(key);
                if sub.get("byReference").and_then(Value::as_bool).unwrap_or(false) {
                    let referenced = Self::get(&platform, key.clone()).await?;
                    if !linked {
                        self.add_subportfolio(key, &referenced.name(), true).await?;
                    }
                    referenced.update_tree(sub).await?;
                } else {
                    let child = match Self::lookup(&platform, key).await {
                        Ok(child) => child,
                        Err(e) if e.is_not_found() => {
                            tracing::info!("{}: creating sub-portfolio '{}'", self, key);
                            self.add_subportfolio(key, name, false).await?;
                            Self::lookup(&platform, key).await?
                        }
                        Err(e) => return Err(e),
                    };
                    child.set_parent(&self.key);
                    if !linked {
                        self.state.write().sub_portfolios.insert(
                            key.clone(),
                            SubPortfolio {
                                key: key.clone(),
                                by_reference: false,
                            },
                        );
                    }
                    child.update_tree(sub).await?;
                }
            }
            Ok(())
        }
        .boxed()
    }

    /// Number of projects aggregated by the portfolio.
    pub async fn nbr_projects(&self) -> Result<u64> {
        measures::get_count(&self.platform()?, &self.key, "projects", None).await
    }
}

/// Portfolios only exist on enterprise editions of self-hosted platforms.
pub(crate) async fn check_portfolios_supported(platform: &Platform) -> Result<()> {
    if platform.is_sonarcloud() {
        return Err(SonarError::UnsupportedOperation(
            "Portfolios do not exist in SonarCloud".to_string(),
        ));
    }
    let edition = platform.edition().await?;
    if !edition.is_enterprise_or_above() {
        return Err(SonarError::UnsupportedOperation(format!(
            "Portfolios do not exist in {edition} edition"
        )));
    }
    Ok(())
}

#[async_trait]
impl Get for Portfolio {
    type Id = String;

    /// Cached portfolio; a top-level portfolio read for the first time also
    /// gets its hierarchy loaded.
    async fn get(platform: &Platform, key: String) -> Result<Arc<Self>> {
        if let Some(p) = platform.portfolios().get(&key) {
            return Ok(p);
        }
        let portfolio = Self::lookup(platform, &key).await?;
        if !portfolio.is_sub_portfolio() {
            portfolio.refresh().await?;
        }
        Ok(portfolio)
    }
}

/// Filter for [`Portfolio`] listing.
#[derive(Debug, Clone, Default)]
pub struct PortfolioQuery {
    /// Free text search on key and name.
    pub q: Option<String>,
}

#[async_trait]
impl List for Portfolio {
    type Query = PortfolioQuery;

    async fn list_page(
        platform: &Platform,
        query: &Self::Query,
        page: u32,
        count: u32,
    ) -> Result<Page<Arc<Self>>> {
        let params: Vec<(&str, &str)> = query.q.iter().map(|q| ("q", q.as_str())).collect();
        Self::search_page(platform, &params, page, count.min(MAX_PAGE_SIZE)).await
    }
}

#[async_trait]
impl Update for Portfolio {
    type Params = Value;

    async fn update(&self, data: &Value) -> Result<()> {
        tracing::debug!("Updating {}", self);
        self.update_tree(data).await
    }
}

#[async_trait]
impl Audit for Portfolio {
    async fn audit(&self, settings: &AuditSettings) -> Result<Vec<Problem>> {
        tracing::info!("Auditing {}", self);
        let mut problems = Vec::new();
        let audit_empty = settings.get_bool("audit.portfolios.empty", true);
        let audit_singleton = settings.get_bool("audit.portfolios.singleton", true);
        if audit_empty || audit_singleton {
            match self.nbr_projects().await? {
                0 if audit_empty => {
                    problems.push(Problem::from_rule(RuleId::PortfolioEmpty, &[&self]).with_object(self.url()));
                }
                1 if audit_singleton => {
                    problems.push(Problem::from_rule(RuleId::PortfolioSingleton, &[&self]).with_object(self.url()));
                }
                _ => {}
            }
        }
        let object = self.to_string();
        let tasks = task::audit_last_task(&self.platform()?, &self.key, &object, settings).await?;
        problems.extend(tasks.into_iter().map(|p| p.with_object(self.url())));
        Ok(problems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn platform() -> Platform {
        Platform::connect("http://localhost:9000", "token").unwrap()
    }

    fn snapshot() -> Map<String, Value> {
        json!({
            "key": "ALL",
            "name": "All",
            "qualifier": "VW",
            "selectionMode": "NONE",
            "subViews": [
                {
                    "key": "TEAM_A",
                    "name": "Team A",
                    "qualifier": "SVW",
                    "selectionMode": "REGEXP",
                    "regexp": "^a-.*",
                    "subViews": [
                        {"key": "TEAM_A_WEB", "name": "Web", "qualifier": "SVW", "selectionMode": "NONE"}
                    ]
                },
                {"key": "ALL:OTHER", "originalKey": "OTHER", "name": "Other", "qualifier": "VW"}
            ]
        })
        .as_object()
        .unwrap()
        .clone()
    }

    #[test]
    fn test_create_sub_portfolios_links_owned_and_referenced() {
        let platform = platform();
        let data = snapshot();
        let version = Version::new(9, 9, 0);
        let root = Portfolio::from_data(&platform, &data, version).unwrap();
        root.create_sub_portfolios(&platform, &data, version);

        let subs = root.sub_portfolios();
        assert_eq!(subs.len(), 2);
        assert!(subs.contains(&SubPortfolio {
            key: "TEAM_A".to_string(),
            by_reference: false
        }));
        assert!(subs.contains(&SubPortfolio {
            key: "OTHER".to_string(),
            by_reference: true
        }));
        // references are linked, not registered as children
        assert!(platform.portfolios().get("OTHER").is_none());

        let web = platform.portfolios().get("TEAM_A_WEB").unwrap();
        assert!(web.is_sub_portfolio());
        assert_eq!(web.root_portfolio().unwrap().key(), "ALL");
        assert_eq!(platform.portfolios().get("TEAM_A").unwrap().regexp().as_deref(), Some("^a-.*"));
    }

    #[test]
    fn test_cyclic_parents_are_reported() {
        let platform = platform();
        let version = Version::new(9, 9, 0);
        let a = Portfolio::from_data(&platform, json!({"key": "A", "parentKey": "B"}).as_object().unwrap(), version)
            .unwrap();
        Portfolio::from_data(&platform, json!({"key": "B", "parentKey": "A"}).as_object().unwrap(), version).unwrap();
        assert!(matches!(a.root_portfolio(), Err(SonarError::CyclicHierarchy(_))));
    }

    #[test]
    fn test_nested_export_marks_references() {
        let platform = platform();
        let data = snapshot();
        let version = Version::new(9, 9, 0);
        let root = Portfolio::from_data(&platform, &data, version).unwrap();
        root.create_sub_portfolios(&platform, &data, version);
        let json = root.to_json(&platform);
        assert_eq!(json["subPortfolios"]["OTHER"], json!({"byReference": true}));
        assert_eq!(json["subPortfolios"]["TEAM_A"]["projectSelectionMode"], "REGEXP");
        assert_eq!(
            json["subPortfolios"]["TEAM_A"]["subPortfolios"]["TEAM_A_WEB"],
            json!({"name": "Web", "projectSelectionMode": "NONE"})
        );
    }
}
