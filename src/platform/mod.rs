//! A connection to one SonarQube platform.
//!
//! [`Platform`] owns the connection identity, lazily caches server facts
//! (version, system info, server id) and holds the identity caches of the
//! projects and portfolios read through it.

mod audit;
mod version;

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use serde_json::{Map, Value};
use tokio::sync::OnceCell;

pub use version::{Edition, Version, VersionBand, LATEST, LTS};

use crate::client::SonarClient;
use crate::error::{Result, SonarError};
use crate::models::permissions::{PermissionScope, PermissionSet};
use crate::models::settings::{self, Setting, SettingCategory, NEW_CODE_PERIOD};
use crate::models::webhook::{self, Webhook};
use crate::models::{devops, permission_template, Portfolio, Project};
use crate::registry::ObjectCache;

/// A SonarQube platform.
///
/// Cheap to clone; clones share the same caches.
///
/// # Example
///
/// ```no_run
/// use sonar_config::Platform;
///
/// # async fn example() -> sonar_config::Result<()> {
/// let platform = Platform::from_env()?;
/// println!("Connected to SonarQube {}", platform.version().await?);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Platform {
    inner: Arc<Inner>,
}

struct Inner {
    client: SonarClient,
    version: OnceCell<Version>,
    sys_info: OnceCell<Value>,
    server_id: OnceCell<String>,
    global_permissions: OnceCell<PermissionSet>,
    projects: ObjectCache<Project>,
    portfolios: ObjectCache<Portfolio>,
}

/// Non-owning handle on a [`Platform`], held by the objects it caches.
#[derive(Clone)]
pub(crate) struct PlatformRef(Weak<Inner>);

impl PlatformRef {
    pub(crate) fn upgrade(&self) -> Result<Platform> {
        self.0
            .upgrade()
            .map(|inner| Platform { inner })
            .ok_or_else(|| SonarError::ConfigMissing("platform connection was dropped".to_string()))
    }
}

impl std::fmt::Debug for PlatformRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PlatformRef")
    }
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform")
            .field("client", &self.inner.client)
            .field("version", &self.inner.version.get())
            .finish_non_exhaustive()
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.inner.client, f)
    }
}

impl Platform {
    pub fn new(client: SonarClient) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                version: OnceCell::new(),
                sys_info: OnceCell::new(),
                server_id: OnceCell::new(),
                global_permissions: OnceCell::new(),
                projects: ObjectCache::new(),
                portfolios: ObjectCache::new(),
            }),
        }
    }

    /// Connect with an explicit URL and token.
    pub fn connect(url: &str, token: &str) -> Result<Self> {
        Ok(Self::new(SonarClient::new(token, url)?))
    }

    /// Connect using `SONAR_HOST_URL` and `SONAR_TOKEN`.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(SonarClient::from_env()?))
    }

    pub fn client(&self) -> &SonarClient {
        &self.inner.client
    }

    pub fn url(&self) -> &str {
        self.inner.client.url()
    }

    pub(crate) fn downgrade(&self) -> PlatformRef {
        PlatformRef(Arc::downgrade(&self.inner))
    }

    pub(crate) fn projects(&self) -> &ObjectCache<Project> {
        &self.inner.projects
    }

    pub(crate) fn portfolios(&self) -> &ObjectCache<Portfolio> {
        &self.inner.portfolios
    }

    /// Server version, fetched once.
    pub async fn version(&self) -> Result<Version> {
        let version = self
            .inner
            .version
            .get_or_try_init(|| async {
                let text = self.client().get("server/version", &[]).await?.text().await?;
                text.parse::<Version>()
            })
            .await?;
        Ok(*version)
    }

    /// Version as a string of `digits` components, e.g. `9.9`.
    pub async fn version_string(&self, digits: usize) -> Result<String> {
        Ok(self.version().await?.to_string_digits(digits))
    }

    /// Raw `system/info` document, fetched once.
    pub async fn sys_info(&self) -> Result<&Value> {
        self.inner
            .sys_info
            .get_or_try_init(|| async { self.client().get_json::<Value>("system/info", &[]).await })
            .await
    }

    pub async fn server_id(&self) -> Result<String> {
        let id = self
            .inner
            .server_id
            .get_or_try_init(|| async {
                let cached = self
                    .inner
                    .sys_info
                    .get()
                    .and_then(|info| info.pointer("/System/Server ID"))
                    .and_then(Value::as_str);
                if let Some(id) = cached {
                    return Ok(id.to_string());
                }
                let status: Value = self.client().get_json("system/status", &[]).await?;
                status
                    .get("id")
                    .and_then(Value::as_str)
                    .map(String::from)
                    .ok_or_else(|| SonarError::InvalidData("system/status has no id".to_string()))
            })
            .await?;
        Ok(id.clone())
    }

    pub async fn edition(&self) -> Result<Edition> {
        let info = self.sys_info().await?;
        info.pointer("/Statistics/edition")
            .or_else(|| info.pointer("/System/Edition"))
            .and_then(Value::as_str)
            .ok_or_else(|| SonarError::InvalidData("system info has no edition".to_string()))?
            .parse()
    }

    pub async fn database(&self) -> Result<String> {
        let info = self.sys_info().await?;
        Ok(info
            .pointer("/Statistics/database/name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    pub async fn plugins(&self) -> Result<Value> {
        let info = self.sys_info().await?;
        Ok(info
            .pointer("/Statistics/plugins")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new())))
    }

    pub fn is_sonarcloud(&self) -> bool {
        self.url().contains("sonarcloud.io")
    }

    /// Version, edition and server id.
    pub async fn basics(&self) -> Result<Value> {
        let mut json = Map::new();
        json.insert("version".to_string(), Value::String(self.version_string(3).await?));
        json.insert("edition".to_string(), Value::String(self.edition().await?.to_string()));
        json.insert("serverId".to_string(), Value::String(self.server_id().await?));
        Ok(Value::Object(json))
    }

    /// Global permissions, read once.
    pub async fn global_permissions(&self) -> Result<&PermissionSet> {
        self.inner
            .global_permissions
            .get_or_try_init(|| PermissionSet::fetch(self, PermissionScope::Global))
            .await
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<Value>> {
        Ok(settings::get_one(self, key, None).await?.map(|s| s.value))
    }

    pub async fn set_setting(&self, key: &str, value: &Value) -> Result<()> {
        settings::set_setting(self, key, value, None).await
    }

    pub async fn reset_setting(&self, key: &str) -> Result<()> {
        settings::reset_setting(self, key, None).await
    }

    /// Global settings, all of them or only `keys`.
    pub async fn settings(
        &self,
        keys: Option<&[String]>,
        include_not_set: bool,
    ) -> Result<BTreeMap<String, Setting>> {
        tracing::info!("Getting global settings");
        settings::get_bulk(self, None, keys, include_not_set).await
    }

    pub async fn webhooks(&self) -> Result<Vec<Webhook>> {
        webhook::list(self, None).await
    }

    /// Global configuration: settings by section, webhooks, new code period,
    /// permissions, permission templates and DevOps platforms.
    #[tracing::instrument(skip(self))]
    pub async fn export(&self) -> Result<Value> {
        tracing::info!("Exporting platform global settings");
        let mut json = Map::new();
        for setting in self.settings(None, true).await?.into_values() {
            let (category, sub) = setting.category();
            let section = object_entry(&mut json, category.as_str());
            let target = match sub {
                Some(sub) => object_entry(section, &sub),
                None => section,
            };
            target.insert(setting.key, setting.value);
        }

        let general = object_entry(&mut json, SettingCategory::GeneralSettings.as_str());
        if let Some(hooks) = webhook::export(self, None).await? {
            general.insert("webhooks".to_string(), hooks);
        }
        let new_code = settings::get_new_code_period(self, None).await?;
        if !new_code.is_empty() {
            general.insert(NEW_CODE_PERIOD.to_string(), Value::String(new_code));
        }

        json.insert("permissions".to_string(), self.global_permissions().await?.to_json());
        json.insert("permissionTemplates".to_string(), permission_template::export(self).await?);
        json.insert(devops::DEVOPS_INTEGRATION.to_string(), devops::export(self).await?);
        Ok(Value::Object(json))
    }

    /// Replay a global configuration document.
    ///
    /// Settings go first, then permission templates, global permissions and
    /// finally DevOps platforms.
    #[tracing::instrument(skip(self, config))]
    pub async fn import_config(&self, config: &Value) -> Result<()> {
        tracing::info!("Importing platform global settings");
        for category in SettingCategory::IMPORTED {
            let Some(section) = config.get(category.as_str()).and_then(Value::as_object) else {
                continue;
            };
            for (key, value) in section {
                match key.as_str() {
                    "webhooks" => webhook::reconcile(self, value, None).await?,
                    NEW_CODE_PERIOD => {}
                    _ => self.apply_setting(key, value).await?,
                }
            }
        }
        if let Some(languages) = config
            .get(SettingCategory::Languages.as_str())
            .and_then(Value::as_object)
        {
            for lang_settings in languages.values().filter_map(Value::as_object) {
                for (key, value) in lang_settings {
                    self.apply_setting(key, value).await?;
                }
            }
        }
        if let Some(new_code) = config
            .get(SettingCategory::GeneralSettings.as_str())
            .and_then(|g| g.get(NEW_CODE_PERIOD))
            .and_then(Value::as_str)
        {
            let (period_type, value) = settings::decode_new_code_period(new_code)?;
            settings::set_new_code_period(self, &period_type, value.as_deref(), None).await?;
        }

        permission_template::import_config(self, config).await?;
        if let Some(perms) = config.get("permissions") {
            PermissionSet::from_json(perms)
                .apply(self, PermissionScope::Global)
                .await?;
        }
        devops::import_config(self, config).await
    }

    /// Set one setting, skipping it with a warning if the platform rejects it.
    async fn apply_setting(&self, key: &str, value: &Value) -> Result<()> {
        match self.set_setting(key, value).await {
            Err(SonarError::ApiError { message, .. }) => {
                tracing::warn!("Setting {} could not be set, skipped: {}", key, message);
                Ok(())
            }
            other => other,
        }
    }
}

/// Nested object under `key`, created empty if absent or not an object.
fn object_entry<'a>(map: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
    let entry = map
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    match entry {
        Value::Object(m) => m,
        _ => unreachable!("entry was just made an object"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_entry_creates_nested_sections() {
        let mut map = Map::new();
        object_entry(object_entry(&mut map, "languages"), "java").insert("k".into(), json!("v"));
        assert_eq!(Value::Object(map), json!({"languages": {"java": {"k": "v"}}}));
    }

    #[test]
    fn test_platform_display_is_redacted() {
        let platform = Platform::connect("https://sonar.example.com", "squ_secret_token").unwrap();
        assert_eq!(platform.to_string(), "squ***ken@https://sonar.example.com");
        assert!(!platform.is_sonarcloud());
    }

    #[test]
    fn test_weak_handle_outlives_nothing() {
        let platform = Platform::connect("http://localhost:9000", "token").unwrap();
        let handle = platform.downgrade();
        assert!(handle.upgrade().is_ok());
        drop(platform);
        assert!(handle.upgrade().is_err());
    }
}
