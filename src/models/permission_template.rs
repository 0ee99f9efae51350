//! Permission templates.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::client::ParamsBuf;
use crate::error::Result;
use crate::models::permissions::{PermissionScope, PermissionSet};
use crate::platform::Platform;
use crate::util::{csv_to_list, str_field};

/// Qualifiers a template can be the default for, with their export names.
const DEFAULT_FOR: [(&str, &str); 3] = [("TRK", "projects"), ("VW", "portfolios"), ("APP", "applications")];

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub project_key_pattern: Option<String>,
    /// Qualifiers this template is the default for.
    #[serde(skip)]
    pub default_for: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    permission_templates: Vec<PermissionTemplate>,
    #[serde(default)]
    default_templates: Vec<DefaultTemplate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DefaultTemplate {
    template_id: String,
    qualifier: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateResponse {
    permission_template: PermissionTemplate,
}

/// All permission templates, with their default qualifiers resolved.
pub async fn list(platform: &Platform) -> Result<Vec<PermissionTemplate>> {
    let resp: SearchResponse = platform
        .client()
        .get_json("permissions/search_templates", &[])
        .await?;
    let mut templates = resp.permission_templates;
    for t in &mut templates {
        t.default_for = resp
            .default_templates
            .iter()
            .filter(|d| d.template_id == t.id)
            .map(|d| d.qualifier.clone())
            .collect();
    }
    Ok(templates)
}

impl PermissionTemplate {
    pub async fn permissions(&self, platform: &Platform) -> Result<PermissionSet> {
        PermissionSet::fetch(platform, PermissionScope::Template { id: &self.id }).await
    }

    async fn to_json(&self, platform: &Platform) -> Result<Value> {
        let mut json = Map::new();
        if let Some(d) = self.description.as_deref().filter(|d| !d.is_empty()) {
            json.insert("description".to_string(), Value::String(d.to_string()));
        }
        if let Some(p) = self.project_key_pattern.as_deref().filter(|p| !p.is_empty()) {
            json.insert("pattern".to_string(), Value::String(p.to_string()));
        }
        let defaults: Vec<&str> = DEFAULT_FOR
            .iter()
            .filter(|(q, _)| self.default_for.iter().any(|d| d == q))
            .map(|(_, name)| *name)
            .collect();
        if !defaults.is_empty() {
            json.insert("defaultFor".to_string(), Value::String(defaults.join(", ")));
        }
        let perms = self.permissions(platform).await?;
        if !perms.is_empty() {
            json.insert("permissions".to_string(), perms.to_json());
        }
        Ok(Value::Object(json))
    }
}

/// Templates keyed by name.
pub async fn export(platform: &Platform) -> Result<Value> {
    tracing::info!("Exporting permission templates");
    let mut out = Map::new();
    for t in list(platform).await? {
        let json = t.to_json(platform).await?;
        out.insert(t.name.clone(), json);
    }
    Ok(Value::Object(out))
}

/// Create or update the templates of the `permissionTemplates` section.
pub async fn import_config(platform: &Platform, config: &Value) -> Result<()> {
    let Some(section) = config.get("permissionTemplates").and_then(Value::as_object) else {
        return Ok(());
    };
    tracing::info!("Importing permission templates");
    let existing = list(platform).await?;
    for (name, data) in section {
        let description = str_field(data, "description");
        let pattern = str_field(data, "pattern");
        let id = match existing.iter().find(|t| &t.name == name) {
            Some(t) => {
                let params = ParamsBuf::new()
                    .with("id", t.id.as_str())
                    .with("name", name.as_str())
                    .with_opt("description", description)
                    .with_opt("projectKeyPattern", pattern);
                platform
                    .client()
                    .post("permissions/update_template", &params.as_params())
                    .await?;
                t.id.clone()
            }
            None => {
                let params = ParamsBuf::new()
                    .with("name", name.as_str())
                    .with_opt("description", description)
                    .with_opt("projectKeyPattern", pattern);
                let resp: CreateResponse = platform
                    .client()
                    .post_json("permissions/create_template", &params.as_params())
                    .await?;
                resp.permission_template.id
            }
        };
        if let Some(perms) = data.get("permissions") {
            PermissionSet::from_json(perms)
                .apply(platform, PermissionScope::Template { id: &id })
                .await?;
        }
        for default_for in str_field(data, "defaultFor").map(csv_to_list).unwrap_or_default() {
            let Some((qualifier, _)) = DEFAULT_FOR.iter().find(|(_, n)| *n == default_for) else {
                tracing::warn!("Unknown default template target '{}', skipped", default_for);
                continue;
            };
            let params = [("templateId", id.as_str()), ("qualifier", *qualifier)];
            platform
                .client()
                .post("permissions/set_default_template", &params)
                .await?;
        }
    }
    Ok(())
}
