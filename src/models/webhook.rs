//! Webhooks, global or per project.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::client::ParamsBuf;
use crate::error::Result;
use crate::platform::Platform;
use crate::util::str_field;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Webhook {
    pub key: String,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    webhooks: Vec<Webhook>,
}

/// Webhooks of a project, or global ones when `project` is `None`.
pub async fn list(platform: &Platform, project: Option<&str>) -> Result<Vec<Webhook>> {
    let params = ParamsBuf::new().with_opt("project", project);
    let resp: ListResponse = platform
        .client()
        .get_json("webhooks/list", &params.as_params())
        .await?;
    Ok(resp.webhooks)
}

/// Export form: `{"name": {"url": "..."}}`, `None` when there are none.
pub async fn export(platform: &Platform, project: Option<&str>) -> Result<Option<Value>> {
    let hooks = list(platform, project).await?;
    if hooks.is_empty() {
        return Ok(None);
    }
    let out: Map<String, Value> = hooks
        .into_iter()
        .map(|h| {
            let mut body = Map::new();
            body.insert("url".to_string(), Value::String(h.url));
            (h.name, Value::Object(body))
        })
        .collect();
    Ok(Some(Value::Object(out)))
}

/// Make the webhooks named in `desired` exist with the given URL.
///
/// Matching is by name; webhooks not named are left alone.
pub async fn reconcile(platform: &Platform, desired: &Value, project: Option<&str>) -> Result<()> {
    let Some(desired) = desired.as_object() else {
        return Ok(());
    };
    let current = list(platform, project).await?;
    for (name, body) in desired {
        let Some(url) = str_field(body, "url") else {
            tracing::warn!("Webhook '{}' has no URL, skipped", name);
            continue;
        };
        match current.iter().find(|h| &h.name == name) {
            Some(h) if h.url == url => {}
            Some(h) => {
                let params = [("webhook", h.key.as_str()), ("name", name.as_str()), ("url", url)];
                platform.client().post("webhooks/update", &params).await?;
            }
            None => {
                let params = ParamsBuf::new()
                    .with("name", name.as_str())
                    .with("url", url)
                    .with_opt("project", project);
                platform
                    .client()
                    .post("webhooks/create", &params.as_params())
                    .await?;
            }
        }
    }
    Ok(())
}
