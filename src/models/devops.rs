//! DevOps platform definitions (GitHub, GitLab, Azure DevOps, Bitbucket).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::client::ParamsBuf;
use crate::error::{Result, SonarError};
use crate::platform::Platform;
use crate::util::str_field;

/// Section of the configuration document holding DevOps platforms.
pub const DEVOPS_INTEGRATION: &str = "devops_integration";

/// Secrets can't be read back, imported definitions get this placeholder.
const SECRET_PLACEHOLDER: &str = "TO_BE_SET";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlmType {
    Github,
    Gitlab,
    Azure,
    Bitbucket,
    #[serde(rename = "bitbucketcloud")]
    BitbucketCloud,
}

impl AlmType {
    pub const ALL: [AlmType; 5] = [
        AlmType::Github,
        AlmType::Gitlab,
        AlmType::Azure,
        AlmType::Bitbucket,
        AlmType::BitbucketCloud,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlmType::Github => "github",
            AlmType::Gitlab => "gitlab",
            AlmType::Azure => "azure",
            AlmType::Bitbucket => "bitbucket",
            AlmType::BitbucketCloud => "bitbucketcloud",
        }
    }

    /// Non-secret fields worth exporting, besides `url`.
    fn public_fields(&self) -> &'static [&'static str] {
        match self {
            AlmType::Github => &["appId", "clientId"],
            AlmType::BitbucketCloud => &["workspace", "clientId"],
            _ => &[],
        }
    }

    /// Secret fields that must be sent on creation.
    fn secret_fields(&self) -> &'static [&'static str] {
        match self {
            AlmType::Github => &["clientSecret", "privateKey"],
            AlmType::BitbucketCloud => &["clientSecret"],
            _ => &["personalAccessToken"],
        }
    }
}

impl fmt::Display for AlmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlmType {
    type Err = SonarError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| SonarError::InvalidData(format!("unknown DevOps platform type '{s}'")))
    }
}

/// One DevOps platform definition.
#[derive(Debug, Clone, PartialEq)]
pub struct DevopsPlatform {
    pub key: String,
    pub alm_type: AlmType,
    /// Raw definition minus the key.
    pub fields: Map<String, Value>,
}

impl DevopsPlatform {
    pub fn url(&self) -> Option<&str> {
        self.fields.get("url").and_then(Value::as_str)
    }

    fn to_json(&self) -> Value {
        let mut json = Map::new();
        json.insert("type".to_string(), Value::String(self.alm_type.to_string()));
        if let Some(url) = self.url() {
            json.insert("url".to_string(), Value::String(url.to_string()));
        }
        for field in self.alm_type.public_fields() {
            if let Some(v) = self.fields.get(*field) {
                json.insert((*field).to_string(), v.clone());
            }
        }
        Value::Object(json)
    }
}

/// All DevOps platform definitions.
pub async fn list(platform: &Platform) -> Result<Vec<DevopsPlatform>> {
    let resp: Map<String, Value> = platform
        .client()
        .get_json("alm_settings/list_definitions", &[])
        .await?;
    let mut out = Vec::new();
    for (type_name, defs) in resp {
        let Ok(alm_type) = type_name.parse::<AlmType>() else {
            tracing::warn!("Ignoring DevOps platform type '{}'", type_name);
            continue;
        };
        for def in defs.as_array().into_iter().flatten() {
            let Some(mut fields) = def.as_object().cloned() else { continue };
            let Some(Value::String(key)) = fields.remove("key") else { continue };
            out.push(DevopsPlatform {
                key,
                alm_type,
                fields,
            });
        }
    }
    Ok(out)
}

pub async fn get(platform: &Platform, key: &str) -> Result<Option<DevopsPlatform>> {
    Ok(list(platform).await?.into_iter().find(|p| p.key == key))
}

pub async fn platform_exists(platform: &Platform, key: &str) -> Result<bool> {
    Ok(get(platform, key).await?.is_some())
}

/// Type of the DevOps platform with the given key, if defined.
pub async fn platform_type(platform: &Platform, key: &str) -> Result<Option<AlmType>> {
    Ok(get(platform, key).await?.map(|p| p.alm_type))
}

/// Definitions keyed by platform key, secrets excluded.
pub async fn export(platform: &Platform) -> Result<Value> {
    tracing::info!("Exporting DevOps integration settings");
    let out: Map<String, Value> = list(platform)
        .await?
        .iter()
        .map(|p| (p.key.clone(), p.to_json()))
        .collect();
    Ok(Value::Object(out))
}

/// Create the definitions of the document that don't exist yet.
///
/// Existing definitions are left untouched, their secrets can't be compared.
pub async fn import_config(platform: &Platform, config: &Value) -> Result<()> {
    let Some(section) = config.get(DEVOPS_INTEGRATION).and_then(Value::as_object) else {
        return Ok(());
    };
    tracing::info!("Importing DevOps integration settings");
    let existing = list(platform).await?;
    for (key, data) in section {
        if existing.iter().any(|p| &p.key == key) {
            tracing::debug!("DevOps platform '{}' already exists, skipped", key);
            continue;
        }
        let Some(alm_type) = str_field(data, "type").and_then(|t| t.parse::<AlmType>().ok()) else {
            tracing::error!("DevOps platform '{}' has no valid type, skipped", key);
            continue;
        };
        let mut params = ParamsBuf::new().with("key", key.as_str());
        if let Some(url) = str_field(data, "url") {
            params.push("url", url);
        }
        for field in alm_type.public_fields() {
            if let Some(v) = str_field(data, field) {
                params.push(field, v);
            }
        }
        for field in alm_type.secret_fields() {
            params.push(field, SECRET_PLACEHOLDER);
        }
        tracing::warn!(
            "Creating DevOps platform '{}', its secrets must be set manually",
            key
        );
        platform
            .client()
            .post(&format!("alm_settings/create_{alm_type}"), &params.as_params())
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alm_type_parse() {
        assert_eq!("GitHub".parse::<AlmType>().unwrap(), AlmType::Github);
        assert_eq!("bitbucketcloud".parse::<AlmType>().unwrap(), AlmType::BitbucketCloud);
        assert!("svn".parse::<AlmType>().is_err());
    }

    #[test]
    fn test_export_drops_secrets() {
        let mut fields = Map::new();
        fields.insert("url".into(), "https://api.github.com".into());
        fields.insert("appId".into(), "1234".into());
        fields.insert("privateKey".into(), "secret".into());
        let p = DevopsPlatform {
            key: "gh".into(),
            alm_type: AlmType::Github,
            fields,
        };
        let json = p.to_json();
        assert_eq!(json["type"], "github");
        assert_eq!(json["appId"], "1234");
        assert!(json.get("privateKey").is_none());
    }
}
